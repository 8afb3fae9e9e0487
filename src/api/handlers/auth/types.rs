//! Request/response types for auth endpoints.
//!
//! Field names follow the browser client's wire format (camelCase).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::otp::OtpPurpose;
use super::storage::UserRecord;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub otp: Option<String>,
    #[serde(default)]
    pub remember: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SendOtpRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
    #[serde(rename = "type", default)]
    pub purpose: OtpPurpose,
    #[serde(default)]
    pub remember: bool,
}

/// Whether a Google credential may create a new account.
#[derive(ToSchema, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GoogleMode {
    Login,
    Signup,
}

impl Default for GoogleMode {
    fn default() -> Self {
        Self::Login
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GoogleAuthRequest {
    pub credential: String,
    #[serde(default)]
    pub mode: GoogleMode,
    #[serde(default)]
    pub remember: bool,
}

/// Public view of an account; the password hash and Google subject never
/// leave the server.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRecord> for UserPayload {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id.to_string(),
            email: record.email,
            name: record.name,
            date_of_birth: record.date_of_birth,
            avatar: record.avatar,
            is_verified: record.is_verified,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AuthData {
    pub user: UserPayload,
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OtpData {
    pub message: String,
    pub email: String,
}
