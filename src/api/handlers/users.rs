//! Authenticated profile endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use utoipa::ToSchema;

use super::auth::principal::require_auth;
use super::auth::types::UserPayload;
use super::auth::{delete_user, lookup_user_by_id, update_profile, AuthState};
use super::{failure, fault, success, success_empty};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[utoipa::path(
    get,
    path = "/users/profile",
    responses(
        (status = 200, description = "Profile for the authenticated user", body = UserPayload),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "User record missing")
    ),
    tag = "users"
)]
pub async fn get_profile(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    match lookup_user_by_id(&pool, principal.user_id).await {
        Ok(Some(user)) => success(
            StatusCode::OK,
            "Profile retrieved successfully",
            UserPayload::from(user),
        ),
        Ok(None) => failure(StatusCode::NOT_FOUND, "User not found"),
        Err(err) => fault("Failed to retrieve profile", &err),
    }
}

#[utoipa::path(
    put,
    path = "/users/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserPayload),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "User record missing")
    ),
    tag = "users"
)]
pub async fn update_profile_endpoint(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<UpdateProfileRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    let request = payload.map(|Json(request)| request).unwrap_or_else(|| {
        UpdateProfileRequest {
            name: None,
            date_of_birth: None,
            avatar: None,
        }
    });

    let name = normalize_optional(request.name);
    let avatar = normalize_optional(request.avatar);

    match update_profile(
        &pool,
        principal.user_id,
        name,
        request.date_of_birth,
        avatar,
    )
    .await
    {
        Ok(Some(user)) => success(
            StatusCode::OK,
            "Profile updated successfully",
            UserPayload::from(user),
        ),
        Ok(None) => failure(StatusCode::NOT_FOUND, "User not found"),
        Err(err) => fault("Failed to update profile", &err),
    }
}

#[utoipa::path(
    delete,
    path = "/users/account",
    responses(
        (status = 200, description = "Account and owned notes deleted"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "User record missing")
    ),
    tag = "users"
)]
pub async fn delete_account(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    // Owned notes go with the account via the FK cascade.
    match delete_user(&pool, principal.user_id).await {
        Ok(true) => success_empty("Account deleted successfully"),
        Ok(false) => failure(StatusCode::NOT_FOUND, "User not found"),
        Err(err) => fault("Failed to delete account", &err),
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_optional_drops_blank_values() {
        assert_eq!(normalize_optional(Some("  ".to_string())), None);
        assert_eq!(
            normalize_optional(Some(" Alice ".to_string())),
            Some("Alice".to_string())
        );
        assert_eq!(normalize_optional(None), None);
    }

    #[test]
    fn update_profile_request_is_fully_optional() {
        let request: UpdateProfileRequest =
            serde_json::from_value(serde_json::json!({})).expect("parse empty update");
        assert!(request.name.is_none());
        assert!(request.date_of_birth.is_none());
        assert!(request.avatar.is_none());
    }
}
