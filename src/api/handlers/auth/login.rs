//! Password and OTP login.
//!
//! One endpoint accepts either credential. Failure modes deliberately
//! collapse to "Invalid credentials" where distinguishing them would reveal
//! whether an email is registered; the one exception is a password attempt
//! against a Google-only account, which gets a directive message instead of a
//! generic 401.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use sqlx::PgPool;
use std::sync::Arc;

use crate::api::handlers::{failure, fault};

use super::otp::{verify_otp, OtpPurpose};
use super::session::issue_session;
use super::state::AuthState;
use super::storage::lookup_user_by_email;
use super::types::{AuthData, LoginRequest};
use super::utils::normalize_email;

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthData),
        (status = 400, description = "Missing credential or Google-only account"),
        (status = 401, description = "Invalid credentials or unverified account")
    ),
    tag = "auth"
)]
pub async fn login(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return failure(StatusCode::BAD_REQUEST, "Missing payload");
    };

    let email = normalize_email(&request.email);
    let user = match lookup_user_by_email(&pool, &email).await {
        Ok(Some(user)) => user,
        Ok(None) => return failure(StatusCode::UNAUTHORIZED, "Invalid credentials"),
        Err(err) => return fault("Login failed", &err),
    };

    if let Some(password) = request.password.clone() {
        let Some(password_hash) = user.password_hash.clone() else {
            // Account was created through Google and has no password.
            return failure(
                StatusCode::BAD_REQUEST,
                "Please use Google sign-in for this account",
            );
        };

        let verified =
            tokio::task::spawn_blocking(move || bcrypt::verify(password, &password_hash)).await;
        match verified {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => {
                return failure(StatusCode::UNAUTHORIZED, "Invalid credentials");
            }
            Ok(Err(err)) => return fault("Login failed", &err.into()),
            Err(err) => return fault("Login failed", &err.into()),
        }
    }

    if let Some(otp) = request.otp.as_deref() {
        match verify_otp(&pool, &email, OtpPurpose::Login, otp.trim()).await {
            Ok(true) => {}
            Ok(false) => {
                return failure(StatusCode::UNAUTHORIZED, "Invalid or expired OTP");
            }
            Err(err) => return fault("Login failed", &err),
        }
    }

    if request.password.is_none() && request.otp.is_none() {
        return failure(StatusCode::BAD_REQUEST, "Password or OTP is required");
    }

    if !user.is_verified {
        return failure(
            StatusCode::UNAUTHORIZED,
            "Please verify your email address",
        );
    }

    issue_session(&auth_state, user, request.remember, "Login successful")
}
