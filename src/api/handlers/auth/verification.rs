//! OTP delivery and verification endpoints.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use sqlx::PgPool;
use std::sync::Arc;

use crate::api::handlers::{failure, fault, success};

use super::otp::{issue_otp, verify_otp, OtpPurpose};
use super::session::issue_session;
use super::state::AuthState;
use super::storage::{lookup_user_by_email, mark_verified};
use super::types::{OtpData, SendOtpRequest, VerifyOtpRequest};
use super::utils::{normalize_email, valid_email};

#[utoipa::path(
    post,
    path = "/auth/send-otp",
    request_body = SendOtpRequest,
    responses(
        (status = 200, description = "Login code sent", body = OtpData),
        (status = 400, description = "Invalid email"),
        (status = 404, description = "No account for this email")
    ),
    tag = "auth"
)]
pub async fn send_otp(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SendOtpRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return failure(StatusCode::BAD_REQUEST, "Missing payload");
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return failure(
            StatusCode::BAD_REQUEST,
            "Please provide a valid email address",
        );
    }

    let user = match lookup_user_by_email(&pool, &email).await {
        Ok(Some(user)) => user,
        Ok(None) => return failure(StatusCode::NOT_FOUND, "User not found"),
        Err(err) => return fault("Failed to send OTP", &err),
    };

    if let Err(err) = issue_otp(
        &pool,
        &email,
        OtpPurpose::Login,
        Some(user.id),
        auth_state.config(),
    )
    .await
    {
        return fault("Failed to send OTP", &err);
    }

    success(
        StatusCode::OK,
        "OTP sent successfully",
        OtpData {
            message: "OTP sent to your email".to_string(),
            email,
        },
    )
}

#[utoipa::path(
    post,
    path = "/auth/verify-otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "OTP verified; session issued"),
        (status = 400, description = "Invalid or expired OTP"),
        (status = 404, description = "User record missing")
    ),
    tag = "auth"
)]
pub async fn verify_otp_endpoint(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyOtpRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return failure(StatusCode::BAD_REQUEST, "Missing payload");
    };

    let email = normalize_email(&request.email);
    let code = request.otp.trim();
    if code.is_empty() {
        return failure(StatusCode::BAD_REQUEST, "Invalid or expired OTP");
    }

    match verify_otp(&pool, &email, request.purpose, code).await {
        Ok(true) => {}
        Ok(false) => return failure(StatusCode::BAD_REQUEST, "Invalid or expired OTP"),
        Err(err) => return fault("OTP verification failed", &err),
    }

    if request.purpose == OtpPurpose::Signup {
        if let Err(err) = mark_verified(&pool, &email).await {
            return fault("OTP verification failed", &err);
        }
    }

    // Reload so the response reflects the flipped verified flag. A missing
    // row here means the account vanished between the two statements.
    let user = match lookup_user_by_email(&pool, &email).await {
        Ok(Some(user)) => user,
        Ok(None) => return failure(StatusCode::NOT_FOUND, "User not found"),
        Err(err) => return fault("OTP verification failed", &err),
    };

    // A LOGIN code alone must not open a session for an account that never
    // confirmed its SIGNUP code.
    if !user.is_verified {
        return failure(
            StatusCode::UNAUTHORIZED,
            "Please verify your email address",
        );
    }

    issue_session(
        &auth_state,
        user,
        request.remember,
        "OTP verified successfully",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::state::AuthConfig;
    use axum::response::IntoResponse;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;

    fn auth_state() -> Arc<AuthState> {
        Arc::new(AuthState::new(AuthConfig::new(
            "https://notu.dev".to_string(),
            SecretString::from("test-secret".to_string()),
        )))
    }

    fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .connect_lazy("postgres://postgres@localhost/postgres")
            .expect("lazy pool")
    }

    #[tokio::test]
    async fn send_otp_missing_payload() {
        let response = send_otp(Extension(lazy_pool()), Extension(auth_state()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn send_otp_rejects_invalid_email() {
        let response = send_otp(
            Extension(lazy_pool()),
            Extension(auth_state()),
            Some(Json(SendOtpRequest {
                email: "not-an-email".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn verify_otp_rejects_blank_code() {
        let response = verify_otp_endpoint(
            Extension(lazy_pool()),
            Extension(auth_state()),
            Some(Json(VerifyOtpRequest {
                email: "alice@example.com".to_string(),
                otp: "   ".to_string(),
                purpose: OtpPurpose::Signup,
                remember: false,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
