//! Account creation.
//!
//! Signup never issues a session token: the account stays unverified until a
//! SIGNUP OTP is confirmed via `/auth/verify-otp`.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use sqlx::PgPool;
use std::sync::Arc;

use crate::api::handlers::{failure, fault, success};

use super::otp::{issue_otp, OtpPurpose};
use super::state::AuthState;
use super::storage::{insert_user, lookup_user_by_email, SignupOutcome};
use super::types::{OtpData, SignupRequest};
use super::utils::{normalize_email, valid_email, valid_name, valid_password};

#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created; verification code sent", body = OtpData),
        (status = 400, description = "Invalid signup payload"),
        (status = 409, description = "Email already registered")
    ),
    tag = "auth"
)]
pub async fn signup(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SignupRequest>>,
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

    let name = request.name.trim().to_string();
    if !valid_name(&name) {
        return failure(
            StatusCode::BAD_REQUEST,
            "Name must be between 2 and 50 characters",
        );
    }

    if let Some(password) = request.password.as_deref() {
        if !valid_password(password) {
            return failure(
                StatusCode::BAD_REQUEST,
                "Password must be at least 8 characters long",
            );
        }
    }

    match lookup_user_by_email(&pool, &email).await {
        Ok(Some(_)) => {
            return failure(
                StatusCode::CONFLICT,
                "User with this email already exists",
            );
        }
        Ok(None) => {}
        Err(err) => return fault("Failed to create user", &err),
    }

    // bcrypt is deliberately slow; keep it off the async worker threads.
    let password_hash = match request.password {
        Some(password) => {
            let cost = auth_state.config().bcrypt_cost();
            let hashed =
                tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await;
            match hashed {
                Ok(Ok(hash)) => Some(hash),
                Ok(Err(err)) => return fault("Failed to create user", &err.into()),
                Err(err) => return fault("Failed to create user", &err.into()),
            }
        }
        None => None,
    };

    let user = match insert_user(&pool, &email, &name, request.date_of_birth, password_hash).await
    {
        Ok(SignupOutcome::Created(user)) => user,
        Ok(SignupOutcome::DuplicateEmail) => {
            // Lost a race with a concurrent signup for the same address.
            return failure(
                StatusCode::CONFLICT,
                "User with this email already exists",
            );
        }
        Err(err) => return fault("Failed to create user", &err),
    };

    if let Err(err) = issue_otp(
        &pool,
        &email,
        OtpPurpose::Signup,
        Some(user.id),
        auth_state.config(),
    )
    .await
    {
        return fault("Failed to create user", &err);
    }

    success(
        StatusCode::CREATED,
        "User created successfully",
        OtpData {
            message: "Please check your email for verification code".to_string(),
            email,
        },
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
    async fn signup_missing_payload() {
        let response = signup(Extension(lazy_pool()), Extension(auth_state()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signup_rejects_invalid_email() {
        let response = signup(
            Extension(lazy_pool()),
            Extension(auth_state()),
            Some(Json(SignupRequest {
                email: "not-an-email".to_string(),
                name: "Alice".to_string(),
                date_of_birth: None,
                password: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signup_rejects_short_password() {
        let response = signup(
            Extension(lazy_pool()),
            Extension(auth_state()),
            Some(Json(SignupRequest {
                email: "alice@example.com".to_string(),
                name: "Alice".to_string(),
                date_of_birth: None,
                password: Some("short".to_string()),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signup_rejects_short_name() {
        let response = signup(
            Extension(lazy_pool()),
            Extension(auth_state()),
            Some(Json(SignupRequest {
                email: "alice@example.com".to_string(),
                name: "A".to_string(),
                date_of_birth: None,
                password: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
