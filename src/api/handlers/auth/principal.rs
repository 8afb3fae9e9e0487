//! Authenticated principal extraction.
//!
//! Resolve the session token (cookie or bearer header) to a verified user.
//! Every failure mode is a 401 with a message the client can show directly.

use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::handlers::{failure, fault};

use super::session::extract_session_token;
use super::state::AuthState;
use super::storage::lookup_user_by_id;

/// Authenticated user context derived from the session token.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
}

/// Resolve the request's token into a principal, or a ready 401 response.
pub(crate) async fn require_auth(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
) -> Result<Principal, Response> {
    let Some(token) = extract_session_token(headers) else {
        return Err(failure(
            StatusCode::UNAUTHORIZED,
            "Access token is required",
        ));
    };

    let Some(claims) = state.verify_token(&token) else {
        return Err(failure(
            StatusCode::UNAUTHORIZED,
            "Invalid or expired token",
        ));
    };

    let Ok(user_id) = Uuid::parse_str(&claims.sub) else {
        return Err(failure(
            StatusCode::UNAUTHORIZED,
            "Invalid or expired token",
        ));
    };

    let user = match lookup_user_by_id(pool, user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return Err(failure(StatusCode::UNAUTHORIZED, "User not found")),
        Err(err) => return Err(fault("Authentication failed", &err)),
    };

    if !user.is_verified {
        return Err(failure(
            StatusCode::UNAUTHORIZED,
            "Please verify your email address",
        ));
    }

    Ok(Principal {
        user_id: user.id,
        email: user.email,
        name: user.name,
    })
}
