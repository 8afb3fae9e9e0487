//! Session cookie handling and logout.
//!
//! The cookie is the canonical token carrier; the `Authorization: Bearer`
//! header is accepted as a fallback for non-browser clients.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, AUTHORIZATION, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::error;

use crate::api::handlers::{failure, Envelope};

use super::state::{AuthConfig, AuthState};
use super::storage::UserRecord;
use super::types::{AuthData, UserPayload};

pub(crate) const SESSION_COOKIE_NAME: &str = "token";

/// Mint a token for the user and answer with the auth payload plus the
/// session cookie. `remember` controls whether the cookie persists.
pub(super) fn issue_session(
    state: &AuthState,
    user: UserRecord,
    remember: bool,
    message: &str,
) -> Response {
    let token = match state.mint_token(user.id) {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to mint session token: {err:#}");
            return failure(StatusCode::INTERNAL_SERVER_ERROR, "Login failed");
        }
    };

    let mut headers = HeaderMap::new();
    match session_cookie(state.config(), &token, remember) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            return failure(StatusCode::INTERNAL_SERVER_ERROR, "Login failed");
        }
    }

    let data = AuthData {
        user: UserPayload::from(user),
        token,
    };
    (StatusCode::OK, headers, Json(Envelope::ok(message, data))).into_response()
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Session cookie cleared")
    ),
    tag = "auth"
)]
pub async fn logout(auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    // Stateless logout: the cookie is cleared, but an already-issued token
    // stays valid on the wire until it expires.
    let mut headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(auth_state.config()) {
        headers.insert(SET_COOKIE, cookie);
    }
    (
        StatusCode::OK,
        headers,
        Json(Envelope::message_only("Logout successful")),
    )
        .into_response()
}

/// Build the `HttpOnly` session cookie. `Max-Age` is only set when the user
/// asked to be remembered; otherwise the cookie dies with the browser session.
pub(super) fn session_cookie(
    config: &AuthConfig,
    token: &str,
    remember: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax");
    if remember {
        let max_age = config.session_ttl_seconds();
        cookie.push_str(&format!("; Max-Age={max_age}"));
    }
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Pull the session token from the request: cookie first, bearer fallback.
pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_cookie_token(headers) {
        return Some(token);
    }
    extract_bearer_token(headers)
}

fn extract_cookie_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == SESSION_COOKIE_NAME && !val.is_empty() {
            return Some(val.to_string());
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn secure_config() -> AuthConfig {
        AuthConfig::new(
            "https://notu.dev".to_string(),
            SecretString::from("test-secret".to_string()),
        )
    }

    fn local_config() -> AuthConfig {
        AuthConfig::new(
            "http://localhost:5173".to_string(),
            SecretString::from("test-secret".to_string()),
        )
    }

    #[test]
    fn remember_sets_max_age() {
        let cookie = session_cookie(&secure_config(), "tok", true).expect("cookie");
        let cookie = cookie.to_str().expect("cookie str");
        assert!(cookie.contains("Max-Age=604800"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Secure"));
    }

    #[test]
    fn session_cookie_without_remember_has_no_max_age() {
        let cookie = session_cookie(&secure_config(), "tok", false).expect("cookie");
        assert!(!cookie.to_str().expect("cookie str").contains("Max-Age"));
    }

    #[test]
    fn insecure_frontend_omits_secure_attribute() {
        let cookie = session_cookie(&local_config(), "tok", true).expect("cookie");
        assert!(!cookie.to_str().expect("cookie str").contains("Secure"));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let cookie = clear_session_cookie(&secure_config()).expect("cookie");
        let cookie = cookie.to_str().expect("cookie str");
        assert!(cookie.starts_with("token=;"));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn cookie_takes_precedence_over_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; token=from-cookie"),
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );
        assert_eq!(
            extract_session_token(&headers),
            Some("from-cookie".to_string())
        );
    }

    #[test]
    fn bearer_is_accepted_as_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );
        assert_eq!(
            extract_session_token(&headers),
            Some("from-header".to_string())
        );
    }

    #[test]
    fn empty_cookie_value_falls_through() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("token="));
        assert_eq!(extract_session_token(&headers), None);
    }

    #[test]
    fn missing_headers_yield_none() {
        assert_eq!(extract_session_token(&HeaderMap::new()), None);
    }
}
