//! Google sign-in: ID-token verification and the `/auth/google` endpoint.
//!
//! Credentials are verified offline against Google's published JWKS. The
//! keyset is cached in memory with a TTL and refreshed when it goes stale or
//! an unknown `kid` shows up; if a refresh fails, the last known keyset keeps
//! verification working.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use jsonwebtoken::{decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::api::handlers::{failure, fault};

use super::session::issue_session;
use super::state::AuthState;
use super::storage::{insert_google_user, link_google_identity, lookup_user_by_email};
use super::types::{GoogleAuthRequest, GoogleMode};
use super::utils::normalize_email;

const GOOGLE_CERTS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];
const KEYSET_CACHE_TTL_SECONDS: u64 = 3600;

#[derive(Debug, Error)]
pub enum GoogleVerifyError {
    #[error("invalid google credential")]
    InvalidCredential,
    #[error("unknown google signing key: {0}")]
    UnknownKey(String),
    #[error("failed to fetch google keys: {0}")]
    KeyFetch(#[from] reqwest::Error),
}

/// Identity extracted from a verified Google ID token.
#[derive(Debug, Clone)]
pub(super) struct GoogleIdentity {
    pub subject: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

impl Jwks {
    fn find_by_kid(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|key| key.kid == kid)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kid: String,
    n: String,
    e: String,
}

#[derive(Debug, Clone)]
struct KeysetCache {
    jwks: Jwks,
    fetched_at: Instant,
}

impl KeysetCache {
    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < Duration::from_secs(KEYSET_CACHE_TTL_SECONDS)
    }
}

#[derive(Debug, Deserialize)]
struct GoogleClaims {
    sub: String,
    email: String,
    name: Option<String>,
    picture: Option<String>,
}

/// Verifies Google ID tokens against the expected OAuth client id.
#[derive(Debug)]
pub struct GoogleVerifier {
    client_id: String,
    certs_url: String,
    http: Client,
    cache: RwLock<Option<KeysetCache>>,
}

impl GoogleVerifier {
    #[must_use]
    pub fn new(client_id: String) -> Self {
        Self {
            client_id,
            certs_url: GOOGLE_CERTS_URL.to_string(),
            http: Client::new(),
            cache: RwLock::new(None),
        }
    }

    /// Verify a credential and extract the identity it attests.
    pub(super) async fn verify(
        &self,
        credential: &str,
    ) -> Result<GoogleIdentity, GoogleVerifyError> {
        let header =
            decode_header(credential).map_err(|_| GoogleVerifyError::InvalidCredential)?;
        let kid = header.kid.ok_or(GoogleVerifyError::InvalidCredential)?;
        let jwk = self.key_for(&kid).await?;

        let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
            .map_err(|_| GoogleVerifyError::InvalidCredential)?;
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.client_id.as_str()]);
        validation.set_issuer(&GOOGLE_ISSUERS);

        let data = jsonwebtoken::decode::<GoogleClaims>(credential, &key, &validation)
            .map_err(|_| GoogleVerifyError::InvalidCredential)?;

        let email = normalize_email(&data.claims.email);
        let name = data
            .claims
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| email.clone());

        Ok(GoogleIdentity {
            subject: data.claims.sub,
            email,
            name,
            picture: data.claims.picture,
        })
    }

    /// Return the key for `kid`, refreshing the cached keyset when it is
    /// stale or does not know the kid.
    async fn key_for(&self, kid: &str) -> Result<Jwk, GoogleVerifyError> {
        {
            let cache = self.cache.read().await;
            if let Some(cache) = cache.as_ref() {
                if cache.is_fresh() {
                    if let Some(jwk) = cache.jwks.find_by_kid(kid) {
                        return Ok(jwk.clone());
                    }
                }
            }
        }

        match self.fetch_keys().await {
            Ok(jwks) => {
                let found = jwks.find_by_kid(kid).cloned();
                let mut cache = self.cache.write().await;
                *cache = Some(KeysetCache {
                    jwks,
                    fetched_at: Instant::now(),
                });
                found.ok_or_else(|| GoogleVerifyError::UnknownKey(kid.to_string()))
            }
            Err(err) => {
                // Keep serving from the stale keyset rather than failing hard.
                let cache = self.cache.read().await;
                cache
                    .as_ref()
                    .and_then(|cache| cache.jwks.find_by_kid(kid).cloned())
                    .ok_or(err)
            }
        }
    }

    async fn fetch_keys(&self) -> Result<Jwks, GoogleVerifyError> {
        let jwks = self
            .http
            .get(&self.certs_url)
            .send()
            .await?
            .error_for_status()?
            .json::<Jwks>()
            .await?;
        Ok(jwks)
    }
}

#[utoipa::path(
    post,
    path = "/auth/google",
    request_body = GoogleAuthRequest,
    responses(
        (status = 200, description = "Google authentication successful"),
        (status = 400, description = "Invalid Google token"),
        (status = 404, description = "No account for this email in login mode")
    ),
    tag = "auth"
)]
pub async fn google_auth(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<GoogleAuthRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return failure(StatusCode::BAD_REQUEST, "Missing payload");
    };

    if request.credential.trim().is_empty() {
        return failure(StatusCode::BAD_REQUEST, "Invalid Google token");
    }

    let Some(verifier) = auth_state.google() else {
        return failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Google sign-in is not configured",
        );
    };

    let identity = match verifier.verify(request.credential.trim()).await {
        Ok(identity) => identity,
        Err(GoogleVerifyError::KeyFetch(err)) => {
            return fault("Google authentication failed", &err.into());
        }
        Err(_) => return failure(StatusCode::BAD_REQUEST, "Invalid Google token"),
    };

    let existing = match lookup_user_by_email(&pool, &identity.email).await {
        Ok(existing) => existing,
        Err(err) => return fault("Google authentication failed", &err),
    };

    let user = match existing {
        None => {
            if request.mode == GoogleMode::Login {
                // Login never creates an account for an unknown email.
                return failure(
                    StatusCode::NOT_FOUND,
                    "No account found with this email address. Please sign up first.",
                );
            }
            match insert_google_user(
                &pool,
                &identity.email,
                &identity.name,
                &identity.subject,
                identity.picture.as_deref(),
            )
            .await
            {
                Ok(user) => user,
                Err(err) => return fault("Google authentication failed", &err),
            }
        }
        Some(user) if user.google_id.is_none() => {
            match link_google_identity(
                &pool,
                user.id,
                &identity.subject,
                identity.picture.as_deref(),
            )
            .await
            {
                Ok(Some(user)) => user,
                Ok(None) => return failure(StatusCode::NOT_FOUND, "User not found"),
                Err(err) => return fault("Google authentication failed", &err),
            }
        }
        Some(user) => user,
    };

    issue_session(
        &auth_state,
        user,
        request.remember,
        "Google authentication successful",
    )
}
