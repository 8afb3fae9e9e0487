//! Auth configuration and session-token state.

use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::google::GoogleVerifier;

const DEFAULT_SESSION_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_OTP_TTL_SECONDS: i64 = 10 * 60;
const DEFAULT_BCRYPT_COST: u32 = 12;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    jwt_secret: SecretString,
    session_ttl_seconds: i64,
    otp_ttl_seconds: i64,
    bcrypt_cost: u32,
    google_client_id: Option<String>,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String, jwt_secret: SecretString) -> Self {
        Self {
            frontend_base_url,
            jwt_secret,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            otp_ttl_seconds: DEFAULT_OTP_TTL_SECONDS,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            google_client_id: None,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_otp_ttl_seconds(mut self, seconds: i64) -> Self {
        self.otp_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    #[must_use]
    pub fn with_google_client_id(mut self, client_id: String) -> Self {
        self.google_client_id = Some(client_id);
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(crate) fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    pub(crate) fn otp_ttl_seconds(&self) -> i64 {
        self.otp_ttl_seconds
    }

    pub(super) fn bcrypt_cost(&self) -> u32 {
        self.bcrypt_cost
    }

    pub(super) fn google_client_id(&self) -> Option<&str> {
        self.google_client_id.as_deref()
    }

    /// Cookies are only marked `Secure` when the frontend is served over HTTPS.
    pub(crate) fn cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

/// Claims carried by a session token: subject is the user id.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SessionClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

pub struct AuthState {
    config: AuthConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    google: Option<GoogleVerifier>,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        let secret = config.jwt_secret.expose_secret().as_bytes();
        let encoding_key = EncodingKey::from_secret(secret);
        let decoding_key = DecodingKey::from_secret(secret);
        let google = config
            .google_client_id()
            .map(|client_id| GoogleVerifier::new(client_id.to_string()));

        Self {
            config,
            encoding_key,
            decoding_key,
            google,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(super) fn google(&self) -> Option<&GoogleVerifier> {
        self.google.as_ref()
    }

    /// Mint a signed session token for the user.
    pub(crate) fn mint_token(&self, user_id: Uuid) -> Result<String> {
        let iat = Utc::now().timestamp();
        let claims = SessionClaims {
            sub: user_id.to_string(),
            iat,
            exp: iat + self.config.session_ttl_seconds(),
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .context("failed to sign session token")
    }

    /// Verify a session token. Expired or tampered tokens return `None`.
    pub(crate) fn verify_token(&self, token: &str) -> Option<SessionClaims> {
        let validation = Validation::new(Algorithm::HS256);
        jsonwebtoken::decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .ok()
    }
}
