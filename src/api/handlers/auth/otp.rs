//! One-time-passcode issuance and verification.
//!
//! Issuing a code invalidates every unused code for the same (email, purpose)
//! and enqueues the delivery email, all in one transaction, so at most one
//! code is ever acceptable per pair. Verification is a single conditional
//! update: the unused -> used transition happens exactly once even when two
//! requests race on the same code.

use anyhow::{Context, Result};
use rand::{rngs::OsRng, Rng};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, info_span, Instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use super::state::AuthConfig;

/// The flow an OTP was issued for; a code is only consumable by that flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OtpPurpose {
    Signup,
    Login,
    PasswordReset,
}

impl OtpPurpose {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Signup => "SIGNUP",
            Self::Login => "LOGIN",
            Self::PasswordReset => "PASSWORD_RESET",
        }
    }

    /// Outbox template used to render the delivery email.
    fn template(self) -> &'static str {
        match self {
            Self::Signup => "otp_signup",
            Self::Login => "otp_login",
            Self::PasswordReset => "otp_password_reset",
        }
    }
}

impl Default for OtpPurpose {
    fn default() -> Self {
        Self::Signup
    }
}

/// Uniformly random 6-digit code, leading zeros allowed.
fn generate_otp_code() -> String {
    let value = OsRng.gen_range(0..1_000_000u32);
    format!("{value:06}")
}

/// Issue a fresh OTP for (email, purpose) and enqueue its delivery email.
///
/// Returns the code so tests and callers that need it can see it; delivery
/// itself happens asynchronously via the outbox worker.
pub(crate) async fn issue_otp(
    pool: &PgPool,
    email: &str,
    purpose: OtpPurpose,
    user_id: Option<Uuid>,
    config: &AuthConfig,
) -> Result<String> {
    // One transaction covers invalidation, insertion, and the outbox row, so
    // two concurrent issuances can never leave two valid codes behind.
    let mut tx = pool.begin().await.context("begin otp transaction")?;

    let query = r"
        UPDATE otp_tokens
        SET used = TRUE
        WHERE email = $1
          AND purpose = $2
          AND used = FALSE
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(email)
        .bind(purpose.as_str())
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to invalidate previous otp tokens")?;

    let code = generate_otp_code();
    let query = r"
        INSERT INTO otp_tokens (email, purpose, code, expires_at, user_id)
        VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 second'), $5)
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(email)
        .bind(purpose.as_str())
        .bind(&code)
        .bind(config.otp_ttl_seconds())
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert otp token")?;

    let payload = json!({
        "email": email,
        "code": code,
        "expiresMinutes": config.otp_ttl_seconds() / 60,
    });
    let payload_text = serde_json::to_string(&payload).context("failed to serialize otp email")?;

    let query = r"
        INSERT INTO email_outbox (to_email, template, payload_json)
        VALUES ($1, $2, $3::jsonb)
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(email)
        .bind(purpose.template())
        .bind(payload_text)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to enqueue otp email")?;

    tx.commit().await.context("commit otp transaction")?;

    Ok(code)
}

/// Consume an OTP. True exactly once per code: replay, expiry, and a wrong
/// code are indistinguishable to the caller.
pub(crate) async fn verify_otp(
    pool: &PgPool,
    email: &str,
    purpose: OtpPurpose,
    code: &str,
) -> Result<bool> {
    let query = r"
        UPDATE otp_tokens
        SET used = TRUE
        WHERE email = $1
          AND purpose = $2
          AND code = $3
          AND used = FALSE
          AND expires_at > NOW()
        RETURNING id
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .bind(purpose.as_str())
        .bind(code)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to verify otp token")?;

    Ok(row.is_some())
}

/// Remove expired OTP rows; used rows stay until they expire.
pub(crate) async fn delete_expired(pool: &PgPool) -> Result<u64> {
    let query = "DELETE FROM otp_tokens WHERE expires_at < NOW()";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete expired otp tokens")?;
    Ok(result.rows_affected())
}

/// Spawn the periodic sweep that removes expired OTP rows.
pub fn spawn_cleanup_sweep(pool: PgPool, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            sleep(interval).await;
            match delete_expired(&pool).await {
                Ok(0) => {}
                Ok(removed) => info!("removed {removed} expired otp tokens"),
                Err(err) => error!("otp cleanup sweep failed: {err}"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_code_is_six_digits() {
        for _ in 0..100 {
            let code = generate_otp_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn otp_code_allows_leading_zeros() {
        // The format is fixed-width; a small value keeps its leading zeros.
        assert_eq!(format!("{:06}", 7u32), "000007");
    }

    #[test]
    fn purpose_wire_names() {
        assert_eq!(OtpPurpose::Signup.as_str(), "SIGNUP");
        assert_eq!(OtpPurpose::Login.as_str(), "LOGIN");
        assert_eq!(OtpPurpose::PasswordReset.as_str(), "PASSWORD_RESET");
    }

    #[test]
    fn purpose_serde_round_trip() {
        let value = serde_json::to_value(OtpPurpose::PasswordReset).expect("serialize purpose");
        assert_eq!(value, "PASSWORD_RESET");
        let parsed: OtpPurpose = serde_json::from_value(value).expect("deserialize purpose");
        assert_eq!(parsed, OtpPurpose::PasswordReset);
    }

    #[test]
    fn purpose_defaults_to_signup() {
        assert_eq!(OtpPurpose::default(), OtpPurpose::Signup);
    }

    #[test]
    fn purpose_templates_are_distinct() {
        assert_eq!(OtpPurpose::Signup.template(), "otp_signup");
        assert_eq!(OtpPurpose::Login.template(), "otp_login");
        assert_eq!(OtpPurpose::PasswordReset.template(), "otp_password_reset");
    }
}
