//! OTP email delivery through a transactional outbox.
//!
//! Issuing an OTP enqueues a row in `email_outbox` inside the same
//! transaction that stores the code, so a code and its email either both
//! exist or neither does. A background task polls pending rows, locks a batch
//! with `FOR UPDATE SKIP LOCKED`, renders the message for its template, and
//! hands it to a [`Notifier`]. Failures are retried with exponential backoff
//! and jitter until `max_attempts`, then marked `failed`.
//!
//! Delivery never reports back to the request that issued the code: the user
//! sees success even if the email ultimately cannot be sent. That mirrors the
//! product behavior and keeps the issuing request fast and bounded.
//!
//! The default [`LogNotifier`] logs the rendered message; a real SMTP or API
//! sender only needs to implement [`Notifier`].

use anyhow::{anyhow, Context, Result};
use rand::Rng;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// A rendered OTP email ready for delivery.
#[derive(Clone, Debug)]
pub struct OtpMail {
    pub to_email: String,
    pub subject: String,
    pub body: String,
}

/// Delivery abstraction used by the outbox worker.
pub trait Notifier: Send + Sync {
    /// Deliver a message or return an error to schedule a retry.
    fn deliver(&self, mail: &OtpMail) -> Result<()>;
}

/// Local dev notifier that logs instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn deliver(&self, mail: &OtpMail) -> Result<()> {
        info!(
            to_email = %mail.to_email,
            subject = %mail.subject,
            body = %mail.body,
            "email outbox delivery stub"
        );
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct OutboxConfig {
    poll_interval: Duration,
    batch_size: usize,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl OutboxConfig {
    /// Defaults: 5s poll interval, 10 messages per batch, 5 attempts, and
    /// 5s -> 5m exponential backoff with jitter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            max_attempts: 5,
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn with_poll_interval_seconds(mut self, seconds: u64) -> Self {
        self.poll_interval = Duration::from_secs(seconds.max(1));
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Render the subject and body for an outbox row.
///
/// Unknown templates are an error so broken rows land in `failed` instead of
/// being retried forever.
fn render(template: &str, payload: &serde_json::Value) -> Result<(String, String)> {
    let code = payload
        .get("code")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| anyhow!("outbox payload missing code"))?;
    let expires_minutes = payload
        .get("expiresMinutes")
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(10);

    let (subject, action) = match template {
        "otp_signup" => ("Verify your account", "verify your account"),
        "otp_login" => ("Login verification code", "login to your account"),
        "otp_password_reset" => ("Password reset code", "reset your password"),
        other => return Err(anyhow!("unknown outbox template: {other}")),
    };

    let body = format!(
        "Use the following code to {action}: {code}\n\
         This code will expire in {expires_minutes} minutes.\n\
         If you didn't request this code, please ignore this email."
    );

    Ok((subject.to_string(), body))
}

/// Spawn a background task that polls and processes the email outbox.
pub fn spawn_outbox_worker(
    pool: PgPool,
    notifier: Arc<dyn Notifier>,
    config: OutboxConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(err) = process_outbox_batch(&pool, notifier.as_ref(), &config).await {
                error!("email outbox batch failed: {err}");
            }

            sleep(config.poll_interval).await;
        }
    })
}

async fn process_outbox_batch(
    pool: &PgPool,
    notifier: &dyn Notifier,
    config: &OutboxConfig,
) -> Result<usize> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to start email outbox transaction")?;

    // Grab a locked batch so multiple workers can run without double-sending.
    let query = r"
        SELECT id, to_email, template, payload_json::text AS payload_json, attempts
        FROM email_outbox
        WHERE status = 'pending'
          AND next_attempt_at <= NOW()
        ORDER BY next_attempt_at ASC, created_at ASC
        LIMIT $1
        FOR UPDATE SKIP LOCKED
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(i64::try_from(config.batch_size).unwrap_or(1))
        .fetch_all(&mut *tx)
        .instrument(span)
        .await
        .context("failed to load email outbox batch")?;

    if rows.is_empty() {
        tx.commit()
            .await
            .context("failed to commit empty outbox batch")?;
        return Ok(0);
    }

    let row_count = rows.len();
    for row in rows {
        let id: Uuid = row.get("id");
        let attempts: i32 = row.get("attempts");
        let attempts = u32::try_from(attempts).unwrap_or(0);
        let to_email: String = row.get("to_email");
        let template: String = row.get("template");
        let payload_json: String = row.get("payload_json");

        let delivery = serde_json::from_str::<serde_json::Value>(&payload_json)
            .context("failed to parse outbox payload")
            .and_then(|payload| render(&template, &payload))
            .and_then(|(subject, body)| {
                notifier.deliver(&OtpMail {
                    to_email,
                    subject,
                    body,
                })
            });

        update_outbox_status(&mut tx, id, attempts, delivery, config).await?;
    }

    tx.commit()
        .await
        .context("failed to commit email outbox batch")?;

    Ok(row_count)
}

async fn update_outbox_status(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
    attempts: u32,
    delivery: Result<()>,
    config: &OutboxConfig,
) -> Result<()> {
    let next_attempt = attempts.saturating_add(1);
    let next_attempts_i32 = i32::try_from(next_attempt).unwrap_or(i32::MAX);
    match delivery {
        Ok(()) => {
            let query = r"
                UPDATE email_outbox
                SET status = 'sent',
                    attempts = $2,
                    last_error = NULL,
                    sent_at = NOW()
                WHERE id = $1
            ";
            sqlx::query(query)
                .bind(id)
                .bind(next_attempts_i32)
                .execute(&mut **tx)
                .await
                .context("failed to update outbox status to sent")?;
        }
        Err(err) if next_attempt >= config.max_attempts => {
            let query = r"
                UPDATE email_outbox
                SET status = 'failed',
                    attempts = $2,
                    last_error = $3
                WHERE id = $1
            ";
            sqlx::query(query)
                .bind(id)
                .bind(next_attempts_i32)
                .bind(err.to_string())
                .execute(&mut **tx)
                .await
                .context("failed to update outbox status to failed")?;
        }
        Err(err) => {
            let delay = backoff_delay(next_attempt, config.backoff_base, config.backoff_max);
            let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
            let query = r"
                UPDATE email_outbox
                SET status = 'pending',
                    attempts = $2,
                    last_error = $3,
                    next_attempt_at = NOW() + ($4 * INTERVAL '1 millisecond')
                WHERE id = $1
            ";
            sqlx::query(query)
                .bind(id)
                .bind(next_attempts_i32)
                .bind(err.to_string())
                .bind(delay_ms)
                .execute(&mut **tx)
                .await
                .context("failed to update outbox retry schedule")?;
        }
    }

    Ok(())
}

fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let factor = 1u32 << shift;
    let delay = base.checked_mul(factor).unwrap_or(max);
    let capped = if delay > max { max } else { delay };
    jitter_delay(capped)
}

fn jitter_delay(delay: Duration) -> Duration {
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return delay;
    }
    let half = delay_ms / 2;
    let jitter = rand::thread_rng().gen_range(0..=half);
    Duration::from_millis(half + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_signup_template() -> Result<()> {
        let payload = serde_json::json!({
            "email": "alice@example.com",
            "code": "042137",
            "expiresMinutes": 10,
        });
        let (subject, body) = render("otp_signup", &payload)?;
        assert_eq!(subject, "Verify your account");
        assert!(body.contains("042137"));
        assert!(body.contains("10 minutes"));
        Ok(())
    }

    #[test]
    fn render_distinguishes_purposes() -> Result<()> {
        let payload = serde_json::json!({ "code": "123456" });
        let (login_subject, _) = render("otp_login", &payload)?;
        let (reset_subject, _) = render("otp_password_reset", &payload)?;
        assert_ne!(login_subject, reset_subject);
        Ok(())
    }

    #[test]
    fn render_rejects_unknown_template() {
        let payload = serde_json::json!({ "code": "123456" });
        assert!(render("newsletter", &payload).is_err());
    }

    #[test]
    fn render_requires_code() {
        let payload = serde_json::json!({ "email": "alice@example.com" });
        assert!(render("otp_signup", &payload).is_err());
    }

    #[test]
    fn backoff_grows_and_caps() {
        let base = Duration::from_secs(5);
        let max = Duration::from_secs(300);

        let first = backoff_delay(1, base, max);
        assert!(first >= Duration::from_millis(2500));
        assert!(first <= base);

        let late = backoff_delay(30, base, max);
        assert!(late <= max);
        assert!(late >= Duration::from_millis(150_000));
    }

    #[test]
    fn log_notifier_accepts_mail() {
        let notifier = LogNotifier;
        let mail = OtpMail {
            to_email: "alice@example.com".to_string(),
            subject: "Verify your account".to_string(),
            body: "code".to_string(),
        };
        assert!(notifier.deliver(&mail).is_ok());
    }

    #[test]
    fn outbox_config_floors_values() {
        let config = OutboxConfig::new()
            .with_poll_interval_seconds(0)
            .with_batch_size(0)
            .with_max_attempts(0);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.max_attempts, 1);
    }
}
