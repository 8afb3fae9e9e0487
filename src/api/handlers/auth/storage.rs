//! Database helpers for user records.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::utils::is_unique_violation;

const USER_COLUMNS: &str = r"
    id, email, name, date_of_birth, password_hash, google_id, avatar,
    is_verified, created_at, updated_at
";

/// Full user row as stored.
#[derive(Debug, Clone)]
pub(crate) struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub avatar: Option<String>,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome when attempting to create a new account.
#[derive(Debug)]
pub(super) enum SignupOutcome {
    Created(UserRecord),
    DuplicateEmail,
}

fn user_from_row(row: &PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
        date_of_birth: row.get("date_of_birth"),
        password_hash: row.get("password_hash"),
        google_id: row.get("google_id"),
        avatar: row.get("avatar"),
        is_verified: row.get("is_verified"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub(crate) async fn lookup_user_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by email")?;
    Ok(row.as_ref().map(user_from_row))
}

pub(crate) async fn lookup_user_by_id(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by id")?;
    Ok(row.as_ref().map(user_from_row))
}

/// Create an unverified account. The unique index on `email` decides races
/// between concurrent signups for the same address.
pub(super) async fn insert_user(
    pool: &PgPool,
    email: &str,
    name: &str,
    date_of_birth: Option<NaiveDate>,
    password_hash: Option<String>,
) -> Result<SignupOutcome> {
    let query = format!(
        r"
        INSERT INTO users (email, name, date_of_birth, password_hash)
        VALUES ($1, $2, $3, $4)
        RETURNING {USER_COLUMNS}
        "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(email)
        .bind(name)
        .bind(date_of_birth)
        .bind(password_hash)
        .fetch_one(pool)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(SignupOutcome::Created(user_from_row(&row))),
        Err(err) if is_unique_violation(&err) => Ok(SignupOutcome::DuplicateEmail),
        Err(err) => Err(err).context("failed to insert user"),
    }
}

/// Flip the verified flag after a successful SIGNUP OTP.
pub(super) async fn mark_verified(pool: &PgPool, email: &str) -> Result<()> {
    let query = r"
        UPDATE users
        SET is_verified = TRUE,
            updated_at = NOW()
        WHERE email = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(email)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to mark user verified")?;
    Ok(())
}

/// Create a pre-verified account from a Google identity.
pub(super) async fn insert_google_user(
    pool: &PgPool,
    email: &str,
    name: &str,
    google_id: &str,
    avatar: Option<&str>,
) -> Result<UserRecord> {
    let query = format!(
        r"
        INSERT INTO users (email, name, google_id, avatar, is_verified)
        VALUES ($1, $2, $3, $4, TRUE)
        RETURNING {USER_COLUMNS}
        "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(email)
        .bind(name)
        .bind(google_id)
        .bind(avatar)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to insert google user")?;
    Ok(user_from_row(&row))
}

/// Attach a Google identity to an existing account. The stored avatar is only
/// replaced when the credential carries one.
pub(super) async fn link_google_identity(
    pool: &PgPool,
    user_id: Uuid,
    google_id: &str,
    avatar: Option<&str>,
) -> Result<Option<UserRecord>> {
    let query = format!(
        r"
        UPDATE users
        SET google_id = $2,
            avatar = COALESCE($3, avatar),
            is_verified = TRUE,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {USER_COLUMNS}
        "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .bind(google_id)
        .bind(avatar)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to link google identity")?;
    Ok(row.as_ref().map(user_from_row))
}

/// Partial profile update; absent fields keep their stored values.
pub(crate) async fn update_profile(
    pool: &PgPool,
    user_id: Uuid,
    name: Option<String>,
    date_of_birth: Option<NaiveDate>,
    avatar: Option<String>,
) -> Result<Option<UserRecord>> {
    let query = format!(
        r"
        UPDATE users
        SET name = COALESCE($2, name),
            date_of_birth = COALESCE($3, date_of_birth),
            avatar = COALESCE($4, avatar),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {USER_COLUMNS}
        "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .bind(name)
        .bind(date_of_birth)
        .bind(avatar)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to update profile")?;
    Ok(row.as_ref().map(user_from_row))
}

/// Delete the account; owned notes cascade at the database level.
pub(crate) async fn delete_user(pool: &PgPool, user_id: Uuid) -> Result<bool> {
    let query = "DELETE FROM users WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete user")?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signup_outcome_debug_names() {
        assert_eq!(
            format!("{:?}", SignupOutcome::DuplicateEmail),
            "DuplicateEmail"
        );
    }

    #[test]
    fn user_record_holds_values() {
        let now = Utc::now();
        let record = UserRecord {
            id: Uuid::nil(),
            email: "alice@example.com".to_string(),
            name: "Alice".to_string(),
            date_of_birth: None,
            password_hash: None,
            google_id: None,
            avatar: None,
            is_verified: false,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(record.id, Uuid::nil());
        assert!(!record.is_verified);
        assert!(record.password_hash.is_none());
    }
}
