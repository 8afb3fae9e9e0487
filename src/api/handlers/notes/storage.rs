//! Database helpers for notes.
//!
//! Every statement carries the owner's id in its WHERE clause; there is no
//! code path that reads or writes a note without it.

use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub(crate) struct NoteRecord {
    pub id: Uuid,
    pub title: String,
    pub content: Option<String>,
    pub completed: bool,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn note_from_row(row: &PgRow) -> NoteRecord {
    NoteRecord {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        completed: row.get("completed"),
        user_id: row.get("user_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub(super) async fn list_notes(pool: &PgPool, user_id: Uuid) -> Result<Vec<NoteRecord>, sqlx::Error> {
    let rows = sqlx::query(
        r"
        SELECT id, title, content, completed, user_id, created_at, updated_at
        FROM notes
        WHERE user_id = $1
        ORDER BY updated_at DESC
        ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(note_from_row).collect())
}

pub(super) async fn fetch_note(
    pool: &PgPool,
    user_id: Uuid,
    note_id: Uuid,
) -> Result<Option<NoteRecord>, sqlx::Error> {
    let row = sqlx::query(
        r"
        SELECT id, title, content, completed, user_id, created_at, updated_at
        FROM notes
        WHERE id = $1 AND user_id = $2
        ",
    )
    .bind(note_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(note_from_row))
}

pub(super) async fn insert_note(
    pool: &PgPool,
    user_id: Uuid,
    title: &str,
    content: Option<&str>,
    completed: bool,
) -> Result<NoteRecord, sqlx::Error> {
    let row = sqlx::query(
        r"
        INSERT INTO notes (title, content, completed, user_id)
        VALUES ($1, $2, $3, $4)
        RETURNING id, title, content, completed, user_id, created_at, updated_at
        ",
    )
    .bind(title)
    .bind(content)
    .bind(completed)
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(note_from_row(&row))
}

/// Single conditional update: absent fields keep their stored values, and the
/// ownership check rides in the same statement.
pub(super) async fn update_note(
    pool: &PgPool,
    user_id: Uuid,
    note_id: Uuid,
    title: Option<String>,
    content: Option<String>,
    completed: Option<bool>,
) -> Result<Option<NoteRecord>, sqlx::Error> {
    let row = sqlx::query(
        r"
        UPDATE notes
        SET title = COALESCE($3, title),
            content = COALESCE($4, content),
            completed = COALESCE($5, completed),
            updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING id, title, content, completed, user_id, created_at, updated_at
        ",
    )
    .bind(note_id)
    .bind(user_id)
    .bind(title)
    .bind(content)
    .bind(completed)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(note_from_row))
}

pub(super) async fn delete_note(
    pool: &PgPool,
    user_id: Uuid,
    note_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM notes WHERE id = $1 AND user_id = $2")
        .bind(note_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
