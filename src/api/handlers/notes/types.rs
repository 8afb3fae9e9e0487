//! Request/response types for note endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::storage::NoteRecord;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NotePayload {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub completed: bool,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<NoteRecord> for NotePayload {
    fn from(record: NoteRecord) -> Self {
        Self {
            id: record.id.to_string(),
            title: record.title,
            content: record.content,
            completed: record.completed,
            user_id: record.user_id.to_string(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateNoteRequest {
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNoteRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
}

impl UpdateNoteRequest {
    /// An update must name at least one field.
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.completed.is_none()
    }
}

/// Note titles must be 1..=200 characters after trimming.
pub(super) fn valid_title(title: &str) -> bool {
    let len = title.trim().chars().count();
    (1..=200).contains(&len)
}
