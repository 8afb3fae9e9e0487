//! Note endpoints.
//!
//! All operations require an authenticated principal and are scoped to that
//! principal's id. A note id belonging to another user behaves exactly like a
//! missing id (404), so note ids cannot be probed across accounts.

mod storage;
pub(crate) mod types;

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use axum::Json;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::handlers::{failure, fault, success, success_empty};

use super::auth::principal::require_auth;
use super::auth::AuthState;
use types::{valid_title, CreateNoteRequest, NotePayload, UpdateNoteRequest};

#[utoipa::path(
    get,
    path = "/notes",
    responses(
        (status = 200, description = "Notes for the authenticated user", body = [NotePayload]),
        (status = 401, description = "Missing or invalid token")
    ),
    tag = "notes"
)]
pub async fn list_notes(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    match storage::list_notes(&pool, principal.user_id).await {
        Ok(notes) => {
            let notes: Vec<NotePayload> = notes.into_iter().map(NotePayload::from).collect();
            success(StatusCode::OK, "Notes retrieved successfully", notes)
        }
        Err(err) => fault("Failed to retrieve notes", &err.into()),
    }
}

#[utoipa::path(
    get,
    path = "/notes/{id}",
    params(("id" = String, Path, description = "Note id")),
    responses(
        (status = 200, description = "Note found", body = NotePayload),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Note not found")
    ),
    tag = "notes"
)]
pub async fn get_note(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    let Ok(note_id) = Uuid::parse_str(id.trim()) else {
        return failure(StatusCode::NOT_FOUND, "Note not found");
    };

    match storage::fetch_note(&pool, principal.user_id, note_id).await {
        Ok(Some(note)) => success(
            StatusCode::OK,
            "Note retrieved successfully",
            NotePayload::from(note),
        ),
        Ok(None) => failure(StatusCode::NOT_FOUND, "Note not found"),
        Err(err) => fault("Failed to retrieve note", &err.into()),
    }
}

#[utoipa::path(
    post,
    path = "/notes",
    request_body = CreateNoteRequest,
    responses(
        (status = 201, description = "Note created", body = NotePayload),
        (status = 400, description = "Invalid note payload"),
        (status = 401, description = "Missing or invalid token")
    ),
    tag = "notes"
)]
pub async fn create_note(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<CreateNoteRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    let Some(Json(request)) = payload else {
        return failure(StatusCode::BAD_REQUEST, "Missing payload");
    };

    let title = request.title.trim().to_string();
    if !valid_title(&title) {
        return failure(
            StatusCode::BAD_REQUEST,
            "Title must be between 1 and 200 characters",
        );
    }

    let completed = request.completed.unwrap_or(false);
    match storage::insert_note(
        &pool,
        principal.user_id,
        &title,
        request.content.as_deref(),
        completed,
    )
    .await
    {
        Ok(note) => success(
            StatusCode::CREATED,
            "Note created successfully",
            NotePayload::from(note),
        ),
        Err(err) => fault("Failed to create note", &err.into()),
    }
}

#[utoipa::path(
    put,
    path = "/notes/{id}",
    params(("id" = String, Path, description = "Note id")),
    request_body = UpdateNoteRequest,
    responses(
        (status = 200, description = "Note updated", body = NotePayload),
        (status = 400, description = "Empty or invalid update"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Note not found")
    ),
    tag = "notes"
)]
pub async fn update_note(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<UpdateNoteRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    let Some(Json(request)) = payload else {
        return failure(StatusCode::BAD_REQUEST, "Missing payload");
    };

    if request.is_empty() {
        return failure(
            StatusCode::BAD_REQUEST,
            "At least one field is required",
        );
    }

    let title = match request.title {
        Some(title) => {
            let title = title.trim().to_string();
            if !valid_title(&title) {
                return failure(
                    StatusCode::BAD_REQUEST,
                    "Title must be between 1 and 200 characters",
                );
            }
            Some(title)
        }
        None => None,
    };

    let Ok(note_id) = Uuid::parse_str(id.trim()) else {
        return failure(StatusCode::NOT_FOUND, "Note not found");
    };

    match storage::update_note(
        &pool,
        principal.user_id,
        note_id,
        title,
        request.content,
        request.completed,
    )
    .await
    {
        Ok(Some(note)) => success(
            StatusCode::OK,
            "Note updated successfully",
            NotePayload::from(note),
        ),
        Ok(None) => failure(StatusCode::NOT_FOUND, "Note not found"),
        Err(err) => fault("Failed to update note", &err.into()),
    }
}

#[utoipa::path(
    delete,
    path = "/notes/{id}",
    params(("id" = String, Path, description = "Note id")),
    responses(
        (status = 200, description = "Note deleted"),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Note not found")
    ),
    tag = "notes"
)]
pub async fn delete_note(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    let Ok(note_id) = Uuid::parse_str(id.trim()) else {
        return failure(StatusCode::NOT_FOUND, "Note not found");
    };

    match storage::delete_note(&pool, principal.user_id, note_id).await {
        Ok(true) => success_empty("Note deleted successfully"),
        Ok(false) => failure(StatusCode::NOT_FOUND, "Note not found"),
        Err(err) => fault("Failed to delete note", &err.into()),
    }
}
