//! API handlers and the shared response envelope.
//!
//! Every endpoint answers with the same JSON envelope:
//! `{success, message, data?, error?}`. Handlers translate domain outcomes to
//! HTTP status codes locally; unexpected errors are logged and become a
//! generic 500 so the process never crashes on a request.

pub mod auth;
pub mod health;
pub mod notes;
pub mod root;
pub mod users;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

/// Response envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(message: &str, data: T) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            data: Some(data),
            error: None,
        }
    }
}

impl Envelope<serde_json::Value> {
    pub fn message_only(message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            data: None,
            error: None,
        }
    }

    pub fn rejection(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
            data: None,
            error: None,
        }
    }
}

/// Successful response with a payload.
pub fn success<T: Serialize>(status: StatusCode, message: &str, data: T) -> Response {
    (status, Json(Envelope::ok(message, data))).into_response()
}

/// Successful response with no payload.
pub fn success_empty(message: &str) -> Response {
    (StatusCode::OK, Json(Envelope::message_only(message))).into_response()
}

/// Client-caused failure (validation, auth, not-found, conflict).
pub fn failure(status: StatusCode, message: &str) -> Response {
    (status, Json(Envelope::rejection(message))).into_response()
}

/// Unexpected server fault: log it and answer with a generic message.
/// Error detail is only surfaced outside release builds.
pub fn fault(message: &str, err: &anyhow::Error) -> Response {
    error!("{message}: {err:#}");
    let envelope = Envelope::<serde_json::Value> {
        success: false,
        message: message.to_string(),
        data: None,
        error: cfg!(debug_assertions).then(|| format!("{err:#}")),
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(envelope)).into_response()
}
