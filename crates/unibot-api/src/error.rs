//! API error types and JSON error response formatting.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use unibot_bot::BotError;
use unibot_chat::ChatError;

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "not_found").
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - missing or invalid parameters.
    BadRequest(String),
    /// 404 Not Found - unknown bot identity or route resource.
    NotFound(String),
    /// 409 Conflict - lifecycle state conflict (already running, still running).
    Conflict(String),
    /// 422 Unprocessable Entity - e.g. a malformed keyword file on reload.
    UnprocessableEntity(String),
    /// 500 Internal Server Error.
    Internal(String),
    /// 504 Gateway Timeout - a worker did not stop in time.
    Timeout {
        message: String,
        details: serde_json::Value,
    },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),
            ApiError::UnprocessableEntity(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "unprocessable_entity",
                msg,
                None,
            ),
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg, None)
            }
            ApiError::Timeout { message, details } => (
                StatusCode::GATEWAY_TIMEOUT,
                "shutdown_timeout",
                message,
                Some(details),
            ),
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<BotError> for ApiError {
    fn from(err: BotError) -> Self {
        let message = err.to_string();
        match err {
            BotError::AlreadyRunning(_) | BotError::StillRunning(_) => ApiError::Conflict(message),
            BotError::UnknownIdentity(_) => ApiError::NotFound(message),
            BotError::ShutdownTimeout { identity, timeout } => ApiError::Timeout {
                message,
                details: serde_json::json!({
                    "identity": identity,
                    "timeout_secs": timeout.as_secs_f64(),
                }),
            },
            BotError::ShutdownIncomplete(ids) => ApiError::Timeout {
                message,
                details: serde_json::json!({ "identities": ids }),
            },
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Keywords(msg) => ApiError::UnprocessableEntity(msg),
            ChatError::EmptyMessage => ApiError::BadRequest(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
