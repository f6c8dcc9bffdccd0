//! API error types and response handling

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Errors surfaced by the race endpoints
///
/// Each maps to a status code and a `{"error": ...}` body.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or wrong bearer credential
    Unauthorized,
    /// Malformed or missing fields; caller must fix and resubmit
    BadRequest(String),
    /// Persistence failure; the message is the public one, details are logged
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        if status.is_server_error() {
            tracing::error!("API error: {} - {}", status, message);
        } else {
            tracing::warn!("API error: {} - {}", status, message);
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}
