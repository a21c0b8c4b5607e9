//! Error types for the Routegate service.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::ratelimit::ErrorBody;

/// Main error type for Routegate operations.
#[derive(Error, Debug)]
pub enum RouteGateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Counter store errors (unreachable store, script failures)
    #[error("Store error: {0}")]
    Store(#[from] redis::RedisError),

    /// Rule file parse errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Routegate operations.
pub type Result<T> = std::result::Result<T, RouteGateError>;

impl IntoResponse for RouteGateError {
    fn into_response(self) -> Response {
        // Details stay in the server log.
        error!(error = %self, "Request failed");

        let body = ErrorBody {
            status_code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: "An unexpected error occurred".to_string(),
            extra: None,
            kind: "InternalServerError".to_string(),
        };

        (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response()
    }
}
