//! Gateway errors and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use relay_outbox::OutboxError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors raised while building the gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Outbox error: {0}")]
    Outbox(#[from] OutboxError),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Errors returned by request handlers.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The queue name in the path is not a valid queue key.
    #[error("invalid queue: {0}")]
    InvalidQueue(String),

    /// The queue could not be read or written.
    #[error(transparent)]
    Outbox(#[from] OutboxError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::InvalidQueue(queue) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid queue", "queue": queue })),
            )
                .into_response(),
            ApiError::Outbox(e) => {
                error!(error = %e, "Queue operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "storage error" })),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let invalid = ApiError::InvalidQueue(" ".into()).into_response();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let storage = ApiError::Outbox(OutboxError::Storage("disk".into())).into_response();
        assert_eq!(storage.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
