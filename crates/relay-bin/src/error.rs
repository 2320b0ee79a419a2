//! Error types for the relay binary.

use thiserror::Error;

/// Relay error type.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration or path error
    #[error(transparent)]
    Config(#[from] relay_config::CoreError),

    /// Queue error
    #[error(transparent)]
    Outbox(#[from] relay_outbox::OutboxError),

    /// Gateway setup error
    #[error(transparent)]
    Gateway(#[from] relay_gateway::GatewayError),

    /// IO error (binding the listener, serving)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON output error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using RelayError.
pub type RelayResult<T> = Result<T, RelayError>;
