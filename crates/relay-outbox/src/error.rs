//! Outbox error types.

use thiserror::Error;

/// Outbox error type.
///
/// Delivery failures are not errors: they are captured in a
/// [`DeliveryOutcome`](crate::DeliveryOutcome) and contained inside a drain.
#[derive(Error, Debug)]
pub enum OutboxError {
    /// Durable read or write failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Snapshot could not be encoded or decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Snapshot was replaced by another writer since it was read
    #[error("Version conflict on queue {queue}: expected version {expected}")]
    VersionConflict { queue: String, expected: u64 },

    /// Invalid configuration at construction time
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The actor owning the queue is no longer running
    #[error("Queue actor stopped: {0}")]
    ActorStopped(String),
}

impl OutboxError {
    /// Whether this error comes from the durable store.
    ///
    /// Callers map these to "event not accepted" / 5xx.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            OutboxError::Storage(_)
                | OutboxError::Sqlite(_)
                | OutboxError::Json(_)
                | OutboxError::VersionConflict { .. }
        )
    }
}

impl From<tokio_rusqlite::Error> for OutboxError {
    fn from(e: tokio_rusqlite::Error) -> Self {
        match e {
            tokio_rusqlite::Error::Rusqlite(e) => OutboxError::Sqlite(e),
            other => OutboxError::Storage(other.to_string()),
        }
    }
}

/// Result type alias using OutboxError.
pub type OutboxResult<T> = Result<T, OutboxError>;
