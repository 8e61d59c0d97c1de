//! Error types for queue operations

use thiserror::Error;

/// Result type alias for queue operations
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors raised by the queue client and its backends
#[derive(Debug, Error)]
pub enum QueueError {
    /// The backing store could not be reached or rejected the command.
    /// Callers treat this as transient and retry on their own cadence.
    #[error("queue store unavailable: {0}")]
    Unavailable(String),

    /// An item could not be encoded for the store
    #[error("failed to serialize queue item: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl QueueError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
