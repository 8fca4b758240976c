//! Error types for the Tollgate service.

use thiserror::Error;

/// Main error type for Tollgate operations.
#[derive(Error, Debug)]
pub enum TollgateError {
    /// The client has exhausted its permit bucket. Expected during normal
    /// operation and surfaced to clients as HTTP 429.
    #[error("Too Many Requests")]
    TooManyRequests,

    /// The container could not allocate or store a new limiter entry
    #[error("Failed to create limiter entry: {0}")]
    Creation(String),

    /// Storage backend errors during has/consume/delete
    #[error("Storage backend error: {0}")]
    Backend(#[from] redis::RedisError),

    /// Malformed limiter snapshot in the remote backend
    #[error("Snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TollgateError {
    /// Whether this error is the expected admission rejection rather than
    /// an operational failure.
    pub fn is_rejection(&self) -> bool {
        matches!(self, TollgateError::TooManyRequests)
    }
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;
