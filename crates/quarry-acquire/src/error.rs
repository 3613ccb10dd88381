//! Error types for acquisition

use thiserror::Error;

/// Errors that can occur while acquiring a raw artifact
#[derive(Error, Debug)]
pub enum AcquireError {
    /// Timeout, connection failure, 5xx or 429 after all retries
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// Source answered with a non-retryable HTTP status (404, 403)
    #[error("Rejected by source: {0}")]
    Rejected(String),

    /// Payload is not the expected artifact type
    #[error("Validation failed: {0}")]
    Validation(String),

    /// State store or artifact I/O failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Every configured source failed
    #[error("All {attempted} sources exhausted; last error: {last}")]
    Exhausted {
        /// Sources tried
        attempted: usize,
        /// Last per-source failure
        last: String,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AcquireError {
    /// Whether the error is worth retrying on the same URL
    pub fn is_transient(&self) -> bool {
        matches!(self, AcquireError::TransientNetwork(_))
    }

    /// Whether the error must abort the run
    pub fn is_storage(&self) -> bool {
        matches!(self, AcquireError::Storage(_))
    }
}
