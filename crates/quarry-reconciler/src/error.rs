//! Error types for reconciliation

use quarry_extractor::ExtractorError;
use thiserror::Error;

/// Errors that abort a reconciliation pass
#[derive(Error, Debug)]
pub enum ReconcilerError {
    /// State store error
    #[error("Storage error: {0}")]
    Store(String),

    /// Content database error
    #[error("Content database error: {0}")]
    Content(String),

    /// Artifact directory error
    #[error("Artifact I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<ExtractorError> for ReconcilerError {
    fn from(e: ExtractorError) -> Self {
        match e {
            ExtractorError::Io(e) => ReconcilerError::Io(e),
            other => ReconcilerError::Io(std::io::Error::other(other.to_string())),
        }
    }
}
