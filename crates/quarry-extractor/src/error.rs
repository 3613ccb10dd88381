//! Error types for the Extractor

use thiserror::Error;

/// Errors that can occur during extraction
#[derive(Error, Debug)]
pub enum ExtractorError {
    /// Engine ran but reported failure
    #[error("Engine {engine} failed: {message}")]
    Engine {
        /// Engine name
        engine: String,
        /// Failure detail
        message: String,
    },

    /// Engine did not finish in time
    #[error("Engine {0} timed out after {1}s")]
    Timeout(String, u64),

    /// Engine output parsed but did not clear the content threshold
    #[error("Result below content threshold: {0}")]
    BelowThreshold(String),

    /// Engine output is not a recognized document layout
    #[error("Parse error: {0}")]
    Parse(String),

    /// Raw artifact to extract from is not on disk
    #[error("Raw artifact missing: {0}")]
    MissingArtifact(String),

    /// Raw artifact does not start with the PDF magic number
    #[error("Raw artifact is not a PDF: {0}")]
    NotPdf(String),

    /// Artifact I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for ExtractorError {
    fn from(e: serde_json::Error) -> Self {
        ExtractorError::Parse(e.to_string())
    }
}

impl ExtractorError {
    /// Whether this is an artifact I/O failure rather than an engine outcome
    pub fn is_storage(&self) -> bool {
        matches!(self, ExtractorError::Io(_))
    }
}
