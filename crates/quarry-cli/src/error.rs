//! Error types for the CLI application.

use thiserror::Error;

/// Result type alias for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// State or content database error
    #[error("Storage error: {0}")]
    Store(#[from] quarry_store::StoreError),

    /// Acquisition setup error
    #[error("Acquisition error: {0}")]
    Acquire(#[from] quarry_acquire::AcquireError),

    /// Extractor setup error
    #[error("Extractor error: {0}")]
    Extractor(#[from] quarry_extractor::ExtractorError),

    /// Run aborted
    #[error("Run failed: {0}")]
    Scheduler(#[from] quarry_scheduler::SchedulerError),

    /// Reconciliation aborted
    #[error("Reconciliation failed: {0}")]
    Reconciler(#[from] quarry_reconciler::ReconcilerError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
