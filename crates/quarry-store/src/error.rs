//! Error types for storage operations

use thiserror::Error;

/// Errors that can occur during storage operations
///
/// An unreachable store surfaces as an error; a missing item is `Ok(None)`.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Store cannot be used (poisoned lock, closed connection)
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Invalid data format
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Schema migration failure
    #[error("Migration error: {0}")]
    Migration(String),

    /// Invalid store configuration
    #[error("Configuration error: {0}")]
    Config(String),
}
