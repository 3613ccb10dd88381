//! Error types for domain values

use thiserror::Error;

/// Errors raised while constructing domain values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Nothing was left of an identifier after normalization
    #[error("Identifier is empty after normalization: {0:?}")]
    EmptyId(String),
}
