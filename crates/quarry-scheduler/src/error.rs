//! Error types for the Scheduler

use thiserror::Error;

/// Errors that abort a run
///
/// Per-item failures never surface here; they are recorded in the state
/// store and counted in the run summary.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// State store or artifact directory failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Worker task failed outside item processing
    #[error("Worker error: {0}")]
    Worker(String),
}

pub(crate) fn storage<E: std::fmt::Display>(e: E) -> SchedulerError {
    SchedulerError::Storage(e.to_string())
}
