//! Quarry Scheduler
//!
//! Classifies items against the state store and the artifact directory,
//! then drives the pending ones through a bounded worker pool.
//!
//! ## Classification
//!
//! Rules are evaluated in order; the first match wins:
//!
//! 1. Every source failed and the acquisition budget is spent: `exhausted`
//! 2. An engine of the requested chain succeeded and its result exists: `complete`
//! 3. The requested engine failed and the extraction budget is spent: `exhausted`
//! 4. A raw artifact passing the strict check is on disk: `needs_extraction_only`
//!
//! A raw file that fails the strict check is left to the source chain,
//! which either keeps it through the lenient check or quarantines it and
//! downloads again.
//! 5. Otherwise: `needs_acquisition`
//!
//! ## Workers
//!
//! Each worker takes the next job from a shared queue, runs the source
//! chain if needed, then the engine chain, updating the state store after
//! each stage. A failing or panicking item is recorded on that item and
//! never stops the pool. Storage failures abort the run.
//!
//! Cancellation is checked before each item; in-flight items finish.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod error;
mod partitioner;
mod scheduler;
mod summary;
mod worker;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use partitioner::{classify, Classification, ItemFacts, Job, Partition, Partitioner, RetryBudgets};
pub use scheduler::Scheduler;
pub use summary::RunSummary;
pub use worker::{ItemOutcome, ItemProcessor};
