//! Quarry CLI library.
//!
//! Configuration loading, command execution and output formatting for the
//! `quarry` binary. Every command opens the stores named in the `[paths]`
//! section and drives one of the library crates: `run` the scheduler,
//! `reconcile` the reconciler, `status`/`reset`/`seed` the state tracker.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;

pub use cli::{Cli, Command};
pub use config::Config;
pub use error::{CliError, Result};
pub use output::Formatter;
