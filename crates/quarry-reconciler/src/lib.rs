//! Quarry Reconciler
//!
//! Repairs drift between the state tracker, the artifact directories and the
//! downstream content database.
//!
//! # Overview
//!
//! The artifact directories are the system of record; the tracker is a
//! derived index. Drift comes from files deleted or written out of band and
//! from runs that crashed mid-write. A pass:
//! - **Upgrades** tracker flags for valid artifacts and sets `has_content`
//! - **Downgrades** successes whose artifact is missing or invalid back to
//!   `unknown`, so the scheduler picks the item up again
//! - **Quarantines** artifacts failing validation (moved, never deleted)
//! - **Fills** empty content database fields from the best extracted result,
//!   replacing lower-fidelity content when a better engine produced one
//!
//! Raw artifacts failing strict validation get a lenient second look when a
//! lenient engine is configured; those acceptances are logged on the
//! `quarry::lenient` target and counted in the report.
//!
//! Passes are idempotent: a second pass over unchanged directories performs
//! no mutations.
//!
//! # Usage
//!
//! ## One-time Pass
//!
//! ```no_run
//! use quarry_extractor::{Extractor, ExtractorConfig};
//! use quarry_reconciler::{Reconciler, ReconcilerConfig};
//! use quarry_store::{ContentTable, SqliteContentStore, SqliteStateStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(SqliteStateStore::open("quarry.db")?);
//! let content = Arc::new(SqliteContentStore::open("papers.db", ContentTable::default())?);
//! let extractor = Arc::new(Extractor::from_config(ExtractorConfig::default(), "papers", "output")?);
//!
//! let reconciler = Reconciler::new(ReconcilerConfig::default(), store, extractor)?
//!     .with_content(content);
//! let report = reconciler.reconcile().await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Watch Mode
//!
//! [`ReconcilerWorker`] runs passes at `sweep_interval_minutes` until Ctrl+C.
//!
//! # Configuration
//!
//! ```toml
//! [reconciler]
//! check_only = false
//! quarantine = true
//! update_content = true
//! lenient = true
//! sweep_interval_minutes = 60
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod content;
mod error;
mod reconciler;
mod report;
mod worker;

pub use config::ReconcilerConfig;
pub use content::plan_content_update;
pub use error::ReconcilerError;
pub use reconciler::Reconciler;
pub use report::{Discrepancy, DiscrepancyKind, ReconcileReport};
pub use worker::ReconcilerWorker;
