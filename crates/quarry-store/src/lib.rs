//! Quarry Storage Layer
//!
//! SQLite implementations of the domain's [`StateStore`] and
//! [`ContentStore`] traits.
//!
//! # Architecture
//!
//! - [`SqliteStateStore`]: per-item status tracker and append-only event log.
//!   One connection behind a mutex acts as the single writer; every mutation
//!   is one transaction, so concurrent callers on the same item are
//!   serialized and a failed write never partially applies.
//! - Versioned schema (`PRAGMA user_version`) with explicit migration steps,
//!   see [`migrations`].
//! - [`SqliteContentStore`]: update-by-id adapter over an existing content
//!   table whose schema belongs to someone else.
//!
//! # Examples
//!
//! ```no_run
//! use quarry_domain::{ItemId, traits::StateStore};
//! use quarry_store::SqliteStateStore;
//!
//! let store = SqliteStateStore::open("tracker.db").unwrap();
//! let id = ItemId::parse("10.1234/abc").unwrap();
//! store.mark_source_outcome(&id, "arxiv", true).unwrap();
//! assert!(store.get(&id).unwrap().unwrap().downloaded.is_success());
//! ```
//!
//! [`StateStore`]: quarry_domain::traits::StateStore
//! [`ContentStore`]: quarry_domain::traits::ContentStore

#![warn(missing_docs)]

mod content;
mod error;
pub mod migrations;
mod state;

pub use content::{ContentTable, SqliteContentStore};
pub use error::StoreError;
pub use state::SqliteStateStore;
