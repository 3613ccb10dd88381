//! Trait definitions for external interactions
//!
//! These traits define the boundaries between pipeline logic and
//! infrastructure. Implementations live in other crates.

use crate::{Event, ItemId, Section, Snapshot, SnapshotUpdate};
use std::collections::BTreeMap;

/// Durable per-item status tracker plus append-only event log
///
/// Implemented by the infrastructure layer (quarry-store).
///
/// Every mutation is one atomic transaction and appends an [`Event`].
/// Methods take `&self`: concurrency control lives inside the store, and one
/// instance is shared by every worker.
pub trait StateStore: Send + Sync {
    /// Error type for store operations
    type Error: std::error::Error + Send + Sync + 'static;

    /// Current snapshot, `None` when the item was never referenced
    fn get(&self, id: &ItemId) -> Result<Option<Snapshot>, Self::Error>;

    /// Create the default snapshot if absent; returns whether it was created
    fn ensure(&self, id: &ItemId) -> Result<bool, Self::Error>;

    /// Create-or-update one item
    fn upsert(&self, update: &SnapshotUpdate) -> Result<(), Self::Error>;

    /// Create-or-update many items in a single transaction
    fn bulk_upsert(&self, updates: &[SnapshotUpdate]) -> Result<usize, Self::Error>;

    /// Record that a source attempt started
    fn mark_source_attempted(&self, id: &ItemId, source: &str) -> Result<(), Self::Error>;

    /// Record a source outcome; success also sets `downloaded` and the winning source
    fn mark_source_outcome(&self, id: &ItemId, source: &str, success: bool) -> Result<(), Self::Error>;

    /// Record an engine outcome and its timestamp
    fn mark_extraction_outcome(&self, id: &ItemId, engine: &str, success: bool) -> Result<(), Self::Error>;

    /// Record the latest per-item error
    fn record_error(&self, id: &ItemId, message: &str) -> Result<(), Self::Error>;

    /// Atomically increment the retry counter, returning the new value
    fn increment_retry(&self, id: &ItemId) -> Result<u32, Self::Error>;

    /// Clear the snapshot back to defaults and log a `reset` event
    fn reset(&self, id: &ItemId) -> Result<(), Self::Error>;

    /// All tracked item ids, sorted
    fn list_ids(&self) -> Result<Vec<ItemId>, Self::Error>;

    /// Event history for an item, oldest first
    fn events(&self, id: &ItemId) -> Result<Vec<Event>, Self::Error>;

    /// Aggregate counts
    fn stats(&self) -> Result<StoreStats, Self::Error>;
}

/// Aggregate counts over the state store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Tracked items
    pub items: usize,

    /// Items with `downloaded = success`
    pub downloaded: usize,

    /// Items with `has_content = success`
    pub with_content: usize,

    /// Per-engine `(success, failure)` counts
    pub engines: BTreeMap<String, (usize, usize)>,

    /// Items with a non-zero retry counter
    pub retried: usize,
}

/// Row of the downstream content database
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentRecord {
    /// Stored abstract
    pub abstract_text: Option<String>,

    /// Stored sections as raw JSON text
    pub sections: Option<String>,

    /// Stored parsing status string
    pub parsing_status: Option<String>,
}

impl ContentRecord {
    /// Whether the abstract is empty or blank
    pub fn abstract_is_empty(&self) -> bool {
        is_blank(self.abstract_text.as_deref())
    }

    /// Whether the sections are empty or blank
    pub fn sections_are_empty(&self) -> bool {
        is_blank(self.sections.as_deref())
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

/// Fields written to the content database; `None` leaves a column alone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentUpdate {
    /// New abstract
    pub abstract_text: Option<String>,

    /// New sections
    pub sections: Option<Vec<Section>>,

    /// New parsing status
    pub parsing_status: Option<String>,
}

impl ContentUpdate {
    /// Whether nothing would be written
    pub fn is_empty(&self) -> bool {
        self.abstract_text.is_none() && self.sections.is_none() && self.parsing_status.is_none()
    }
}

/// Downstream content database (passive collaborator)
///
/// Implemented by the infrastructure layer (quarry-store). Only
/// update-by-id is exposed; rows are never created or deleted.
pub trait ContentStore: Send + Sync {
    /// Error type for content operations
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read a row, `None` when the id is not in the database
    fn get(&self, id: &ItemId) -> Result<Option<ContentRecord>, Self::Error>;

    /// Update a row by id; returns `false` when no row matched
    fn update(&self, id: &ItemId, update: &ContentUpdate) -> Result<bool, Self::Error>;

    /// Every id in the database
    fn list_ids(&self) -> Result<Vec<ItemId>, Self::Error>;
}
