//! Event module - append-only audit trail

use crate::ItemId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of change an event records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Snapshot created on first reference
    Created,
    /// Generic partial update
    Upsert,
    /// Batch update (seeding, reconciliation)
    BulkUpdate,
    /// A source attempt started
    SourceAttempted,
    /// A source attempt finished
    SourceOutcome,
    /// An engine finished
    ExtractionOutcome,
    /// Retry counter incremented
    Retry,
    /// Per-item error recorded
    Error,
    /// Explicit operator reset
    Reset,
}

impl EventKind {
    /// Get the persisted name
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Upsert => "upsert",
            EventKind::BulkUpdate => "bulk_update",
            EventKind::SourceAttempted => "source_attempted",
            EventKind::SourceOutcome => "source_outcome",
            EventKind::ExtractionOutcome => "extraction_outcome",
            EventKind::Retry => "retry",
            EventKind::Error => "error",
            EventKind::Reset => "reset",
        }
    }

    /// Parse a persisted name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(EventKind::Created),
            "upsert" => Some(EventKind::Upsert),
            "bulk_update" => Some(EventKind::BulkUpdate),
            "source_attempted" => Some(EventKind::SourceAttempted),
            "source_outcome" => Some(EventKind::SourceOutcome),
            "extraction_outcome" => Some(EventKind::ExtractionOutcome),
            "retry" => Some(EventKind::Retry),
            "error" => Some(EventKind::Error),
            "reset" => Some(EventKind::Reset),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable audit record; never mutated or deleted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Auto-increment id assigned by the store
    pub id: i64,

    /// Item the event belongs to
    pub item_id: ItemId,

    /// What happened
    pub kind: EventKind,

    /// Status before the change
    pub status_from: Option<String>,

    /// Status after the change
    pub status_to: Option<String>,

    /// Free-form detail
    pub message: Option<String>,

    /// When it was recorded
    pub created_at: DateTime<Utc>,
}
