//! Snapshot module - the one current status row per item

use crate::{ItemId, Status};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-source acquisition state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceState {
    /// Whether this source has been tried for the item
    pub attempted: bool,

    /// Outcome of the latest attempt; `Unknown` while in flight
    pub outcome: Status,
}

impl SourceState {
    /// Attempted and did not succeed
    pub fn is_failed(&self) -> bool {
        self.attempted && !self.outcome.is_success()
    }
}

/// Per-engine extraction state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EngineState {
    /// Latest extraction status
    pub status: Status,

    /// When `status` last changed
    pub updated_at: Option<DateTime<Utc>>,
}

/// Current tracked status of an item
///
/// Absent sources or engines are equivalent to their `Default` state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Item key
    pub id: ItemId,

    /// Per-source state, keyed by source name
    pub sources: BTreeMap<String, SourceState>,

    /// Aggregate acquisition flag
    pub downloaded: Status,

    /// When the raw artifact was first acquired
    pub download_date: Option<DateTime<Utc>>,

    /// Source that produced the raw artifact
    pub download_source: Option<String>,

    /// Per-engine state, keyed by engine name
    pub engines: BTreeMap<String, EngineState>,

    /// Whether extracted content exists for the item
    pub has_content: Status,

    /// Retry counter; only `reset` lowers it
    pub retry_count: u32,

    /// Last recorded per-item error
    pub last_error: Option<String>,

    /// Last mutation time
    pub last_updated: DateTime<Utc>,
}

impl Snapshot {
    /// Default snapshot for a newly referenced item
    pub fn new(id: ItemId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            sources: BTreeMap::new(),
            downloaded: Status::Unknown,
            download_date: None,
            download_source: None,
            engines: BTreeMap::new(),
            has_content: Status::Unknown,
            retry_count: 0,
            last_error: None,
            last_updated: now,
        }
    }

    /// State for a source (default when never touched)
    pub fn source(&self, name: &str) -> SourceState {
        self.sources.get(name).copied().unwrap_or_default()
    }

    /// Status for an engine (unknown when never touched)
    pub fn engine_status(&self, name: &str) -> Status {
        self.engines.get(name).map(|e| e.status).unwrap_or_default()
    }

    /// Whether every named source has been attempted without success
    ///
    /// An empty source list is never "all failed".
    pub fn all_sources_failed<'a, I>(&self, names: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut any = false;
        for name in names {
            any = true;
            if !self.source(name).is_failed() {
                return false;
            }
        }
        any
    }

    /// Compact label used as the prior/new status of generic events
    pub fn phase(&self) -> &'static str {
        if self.engines.values().any(|e| e.status.is_success()) {
            "extracted"
        } else if self.downloaded.is_success() {
            "acquired"
        } else if self.engines.values().any(|e| e.status.is_failure())
            || self.sources.values().any(|s| s.is_failed())
        {
            "failing"
        } else {
            "pending"
        }
    }
}

/// Partial update to one source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePatch {
    /// New `attempted` flag
    pub attempted: Option<bool>,

    /// New outcome
    pub outcome: Option<Status>,
}

/// Partial update applied by `upsert`/`bulk_upsert`
///
/// Only populated fields are written. `retry_count` is applied as
/// `MAX(current, new)` so an upsert can never lower it.
///
/// # Examples
///
/// ```
/// use quarry_domain::{ItemId, SnapshotUpdate, Status};
///
/// let id = ItemId::parse("10.1/a").unwrap();
/// let update = SnapshotUpdate::new(id)
///     .engine("grobid", Status::Success)
///     .has_content(Status::Success);
/// assert!(!update.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotUpdate {
    /// Target item
    pub id: ItemId,

    /// Per-source patches
    pub sources: BTreeMap<String, SourcePatch>,

    /// Per-engine status
    pub engines: BTreeMap<String, Status>,

    /// Aggregate acquisition flag
    pub downloaded: Option<Status>,

    /// Winning source (`Some(None)` clears it)
    pub download_source: Option<Option<String>>,

    /// Content flag
    pub has_content: Option<Status>,

    /// Retry counter floor
    pub retry_count: Option<u32>,

    /// Last error (`Some(None)` clears it)
    pub last_error: Option<Option<String>>,
}

impl SnapshotUpdate {
    /// Start an empty update for an item
    pub fn new(id: ItemId) -> Self {
        Self {
            id,
            sources: BTreeMap::new(),
            engines: BTreeMap::new(),
            downloaded: None,
            download_source: None,
            has_content: None,
            retry_count: None,
            last_error: None,
        }
    }

    /// Set a source's attempted flag
    pub fn source_attempted(mut self, source: impl Into<String>, attempted: bool) -> Self {
        self.sources.entry(source.into()).or_default().attempted = Some(attempted);
        self
    }

    /// Set a source's outcome (also marks it attempted unless unknown)
    pub fn source_outcome(mut self, source: impl Into<String>, outcome: Status) -> Self {
        let patch = self.sources.entry(source.into()).or_default();
        patch.outcome = Some(outcome);
        if outcome != Status::Unknown {
            patch.attempted = Some(true);
        }
        self
    }

    /// Clear a source back to not-attempted
    pub fn clear_source(mut self, source: impl Into<String>) -> Self {
        self.sources.insert(
            source.into(),
            SourcePatch {
                attempted: Some(false),
                outcome: Some(Status::Unknown),
            },
        );
        self
    }

    /// Set an engine status
    pub fn engine(mut self, engine: impl Into<String>, status: Status) -> Self {
        self.engines.insert(engine.into(), status);
        self
    }

    /// Set the aggregate downloaded flag
    pub fn downloaded(mut self, status: Status) -> Self {
        self.downloaded = Some(status);
        self
    }

    /// Set or clear the winning source
    pub fn download_source(mut self, source: Option<String>) -> Self {
        self.download_source = Some(source);
        self
    }

    /// Set the content flag
    pub fn has_content(mut self, status: Status) -> Self {
        self.has_content = Some(status);
        self
    }

    /// Raise the retry counter to at least `count`
    pub fn retry_count(mut self, count: u32) -> Self {
        self.retry_count = Some(count);
        self
    }

    /// Set or clear the last error
    pub fn last_error(mut self, error: Option<String>) -> Self {
        self.last_error = Some(error);
        self
    }

    /// Whether the update writes nothing
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
            && self.engines.is_empty()
            && self.downloaded.is_none()
            && self.download_source.is_none()
            && self.has_content.is_none()
            && self.retry_count.is_none()
            && self.last_error.is_none()
    }

    /// Apply to an in-memory snapshot
    ///
    /// Mirrors what the persistent stores do so callers can preview changes.
    pub fn apply_to(&self, snapshot: &mut Snapshot, now: DateTime<Utc>) {
        for (name, patch) in &self.sources {
            let state = snapshot.sources.entry(name.clone()).or_default();
            if let Some(attempted) = patch.attempted {
                state.attempted = attempted;
            }
            if let Some(outcome) = patch.outcome {
                state.outcome = outcome;
            }
        }
        for (name, status) in &self.engines {
            let state = snapshot.engines.entry(name.clone()).or_default();
            if state.status != *status {
                state.status = *status;
                state.updated_at = Some(now);
            }
        }
        if let Some(downloaded) = self.downloaded {
            if downloaded.is_success() && snapshot.download_date.is_none() {
                snapshot.download_date = Some(now);
            }
            if !downloaded.is_success() {
                snapshot.download_date = None;
            }
            snapshot.downloaded = downloaded;
        }
        if let Some(source) = &self.download_source {
            snapshot.download_source = source.clone();
        }
        if let Some(has_content) = self.has_content {
            snapshot.has_content = has_content;
        }
        if let Some(count) = self.retry_count {
            snapshot.retry_count = snapshot.retry_count.max(count);
        }
        if let Some(error) = &self.last_error {
            snapshot.last_error = error.clone();
        }
        snapshot.last_updated = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> ItemId {
        ItemId::parse("10.1/x").unwrap()
    }

    #[test]
    fn test_all_sources_failed() {
        let mut snap = Snapshot::new(id(), Utc::now());
        assert!(!snap.all_sources_failed(["a", "b"]));
        assert!(!snap.all_sources_failed(std::iter::empty()));

        snap.sources.insert(
            "a".into(),
            SourceState { attempted: true, outcome: Status::Failure },
        );
        assert!(!snap.all_sources_failed(["a", "b"]));

        snap.sources.insert(
            "b".into(),
            SourceState { attempted: true, outcome: Status::Unknown },
        );
        assert!(snap.all_sources_failed(["a", "b"]));
    }

    #[test]
    fn test_apply_retry_never_lowers() {
        let mut snap = Snapshot::new(id(), Utc::now());
        snap.retry_count = 3;
        SnapshotUpdate::new(id()).retry_count(1).apply_to(&mut snap, Utc::now());
        assert_eq!(snap.retry_count, 3);
        SnapshotUpdate::new(id()).retry_count(5).apply_to(&mut snap, Utc::now());
        assert_eq!(snap.retry_count, 5);
    }

    #[test]
    fn test_source_outcome_marks_attempted() {
        let mut snap = Snapshot::new(id(), Utc::now());
        SnapshotUpdate::new(id())
            .source_outcome("arxiv", Status::Failure)
            .apply_to(&mut snap, Utc::now());
        assert!(snap.source("arxiv").attempted);
        assert!(snap.source("arxiv").is_failed());
    }

    #[test]
    fn test_phase_labels() {
        let mut snap = Snapshot::new(id(), Utc::now());
        assert_eq!(snap.phase(), "pending");
        snap.downloaded = Status::Success;
        assert_eq!(snap.phase(), "acquired");
        snap.engines.insert(
            "fast".into(),
            EngineState { status: Status::Success, updated_at: None },
        );
        assert_eq!(snap.phase(), "extracted");
    }
}
