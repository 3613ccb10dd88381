//! Reconciliation report

use quarry_domain::ItemId;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Kind of drift found between the tracker, the artifacts and the content
/// database
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    /// Artifact on disk for an item the tracker has never seen
    Untracked,
    /// Valid artifact but the tracker does not record success
    WrongStatus,
    /// Tracker records success but the artifact is missing or invalid
    FalseSuccess,
    /// Artifact fails validation
    InvalidArtifact,
    /// Content database is missing extracted content
    StaleContent,
}

impl DiscrepancyKind {
    /// Stable lowercase label
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscrepancyKind::Untracked => "untracked",
            DiscrepancyKind::WrongStatus => "wrong_status",
            DiscrepancyKind::FalseSuccess => "false_success",
            DiscrepancyKind::InvalidArtifact => "invalid_artifact",
            DiscrepancyKind::StaleContent => "stale_content",
        }
    }
}

/// One finding of a pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discrepancy {
    /// Item concerned
    pub id: ItemId,
    /// What is wrong
    pub kind: DiscrepancyKind,
    /// Artifact concerned, if any
    pub path: Option<PathBuf>,
    /// Human-readable detail
    pub detail: String,
}

/// Outcome of one reconciliation pass
///
/// Mutation counters only count changes that were applied; a check-only
/// pass leaves them at zero and lists what it found in `discrepancies`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    /// Whether the pass was check-only
    pub check_only: bool,

    /// Items examined
    pub items_checked: usize,

    /// Tracker flags raised to success
    pub upgraded: usize,

    /// Tracker flags lowered from success
    pub downgraded: usize,

    /// Artifacts moved to quarantine
    pub quarantined: usize,

    /// Content database rows updated
    pub content_updated: usize,

    /// Raw artifacts kept only by the lenient check
    pub lenient_accepted: usize,

    /// Items with content but no content database row
    pub not_in_content_db: usize,

    /// Everything the pass found
    pub discrepancies: Vec<Discrepancy>,
}

impl ReconcileReport {
    /// Create an empty report
    pub fn new(check_only: bool) -> Self {
        Self {
            check_only,
            ..Self::default()
        }
    }

    /// Record a finding
    pub fn record(&mut self, id: &ItemId, kind: DiscrepancyKind, path: Option<PathBuf>, detail: impl Into<String>) {
        self.discrepancies.push(Discrepancy {
            id: id.clone(),
            kind,
            path,
            detail: detail.into(),
        });
    }

    /// Total applied mutations
    pub fn mutations(&self) -> usize {
        self.upgraded + self.downgraded + self.quarantined + self.content_updated
    }

    /// Whether nothing was found
    pub fn is_clean(&self) -> bool {
        self.discrepancies.is_empty()
    }

    /// Findings per kind
    pub fn counts(&self) -> BTreeMap<DiscrepancyKind, usize> {
        let mut counts = BTreeMap::new();
        for d in &self.discrepancies {
            *counts.entry(d.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Add another pass's counters to this one
    pub fn merge(&mut self, other: &ReconcileReport) {
        self.items_checked += other.items_checked;
        self.upgraded += other.upgraded;
        self.downgraded += other.downgraded;
        self.quarantined += other.quarantined;
        self.content_updated += other.content_updated;
        self.lenient_accepted += other.lenient_accepted;
        self.not_in_content_db += other.not_in_content_db;
        self.discrepancies.extend(other.discrepancies.iter().cloned());
    }

    /// Generate a summary report
    pub fn summary(&self) -> String {
        let mut lines = vec![
            if self.check_only {
                "Reconciliation Check".to_string()
            } else {
                "Reconciliation Report".to_string()
            },
            "======================".to_string(),
            format!("Items checked: {}", self.items_checked),
        ];

        if !self.check_only {
            lines.push(format!("Upgraded: {}", self.upgraded));
            lines.push(format!("Downgraded: {}", self.downgraded));
            lines.push(format!("Quarantined: {}", self.quarantined));
            lines.push(format!("Content updated: {}", self.content_updated));
        }
        lines.push(format!("Lenient accepts: {}", self.lenient_accepted));
        lines.push(format!("Not in content database: {}", self.not_in_content_db));

        if !self.discrepancies.is_empty() {
            lines.push(String::new());
            lines.push("Discrepancies:".to_string());
            for (kind, count) in self.counts() {
                lines.push(format!("  {}: {}", kind.as_str(), count));
            }
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ItemId {
        ItemId::parse(s).unwrap()
    }

    #[test]
    fn test_counts_by_kind() {
        let mut report = ReconcileReport::new(true);
        report.record(&id("10.1/a"), DiscrepancyKind::FalseSuccess, None, "grobid");
        report.record(&id("10.1/b"), DiscrepancyKind::FalseSuccess, None, "fast");
        report.record(&id("10.1/b"), DiscrepancyKind::Untracked, None, "raw");

        let counts = report.counts();
        assert_eq!(counts[&DiscrepancyKind::FalseSuccess], 2);
        assert_eq!(counts[&DiscrepancyKind::Untracked], 1);
        assert!(!report.is_clean());
        assert_eq!(report.mutations(), 0);
    }

    #[test]
    fn test_merge() {
        let mut total = ReconcileReport::default();
        let mut pass = ReconcileReport::default();
        pass.upgraded = 2;
        pass.quarantined = 1;
        total.merge(&pass);
        total.merge(&pass);
        assert_eq!(total.upgraded, 4);
        assert_eq!(total.mutations(), 6);
    }

    #[test]
    fn test_summary_hides_mutations_when_checking() {
        let report = ReconcileReport::new(true);
        let summary = report.summary();
        assert!(summary.starts_with("Reconciliation Check"));
        assert!(!summary.contains("Upgraded"));
    }
}
