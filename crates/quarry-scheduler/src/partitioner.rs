//! Item classification
//!
//! [`classify`] is a pure decision table over [`ItemFacts`]; the
//! [`Partitioner`] gathers those facts from the state store and the
//! artifact directory. The raw artifact gets the strict header/trailer
//! check; result files only an existence check.

use crate::error::storage;
use crate::SchedulerError;
use quarry_acquire::validate::{exists_nonempty, passes_strict_check};
use quarry_domain::traits::StateStore;
use quarry_domain::{ArtifactLayout, ItemId, Snapshot, Status};
use serde::Serialize;
use tracing::{debug, warn};

/// What a run should do with an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Raw artifact must be acquired first
    NeedsAcquisition,
    /// Raw artifact is on disk; only extraction is left
    NeedsExtractionOnly,
    /// Requested extraction succeeded and its result exists
    Complete,
    /// Out of retry budget; skipped until reset
    Exhausted,
}

impl Classification {
    /// Stable lowercase label
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::NeedsAcquisition => "needs_acquisition",
            Classification::NeedsExtractionOnly => "needs_extraction_only",
            Classification::Complete => "complete",
            Classification::Exhausted => "exhausted",
        }
    }

    /// Whether workers have anything to do
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            Classification::NeedsAcquisition | Classification::NeedsExtractionOnly
        )
    }
}

/// Retry budgets per stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudgets {
    /// Budget once every source has failed
    pub acquisition: u32,
    /// Budget once the requested engine has failed
    pub extraction: u32,
}

/// Inputs to the decision table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ItemFacts {
    /// Every configured source attempted without success
    pub all_sources_failed: bool,
    /// Current retry counter
    pub retry_count: u32,
    /// An engine of the requested chain reports success
    pub extracted: bool,
    /// The result file of that engine exists and is non-empty
    pub result_exists: bool,
    /// The requested engine reports failure
    pub requested_failed: bool,
    /// The raw artifact passes the strict format check
    pub raw_valid: bool,
}

/// Classify an item; rules are evaluated in order and the first match wins
///
/// # Examples
///
/// ```
/// use quarry_scheduler::{classify, Classification, ItemFacts, RetryBudgets};
///
/// let budgets = RetryBudgets { acquisition: 3, extraction: 3 };
/// let facts = ItemFacts { raw_valid: true, ..Default::default() };
/// assert_eq!(classify(&facts, budgets), Classification::NeedsExtractionOnly);
/// ```
pub fn classify(facts: &ItemFacts, budgets: RetryBudgets) -> Classification {
    if facts.all_sources_failed && facts.retry_count >= budgets.acquisition {
        Classification::Exhausted
    } else if facts.extracted && facts.result_exists {
        Classification::Complete
    } else if facts.requested_failed && facts.retry_count >= budgets.extraction {
        Classification::Exhausted
    } else if facts.raw_valid {
        Classification::NeedsExtractionOnly
    } else {
        Classification::NeedsAcquisition
    }
}

/// One unit of work handed to the pool
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    /// Item to process
    pub id: ItemId,
    /// Why it is being processed
    pub class: Classification,
    /// Snapshot at classification time
    pub snapshot: Snapshot,
}

/// Items of one run, split by classification
#[derive(Debug, Clone, Default)]
pub struct Partition {
    /// Items for the worker pool, in input order
    pub jobs: Vec<Job>,
    /// Items skipped as complete
    pub complete: Vec<ItemId>,
    /// Items skipped as exhausted
    pub exhausted: Vec<ItemId>,
}

impl Partition {
    /// Number of items needing acquisition
    pub fn needs_acquisition(&self) -> usize {
        self.count(Classification::NeedsAcquisition)
    }

    /// Number of items needing extraction only
    pub fn needs_extraction_only(&self) -> usize {
        self.count(Classification::NeedsExtractionOnly)
    }

    fn count(&self, class: Classification) -> usize {
        self.jobs.iter().filter(|j| j.class == class).count()
    }
}

/// Gathers facts for items and classifies them
pub struct Partitioner<'a, S: StateStore> {
    store: &'a S,
    layout: &'a ArtifactLayout,
    sources: Vec<String>,
    engines: Vec<String>,
    budgets: RetryBudgets,
}

impl<'a, S: StateStore> Partitioner<'a, S> {
    /// Create a partitioner
    ///
    /// `engines` is the requested engine followed by its fallbacks.
    pub fn new(
        store: &'a S,
        layout: &'a ArtifactLayout,
        sources: Vec<String>,
        engines: Vec<String>,
        budgets: RetryBudgets,
    ) -> Self {
        Self {
            store,
            layout,
            sources,
            engines,
            budgets,
        }
    }

    /// Derive decision inputs for a snapshot
    pub fn facts(&self, snapshot: &Snapshot) -> ItemFacts {
        let id = &snapshot.id;
        let mut facts = ItemFacts {
            all_sources_failed: snapshot.all_sources_failed(self.sources.iter().map(String::as_str)),
            retry_count: snapshot.retry_count,
            raw_valid: passes_strict_check(&self.layout.raw_path(id)),
            ..Default::default()
        };

        for engine in &self.engines {
            if !snapshot.engine_status(engine).is_success() {
                continue;
            }
            let exists = self
                .layout
                .result_path(id, engine)
                .map(|p| exists_nonempty(&p))
                .unwrap_or(false);
            if exists {
                facts.extracted = true;
                facts.result_exists = true;
                break;
            }
            warn!(item = %id, engine = %engine, "success recorded but result missing");
            facts.extracted = true;
        }

        if let Some(requested) = self.engines.first() {
            facts.requested_failed = snapshot.engine_status(requested) == Status::Failure;
        }
        facts
    }

    /// Classify one item, creating its snapshot on first reference
    pub fn classify(&self, id: &ItemId) -> Result<Job, SchedulerError> {
        self.store.ensure(id).map_err(storage)?;
        let snapshot = self
            .store
            .get(id)
            .map_err(storage)?
            .ok_or_else(|| SchedulerError::Storage(format!("snapshot for {} vanished", id)))?;

        let class = classify(&self.facts(&snapshot), self.budgets);
        debug!(item = %id, class = class.as_str(), "classified");
        Ok(Job {
            id: id.clone(),
            class,
            snapshot,
        })
    }

    /// Classify a batch; duplicate ids are processed once
    pub fn partition(&self, ids: &[ItemId]) -> Result<Partition, SchedulerError> {
        let mut partition = Partition::default();
        let mut seen = std::collections::HashSet::new();
        for id in ids {
            if !seen.insert(id) {
                continue;
            }
            let job = self.classify(id)?;
            match job.class {
                Classification::Complete => partition.complete.push(job.id),
                Classification::Exhausted => partition.exhausted.push(job.id),
                _ => partition.jobs.push(job),
            }
        }
        Ok(partition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUDGETS: RetryBudgets = RetryBudgets {
        acquisition: 3,
        extraction: 2,
    };

    #[test]
    fn test_exhausted_at_acquisition_budget() {
        let facts = ItemFacts {
            all_sources_failed: true,
            retry_count: 3,
            ..Default::default()
        };
        assert_eq!(classify(&facts, BUDGETS), Classification::Exhausted);

        let facts = ItemFacts {
            retry_count: 2,
            ..facts
        };
        assert_eq!(classify(&facts, BUDGETS), Classification::NeedsAcquisition);
    }

    #[test]
    fn test_exhaustion_wins_over_success() {
        let facts = ItemFacts {
            all_sources_failed: true,
            retry_count: 3,
            extracted: true,
            result_exists: true,
            ..Default::default()
        };
        assert_eq!(classify(&facts, BUDGETS), Classification::Exhausted);
    }

    #[test]
    fn test_complete_requires_result_file() {
        let facts = ItemFacts {
            extracted: true,
            result_exists: true,
            ..Default::default()
        };
        assert_eq!(classify(&facts, BUDGETS), Classification::Complete);

        let drifted = ItemFacts {
            result_exists: false,
            raw_valid: true,
            ..facts
        };
        assert_eq!(classify(&drifted, BUDGETS), Classification::NeedsExtractionOnly);
    }

    #[test]
    fn test_extraction_budget() {
        let facts = ItemFacts {
            requested_failed: true,
            retry_count: 2,
            raw_valid: true,
            ..Default::default()
        };
        assert_eq!(classify(&facts, BUDGETS), Classification::Exhausted);

        let facts = ItemFacts {
            retry_count: 1,
            ..facts
        };
        assert_eq!(classify(&facts, BUDGETS), Classification::NeedsExtractionOnly);
    }

    #[test]
    fn test_fresh_item_needs_acquisition() {
        assert_eq!(
            classify(&ItemFacts::default(), BUDGETS),
            Classification::NeedsAcquisition
        );
    }

    #[test]
    fn test_pending_classes() {
        assert!(Classification::NeedsAcquisition.is_pending());
        assert!(Classification::NeedsExtractionOnly.is_pending());
        assert!(!Classification::Complete.is_pending());
        assert!(!Classification::Exhausted.is_pending());
    }
}
