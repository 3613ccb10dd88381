//! Per-item processing
//!
//! Runs the source chain when needed, then the engine chain, updating the
//! state store after each stage. Failures of one item become state store
//! records; only storage failures propagate.

use crate::partitioner::{Classification, Job};
use crate::error::storage;
use crate::SchedulerError;
use futures::FutureExt;
use quarry_acquire::{AcquireError, Acquired, SourceChain};
use quarry_domain::traits::StateStore;
use quarry_domain::{ItemId, SnapshotUpdate, Status};
use quarry_extractor::Extractor;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// How one item ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// An engine result was accepted
    Extracted {
        /// Acquisition result; `None` when the raw artifact was already on disk
        acquired: Option<Acquired>,
        /// Engine whose result was accepted
        engine: String,
        /// Whether that result was already on disk
        cache_hit: bool,
    },
    /// Acquisition or every engine failed
    Failed {
        /// Acquisition result, if acquisition succeeded
        acquired: Option<Acquired>,
        /// Last failure
        reason: String,
    },
}

/// Drives one item through acquisition and extraction
pub struct ItemProcessor<S: StateStore> {
    store: Arc<S>,
    chain: SourceChain<S>,
    extractor: Arc<Extractor>,
    engines: Vec<String>,
}

impl<S: StateStore> ItemProcessor<S> {
    /// Create a processor; `engines` is the requested engine then fallbacks
    pub fn new(
        store: Arc<S>,
        chain: SourceChain<S>,
        extractor: Arc<Extractor>,
        engines: Vec<String>,
    ) -> Self {
        Self {
            store,
            chain,
            extractor,
            engines,
        }
    }

    /// Source chain in use
    pub fn chain(&self) -> &SourceChain<S> {
        &self.chain
    }

    /// Extractor in use
    pub fn extractor(&self) -> &Arc<Extractor> {
        &self.extractor
    }

    /// Engine chain in use
    pub fn engines(&self) -> &[String] {
        &self.engines
    }

    /// Process a job, turning a panic into a recorded failure
    ///
    /// A panic counts like any other failed stage: the stage that was
    /// running is marked failed and the retry counter grows, so an item
    /// that always panics reaches its retry budget.
    pub async fn process_guarded(&self, job: &Job) -> Result<ItemOutcome, SchedulerError> {
        let stage = Mutex::new(Stage::initial(job, &self.engines));
        match AssertUnwindSafe(self.run_job(job, &stage)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let reason = format!("worker panicked: {}", panic_message(panic.as_ref()));
                error!(item = %job.id, reason = %reason, "item processing panicked");
                let stage = stage.into_inner().unwrap_or_else(|e| e.into_inner());
                self.panicked(&job.id, stage, &reason)?;
                Ok(ItemOutcome::Failed {
                    acquired: None,
                    reason,
                })
            }
        }
    }

    /// Process a job
    ///
    /// # Errors
    ///
    /// Only storage failures are returned; everything else is recorded on
    /// the item and reported as [`ItemOutcome::Failed`].
    pub async fn process(&self, job: &Job) -> Result<ItemOutcome, SchedulerError> {
        let stage = Mutex::new(Stage::initial(job, &self.engines));
        self.run_job(job, &stage).await
    }

    async fn run_job(&self, job: &Job, stage: &Mutex<Stage>) -> Result<ItemOutcome, SchedulerError> {
        let id = &job.id;
        let acquired = match job.class {
            Classification::NeedsAcquisition => match self.chain.acquire(id).await {
                Ok(acquired) => Some(acquired),
                Err(e) if e.is_storage() => return Err(SchedulerError::Storage(e.to_string())),
                Err(e) => return self.acquisition_failed(id, e),
            },
            Classification::NeedsExtractionOnly => None,
            other => {
                return Err(SchedulerError::Worker(format!(
                    "{} dispatched while {}",
                    id,
                    other.as_str()
                )))
            }
        };
        let downloaded_now = acquired.as_ref().map_or(false, |a| !a.cache_hit);

        let mut last = String::from("no engines configured");
        for engine in &self.engines {
            set_stage(stage, Stage::Extracting(engine.clone()));
            match self.extractor.run(id, engine).await {
                Ok(run) => {
                    let known = run.cache_hit && job.snapshot.engine_status(engine).is_success();
                    if !known {
                        self.store
                            .mark_extraction_outcome(id, engine, true)
                            .map_err(storage)?;
                    }
                    if !downloaded_now && !job.snapshot.downloaded.is_success() {
                        // raw artifact predates the tracker
                        let update = SnapshotUpdate::new(id.clone()).downloaded(Status::Success);
                        self.store.upsert(&update).map_err(storage)?;
                    }
                    info!(item = %id, engine = %engine, cache_hit = run.cache_hit, "item extracted");
                    return Ok(ItemOutcome::Extracted {
                        acquired,
                        engine: engine.clone(),
                        cache_hit: run.cache_hit,
                    });
                }
                Err(e) if e.is_storage() => return Err(SchedulerError::Storage(e.to_string())),
                Err(e) => {
                    warn!(item = %id, engine = %engine, error = %e, "engine failed");
                    self.store
                        .mark_extraction_outcome(id, engine, false)
                        .map_err(storage)?;
                    last = e.to_string();
                }
            }
        }

        let retries = self.store.increment_retry(id).map_err(storage)?;
        self.store.record_error(id, &last).map_err(storage)?;
        debug!(item = %id, retries, "every engine failed");
        Ok(ItemOutcome::Failed {
            acquired,
            reason: last,
        })
    }

    fn acquisition_failed(&self, id: &ItemId, e: AcquireError) -> Result<ItemOutcome, SchedulerError> {
        if matches!(e, AcquireError::Exhausted { .. }) {
            let retries = self.store.increment_retry(id).map_err(storage)?;
            debug!(item = %id, retries, "sources exhausted");
        }
        let reason = e.to_string();
        self.store.record_error(id, &reason).map_err(storage)?;
        Ok(ItemOutcome::Failed {
            acquired: None,
            reason,
        })
    }

    /// Record a panic against the stage that was running
    ///
    /// A panic inside the source chain aborts the whole chain, so every
    /// source that has not succeeded is marked failed.
    fn panicked(&self, id: &ItemId, stage: Stage, reason: &str) -> Result<(), SchedulerError> {
        match stage {
            Stage::Acquiring => {
                let snapshot = self.store.get(id).map_err(storage)?;
                for name in self.chain.source_names() {
                    let state = snapshot.as_ref().map(|s| s.source(&name)).unwrap_or_default();
                    if state.outcome.is_success() {
                        continue;
                    }
                    if !state.attempted {
                        self.store.mark_source_attempted(id, &name).map_err(storage)?;
                    }
                    self.store.mark_source_outcome(id, &name, false).map_err(storage)?;
                }
            }
            Stage::Extracting(engine) => {
                self.store
                    .mark_extraction_outcome(id, &engine, false)
                    .map_err(storage)?;
            }
        }
        let retries = self.store.increment_retry(id).map_err(storage)?;
        self.store.record_error(id, reason).map_err(storage)?;
        debug!(item = %id, retries, "panic recorded");
        Ok(())
    }
}

/// Stage an item is in, kept so a panic can be attributed
#[derive(Debug, Clone, PartialEq, Eq)]
enum Stage {
    Acquiring,
    Extracting(String),
}

impl Stage {
    fn initial(job: &Job, engines: &[String]) -> Self {
        match (job.class, engines.first()) {
            (Classification::NeedsExtractionOnly, Some(engine)) => Stage::Extracting(engine.clone()),
            _ => Stage::Acquiring,
        }
    }
}

fn set_stage(cell: &Mutex<Stage>, stage: Stage) {
    *cell.lock().unwrap_or_else(|e| e.into_inner()) = stage;
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn test_initial_stage_follows_classification() {
        let id = ItemId::parse("10.1/a").unwrap();
        let mut job = Job {
            id: id.clone(),
            class: Classification::NeedsAcquisition,
            snapshot: quarry_domain::Snapshot::new(id, chrono::Utc::now()),
        };
        let engines = vec!["grobid".to_string(), "fast".to_string()];
        assert_eq!(Stage::initial(&job, &engines), Stage::Acquiring);

        job.class = Classification::NeedsExtractionOnly;
        assert_eq!(Stage::initial(&job, &engines), Stage::Extracting("grobid".to_string()));
    }
}
