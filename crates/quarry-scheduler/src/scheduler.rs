//! Bounded worker pool over partitioned items

use crate::partitioner::{Job, Partition, Partitioner, RetryBudgets};
use crate::worker::{ItemOutcome, ItemProcessor};
use crate::{RunSummary, SchedulerConfig, SchedulerError};
use quarry_acquire::SourceChain;
use quarry_domain::traits::StateStore;
use quarry_domain::ItemId;
use quarry_extractor::Extractor;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type Report = Result<ItemOutcome, SchedulerError>;

/// Classifies items and drives the pending ones through a fixed-size pool
///
/// Cancellation is cooperative: once the token fires, workers stop taking
/// new items and items already in flight run to completion.
///
/// # Examples
///
/// ```no_run
/// use quarry_acquire::{AcquireConfig, SourceChain};
/// use quarry_extractor::{Extractor, ExtractorConfig};
/// use quarry_domain::ItemId;
/// use quarry_scheduler::{Scheduler, SchedulerConfig};
/// use quarry_store::SqliteStateStore;
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = Arc::new(SqliteStateStore::open("state.db")?);
/// let extractor = Arc::new(Extractor::from_config(ExtractorConfig::default(), "papers", "output")?);
/// let chain = SourceChain::from_config(&AcquireConfig::default(), Arc::clone(&store), extractor.layout().clone())?;
/// let scheduler = Scheduler::new(SchedulerConfig::default(), store, chain, extractor)?;
///
/// let ids = vec![ItemId::parse("10.1/abc")?];
/// let summary = scheduler.run(&ids, CancellationToken::new()).await?;
/// println!("{}", summary.summary());
/// # Ok(())
/// # }
/// ```
pub struct Scheduler<S: StateStore + 'static> {
    config: SchedulerConfig,
    store: Arc<S>,
    processor: Arc<ItemProcessor<S>>,
}

impl<S: StateStore + 'static> Scheduler<S> {
    /// Create a scheduler
    ///
    /// Fails when the configuration is invalid or the requested engine is
    /// unknown to the extractor.
    pub fn new(
        config: SchedulerConfig,
        store: Arc<S>,
        chain: SourceChain<S>,
        extractor: Arc<Extractor>,
    ) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::Config)?;

        let engines = extractor.engine_chain(&config.engine, &config.fallback_engines);
        if engines.first() != Some(&config.engine) {
            return Err(SchedulerError::Config(format!(
                "engine {} is not configured",
                config.engine
            )));
        }
        for name in &config.fallback_engines {
            if !engines.contains(name) {
                warn!(engine = %name, "fallback engine is not configured, skipping");
            }
        }

        let processor = ItemProcessor::new(Arc::clone(&store), chain, extractor, engines);
        Ok(Self {
            config,
            store,
            processor: Arc::new(processor),
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// State store in use
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Classify items without processing them
    pub fn partition(&self, ids: &[ItemId]) -> Result<Partition, SchedulerError> {
        let budgets = RetryBudgets {
            acquisition: self.config.acquisition_retry_budget,
            extraction: self.config.extraction_retry_budget,
        };
        let partitioner = Partitioner::new(
            self.store.as_ref(),
            self.processor.extractor().layout(),
            self.processor.chain().source_names(),
            self.processor.engines().to_vec(),
            budgets,
        );
        partitioner.partition(ids)
    }

    /// Partition `ids`, process the pending ones and summarize
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Storage`] when the state store or artifact
    /// directory fails; the pool is drained before returning.
    pub async fn run(&self, ids: &[ItemId], cancel: CancellationToken) -> Result<RunSummary, SchedulerError> {
        let started = Instant::now();
        let mut summary = RunSummary::new();

        let partition = self.partition(ids)?;
        summary.skipped_complete = partition.complete.len();
        summary.skipped_exhausted = partition.exhausted.len();
        info!(
            run_id = %summary.run_id,
            needs_acquisition = partition.needs_acquisition(),
            needs_extraction_only = partition.needs_extraction_only(),
            complete = partition.complete.len(),
            exhausted = partition.exhausted.len(),
            "partitioned items"
        );

        let attempts_before = self.processor.chain().http().attempts();
        let total = partition.jobs.len();
        let result = if total > 0 {
            self.dispatch(partition.jobs, &mut summary, cancel).await
        } else {
            Ok(())
        };

        summary.cancelled = total.saturating_sub(summary.processed());
        summary.network_attempts = self
            .processor
            .chain()
            .http()
            .attempts()
            .saturating_sub(attempts_before);
        summary.finish(started.elapsed());
        result?;

        info!("Run finished:\n{}", summary.summary());
        Ok(summary)
    }

    async fn dispatch(
        &self,
        jobs: Vec<Job>,
        summary: &mut RunSummary,
        cancel: CancellationToken,
    ) -> Result<(), SchedulerError> {
        let total = jobs.len();
        let (job_tx, job_rx) = mpsc::channel(total);
        for job in jobs {
            job_tx
                .send(job)
                .await
                .map_err(|_| SchedulerError::Worker("job queue closed".to_string()))?;
        }
        drop(job_tx);

        let job_rx = Arc::new(Mutex::new(job_rx));
        let (report_tx, mut report_rx) = mpsc::channel::<Report>(self.config.workers * 2);
        let stop = cancel.child_token();

        let workers = self.config.workers.min(total);
        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            handles.push(tokio::spawn(worker_loop(
                worker_id,
                Arc::clone(&self.processor),
                Arc::clone(&job_rx),
                report_tx.clone(),
                stop.clone(),
            )));
        }
        drop(report_tx);

        let mut ticker = interval(self.config.progress_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let mut fatal = None;
        loop {
            tokio::select! {
                report = report_rx.recv() => match report {
                    Some(Ok(outcome)) => summary.record(&outcome),
                    Some(Err(e)) => {
                        error!(error = %e, "aborting run");
                        stop.cancel();
                        fatal.get_or_insert(e);
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    info!(
                        processed = summary.processed(),
                        total,
                        extracted = summary.extracted,
                        failed = summary.failed,
                        "progress"
                    );
                }
            }
        }

        for handle in handles {
            handle
                .await
                .map_err(|e| SchedulerError::Worker(e.to_string()))?;
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn worker_loop<S: StateStore + 'static>(
    worker_id: usize,
    processor: Arc<ItemProcessor<S>>,
    jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
    reports: mpsc::Sender<Report>,
    cancel: CancellationToken,
) {
    debug!(worker_id, "worker started");

    loop {
        let job = {
            let mut rx_guard = jobs.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(worker_id, "worker cancelled");
                    break;
                }
                job = rx_guard.recv() => job,
            }
        };

        let Some(job) = job else {
            break;
        };

        let report = processor.process_guarded(&job).await;
        let fatal = report.is_err();
        if reports.send(report).await.is_err() || fatal {
            break;
        }
    }

    debug!(worker_id, "worker stopped");
}
