//! Background worker for watch mode

use crate::{ReconcileReport, Reconciler, ReconcilerError};
use quarry_domain::traits::{ContentStore, StateStore};
use tokio::time::{interval, Duration};

/// Background worker that runs reconciliation passes on a schedule
///
/// # Examples
///
/// ```no_run
/// use quarry_extractor::{Extractor, ExtractorConfig};
/// use quarry_reconciler::{Reconciler, ReconcilerConfig, ReconcilerWorker};
/// use quarry_store::{SqliteContentStore, SqliteStateStore};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = Arc::new(SqliteStateStore::open("quarry.db")?);
///     let extractor = Arc::new(Extractor::from_config(
///         ExtractorConfig::default(),
///         "papers",
///         "output",
///     )?);
///
///     let reconciler: Reconciler<_, SqliteContentStore> =
///         Reconciler::new(ReconcilerConfig::default(), store, extractor)?;
///     let mut worker = ReconcilerWorker::new(reconciler);
///
///     // Run indefinitely (until Ctrl+C)
///     worker.run().await?;
///     Ok(())
/// }
/// ```
pub struct ReconcilerWorker<S, C>
where
    S: StateStore,
    C: ContentStore,
{
    reconciler: Reconciler<S, C>,
    interval: Duration,
    passes: usize,
    totals: ReconcileReport,
}

impl<S, C> ReconcilerWorker<S, C>
where
    S: StateStore,
    C: ContentStore,
{
    /// Create a worker sweeping at the reconciler's configured interval
    pub fn new(reconciler: Reconciler<S, C>) -> Self {
        let interval = reconciler.config().sweep_interval();
        let totals = ReconcileReport::new(reconciler.config().check_only);
        Self {
            reconciler,
            interval,
            passes: 0,
            totals,
        }
    }

    /// Run passes until a shutdown signal (Ctrl+C) is received
    ///
    /// A failed pass is logged and the next tick tries again.
    pub async fn run(&mut self) -> Result<(), ReconcilerError> {
        let mut ticker = interval(self.interval);

        tracing::info!("Reconciler worker started (interval: {:?})", self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tracing::debug!("Starting reconciliation pass");
                    match self.reconciler.reconcile().await {
                        Ok(report) => self.record(&report),
                        Err(e) => tracing::error!("Reconciliation pass failed: {}", e),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutdown signal received, stopping reconciler");
                    break;
                }
            }
        }

        tracing::info!("Reconciler stopped. Totals:\n{}", self.totals.summary());
        Ok(())
    }

    /// Run a fixed number of passes
    ///
    /// Unlike [`ReconcilerWorker::run`], the first failed pass is returned.
    pub async fn run_cycles(&mut self, cycles: usize) -> Result<(), ReconcilerError> {
        let mut ticker = interval(self.interval);

        for cycle in 0..cycles {
            ticker.tick().await;
            tracing::debug!("Starting reconciliation pass {}/{}", cycle + 1, cycles);

            match self.reconciler.reconcile().await {
                Ok(report) => self.record(&report),
                Err(e) => {
                    tracing::error!("Reconciliation pass {}/{} failed: {}", cycle + 1, cycles, e);
                    return Err(e);
                }
            }
        }

        tracing::info!(
            "Reconciler finished {} passes. Totals:\n{}",
            cycles,
            self.totals.summary()
        );
        Ok(())
    }

    fn record(&mut self, report: &ReconcileReport) {
        self.passes += 1;
        self.totals.merge(report);
        tracing::info!(
            "Pass {} completed: {} upgraded, {} downgraded, {} quarantined, {} content updates",
            self.passes,
            report.upgraded,
            report.downgraded,
            report.quarantined,
            report.content_updated
        );
    }

    /// Number of completed passes
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Counters accumulated over all completed passes
    pub fn totals(&self) -> &ReconcileReport {
        &self.totals
    }

    /// Reset the accumulated counters
    pub fn reset_totals(&mut self) {
        self.passes = 0;
        self.totals = ReconcileReport::new(self.reconciler.config().check_only);
    }
}
