//! Run summary

use crate::worker::ItemOutcome;
use quarry_acquire::Acquired;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// Counters reported at the end of a scheduled run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Unique, time-ordered run identifier
    pub run_id: Uuid,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// Raw artifacts fetched from a source this run
    pub acquired: usize,

    /// Items with an accepted extraction
    pub extracted: usize,

    /// Items skipped as complete
    pub skipped_complete: usize,

    /// Items skipped as exhausted
    pub skipped_exhausted: usize,

    /// Items whose processing failed
    pub failed: usize,

    /// Items never started because the run was cancelled
    pub cancelled: usize,

    /// Artifacts reused instead of fetched or re-extracted
    pub cache_hits: usize,

    /// Raw artifacts kept only by the lenient check
    pub lenient: usize,

    /// Outbound network attempts, retries included
    pub network_attempts: u64,

    /// Wall-clock duration in seconds
    pub elapsed_secs: f64,
}

impl RunSummary {
    /// Start an empty summary
    pub fn new() -> Self {
        Self {
            run_id: Uuid::now_v7(),
            started_at: Utc::now(),
            acquired: 0,
            extracted: 0,
            skipped_complete: 0,
            skipped_exhausted: 0,
            failed: 0,
            cancelled: 0,
            cache_hits: 0,
            lenient: 0,
            network_attempts: 0,
            elapsed_secs: 0.0,
        }
    }

    /// Fold one item outcome into the counters
    pub fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Extracted {
                acquired,
                cache_hit,
                ..
            } => {
                self.record_acquired(acquired.as_ref());
                if *cache_hit {
                    self.cache_hits += 1;
                }
                self.extracted += 1;
            }
            ItemOutcome::Failed { acquired, .. } => {
                self.record_acquired(acquired.as_ref());
                self.failed += 1;
            }
        }
    }

    fn record_acquired(&mut self, acquired: Option<&Acquired>) {
        if let Some(acquired) = acquired {
            if acquired.cache_hit {
                self.cache_hits += 1;
            } else {
                self.acquired += 1;
            }
            if acquired.lenient {
                self.lenient += 1;
            }
        }
    }

    /// Items handed to workers
    pub fn processed(&self) -> usize {
        self.extracted + self.failed
    }

    /// Set the elapsed time
    pub fn finish(&mut self, elapsed: Duration) {
        self.elapsed_secs = elapsed.as_secs_f64();
    }

    /// Generate a summary report
    pub fn summary(&self) -> String {
        let lines = [
            format!("Run {}", self.run_id),
            "======================".to_string(),
            format!("Acquired:            {}", self.acquired),
            format!("Extracted:           {}", self.extracted),
            format!("Skipped (complete):  {}", self.skipped_complete),
            format!("Skipped (exhausted): {}", self.skipped_exhausted),
            format!("Failed:              {}", self.failed),
            format!("Cancelled:           {}", self.cancelled),
            format!("Cache hits:          {}", self.cache_hits),
            format!("Lenient accepts:     {}", self.lenient),
            format!("Network attempts:    {}", self.network_attempts),
            format!("Elapsed:             {:.1}s", self.elapsed_secs),
        ];
        lines.join("\n")
    }
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}
