//! Configuration for scheduled runs
//!
//! Worker count, retry budgets and which engines to drive.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the Scheduler
///
/// # Examples
///
/// ```
/// use quarry_scheduler::SchedulerConfig;
///
/// let config = SchedulerConfig::default();
/// assert_eq!(config.workers, 4);
/// assert_eq!(config.acquisition_retry_budget, 3);
///
/// let config = SchedulerConfig::aggressive();
/// assert_eq!(config.workers, 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Size of the worker pool
    /// Default: 4
    pub workers: usize,

    /// Retries allowed once every source has failed before an item is
    /// classified exhausted
    /// Default: 3
    pub acquisition_retry_budget: u32,

    /// Retries allowed once the requested engine has failed
    /// Default: 3
    pub extraction_retry_budget: u32,

    /// Engine whose status decides completion
    /// Default: "grobid"
    pub engine: String,

    /// Engines tried, in order, when the requested one fails
    /// Default: ["fast"]
    pub fallback_engines: Vec<String>,

    /// How often progress is logged during a run (in seconds)
    /// Default: 30
    pub progress_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            acquisition_retry_budget: 3,
            extraction_retry_budget: 3,
            engine: "grobid".to_string(),
            fallback_engines: vec!["fast".to_string()],
            progress_interval_secs: 30,
        }
    }
}

impl SchedulerConfig {
    /// Aggressive preset: wide pool, give up early
    pub fn aggressive() -> Self {
        Self {
            workers: 16,
            acquisition_retry_budget: 1,
            extraction_retry_budget: 1,
            ..Self::default()
        }
    }

    /// Lenient preset: narrow pool, keep retrying
    pub fn lenient() -> Self {
        Self {
            workers: 2,
            acquisition_retry_budget: 5,
            extraction_retry_budget: 5,
            ..Self::default()
        }
    }

    /// Progress log interval as a Duration
    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == 0 {
            return Err("workers must be at least 1".to_string());
        }
        if self.workers > 256 {
            return Err("workers cannot exceed 256".to_string());
        }
        if self.engine.trim().is_empty() {
            return Err("engine cannot be empty".to_string());
        }
        if self.acquisition_retry_budget == 0 || self.extraction_retry_budget == 0 {
            return Err("retry budgets must be at least 1".to_string());
        }
        if self.progress_interval_secs == 0 {
            return Err("progress_interval_secs must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }
}
