//! Configuration for reconciliation passes
//!
//! Controls which repairs a pass may perform and how often the background
//! worker sweeps.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the Reconciler
///
/// # Examples
///
/// ```
/// use quarry_reconciler::ReconcilerConfig;
///
/// // Default: repair everything, sweep hourly
/// let config = ReconcilerConfig::default();
/// assert!(config.quarantine);
/// assert_eq!(config.sweep_interval_minutes, 60);
///
/// // Aggressive: sweep every 15 minutes
/// let config = ReconcilerConfig::aggressive();
/// assert_eq!(config.sweep_interval_minutes, 15);
///
/// // Lenient: leave invalid files where they are
/// let config = ReconcilerConfig::lenient();
/// assert!(!config.quarantine);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Report discrepancies without mutating anything
    /// Default: false
    pub check_only: bool,

    /// Move invalid artifacts into the quarantine directories
    /// Default: true
    pub quarantine: bool,

    /// Copy extracted content into the content database
    /// Default: true
    pub update_content: bool,

    /// Give raw artifacts failing strict validation a lenient second look
    /// Default: true
    pub lenient: bool,

    /// How often the background worker runs a pass (in minutes)
    /// Default: 60
    pub sweep_interval_minutes: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            check_only: false,
            quarantine: true,
            update_content: true,
            lenient: true,
            sweep_interval_minutes: 60,
        }
    }
}

impl ReconcilerConfig {
    /// Aggressive preset: frequent sweeps, strict validation only
    pub fn aggressive() -> Self {
        Self {
            lenient: false,
            sweep_interval_minutes: 15,
            ..Self::default()
        }
    }

    /// Lenient preset: infrequent sweeps, nothing is moved
    pub fn lenient() -> Self {
        Self {
            quarantine: false,
            sweep_interval_minutes: 240,
            ..Self::default()
        }
    }

    /// Get sweep interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_minutes * 60)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.sweep_interval_minutes == 0 {
            return Err("sweep_interval_minutes must be at least 1".to_string());
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
