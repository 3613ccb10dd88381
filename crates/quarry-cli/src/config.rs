//! Configuration management for the CLI.

use crate::error::{CliError, Result};
use quarry_acquire::AcquireConfig;
use quarry_extractor::ExtractorConfig;
use quarry_reconciler::ReconcilerConfig;
use quarry_scheduler::SchedulerConfig;
use quarry_store::ContentTable;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// CLI configuration, one section per component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database and artifact locations
    pub paths: Paths,

    /// Content database table layout
    pub content: ContentTable,

    /// Acquisition settings and sources
    pub acquire: AcquireConfig,

    /// Extraction engines and thresholds
    pub extractor: ExtractorConfig,

    /// Worker pool and retry budgets
    pub scheduler: SchedulerConfig,

    /// Reconciliation behavior
    pub reconciler: ReconcilerConfig,

    /// Global settings
    pub settings: Settings,
}

/// Database and artifact locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    /// State tracker database
    pub state_db: PathBuf,

    /// Raw artifact directory
    pub raw_dir: PathBuf,

    /// Extraction result directory
    pub output_dir: PathBuf,

    /// Downstream content database, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_db: Option<PathBuf>,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            state_db: PathBuf::from("quarry.db"),
            raw_dir: PathBuf::from("papers"),
            output_dir: PathBuf::from("output"),
            content_db: None,
        }
    }
}

/// Global CLI settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Enable colored output
    pub color: bool,

    /// Default output format
    pub format: OutputFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            color: true,
            format: OutputFormat::Table,
        }
    }
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Table format
    Table,
    /// JSON format
    Json,
    /// Quiet (minimal) format
    Quiet,
}

impl Config {
    /// Default configuration file path (`~/.quarry/config.toml`).
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| CliError::Config("Could not find home directory".into()))?;
        Ok(home.join(".quarry").join("config.toml"))
    }

    /// Load configuration from `path`, falling back to defaults when absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Serialize to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| CliError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("content", self.content.validate()),
            ("acquire", self.acquire.validate()),
            ("extractor", self.extractor.validate()),
            ("scheduler", self.scheduler.validate()),
            ("reconciler", self.reconciler.validate()),
        ];
        for (section, result) in checks {
            result.map_err(|e| CliError::Config(format!("[{}] {}", section, e)))?;
        }
        Ok(())
    }

    /// Apply `run` flag overrides.
    ///
    /// `--engine` clears the fallback list. `--rate` derives the burst from
    /// the worker count.
    pub fn apply_run_overrides(
        &mut self,
        workers: Option<usize>,
        rate: Option<f64>,
        engine: Option<String>,
    ) -> Result<()> {
        if let Some(workers) = workers {
            self.scheduler.workers = workers;
        }
        if let Some(rate) = rate {
            self.acquire.rate = rate;
            self.acquire.burst = AcquireConfig::derived_burst(rate, self.scheduler.workers);
        }
        if let Some(engine) = engine {
            self.scheduler.engine = engine;
            self.scheduler.fallback_engines.clear();
        }
        self.validate()
    }
}
