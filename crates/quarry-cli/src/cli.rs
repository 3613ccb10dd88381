//! CLI command definitions and argument parsing.

use clap::{ArgAction, ArgGroup, Parser, Subcommand};
use std::path::PathBuf;

/// Quarry - acquire documents, extract them and keep the tracker honest.
#[derive(Debug, Parser)]
#[command(name = "quarry")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(short, long, value_enum, global = true)]
    pub format: Option<CliFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "QUARRY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliFormat {
    /// Table format (default)
    Table,
    /// JSON format
    Json,
    /// Quiet format (counts and ids only)
    Quiet,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Acquire and extract pending items
    Run(RunArgs),

    /// Repair drift between the tracker, artifacts and content database
    Reconcile(ReconcileArgs),

    /// Show aggregate counts or one item's snapshot and history
    Status(StatusArgs),

    /// Reset items so the next run retries them from scratch
    Reset(ResetArgs),

    /// Create tracker rows for items
    Seed(SeedArgs),

    /// Inspect or create the configuration file
    Config(ConfigArgs),
}

/// Arguments for the run command.
#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Read item ids from a file (one per line, `#` comments allowed)
    #[arg(long, conflicts_with = "from_content_db")]
    pub ids: Option<PathBuf>,

    /// Run every item of the content database
    #[arg(long)]
    pub from_content_db: bool,

    /// Number of concurrent workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Target network requests per second
    #[arg(short, long)]
    pub rate: Option<f64>,

    /// Run only this engine (no fallbacks)
    #[arg(short, long)]
    pub engine: Option<String>,
}

/// Arguments for the reconcile command.
#[derive(Debug, Parser)]
pub struct ReconcileArgs {
    /// Report discrepancies without changing anything
    #[arg(long)]
    pub check_only: bool,

    /// Keep reconciling at the configured interval until Ctrl+C
    #[arg(long)]
    pub watch: bool,

    /// Leave invalid artifacts in place
    #[arg(long)]
    pub no_quarantine: bool,

    /// Do not touch the content database
    #[arg(long)]
    pub no_content: bool,
}

/// Arguments for the status command.
#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Item id; omit for aggregate counts
    pub id: Option<String>,
}

/// Arguments for the reset command.
#[derive(Debug, Parser)]
pub struct ResetArgs {
    /// Item ids to reset
    #[arg(required = true)]
    pub ids: Vec<String>,
}

/// Arguments for the seed command.
#[derive(Debug, Parser)]
#[command(group(ArgGroup::new("input").required(true).multiple(true).args(["from_content_db", "ids"])))]
pub struct SeedArgs {
    /// Seed one row per content database id
    #[arg(long)]
    pub from_content_db: bool,

    /// Seed ids read from a file (one per line, `#` comments allowed)
    #[arg(long)]
    pub ids: Option<PathBuf>,
}

/// Arguments for configuration management.
#[derive(Debug, Parser)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl From<CliFormat> for crate::config::OutputFormat {
    fn from(format: CliFormat) -> Self {
        match format {
            CliFormat::Table => crate::config::OutputFormat::Table,
            CliFormat::Json => crate::config::OutputFormat::Json,
            CliFormat::Quiet => crate::config::OutputFormat::Quiet,
        }
    }
}
