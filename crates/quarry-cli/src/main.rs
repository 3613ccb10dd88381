//! Quarry CLI - acquire, extract and reconcile a document corpus.

use clap::Parser;
use quarry_cli::commands;
use quarry_cli::{Cli, Command, Config, Formatter};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> quarry_cli::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = match cli.config.clone() {
        Some(path) => path,
        None => Config::default_path()?,
    };

    // `config path|init` must work even when the file is broken
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) if matches!(cli.command, Command::Config(_)) => {
            tracing::warn!("{}", e);
            Config::default()
        }
        Err(e) => return Err(e),
    };

    let format = cli
        .format
        .map(Into::into)
        .unwrap_or(config.settings.format);
    let color_enabled = !cli.no_color && config.settings.color;
    let formatter = Formatter::new(format, color_enabled);

    match cli.command {
        Command::Run(args) => commands::execute_run(args, config, &formatter).await?,
        Command::Reconcile(args) => commands::execute_reconcile(args, config, &formatter).await?,
        Command::Status(args) => commands::execute_status(args, &config, &formatter)?,
        Command::Reset(args) => commands::execute_reset(args, &config, &formatter)?,
        Command::Seed(args) => commands::execute_seed(args, &config, &formatter)?,
        Command::Config(args) => commands::execute_config(args, &config, &config_path, &formatter)?,
    }

    Ok(())
}

/// Log to stderr; `RUST_LOG` overrides the `-v` level.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
