//! Run command implementation.

use super::{build_extractor, open_state, read_id_file, require_content};
use crate::cli::RunArgs;
use crate::config::{Config, OutputFormat};
use crate::error::Result;
use crate::output::Formatter;
use quarry_acquire::SourceChain;
use quarry_domain::traits::{ContentStore, StateStore};
use quarry_scheduler::Scheduler;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Execute the run command.
///
/// Without `--ids` or `--from-content-db` every tracked item is considered.
pub async fn execute_run(args: RunArgs, mut config: Config, formatter: &Formatter) -> Result<()> {
    config.apply_run_overrides(args.workers, args.rate, args.engine)?;

    let store = open_state(&config)?;
    let ids = if let Some(path) = &args.ids {
        read_id_file(path)?
    } else if args.from_content_db {
        require_content(&config)?.list_ids()?
    } else {
        store.list_ids()?
    };

    if ids.is_empty() {
        println!("{}", formatter.warning("No items to process"));
        return Ok(());
    }

    let extractor = build_extractor(&config)?;
    let chain = SourceChain::from_config(&config.acquire, Arc::clone(&store), extractor.layout().clone())?
        .with_lenient(extractor.lenient_probe());
    let scheduler = Scheduler::new(config.scheduler.clone(), store, chain, extractor)?;

    if formatter.format() == OutputFormat::Table {
        eprintln!("{}", formatter.partition(&scheduler.partition(&ids)?));
    }

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(cancel_on_ctrl_c(cancel.clone()));
    let summary = scheduler.run(&ids, cancel).await;
    watcher.abort();

    println!("{}", formatter.run_summary(&summary?)?);
    Ok(())
}

/// Cancel `token` on the first Ctrl+C; in-flight items still finish.
async fn cancel_on_ctrl_c(token: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("Interrupt received, finishing in-flight items");
        token.cancel();
    }
}
