//! Reconcile command implementation.

use super::{build_extractor, open_content, open_state};
use crate::cli::ReconcileArgs;
use crate::config::Config;
use crate::error::Result;
use crate::output::Formatter;
use quarry_reconciler::{Reconciler, ReconcilerConfig, ReconcilerWorker};
use quarry_store::{SqliteContentStore, SqliteStateStore};

/// Execute the reconcile command.
pub async fn execute_reconcile(args: ReconcileArgs, config: Config, formatter: &Formatter) -> Result<()> {
    let settings = reconciler_settings(&config.reconciler, &args);

    let store = open_state(&config)?;
    let extractor = build_extractor(&config)?;
    let mut reconciler: Reconciler<SqliteStateStore, SqliteContentStore> =
        Reconciler::new(settings.clone(), store, extractor)?;

    if settings.update_content {
        match open_content(&config)? {
            Some(content) => reconciler = reconciler.with_content(content),
            None => tracing::debug!("no content database configured"),
        }
    }

    if args.watch {
        let mut worker = ReconcilerWorker::new(reconciler);
        worker.run().await?;
        println!("{}", formatter.reconcile_report(worker.totals())?);
    } else {
        let report = reconciler.reconcile().await?;
        println!("{}", formatter.reconcile_report(&report)?);
    }
    Ok(())
}

/// Configured settings with command-line flags applied.
fn reconciler_settings(base: &ReconcilerConfig, args: &ReconcileArgs) -> ReconcilerConfig {
    let mut settings = base.clone();
    if args.check_only {
        settings.check_only = true;
    }
    if args.no_quarantine {
        settings.quarantine = false;
    }
    if args.no_content {
        settings.update_content = false;
    }
    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_only_restrict() {
        let args = ReconcileArgs {
            check_only: false,
            watch: false,
            no_quarantine: true,
            no_content: false,
        };
        let base = ReconcilerConfig {
            check_only: true,
            ..Default::default()
        };

        let settings = reconciler_settings(&base, &args);
        assert!(settings.check_only);
        assert!(!settings.quarantine);
        assert!(settings.update_content);
    }
}
