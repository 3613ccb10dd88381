//! Output formatting for the CLI.

use crate::config::OutputFormat;
use crate::error::Result;
use colored::*;
use quarry_domain::traits::StoreStats;
use quarry_domain::{Event, Snapshot};
use quarry_reconciler::ReconcileReport;
use quarry_scheduler::{Partition, RunSummary};
use tabled::{
    builder::Builder,
    settings::{object::Rows, Alignment, Modify, Style},
};

/// Output formatter.
pub struct Formatter {
    format: OutputFormat,
    color_enabled: bool,
}

impl Formatter {
    /// Create a new formatter.
    pub fn new(format: OutputFormat, color_enabled: bool) -> Self {
        Self {
            format,
            color_enabled,
        }
    }

    /// Selected output format.
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Format the partition computed before a run.
    pub fn partition(&self, partition: &Partition) -> String {
        let pending = partition.jobs.len();
        self.info(&format!(
            "{} pending ({} to acquire, {} to extract), {} complete, {} exhausted",
            pending,
            partition.needs_acquisition(),
            partition.needs_extraction_only(),
            partition.complete.len(),
            partition.exhausted.len()
        ))
    }

    /// Format a run summary.
    pub fn run_summary(&self, summary: &RunSummary) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(summary)?),
            OutputFormat::Quiet => Ok(format!(
                "{} extracted, {} failed",
                summary.extracted, summary.failed
            )),
            OutputFormat::Table => {
                let rows = [
                    ("Acquired", summary.acquired.to_string()),
                    ("Extracted", summary.extracted.to_string()),
                    ("Skipped (complete)", summary.skipped_complete.to_string()),
                    ("Skipped (exhausted)", summary.skipped_exhausted.to_string()),
                    ("Failed", summary.failed.to_string()),
                    ("Cancelled", summary.cancelled.to_string()),
                    ("Cache hits", summary.cache_hits.to_string()),
                    ("Lenient accepts", summary.lenient.to_string()),
                    ("Network attempts", summary.network_attempts.to_string()),
                    ("Elapsed", format!("{:.1}s", summary.elapsed_secs)),
                ];
                let header = format!("Run {}", summary.run_id);
                let table = key_value_table(&rows);
                if summary.failed > 0 {
                    Ok(format!("{}\n{}\n{}", header, table, self.warning(&format!("{} item(s) failed", summary.failed))))
                } else {
                    Ok(format!("{}\n{}", header, table))
                }
            }
        }
    }

    /// Format a reconciliation report.
    pub fn reconcile_report(&self, report: &ReconcileReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
            OutputFormat::Quiet => Ok(if report.check_only {
                report.discrepancies.len().to_string()
            } else {
                report.mutations().to_string()
            }),
            OutputFormat::Table => {
                let mut out = report.summary();
                if report.check_only && !report.discrepancies.is_empty() {
                    let mut builder = Builder::default();
                    builder.push_record(["Item", "Kind", "Detail"]);
                    for d in &report.discrepancies {
                        builder.push_record([d.id.as_str(), d.kind.as_str(), d.detail.as_str()]);
                    }
                    out.push_str("\n\n");
                    out.push_str(&styled(builder).to_string());
                }
                if report.is_clean() {
                    out.push('\n');
                    out.push_str(&self.success("No drift found"));
                }
                Ok(out)
            }
        }
    }

    /// Format aggregate tracker counts.
    pub fn stats(&self, stats: &StoreStats) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                let engines: serde_json::Map<String, serde_json::Value> = stats
                    .engines
                    .iter()
                    .map(|(name, (ok, failed))| {
                        (name.clone(), serde_json::json!({ "success": ok, "failure": failed }))
                    })
                    .collect();
                Ok(serde_json::to_string_pretty(&serde_json::json!({
                    "items": stats.items,
                    "downloaded": stats.downloaded,
                    "with_content": stats.with_content,
                    "retried": stats.retried,
                    "engines": engines,
                }))?)
            }
            OutputFormat::Quiet => Ok(stats.items.to_string()),
            OutputFormat::Table => {
                if stats.items == 0 {
                    return Ok(self.colorize("No items tracked.", "yellow"));
                }
                let mut rows = vec![
                    ("Items".to_string(), stats.items.to_string()),
                    ("Downloaded".to_string(), stats.downloaded.to_string()),
                    ("With content".to_string(), stats.with_content.to_string()),
                    ("Retried".to_string(), stats.retried.to_string()),
                ];
                for (name, (ok, failed)) in &stats.engines {
                    rows.push((format!("{} (success / failure)", name), format!("{} / {}", ok, failed)));
                }
                let mut builder = Builder::default();
                for (key, value) in &rows {
                    builder.push_record([key.as_str(), value.as_str()]);
                }
                Ok(styled(builder).to_string())
            }
        }
    }

    /// Format one snapshot and its event history.
    pub fn snapshot(&self, snapshot: &Snapshot, events: &[Event]) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(&serde_json::json!({
                "snapshot": snapshot,
                "phase": snapshot.phase(),
                "events": events,
            }))?),
            OutputFormat::Quiet => Ok(snapshot.phase().to_string()),
            OutputFormat::Table => {
                let mut rows = vec![
                    ("Item".to_string(), snapshot.id.to_string()),
                    ("Phase".to_string(), snapshot.phase().to_string()),
                    ("Downloaded".to_string(), snapshot.downloaded.as_str().to_string()),
                    (
                        "Download source".to_string(),
                        snapshot.download_source.clone().unwrap_or_else(|| "-".into()),
                    ),
                    ("Has content".to_string(), snapshot.has_content.as_str().to_string()),
                    ("Retries".to_string(), snapshot.retry_count.to_string()),
                    (
                        "Last error".to_string(),
                        snapshot.last_error.clone().unwrap_or_else(|| "-".into()),
                    ),
                ];
                for (name, state) in &snapshot.sources {
                    let attempted = if state.attempted { "attempted" } else { "not attempted" };
                    rows.push((format!("Source {}", name), format!("{}, {}", attempted, state.outcome.as_str())));
                }
                for (name, state) in &snapshot.engines {
                    rows.push((format!("Engine {}", name), state.status.as_str().to_string()));
                }

                let mut builder = Builder::default();
                for (key, value) in &rows {
                    builder.push_record([key.as_str(), value.as_str()]);
                }
                let mut out = styled(builder).to_string();

                if !events.is_empty() {
                    let mut history = Builder::default();
                    history.push_record(["When", "Event", "From", "To", "Message"]);
                    for event in events {
                        history.push_record([
                            event.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                            event.kind.to_string(),
                            event.status_from.clone().unwrap_or_default(),
                            event.status_to.clone().unwrap_or_default(),
                            event.message.clone().unwrap_or_default(),
                        ]);
                    }
                    let mut table = history.build();
                    table
                        .with(Style::rounded())
                        .with(Modify::new(Rows::first()).with(Alignment::center()));
                    out.push_str("\n\n");
                    out.push_str(&table.to_string());
                }
                Ok(out)
            }
        }
    }

    /// Format a success message.
    pub fn success(&self, message: &str) -> String {
        self.colorize(&format!("✓ {}", message), "green")
    }

    /// Format an error message.
    pub fn error(&self, message: &str) -> String {
        self.colorize(&format!("✗ {}", message), "red")
    }

    /// Format an info message.
    pub fn info(&self, message: &str) -> String {
        self.colorize(&format!("ℹ {}", message), "blue")
    }

    /// Format a warning message.
    pub fn warning(&self, message: &str) -> String {
        self.colorize(&format!("⚠ {}", message), "yellow")
    }

    /// Colorize text if color is enabled.
    fn colorize(&self, text: &str, color: &str) -> String {
        if !self.color_enabled {
            return text.to_string();
        }

        match color {
            "red" => text.red().to_string(),
            "green" => text.green().to_string(),
            "blue" => text.blue().to_string(),
            "yellow" => text.yellow().to_string(),
            _ => text.to_string(),
        }
    }
}

fn key_value_table(rows: &[(&str, String)]) -> String {
    let mut builder = Builder::default();
    for (key, value) in rows {
        builder.push_record([*key, value.as_str()]);
    }
    styled(builder).to_string()
}

fn styled(builder: Builder) -> tabled::Table {
    let mut table = builder.build();
    table.with(Style::rounded());
    table
}
