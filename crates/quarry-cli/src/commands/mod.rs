//! Command implementations.

pub mod config;
pub mod reconcile;
pub mod reset;
pub mod run;
pub mod seed;
pub mod status;

pub use self::config::execute_config;
pub use self::reconcile::execute_reconcile;
pub use self::reset::execute_reset;
pub use self::run::execute_run;
pub use self::seed::execute_seed;
pub use self::status::execute_status;

use crate::config::Config;
use crate::error::{CliError, Result};
use quarry_domain::ItemId;
use quarry_extractor::Extractor;
use quarry_store::{SqliteContentStore, SqliteStateStore};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Open the state tracker, creating its directory if needed.
pub(crate) fn open_state(config: &Config) -> Result<Arc<SqliteStateStore>> {
    let path = &config.paths.state_db;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(Arc::new(SqliteStateStore::open(path)?))
}

/// Open the content database when one is configured.
pub(crate) fn open_content(config: &Config) -> Result<Option<Arc<SqliteContentStore>>> {
    match &config.paths.content_db {
        Some(path) => Ok(Some(Arc::new(SqliteContentStore::open(path, config.content.clone())?))),
        None => Ok(None),
    }
}

/// Open the content database, failing when none is configured.
pub(crate) fn require_content(config: &Config) -> Result<Arc<SqliteContentStore>> {
    open_content(config)?.ok_or_else(|| {
        CliError::Config("paths.content_db is not set; add it to the [paths] section".to_string())
    })
}

/// Build the extractor from the `[extractor]` and `[paths]` sections.
pub(crate) fn build_extractor(config: &Config) -> Result<Arc<Extractor>> {
    let extractor = Extractor::from_config(
        config.extractor.clone(),
        &config.paths.raw_dir,
        &config.paths.output_dir,
    )?;
    Ok(Arc::new(extractor))
}

/// Parse an identifier given on the command line.
pub(crate) fn parse_id(raw: &str) -> Result<ItemId> {
    ItemId::parse(raw).map_err(|e| CliError::InvalidInput(format!("Invalid id '{}': {}", raw, e)))
}

/// Read ids from a file (one per line, `#` starts a comment).
///
/// Invalid lines are skipped with a warning; duplicates are kept once.
pub(crate) fn read_id_file(path: &Path) -> Result<Vec<ItemId>> {
    let content = fs::read_to_string(path)?;
    Ok(parse_id_lines(&content))
}

fn parse_id_lines(content: &str) -> Vec<ItemId> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        match ItemId::parse(line) {
            Ok(id) => {
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }
            Err(e) => tracing::warn!(line = number + 1, value = line, error = %e, "skipping invalid id"),
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_id_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# exported ids").unwrap();
        writeln!(file, "10.1/A").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  https://doi.org/10.1/b  # second").unwrap();
        writeln!(file, "doi:10.1/a").unwrap();

        let ids = read_id_file(file.path()).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0].as_str(), "10.1/a");
        assert_eq!(ids[1].as_str(), "10.1/b");
    }

    #[test]
    fn test_parse_id_rejects_blank() {
        assert!(parse_id("   ").is_err());
        assert_eq!(parse_id("DOI:10.1/X").unwrap().as_str(), "10.1/x");
    }
}
