//! Config command implementation.

use crate::cli::{ConfigAction, ConfigArgs};
use crate::config::{Config, OutputFormat};
use crate::error::{CliError, Result};
use crate::output::Formatter;
use std::path::Path;

/// Execute the config command.
pub fn execute_config(args: ConfigArgs, config: &Config, path: &Path, formatter: &Formatter) -> Result<()> {
    match args.action {
        ConfigAction::Show => {
            let rendered = match formatter.format() {
                OutputFormat::Json => serde_json::to_string_pretty(config)?,
                _ => config.to_toml()?,
            };
            println!("{}", rendered);
        }
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Init { force } => {
            init_config(path, force)?;
            println!("{}", formatter.success(&format!("Wrote {}", path.display())));
        }
    }
    Ok(())
}

/// Write a default configuration file, refusing to overwrite unless forced.
fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(CliError::InvalidInput(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    Config::default().save(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        init_config(&path, false).unwrap();
        assert!(init_config(&path, false).is_err());
        assert!(init_config(&path, true).is_ok());
        assert!(Config::load(&path).is_ok());
    }
}
