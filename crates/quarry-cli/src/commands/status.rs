//! Status command implementation.

use super::{open_state, parse_id};
use crate::cli::StatusArgs;
use crate::config::Config;
use crate::error::{CliError, Result};
use crate::output::Formatter;
use quarry_domain::traits::StateStore;

/// Execute the status command.
pub fn execute_status(args: StatusArgs, config: &Config, formatter: &Formatter) -> Result<()> {
    let store = open_state(config)?;

    let Some(raw) = args.id else {
        println!("{}", formatter.stats(&store.stats()?)?);
        return Ok(());
    };

    let id = parse_id(&raw)?;
    let snapshot = store
        .get(&id)?
        .ok_or_else(|| CliError::InvalidInput(format!("{} is not tracked", id)))?;
    let events = store.events(&id)?;
    println!("{}", formatter.snapshot(&snapshot, &events)?);
    Ok(())
}
