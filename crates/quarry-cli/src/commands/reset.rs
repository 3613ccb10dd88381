//! Reset command implementation.

use super::{open_state, parse_id};
use crate::cli::ResetArgs;
use crate::config::Config;
use crate::error::Result;
use crate::output::Formatter;
use quarry_domain::traits::StateStore;
use quarry_domain::ItemId;

/// Execute the reset command.
///
/// Every id is validated before anything is reset.
pub fn execute_reset(args: ResetArgs, config: &Config, formatter: &Formatter) -> Result<()> {
    let ids = args
        .ids
        .iter()
        .map(|raw| parse_id(raw))
        .collect::<Result<Vec<ItemId>>>()?;

    let store = open_state(config)?;
    let mut reset = 0;
    for id in &ids {
        if store.get(id)?.is_none() {
            println!("{}", formatter.warning(&format!("{} is not tracked", id)));
            continue;
        }
        store.reset(id)?;
        tracing::info!(item = %id, "reset");
        reset += 1;
    }

    println!("{}", formatter.success(&format!("Reset {} item(s)", reset)));
    Ok(())
}
