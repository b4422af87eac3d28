//! Clean command implementation

use anyhow::{Context, Result};
use clap::Args;
use querybench_harness::table::clear_table;
use querybench_harness::TableAdmin;

use super::{connect, StoreArgs};
use crate::{output, prompt};

#[derive(Args, Debug)]
pub struct CleanArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Delete without asking
    #[arg(short, long)]
    pub yes: bool,
}

pub async fn run(args: CleanArgs) -> Result<()> {
    let config = args.store.load()?;
    config.validate()?;

    let store = connect(&config).await?;
    if store.describe().await?.is_none() {
        anyhow::bail!("Table \"{}\" does not exist", config.table);
    }

    let question = format!("Delete all items in table \"{}\"", config.table);
    if !prompt::confirm(&question, args.yes) {
        output::warning("Program execution stopped.");
        return Ok(());
    }

    let spinner = output::spinner("Deleting items");
    let deleted = clear_table(store.as_ref(), |n| spinner.set_position(n)).await;
    spinner.finish_and_clear();

    let deleted = deleted.context("Failed to clear table")?;
    output::success(&format!("{} items deleted.", deleted));
    Ok(())
}
