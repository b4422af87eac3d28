//! Run command: prepare, seed, benchmark

use anyhow::Result;
use clap::Args;

use super::{connect, prepare_table, query, seed, QueryOpts, SeedOpts, StoreArgs};
use crate::output;

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub seed: SeedOpts,

    #[command(flatten)]
    pub query: QueryOpts,
}

pub async fn run(args: RunArgs) -> Result<()> {
    let mut config = args.store.load()?;
    args.seed.apply(&mut config);
    args.query.apply(&mut config)?;
    config.validate()?;

    let store = connect(&config).await?;

    prepare_table(store.as_ref(), &config, args.seed.yes).await?;
    seed::seed(store.as_ref(), &config).await?;
    query::benchmark(store.as_ref(), &config, args.query.json.as_deref()).await?;

    output::success("Done!");
    Ok(())
}
