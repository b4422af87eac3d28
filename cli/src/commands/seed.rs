//! Seed command implementation

use anyhow::{Context, Result};
use clap::Args;
use querybench_harness::seed::{seed_table, Schema};
use querybench_harness::{BenchConfig, Store};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::{connect, prepare_table, SeedOpts, StoreArgs};
use crate::output;

#[derive(Args, Debug)]
pub struct SeedArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub seed: SeedOpts,
}

pub async fn run(args: SeedArgs) -> Result<()> {
    let mut config = args.store.load()?;
    args.seed.apply(&mut config);
    config.validate()?;

    let store = connect(&config).await?;
    prepare_table(store.as_ref(), &config, args.seed.yes).await?;
    seed(store.as_ref(), &config).await?;
    Ok(())
}

/// Write `config.seed` generated items unless seeding is skipped
pub async fn seed(store: &dyn Store, config: &BenchConfig) -> Result<u64> {
    if config.skip_seed {
        output::info("Skipping seed of table...");
        return Ok(0);
    }

    let schema = Schema::from_file(&config.schema)?;
    output::info(&format!(
        "Seeding table with {} items based on schema {}...",
        config.seed,
        config.schema.display()
    ));

    let mut rng = StdRng::from_os_rng();
    let bar = output::progress_bar(config.seed, "Seeding");
    let written = seed_table(
        store,
        &schema,
        &config.partition_key,
        config.seed,
        &mut rng,
        |n| bar.set_position(n),
    )
    .await;
    bar.finish_and_clear();

    let written = written.context("Failed to seed table")?;
    output::success(&format!("Wrote {} items to table.", written));
    Ok(written)
}
