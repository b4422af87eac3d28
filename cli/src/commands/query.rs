//! Query command implementation

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use querybench_harness::output::json::write_report;
use querybench_harness::output::BenchReport;
use querybench_harness::{run_rounds_with, BenchConfig, RoundOptions, Store};

use super::{cancel_on_interrupt, connect, QueryOpts, StoreArgs};
use crate::output;

#[derive(Args, Debug)]
pub struct QueryArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub query: QueryOpts,
}

pub async fn run(args: QueryArgs) -> Result<()> {
    let mut config = args.store.load()?;
    args.query.apply(&mut config)?;
    config.validate()?;

    let store = connect(&config).await?;
    benchmark(store.as_ref(), &config, args.query.json.as_deref()).await
}

/// Run the configured rounds, print them and the grand totals
pub async fn benchmark(store: &dyn Store, config: &BenchConfig, json: Option<&Path>) -> Result<()> {
    let cancel = cancel_on_interrupt(config.timeout());
    let options = RoundOptions::from_config(config, cancel.clone());
    let target = config.target();

    output::info(&format!("Running {} rounds, {}...", config.rounds, target));

    let result = run_rounds_with(
        store,
        &config.partition_key,
        config.rounds,
        target,
        &options,
        output::round,
    )
    .await;
    cancel.cancel();

    let summary = result.context("Benchmark failed")?;
    output::grand_totals(&summary);

    if let Some(path) = json {
        let report = BenchReport::new(config, summary);
        write_report(&report, path)?;
        output::success(&format!("JSON report written to {}", path.display()));
    }

    Ok(())
}
