//! Config command: show the merged configuration

use anyhow::{Context, Result};
use clap::Args;

use super::{QueryOpts, SeedOpts, StoreArgs};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub seed: SeedOpts,

    #[command(flatten)]
    pub query: QueryOpts,
}

pub fn run(args: ConfigArgs) -> Result<()> {
    let mut config = args.store.load()?;
    args.seed.apply(&mut config);
    args.query.apply(&mut config)?;
    config.validate()?;

    let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
    print!("{}", rendered);
    Ok(())
}
