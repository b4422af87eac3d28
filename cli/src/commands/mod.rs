//! Subcommands and the flags they share

pub mod clean;
pub mod config;
pub mod query;
pub mod run;
pub mod seed;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use querybench_harness::store::{self, Store};
use querybench_harness::table::{self, ActiveWait, TableSetup};
use querybench_harness::{BackendKind, BenchConfig, RequestedMode, TableError};
use querybench_shared::utils::parse_duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{output, prompt};

/// Where the table lives and how to reach it
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Table to use for testing [default: query_testing_table]
    #[arg(long)]
    pub table: Option<String>,

    /// Region name for auth and endpoint construction [default: us-east-1]
    #[arg(long)]
    pub region: Option<String>,

    /// Override endpoint (e.g. http://localhost:8000)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Store backend: dynamo or memory
    #[arg(long)]
    pub backend: Option<BackendKind>,

    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl StoreArgs {
    /// Load file and environment configuration, then apply these flags
    pub fn load(&self) -> Result<BenchConfig> {
        let mut config =
            BenchConfig::load(self.config.as_deref()).context("Failed to load configuration")?;

        if let Some(table) = &self.table {
            config.table = table.clone();
        }
        if let Some(region) = &self.region {
            config.region = region.clone();
        }
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = Some(endpoint.clone());
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }

        Ok(config)
    }
}

/// How to run query rounds
#[derive(Args, Debug, Clone)]
pub struct QueryOpts {
    /// Items to query per round; 0 = one query per round, as many items as it returns [default: 2500]
    #[arg(long)]
    pub query: Option<u32>,

    /// Number of rounds [default: 10]
    #[arg(long)]
    pub rounds: Option<u32>,

    /// Partition key value to query [default: 1000]
    #[arg(long)]
    pub partition_key: Option<String>,

    /// Stop the whole benchmark after this long (e.g. "30s", "5m")
    #[arg(long)]
    pub timeout: Option<String>,

    /// Give up on a single store call after this long (e.g. "500ms", "2s")
    #[arg(long)]
    pub call_timeout: Option<String>,

    /// Also write the results as JSON to this path
    #[arg(long)]
    pub json: Option<PathBuf>,
}

impl QueryOpts {
    pub fn apply(&self, config: &mut BenchConfig) -> Result<()> {
        if let Some(query) = self.query {
            config.query = query;
        }
        if let Some(rounds) = self.rounds {
            config.rounds = rounds;
        }
        if let Some(key) = &self.partition_key {
            config.partition_key = key.clone();
        }
        if let Some(timeout) = &self.timeout {
            config.timeout_ms = Some(duration_ms(timeout).context("Failed to parse --timeout")?);
        }
        if let Some(timeout) = &self.call_timeout {
            config.call_timeout_ms =
                Some(duration_ms(timeout).context("Failed to parse --call-timeout")?);
        }
        Ok(())
    }
}

/// How to prepare and seed the table
#[derive(Args, Debug, Clone)]
pub struct SeedOpts {
    /// File containing the schema of generated items [default: schemas/long.schema]
    #[arg(long)]
    pub schema: Option<PathBuf>,

    /// Number of items to write to the table [default: 10000]
    #[arg(long)]
    pub seed: Option<u64>,

    /// Keep existing table items and skip seeding
    #[arg(long)]
    pub skip_seed: bool,

    /// Table capacity mode: PAY_PER_REQUEST or PROVISIONED
    #[arg(long)]
    pub mode: Option<RequestedMode>,

    /// Read capacity units (provisioned mode only)
    #[arg(long)]
    pub rcu: Option<i64>,

    /// Write capacity units (provisioned mode only)
    #[arg(long)]
    pub wcu: Option<i64>,

    /// Delete existing items without asking
    #[arg(short, long)]
    pub yes: bool,
}

impl SeedOpts {
    pub fn apply(&self, config: &mut BenchConfig) {
        if let Some(schema) = &self.schema {
            config.schema = schema.clone();
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if self.skip_seed {
            config.skip_seed = true;
        }
        if self.mode.is_some() {
            config.mode = self.mode;
        }
        if self.rcu.is_some() {
            config.rcu = self.rcu;
        }
        if self.wcu.is_some() {
            config.wcu = self.wcu;
        }
    }
}

fn duration_ms(s: &str) -> Result<u64> {
    let duration = parse_duration(s)?;
    u64::try_from(duration.as_millis()).context("Duration too large")
}

pub async fn connect(config: &BenchConfig) -> Result<Arc<dyn Store>> {
    store::connect(config)
        .await
        .with_context(|| format!("Failed to connect to {} backend", config.backend))
}

/// Create or reset the table, then apply any requested capacity change
pub async fn prepare_table(store: &dyn Store, config: &BenchConfig, assume_yes: bool) -> Result<()> {
    let wait = ActiveWait::from_config(config);
    let request = config.capacity_request();

    let spinner = output::DeferredSpinner::new("Deleting items");
    let setup = table::ensure_table(
        store,
        &request,
        config.skip_seed,
        &wait,
        || {
            let proceed = prompt::confirm("OK to proceed", assume_yes);
            if proceed {
                spinner.start();
            }
            proceed
        },
        |deleted| spinner.set_position(deleted),
    )
    .await;
    spinner.finish_and_clear();

    match setup {
        Ok(TableSetup::Created(capacity)) => {
            output::success(&format!("Created table \"{}\" ({})", config.table, capacity))
        }
        Ok(TableSetup::Cleared(deleted)) => {
            output::info(&format!("{} items deleted", deleted))
        }
        Ok(TableSetup::Kept) => output::info("Keeping existing items"),
        Err(TableError::Aborted) => {
            output::warning("Program execution stopped.");
            return Err(TableError::Aborted.into());
        }
        Err(e) => return Err(e).context("Failed to prepare table"),
    }

    if let Some(capacity) = table::apply_capacity_change(store, &request, &wait)
        .await
        .context("Failed to update table capacity")?
    {
        output::success(&format!("Table capacity is now {}", capacity));
    }

    Ok(())
}

/// Token cancelled on Ctrl-C and, if given, once `timeout` has elapsed
pub fn cancel_on_interrupt(timeout: Option<Duration>) -> CancellationToken {
    let cancel = CancellationToken::new();

    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the in-flight call");
            on_signal.cancel();
        }
    });

    if let Some(timeout) = timeout {
        let on_timeout = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    warn!("Timeout of {:?} reached, stopping", timeout);
                    on_timeout.cancel();
                }
                _ = on_timeout.cancelled() => {}
            }
        });
    }

    cancel
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_args() -> StoreArgs {
        StoreArgs {
            table: Some("bench".to_string()),
            region: None,
            endpoint: Some("http://localhost:8000".to_string()),
            backend: Some(BackendKind::Memory),
            config: None,
            verbose: false,
        }
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = store_args().load().unwrap();
        assert_eq!(config.table, "bench");
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:8000"));
        assert_eq!(config.backend, BackendKind::Memory);
    }

    #[test]
    fn test_query_opts() {
        let mut config = BenchConfig::default();
        let opts = QueryOpts {
            query: Some(0),
            rounds: Some(3),
            partition_key: None,
            timeout: Some("2m".to_string()),
            call_timeout: Some("750ms".to_string()),
            json: None,
        };
        opts.apply(&mut config).unwrap();

        assert_eq!(config.query, 0);
        assert_eq!(config.rounds, 3);
        assert_eq!(config.timeout_ms, Some(120_000));
        assert_eq!(config.call_timeout_ms, Some(750));
    }

    #[test]
    fn test_bad_duration_is_rejected() {
        let opts = QueryOpts {
            query: None,
            rounds: None,
            partition_key: None,
            timeout: Some("soon".to_string()),
            call_timeout: None,
            json: None,
        };
        assert!(opts.apply(&mut BenchConfig::default()).is_err());
    }

    #[test]
    fn test_seed_opts() {
        let mut config = BenchConfig::default();
        let opts = SeedOpts {
            schema: None,
            seed: Some(50),
            skip_seed: true,
            mode: Some(RequestedMode::Provisioned),
            rcu: Some(10),
            wcu: None,
            yes: false,
        };
        opts.apply(&mut config);

        assert_eq!(config.seed, 50);
        assert!(config.skip_seed);
        assert_eq!(config.mode, Some(RequestedMode::Provisioned));
        assert_eq!(config.rcu, Some(10));
        assert_eq!(config.wcu, None);
    }
}
