//! Benchmark configuration
//!
//! Layering, lowest to highest precedence: serde defaults, an optional TOML
//! file, `QUERYBENCH_*` environment variables. The CLI applies its flags on
//! top of the loaded value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use querybench_shared::QueryTarget;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use crate::table::CapacityRequest;

/// Environment variable prefix, e.g. `QUERYBENCH_TABLE`, `QUERYBENCH_RETRY__MAX_ATTEMPTS`
pub const ENV_PREFIX: &str = "QUERYBENCH";

/// Store backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Dynamo,
    Memory,
}

impl std::str::FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dynamo" | "dynamodb" => Ok(BackendKind::Dynamo),
            "memory" => Ok(BackendKind::Memory),
            _ => Err(ConfigError::Invalid(format!("unknown backend: {}", s))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Dynamo => f.write_str("dynamo"),
            BackendKind::Memory => f.write_str("memory"),
        }
    }
}

/// Billing mode asked for by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestedMode {
    #[serde(rename = "PAY_PER_REQUEST")]
    PayPerRequest,
    #[serde(rename = "PROVISIONED")]
    Provisioned,
}

impl std::str::FromStr for RequestedMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PAY_PER_REQUEST" | "ON_DEMAND" => Ok(RequestedMode::PayPerRequest),
            "PROVISIONED" => Ok(RequestedMode::Provisioned),
            _ => Err(ConfigError::Invalid(format!(
                "unrecognized capacity mode \"{}\" (expected PAY_PER_REQUEST or PROVISIONED)",
                s
            ))),
        }
    }
}

impl fmt::Display for RequestedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestedMode::PayPerRequest => f.write_str("PAY_PER_REQUEST"),
            RequestedMode::Provisioned => f.write_str("PROVISIONED"),
        }
    }
}

/// Everything a benchmark run needs. Built once, passed down by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Table to create, seed and query
    pub table: String,

    pub backend: BackendKind,

    pub region: String,

    /// Endpoint override (e.g. a local DynamoDB)
    pub endpoint: Option<String>,

    /// Partition key every seeded item shares
    pub partition_key: String,

    /// Schema file used for seeding
    pub schema: PathBuf,

    /// Number of items to seed
    pub seed: u64,

    /// Keep existing items and skip seeding
    pub skip_seed: bool,

    /// Items per round (0 = one unbounded call per round)
    pub query: u32,

    pub rounds: u32,

    pub mode: Option<RequestedMode>,
    pub rcu: Option<i64>,
    pub wcu: Option<i64>,

    pub retry: RetryPolicy,

    /// Per-call timeout in milliseconds
    pub call_timeout_ms: Option<u64>,

    /// Whole-run timeout in milliseconds
    pub timeout_ms: Option<u64>,

    /// Interval between table status checks
    pub poll_interval_ms: u64,

    /// Give up waiting for ACTIVE after this long
    pub max_active_wait_secs: u64,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            table: "query_testing_table".to_string(),
            backend: BackendKind::Dynamo,
            region: "us-east-1".to_string(),
            endpoint: None,
            partition_key: "1000".to_string(),
            schema: PathBuf::from("schemas/long.schema"),
            seed: 10_000,
            skip_seed: false,
            query: 2500,
            rounds: 10,
            mode: None,
            rcu: None,
            wcu: None,
            retry: RetryPolicy::default(),
            call_timeout_ms: None,
            timeout_ms: None,
            poll_interval_ms: 5000,
            max_active_wait_secs: 600,
        }
    }
}

impl BenchConfig {
    /// Load defaults, then `path` (if any), then the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn target(&self) -> QueryTarget {
        QueryTarget::from(self.query)
    }

    pub fn capacity_request(&self) -> CapacityRequest {
        CapacityRequest {
            mode: self.mode,
            rcu: self.rcu,
            wcu: self.wcu,
        }
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_active_wait(&self) -> Duration {
        Duration::from_secs(self.max_active_wait_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table.trim().is_empty() {
            return Err(ConfigError::Invalid("table name must not be empty".into()));
        }

        if self.partition_key.is_empty() {
            return Err(ConfigError::Invalid(
                "partition key must not be empty".into(),
            ));
        }

        if self.region.trim().is_empty() && self.backend == BackendKind::Dynamo {
            return Err(ConfigError::Invalid("region must not be empty".into()));
        }

        for (name, value) in [("rcu", self.rcu), ("wcu", self.wcu)] {
            if matches!(value, Some(v) if v < 1) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be at least 1",
                    name
                )));
            }
        }

        if self.call_timeout_ms == Some(0) || self.timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "timeouts must be greater than 0".into(),
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll interval must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}
