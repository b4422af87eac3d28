//! Error types for the harness

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::store::TableStatus;

/// Failure of a single store call
#[derive(Debug, Error)]
pub enum StoreError {
    /// Request rate or provisioned throughput exceeded
    #[error("throttled: {0}")]
    Throttled(String),

    /// Network or service-side failure that may succeed on retry
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("table not found: {0}")]
    NotFound(String),

    /// The store answered outside its own contract
    #[error("store protocol violation: {0}")]
    Protocol(String),

    #[error("{0}")]
    Fatal(String),
}

impl StoreError {
    /// Whether retrying the same call could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Throttled(_) | StoreError::Transient(_) | StoreError::Timeout(_)
        )
    }
}

/// Failure of a benchmark round or run
#[derive(Debug, Error)]
pub enum BenchError {
    #[error(
        "query returned 0 items after {queries_issued} call(s) and {items_retrieved} item(s); is the table seeded?"
    )]
    TableEmptyOrExhausted {
        queries_issued: u64,
        items_retrieved: u64,
    },

    #[error("no items retrieved across {rounds} round(s); cannot compute time per item")]
    NoData { rounds: u32 },

    #[error("benchmark cancelled")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failure while reading a schema file or seeding a table
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read schema file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("schema line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("schema field '{0}' collides with a key attribute")]
    ReservedField(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure while creating, updating or clearing a table
#[derive(Debug, Error)]
pub enum TableError {
    #[error("table '{0}' does not exist")]
    Missing(String),

    #[error("table status is {0}, cannot update capacity unless table is ACTIVE")]
    NotActive(TableStatus),

    #[error("you must provide --rcu and --wcu when using --mode PROVISIONED")]
    MissingCapacity,

    #[error("table did not become ACTIVE within {0:?}")]
    ActivationTimeout(Duration),

    #[error("stopped by operator")]
    Aborted,

    #[error(transparent)]
    Store(#[from] StoreError),
}
