//! Query benchmark harness library
//!
//! This library provides the paginated query accumulator, the store seam with
//! its DynamoDB and in-memory backends, table lifecycle management, seeding,
//! and report output.

pub mod accumulator;
pub mod config;
pub mod error;
pub mod output;
pub mod retry;
pub mod seed;
pub mod store;
pub mod table;

pub use accumulator::{run_round, run_rounds, run_rounds_with, RoundOptions};
pub use config::{BackendKind, BenchConfig, RequestedMode};
pub use error::{BenchError, ConfigError, SeedError, StoreError, TableError};
pub use retry::RetryPolicy;
pub use store::{QueryStore, Store, TableAdmin};
