//! Benchmark reports

pub mod json;

use querybench_shared::utils::time::now_rfc3339;
use querybench_shared::{BenchSummary, QueryTarget};
use serde::{Deserialize, Serialize};

use crate::config::{BackendKind, BenchConfig};

/// A finished run together with what it ran against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchReport {
    pub table: String,
    pub backend: BackendKind,
    pub partition_key: String,
    pub target: QueryTarget,
    pub rounds: u32,

    /// RFC 3339 completion time
    pub finished_at: String,

    pub summary: BenchSummary,
}

impl BenchReport {
    pub fn new(config: &BenchConfig, summary: BenchSummary) -> Self {
        Self {
            table: config.table.clone(),
            backend: config.backend,
            partition_key: config.partition_key.clone(),
            target: summary.target,
            rounds: summary.totals.rounds,
            finished_at: now_rfc3339(),
            summary,
        }
    }
}
