//! Round accumulation and grand totals
//!
//! `AccumulatorState` is owned by exactly one round. `RoundTotals` is only
//! ever built by absorbing finished round states.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::item::Cursor;
use super::page::QueryTarget;

/// Why a round stopped paging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The bounded target was met
    TargetReached,

    /// Single-call mode; cursor following disabled
    SingleCall,

    /// The store returned no continuation cursor
    NoMoreData,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::TargetReached => "target reached",
            StopReason::SingleCall => "single call",
            StopReason::NoMoreData => "no more data",
        };
        f.write_str(s)
    }
}

/// Running totals for one round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccumulatorState {
    pub items_retrieved: u64,
    pub queries_issued: u64,

    /// Items still needed; may dip below zero, read as zero
    pub remaining: i64,

    /// Continuation from the latest page (`None` = start of range or exhausted)
    pub cursor: Option<Cursor>,

    pub consumed_capacity: f64,
    pub elapsed_ms: f64,
    pub bytes: u64,

    /// Set once the round has finished
    pub stop: Option<StopReason>,
}

impl AccumulatorState {
    /// Fresh state at the start of the partition
    pub fn new(target: QueryTarget) -> Self {
        Self {
            items_retrieved: 0,
            queries_issued: 0,
            remaining: i64::from(target.initial_limit()),
            cursor: None,
            consumed_capacity: 0.0,
            elapsed_ms: 0.0,
            bytes: 0,
            stop: None,
        }
    }

    /// Limit for the next call, clamped to what the store accepts
    pub fn next_limit(&self) -> u32 {
        self.remaining.clamp(0, i64::from(u32::MAX)) as u32
    }

    /// Account for a page that took `attempts` store round trips to fetch
    pub fn record_page(
        &mut self,
        attempts: u32,
        elapsed_ms: f64,
        bytes: u64,
        consumed_capacity: f64,
    ) {
        self.queries_issued += u64::from(attempts);
        self.elapsed_ms += elapsed_ms;
        self.bytes += bytes;
        self.consumed_capacity += consumed_capacity;
    }

    /// Account for the items of a non-empty page
    pub fn record_items(&mut self, count: u32) {
        self.items_retrieved += u64::from(count);
        self.remaining -= i64::from(count);
    }

    pub fn target_met(&self) -> bool {
        self.remaining <= 0
    }

    pub fn finish(&mut self, reason: StopReason) {
        self.stop = Some(reason);
    }
}

/// Sum of round states over a benchmark
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundTotals {
    pub rounds: u32,
    pub items_retrieved: u64,
    pub queries_issued: u64,
    pub consumed_capacity: f64,
    pub elapsed_ms: f64,
    pub bytes: u64,
}

impl RoundTotals {
    /// Fold a finished round into the totals
    pub fn absorb(&mut self, state: &AccumulatorState) {
        self.rounds += 1;
        self.items_retrieved += state.items_retrieved;
        self.queries_issued += state.queries_issued;
        self.consumed_capacity += state.consumed_capacity;
        self.elapsed_ms += state.elapsed_ms;
        self.bytes += state.bytes;
    }

    /// Average latency per item, `None` when nothing was retrieved
    pub fn avg_ms_per_item(&self) -> Option<f64> {
        if self.items_retrieved == 0 {
            return None;
        }
        Some(self.elapsed_ms / self.items_retrieved as f64)
    }
}

/// Grand totals of a benchmark run with the derived per-item latency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchSummary {
    pub target: QueryTarget,
    pub totals: RoundTotals,
    pub avg_ms_per_item: f64,
}
