//! Query responses, measured pages and round targets

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;

use super::item::{Cursor, Item};

/// Per-call limit used when a round asks for "as many items as one call returns".
///
/// Large enough that the store's per-response size ceiling, not the item
/// count, ends the call.
pub const UNBOUNDED_PAGE_LIMIT: u32 = 999_999_999;

/// Raw response of one bounded range query, as returned by a store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Items in sort-key order
    pub items: Vec<Item>,

    /// Number of items returned
    pub count: u32,

    /// Present iff more data may exist past this page
    pub continuation: Option<Cursor>,

    /// Capacity units the store charged for the call
    pub consumed_capacity: f64,
}

/// One response plus the measurements taken around the call
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPage {
    pub items: Vec<Item>,
    pub count: u32,
    pub continuation: Option<Cursor>,
    pub consumed_capacity: f64,

    /// Wall-clock latency of the call in milliseconds
    pub elapsed_ms: f64,

    /// Estimated response size in bytes
    pub bytes: u64,
}

impl QueryPage {
    /// Attach caller-side measurements to a store response
    pub fn measured(response: QueryResponse, elapsed_ms: f64, bytes: u64) -> Self {
        Self {
            items: response.items,
            count: response.count,
            continuation: response.continuation,
            consumed_capacity: response.consumed_capacity,
            elapsed_ms,
            bytes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// How many items a round should retrieve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryTarget {
    /// Retrieve up to `n` items, following continuation cursors
    Bounded(NonZeroU32),

    /// Issue exactly one call with an effectively unbounded limit
    SingleCallUnbounded,
}

impl QueryTarget {
    /// Limit for the first call of a round
    pub fn initial_limit(&self) -> u32 {
        match self {
            QueryTarget::Bounded(n) => n.get(),
            QueryTarget::SingleCallUnbounded => UNBOUNDED_PAGE_LIMIT,
        }
    }

    /// Whether the round keeps paging after the first response
    pub fn follows_cursor(&self) -> bool {
        matches!(self, QueryTarget::Bounded(_))
    }
}

impl From<u32> for QueryTarget {
    fn from(count: u32) -> Self {
        match NonZeroU32::new(count) {
            Some(n) => QueryTarget::Bounded(n),
            None => QueryTarget::SingleCallUnbounded,
        }
    }
}

impl fmt::Display for QueryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryTarget::Bounded(n) => write!(f, "{} items per round", n),
            QueryTarget::SingleCallUnbounded => write!(f, "one unbounded query per round"),
        }
    }
}
