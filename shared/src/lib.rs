//! Shared types and utilities for querybench
//!
//! This crate contains the plain data structures passed between the query
//! harness and the command-line front end: items, continuation cursors, pages,
//! per-round accumulator state and grand totals.

pub mod types;
pub mod utils;

// Re-export commonly used types
pub use types::{item::*, page::*, totals::*};
