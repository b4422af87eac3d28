//! Data types for query benchmarking

pub mod item;
pub mod page;
pub mod totals;
