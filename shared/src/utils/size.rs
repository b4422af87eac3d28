//! Response size estimation
//!
//! Items here only carry string attributes, so an item's size is the byte
//! length of every attribute name plus the UTF-8 length of every value. This
//! follows the store's capacity accounting for string attributes and is used
//! for reporting only.

use crate::types::item::Item;

/// Estimated size of a single item in bytes
pub fn item_size_bytes(item: &Item) -> u64 {
    item.iter()
        .map(|(name, value)| (name.len() + value.len()) as u64)
        .sum()
}

/// Estimated size of a query response in bytes
pub fn estimate_response_bytes(items: &[Item]) -> u64 {
    items.iter().map(item_size_bytes).sum()
}
