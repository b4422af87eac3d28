//! In-memory store
//!
//! Keeps one table as partition -> sort key -> item. Queries follow the same
//! rules as the managed store: at most `limit` items, at most
//! [`MAX_RESPONSE_BYTES`] of item data per response, a cursor holding the last
//! evaluated key whenever more items remain, and read capacity charged at
//! 0.5 units per started 4 KB.

use async_trait::async_trait;
use querybench_shared::utils::size::item_size_bytes;
use querybench_shared::{Cursor, Item, KeyValue, QueryResponse};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;
use tracing::debug;

use super::{CapacityMode, KeySchema, QueryStore, TableAdmin, TableDescription, TableStatus};
use crate::error::StoreError;

/// Per-response size ceiling
pub const MAX_RESPONSE_BYTES: u64 = 1024 * 1024;

const READ_UNIT_BYTES: u64 = 4096;

type Partition = BTreeMap<String, Item>;

#[derive(Debug)]
struct MemoryTable {
    capacity: CapacityMode,
    partitions: BTreeMap<String, Partition>,
}

/// Single-table in-process store. Thread-safe.
#[derive(Debug)]
pub struct MemoryStore {
    table_name: String,
    key_schema: KeySchema,
    table: RwLock<Option<MemoryTable>>,
}

impl MemoryStore {
    /// Create a store whose table does not exist yet
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            key_schema: KeySchema::default(),
            table: RwLock::new(None),
        }
    }

    /// Create a store with an existing, empty table
    pub fn with_table(table_name: impl Into<String>, capacity: CapacityMode) -> Self {
        let store = Self::new(table_name);
        if let Ok(mut table) = store.table.write() {
            *table = Some(MemoryTable {
                capacity,
                partitions: BTreeMap::new(),
            });
        }
        store
    }

    /// Number of items in the table (0 when it does not exist)
    pub fn len(&self) -> usize {
        self.table
            .read()
            .ok()
            .and_then(|t| {
                t.as_ref()
                    .map(|t| t.partitions.values().map(|p| p.len()).sum())
            })
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn not_found(&self) -> StoreError {
        StoreError::NotFound(self.table_name.clone())
    }

    fn start_key(&self, cursor: &Cursor) -> Result<String, StoreError> {
        match cursor.get(&self.key_schema.sort_key) {
            Some(KeyValue::S(sk)) => Ok(sk.clone()),
            Some(other) => Err(StoreError::Protocol(format!(
                "cursor sort key must be a string, got {}",
                other
            ))),
            None => Err(StoreError::Protocol(format!(
                "cursor is missing '{}'",
                self.key_schema.sort_key
            ))),
        }
    }

    fn cursor_for(&self, partition_key: &str, sort_key: &str) -> Cursor {
        Cursor::new()
            .with(
                self.key_schema.partition_key.clone(),
                KeyValue::S(partition_key.to_string()),
            )
            .with(
                self.key_schema.sort_key.clone(),
                KeyValue::S(sort_key.to_string()),
            )
    }

    fn split_key<'a>(&self, item: &'a Item) -> Result<(&'a str, &'a str), StoreError> {
        let pk = item.get(&self.key_schema.partition_key);
        let sk = item.get(&self.key_schema.sort_key);
        match (pk, sk) {
            (Some(pk), Some(sk)) => Ok((pk, sk)),
            _ => Err(StoreError::Fatal(format!(
                "item is missing key attribute '{}' or '{}'",
                self.key_schema.partition_key, self.key_schema.sort_key
            ))),
        }
    }
}

/// Read capacity for an eventually consistent read of `bytes`
fn read_capacity_units(bytes: u64) -> f64 {
    let units = bytes.div_ceil(READ_UNIT_BYTES).max(1);
    units as f64 * 0.5
}

#[async_trait]
impl QueryStore for MemoryStore {
    async fn query(
        &self,
        partition_key: &str,
        limit: u32,
        start_after: Option<&Cursor>,
    ) -> Result<QueryResponse, StoreError> {
        let start = start_after.map(|c| self.start_key(c)).transpose()?;

        let guard = self
            .table
            .read()
            .map_err(|e| StoreError::Fatal(e.to_string()))?;
        let table = guard.as_ref().ok_or_else(|| self.not_found())?;

        let Some(partition) = table.partitions.get(partition_key) else {
            return Ok(QueryResponse {
                consumed_capacity: read_capacity_units(0),
                ..QueryResponse::default()
            });
        };

        let lower = match start {
            Some(sk) => Bound::Excluded(sk),
            None => Bound::Unbounded,
        };
        let mut range = partition.range((lower, Bound::Unbounded)).peekable();

        let mut items = Vec::new();
        let mut bytes = 0u64;
        let mut last_sort_key = None;

        while items.len() < limit as usize {
            let Some(&(sk, item)) = range.peek() else {
                break;
            };
            let size = item_size_bytes(item);
            if !items.is_empty() && bytes + size > MAX_RESPONSE_BYTES {
                break;
            }
            bytes += size;
            items.push(item.clone());
            last_sort_key = Some(sk.as_str());
            range.next();
        }

        let continuation = match (range.peek(), last_sort_key) {
            (Some(_), Some(sk)) => Some(self.cursor_for(partition_key, sk)),
            _ => None,
        };

        debug!(
            partition_key,
            limit,
            returned = items.len(),
            more = continuation.is_some(),
            "Memory query"
        );

        Ok(QueryResponse {
            count: items.len() as u32,
            items,
            continuation,
            consumed_capacity: read_capacity_units(bytes),
        })
    }
}

#[async_trait]
impl TableAdmin for MemoryStore {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    fn key_schema(&self) -> &KeySchema {
        &self.key_schema
    }

    async fn describe(&self) -> Result<Option<TableDescription>, StoreError> {
        let guard = self
            .table
            .read()
            .map_err(|e| StoreError::Fatal(e.to_string()))?;
        Ok(guard.as_ref().map(|t| TableDescription {
            status: TableStatus::Active,
            capacity: t.capacity,
        }))
    }

    async fn create_table(&self, capacity: CapacityMode) -> Result<(), StoreError> {
        let mut guard = self
            .table
            .write()
            .map_err(|e| StoreError::Fatal(e.to_string()))?;
        if guard.is_some() {
            return Err(StoreError::Fatal(format!(
                "table '{}' already exists",
                self.table_name
            )));
        }
        *guard = Some(MemoryTable {
            capacity,
            partitions: BTreeMap::new(),
        });
        Ok(())
    }

    async fn update_capacity(&self, capacity: CapacityMode) -> Result<(), StoreError> {
        let mut guard = self
            .table
            .write()
            .map_err(|e| StoreError::Fatal(e.to_string()))?;
        let table = guard.as_mut().ok_or_else(|| self.not_found())?;
        table.capacity = capacity;
        Ok(())
    }

    async fn scan_keys(&self) -> Result<Vec<Item>, StoreError> {
        let guard = self
            .table
            .read()
            .map_err(|e| StoreError::Fatal(e.to_string()))?;
        let table = guard.as_ref().ok_or_else(|| self.not_found())?;
        Ok(table
            .partitions
            .values()
            .flat_map(|p| p.values())
            .filter_map(|item| self.key_schema.key_of(item))
            .collect())
    }

    async fn delete_keys(&self, keys: Vec<Item>) -> Result<(), StoreError> {
        let mut guard = self
            .table
            .write()
            .map_err(|e| StoreError::Fatal(e.to_string()))?;
        let table = guard.as_mut().ok_or_else(|| self.not_found())?;
        for key in &keys {
            let (pk, sk) = self.split_key(key)?;
            if let Some(partition) = table.partitions.get_mut(pk) {
                partition.remove(sk);
                if partition.is_empty() {
                    table.partitions.remove(pk);
                }
            }
        }
        Ok(())
    }

    async fn put_items(&self, items: Vec<Item>) -> Result<(), StoreError> {
        let mut guard = self
            .table
            .write()
            .map_err(|e| StoreError::Fatal(e.to_string()))?;
        let table = guard.as_mut().ok_or_else(|| self.not_found())?;
        for item in items {
            let (pk, sk) = self.split_key(&item)?;
            let (pk, sk) = (pk.to_string(), sk.to_string());
            table.partitions.entry(pk).or_default().insert(sk, item);
        }
        Ok(())
    }
}
