//! Store backends
//!
//! The accumulator only needs [`QueryStore`]. Table setup, seeding and
//! cleanup go through [`TableAdmin`]. Both backends implement both.

pub mod dynamo;
pub mod memory;

use async_trait::async_trait;
use querybench_shared::{Cursor, Item, QueryResponse};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::config::{BackendKind, BenchConfig};
use crate::error::StoreError;

/// Largest number of write requests accepted by one batch write
pub const MAX_BATCH_WRITE: usize = 25;

/// Bounded, cursor-based range query over one partition
#[async_trait]
pub trait QueryStore: Send + Sync {
    /// Return up to `limit` items of `partition_key` in sort-key order,
    /// starting after `start_after` when given.
    async fn query(
        &self,
        partition_key: &str,
        limit: u32,
        start_after: Option<&Cursor>,
    ) -> Result<QueryResponse, StoreError>;
}

/// Table lifecycle and bulk item operations
#[async_trait]
pub trait TableAdmin: Send + Sync {
    fn table_name(&self) -> &str;

    fn key_schema(&self) -> &KeySchema;

    /// Current table state, `None` when the table does not exist
    async fn describe(&self) -> Result<Option<TableDescription>, StoreError>;

    async fn create_table(&self, capacity: CapacityMode) -> Result<(), StoreError>;

    async fn update_capacity(&self, capacity: CapacityMode) -> Result<(), StoreError>;

    /// Primary keys of every item in the table
    async fn scan_keys(&self) -> Result<Vec<Item>, StoreError>;

    /// Delete at most [`MAX_BATCH_WRITE`] items by primary key
    async fn delete_keys(&self, keys: Vec<Item>) -> Result<(), StoreError>;

    /// Write at most [`MAX_BATCH_WRITE`] items
    async fn put_items(&self, items: Vec<Item>) -> Result<(), StoreError>;
}

/// A backend usable for the whole benchmark
pub trait Store: QueryStore + TableAdmin {}

impl<T: QueryStore + TableAdmin + ?Sized> Store for T {}

/// Primary key attribute names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySchema {
    pub partition_key: String,
    pub sort_key: String,
}

impl Default for KeySchema {
    fn default() -> Self {
        Self {
            partition_key: "hash_id".to_string(),
            sort_key: "sort_id".to_string(),
        }
    }
}

impl KeySchema {
    /// Whether `name` is one of the key attributes
    pub fn is_key_attribute(&self, name: &str) -> bool {
        name == self.partition_key || name == self.sort_key
    }

    /// Project an item down to its primary key
    pub fn key_of(&self, item: &Item) -> Option<Item> {
        let pk = item.get(&self.partition_key)?;
        let sk = item.get(&self.sort_key)?;
        let mut key = Item::new();
        key.insert(self.partition_key.clone(), pk.clone());
        key.insert(self.sort_key.clone(), sk.clone());
        Some(key)
    }
}

/// Table lifecycle status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableStatus {
    Creating,
    Updating,
    Deleting,
    Active,
    Other(String),
}

impl fmt::Display for TableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableStatus::Creating => f.write_str("CREATING"),
            TableStatus::Updating => f.write_str("UPDATING"),
            TableStatus::Deleting => f.write_str("DELETING"),
            TableStatus::Active => f.write_str("ACTIVE"),
            TableStatus::Other(s) => f.write_str(s),
        }
    }
}

/// Billing mode and, when provisioned, its read/write capacity units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapacityMode {
    OnDemand,
    Provisioned { rcu: i64, wcu: i64 },
}

impl fmt::Display for CapacityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapacityMode::OnDemand => f.write_str("PAY_PER_REQUEST"),
            CapacityMode::Provisioned { rcu, wcu } => {
                write!(f, "PROVISIONED with {} RCU and {} WCU", rcu, wcu)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescription {
    pub status: TableStatus,
    pub capacity: CapacityMode,
}

/// Build the backend selected by `config`
pub async fn connect(config: &BenchConfig) -> Result<Arc<dyn Store>, StoreError> {
    match config.backend {
        BackendKind::Dynamo => {
            let store = dynamo::DynamoStore::connect(
                &config.table,
                &config.region,
                config.endpoint.as_deref(),
                config.retry,
            )
            .await?;
            Ok(Arc::new(store))
        }
        BackendKind::Memory => Ok(Arc::new(memory::MemoryStore::new(&config.table))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_of_projects_key_attributes() {
        let schema = KeySchema::default();
        let item: Item = [
            ("hash_id", "1000"),
            ("sort_id", "0000000001"),
            ("field1", "ABC"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let key = schema.key_of(&item).unwrap();
        assert_eq!(key.len(), 2);
        assert_eq!(key["sort_id"], "0000000001");
        assert!(schema.is_key_attribute("hash_id"));
        assert!(!schema.is_key_attribute("field1"));
    }

    #[test]
    fn test_key_of_requires_both_attributes() {
        let schema = KeySchema::default();
        let mut item = Item::new();
        item.insert("hash_id".to_string(), "1000".to_string());
        assert!(schema.key_of(&item).is_none());
    }

    #[test]
    fn test_capacity_display() {
        assert_eq!(CapacityMode::OnDemand.to_string(), "PAY_PER_REQUEST");
        assert_eq!(
            CapacityMode::Provisioned { rcu: 200, wcu: 100 }.to_string(),
            "PROVISIONED with 200 RCU and 100 WCU"
        );
    }
}
