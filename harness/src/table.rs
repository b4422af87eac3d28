//! Table lifecycle: create, wait for ACTIVE, change capacity, clear

use std::time::{Duration, Instant};

use querybench_shared::Item;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{BenchConfig, RequestedMode};
use crate::error::{StoreError, TableError};
use crate::store::{CapacityMode, TableAdmin, TableStatus, MAX_BATCH_WRITE};

/// Capacity used when a table is created without explicit units
pub const DEFAULT_CAPACITY_UNITS: i64 = 200;

/// Billing mode and units as given by the operator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityRequest {
    pub mode: Option<RequestedMode>,
    pub rcu: Option<i64>,
    pub wcu: Option<i64>,
}

impl CapacityRequest {
    /// Billing mode for a table that does not exist yet.
    ///
    /// Anything but an explicit `PAY_PER_REQUEST` is provisioned, with
    /// missing units defaulting to [`DEFAULT_CAPACITY_UNITS`].
    pub fn for_new_table(&self) -> CapacityMode {
        match self.mode {
            Some(RequestedMode::PayPerRequest) => CapacityMode::OnDemand,
            Some(RequestedMode::Provisioned) | None => CapacityMode::Provisioned {
                rcu: self.rcu.unwrap_or(DEFAULT_CAPACITY_UNITS),
                wcu: self.wcu.unwrap_or(DEFAULT_CAPACITY_UNITS),
            },
        }
    }
}

/// How to wait for a table to become ACTIVE
#[derive(Debug, Clone, Copy)]
pub struct ActiveWait {
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl ActiveWait {
    pub fn from_config(config: &BenchConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            max_wait: config.max_active_wait(),
        }
    }
}

impl Default for ActiveWait {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(600),
        }
    }
}

/// What `ensure_table` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableSetup {
    Created(CapacityMode),
    /// Existing table, items left in place
    Kept,
    /// Existing table, this many items deleted
    Cleared(u64),
}

/// Decide whether the table's billing needs to change.
///
/// Returns the new capacity, or `None` when nothing needs to change.
pub fn plan_capacity_change(
    current: CapacityMode,
    requested: &CapacityRequest,
) -> Result<Option<CapacityMode>, TableError> {
    let wanted = match requested.mode {
        None => return Ok(None),
        Some(RequestedMode::PayPerRequest) => CapacityMode::OnDemand,
        Some(RequestedMode::Provisioned) => match (requested.rcu, requested.wcu) {
            (Some(rcu), Some(wcu)) => CapacityMode::Provisioned { rcu, wcu },
            _ => return Err(TableError::MissingCapacity),
        },
    };

    if wanted == current {
        Ok(None)
    } else {
        Ok(Some(wanted))
    }
}

/// Poll until the table reports ACTIVE
pub async fn wait_until_active<A: TableAdmin + ?Sized>(
    admin: &A,
    wait: &ActiveWait,
) -> Result<(), TableError> {
    let started = Instant::now();

    loop {
        let description = admin
            .describe()
            .await?
            .ok_or_else(|| TableError::Missing(admin.table_name().to_string()))?;

        if description.status == TableStatus::Active {
            info!("Table is now active.");
            return Ok(());
        }

        if started.elapsed() >= wait.max_wait {
            return Err(TableError::ActivationTimeout(wait.max_wait));
        }

        info!(
            "Table is {}, waiting for it to become ACTIVE...",
            description.status
        );
        tokio::time::sleep(wait.poll_interval).await;
    }
}

/// Make sure the table exists and is ready for seeding.
///
/// An existing table keeps its items when `skip_seed` is set. Otherwise all
/// items are deleted, but only if `confirm` agrees. A missing table is
/// created from `request` and waited on.
pub async fn ensure_table<A, C, P>(
    admin: &A,
    request: &CapacityRequest,
    skip_seed: bool,
    wait: &ActiveWait,
    confirm: C,
    on_deleted: P,
) -> Result<TableSetup, TableError>
where
    A: TableAdmin + ?Sized,
    C: FnOnce() -> bool,
    P: FnMut(u64),
{
    if admin.describe().await?.is_some() {
        info!("Table \"{}\" already exists...", admin.table_name());

        if skip_seed {
            info!("Skipping delete of existing items...");
            return Ok(TableSetup::Kept);
        }

        warn!("Proceeding will delete all existing data!");
        if !confirm() {
            return Err(TableError::Aborted);
        }

        let deleted = clear_table(admin, on_deleted).await?;
        return Ok(TableSetup::Cleared(deleted));
    }

    let capacity = request.for_new_table();
    info!(
        "Creating table \"{}\" with {} capacity...",
        admin.table_name(),
        capacity
    );
    admin.create_table(capacity).await?;
    wait_until_active(admin, wait).await?;

    Ok(TableSetup::Created(capacity))
}

/// Change billing mode or provisioned capacity if `request` differs from
/// the table's current settings. Returns the applied capacity, if any.
pub async fn apply_capacity_change<A: TableAdmin + ?Sized>(
    admin: &A,
    request: &CapacityRequest,
    wait: &ActiveWait,
) -> Result<Option<CapacityMode>, TableError> {
    let description = admin
        .describe()
        .await?
        .ok_or_else(|| TableError::Missing(admin.table_name().to_string()))?;

    info!("Table is currently {} capacity mode...", description.capacity);

    let change = plan_capacity_change(description.capacity, request)?;
    if request.mode.is_none() {
        info!("No changes to capacity mode specified...");
        return Ok(None);
    }

    if description.status != TableStatus::Active {
        return Err(TableError::NotActive(description.status));
    }

    let Some(capacity) = change else {
        info!("Capacity already matches, nothing to change");
        return Ok(None);
    };

    info!("Changing table to {} capacity...", capacity);
    admin.update_capacity(capacity).await?;
    wait_until_active(admin, wait).await?;

    Ok(Some(capacity))
}

/// Delete every item in the table. Returns the number deleted.
///
/// `on_deleted` is called with the running total after every batch.
pub async fn clear_table<A, P>(admin: &A, mut on_deleted: P) -> Result<u64, StoreError>
where
    A: TableAdmin + ?Sized,
    P: FnMut(u64),
{
    info!("Scanning for items to delete...");
    let keys: Vec<Item> = admin.scan_keys().await?;

    info!("Deleting {} items...", keys.len());
    let mut deleted = 0u64;
    for chunk in keys.chunks(MAX_BATCH_WRITE) {
        admin.delete_keys(chunk.to_vec()).await?;
        deleted += chunk.len() as u64;
        on_deleted(deleted);
    }

    info!("{} items deleted.", deleted);
    Ok(deleted)
}
