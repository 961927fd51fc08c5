//! Provisioned capacity of the two tables and how it gets changed.

use std::sync::Arc;
use tracing::{debug, info};

use crate::Error;
use crate::sleeper::Sleeper;
use crate::table::{Capacity, StorageBackend};

/// Provisioned capacity of the source and target tables
///
/// A side is `None` when its table is on-demand and has no capacity to
/// change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Provisioning {
    /// Capacity of the source table
    pub source: Option<Capacity>,
    /// Capacity of the target table
    pub target: Option<Capacity>,
}

impl Provisioning {
    /// Pair of source and target capacities
    pub fn new(source: Option<Capacity>, target: Option<Capacity>) -> Self {
        Self { source, target }
    }
}

/// Whether `requested` raises either half of `current`
///
/// Capacity is only ever raised through this check; lowering happens when the
/// original provisioning is restored.
pub fn needs_update(current: Capacity, requested: Capacity) -> bool {
    requested.read > current.read || requested.write > current.write
}

/// Applies capacity changes to a table and waits for them to take effect
#[derive(Debug, Clone)]
pub struct CapacityNegotiator {
    backend: Arc<dyn StorageBackend>,
    sleeper: Arc<dyn Sleeper>,
}

impl CapacityNegotiator {
    /// Negotiator over `backend`, polling through `sleeper`
    pub fn new(backend: Arc<dyn StorageBackend>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { backend, sleeper }
    }

    /// Request `desired` on `table` and wait until the table is active again
    ///
    /// There is no deadline; wrap the future in `tokio::time::timeout` if one
    /// is needed.
    pub async fn apply(&self, table: &str, desired: Capacity) -> Result<(), Error> {
        desired.validate()?;

        info!(table, read = desired.read, write = desired.write, "updating capacity");
        self.backend.update_capacity(table, desired).await?;

        self.wait_until_active(table).await
    }

    /// Poll `table` until it reports `Active`
    pub async fn wait_until_active(&self, table: &str) -> Result<(), Error> {
        let mut elapsed: u64 = 0;

        for attempt in 0u64.. {
            let description = self.backend.describe_table(table).await?;
            if description.status.is_active() {
                debug!(table, attempt, "table is active");
                break;
            }

            debug!(table, attempt, status = ?description.status, "waiting for table");
            let slept = self
                .sleeper
                .sleep(elapsed.saturating_mul(attempt))
                .await;
            elapsed = elapsed.saturating_add(slept);
        }

        Ok(())
    }
}
