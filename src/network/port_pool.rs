//! Resource allocator for the bounded host-port pool.
//!
//! All state lives in the catalog's `port_pool` table. Allocation is a
//! single conditional update, so it stays correct across processes
//! sharing one catalog; nothing is cached in memory.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::PortRangeConfig;
use crate::database::{Database, PortRepository};
use crate::error::{Result, TenantBoxError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortPoolStats {
    pub total: i64,
    pub available: i64,
}

#[derive(Debug, Clone)]
pub struct PortAllocator {
    range: PortRangeConfig,
}

impl PortAllocator {
    pub fn new(range: PortRangeConfig) -> Self {
        Self { range }
    }

    pub fn range(&self) -> PortRangeConfig {
        self.range
    }

    /// Make sure every port of the configured range has a pool row.
    /// Existing rows, and therefore current assignments, are untouched.
    pub async fn seed(&self, db: &Database) -> Result<PortPoolStats> {
        if self.range.is_empty() {
            return Err(TenantBoxError::config(format!(
                "empty port range {}-{}",
                self.range.start, self.range.end
            )));
        }

        let added = PortRepository::new(db)
            .seed(self.range.start, self.range.end)
            .await?;
        let stats = self.stats(db).await?;
        info!(
            "Port pool {}-{} ready: {} added, {}/{} available",
            self.range.start, self.range.end, added, stats.available, stats.total
        );
        Ok(stats)
    }

    /// Take the lowest free port for `owner`.
    pub async fn allocate(&self, db: &Database, owner: &str) -> Result<u16> {
        match PortRepository::new(db).claim_lowest(owner).await? {
            Some(port) => {
                if !self.range.contains(port) {
                    // Left over from an earlier, wider configuration.
                    warn!("Allocated port {} lies outside configured range {}-{}", port, self.range.start, self.range.end);
                }
                info!("Allocated port {} to {}", port, owner);
                Ok(port)
            }
            None => {
                warn!("Port pool exhausted while allocating for {}", owner);
                Err(TenantBoxError::PoolExhausted)
            }
        }
    }

    /// Return `port` to the pool. Idempotent.
    pub async fn release(&self, db: &Database, port: u16) -> Result<()> {
        if PortRepository::new(db).release(port).await? {
            info!("Released port {}", port);
        } else {
            debug!("Release of port {} was a no-op", port);
        }
        Ok(())
    }

    pub async fn available_ports(&self, db: &Database) -> Result<Vec<u16>> {
        Ok(PortRepository::new(db).list_available().await?)
    }

    pub async fn stats(&self, db: &Database) -> Result<PortPoolStats> {
        let repo = PortRepository::new(db);
        let total = repo.count().await?;
        let available = i64::try_from(repo.list_available().await?.len())
            .map_err(|e| TenantBoxError::internal(e.to_string()))?;
        Ok(PortPoolStats { total, available })
    }
}
