//! Global partition directory
//!
//! The single authoritative mapping from tenants to their partitions and
//! from partition IDs to partition records. The placement service is the
//! sole writer; the distributor and any display layer only read, either
//! through the lookup accessors or via [`PartitionDirectory::snapshot`].

use crate::clock::TIME_END_MS;
use crate::{Error, Result};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;

/// Tenant identifier
pub type TenantId = String;
/// Partition identifier
pub type PartitionId = String;

/// Short random identifier, the last segment of a v4 UUID.
pub(crate) fn generate_id() -> String {
    let id = uuid::Uuid::new_v4().to_string();
    id.rsplit('-').next().unwrap_or_default().to_string()
}

/// A contiguous hash-range, time-windowed shard of one tenant's data.
///
/// A partition is active while the current time falls inside
/// `[min_time, max_time)`. Closing a partition sets `max_time`; closed
/// partitions are immutable history and are never deleted.
#[derive(Debug, Clone, Serialize)]
pub struct Partition {
    pub id: PartitionId,
    pub tenant_id: TenantId,
    /// Start of the validity window (inclusive, milliseconds)
    pub min_time: i64,
    /// End of the validity window (exclusive); `TIME_END_MS` while open
    pub max_time: i64,
    /// Inclusive hash range covered by this partition
    pub min_range: u64,
    pub max_range: u64,
    pub create_time: i64,
    /// Names of the ingesters holding a replica
    pub stores: Vec<String>,
    /// Most recently observed series count, denormalized from the fleet
    /// each placement cycle
    pub series: f64,
}

impl Partition {
    /// Create a fresh open partition over the given range.
    pub fn new(tenant_id: &str, now: i64, min_range: u64, max_range: u64) -> Self {
        Self {
            id: format!("p-{}", generate_id()),
            tenant_id: tenant_id.to_string(),
            min_time: now,
            max_time: TIME_END_MS,
            min_range,
            max_range,
            create_time: now,
            stores: Vec::new(),
            series: 0.0,
        }
    }

    /// Whether the validity window contains `now`.
    pub fn is_active(&self, now: i64) -> bool {
        self.min_time <= now && now < self.max_time
    }
}

/// Per-tenant bookkeeping in the directory.
#[derive(Debug, Clone, Serialize)]
pub struct TenantRecord {
    pub tenant_id: TenantId,
    pub alias: String,
    /// All partitions ever created for this tenant, open and closed
    pub partitions: Vec<PartitionId>,
    /// Denormalized total of the observed series counts
    pub series_total: f64,
}

#[derive(Default)]
struct DirectoryInner {
    tenants: HashMap<TenantId, TenantRecord>,
    partitions: HashMap<PartitionId, Partition>,
}

/// Read-only view of the directory for the display boundary.
#[derive(Debug, Clone, Serialize)]
pub struct DirectorySnapshot {
    pub tenants: Vec<TenantRecord>,
    pub partitions: Vec<Partition>,
}

/// The global tenant/partition mapping.
///
/// Mutating methods are reserved for the placement service; everything
/// else treats this as read-only.
#[derive(Default)]
pub struct PartitionDirectory {
    inner: RwLock<DirectoryInner>,
}

impl PartitionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Read side ────────────────────────────────────────────────────

    /// Look up a tenant record (cloned).
    pub fn tenant(&self, tenant_id: &str) -> Option<TenantRecord> {
        self.inner.read().tenants.get(tenant_id).cloned()
    }

    /// Look up a partition record (cloned).
    pub fn partition(&self, partition_id: &str) -> Option<Partition> {
        self.inner.read().partitions.get(partition_id).cloned()
    }

    /// Returns the tenant's partitions whose validity window contains `now`.
    pub fn active_partitions(&self, tenant_id: &str, now: i64) -> Result<Vec<Partition>> {
        let inner = self.inner.read();
        let tenant = inner
            .tenants
            .get(tenant_id)
            .ok_or_else(|| Error::TenantNotFound(tenant_id.to_string()))?;

        Ok(tenant
            .partitions
            .iter()
            .filter_map(|id| inner.partitions.get(id))
            .filter(|p| p.is_active(now))
            .cloned()
            .collect())
    }

    /// Number of partitions ever created.
    pub fn partition_count(&self) -> usize {
        self.inner.read().partitions.len()
    }

    /// Clone out the whole directory for display.
    pub fn snapshot(&self) -> DirectorySnapshot {
        let inner = self.inner.read();
        let mut tenants: Vec<_> = inner.tenants.values().cloned().collect();
        tenants.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        let mut partitions: Vec<_> = inner.partitions.values().cloned().collect();
        partitions.sort_by(|a, b| a.id.cmp(&b.id));
        DirectorySnapshot { tenants, partitions }
    }

    // ── Write side (placement service only) ──────────────────────────

    /// Insert a new tenant record.
    pub fn insert_tenant(&self, record: TenantRecord) {
        self.inner.write().tenants.insert(record.tenant_id.clone(), record);
    }

    /// Insert or replace a partition record.
    pub fn insert_partition(&self, partition: Partition) {
        self.inner.write().partitions.insert(partition.id.clone(), partition);
    }

    /// Append newly created partitions to a tenant's partition list.
    pub fn append_tenant_partitions(&self, tenant_id: &str, ids: &[PartitionId]) -> Result<()> {
        let mut inner = self.inner.write();
        let tenant = inner
            .tenants
            .get_mut(tenant_id)
            .ok_or_else(|| Error::TenantNotFound(tenant_id.to_string()))?;
        tenant.partitions.extend_from_slice(ids);
        Ok(())
    }

    /// Close a partition's validity window at `at`.
    pub fn close_partition(&self, partition_id: &str, at: i64) -> Result<()> {
        let mut inner = self.inner.write();
        let partition = inner
            .partitions
            .get_mut(partition_id)
            .ok_or_else(|| Error::PartitionNotFound(partition_id.to_string()))?;
        partition.max_time = at;
        Ok(())
    }

    /// Swap one replica store for another, returning the updated record.
    pub fn move_store(&self, partition_id: &str, from: &str, to: &str) -> Result<Partition> {
        let mut inner = self.inner.write();
        let partition = inner
            .partitions
            .get_mut(partition_id)
            .ok_or_else(|| Error::PartitionNotFound(partition_id.to_string()))?;
        partition.stores.retain(|s| s != from);
        partition.stores.push(to.to_string());
        Ok(partition.clone())
    }

    /// Refresh the denormalized series counts from fleet observations.
    ///
    /// `observed` maps partition ID to the summed replica load; partitions
    /// absent from the map are recorded as zero. Tenant totals are the sum
    /// over their partition lists.
    pub fn record_observed(&self, observed: &HashMap<PartitionId, f64>) {
        let mut inner = self.inner.write();
        for (id, partition) in inner.partitions.iter_mut() {
            partition.series = observed.get(id).copied().unwrap_or(0.0);
        }
        let totals: HashMap<TenantId, f64> = inner
            .tenants
            .values()
            .map(|t| {
                let total = t
                    .partitions
                    .iter()
                    .filter_map(|id| inner.partitions.get(id))
                    .map(|p| p.series)
                    .sum();
                (t.tenant_id.clone(), total)
            })
            .collect();
        for (id, total) in totals {
            if let Some(tenant) = inner.tenants.get_mut(&id) {
                tenant.series_total = total;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant_with_partition(dir: &PartitionDirectory) -> (TenantRecord, Partition) {
        let part = Partition::new("t-1", 100, 0, 999);
        let record = TenantRecord {
            tenant_id: "t-1".to_string(),
            alias: "acme".to_string(),
            partitions: vec![part.id.clone()],
            series_total: 0.0,
        };
        dir.insert_tenant(record.clone());
        dir.insert_partition(part.clone());
        (record, part)
    }

    #[test]
    fn test_active_partition_window() {
        let dir = PartitionDirectory::new();
        let (_, part) = tenant_with_partition(&dir);

        assert_eq!(dir.active_partitions("t-1", 100).unwrap().len(), 1);
        assert_eq!(dir.active_partitions("t-1", 50).unwrap().len(), 0);

        dir.close_partition(&part.id, 200).unwrap();
        // The window end is exclusive
        assert_eq!(dir.active_partitions("t-1", 200).unwrap().len(), 0);
        assert_eq!(dir.active_partitions("t-1", 199).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_tenant_is_an_error() {
        let dir = PartitionDirectory::new();
        assert!(matches!(
            dir.active_partitions("t-missing", 0),
            Err(Error::TenantNotFound(_))
        ));
    }

    #[test]
    fn test_move_store_swaps_replica() {
        let dir = PartitionDirectory::new();
        let (_, mut part) = tenant_with_partition(&dir);
        part.stores = vec!["ingester-1".to_string(), "ingester-2".to_string()];
        dir.insert_partition(part.clone());

        let updated = dir.move_store(&part.id, "ingester-1", "ingester-3").unwrap();
        assert_eq!(updated.stores, vec!["ingester-2", "ingester-3"]);
    }

    #[test]
    fn test_record_observed_updates_tenant_total() {
        let dir = PartitionDirectory::new();
        let (_, part) = tenant_with_partition(&dir);

        let mut observed = HashMap::new();
        observed.insert(part.id.clone(), 750.0);
        dir.record_observed(&observed);

        assert_eq!(dir.partition(&part.id).unwrap().series, 750.0);
        assert_eq!(dir.tenant("t-1").unwrap().series_total, 750.0);

        // A second refresh with no observations zeroes it back out
        dir.record_observed(&HashMap::new());
        assert_eq!(dir.tenant("t-1").unwrap().series_total, 0.0);
    }
}
