//! Simulated storage node
//!
//! An ingester holds local replicas of the partitions assigned to it plus
//! the most recent push observation per partition. It knows nothing about
//! the rest of the fleet; the placement service reads its load queries to
//! build the per-cycle placement matrix.
//!
//! Per-partition lifecycle: unassigned, then active once assigned, then
//! evicted by the compaction tick once the partition's window has been
//! closed for longer than one compaction interval.

use crate::directory::{Partition, PartitionId};
use crate::{Error, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Local copy of a partition's metadata plus the locally observed load.
///
/// A replica is authoritative for "what does this node currently serve",
/// not for the global topology; the directory owns the latter.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionReplica {
    pub id: PartitionId,
    pub min_time: i64,
    pub max_time: i64,
    pub min_range: u64,
    pub max_range: u64,
    pub create_time: i64,
    /// Load from the most recent push, clamped to the per-partition cap
    pub series: f64,
}

impl PartitionReplica {
    /// Build a replica from a directory record. Observed load starts at zero.
    pub fn from_partition(partition: &Partition) -> Self {
        Self {
            id: partition.id.clone(),
            min_time: partition.min_time,
            max_time: partition.max_time,
            min_range: partition.min_range,
            max_range: partition.max_range,
            create_time: partition.create_time,
            series: 0.0,
        }
    }

    /// Whether the replica's validity window contains `now`.
    pub fn is_active(&self, now: i64) -> bool {
        self.min_time <= now && now < self.max_time
    }
}

#[derive(Debug, Clone, Copy)]
struct PushRecord {
    series: f64,
    ingested_at: i64,
}

struct IngesterState {
    partitions: HashMap<PartitionId, PartitionReplica>,
    ingested: HashMap<PartitionId, PushRecord>,
    last_update: i64,
}

/// One simulated storage node.
pub struct Ingester {
    name: String,
    /// Hard cap on the displayed per-partition load
    max_partition_series: f64,
    state: Mutex<IngesterState>,
}

impl Ingester {
    pub fn new(name: impl Into<String>, max_partition_series: f64, now: i64) -> Self {
        Self {
            name: name.into(),
            max_partition_series,
            state: Mutex::new(IngesterState {
                partitions: HashMap::new(),
                ingested: HashMap::new(),
                last_update: now,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Install or replace the local replica of a partition.
    ///
    /// A replacement keeps the original creation stamp so placement
    /// cool-downs are not reset by reassignment. Observed load always
    /// restarts at zero; the next push refreshes it.
    pub fn assign_partition(&self, mut replica: PartitionReplica) {
        let mut state = self.state.lock();
        if let Some(existing) = state.partitions.get(&replica.id) {
            replica.create_time = existing.create_time;
        }
        replica.series = 0.0;
        state.partitions.insert(replica.id.clone(), replica);
    }

    /// Close the local replica's validity window at `at`.
    pub fn close_partition(&self, partition_id: &str, at: i64) -> Result<()> {
        let mut state = self.state.lock();
        let replica = state
            .partitions
            .get_mut(partition_id)
            .ok_or_else(|| Error::PartitionNotFound(partition_id.to_string()))?;
        replica.max_time = at;
        Ok(())
    }

    /// Record a push: overwrite the most recent observation for the
    /// partition and recompute its displayed load, clamped to the
    /// per-partition cap.
    pub fn push(&self, partition_id: &str, series: f64, now: i64) -> Result<()> {
        let state = &mut *self.state.lock();
        let replica = state
            .partitions
            .get_mut(partition_id)
            .ok_or_else(|| Error::PartitionNotFound(partition_id.to_string()))?;
        state.ingested.insert(
            partition_id.to_string(),
            PushRecord {
                series,
                ingested_at: now,
            },
        );
        replica.series = series.min(self.max_partition_series);
        Ok(())
    }

    /// The compaction tick.
    ///
    /// Recomputes the interval since the previous tick, drops every replica
    /// whose window has been closed for more than one interval, and zeroes
    /// the load of any remaining replica whose last push is older than the
    /// interval.
    pub fn update(&self, now: i64) {
        let state = &mut *self.state.lock();
        let interval = now - state.last_update;

        let IngesterState {
            partitions,
            ingested,
            ..
        } = state;

        let mut evicted = 0usize;
        partitions.retain(|id, replica| {
            let expired = replica.max_time < now && now - replica.max_time > interval;
            if expired {
                ingested.remove(id);
                evicted += 1;
            }
            !expired
        });

        for (id, replica) in partitions.iter_mut() {
            let fresh = ingested
                .get(id)
                .map(|record| now - record.ingested_at < interval)
                .unwrap_or(false);
            if !fresh {
                replica.series = 0.0;
            }
        }

        state.last_update = now;
        debug!(
            ingester = %self.name,
            interval_ms = interval,
            evicted,
            "compaction tick"
        );
    }

    /// Total observed load across all local replicas.
    pub fn series_count(&self) -> f64 {
        self.state.lock().partitions.values().map(|r| r.series).sum()
    }

    /// Observed load across replicas whose validity window contains `now`.
    pub fn active_series_count(&self, now: i64) -> f64 {
        self.state
            .lock()
            .partitions
            .values()
            .filter(|r| r.is_active(now))
            .map(|r| r.series)
            .sum()
    }

    pub fn partition_count(&self) -> usize {
        self.state.lock().partitions.len()
    }

    /// Snapshot of the local replicas.
    pub fn replicas(&self) -> Vec<PartitionReplica> {
        self.state.lock().partitions.values().cloned().collect()
    }
}

/// The set of storage nodes making up the cluster.
#[derive(Default)]
pub struct IngesterFleet {
    ingesters: DashMap<String, Arc<Ingester>>,
}

impl IngesterFleet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, ingester: Arc<Ingester>) {
        self.ingesters.insert(ingester.name().to_string(), ingester);
    }

    pub fn get(&self, name: &str) -> Option<Arc<Ingester>> {
        self.ingesters.get(name).map(|e| Arc::clone(e.value()))
    }

    /// Like [`IngesterFleet::get`] but surfaces the miss as an error.
    pub fn require(&self, name: &str) -> Result<Arc<Ingester>> {
        self.get(name)
            .ok_or_else(|| Error::StoreNotFound(name.to_string()))
    }

    /// All members, sorted by name for stable iteration order.
    pub fn all(&self) -> Vec<Arc<Ingester>> {
        let mut all: Vec<_> = self
            .ingesters
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    pub fn len(&self) -> usize {
        self.ingesters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ingesters.is_empty()
    }
}
