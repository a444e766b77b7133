//! Placement service: the cluster's rebalancing control loop
//!
//! Once per placement tick the service rebuilds a ranked snapshot of the
//! fleet (the placement matrix), refreshes the directory's observed load
//! counters and then attempts exactly one mutation: split a hot partition
//! if any qualifies, otherwise move a partition from the most loaded
//! ingester to the least loaded one. The single-mutation rule bounds the
//! blast radius of each decision and keeps every step attributable.
//!
//! The placement service is the sole writer of the partition directory.

use crate::directory::{Partition, PartitionDirectory, PartitionId};
use crate::ingester::{Ingester, IngesterFleet, PartitionReplica};
use crate::partitioner::RangePartitioner;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tunables for the rebalancing policies.
#[derive(Debug, Clone)]
pub struct PlacementConfig {
    /// Split a partition once its observed load reaches this
    pub partition_target_series: f64,
    /// Hard cap on any partition's displayed load
    pub partition_max_series: f64,
    /// Target capacity per ingester, used by the split capacity gate
    pub ingester_target_series: f64,
    /// Replicas per partition (bounded by the fleet size)
    pub replication_factor: usize,
    /// Uniform range split applied when a tenant is created
    pub initial_partitions: u64,
    /// A partition must be this many placement intervals old before it is
    /// eligible for a split or a move
    pub split_cooldown_intervals: i64,
    /// Fleet counts as balanced when (largest - smallest) / largest active
    /// load is at or below this
    pub balance_threshold: f64,
    /// A move must shift more than this share of the destination's
    /// post-move load to be worth doing
    pub min_move_share: f64,
    /// Moves among fewer ingesters than this are not attempted
    pub min_ingesters_for_move: usize,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            partition_target_series: 1_000.0,
            partition_max_series: 10_000.0,
            ingester_target_series: 25_000.0,
            replication_factor: 3,
            initial_partitions: 4,
            split_cooldown_intervals: 10,
            balance_threshold: 0.1,
            min_move_share: 0.1,
            min_ingesters_for_move: 4,
        }
    }
}

/// One row of the placement matrix: an ingester annotated with its load.
#[derive(Clone)]
pub struct MatrixEntry {
    pub ingester: Arc<Ingester>,
    /// Snapshot of the ingester's local replicas at matrix build time
    pub replicas: Vec<PartitionReplica>,
    pub series: f64,
    pub active_series: f64,
}

struct PlacementState {
    /// Ranked fleet snapshot, ascending by load; rebuilt every cycle and
    /// after every replica pick, never persisted across cycles
    matrix: Vec<MatrixEntry>,
    last_update: i64,
    update_interval: i64,
}

pub struct PlacementService {
    directory: Arc<PartitionDirectory>,
    fleet: Arc<IngesterFleet>,
    config: PlacementConfig,
    state: Mutex<PlacementState>,
}

impl PlacementService {
    pub fn new(
        directory: Arc<PartitionDirectory>,
        fleet: Arc<IngesterFleet>,
        config: PlacementConfig,
        now: i64,
    ) -> Self {
        Self {
            directory,
            fleet,
            config,
            state: Mutex::new(PlacementState {
                matrix: Vec::new(),
                last_update: now,
                update_interval: 10_000,
            }),
        }
    }

    /// Run one placement tick at logical time `now`.
    pub fn update(&self, now: i64) {
        let mut state = self.state.lock();
        // A tick fired before any time elapsed keeps the previous interval,
        // so the cool-down never collapses to zero on the first run
        let elapsed = now - state.last_update;
        if elapsed > 0 {
            state.update_interval = elapsed;
        }
        debug!(
            interval_ms = state.update_interval,
            "starting placement update"
        );

        state.matrix = self.build_matrix(now);
        self.refresh_observed(&state.matrix);
        self.rebalance(&mut state, now);

        state.last_update = now;
    }

    /// One mutation per tick: a split consumes the tick, otherwise a move
    /// may.
    fn rebalance(&self, state: &mut PlacementState, now: i64) {
        if self.split_partitions(state, now) {
            return;
        }
        self.move_partitions(state, now);
    }

    // ── Placement matrix ─────────────────────────────────────────────

    /// Ask every ingester about its partitions and load, then rank the
    /// fleet ascending by total series, active series and partition count.
    fn build_matrix(&self, now: i64) -> Vec<MatrixEntry> {
        let mut matrix: Vec<MatrixEntry> = self
            .fleet
            .all()
            .into_iter()
            .map(|ingester| MatrixEntry {
                replicas: ingester.replicas(),
                series: ingester.series_count(),
                active_series: ingester.active_series_count(now),
                ingester,
            })
            .collect();

        matrix.sort_by(|a, b| {
            a.series
                .total_cmp(&b.series)
                .then(a.active_series.total_cmp(&b.active_series))
                .then(a.replicas.len().cmp(&b.replicas.len()))
        });
        matrix
    }

    /// Denormalize the fleet's observed per-partition load onto the
    /// directory so snapshots carry current counts.
    fn refresh_observed(&self, matrix: &[MatrixEntry]) {
        let mut observed: HashMap<PartitionId, f64> = HashMap::new();
        for entry in matrix {
            for replica in &entry.replicas {
                *observed.entry(replica.id.clone()).or_default() += replica.series;
            }
        }
        self.directory.record_observed(&observed);
    }

    // ── Tenant bootstrap ─────────────────────────────────────────────

    /// Create a tenant's initial partitions: a uniform range split into
    /// `initial_partitions` pieces, each placed on up to
    /// `replication_factor` distinct ingesters.
    pub fn create_tenant_partitions(&self, tenant_id: &str, now: i64) -> Vec<PartitionId> {
        let count = self.config.initial_partitions;
        let mut state = self.state.lock();
        state.matrix = self.build_matrix(now);

        let mut ids = Vec::with_capacity(count as usize);
        for i in 0..count {
            let (min_range, max_range) = RangePartitioner::range(i, count);
            let mut partition = Partition::new(tenant_id, now, min_range, max_range);
            partition.stores = self.assign_replicas(&mut state, &partition, now);
            ids.push(partition.id.clone());
            self.directory.insert_partition(partition);
        }
        ids
    }

    // ── Replica placement ────────────────────────────────────────────

    /// Place a partition on up to `replication_factor` distinct ingesters.
    ///
    /// Scans the matrix in ascending load order, skipping stores that
    /// already hold the partition, and rebuilds the matrix after each pick
    /// so the next pick accounts for the store just used.
    fn assign_replicas(
        &self,
        state: &mut PlacementState,
        partition: &Partition,
        now: i64,
    ) -> Vec<String> {
        let mut stores = Vec::new();

        while stores.len() < self.config.replication_factor {
            let picked = state
                .matrix
                .iter()
                .find(|entry| !entry.replicas.iter().any(|r| r.id == partition.id))
                .map(|entry| Arc::clone(&entry.ingester));
            let Some(ingester) = picked else {
                break;
            };

            ingester.assign_partition(PartitionReplica::from_partition(partition));
            stores.push(ingester.name().to_string());

            if stores.len() >= self.config.replication_factor {
                break;
            }
            state.matrix = self.build_matrix(now);
        }

        info!(partition = %partition.id, stores = ?stores, "assigned partition");
        stores
    }

    /// Install a copy of the partition's current metadata on the given
    /// stores; used to propagate a closed window to every holder.
    fn assign_to_stores(&self, partition: &Partition, stores: &[String]) {
        for store in stores {
            match self.fleet.require(store) {
                Ok(ingester) => {
                    ingester.assign_partition(PartitionReplica::from_partition(partition))
                }
                Err(e) => warn!(partition = %partition.id, "skipping store: {}", e),
            }
        }
    }

    // ── Capacity gate ────────────────────────────────────────────────

    /// Err if the fleet's free target capacity cannot absorb `needed`
    /// additional series. Only splits are gated; moves redistribute load
    /// rather than add it.
    fn ensure_capacity(&self, matrix: &[MatrixEntry], needed: f64) -> Result<()> {
        let total = matrix.len() as f64 * self.config.ingester_target_series;
        let used: f64 = matrix.iter().map(|entry| entry.series).sum();
        let free = total - used;
        if free >= needed {
            Ok(())
        } else {
            Err(Error::CapacityExhausted { needed, free })
        }
    }

    /// Capacity check for splitting a partition currently at `series`.
    ///
    /// Each new partition starts at roughly half the load; if the load sits
    /// at the cap the true value is unknown, so assume the worst. The
    /// projected replica load lands on `replication_factor` stores.
    fn ensure_capacity_for_split(&self, matrix: &[MatrixEntry], series: f64) -> Result<()> {
        let replica_series = if series >= self.config.partition_max_series {
            self.config.partition_max_series
        } else {
            series / 2.0
        };
        self.ensure_capacity(matrix, replica_series * self.config.replication_factor as f64)
    }

    // ── Split policy ─────────────────────────────────────────────────

    /// A replica qualifies for rebalancing when it carries load, its window
    /// is still open and it has survived the cool-down.
    fn is_eligible(&self, replica: &PartitionReplica, state: &PlacementState, now: i64) -> bool {
        replica.series > 0.0
            && replica.is_active(now)
            && now - replica.create_time
                >= self.config.split_cooldown_intervals * state.update_interval
    }

    /// Pick the hottest-qualifying partition and split it. Returns true iff
    /// a split consumed this tick.
    fn split_partitions(&self, state: &mut PlacementState, now: i64) -> bool {
        let mut candidates: Vec<PartitionReplica> = Vec::new();
        for entry in &state.matrix {
            for replica in &entry.replicas {
                if !self.is_eligible(replica, state, now) {
                    continue;
                }
                if replica.series < self.config.partition_target_series {
                    continue;
                }
                // A single-unit range cannot be halved
                if replica.min_range == replica.max_range {
                    continue;
                }
                candidates.push(replica.clone());
            }
        }

        // Coarser ranges affect more key-space per split, so try them first
        candidates
            .sort_by_key(|r| RangePartitioner::range_split(r.min_range, r.max_range));

        for candidate in &candidates {
            if let Err(e) = self.ensure_capacity_for_split(&state.matrix, candidate.series) {
                // Capacity only gets tighter for finer candidates
                warn!("halting split scan: {}", e);
                break;
            }
            if self.split(state, &candidate.id, now) {
                return true;
            }
        }

        let pending: HashSet<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
        if !pending.is_empty() {
            debug!(pending = pending.len(), "partitions remaining to be split");
        }
        false
    }

    /// Split one partition: halve its range, place two fresh partitions and
    /// close the original everywhere it lives.
    fn split(&self, state: &mut PlacementState, partition_id: &str, now: i64) -> bool {
        let Some(partition) = self.directory.partition(partition_id) else {
            warn!(partition = partition_id, "split target missing from directory");
            return false;
        };
        if !partition.is_active(now) {
            // A duplicate candidate from another replica already split it
            return false;
        }

        let ((left_min, left_max), (right_min, right_max)) =
            RangePartitioner::split_range(partition.min_range, partition.max_range);

        let mut left = Partition::new(&partition.tenant_id, now, left_min, left_max);
        left.stores = self.assign_replicas(state, &left, now);
        let mut right = Partition::new(&partition.tenant_id, now, right_min, right_max);
        right.stores = self.assign_replicas(state, &right, now);

        if let Err(e) = self
            .directory
            .append_tenant_partitions(&partition.tenant_id, &[left.id.clone(), right.id.clone()])
        {
            warn!("split bookkeeping incomplete: {}", e);
        }
        let left_id = left.id.clone();
        let right_id = right.id.clone();
        self.directory.insert_partition(left);
        self.directory.insert_partition(right);

        // Close the original on the directory and on every holding store
        if let Err(e) = self.directory.close_partition(partition_id, now) {
            warn!("failed to close split partition: {}", e);
        }
        let mut closed = partition.clone();
        closed.max_time = now;
        self.assign_to_stores(&closed, &closed.stores);

        let splits = RangePartitioner::range_split(partition.min_range, partition.max_range);
        info!(
            partition = partition_id,
            range = ?(partition.min_range, partition.max_range),
            left = %left_id,
            right = %right_id,
            from_splits = splits,
            to_splits = splits * 2,
            "split partition"
        );
        true
    }

    // ── Move policy ──────────────────────────────────────────────────

    /// Fleet counts as balanced when the spread between the highest- and
    /// lowest-ranked ingesters' active load is within the threshold.
    fn is_balanced(&self, state: &PlacementState) -> bool {
        let Some(largest) = state.matrix.last() else {
            return true;
        };
        let Some(smallest) = state.matrix.first() else {
            return true;
        };
        if largest.active_series <= 0.0 {
            return true;
        }

        let diff = (largest.active_series - smallest.active_series) / largest.active_series;
        if diff <= self.config.balance_threshold {
            debug!(
                largest = largest.active_series,
                smallest = smallest.active_series,
                diff,
                "placement matrix is balanced"
            );
            return true;
        }
        false
    }

    /// Try to move one partition from the most loaded ingester to the
    /// least loaded one. Returns true iff a move consumed this tick.
    fn move_partitions(&self, state: &mut PlacementState, now: i64) -> bool {
        if state.matrix.len() < self.config.min_ingesters_for_move {
            return false;
        }
        if self.is_balanced(state) {
            return false;
        }

        let (Some(source), Some(dest)) = (state.matrix.last(), state.matrix.first()) else {
            return false;
        };
        let (source, dest) = (source.clone(), dest.clone());

        let mut movable: Vec<PartitionReplica> = source
            .replicas
            .iter()
            .filter(|r| self.is_eligible(r, state, now))
            .cloned()
            .collect();
        movable.sort_by(|a, b| b.series.total_cmp(&a.series));

        for replica in &movable {
            if self.try_move(replica, &source, &dest, now) {
                return true;
            }
        }
        false
    }

    fn try_move(
        &self,
        replica: &PartitionReplica,
        source: &MatrixEntry,
        dest: &MatrixEntry,
        now: i64,
    ) -> bool {
        if dest.replicas.iter().any(|r| r.id == replica.id) {
            // Destination already holds this partition
            return false;
        }
        if !self.should_move(replica, source, dest) {
            return false;
        }
        self.relocate(replica, source, dest, now)
    }

    /// Accept a move only if it does not overcorrect past balance and it
    /// shifts enough load to matter.
    fn should_move(&self, replica: &PartitionReplica, source: &MatrixEntry, dest: &MatrixEntry) -> bool {
        let move_series = replica.series;
        let source_after = source.active_series - move_series;
        let dest_after = dest.active_series + move_series;

        if dest_after > source_after {
            debug!(
                dest_after, source_after, move_series,
                "skip move: would overcorrect"
            );
            return false;
        }
        if move_series / dest_after <= self.config.min_move_share {
            debug!(
                dest_after, move_series,
                share = move_series / dest_after,
                "skip move: too small to matter"
            );
            return false;
        }
        true
    }

    /// Realize a move as close-on-source, open-on-destination: the replica
    /// list swaps the store names, the destination installs an open copy of
    /// the same partition ID, and the source's local copy is closed. The
    /// directory entry itself stays open.
    fn relocate(
        &self,
        replica: &PartitionReplica,
        source: &MatrixEntry,
        dest: &MatrixEntry,
        now: i64,
    ) -> bool {
        let partition = match self.directory.move_store(
            &replica.id,
            source.ingester.name(),
            dest.ingester.name(),
        ) {
            Ok(partition) => partition,
            Err(e) => {
                warn!("move aborted: {}", e);
                return false;
            }
        };

        dest.ingester
            .assign_partition(PartitionReplica::from_partition(&partition));
        if let Err(e) = source.ingester.close_partition(&replica.id, now) {
            warn!("source copy not closed: {}", e);
        }

        info!(
            partition = %replica.id,
            series = replica.series,
            source = source.ingester.name(),
            source_series = source.series,
            dest = dest.ingester.name(),
            dest_series = dest.series,
            "moved partition"
        );
        true
    }
}
