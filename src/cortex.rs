//! Cluster orchestrator
//!
//! Owns the ingester fleet, the tenant set and the placement service, and
//! drives the three periodic loops: placement rebalancing, tenant
//! ingestion and ingester compaction. The loops are cooperative tokio
//! tasks with no cross-loop ordering guarantee; each tick runs to
//! completion and every loop stops through the shared shutdown token.
//!
//! Tests and scripted runs bypass the timers and call the tick methods
//! directly against a manual clock.

use crate::clock::SimClock;
use crate::config::SimulationConfig;
use crate::directory::{generate_id, DirectorySnapshot, PartitionDirectory, TenantId, TenantRecord};
use crate::distributor::Distributor;
use crate::ingester::{Ingester, IngesterFleet, PartitionReplica};
use crate::placement::PlacementService;
use crate::tenant::Tenant;
use crate::{Error, Result};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Per-ingester row of a cluster snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct IngesterRow {
    pub name: String,
    pub series: f64,
    pub active_series: f64,
    pub partitions: Vec<PartitionReplica>,
}

/// Read-only view of the whole cluster for the display boundary.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterSnapshot {
    pub now_ms: i64,
    #[serde(flatten)]
    pub directory: DirectorySnapshot,
    pub ingesters: Vec<IngesterRow>,
}

pub struct Cortex {
    config: SimulationConfig,
    clock: Arc<SimClock>,
    directory: Arc<PartitionDirectory>,
    fleet: Arc<IngesterFleet>,
    distributor: Arc<Distributor>,
    placement: Arc<PlacementService>,
    tenants: RwLock<HashMap<TenantId, Arc<Tenant>>>,
    ingester_seq: AtomicUsize,
    shutdown: CancellationToken,
}

impl Cortex {
    pub fn new(config: SimulationConfig, clock: Arc<SimClock>) -> Result<Self> {
        config.validate()?;

        let directory = Arc::new(PartitionDirectory::new());
        let fleet = Arc::new(IngesterFleet::new());
        let distributor = Arc::new(Distributor::new(Arc::clone(&directory), Arc::clone(&fleet)));
        let placement = Arc::new(PlacementService::new(
            Arc::clone(&directory),
            Arc::clone(&fleet),
            config.placement.clone(),
            clock.now_ms(),
        ));

        Ok(Self {
            config,
            clock,
            directory,
            fleet,
            distributor,
            placement,
            tenants: RwLock::new(HashMap::new()),
            ingester_seq: AtomicUsize::new(0),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn clock(&self) -> &Arc<SimClock> {
        &self.clock
    }

    pub fn directory(&self) -> &Arc<PartitionDirectory> {
        &self.directory
    }

    pub fn fleet(&self) -> &Arc<IngesterFleet> {
        &self.fleet
    }

    // ── Lifecycle operations ─────────────────────────────────────────

    /// Add `n` fresh, empty ingesters to the fleet.
    pub fn scale_up(&self, n: usize) {
        for _ in 0..n {
            let seq = self.ingester_seq.fetch_add(1, Ordering::Relaxed) + 1;
            let name = format!("ingester-{}", seq);
            self.fleet.add(Arc::new(Ingester::new(
                name,
                self.config.placement.partition_max_series,
                self.clock.now_ms(),
            )));
        }
        info!(added = n, fleet = self.fleet.len(), "scaled up fleet");
    }

    /// Create a tenant with its initial uniform partition layout and a
    /// bound constant-rate workload.
    pub fn create_tenant(&self, alias: &str, series: f64) -> TenantId {
        let now = self.clock.now_ms();
        let tenant_id = format!("t-{}", generate_id());

        let partitions = self.placement.create_tenant_partitions(&tenant_id, now);
        self.directory.insert_tenant(TenantRecord {
            tenant_id: tenant_id.clone(),
            alias: alias.to_string(),
            partitions,
            series_total: 0.0,
        });

        let tenant = Arc::new(Tenant::new(
            tenant_id.clone(),
            series,
            Arc::clone(&self.distributor),
        ));
        self.tenants.write().insert(tenant_id.clone(), tenant);

        info!(tenant = %tenant_id, alias, series, "created tenant");
        tenant_id
    }

    /// Change a tenant's fixed ingestion rate.
    pub fn update_tenant(&self, tenant_id: &str, series: f64) -> Result<()> {
        let tenants = self.tenants.read();
        let tenant = tenants
            .get(tenant_id)
            .ok_or_else(|| Error::TenantNotFound(tenant_id.to_string()))?;
        tenant.set_series(series);
        Ok(())
    }

    // ── Tick methods ─────────────────────────────────────────────────

    /// One placement tick: rebuild the matrix and attempt one mutation.
    pub fn placement_tick(&self) {
        self.placement.update(self.clock.now_ms());
    }

    /// One ingestion tick: every tenant pushes its fixed volume.
    pub fn ingestion_tick(&self) {
        let now = self.clock.now_ms();
        for tenant in self.tenants.read().values() {
            tenant.update(now);
        }
    }

    /// One compaction tick: every ingester expires stale state.
    pub fn compaction_tick(&self) {
        let now = self.clock.now_ms();
        for ingester in self.fleet.all() {
            ingester.update(now);
        }
    }

    // ── Periodic loops ───────────────────────────────────────────────

    /// Spawn the three periodic loops. Each runs until the shutdown token
    /// is cancelled; the returned handles complete once the loops stop.
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let accel = self.config.loops.acceleration;
        vec![
            self.spawn_loop(
                "placement",
                self.config.loops.placement_interval / accel,
                Cortex::placement_tick,
            ),
            self.spawn_loop(
                "ingestion",
                self.config.loops.ingestion_interval / accel,
                Cortex::ingestion_tick,
            ),
            self.spawn_loop(
                "compaction",
                self.config.loops.compaction_interval / accel,
                Cortex::compaction_tick,
            ),
        ]
    }

    fn spawn_loop(
        self: &Arc<Self>,
        name: &'static str,
        interval: Duration,
        tick: fn(&Cortex),
    ) -> JoinHandle<()> {
        let cortex = Arc::clone(self);
        tokio::spawn(async move {
            // Wait out a full period before the first tick
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => tick(&cortex),
                    _ = cortex.shutdown.cancelled() => {
                        info!(name, "loop stopped");
                        break;
                    }
                }
            }
        })
    }

    /// Token shared by all loops; cancel it for a clean shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop all periodic loops.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    // ── Display boundary ─────────────────────────────────────────────

    /// Read-only snapshot of the directory and per-ingester load.
    pub fn snapshot(&self) -> ClusterSnapshot {
        let now = self.clock.now_ms();
        let ingesters = self
            .fleet
            .all()
            .into_iter()
            .map(|ingester| IngesterRow {
                name: ingester.name().to_string(),
                series: ingester.series_count(),
                active_series: ingester.active_series_count(now),
                partitions: ingester.replicas(),
            })
            .collect();

        ClusterSnapshot {
            now_ms: now,
            directory: self.directory.snapshot(),
            ingesters,
        }
    }
}
