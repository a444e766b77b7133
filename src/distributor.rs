//! Stateless ingest router
//!
//! Resolves the partitions covering "now" for a tenant, fans the incoming
//! series volume out across their replica stores and forwards a push to
//! each owning ingester. Best effort throughout: unknown tenants drop the
//! tick, unknown stores drop that replica's share, nothing is retried and
//! no acknowledgment exists.

use crate::directory::PartitionDirectory;
use crate::ingester::IngesterFleet;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct Distributor {
    directory: Arc<PartitionDirectory>,
    fleet: Arc<IngesterFleet>,
}

impl Distributor {
    pub fn new(directory: Arc<PartitionDirectory>, fleet: Arc<IngesterFleet>) -> Self {
        Self { directory, fleet }
    }

    /// Ingest `series` series for a tenant at logical time `now`.
    ///
    /// The volume is divided evenly across the tenant's active partitions,
    /// then across each partition's replica stores. Replicas may observe
    /// different volumes if placement is reassigning stores mid-flight;
    /// that loose consistency is accepted.
    pub fn ingest(&self, tenant_id: &str, series: f64, now: i64) {
        let partitions = match self.directory.active_partitions(tenant_id, now) {
            Ok(partitions) => partitions,
            Err(e) => {
                warn!(tenant = tenant_id, "dropping ingest tick: {}", e);
                return;
            }
        };
        if partitions.is_empty() {
            warn!(tenant = tenant_id, "no active partitions, dropping ingest tick");
            return;
        }

        let per_partition = series / partitions.len() as f64;
        for partition in &partitions {
            if partition.stores.is_empty() {
                warn!(partition = %partition.id, "partition has no replica stores");
                continue;
            }
            let per_replica = per_partition / partition.stores.len() as f64;
            for store in &partition.stores {
                match self.fleet.require(store) {
                    Ok(ingester) => {
                        if let Err(e) = ingester.push(&partition.id, per_replica, now) {
                            warn!(store = %store, "push dropped: {}", e);
                        }
                    }
                    Err(e) => warn!(partition = %partition.id, "replica dropped: {}", e),
                }
            }
        }

        debug!(
            tenant = tenant_id,
            series,
            partitions = partitions.len(),
            "ingest fan-out complete"
        );
    }
}
