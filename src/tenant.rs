//! Synthetic tenant workload
//!
//! Each tenant is a constant-rate load generator bound to one tenant ID:
//! every ingestion tick it re-issues the same series volume through the
//! distributor. The rate is fixed at creation and only changes through an
//! explicit `set_series` from the orchestrator.

use crate::directory::TenantId;
use crate::distributor::Distributor;
use parking_lot::Mutex;
use std::sync::Arc;

pub struct Tenant {
    tenant_id: TenantId,
    series: Mutex<f64>,
    distributor: Arc<Distributor>,
}

impl Tenant {
    pub fn new(tenant_id: TenantId, series: f64, distributor: Arc<Distributor>) -> Self {
        Self {
            tenant_id,
            series: Mutex::new(series),
            distributor,
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn series(&self) -> f64 {
        *self.series.lock()
    }

    /// Change the fixed ingestion rate.
    pub fn set_series(&self, series: f64) {
        *self.series.lock() = series;
    }

    /// One ingestion tick: push the fixed volume through the distributor.
    pub fn update(&self, now: i64) {
        let series = *self.series.lock();
        self.distributor.ingest(&self.tenant_id, series, now);
    }
}
