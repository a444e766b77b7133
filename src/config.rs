//! Simulation configuration
//!
//! Aggregates the placement tunables with the pacing of the three
//! periodic loops. Base intervals mirror a real cluster (placement each
//! minute, ingestion every thirty seconds, compaction every two hours);
//! the acceleration factor divides all of them so long cluster histories
//! play out quickly.

use crate::placement::PlacementConfig;
use crate::{Error, Result};
use std::time::Duration;

/// Pacing of the orchestrator's periodic loops.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub placement_interval: Duration,
    pub ingestion_interval: Duration,
    pub compaction_interval: Duration,
    /// Divisor applied to every interval for simulated time
    pub acceleration: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            placement_interval: Duration::from_secs(60),
            ingestion_interval: Duration::from_secs(30),
            compaction_interval: Duration::from_secs(2 * 60 * 60),
            acceleration: 1,
        }
    }
}

/// Top-level configuration for a simulated cluster.
#[derive(Debug, Clone, Default)]
pub struct SimulationConfig {
    pub placement: PlacementConfig,
    pub loops: LoopConfig,
}

impl SimulationConfig {
    /// Reject configurations the control loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.loops.acceleration == 0 {
            return Err(Error::Config("acceleration must be at least 1".to_string()));
        }
        if self.placement.replication_factor == 0 {
            return Err(Error::Config(
                "replication_factor must be at least 1".to_string(),
            ));
        }
        if self.placement.initial_partitions == 0 {
            return Err(Error::Config(
                "initial_partitions must be at least 1".to_string(),
            ));
        }
        if self.placement.partition_target_series > self.placement.partition_max_series {
            return Err(Error::Config(
                "partition_target_series cannot exceed partition_max_series".to_string(),
            ));
        }
        if self.loops.placement_interval.is_zero()
            || self.loops.ingestion_interval.is_zero()
            || self.loops.compaction_interval.is_zero()
        {
            return Err(Error::Config("loop intervals must be non-zero".to_string()));
        }
        Ok(())
    }
}
