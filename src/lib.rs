//! # Shardplane
//!
//! A deterministic, single-process model of the control plane of a
//! horizontally-sharded, multi-tenant time-series ingestion cluster.
//!
//! Shardplane decides how a tenant's data is split into range-partitioned
//! shards, how each shard is replicated across storage nodes, and how the
//! cluster rebalances itself as load shifts: split-when-hot,
//! move-when-skewed, under explicit capacity constraints.
//!
//! ## Architecture
//!
//! - **RangePartitioner**: pure math over the fixed hash-key space
//! - **Ingester**: one simulated storage node with per-partition load and
//!   time-windowed decay
//! - **Distributor**: stateless best-effort fan-out of ingested series to
//!   the owning replicas
//! - **PlacementService**: the control loop; builds the placement matrix
//!   and performs at most one split or move per tick
//! - **Cortex**: the orchestrator; owns the fleet and tenants and drives
//!   three independently-paced periodic loops
//!
//! Everything runs against a logical millisecond clock; there is no
//! network, no durable storage and no true parallelism, only the control
//! decisions a real cluster would make.

pub mod clock;
pub mod config;
pub mod cortex;
pub mod directory;
pub mod distributor;
pub mod ingester;
pub mod partitioner;
pub mod placement;
pub mod tenant;

mod error;

pub use error::{Error, Result};
