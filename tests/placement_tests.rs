//! Integration tests for the placement control loop: range tiling,
//! replication, the one-mutation-per-tick rule, the capacity gate and
//! balance convergence.

use shardplane::clock::SimClock;
use shardplane::config::SimulationConfig;
use shardplane::cortex::Cortex;
use shardplane::directory::{Partition, PartitionDirectory, TenantRecord};
use shardplane::distributor::Distributor;
use shardplane::ingester::{Ingester, IngesterFleet, PartitionReplica};
use shardplane::partitioner::{RangePartitioner, RANGE_MAX};
use shardplane::placement::{PlacementConfig, PlacementService};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Assert that a tenant's active partitions exactly tile [0, RANGE_MAX).
fn assert_range_tiling(directory: &PartitionDirectory, tenant_id: &str, now: i64) {
    let mut active = directory.active_partitions(tenant_id, now).unwrap();
    assert!(!active.is_empty(), "tenant must keep active partitions");
    active.sort_by_key(|p| p.min_range);

    let mut next = 0u64;
    for partition in &active {
        assert_eq!(
            partition.min_range, next,
            "gap or overlap before range starting at {}",
            partition.min_range
        );
        next = partition.max_range + 1;
    }
    assert_eq!(next, RANGE_MAX, "active ranges must cover the whole space");
}

fn split_heavy_config() -> SimulationConfig {
    let mut config = SimulationConfig::default();
    config.placement = PlacementConfig {
        partition_target_series: 300.0,
        partition_max_series: 2_000.0,
        ingester_target_series: 1_000_000.0,
        ..Default::default()
    };
    config
}

/// Advance simulated time and run one full round of loops.
fn run_round(cortex: &Cortex, spacing_ms: i64) {
    cortex.clock().advance(spacing_ms);
    cortex.ingestion_tick();
    cortex.placement_tick();
    cortex.compaction_tick();
}

#[test]
fn test_range_tiling_preserved_across_splits() {
    let clock = Arc::new(SimClock::manual());
    let cortex = Cortex::new(split_heavy_config(), clock).unwrap();
    cortex.scale_up(3);
    // High enough rate that repeated splits stay above the target
    let tenant_id = cortex.create_tenant("acme", 12_000.0);

    let initial = cortex.directory().partition_count();
    for _ in 0..60 {
        run_round(&cortex, 30_000);
        assert_range_tiling(cortex.directory(), &tenant_id, cortex.clock().now_ms());
    }
    assert!(
        cortex.directory().partition_count() > initial,
        "the hot tenant must have been split at least once"
    );
}

#[test]
fn test_replication_invariant() {
    for fleet_size in [2usize, 5] {
        let clock = Arc::new(SimClock::manual());
        let cortex = Cortex::new(split_heavy_config(), clock).unwrap();
        cortex.scale_up(fleet_size);
        let tenant_id = cortex.create_tenant("acme", 12_000.0);

        for _ in 0..40 {
            run_round(&cortex, 30_000);
        }

        let expected = fleet_size.min(3);
        let now = cortex.clock().now_ms();
        for partition in cortex
            .directory()
            .active_partitions(&tenant_id, now)
            .unwrap()
        {
            let distinct: HashSet<&String> = partition.stores.iter().collect();
            assert_eq!(
                partition.stores.len(),
                expected,
                "active partition {} must have min(3, fleet) replicas",
                partition.id
            );
            assert_eq!(
                distinct.len(),
                partition.stores.len(),
                "replica stores must be distinct"
            );
        }
    }
}

#[test]
fn test_at_most_one_mutation_per_tick() {
    // Skewed layout with split pressure: everything starts on one
    // ingester, loads above the split target, plenty of capacity.
    let directory = Arc::new(PartitionDirectory::new());
    let fleet = Arc::new(IngesterFleet::new());
    for i in 1..=5 {
        fleet.add(Arc::new(Ingester::new(
            format!("ingester-{}", i),
            1_000_000.0,
            0,
        )));
    }
    let config = PlacementConfig {
        partition_target_series: 300.0,
        partition_max_series: 1_000_000.0,
        ingester_target_series: 10_000.0,
        replication_factor: 1,
        ..Default::default()
    };
    let placement = PlacementService::new(
        Arc::clone(&directory),
        Arc::clone(&fleet),
        config,
        0,
    );
    let distributor = Distributor::new(Arc::clone(&directory), Arc::clone(&fleet));
    seed_skewed_tenant(&directory, &fleet, 25);

    let mut now = 0i64;
    for _ in 0..40 {
        now += 10_000;
        distributor.ingest("t-1", 20_000.0, now);

        let before = store_sets(&directory);
        placement.update(now);
        let after = store_sets(&directory);

        let added: Vec<_> = after.keys().filter(|id| !before.contains_key(*id)).collect();
        let moved: Vec<_> = before
            .iter()
            .filter(|(id, stores)| after.get(*id).is_some_and(|s| s != *stores))
            .collect();

        assert!(
            added.is_empty() || added.len() == 2,
            "a split creates exactly two partitions, saw {}",
            added.len()
        );
        assert!(moved.len() <= 1, "at most one move per tick");
        assert!(
            added.is_empty() || moved.is_empty(),
            "a tick performs a split or a move, never both"
        );

        for ingester in fleet.all() {
            ingester.update(now);
        }
    }
}

#[test]
fn test_capacity_gate_blocks_splits_when_saturated() {
    let mut config = SimulationConfig::default();
    config.placement = PlacementConfig {
        partition_target_series: 300.0,
        partition_max_series: 2_000.0,
        // 3 ingesters x 300 = 900 total capacity, dwarfed by the load
        ingester_target_series: 300.0,
        ..Default::default()
    };
    let clock = Arc::new(SimClock::manual());
    let cortex = Cortex::new(config, clock).unwrap();
    cortex.scale_up(3);
    cortex.create_tenant("acme", 4_000.0);

    for _ in 0..30 {
        run_round(&cortex, 30_000);
    }

    assert_eq!(
        cortex.directory().partition_count(),
        4,
        "no partition may be split while the fleet is saturated"
    );
}

#[test]
fn test_balance_convergence() {
    let directory = Arc::new(PartitionDirectory::new());
    let fleet = Arc::new(IngesterFleet::new());
    for i in 1..=5 {
        fleet.add(Arc::new(Ingester::new(
            format!("ingester-{}", i),
            1_000_000.0,
            0,
        )));
    }
    let config = PlacementConfig {
        // Splits disabled by an unreachable target; moves only
        partition_target_series: 900_000.0,
        partition_max_series: 1_000_000.0,
        ingester_target_series: 1_000_000.0,
        replication_factor: 1,
        ..Default::default()
    };
    let placement = PlacementService::new(
        Arc::clone(&directory),
        Arc::clone(&fleet),
        config,
        0,
    );
    let distributor = Distributor::new(Arc::clone(&directory), Arc::clone(&fleet));
    seed_skewed_tenant(&directory, &fleet, 25);

    let mut now = 0i64;
    let mut prev_skew = f64::INFINITY;
    let mut converged_at = None;

    for round in 0..60 {
        now += 10_000;
        distributor.ingest("t-1", 10_000.0, now);

        let skew = fleet_skew(&fleet, now);
        assert!(
            skew <= prev_skew + 1e-9,
            "skew must not increase: {} -> {} at round {}",
            prev_skew,
            skew,
            round
        );
        prev_skew = skew;
        if converged_at.is_none() && skew <= 0.1 {
            converged_at = Some(round);
        }

        let before = store_sets(&directory);
        placement.update(now);
        let after = store_sets(&directory);
        if converged_at.is_some() {
            assert_eq!(before, after, "no moves once the fleet is balanced");
        }

        for ingester in fleet.all() {
            ingester.update(now);
        }
    }

    assert!(
        converged_at.is_some(),
        "fleet must converge to a skew of at most 0.1, final skew {}",
        prev_skew
    );
}

// ── Helpers ──────────────────────────────────────────────────────────

/// Seed a tenant whose partitions all live on the last ingester.
fn seed_skewed_tenant(directory: &PartitionDirectory, fleet: &IngesterFleet, count: u64) {
    let hot = fleet.get("ingester-5").unwrap();
    let mut ids = Vec::new();
    for i in 0..count {
        let (min_range, max_range) = RangePartitioner::range(i, count);
        let mut partition = Partition::new("t-1", 0, min_range, max_range);
        partition.stores = vec![hot.name().to_string()];
        hot.assign_partition(PartitionReplica::from_partition(&partition));
        ids.push(partition.id.clone());
        directory.insert_partition(partition);
    }
    directory.insert_tenant(TenantRecord {
        tenant_id: "t-1".to_string(),
        alias: "acme".to_string(),
        partitions: ids,
        series_total: 0.0,
    });
}

/// Map of partition ID to its replica store set.
fn store_sets(directory: &PartitionDirectory) -> HashMap<String, Vec<String>> {
    directory
        .snapshot()
        .partitions
        .into_iter()
        .map(|p| {
            let mut stores = p.stores;
            stores.sort();
            (p.id, stores)
        })
        .collect()
}

/// (max - min) / max over the fleet's active series counts.
fn fleet_skew(fleet: &IngesterFleet, now: i64) -> f64 {
    let loads: Vec<f64> = fleet
        .all()
        .iter()
        .map(|i| i.active_series_count(now))
        .collect();
    let max = loads.iter().cloned().fold(f64::MIN, f64::max);
    let min = loads.iter().cloned().fold(f64::MAX, f64::min);
    if max <= 0.0 {
        0.0
    } else {
        (max - min) / max
    }
}
