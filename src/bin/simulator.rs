//! Shardplane cluster simulator
//!
//! Boots a simulated cluster, runs the three control loops at accelerated
//! time and prints the final cluster snapshot as JSON.

use clap::Parser;
use shardplane::clock::SimClock;
use shardplane::config::SimulationConfig;
use shardplane::cortex::Cortex;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

/// Shardplane control-plane simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of ingesters in the initial fleet
    #[arg(long, default_value = "5", env = "SHARDPLANE_INGESTERS")]
    ingesters: usize,

    /// Number of tenants to create
    #[arg(long, default_value = "2", env = "SHARDPLANE_TENANTS")]
    tenants: usize,

    /// Series ingested per tenant per ingestion tick
    #[arg(long, default_value = "4000")]
    series_per_tenant: f64,

    /// Simulated-time acceleration factor
    #[arg(long, default_value = "120", env = "SHARDPLANE_ACCELERATION")]
    acceleration: u32,

    /// Wall-clock seconds to run before printing the snapshot
    #[arg(long, default_value = "60")]
    run_secs: u64,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_new(&args.log_level)?)
        .init();

    let mut config = SimulationConfig::default();
    config.loops.acceleration = args.acceleration;

    let clock = Arc::new(SimClock::accelerated(args.acceleration));
    let cortex = Arc::new(Cortex::new(config, clock)?);

    cortex.scale_up(args.ingesters);
    for i in 0..args.tenants {
        cortex.create_tenant(&format!("tenant-{}", i + 1), args.series_per_tenant);
    }

    info!(
        ingesters = args.ingesters,
        tenants = args.tenants,
        acceleration = args.acceleration,
        "starting simulation"
    );

    let handles = cortex.start();

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(args.run_secs)) => {
            info!("simulation window elapsed");
        }
        _ = signal::ctrl_c() => {
            info!("interrupted");
        }
    }

    cortex.shutdown();
    for handle in handles {
        handle.await?;
    }

    println!("{}", serde_json::to_string_pretty(&cortex.snapshot())?);
    Ok(())
}
