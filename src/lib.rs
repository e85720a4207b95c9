//! Pod Stats: per-sandbox and per-container resource statistics for a
//! container runtime.
//!
//! This library reads absolute counters from cgroup v2 and from sandbox
//! network namespaces, derives CPU rates across samples, caches the results
//! per entity and exposes them as hierarchical stats and as flat metrics.

pub mod cgroup;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod metrics;
pub mod netns;
pub mod sandbox;
pub mod server;
pub mod stats;

use std::path::PathBuf;
use std::sync::Arc;

use config::{CollectionMode, StatsConfig};
use error::ResultOkLogExt;
use server::StatsServer;
use stats::SandboxStats;

/// Runs the stats collector over a static sandbox inventory.
///
/// The configuration is read from the file named by `POD_STATS_CONFIG`
/// (defaults apply when unset) and the sandboxes from the JSON array named by
/// `POD_STATS_INVENTORY`. An on-demand configuration prints one snapshot and
/// returns; a continuous one refreshes at the configured period and prints
/// every cycle until interrupted.
///
/// # Errors
///
/// Possible errors include:
/// - Missing `POD_STATS_INVENTORY` environment variable.
/// - Unreadable or malformed configuration or inventory file.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::var_os("POD_STATS_CONFIG") {
        Some(path) => StatsConfig::from_path(PathBuf::from(path))?,
        None => StatsConfig::default(),
    };
    log::debug!("Configuration: {config:?}");

    let inventory = std::env::var_os("POD_STATS_INVENTORY")
        .map(PathBuf::from)
        .ok_or("environment variable `POD_STATS_INVENTORY` must be set")?;
    let sandboxes = config::load_inventory(&inventory)?;
    log::debug!(
        "Loaded {} sandboxes from `{}`",
        sandboxes.len(),
        inventory.display()
    );

    let server = Arc::new(StatsServer::builder(config).build());
    for sandbox in sandboxes {
        server.register_sandbox(sandbox);
    }

    if server.mode() == CollectionMode::OnDemand {
        let stats = {
            let server = Arc::clone(&server);
            tokio::task::spawn_blocking(move || server.list_sandbox_stats()).await?
        };
        print_stats(&stats);
        return Ok(());
    }

    let (tx, mut rx) = tokio::sync::mpsc::channel::<Vec<SandboxStats>>(10);
    tokio::spawn(async move {
        while let Some(stats) = rx.recv().await {
            print_stats(&stats);
        }
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let collector = tokio::spawn(server::periodic::run_periodic(
        Arc::clone(&server),
        tx,
        shutdown_rx,
    ));

    tokio::signal::ctrl_c().await?;
    log::debug!("SIGINT received, shutting down");
    // The collector may already have stopped on its own.
    let _ = shutdown_tx.send(());
    collector.await?;
    Ok(())
}

fn print_stats(stats: &[SandboxStats]) {
    if let Some(line) = serde_json::to_string(stats).ok_log() {
        println!("{line}");
    }
}
