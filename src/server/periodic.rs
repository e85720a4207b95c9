use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;

use crate::config::CollectionMode;
use crate::stats::SandboxStats;

use super::StatsServer;

/// Keeps the cache of a continuous-mode server warm.
///
/// Every tick refreshes all registered sandboxes on a blocking thread, then
/// forwards the freshly cached stats to `tx`. Returns when `shutdown` fires,
/// when the receiving side of `tx` is gone, or right away for an on-demand
/// server.
pub async fn run_periodic(
    server: Arc<StatsServer>,
    tx: mpsc::Sender<Vec<SandboxStats>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let CollectionMode::Continuous(period) = server.mode() else {
        log::warn!("periodic refresh requested for an on-demand stats server");
        return;
    };
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.recv() => {
                log::debug!("periodic refresh stopped");
                return;
            }
        }

        let server = Arc::clone(&server);
        let out = tokio::task::spawn_blocking(move || {
            let before = Instant::now();
            let report = server.refresh();
            log::trace!(
                "refresh() took {} nanoseconds: sandboxes={}, errors={}",
                before.elapsed().as_nanos(),
                report.sandboxes,
                report.errors.len()
            );
            server.list_sandbox_stats()
        })
        .await;

        let stats = match out {
            Ok(stats) => stats,
            Err(err) => {
                log::error!("refresh task failed: {err}");
                continue;
            }
        };
        if tx.send(stats).await.is_err() {
            log::debug!("stats receiver dropped, stopping periodic refresh");
            return;
        }
    }
}
