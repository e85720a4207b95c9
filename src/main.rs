/// Entry point for the Pod Stats collector.
///
/// Reads a sandbox inventory, collects cgroup and network statistics for
/// every sandbox and its containers, and prints them as JSON.
///
/// # Errors
///
/// Returns an error if the configuration or inventory cannot be loaded.
///
/// # Examples
///
/// ```bash
/// POD_STATS_INVENTORY=/etc/pod-stats/sandboxes.json RUST_LOG=debug cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    pod_stats::run().await
}
