//! Stats server configuration and the sandbox inventory file.
//!
//! Both are JSON documents. Every configuration field is optional:
//!
//! ```json
//! {
//!   "collection_period_secs": 10,
//!   "included_pod_metrics": ["cpu", "memory", "network", "oom"],
//!   "stats_call_timeout_ms": 2000,
//!   "default_interface": {"named": "eth0"},
//!   "cgroup_root": "/sys/fs/cgroup"
//! }
//! ```
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fsutil::{self, FileOpenError};
use crate::metrics::MetricSelection;
use crate::sandbox::Sandbox;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Open(#[from] FileOpenError),
    #[error("failed to parse `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Which link of a sandbox's namespace is reported as its default interface.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultInterface {
    /// The first link in kernel enumeration order.
    First,
    /// The link with this name, or the first link when it is absent.
    Named(String),
}

impl Default for DefaultInterface {
    fn default() -> Self {
        DefaultInterface::Named("eth0".to_owned())
    }
}

/// Freshness policy of the read path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionMode {
    /// Every read recomputes.
    OnDemand,
    /// Reads are served from cache, kept warm by a refresh at this period.
    Continuous(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub collection_period_secs: u64,
    pub included_pod_metrics: Vec<String>,
    pub stats_call_timeout_ms: u64,
    pub default_interface: DefaultInterface,
    pub cgroup_root: PathBuf,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            collection_period_secs: 0,
            included_pod_metrics: ["cpu", "memory", "network", "oom"]
                .map(String::from)
                .to_vec(),
            stats_call_timeout_ms: 2000,
            default_interface: DefaultInterface::default(),
            cgroup_root: PathBuf::from("/sys/fs/cgroup"),
        }
    }
}

impl StatsConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref())
    }

    pub fn mode(&self) -> CollectionMode {
        match self.collection_period_secs {
            0 => CollectionMode::OnDemand,
            secs => CollectionMode::Continuous(Duration::from_secs(secs)),
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.stats_call_timeout_ms)
    }

    pub fn metric_selection(&self) -> MetricSelection {
        MetricSelection::from_names(&self.included_pod_metrics)
    }
}

/// Loads the sandbox snapshots the binary monitors.
pub fn load_inventory(path: impl AsRef<Path>) -> Result<Vec<Sandbox>> {
    read_json(path.as_ref())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let reader = fsutil::open_file_reader(path)?;
    serde_json::from_reader(reader).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })
}
