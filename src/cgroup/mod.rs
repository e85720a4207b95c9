//! Absolute resource counters for sandboxes and containers.
//!
//! The stats server consumes cgroup data through the [`CgroupStatsSource`]
//! trait: given a cgroup parent path and an entity it returns absolute CPU,
//! memory and process counters stamped with a wall-clock sample time. Rates
//! are never computed here.
//!
//! [`CgroupFs`] is the cgroup v2 implementation reading the unified
//! hierarchy. Every call takes a [`CallContext`] carrying a deadline, so a
//! single slow read cannot stall a whole collection cycle.
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::sandbox::{Container, ContainerID, SandboxID};

mod fs;
pub mod stats;

pub use fs::CgroupFs;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cgroup `{path}` does not exist")]
    NotFound { path: PathBuf },
    #[error("no cgroup found for container {container_id} under `{parent}`")]
    ContainerNotFound {
        container_id: ContainerID,
        parent: PathBuf,
    },
    #[error("failed to read `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("deadline of {timeout:?} exceeded")]
    DeadlineExceeded { timeout: Duration },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Deadline propagated into every stats source call.
#[derive(Debug, Clone, Copy)]
pub struct CallContext {
    deadline: Instant,
    timeout: Duration,
}

impl CallContext {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            timeout,
        }
    }

    /// Returns [`Error::DeadlineExceeded`] once the deadline has passed.
    pub fn check(&self) -> Result<()> {
        if Instant::now() >= self.deadline {
            return Err(Error::DeadlineExceeded {
                timeout: self.timeout,
            });
        }
        Ok(())
    }
}

/// CPU counters in nanoseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuStats {
    pub total_usage_nano: u64,
    pub user_usage_nano: u64,
    pub system_usage_nano: u64,
    pub nr_periods: u64,
    pub nr_throttled: u64,
    pub throttled_nano: u64,
}

/// Memory counters in bytes, page faults in events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub usage: u64,
    /// `None` when the cgroup has no memory limit.
    pub limit: Option<u64>,
    pub working_set_bytes: u64,
    pub rss_bytes: u64,
    pub cache: u64,
    pub kernel: u64,
    pub file_mapped: u64,
    pub page_faults: u64,
    pub major_page_faults: u64,
    pub available_bytes: u64,
    pub swap_usage: u64,
    /// `None` when swap is unlimited.
    pub swap_limit: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PidsStats {
    pub current: u64,
    pub limit: Option<u64>,
}

/// One sample of absolute counters for a cgroup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CgroupStats {
    pub cpu: CpuStats,
    pub memory: MemoryStats,
    pub pids: PidsStats,
    /// Wall-clock time of the sample, nanoseconds since the UNIX epoch.
    pub system_nano: i64,
}

/// Per-container cgroup handle used for secondary lookups.
pub trait CgroupHandle: Send {
    fn oom_kill_count(&self, ctx: &CallContext) -> Result<u64>;
}

/// The cgroup driver producing raw counters.
pub trait CgroupStatsSource: Send + Sync {
    fn sandbox_cgroup_stats(
        &self,
        ctx: &CallContext,
        cgroup_parent: &Path,
        sandbox_id: &SandboxID,
    ) -> Result<CgroupStats>;

    fn container_stats(
        &self,
        ctx: &CallContext,
        container: &Container,
        cgroup_parent: &Path,
    ) -> Result<CgroupStats>;

    fn container_cgroup(
        &self,
        ctx: &CallContext,
        cgroup_parent: &Path,
        container_id: &ContainerID,
    ) -> Result<Box<dyn CgroupHandle>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_timeout_is_exceeded() {
        let ctx = CallContext::with_timeout(Duration::ZERO);
        assert!(matches!(
            ctx.check(),
            Err(Error::DeadlineExceeded { timeout }) if timeout == Duration::ZERO
        ));
    }

    #[test]
    fn test_generous_timeout_passes() {
        let ctx = CallContext::with_timeout(Duration::from_secs(60));
        assert!(ctx.check().is_ok());
    }
}
