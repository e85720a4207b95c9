use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::fsutil::{self, FileOpenError};
use crate::sandbox::{Container, ContainerID, SandboxID};

use super::stats::{
    CounterValue, CpuStat, KeyValueStat, LimitValue, MemoryEvents, MemoryStat, SingleValueStat,
};
use super::{
    CallContext, CgroupHandle, CgroupStats, CgroupStatsSource, CpuStats, Error, MemoryStats,
    PidsStats, Result,
};

/// Stats source reading a cgroup v2 unified hierarchy mounted at `root`.
#[derive(Debug, Clone)]
pub struct CgroupFs {
    root: PathBuf,
}

impl CgroupFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn parent_dir(&self, cgroup_parent: &Path) -> PathBuf {
        self.root
            .join(cgroup_parent.strip_prefix("/").unwrap_or(cgroup_parent))
    }

    /// Resolves a container cgroup below its sandbox parent, trying the
    /// systemd scope name, the cgroupfs name and the bare id in that order.
    fn container_dir(&self, cgroup_parent: &Path, container_id: &ContainerID) -> Result<PathBuf> {
        let parent = self.parent_dir(cgroup_parent);
        [
            format!("crio-{container_id}.scope"),
            format!("crio-{container_id}"),
            container_id.to_string(),
        ]
        .into_iter()
        .map(|name| parent.join(name))
        .find(|dir| dir.is_dir())
        .ok_or_else(|| Error::ContainerNotFound {
            container_id: container_id.clone(),
            parent,
        })
    }
}

impl CgroupStatsSource for CgroupFs {
    fn sandbox_cgroup_stats(
        &self,
        ctx: &CallContext,
        cgroup_parent: &Path,
        sandbox_id: &SandboxID,
    ) -> Result<CgroupStats> {
        let dir = self.parent_dir(cgroup_parent);
        if !dir.is_dir() {
            return Err(Error::NotFound { path: dir });
        }
        log::trace!("reading sandbox cgroup: sandbox_id={sandbox_id}, path={}", dir.display());
        read_cgroup(ctx, &dir)
    }

    fn container_stats(
        &self,
        ctx: &CallContext,
        container: &Container,
        cgroup_parent: &Path,
    ) -> Result<CgroupStats> {
        ctx.check()?;
        let dir = self.container_dir(cgroup_parent, &container.id)?;
        read_cgroup(ctx, &dir)
    }

    fn container_cgroup(
        &self,
        ctx: &CallContext,
        cgroup_parent: &Path,
        container_id: &ContainerID,
    ) -> Result<Box<dyn CgroupHandle>> {
        ctx.check()?;
        let dir = self.container_dir(cgroup_parent, container_id)?;
        Ok(Box::new(CgroupDir { dir }))
    }
}

#[derive(Debug)]
struct CgroupDir {
    dir: PathBuf,
}

impl CgroupHandle for CgroupDir {
    fn oom_kill_count(&self, ctx: &CallContext) -> Result<u64> {
        ctx.check()?;
        let events = read_required(&self.dir.join("memory.events"), MemoryEvents::from_reader)?;
        Ok(events.oom_kill)
    }
}

fn read_cgroup(ctx: &CallContext, dir: &Path) -> Result<CgroupStats> {
    ctx.check()?;
    let cpu = read_required(&dir.join("cpu.stat"), CpuStat::from_reader)?;

    ctx.check()?;
    let usage = read_optional(&dir.join("memory.current"), CounterValue::from_reader)?;
    let limit = read_optional(&dir.join("memory.max"), LimitValue::from_reader)?;
    ctx.check()?;
    let memory_stat = read_optional(&dir.join("memory.stat"), MemoryStat::from_reader)?;
    ctx.check()?;
    let swap_usage = read_optional(&dir.join("memory.swap.current"), CounterValue::from_reader)?;
    let swap_limit = read_optional(&dir.join("memory.swap.max"), LimitValue::from_reader)?;
    ctx.check()?;
    let pids_current = read_optional(&dir.join("pids.current"), CounterValue::from_reader)?;
    let pids_limit = read_optional(&dir.join("pids.max"), LimitValue::from_reader)?;

    let memory_stat = memory_stat.unwrap_or_default();
    let usage = usage.unwrap_or_default().0;
    let limit = limit.and_then(|l| l.0);
    let working_set_bytes = usage.saturating_sub(memory_stat.inactive_file);

    Ok(CgroupStats {
        cpu: CpuStats {
            total_usage_nano: cpu.usage_usec.saturating_mul(1000),
            user_usage_nano: cpu.user_usec.saturating_mul(1000),
            system_usage_nano: cpu.system_usec.saturating_mul(1000),
            nr_periods: cpu.nr_periods,
            nr_throttled: cpu.nr_throttled,
            throttled_nano: cpu.throttled_usec.saturating_mul(1000),
        },
        memory: MemoryStats {
            usage,
            limit,
            working_set_bytes,
            rss_bytes: memory_stat.anon,
            cache: memory_stat.file,
            kernel: memory_stat.kernel_usage(),
            file_mapped: memory_stat.file_mapped,
            page_faults: memory_stat.pgfault,
            major_page_faults: memory_stat.pgmajfault,
            available_bytes: limit
                .map(|l| l.saturating_sub(working_set_bytes))
                .unwrap_or(0),
            swap_usage: swap_usage.unwrap_or_default().0,
            swap_limit: swap_limit.and_then(|l| l.0),
        },
        pids: PidsStats {
            current: pids_current.unwrap_or_default().0,
            limit: pids_limit.and_then(|l| l.0),
        },
        system_nano: now_nanos(),
    })
}

fn read_required<T>(
    path: &Path,
    parse: impl FnOnce(&mut BufReader<File>) -> std::io::Result<T>,
) -> Result<T> {
    let mut reader =
        fsutil::open_file_reader(path).map_err(|FileOpenError { path, source }| Error::Read {
            path,
            source,
        })?;
    parse(&mut reader).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Like [`read_required`], but a missing file yields `Ok(None)`; controllers
/// that are not enabled simply lack their interface files.
fn read_optional<T>(
    path: &Path,
    parse: impl FnOnce(&mut BufReader<File>) -> std::io::Result<T>,
) -> Result<Option<T>> {
    match read_required(path, parse) {
        Ok(v) => Ok(Some(v)),
        Err(Error::Read { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn write_cgroup(dir: &Path, files: &[(&str, &str)]) {
        std::fs::create_dir_all(dir).unwrap();
        for (name, content) in files {
            std::fs::write(dir.join(name), content).unwrap();
        }
    }

    fn ctx() -> CallContext {
        CallContext::with_timeout(Duration::from_secs(30))
    }

    #[test]
    fn test_sandbox_stats_from_full_cgroup() {
        let root = tempfile::tempdir().unwrap();
        write_cgroup(
            &root.path().join("kubepods.slice/pod1.slice"),
            &[
                ("cpu.stat", "usage_usec 1500\nuser_usec 1000\nsystem_usec 500\n"),
                ("memory.current", "10000\n"),
                ("memory.max", "50000\n"),
                (
                    "memory.stat",
                    "anon 6000\nfile 3000\ninactive_file 2000\npgfault 11\npgmajfault 2\n",
                ),
                ("memory.swap.current", "100\n"),
                ("memory.swap.max", "1000\n"),
                ("pids.current", "7\n"),
                ("pids.max", "max\n"),
            ],
        );

        let fs = CgroupFs::new(root.path());
        let stats = fs
            .sandbox_cgroup_stats(
                &ctx(),
                Path::new("/kubepods.slice/pod1.slice"),
                &SandboxID::new("sb").unwrap(),
            )
            .unwrap();

        assert_eq!(stats.cpu.total_usage_nano, 1_500_000);
        assert_eq!(stats.cpu.user_usage_nano, 1_000_000);
        assert_eq!(stats.memory.usage, 10_000);
        assert_eq!(stats.memory.working_set_bytes, 8_000);
        assert_eq!(stats.memory.available_bytes, 42_000);
        assert_eq!(stats.memory.rss_bytes, 6_000);
        assert_eq!(stats.memory.page_faults, 11);
        assert_eq!(stats.memory.swap_limit, Some(1000));
        assert_eq!(stats.pids.current, 7);
        assert_eq!(stats.pids.limit, None);
        assert!(stats.system_nano > 0);
    }

    #[test]
    fn test_optional_files_default_to_zero() {
        let root = tempfile::tempdir().unwrap();
        write_cgroup(&root.path().join("pod"), &[("cpu.stat", "usage_usec 1\n")]);

        let stats = CgroupFs::new(root.path())
            .sandbox_cgroup_stats(&ctx(), Path::new("pod"), &SandboxID::new("sb").unwrap())
            .unwrap();
        assert_eq!(stats.memory, MemoryStats::default());
        assert_eq!(stats.pids, PidsStats::default());
    }

    #[test]
    fn test_missing_sandbox_cgroup() {
        let root = tempfile::tempdir().unwrap();
        let err = CgroupFs::new(root.path())
            .sandbox_cgroup_stats(&ctx(), Path::new("gone"), &SandboxID::new("sb").unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_container_scope_resolution_and_oom_count() {
        let root = tempfile::tempdir().unwrap();
        let scope = root.path().join("pod/crio-c1.scope");
        write_cgroup(
            &scope,
            &[
                ("cpu.stat", "usage_usec 20\n"),
                ("memory.events", "oom 3\noom_kill 2\n"),
            ],
        );

        let fs = CgroupFs::new(root.path());
        let container = Container::new(ContainerID::new("c1").unwrap());
        let stats = fs
            .container_stats(&ctx(), &container, Path::new("pod"))
            .unwrap();
        assert_eq!(stats.cpu.total_usage_nano, 20_000);

        let handle = fs
            .container_cgroup(&ctx(), Path::new("pod"), &container.id)
            .unwrap();
        assert_eq!(handle.oom_kill_count(&ctx()).unwrap(), 2);

        let expired = CallContext::with_timeout(Duration::ZERO);
        assert!(matches!(
            handle.oom_kill_count(&expired),
            Err(Error::DeadlineExceeded { .. })
        ));
        assert!(matches!(
            fs.container_cgroup(&expired, Path::new("pod"), &container.id),
            Err(Error::DeadlineExceeded { .. })
        ));
    }

    #[test]
    fn test_huge_usec_counters_saturate() {
        let root = tempfile::tempdir().unwrap();
        let huge = u64::MAX / 10;
        let cpu_stat = format!("usage_usec {huge}\nuser_usec 1\nthrottled_usec {huge}\n");
        write_cgroup(&root.path().join("pod"), &[("cpu.stat", cpu_stat.as_str())]);
        let stats = CgroupFs::new(root.path())
            .sandbox_cgroup_stats(&ctx(), Path::new("pod"), &SandboxID::new("sb").unwrap())
            .unwrap();
        assert_eq!(stats.cpu.total_usage_nano, u64::MAX);
        assert_eq!(stats.cpu.throttled_nano, u64::MAX);
        assert_eq!(stats.cpu.user_usage_nano, 1000);
    }

    #[test]
    fn test_unknown_container() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("pod")).unwrap();
        let fs = CgroupFs::new(root.path());
        let container = Container::new(ContainerID::new("nope").unwrap());
        assert!(matches!(
            fs.container_stats(&ctx(), &container, Path::new("pod")),
            Err(Error::ContainerNotFound { .. })
        ));
    }

    #[test]
    fn test_expired_deadline_aborts_read() {
        let root = tempfile::tempdir().unwrap();
        write_cgroup(&root.path().join("pod"), &[("cpu.stat", "usage_usec 1\n")]);
        let ctx = CallContext::with_timeout(Duration::ZERO);
        let err = CgroupFs::new(root.path())
            .sandbox_cgroup_stats(&ctx, Path::new("pod"), &SandboxID::new("sb").unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::DeadlineExceeded { .. }));
    }

    #[test]
    fn test_malformed_cpu_stat() {
        let root = tempfile::tempdir().unwrap();
        write_cgroup(&root.path().join("pod"), &[("cpu.stat", "usage_usec xyz\n")]);
        let err = CgroupFs::new(root.path())
            .sandbox_cgroup_stats(&ctx(), Path::new("pod"), &SandboxID::new("sb").unwrap())
            .unwrap_err();
        match err {
            Error::Read { source, .. } => {
                assert_eq!(source.kind(), std::io::ErrorKind::InvalidData)
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
