//! The stats server: cached, rate-aware sandbox and container statistics.
//!
//! Reads follow the configured [`CollectionMode`]. In on-demand mode every
//! read recomputes the entity and overwrites its cache entry. In continuous
//! mode a read is served from the cache and only falls back to computing on a
//! miss; [`periodic::run_periodic`] keeps the cache warm.
//!
//! One update of a sandbox fetches the sandbox cgroup, every live container
//! cgroup and the network namespace at most once each. Stats, CPU rates and
//! metrics are all derived from those samples.
//!
//! All cache access happens under one lock. The internal update functions
//! take `&mut StatsCache`, so they can only be reached while it is held.
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::cgroup::{CallContext, CgroupFs, CgroupStats, CgroupStatsSource};
use crate::config::{CollectionMode, DefaultInterface, StatsConfig};
use crate::error::{Collected, CollectionError, ErrorSink};
use crate::metrics::{
    self, Metric, MetricDescriptor, MetricFamily, MetricScope, MetricSelection, SandboxMetrics,
};
use crate::netns::{NetNsSampler, NetworkSample, NetworkSampler};
use crate::sandbox::{
    Container, ContainerID, DirectoryLayerUsage, Sandbox, SandboxID, WritableLayerProvider,
};
use crate::stats::{self, ContainerStats, LinuxPodSandboxStats, SandboxStats};

mod cache;
pub mod periodic;
mod registry;

pub use cache::StatsCache;
pub use registry::SandboxRegistry;

const LOG_TARGET: &str = "stats server";

/// Outcome of one pass over every registered sandbox.
#[derive(Debug, Default)]
pub struct RefreshReport {
    pub sandboxes: usize,
    pub errors: Vec<CollectionError>,
}

pub struct StatsServer {
    mode: CollectionMode,
    call_timeout: Duration,
    default_interface: DefaultInterface,
    selection: MetricSelection,
    source: Arc<dyn CgroupStatsSource>,
    sampler: Arc<dyn NetworkSampler>,
    layers: Arc<dyn WritableLayerProvider>,
    registry: SandboxRegistry,
    cache: Mutex<StatsCache>,
}

impl StatsServer {
    pub fn builder(config: StatsConfig) -> StatsServerBuilder {
        StatsServerBuilder::new(config)
    }

    pub fn mode(&self) -> CollectionMode {
        self.mode
    }

    pub fn metric_selection(&self) -> &MetricSelection {
        &self.selection
    }

    /// Descriptors of every metric the enabled families can emit.
    pub fn metric_descriptors(&self) -> Vec<&'static MetricDescriptor> {
        metrics::descriptors_for(&self.selection)
    }

    /// Inserts or replaces a sandbox snapshot. Cache entries of containers
    /// missing from the new snapshot are purged.
    pub fn register_sandbox(&self, sandbox: Sandbox) {
        let id = sandbox.id.clone();
        let Some(previous) = self.registry.register(sandbox) else {
            return;
        };
        let Some(current) = self.registry.get(id.as_str()) else {
            return;
        };
        let mut cache = self.lock();
        for container in &previous.containers {
            if current.container(container.id.as_str()).is_none() {
                cache.purge_container(&container.id, Some(&id));
            }
        }
    }

    /// Forgets a sandbox and purges it and its containers from the cache.
    pub fn remove_sandbox(&self, id: &SandboxID) -> bool {
        let Some(sandbox) = self.registry.remove(id) else {
            return false;
        };
        self.lock()
            .purge_sandbox(id, sandbox.containers.iter().map(|c| &c.id));
        log::debug!(target: LOG_TARGET, "removed sandbox: sandbox_id={id}");
        true
    }

    /// Forgets a container and purges its stats and metrics.
    pub fn remove_container(&self, id: &ContainerID) -> bool {
        let Some(owner) = self.registry.remove_container(id) else {
            return false;
        };
        self.lock().purge_container(id, Some(&owner));
        log::debug!(target: LOG_TARGET, "removed container: container_id={id}, sandbox_id={owner}");
        true
    }

    pub fn sandbox_stats(&self, id: &str) -> Option<SandboxStats> {
        let sandbox = self.registry.get(id)?;
        Some(self.sandbox_stats_locked(&mut self.lock(), &sandbox))
    }

    /// Stats of a live container. Stopped or unknown containers yield `None`.
    pub fn container_stats(&self, id: &str) -> Option<ContainerStats> {
        let sandbox = self.registry.find_container(id)?;
        let container = sandbox.container(id)?;
        self.container_stats_locked(&mut self.lock(), &sandbox, container)
    }

    pub fn list_sandbox_stats(&self) -> Vec<SandboxStats> {
        self.registry
            .list()
            .iter()
            .map(|sandbox| self.sandbox_stats_locked(&mut self.lock(), sandbox))
            .collect()
    }

    pub fn list_container_stats(&self) -> Vec<ContainerStats> {
        self.list_sandbox_stats()
            .into_iter()
            .flat_map(|stats| stats.linux.containers)
            .collect()
    }

    pub fn sandbox_metrics(&self, id: &str) -> Option<SandboxMetrics> {
        let sandbox = self.registry.get(id)?;
        Some(self.sandbox_metrics_locked(&mut self.lock(), &sandbox))
    }

    pub fn list_sandbox_metrics(&self) -> Vec<SandboxMetrics> {
        self.registry
            .list()
            .iter()
            .map(|sandbox| self.sandbox_metrics_locked(&mut self.lock(), sandbox))
            .collect()
    }

    /// Recomputes a sandbox regardless of the collection mode.
    pub fn update_sandbox_stats(&self, id: &str) -> Option<Collected<SandboxStats>> {
        let sandbox = self.registry.get(id)?;
        Some(self.update_sandbox(&mut self.lock(), &sandbox))
    }

    /// Recomputes every registered sandbox. This is the periodic entry point.
    pub fn refresh(&self) -> RefreshReport {
        let mut report = RefreshReport::default();
        for sandbox in self.registry.list() {
            let collected = self.update_sandbox(&mut self.lock(), &sandbox);
            report.sandboxes += 1;
            report.errors.extend(collected.errors);
        }
        report
    }

    fn lock(&self) -> MutexGuard<'_, StatsCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn call_context(&self) -> CallContext {
        CallContext::with_timeout(self.call_timeout)
    }

    fn sandbox_stats_locked(&self, cache: &mut StatsCache, sandbox: &Sandbox) -> SandboxStats {
        if let CollectionMode::Continuous(_) = self.mode {
            if let Some(stats) = cache.sandbox_stats(sandbox.id.as_str()) {
                log::trace!(target: LOG_TARGET, "cache hit: sandbox_id={}", sandbox.id);
                return stats.clone();
            }
            log::trace!(target: LOG_TARGET, "cache miss: sandbox_id={}", sandbox.id);
        }
        self.update_sandbox(cache, sandbox).value
    }

    fn container_stats_locked(
        &self,
        cache: &mut StatsCache,
        sandbox: &Sandbox,
        container: &Container,
    ) -> Option<ContainerStats> {
        if container.status.is_stopped() {
            return None;
        }
        if let CollectionMode::Continuous(_) = self.mode {
            if let Some(stats) = cache.container_stats(container.id.as_str()) {
                log::trace!(target: LOG_TARGET, "cache hit: container_id={}", container.id);
                return Some(stats.clone());
            }
            log::trace!(target: LOG_TARGET, "cache miss: container_id={}", container.id);
        }
        self.update_container(cache, sandbox, container).value
    }

    fn sandbox_metrics_locked(&self, cache: &mut StatsCache, sandbox: &Sandbox) -> SandboxMetrics {
        if let CollectionMode::Continuous(_) = self.mode {
            if let Some(metrics) = cache.sandbox_metrics(sandbox.id.as_str()) {
                return metrics.clone();
            }
        }
        self.update_sandbox_metrics(cache, sandbox).value
    }

    /// Recomputes a sandbox, its live containers and its metrics, replacing
    /// their cache entries.
    fn update_sandbox(&self, cache: &mut StatsCache, sandbox: &Sandbox) -> Collected<SandboxStats> {
        let mut errors = Vec::new();
        let mut linux = LinuxPodSandboxStats::default();

        let cgstats = errors.keep(
            self.source
                .sandbox_cgroup_stats(&self.call_context(), &sandbox.cgroup_parent, &sandbox.id),
            |source| CollectionError::SandboxCgroup {
                sandbox: sandbox.id.clone(),
                source,
            },
        );
        if let Some(cg) = cgstats {
            let ts = cg.system_nano;
            let mut cpu = stats::cpu_usage(&cg.cpu, ts);
            let previous = cache
                .sandbox_stats(sandbox.id.as_str())
                .and_then(|prev| prev.linux.cpu.as_ref());
            stats::update_usage_nano_cores(previous, &mut cpu);
            linux.cpu = Some(cpu);
            linux.memory = Some(stats::memory_usage(&cg.memory, ts));
            linux.process = Some(stats::process_usage(&cg.pids, ts));
        }

        let sample = self.sample_network(sandbox, &mut errors);
        linux.network = sample
            .as_ref()
            .map(|s| stats::network_usage(s, &self.default_interface));

        let mut container_metrics = Vec::new();
        for container in sandbox.live_containers() {
            let Some((cstats, cg)) = self.compute_container(cache, sandbox, container, &mut errors)
            else {
                cache.purge_container(&container.id, None);
                continue;
            };
            let records = self.container_metrics(container, &sandbox.cgroup_parent, &cg, &mut errors);
            if !records.is_empty() {
                container_metrics.push((container.id.clone(), records));
            }
            cache.insert_container_stats(cstats.clone());
            linux.containers.push(cstats);
        }

        let accumulator = cache.sandbox_metrics_entry(&sandbox.id);
        accumulator.reset();
        accumulator.add(MetricScope::Pod, self.pod_metrics(sample.as_ref()));
        for (id, records) in container_metrics {
            accumulator.add(MetricScope::Container(&id), records);
        }

        let stats = SandboxStats {
            attributes: sandbox.into(),
            linux,
        };
        cache.insert_sandbox_stats(stats.clone());
        Collected {
            value: stats,
            errors,
        }
    }

    fn update_sandbox_metrics(
        &self,
        cache: &mut StatsCache,
        sandbox: &Sandbox,
    ) -> Collected<SandboxMetrics> {
        let collected = self.update_sandbox(cache, sandbox);
        let metrics = cache
            .sandbox_metrics(sandbox.id.as_str())
            .cloned()
            .unwrap_or_else(|| SandboxMetrics::new(sandbox.id.clone()));
        Collected {
            value: metrics,
            errors: collected.errors,
        }
    }

    fn update_container(
        &self,
        cache: &mut StatsCache,
        sandbox: &Sandbox,
        container: &Container,
    ) -> Collected<Option<ContainerStats>> {
        let mut errors = Vec::new();
        let value = match self.compute_container(cache, sandbox, container, &mut errors) {
            Some((cstats, _)) => {
                cache.insert_container_stats(cstats.clone());
                Some(cstats)
            }
            None => {
                cache.purge_container(&container.id, None);
                None
            }
        };
        Collected { value, errors }
    }

    /// Fetches a container's cgroup once and derives its stats, including the
    /// CPU rate against the cached previous sample. The raw sample is returned
    /// for metric generation.
    fn compute_container(
        &self,
        cache: &StatsCache,
        sandbox: &Sandbox,
        container: &Container,
        errors: &mut Vec<CollectionError>,
    ) -> Option<(ContainerStats, CgroupStats)> {
        let cg = errors.keep(
            self.source
                .container_stats(&self.call_context(), container, &sandbox.cgroup_parent),
            |source| CollectionError::ContainerCgroup {
                container: container.id.clone(),
                source,
            },
        )?;
        let mut cstats = stats::container_stats(&cg, container);
        if let Some(cpu) = cstats.cpu.as_mut() {
            let previous = cache
                .container_stats(container.id.as_str())
                .and_then(|prev| prev.cpu.as_ref());
            stats::update_usage_nano_cores(previous, cpu);
        }
        cstats.writable_layer = errors
            .keep(self.layers.writable_layer_usage(container), |source| {
                CollectionError::WritableLayer {
                    container: container.id.clone(),
                    source,
                }
            })
            .flatten()
            .map(|layer| stats::filesystem_usage(layer, cg.system_nano));
        Some((cstats, cg))
    }

    /// Samples the sandbox network namespace when network collection is
    /// enabled. Host-network sandboxes have nothing to sample.
    fn sample_network(
        &self,
        sandbox: &Sandbox,
        errors: &mut Vec<CollectionError>,
    ) -> Option<NetworkSample> {
        if !self.selection.contains(MetricFamily::Network) {
            return None;
        }
        let path = sandbox.net_ns_path.as_deref()?;
        errors.keep(self.sampler.sample(path), |source| CollectionError::Network {
            sandbox: sandbox.id.clone(),
            source,
        })
    }

    fn pod_metrics(&self, sample: Option<&NetworkSample>) -> Vec<Metric> {
        let mut out = Vec::new();
        for family in self.selection.families() {
            match family {
                MetricFamily::Network => {
                    if let Some(sample) = sample {
                        out.extend(metrics::network_metrics(&sample.links, sample.timestamp));
                    }
                }
                MetricFamily::Cpu | MetricFamily::Memory | MetricFamily::Oom => {}
            }
        }
        out
    }

    /// Container-scoped records in configured family order.
    fn container_metrics(
        &self,
        container: &Container,
        cgroup_parent: &Path,
        cg: &CgroupStats,
        errors: &mut Vec<CollectionError>,
    ) -> Vec<Metric> {
        let labels = metrics::container_labels(container);
        let ts = cg.system_nano;
        let mut out = Vec::new();
        for family in self.selection.families() {
            match family {
                MetricFamily::Cpu => out.extend(metrics::cpu_metrics(&labels, &cg.cpu, ts)),
                MetricFamily::Memory => {
                    out.extend(metrics::memory_metrics(&labels, &cg.memory, ts))
                }
                MetricFamily::Oom => {
                    if let Some(count) = self.oom_kill_count(cgroup_parent, &container.id, errors) {
                        out.extend(metrics::oom_metrics(&labels, count, ts));
                    }
                }
                MetricFamily::Network => {}
            }
        }
        out
    }

    fn oom_kill_count(
        &self,
        cgroup_parent: &Path,
        container_id: &ContainerID,
        errors: &mut Vec<CollectionError>,
    ) -> Option<u64> {
        let count = self
            .source
            .container_cgroup(&self.call_context(), cgroup_parent, container_id)
            .and_then(|handle| handle.oom_kill_count(&self.call_context()));
        errors.keep(count, |source| CollectionError::OomCount {
            container: container_id.clone(),
            source,
        })
    }
}

/// Assembles a [`StatsServer`] from a configuration and its collaborators.
///
/// Collaborators that are not set default to the cgroup v2 filesystem under
/// the configured root, namespace-entering network sampling and directory
/// walking for writable layers.
pub struct StatsServerBuilder {
    config: StatsConfig,
    source: Option<Arc<dyn CgroupStatsSource>>,
    sampler: Option<Arc<dyn NetworkSampler>>,
    layers: Option<Arc<dyn WritableLayerProvider>>,
}

impl StatsServerBuilder {
    pub fn new(config: StatsConfig) -> Self {
        Self {
            config,
            source: None,
            sampler: None,
            layers: None,
        }
    }

    pub fn cgroup_source(&mut self, source: Arc<dyn CgroupStatsSource>) -> &mut Self {
        self.source = Some(source);
        self
    }

    pub fn network_sampler(&mut self, sampler: Arc<dyn NetworkSampler>) -> &mut Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn layer_provider(&mut self, layers: Arc<dyn WritableLayerProvider>) -> &mut Self {
        self.layers = Some(layers);
        self
    }

    pub fn build(self) -> StatsServer {
        let source = self
            .source
            .unwrap_or_else(|| Arc::new(CgroupFs::new(&self.config.cgroup_root)));
        StatsServer {
            mode: self.config.mode(),
            call_timeout: self.config.call_timeout(),
            selection: self.config.metric_selection(),
            default_interface: self.config.default_interface,
            source,
            sampler: self.sampler.unwrap_or_else(|| Arc::new(NetNsSampler)),
            layers: self
                .layers
                .unwrap_or_else(|| Arc::new(DirectoryLayerUsage)),
            registry: SandboxRegistry::default(),
            cache: Mutex::new(StatsCache::default()),
        }
    }
}
