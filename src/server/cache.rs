use std::collections::HashMap;

use crate::metrics::SandboxMetrics;
use crate::sandbox::{ContainerID, SandboxID};
use crate::stats::{ContainerStats, SandboxStats};

/// Last computed stats and metrics per entity.
///
/// The previous stats of an entity are what its next CPU rate is derived
/// from. Entries are created on first observation and only leave through
/// the purge methods. A container whose fetch fails is purged too, so a
/// cached read never returns a sample from an earlier cycle as current.
#[derive(Debug, Default)]
pub struct StatsCache {
    sandbox_stats: HashMap<SandboxID, SandboxStats>,
    sandbox_metrics: HashMap<SandboxID, SandboxMetrics>,
    container_stats: HashMap<ContainerID, ContainerStats>,
}

impl StatsCache {
    pub fn sandbox_stats(&self, id: &str) -> Option<&SandboxStats> {
        self.sandbox_stats.get(id)
    }

    pub fn container_stats(&self, id: &str) -> Option<&ContainerStats> {
        self.container_stats.get(id)
    }

    pub fn sandbox_metrics(&self, id: &str) -> Option<&SandboxMetrics> {
        self.sandbox_metrics.get(id)
    }

    pub(super) fn insert_sandbox_stats(&mut self, stats: SandboxStats) {
        self.sandbox_stats.insert(stats.attributes.id.clone(), stats);
    }

    pub(super) fn insert_container_stats(&mut self, stats: ContainerStats) {
        self.container_stats
            .insert(stats.attributes.id.clone(), stats);
    }

    /// The accumulator of a sandbox, created empty on first use.
    pub(super) fn sandbox_metrics_entry(&mut self, id: &SandboxID) -> &mut SandboxMetrics {
        self.sandbox_metrics
            .entry(id.clone())
            .or_insert_with(|| SandboxMetrics::new(id.clone()))
    }

    /// Drops every entry of a sandbox and of the given containers.
    pub fn purge_sandbox<'a>(
        &mut self,
        id: &SandboxID,
        containers: impl IntoIterator<Item = &'a ContainerID>,
    ) {
        self.sandbox_stats.remove(id);
        self.sandbox_metrics.remove(id);
        for container in containers {
            self.container_stats.remove(container);
        }
    }

    /// Drops a container's stats and its records in the owning sandbox's metrics.
    pub fn purge_container(&mut self, id: &ContainerID, owner: Option<&SandboxID>) {
        self.container_stats.remove(id);
        if let Some(metrics) = owner.and_then(|sb| self.sandbox_metrics.get_mut(sb)) {
            metrics.remove_container(id);
        }
        if let Some(stats) = owner.and_then(|sb| self.sandbox_stats.get_mut(sb)) {
            stats.linux.containers.retain(|c| &c.attributes.id != id);
        }
    }

    pub fn len(&self) -> usize {
        self.sandbox_stats.len() + self.sandbox_metrics.len() + self.container_stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
