//! Flat metric records in the CRI `PodSandboxMetrics` shape.
//!
//! Unlike stats, metrics are never diffed in place: a [`SandboxMetrics`]
//! accumulator is reset at the start of every cycle and repopulated, pod-level
//! (network) records under the pod scope and everything else per container.
use std::fmt;
use std::str::FromStr;

use crate::sandbox::{ContainerID, SandboxID};

mod families;

pub use families::{
    container_labels, cpu_metrics, memory_metrics, network_metrics, oom_metrics,
};

/// A metric family that can be enabled in the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricFamily {
    Cpu,
    Memory,
    Oom,
    Network,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown metric family: {0:?}")]
pub struct UnknownFamily(pub String);

impl FromStr for MetricFamily {
    type Err = UnknownFamily;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(MetricFamily::Cpu),
            "memory" => Ok(MetricFamily::Memory),
            "oom" => Ok(MetricFamily::Oom),
            "network" => Ok(MetricFamily::Network),
            other => Err(UnknownFamily(other.to_owned())),
        }
    }
}

impl MetricFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricFamily::Cpu => "cpu",
            MetricFamily::Memory => "memory",
            MetricFamily::Oom => "oom",
            MetricFamily::Network => "network",
        }
    }

    pub fn descriptors(self) -> &'static [MetricDescriptor] {
        match self {
            MetricFamily::Cpu => families::CPU,
            MetricFamily::Memory => families::MEMORY,
            MetricFamily::Oom => families::OOM,
            MetricFamily::Network => families::NETWORK,
        }
    }
}

impl fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, deduplicated set of enabled families.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricSelection {
    families: Vec<MetricFamily>,
    unknown: Vec<String>,
}

impl MetricSelection {
    /// Resolves configured names, keeping first-seen order. Unknown names are
    /// logged once and retained for inspection; they never fail the selection.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        let mut selection = Self::default();
        for name in names {
            match name.as_ref().parse::<MetricFamily>() {
                Ok(family) if !selection.families.contains(&family) => {
                    selection.families.push(family)
                }
                Ok(_) => {}
                Err(UnknownFamily(name)) => {
                    log::warn!("Unknown or misspelled metric family: {name}");
                    selection.unknown.push(name);
                }
            }
        }
        selection
    }

    pub fn families(&self) -> &[MetricFamily] {
        &self.families
    }

    pub fn unknown(&self) -> &[String] {
        &self.unknown
    }

    pub fn contains(&self, family: MetricFamily) -> bool {
        self.families.contains(&family)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricType {
    Counter,
    Gauge,
}

/// Name, help text and label keys of one metric.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MetricDescriptor {
    pub name: &'static str,
    pub help: &'static str,
    pub label_keys: &'static [&'static str],
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Metric {
    pub name: &'static str,
    pub timestamp: i64,
    pub metric_type: MetricType,
    pub label_values: Vec<String>,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ContainerMetrics {
    pub container_id: ContainerID,
    pub metrics: Vec<Metric>,
}

/// Where a batch of metrics is filed inside a [`SandboxMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricScope<'a> {
    Pod,
    Container(&'a ContainerID),
}

/// Per-sandbox metric accumulator.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SandboxMetrics {
    pub pod_sandbox_id: SandboxID,
    pub metrics: Vec<Metric>,
    pub container_metrics: Vec<ContainerMetrics>,
}

impl SandboxMetrics {
    pub fn new(pod_sandbox_id: SandboxID) -> Self {
        Self {
            pod_sandbox_id,
            metrics: Vec::new(),
            container_metrics: Vec::new(),
        }
    }

    /// Discards pod and container records ahead of a new cycle.
    pub fn reset(&mut self) {
        self.metrics.clear();
        self.container_metrics.clear();
    }

    /// Appends `metrics` under `scope`, preserving their order.
    pub fn add(&mut self, scope: MetricScope<'_>, metrics: Vec<Metric>) {
        match scope {
            MetricScope::Pod => self.metrics.extend(metrics),
            MetricScope::Container(id) => {
                match self
                    .container_metrics
                    .iter_mut()
                    .find(|cm| &cm.container_id == id)
                {
                    Some(cm) => cm.metrics.extend(metrics),
                    None => self.container_metrics.push(ContainerMetrics {
                        container_id: id.clone(),
                        metrics,
                    }),
                }
            }
        }
    }

    /// Records for an entity key: `""` is the pod, anything else a container id.
    pub fn metrics_for(&self, key: &str) -> Option<&[Metric]> {
        if key.is_empty() {
            return Some(&self.metrics);
        }
        self.container_metrics
            .iter()
            .find(|cm| cm.container_id.as_str() == key)
            .map(|cm| cm.metrics.as_slice())
    }

    pub fn remove_container(&mut self, id: &ContainerID) {
        self.container_metrics.retain(|cm| &cm.container_id != id);
    }
}

/// Descriptors of every metric the selection can emit, in configured order.
pub fn descriptors_for(selection: &MetricSelection) -> Vec<&'static MetricDescriptor> {
    selection
        .families()
        .iter()
        .flat_map(|f| f.descriptors())
        .collect()
}
