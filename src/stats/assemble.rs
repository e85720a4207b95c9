use crate::cgroup::{CgroupStats, CpuStats, MemoryStats, PidsStats};
use crate::config::DefaultInterface;
use crate::netns::{LinkCounters, NetworkSample};
use crate::sandbox::{Container, LayerUsage, Sandbox};

use super::{
    ContainerAttributes, ContainerStats, CpuUsage, FilesystemUsage, MemoryUsage,
    NetworkInterfaceUsage, NetworkUsage, PodSandboxAttributes, ProcessUsage, SwapUsage,
};

const NANOS_PER_SECOND: u128 = 1_000_000_000;

impl From<&Sandbox> for PodSandboxAttributes {
    fn from(sb: &Sandbox) -> Self {
        Self {
            id: sb.id.clone(),
            metadata: sb.metadata.clone(),
            labels: sb.labels.clone(),
            annotations: sb.annotations.clone(),
        }
    }
}

impl From<&Container> for ContainerAttributes {
    fn from(c: &Container) -> Self {
        Self {
            id: c.id.clone(),
            metadata: c.metadata.clone(),
            labels: c.labels.clone(),
            annotations: c.annotations.clone(),
        }
    }
}

pub fn cpu_usage(cpu: &CpuStats, timestamp: i64) -> CpuUsage {
    CpuUsage {
        timestamp,
        usage_core_nano_seconds: Some(cpu.total_usage_nano),
        usage_nano_cores: None,
    }
}

pub fn memory_usage(mem: &MemoryStats, timestamp: i64) -> MemoryUsage {
    MemoryUsage {
        timestamp,
        working_set_bytes: Some(mem.working_set_bytes),
        available_bytes: Some(mem.available_bytes),
        usage_bytes: Some(mem.usage),
        rss_bytes: Some(mem.rss_bytes),
        page_faults: Some(mem.page_faults),
        major_page_faults: Some(mem.major_page_faults),
    }
}

pub fn swap_usage(mem: &MemoryStats, timestamp: i64) -> SwapUsage {
    SwapUsage {
        timestamp,
        swap_available_bytes: mem.swap_limit.map(|l| l.saturating_sub(mem.swap_usage)),
        swap_usage_bytes: Some(mem.swap_usage),
    }
}

pub fn process_usage(pids: &PidsStats, timestamp: i64) -> ProcessUsage {
    ProcessUsage {
        timestamp,
        process_count: Some(pids.current),
    }
}

pub fn filesystem_usage(layer: LayerUsage, timestamp: i64) -> FilesystemUsage {
    FilesystemUsage {
        timestamp,
        mountpoint: layer.mountpoint,
        used_bytes: Some(layer.used_bytes),
        inodes_used: Some(layer.inodes_used),
    }
}

/// Converts a container's absolute counters. The writable layer and the
/// nanocore rate are filled in by the caller.
pub fn container_stats(cgstats: &CgroupStats, container: &Container) -> ContainerStats {
    let ts = cgstats.system_nano;
    ContainerStats {
        attributes: container.into(),
        cpu: Some(cpu_usage(&cgstats.cpu, ts)),
        memory: Some(memory_usage(&cgstats.memory, ts)),
        swap: Some(swap_usage(&cgstats.memory, ts)),
        writable_layer: None,
    }
}

fn interface_usage(link: &LinkCounters) -> NetworkInterfaceUsage {
    NetworkInterfaceUsage {
        name: link.name.clone(),
        rx_bytes: Some(link.rx_bytes),
        rx_errors: Some(link.rx_errors),
        tx_bytes: Some(link.tx_bytes),
        tx_errors: Some(link.tx_errors),
    }
}

/// Splits a namespace sample into the default interface and the remaining
/// links, which keep their enumeration order.
pub fn network_usage(sample: &NetworkSample, policy: &DefaultInterface) -> NetworkUsage {
    let default_idx = match policy {
        DefaultInterface::First => 0,
        DefaultInterface::Named(name) => sample
            .links
            .iter()
            .position(|l| &l.name == name)
            .unwrap_or(0),
    };
    let mut usage = NetworkUsage {
        timestamp: sample.timestamp,
        default_interface: None,
        interfaces: Vec::with_capacity(sample.links.len().saturating_sub(1)),
    };
    for (i, link) in sample.links.iter().enumerate() {
        if i == default_idx {
            usage.default_interface = Some(interface_usage(link));
        } else {
            usage.interfaces.push(interface_usage(link));
        }
    }
    usage
}

/// Derives `current.usage_nano_cores` from the previous sample of the same entity.
///
/// The rate stays unset without a previous sample, when either sample lacks a
/// cumulative counter, or when time did not move forward. A counter that went
/// backwards yields zero.
pub fn update_usage_nano_cores(previous: Option<&CpuUsage>, current: &mut CpuUsage) {
    current.usage_nano_cores = previous.and_then(|prev| nano_cores(prev, current));
}

fn nano_cores(prev: &CpuUsage, cur: &CpuUsage) -> Option<u64> {
    let elapsed = cur.timestamp.checked_sub(prev.timestamp)?;
    if elapsed <= 0 {
        return None;
    }
    let used = cur
        .usage_core_nano_seconds?
        .saturating_sub(prev.usage_core_nano_seconds?);
    let rate = used as u128 * NANOS_PER_SECOND / elapsed as u128;
    Some(u64::try_from(rate).unwrap_or(u64::MAX))
}
