//! Hierarchical sandbox and container stats snapshots.
//!
//! These mirror the CRI `PodSandboxStats` / `ContainerStats` shapes. A block
//! that could not be collected is `None`; `None` never stands for zero usage.
use std::collections::HashMap;
use std::path::PathBuf;

use crate::sandbox::{ContainerID, ContainerMetadata, PodSandboxMetadata, SandboxID};

mod assemble;

pub use assemble::{
    container_stats, cpu_usage, filesystem_usage, memory_usage, network_usage, process_usage,
    swap_usage, update_usage_nano_cores,
};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CpuUsage {
    /// Nanoseconds since the UNIX epoch.
    pub timestamp: i64,
    /// Cumulative CPU time in core-nanoseconds.
    pub usage_core_nano_seconds: Option<u64>,
    /// Rate since the previous sample. Absent until two samples exist.
    pub usage_nano_cores: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MemoryUsage {
    pub timestamp: i64,
    pub working_set_bytes: Option<u64>,
    pub available_bytes: Option<u64>,
    pub usage_bytes: Option<u64>,
    pub rss_bytes: Option<u64>,
    pub page_faults: Option<u64>,
    pub major_page_faults: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SwapUsage {
    pub timestamp: i64,
    pub swap_available_bytes: Option<u64>,
    pub swap_usage_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ProcessUsage {
    pub timestamp: i64,
    pub process_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct NetworkInterfaceUsage {
    pub name: String,
    pub rx_bytes: Option<u64>,
    pub rx_errors: Option<u64>,
    pub tx_bytes: Option<u64>,
    pub tx_errors: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct NetworkUsage {
    pub timestamp: i64,
    pub default_interface: Option<NetworkInterfaceUsage>,
    pub interfaces: Vec<NetworkInterfaceUsage>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FilesystemUsage {
    pub timestamp: i64,
    pub mountpoint: PathBuf,
    pub used_bytes: Option<u64>,
    pub inodes_used: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ContainerAttributes {
    pub id: ContainerID,
    pub metadata: ContainerMetadata,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ContainerStats {
    pub attributes: ContainerAttributes,
    pub cpu: Option<CpuUsage>,
    pub memory: Option<MemoryUsage>,
    pub swap: Option<SwapUsage>,
    pub writable_layer: Option<FilesystemUsage>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PodSandboxAttributes {
    pub id: SandboxID,
    pub metadata: PodSandboxMetadata,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct LinuxPodSandboxStats {
    pub cpu: Option<CpuUsage>,
    pub memory: Option<MemoryUsage>,
    pub network: Option<NetworkUsage>,
    pub process: Option<ProcessUsage>,
    pub containers: Vec<ContainerStats>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SandboxStats {
    pub attributes: PodSandboxAttributes,
    pub linux: LinuxPodSandboxStats,
}
