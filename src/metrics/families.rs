use crate::cgroup::{CpuStats, MemoryStats};
use crate::netns::LinkCounters;
use crate::sandbox::Container;

use super::{Metric, MetricDescriptor, MetricType};

const NANOS_PER_SECOND: u64 = 1_000_000_000;

const CONTAINER_LABELS: &[&str] = &["id", "name", "image"];
const FAILURE_LABELS: &[&str] = &["id", "name", "image", "failure_type", "scope"];
const INTERFACE_LABELS: &[&str] = &["interface"];

macro_rules! descriptor {
    ($name:literal, $help:literal, $labels:expr) => {
        MetricDescriptor {
            name: $name,
            help: $help,
            label_keys: $labels,
        }
    };
}

/// `*_seconds_total` values are rounded half up to whole seconds.
pub(super) const CPU: &[MetricDescriptor] = &[
    descriptor!("container_cpu_usage_seconds_total", "Cumulative cpu time consumed in seconds, rounded to the nearest second.", CONTAINER_LABELS),
    descriptor!("container_cpu_user_seconds_total", "Cumulative user cpu time consumed in seconds, rounded to the nearest second.", CONTAINER_LABELS),
    descriptor!("container_cpu_system_seconds_total", "Cumulative system cpu time consumed in seconds, rounded to the nearest second.", CONTAINER_LABELS),
    descriptor!("container_cpu_cfs_periods_total", "Number of elapsed enforcement period intervals.", CONTAINER_LABELS),
    descriptor!("container_cpu_cfs_throttled_periods_total", "Number of throttled period intervals.", CONTAINER_LABELS),
    descriptor!("container_cpu_cfs_throttled_seconds_total", "Total time duration the container has been throttled, rounded to the nearest second.", CONTAINER_LABELS),
];

pub(super) const MEMORY: &[MetricDescriptor] = &[
    descriptor!("container_memory_cache", "Number of bytes of page cache memory.", CONTAINER_LABELS),
    descriptor!("container_memory_rss", "Size of RSS in bytes.", CONTAINER_LABELS),
    descriptor!("container_memory_kernel_usage", "Size of kernel memory allocated in bytes.", CONTAINER_LABELS),
    descriptor!("container_memory_mapped_file", "Size of memory mapped files in bytes.", CONTAINER_LABELS),
    descriptor!("container_memory_swap", "Container swap usage in bytes.", CONTAINER_LABELS),
    descriptor!("container_memory_usage_bytes", "Current memory usage in bytes, including all memory regardless of when it was accessed.", CONTAINER_LABELS),
    descriptor!("container_memory_working_set_bytes", "Current working set in bytes.", CONTAINER_LABELS),
    descriptor!("container_memory_failures_total", "Cumulative count of memory allocation failures.", FAILURE_LABELS),
];

/// Index of the only counter in `MEMORY`; everything before it is a gauge.
const MEMORY_FAILURES: usize = 7;

pub(super) const OOM: &[MetricDescriptor] = &[descriptor!(
    "container_oom_events_total",
    "Count of out of memory events observed for the container.",
    CONTAINER_LABELS
)];

pub(super) const NETWORK: &[MetricDescriptor] = &[
    descriptor!("container_network_receive_bytes_total", "Cumulative count of bytes received.", INTERFACE_LABELS),
    descriptor!("container_network_receive_packets_total", "Cumulative count of packets received.", INTERFACE_LABELS),
    descriptor!("container_network_receive_errors_total", "Cumulative count of errors encountered while receiving.", INTERFACE_LABELS),
    descriptor!("container_network_receive_packets_dropped_total", "Cumulative count of packets dropped while receiving.", INTERFACE_LABELS),
    descriptor!("container_network_transmit_bytes_total", "Cumulative count of bytes transmitted.", INTERFACE_LABELS),
    descriptor!("container_network_transmit_packets_total", "Cumulative count of packets transmitted.", INTERFACE_LABELS),
    descriptor!("container_network_transmit_errors_total", "Cumulative count of errors encountered while transmitting.", INTERFACE_LABELS),
    descriptor!("container_network_transmit_packets_dropped_total", "Cumulative count of packets dropped while transmitting.", INTERFACE_LABELS),
];

/// Label values matching `CONTAINER_LABELS`.
pub fn container_labels(container: &Container) -> Vec<String> {
    vec![
        container.id.to_string(),
        container.metadata.name.clone(),
        container.image.clone(),
    ]
}

fn rounded_seconds(nanos: u64) -> u64 {
    let whole = nanos / NANOS_PER_SECOND;
    if nanos % NANOS_PER_SECOND >= NANOS_PER_SECOND / 2 {
        whole + 1
    } else {
        whole
    }
}

fn record(
    desc: &MetricDescriptor,
    metric_type: MetricType,
    timestamp: i64,
    label_values: Vec<String>,
    value: u64,
) -> Metric {
    Metric {
        name: desc.name,
        timestamp,
        metric_type,
        label_values,
        value,
    }
}

pub fn cpu_metrics(labels: &[String], cpu: &CpuStats, timestamp: i64) -> Vec<Metric> {
    let values = [
        rounded_seconds(cpu.total_usage_nano),
        rounded_seconds(cpu.user_usage_nano),
        rounded_seconds(cpu.system_usage_nano),
        cpu.nr_periods,
        cpu.nr_throttled,
        rounded_seconds(cpu.throttled_nano),
    ];
    CPU.iter()
        .zip(values)
        .map(|(desc, v)| record(desc, MetricType::Counter, timestamp, labels.to_vec(), v))
        .collect()
}

pub fn memory_metrics(labels: &[String], mem: &MemoryStats, timestamp: i64) -> Vec<Metric> {
    let gauges = [
        mem.cache,
        mem.rss_bytes,
        mem.kernel,
        mem.file_mapped,
        mem.swap_usage,
        mem.usage,
        mem.working_set_bytes,
    ];
    let failures = &MEMORY[MEMORY_FAILURES];
    let mut metrics: Vec<Metric> = MEMORY[..MEMORY_FAILURES]
        .iter()
        .zip(gauges)
        .map(|(desc, v)| record(desc, MetricType::Gauge, timestamp, labels.to_vec(), v))
        .collect();
    for (failure_type, value) in [("pgfault", mem.page_faults), ("pgmajfault", mem.major_page_faults)] {
        let mut label_values = labels.to_vec();
        label_values.extend([failure_type.to_owned(), "container".to_owned()]);
        metrics.push(record(failures, MetricType::Counter, timestamp, label_values, value));
    }
    metrics
}

pub fn oom_metrics(labels: &[String], oom_kills: u64, timestamp: i64) -> Vec<Metric> {
    vec![record(
        &OOM[0],
        MetricType::Counter,
        timestamp,
        labels.to_vec(),
        oom_kills,
    )]
}

/// Pod-level network metrics, grouped per link in enumeration order.
pub fn network_metrics(links: &[LinkCounters], timestamp: i64) -> Vec<Metric> {
    links
        .iter()
        .flat_map(|link| {
            let values = [
                link.rx_bytes,
                link.rx_packets,
                link.rx_errors,
                link.rx_dropped,
                link.tx_bytes,
                link.tx_packets,
                link.tx_errors,
                link.tx_dropped,
            ];
            NETWORK.iter().zip(values).map(move |(desc, v)| {
                record(desc, MetricType::Counter, timestamp, vec![link.name.clone()], v)
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::ContainerID;

    fn labels() -> Vec<String> {
        let mut c = Container::new(ContainerID::new("c1").unwrap());
        c.metadata.name = "app".into();
        c.image = "nginx".into();
        container_labels(&c)
    }

    #[test]
    fn test_descriptor_label_counts_match_records() {
        let mem = memory_metrics(&labels(), &MemoryStats::default(), 0);
        for m in &mem {
            let desc = MEMORY.iter().find(|d| d.name == m.name).unwrap();
            assert_eq!(desc.label_keys.len(), m.label_values.len(), "{}", m.name);
        }
        let net = network_metrics(&[LinkCounters::default()], 0);
        assert!(net.iter().all(|m| m.label_values.len() == INTERFACE_LABELS.len()));
    }

    #[test]
    fn test_cpu_metrics_in_seconds() {
        let cpu = CpuStats {
            total_usage_nano: 3_500_000_000,
            user_usage_nano: 2_000_000_000,
            system_usage_nano: 1_500_000_000,
            nr_periods: 10,
            nr_throttled: 2,
            throttled_nano: 1_000_000_000,
        };
        let metrics = cpu_metrics(&labels(), &cpu, 42);
        assert_eq!(metrics.len(), CPU.len());
        assert_eq!(metrics[0].name, "container_cpu_usage_seconds_total");
        assert_eq!(metrics[0].value, 4);
        assert_eq!(metrics[1].value, 2);
        assert_eq!(metrics[2].value, 2);
        assert_eq!(metrics[0].timestamp, 42);
        assert_eq!(metrics[0].label_values, vec!["c1", "app", "nginx"]);
        assert_eq!(metrics[4].value, 2);
        assert!(metrics.iter().all(|m| m.metric_type == MetricType::Counter));
    }

    #[test]
    fn test_short_cpu_times_round_to_nearest_second() {
        let cpu = CpuStats {
            total_usage_nano: 600_000_000,
            user_usage_nano: 499_999_999,
            system_usage_nano: u64::MAX,
            ..Default::default()
        };
        let metrics = cpu_metrics(&labels(), &cpu, 0);
        assert_eq!(metrics[0].value, 1);
        assert_eq!(metrics[1].value, 0);
        assert_eq!(metrics[2].value, u64::MAX / NANOS_PER_SECOND + 1);
    }

    #[test]
    fn test_memory_failures_split_by_type() {
        let mem = MemoryStats {
            working_set_bytes: 900,
            page_faults: 11,
            major_page_faults: 3,
            ..Default::default()
        };
        let metrics = memory_metrics(&labels(), &mem, 0);
        assert_eq!(metrics.len(), MEMORY.len() + 1);
        let ws = metrics
            .iter()
            .find(|m| m.name == "container_memory_working_set_bytes")
            .unwrap();
        assert_eq!(ws.value, 900);
        assert_eq!(ws.metric_type, MetricType::Gauge);
        let failures: Vec<_> = metrics
            .iter()
            .filter(|m| m.name == "container_memory_failures_total")
            .map(|m| (m.label_values[3].as_str(), m.value))
            .collect();
        assert_eq!(failures, vec![("pgfault", 11), ("pgmajfault", 3)]);
    }

    #[test]
    fn test_network_metrics_per_link() {
        let links = [
            LinkCounters {
                name: "lo".into(),
                ..Default::default()
            },
            LinkCounters {
                name: "eth0".into(),
                rx_bytes: 5,
                tx_dropped: 1,
                ..Default::default()
            },
        ];
        let metrics = network_metrics(&links, 7);
        assert_eq!(metrics.len(), 2 * NETWORK.len());
        let eth0: Vec<_> = metrics
            .iter()
            .filter(|m| m.label_values == ["eth0"])
            .collect();
        assert_eq!(eth0[0].value, 5);
        assert_eq!(eth0[7].name, "container_network_transmit_packets_dropped_total");
        assert_eq!(eth0[7].value, 1);
    }

    #[test]
    fn test_oom_metric() {
        let metrics = oom_metrics(&labels(), 4, 1);
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].value, 4);
    }
}
