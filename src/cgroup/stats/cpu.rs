//! `cpu.stat` parsing.
//!
//! ```rust
//! use pod_stats::cgroup::stats::{CpuStat, KeyValueStat};
//!
//! let data = "usage_usec 1000000\nuser_usec 600000\nsystem_usec 400000\n";
//! let stat = CpuStat::from_reader(&mut data.as_bytes()).unwrap();
//! assert_eq!(stat.usage_usec, 1_000_000);
//! ```

use std::collections::HashMap;
use std::sync::LazyLock;

use super::parser::{FieldHandler, KeyValueStat};

/// Counters from a cgroup v2 `cpu.stat` file, in microseconds or counts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CpuStat {
    /// Total CPU time consumed (user + system).
    pub usage_usec: u64,
    pub user_usec: u64,
    pub system_usec: u64,
    /// Enforcement periods that elapsed while the cgroup was runnable.
    pub nr_periods: u64,
    /// Periods in which the cgroup hit its quota.
    pub nr_throttled: u64,
    pub throttled_usec: u64,
}

static HANDLERS: LazyLock<HashMap<&'static str, FieldHandler<CpuStat>>> = LazyLock::new(|| {
    let mut m: HashMap<&'static str, FieldHandler<CpuStat>> = HashMap::with_capacity(6);
    m.insert("usage_usec", |s, v| s.usage_usec = v);
    m.insert("user_usec", |s, v| s.user_usec = v);
    m.insert("system_usec", |s, v| s.system_usec = v);
    m.insert("nr_periods", |s, v| s.nr_periods = v);
    m.insert("nr_throttled", |s, v| s.nr_throttled = v);
    m.insert("throttled_usec", |s, v| s.throttled_usec = v);
    m
});

impl KeyValueStat for CpuStat {
    fn field_handlers() -> &'static HashMap<&'static str, FieldHandler<Self>> {
        &HANDLERS
    }
}
