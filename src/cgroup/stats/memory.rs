//! `memory.stat` and `memory.events` parsing.
//!
//! ```rust
//! use pod_stats::cgroup::stats::{KeyValueStat, MemoryEvents, MemoryStat};
//!
//! let stat = MemoryStat::from_reader(&mut "anon 1000\ninactive_file 200\n".as_bytes()).unwrap();
//! assert_eq!(stat.anon, 1000);
//!
//! let events = MemoryEvents::from_reader(&mut "oom 2\noom_kill 1\n".as_bytes()).unwrap();
//! assert_eq!(events.oom_kill, 1);
//! ```

use std::collections::HashMap;
use std::sync::LazyLock;

use super::parser::{FieldHandler, KeyValueStat};

/// Selected fields of a cgroup v2 `memory.stat` file, in bytes or event counts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemoryStat {
    pub anon: u64,
    pub file: u64,
    pub kernel: u64,
    pub kernel_stack: u64,
    pub slab: u64,
    pub sock: u64,
    pub shmem: u64,
    pub file_mapped: u64,
    pub inactive_file: u64,
    pub pgfault: u64,
    pub pgmajfault: u64,
}

static STAT_HANDLERS: LazyLock<HashMap<&'static str, FieldHandler<MemoryStat>>> =
    LazyLock::new(|| {
        let mut m: HashMap<&'static str, FieldHandler<MemoryStat>> = HashMap::with_capacity(11);
        m.insert("anon", |s, v| s.anon = v);
        m.insert("file", |s, v| s.file = v);
        m.insert("kernel", |s, v| s.kernel = v);
        m.insert("kernel_stack", |s, v| s.kernel_stack = v);
        m.insert("slab", |s, v| s.slab = v);
        m.insert("sock", |s, v| s.sock = v);
        m.insert("shmem", |s, v| s.shmem = v);
        m.insert("file_mapped", |s, v| s.file_mapped = v);
        m.insert("inactive_file", |s, v| s.inactive_file = v);
        m.insert("pgfault", |s, v| s.pgfault = v);
        m.insert("pgmajfault", |s, v| s.pgmajfault = v);
        m
    });

impl KeyValueStat for MemoryStat {
    fn field_handlers() -> &'static HashMap<&'static str, FieldHandler<Self>> {
        &STAT_HANDLERS
    }
}

impl MemoryStat {
    /// Kernel memory, falling back to the sum of its parts on kernels
    /// that do not report the aggregated `kernel` key.
    pub fn kernel_usage(&self) -> u64 {
        if self.kernel > 0 {
            self.kernel
        } else {
            self.kernel_stack + self.slab + self.sock
        }
    }
}

/// Event counters from `memory.events`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemoryEvents {
    pub high: u64,
    pub max: u64,
    pub oom: u64,
    pub oom_kill: u64,
}

static EVENT_HANDLERS: LazyLock<HashMap<&'static str, FieldHandler<MemoryEvents>>> =
    LazyLock::new(|| {
        let mut m: HashMap<&'static str, FieldHandler<MemoryEvents>> = HashMap::with_capacity(4);
        m.insert("high", |s, v| s.high = v);
        m.insert("max", |s, v| s.max = v);
        m.insert("oom", |s, v| s.oom = v);
        m.insert("oom_kill", |s, v| s.oom_kill = v);
        m
    });

impl KeyValueStat for MemoryEvents {
    fn field_handlers() -> &'static HashMap<&'static str, FieldHandler<Self>> {
        &EVENT_HANDLERS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgroup::stats::StatParseError;
    use crate::cgroup::stats::error::extract_stat_parse_error;

    #[test]
    fn test_parse_memory_stat() {
        let data = "\
anon 1000
file 2000
kernel 900
kernel_stack 300
slab 400
sock 500
shmem 600
file_mapped 700
active_file 1500
inactive_file 500
pgfault 42
pgmajfault 7
";
        let stat = MemoryStat::from_reader(&mut data.as_bytes()).unwrap();
        assert_eq!(stat.anon, 1000);
        assert_eq!(stat.file, 2000);
        assert_eq!(stat.kernel_usage(), 900);
        assert_eq!(stat.file_mapped, 700);
        assert_eq!(stat.inactive_file, 500);
        assert_eq!(stat.pgfault, 42);
        assert_eq!(stat.pgmajfault, 7);
    }

    #[test]
    fn test_kernel_usage_fallback() {
        let data = "kernel_stack 300\nslab 400\nsock 500\n";
        let stat = MemoryStat::from_reader(&mut data.as_bytes()).unwrap();
        assert_eq!(stat.kernel_usage(), 1200);
    }

    #[test]
    fn test_extra_whitespace() {
        let data = "    anon     1000\nfile     2000\n";
        let stat = MemoryStat::from_reader(&mut data.as_bytes()).unwrap();
        assert_eq!(stat.anon, 1000);
        assert_eq!(stat.file, 2000);
    }

    #[test]
    fn test_parse_invalid_memory_stat() {
        let data = "anon 1000\nfile x\n";
        let err = MemoryStat::from_reader(&mut data.as_bytes()).unwrap_err();
        match extract_stat_parse_error(&err) {
            StatParseError::InvalidKeyValue { key, line, .. } => {
                assert_eq!(key, "file");
                assert_eq!(*line, 2);
            }
            _ => panic!("Expected InvalidKeyValue error"),
        }
    }

    #[test]
    fn test_parse_memory_events() {
        let data = "low 0\nhigh 3\nmax 5\noom 2\noom_kill 1\noom_group_kill 0\n";
        let events = MemoryEvents::from_reader(&mut data.as_bytes()).unwrap();
        assert_eq!(
            events,
            MemoryEvents {
                high: 3,
                max: 5,
                oom: 2,
                oom_kill: 1,
            }
        );
    }
}
