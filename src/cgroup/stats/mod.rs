//! Parsers for the cgroup v2 interface files the filesystem stats source reads.
//!
//! - [`CpuStat`] from `cpu.stat`
//! - [`MemoryStat`] from `memory.stat`, [`MemoryEvents`] from `memory.events`
//! - [`CounterValue`] for `memory.current`, `memory.swap.current`, `pids.current`
//! - [`LimitValue`] for `memory.max`, `memory.swap.max`, `pids.max`

mod cpu;
mod error;
mod memory;
mod parser;

pub use cpu::CpuStat;
pub use error::StatParseError;
pub use memory::{MemoryEvents, MemoryStat};
pub use parser::{CounterValue, FieldHandler, KeyValueStat, LimitValue, SingleValueStat};
