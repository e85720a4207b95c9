//! Generic parsing traits for cgroup v2 interface files.
//!
//! - [`KeyValueStat`] covers flat `key value` files such as `cpu.stat`,
//!   `memory.stat` and `memory.events`. Unknown keys are ignored so newer
//!   kernels adding fields do not break parsing.
//! - [`SingleValueStat`] covers single-value files such as `memory.current`
//!   or `pids.max`.

use std::collections::{HashMap, HashSet};
use std::io::BufRead;

use super::StatParseError;

/// Handler applying a parsed value to one field of `T`.
pub type FieldHandler<T> = fn(&mut T, u64);

/// A stat file made of one `key value` pair per line.
pub trait KeyValueStat: Default + 'static {
    /// Whether a key may legally appear more than once.
    const ALLOW_DUPLICATE_KEYS: bool = false;

    /// Known keys and the handler that stores each one.
    fn field_handlers() -> &'static HashMap<&'static str, FieldHandler<Self>>;

    /// Parses the whole file.
    ///
    /// Lines with fewer than two tokens are skipped.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidData` error wrapping [`StatParseError`] when a known
    /// key carries a non-numeric value or repeats while duplicates are
    /// disallowed, and passes through read errors.
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self> {
        let handlers = Self::field_handlers();
        let mut stat = Self::default();
        let mut seen = HashSet::with_capacity(handlers.len());
        let mut line = String::new();
        let mut lineno = 0;

        while buf.read_line(&mut line)? != 0 {
            lineno += 1;
            let mut parts = line.split_whitespace();
            if let (Some(key), Some(value)) = (parts.next(), parts.next()) {
                if let Some((&known, handler)) = handlers.get_key_value(key) {
                    let parsed =
                        value
                            .parse::<u64>()
                            .map_err(|source| StatParseError::InvalidKeyValue {
                                key: key.to_owned(),
                                value: value.to_owned(),
                                line: lineno,
                                source,
                            })?;
                    if !Self::ALLOW_DUPLICATE_KEYS && !seen.insert(known) {
                        return Err(StatParseError::DuplicateField {
                            field: key.to_owned(),
                            line: lineno,
                        }
                        .into());
                    }
                    handler(&mut stat, parsed);
                }
            }
            line.clear();
        }

        Ok(stat)
    }
}

/// A stat file holding a single value on its first line.
pub trait SingleValueStat: Sized {
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self>;
}

/// A plain counter such as `memory.current` or `pids.current`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterValue(pub u64);

impl SingleValueStat for CounterValue {
    /// # Errors
    ///
    /// Fails with `InvalidData` if the first line is not a `u64`.
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self> {
        let mut line = String::new();
        buf.read_line(&mut line)?;
        let value = line.trim();
        value
            .parse::<u64>()
            .map(CounterValue)
            .map_err(|source| {
                StatParseError::InvalidValue {
                    value: value.to_owned(),
                    line: 1,
                    source,
                }
                .into()
            })
    }
}

/// A limit such as `memory.max` or `pids.max`; `"max"` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LimitValue(pub Option<u64>);

impl SingleValueStat for LimitValue {
    /// Unparsable content is treated as unlimited rather than an error.
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self> {
        let mut line = String::new();
        buf.read_line(&mut line)?;
        Ok(LimitValue(match line.trim() {
            "max" => None,
            value => value.parse::<u64>().ok(),
        }))
    }
}
