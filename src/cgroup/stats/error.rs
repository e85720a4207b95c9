//! Structured errors for cgroup stat file parsing.
//!
//! [`StatParseError`] converts into [`std::io::Error`] with kind
//! [`std::io::ErrorKind::InvalidData`], so parsers keep an `io::Result`
//! signature while callers can still downcast to the precise failure.

use std::num::ParseIntError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatParseError {
    #[error("field '{field}' repeated at line {line}")]
    DuplicateField { field: String, line: usize },

    #[error("cannot parse '{value}' for '{key}' at line {line}: {source}")]
    InvalidKeyValue {
        key: String,
        value: String,
        line: usize,
        #[source]
        source: ParseIntError,
    },

    #[error("cannot parse '{value}' at line {line}: {source}")]
    InvalidValue {
        value: String,
        line: usize,
        #[source]
        source: ParseIntError,
    },
}

impl From<StatParseError> for std::io::Error {
    fn from(err: StatParseError) -> Self {
        std::io::Error::new(std::io::ErrorKind::InvalidData, err)
    }
}

/// Downcasts an `io::Error` produced by a parser back into its [`StatParseError`].
#[cfg(test)]
pub(super) fn extract_stat_parse_error(err: &std::io::Error) -> &StatParseError {
    err.get_ref()
        .and_then(|e| e.downcast_ref::<StatParseError>())
        .unwrap()
}
