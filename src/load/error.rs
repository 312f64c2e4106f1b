//! Loader errors.

use thiserror::Error;

use crate::datum::{DatumError, Type};
use crate::heap::HeapError;
use crate::storage::cache::CacheError;

/// Errors that abort a load call.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Heap(#[from] HeapError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The statistics file could not be parsed.
    #[error("malformed statistics file, line {line}: {reason}")]
    StatsFormat { line: usize, reason: String },

    /// The ledger file holds something other than offsets.
    #[error("malformed ledger entry `{0}`")]
    LedgerFormat(String),
}

/// Why a single source row was skipped. Never aborts a load.
#[derive(Debug, Error)]
pub enum RowError {
    /// The line is not valid UTF-8.
    #[error("invalid UTF-8 after byte {valid_up_to}")]
    InvalidUtf8 { valid_up_to: usize },

    #[error("expected {expected} fields, found {actual}")]
    FieldCount { expected: usize, actual: usize },

    #[error("field `{field}`: cannot read `{raw}` as {ty}")]
    TypeMismatch { field: String, raw: String, ty: Type },

    #[error("field `{field}`: {value} lies outside [{low}, {high}]")]
    Outlier {
        field: String,
        value: f64,
        low: f64,
        high: f64,
    },

    #[error(transparent)]
    Datum(#[from] DatumError),
}
