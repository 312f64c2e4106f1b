//! Error types for the heap module.

use thiserror::Error;

use crate::config::ConfigError;
use crate::datum::{DatumError, PageNo, RecordId};
use crate::storage::StorageError;
use crate::storage::cache::CacheError;

/// Errors from heap operations.
#[derive(Debug, Error)]
pub enum HeapError {
    /// Page has no empty slot. Callers try another page or grow the file.
    #[error("page {page_no} is full ({slots} slots)")]
    PageFull { page_no: PageNo, slots: usize },

    /// The record id does not address a live tuple.
    #[error("no tuple at {0}")]
    InvalidRecord(RecordId),

    /// A tuple without a record id was passed where one is required.
    #[error("tuple has no record id")]
    MissingRecordId,

    /// Page bookkeeping is inconsistent. Indicates a bug.
    #[error("heap page invariant violated: {0}")]
    InvariantViolation(String),

    /// Page image failed to decode.
    #[error("corrupted page {page_no}: {reason}")]
    Corrupted { page_no: PageNo, reason: String },

    /// The descriptor cannot be stored in pages of the configured size.
    #[error("tuple width {width} does not fit a {page_size}-byte page")]
    TupleTooWide { width: usize, page_size: usize },

    /// The storage configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Tuple construction or encoding failed.
    #[error(transparent)]
    Datum(#[from] DatumError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
