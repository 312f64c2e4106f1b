//! Page cache errors.

use thiserror::Error;

use super::txn::TransactionId;
use crate::storage::error::StorageError;

/// Errors from page cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Every resident page is dirty and flushing is not permitted.
    #[error("buffer pool full: all {resident} resident pages are dirty")]
    BufferPoolFull {
        /// Number of resident pages at the time of the failed admission.
        resident: usize,
    },

    /// Internal bookkeeping is inconsistent. Indicates a bug.
    #[error("page cache invariant violated: {0}")]
    InvariantViolation(String),

    /// The lock manager refused a request.
    #[error("lock denied for transaction {tid}: {reason}")]
    LockDenied { tid: TransactionId, reason: String },

    /// Reading or writing back a page failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}
