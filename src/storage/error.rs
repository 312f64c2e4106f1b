//! Storage layer errors.

use thiserror::Error;

use crate::datum::PageNo;

/// Storage layer errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Page not found in storage.
    ///
    /// This occurs when attempting to read or write a page that has not been
    /// allocated yet. Use `allocate_page` to create new pages.
    #[error("page not found: {0}")]
    PageNotFound(PageNo),

    /// Invalid buffer size provided to read_page or write_page.
    ///
    /// Buffers must be exactly one page long.
    #[error("invalid buffer size: expected {expected}, got {actual}")]
    InvalidBufferSize {
        /// Expected buffer size (the page size)
        expected: usize,
        /// Actual buffer size provided
        actual: usize,
    },

    /// I/O error from underlying file system.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A page size of zero was requested.
    #[error("invalid page size: {0}")]
    InvalidPageSize(usize),

    /// Data corruption detected.
    ///
    /// The file has an invalid size, or a page image failed to decode.
    #[error("data corruption: {0}")]
    Corrupted(String),

    /// A resident page could not be turned into bytes.
    #[error("page encoding failed: {0}")]
    Encoding(String),
}
