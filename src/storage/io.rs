//! Page I/O backend implementations.
//!
//! This module provides the `Storage` trait for page-based I/O operations,
//! along with MemoryStorage and FileStorage implementations.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::datum::PageNo;
use crate::storage::error::StorageError;

/// Page I/O backend trait for page-based storage.
///
/// Reads and writes whole pages using caller-owned buffers. Page `n` lives
/// at byte offset `n * page_size`. Implementations:
/// - `io::MemoryStorage`: In-memory storage
/// - `io::FileStorage`: Disk-backed storage using `std::fs`
///
/// This layer does not cache; residency is decided by the page cache.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (Sync + Send).
pub trait Storage: Send + Sync {
    /// Size in bytes of every page.
    fn page_size(&self) -> usize;

    /// Reads a page into caller-provided buffer.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::PageNotFound` if the page has not been allocated.
    /// Returns `StorageError::InvalidBufferSize` if `buf.len() != page_size()`.
    fn read_page(&self, page_no: PageNo, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Writes a page from caller-provided buffer.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::PageNotFound` if the page has not been allocated.
    /// Returns `StorageError::InvalidBufferSize` if `buf.len() != page_size()`.
    fn write_page(&self, page_no: PageNo, buf: &[u8]) -> Result<(), StorageError>;

    /// Appends a zero-filled page and returns its number.
    ///
    /// Page numbers are assigned densely starting at 0.
    fn allocate_page(&self) -> Result<PageNo, StorageError>;

    /// Returns the total number of allocated pages.
    fn page_count(&self) -> usize;

    /// Syncs all pending writes to physical disk (fsync).
    ///
    /// For io::MemoryStorage, this is a no-op.
    fn sync_all(&self) -> Result<(), StorageError>;
}

fn check_buffer(page_size: usize, len: usize) -> Result<(), StorageError> {
    if len != page_size {
        return Err(StorageError::InvalidBufferSize {
            expected: page_size,
            actual: len,
        });
    }
    Ok(())
}
