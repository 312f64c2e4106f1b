//! Contracts between the cache, its pages and their owning files.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::datum::PageNo;
use crate::storage::error::StorageError;

/// Shared handle to a resident page.
pub type PageRef<P> = Arc<Mutex<P>>;

/// Identifies one backing file for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(u64);

impl FileId {
    /// Returns a process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file#{}", self.0)
    }
}

/// Cache key: owning file plus page number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageKey {
    pub file: FileId,
    pub page_no: PageNo,
}

impl PageKey {
    pub const fn new(file: FileId, page_no: PageNo) -> Self {
        Self { file, page_no }
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.page_no)
    }
}

/// A page the cache can hold.
pub trait Page: Send {
    fn page_no(&self) -> PageNo;

    /// Returns true if the in-memory image differs from storage.
    fn is_dirty(&self) -> bool;

    fn set_dirty(&mut self, dirty: bool);
}

/// The file a page belongs to: reads pages in and writes them back.
pub trait BackingStore<P>: Send + Sync {
    fn file_id(&self) -> FileId;

    fn page_key(&self, page_no: PageNo) -> PageKey {
        PageKey::new(self.file_id(), page_no)
    }

    /// Reads page `page_no` from persistent storage.
    fn read_page(&self, page_no: PageNo) -> Result<P, StorageError>;

    /// Writes `page` to its slot in persistent storage.
    ///
    /// Does not touch the dirty flag; the cache clears it.
    fn flush_page(&self, page: &P) -> Result<(), StorageError>;
}
