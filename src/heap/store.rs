//! Backing store that maps slotted pages onto raw page storage.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::error::HeapError;
use super::page::SlottedPage;
use crate::datum::{PageNo, TupleDescriptor};
use crate::storage::cache::{BackingStore, FileId, Page};
use crate::storage::{Storage, StorageError};

/// Owns a heap file's storage and knows how to turn its bytes into pages.
pub struct HeapStore {
    id: FileId,
    storage: Box<dyn Storage>,
    desc: Arc<TupleDescriptor>,
    path: Option<PathBuf>,
}

impl HeapStore {
    pub fn new(storage: Box<dyn Storage>, desc: Arc<TupleDescriptor>, path: Option<PathBuf>) -> Self {
        Self {
            id: FileId::next(),
            storage,
            desc,
            path,
        }
    }

    pub fn descriptor(&self) -> &Arc<TupleDescriptor> {
        &self.desc
    }

    pub fn page_size(&self) -> usize {
        self.storage.page_size()
    }

    pub fn page_count(&self) -> usize {
        self.storage.page_count()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Reserves page `page_count()` on disk, zero-filled.
    pub fn allocate_page(&self) -> Result<PageNo, StorageError> {
        self.storage.allocate_page()
    }

    pub fn sync_all(&self) -> Result<(), StorageError> {
        self.storage.sync_all()
    }
}

impl BackingStore<SlottedPage> for HeapStore {
    fn file_id(&self) -> FileId {
        self.id
    }

    fn read_page(&self, page_no: PageNo) -> Result<SlottedPage, StorageError> {
        let page_size = self.page_size();
        let mut buf = vec![0u8; page_size];
        self.storage.read_page(page_no, &mut buf)?;
        SlottedPage::from_bytes(page_no, Arc::clone(&self.desc), page_size, &buf).map_err(
            |err| match err {
                HeapError::Storage(e) => e,
                other => StorageError::Corrupted(other.to_string()),
            },
        )
    }

    fn flush_page(&self, page: &SlottedPage) -> Result<(), StorageError> {
        let bytes = page
            .serialize()
            .map_err(|e| StorageError::Encoding(e.to_string()))?;
        self.storage.write_page(page.page_no(), &bytes)
    }
}
