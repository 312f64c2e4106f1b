//! In-memory page storage implementation.

use parking_lot::Mutex;

use super::{Storage, check_buffer};
use crate::datum::PageNo;
use crate::storage::error::StorageError;

/// In-memory page storage for testing and development.
///
/// Page numbers are assigned sequentially as Vec indices.
pub struct MemoryStorage {
    page_size: usize,
    pages: Mutex<Vec<Box<[u8]>>>,
}

impl MemoryStorage {
    /// Creates a new empty in-memory storage.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            pages: Mutex::new(Vec::new()),
        }
    }
}

impl Storage for MemoryStorage {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn read_page(&self, page_no: PageNo, buf: &mut [u8]) -> Result<(), StorageError> {
        check_buffer(self.page_size, buf.len())?;

        let pages = self.pages.lock();
        let page = pages
            .get(page_no)
            .ok_or(StorageError::PageNotFound(page_no))?;
        buf.copy_from_slice(page);
        Ok(())
    }

    fn write_page(&self, page_no: PageNo, buf: &[u8]) -> Result<(), StorageError> {
        check_buffer(self.page_size, buf.len())?;

        let mut pages = self.pages.lock();
        let page = pages
            .get_mut(page_no)
            .ok_or(StorageError::PageNotFound(page_no))?;
        page.copy_from_slice(buf);
        Ok(())
    }

    fn allocate_page(&self) -> Result<PageNo, StorageError> {
        let mut pages = self.pages.lock();
        pages.push(vec![0u8; self.page_size].into_boxed_slice());
        Ok(pages.len() - 1)
    }

    fn page_count(&self) -> usize {
        self.pages.lock().len()
    }

    fn sync_all(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests as generic;
    use super::*;

    #[test]
    fn test_basic_operations() {
        generic::test_basic_operations(MemoryStorage::new(128));
    }

    #[test]
    fn test_buffer_size_validation() {
        generic::test_buffer_size_validation(MemoryStorage::new(128));
    }

    #[test]
    fn test_page_not_found() {
        generic::test_page_not_found(MemoryStorage::new(128));
    }
}
