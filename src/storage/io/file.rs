//! File-backed storage implementation.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::{Storage, check_buffer};
use crate::datum::PageNo;
use crate::storage::error::StorageError;

/// File-backed storage implementation.
///
/// Stores pages as contiguous fixed-size blocks in a single file.
///
/// # File Layout
///
/// ```text
/// +------------------+------------------+------------------+
/// | Page 0           | Page 1           | Page 2           | ...
/// +------------------+------------------+------------------+
/// ^ offset 0         ^ page_size        ^ 2 * page_size
/// ```
///
/// # Concurrency
///
/// A mutex around the file handle serializes seek+read and seek+write pairs.
///
/// # Durability
///
/// Writes reach the OS on return; `sync_all()` is needed to survive a crash.
pub struct FileStorage {
    path: PathBuf,
    file: Mutex<File>,
    page_size: usize,
    page_count: AtomicUsize,
}

impl FileStorage {
    /// Opens or creates a storage file at the given path.
    ///
    /// If the file exists, its page count is calculated from file size.
    /// If the file doesn't exist, it is created empty.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidPageSize` if `page_size` is zero, and
    /// `StorageError::Corrupted` if the file size is not a multiple of it.
    pub fn open(path: impl Into<PathBuf>, page_size: usize) -> Result<Self, StorageError> {
        if page_size == 0 {
            return Err(StorageError::InvalidPageSize(page_size));
        }
        let path = path.into();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let file_size = file.metadata()?.len();
        if file_size % page_size as u64 != 0 {
            return Err(StorageError::Corrupted(format!(
                "file size {} is not a multiple of page size {}",
                file_size, page_size
            )));
        }

        Ok(Self {
            path,
            file: Mutex::new(file),
            page_size,
            page_count: AtomicUsize::new((file_size / page_size as u64) as usize),
        })
    }

    /// Returns the path to the storage file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn byte_offset(&self, page_no: PageNo) -> u64 {
        page_no as u64 * self.page_size as u64
    }

    fn check_allocated(&self, page_no: PageNo) -> Result<(), StorageError> {
        if page_no >= self.page_count.load(Ordering::Acquire) {
            return Err(StorageError::PageNotFound(page_no));
        }
        Ok(())
    }
}

impl Storage for FileStorage {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn read_page(&self, page_no: PageNo, buf: &mut [u8]) -> Result<(), StorageError> {
        check_buffer(self.page_size, buf.len())?;
        self.check_allocated(page_no)?;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(self.byte_offset(page_no)))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_page(&self, page_no: PageNo, buf: &[u8]) -> Result<(), StorageError> {
        check_buffer(self.page_size, buf.len())?;
        self.check_allocated(page_no)?;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(self.byte_offset(page_no)))?;
        file.write_all(buf)?;
        Ok(())
    }

    fn allocate_page(&self) -> Result<PageNo, StorageError> {
        let mut file = self.file.lock();

        let page_no = self.page_count.load(Ordering::Acquire);
        file.seek(SeekFrom::Start(self.byte_offset(page_no)))?;
        file.write_all(&vec![0u8; self.page_size])?;

        self.page_count.store(page_no + 1, Ordering::Release);
        Ok(page_no)
    }

    fn page_count(&self) -> usize {
        self.page_count.load(Ordering::Acquire)
    }

    fn sync_all(&self) -> Result<(), StorageError> {
        self.file.lock().sync_all()?;
        Ok(())
    }
}
