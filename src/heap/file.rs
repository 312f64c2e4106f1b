//! Heap file: an unordered table of fixed-width tuples.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::error::HeapError;
use super::page::{SlottedPage, slots_per_page};
use super::scan::HeapScan;
use super::store::HeapStore;
use crate::config::StorageConfig;
use crate::datum::{PageNo, RecordId, Tuple, TupleDescriptor};
use crate::load::{LoadError, LoadOffsetLedger, LoadState, StatisticsTracker};
use crate::storage::cache::{BackingStore, PageCache, PageRef, Permission, TransactionId};
use crate::storage::{FileStorage, Storage};

/// A table stored as a sequence of slotted pages.
///
/// All page access goes through the shared [`PageCache`]; the heap file
/// only tracks which pages are worth trying for inserts.
///
/// ```text
/// HeapFile --get_page/add_page--> PageCache --read/flush--> HeapStore --> Storage
/// ```
pub struct HeapFile {
    store: Arc<HeapStore>,
    cache: Arc<PageCache<SlottedPage>>,
    desc: Arc<TupleDescriptor>,
    num_pages: usize,
    /// Pages that had an empty slot when last seen.
    free_pages: BTreeSet<PageNo>,
    pub(crate) config: StorageConfig,
    pub(crate) load: LoadState,
}

impl HeapFile {
    /// Creates a heap file over `storage`.
    ///
    /// Existing pages are all considered candidates for inserts until they
    /// turn out to be full.
    ///
    /// # Errors
    ///
    /// Returns `HeapError::Config` if `config` does not validate, and
    /// `HeapError::TupleTooWide` if not even one tuple fits a page.
    pub fn create(
        storage: impl Storage + 'static,
        desc: Arc<TupleDescriptor>,
        cache: Arc<PageCache<SlottedPage>>,
        config: &StorageConfig,
    ) -> Result<Self, HeapError> {
        Self::from_storage(Box::new(storage), None, desc, cache, config)
    }

    /// Opens or creates a heap file on disk.
    pub fn open(
        path: impl AsRef<Path>,
        desc: Arc<TupleDescriptor>,
        cache: Arc<PageCache<SlottedPage>>,
        config: &StorageConfig,
    ) -> Result<Self, HeapError> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();
        let storage = FileStorage::open(&path, config.page_size)?;
        Self::from_storage(Box::new(storage), Some(path), desc, cache, config)
    }

    fn from_storage(
        storage: Box<dyn Storage>,
        path: Option<PathBuf>,
        desc: Arc<TupleDescriptor>,
        cache: Arc<PageCache<SlottedPage>>,
        config: &StorageConfig,
    ) -> Result<Self, HeapError> {
        config.validate()?;
        let page_size = storage.page_size();
        if slots_per_page(page_size, &desc) == 0 {
            return Err(HeapError::TupleTooWide {
                width: desc.width(),
                page_size,
            });
        }
        let num_pages = storage.page_count();
        let store = Arc::new(HeapStore::new(storage, Arc::clone(&desc), path));
        Ok(Self {
            store,
            cache,
            load: LoadState::new(&desc),
            desc,
            num_pages,
            free_pages: (0..num_pages).collect(),
            config: config.clone(),
        })
    }

    /// Attaches a persistent offsets ledger, reading any offsets it holds.
    pub fn with_ledger(mut self, path: impl Into<PathBuf>) -> Result<Self, LoadError> {
        self.load.ledger = LoadOffsetLedger::open(path)?;
        Ok(self)
    }

    /// Attaches a persistent statistics file, reading it if it exists.
    pub fn with_stats_file(mut self, path: impl Into<PathBuf>) -> Result<Self, LoadError> {
        let path = path.into();
        if path.exists() {
            self.load.stats = StatisticsTracker::load(&path)?;
        }
        self.load.stats_path = Some(path);
        Ok(self)
    }

    /// Makes sampling decisions reproducible.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.load.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn descriptor(&self) -> &Arc<TupleDescriptor> {
        &self.desc
    }

    pub fn num_pages(&self) -> usize {
        self.num_pages
    }

    /// Path of the backing file, if it lives on disk.
    pub fn backing_path(&self) -> Option<&Path> {
        self.store.path()
    }

    pub fn cache(&self) -> &Arc<PageCache<SlottedPage>> {
        &self.cache
    }

    pub fn store(&self) -> &Arc<HeapStore> {
        &self.store
    }

    pub fn statistics(&self) -> &StatisticsTracker {
        &self.load.stats
    }

    pub fn ledger(&self) -> &LoadOffsetLedger {
        &self.load.ledger
    }

    /// True once a load strategy has found nothing left to load.
    pub fn is_fully_loaded(&self) -> bool {
        self.load.fully_loaded
    }

    /// Inserts `tuple` and returns where it was stored.
    ///
    /// Tries pages known to have room first; grows the file by one page if
    /// none accepts the tuple.
    pub fn insert(&mut self, tuple: Tuple) -> Result<RecordId, HeapError> {
        self.insert_as(tuple, None)
    }

    /// Deletes the tuple at `tuple.rid()`.
    ///
    /// # Errors
    ///
    /// `HeapError::MissingRecordId` if the tuple was never stored,
    /// `HeapError::InvalidRecord` if its slot is empty or out of range.
    pub fn delete(&mut self, tuple: &Tuple) -> Result<(), HeapError> {
        self.delete_as(tuple, None)
    }

    /// Lazily scans every live tuple, page by page, through the cache.
    pub fn iter(&self) -> HeapScan<'_> {
        HeapScan::new(self, None)
    }

    /// Writes every resident page back and syncs the backing file.
    pub fn flush(&self) -> Result<(), HeapError> {
        self.cache.flush_all()?;
        self.store.sync_all()?;
        Ok(())
    }

    /// Commits `tid` in the shared cache, flushing the pages it dirtied.
    pub fn commit_transaction(&self, tid: TransactionId) -> Result<(), HeapError> {
        Ok(self.cache.commit_transaction(tid)?)
    }

    /// Aborts `tid` in the shared cache and forgets what this heap learned
    /// about free space, since the dropped pages revert to their stored
    /// images.
    ///
    /// Other heaps sharing the cache keep their free sets; a stale entry
    /// there only hides free space until a delete re-admits the page.
    pub fn abort_transaction(&mut self, tid: TransactionId) -> Result<(), HeapError> {
        self.cache.abort_transaction(tid)?;
        self.free_pages = (0..self.num_pages).collect();
        Ok(())
    }

    pub(crate) fn insert_as(
        &mut self,
        tuple: Tuple,
        tid: Option<TransactionId>,
    ) -> Result<RecordId, HeapError> {
        let tuple = self.conform(tuple)?;

        while let Some(page_no) = self.free_pages.first().copied() {
            let page = self.fetch_page(page_no, tid, Permission::Write)?;
            let mut page = page.lock();
            if !page.has_free_slot() {
                self.free_pages.remove(&page_no);
                continue;
            }
            let rid = page.insert(tuple)?;
            if !page.has_free_slot() {
                self.free_pages.remove(&page_no);
            }
            return Ok(rid);
        }

        self.append_page(tuple, tid)
    }

    pub(crate) fn delete_as(
        &mut self,
        tuple: &Tuple,
        tid: Option<TransactionId>,
    ) -> Result<(), HeapError> {
        let rid = tuple.rid().ok_or(HeapError::MissingRecordId)?;
        if rid.page_no >= self.num_pages {
            return Err(HeapError::InvalidRecord(rid));
        }
        let page = self.fetch_page(rid.page_no, tid, Permission::Write)?;
        page.lock().delete(rid)?;
        self.free_pages.insert(rid.page_no);
        Ok(())
    }

    pub(crate) fn fetch_page(
        &self,
        page_no: PageNo,
        tid: Option<TransactionId>,
        perm: Permission,
    ) -> Result<PageRef<SlottedPage>, HeapError> {
        if let Some(tid) = tid {
            self.cache
                .lock_page(tid, self.store.page_key(page_no), perm)?;
        }
        Ok(self.cache.get_page(&self.store, page_no)?)
    }

    fn append_page(
        &mut self,
        tuple: Tuple,
        tid: Option<TransactionId>,
    ) -> Result<RecordId, HeapError> {
        let page_no = self.store.allocate_page()?;
        if page_no != self.num_pages {
            return Err(HeapError::InvariantViolation(format!(
                "storage allocated page {} but heap has {} pages",
                page_no, self.num_pages
            )));
        }
        // The zeroed page on disk reads back as empty. It stays an insert
        // candidate until a tuple has actually been admitted to it.
        self.num_pages += 1;
        self.free_pages.insert(page_no);

        if let Some(tid) = tid {
            self.cache
                .lock_page(tid, self.store.page_key(page_no), Permission::Write)?;
        }
        let mut page = SlottedPage::new(page_no, Arc::clone(&self.desc), self.store.page_size());
        let rid = page.insert(tuple)?;
        let full = !page.has_free_slot();
        self.cache.add_page(page, &self.store, page_no)?;
        if full {
            self.free_pages.remove(&page_no);
        }
        debug!("heap {} grew to {} pages", self.store.file_id(), self.num_pages);
        Ok(rid)
    }

    /// Rebinds a tuple built against an equal descriptor to this file's.
    fn conform(&self, tuple: Tuple) -> Result<Tuple, HeapError> {
        if Arc::ptr_eq(tuple.descriptor(), &self.desc) {
            return Ok(tuple);
        }
        Ok(Tuple::new(Arc::clone(&self.desc), tuple.values().to_vec())?)
    }
}
