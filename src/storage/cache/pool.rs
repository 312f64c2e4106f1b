//! The page cache proper.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, trace};
use parking_lot::{Mutex, MutexGuard};

use super::error::CacheError;
use super::page::{BackingStore, Page, PageKey, PageRef};
use super::recency::{NodeId, RecencyList};
use super::txn::{LockManager, NoopLockManager, Permission, TransactionId};
use crate::config::StorageConfig;
use crate::datum::PageNo;

/// Fixed-capacity cache of pages from any number of backing stores.
///
/// # Architecture
///
/// ```text
/// +-------------------+
/// |    Heap files     |
/// +-------------------+
///          |
///          v
/// +-------------------+
/// |     PageCache     |  <- recency list + key map
/// +-------------------+
///          |
///          v
/// +-------------------+
/// | BackingStore impl |
/// +-------------------+
/// ```
///
/// # Thread Safety
///
/// All bookkeeping lives behind one `parking_lot::Mutex`. Pages are handed
/// out as `Arc<Mutex<P>>`; the cache locks a page only to test its dirty
/// flag or to write it back. Writers are expected to be serialized by the
/// caller.
///
/// Every public operation checks the representation invariant on entry and
/// exit and fails with `CacheError::InvariantViolation` if it does not hold.
pub struct PageCache<P: Page> {
    capacity: usize,
    state: Mutex<CacheState<P>>,
    lock_manager: Box<dyn LockManager>,
}

struct Entry<P> {
    key: PageKey,
    page: PageRef<P>,
    store: Arc<dyn BackingStore<P>>,
}

struct CacheState<P> {
    entries: RecencyList<Entry<P>>,
    index: HashMap<PageKey, NodeId>,
    flush_when_full: bool,
}

impl<P: Page + 'static> PageCache<P> {
    /// Creates a cache holding at most `capacity` pages.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        Self::with_lock_manager(capacity, Box::new(NoopLockManager))
    }

    /// Creates a cache sized by `config.cache_capacity`.
    ///
    /// # Panics
    ///
    /// Panics if the capacity is 0; [`StorageConfig::validate`] rejects that.
    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.cache_capacity)
    }

    /// Creates a cache that consults `lock_manager` on transaction hooks.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn with_lock_manager(capacity: usize, lock_manager: Box<dyn LockManager>) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        Self {
            capacity,
            state: Mutex::new(CacheState {
                entries: RecencyList::with_capacity(capacity),
                index: HashMap::with_capacity(capacity),
                flush_when_full: false,
            }),
            lock_manager,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of resident pages.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: PageKey) -> bool {
        self.state.lock().index.contains_key(&key)
    }

    /// Returns the dirty flag of a resident page, or `None` if not resident.
    pub fn is_dirty(&self, key: PageKey) -> Option<bool> {
        let state = self.state.lock();
        let id = *state.index.get(&key)?;
        state.entries.get(id).map(|e| e.page.lock().is_dirty())
    }

    /// Resident keys from most to least recently used.
    pub fn resident_keys(&self) -> Vec<PageKey> {
        self.state.lock().entries.iter().map(|(_, e)| e.key).collect()
    }

    /// Returns the page `page_no` of `store`, reading it in on a miss.
    ///
    /// A hit moves the page to the most recently used position.
    ///
    /// # Errors
    ///
    /// - `CacheError::Storage` if the read or an eviction write-back fails
    /// - `CacheError::BufferPoolFull` if the cache is full of dirty pages
    pub fn get_page<S>(&self, store: &Arc<S>, page_no: PageNo) -> Result<PageRef<P>, CacheError>
    where
        S: BackingStore<P> + 'static,
    {
        let key = store.page_key(page_no);
        let mut state = self.lock_checked()?;

        if let Some(&id) = state.index.get(&key) {
            state.entries.move_to_front(id);
            let page = state
                .entries
                .get(id)
                .map(|e| Arc::clone(&e.page))
                .ok_or_else(|| dangling(key))?;
            trace!("cache hit {}", key);
            state.check_rep(self.capacity)?;
            return Ok(page);
        }

        debug!("cache miss {}, reading from store", key);
        let page = store.read_page(page_no)?;
        let store: Arc<dyn BackingStore<P>> = Arc::clone(store) as Arc<dyn BackingStore<P>>;
        let page = state.admit(self.capacity, key, page, store)?;
        state.check_rep(self.capacity)?;
        Ok(page)
    }

    /// Admits a freshly created page without reading it from storage.
    ///
    /// # Errors
    ///
    /// As for [`get_page`](Self::get_page); additionally
    /// `CacheError::InvariantViolation` if the key is already resident.
    pub fn add_page<S>(
        &self,
        page: P,
        store: &Arc<S>,
        page_no: PageNo,
    ) -> Result<PageRef<P>, CacheError>
    where
        S: BackingStore<P> + 'static,
    {
        let key = store.page_key(page_no);
        let mut state = self.lock_checked()?;
        let store: Arc<dyn BackingStore<P>> = Arc::clone(store) as Arc<dyn BackingStore<P>>;
        let page = state.admit(self.capacity, key, page, store)?;
        debug!("added new page {}", key);
        state.check_rep(self.capacity)?;
        Ok(page)
    }

    /// Writes every resident page back to its store and clears dirty flags.
    pub fn flush_all(&self) -> Result<(), CacheError> {
        let mut state = self.lock_checked()?;
        state.flush_all()?;
        state.check_rep(self.capacity)
    }

    /// Writes one resident page back. Non-resident pages are ignored.
    pub fn flush_page(&self, key: PageKey) -> Result<(), CacheError> {
        let state = self.lock_checked()?;
        if let Some(&id) = state.index.get(&key)
            && let Some(entry) = state.entries.get(id)
        {
            entry.flush()?;
        }
        state.check_rep(self.capacity)
    }

    /// Asks the lock manager for `perm` on `key` on behalf of `tid`.
    pub fn lock_page(
        &self,
        tid: TransactionId,
        key: PageKey,
        perm: Permission,
    ) -> Result<(), CacheError> {
        self.lock_manager.lock_page(tid, key, perm)
    }

    pub fn begin_transaction(&self, tid: TransactionId) -> Result<(), CacheError> {
        debug!("begin {}", tid);
        self.lock_manager.begin(tid)
    }

    /// Forces every dirty page to storage, then releases `tid`'s locks.
    ///
    /// Dirty pages are not attributed to transactions; with a single writer
    /// every dirty page belongs to the committing one.
    pub fn commit_transaction(&self, tid: TransactionId) -> Result<(), CacheError> {
        {
            let state = self.lock_checked()?;
            for (_, entry) in state.entries.iter() {
                let mut page = entry.page.lock();
                if page.is_dirty() {
                    entry.store.flush_page(&page)?;
                    page.set_dirty(false);
                }
            }
            state.check_rep(self.capacity)?;
        }
        self.lock_manager.release_all(tid);
        debug!("commit {}", tid);
        Ok(())
    }

    /// Discards every dirty page without writing it, then releases locks.
    ///
    /// Storage still holds the pre-transaction images, so the next access
    /// re-reads them.
    pub fn abort_transaction(&self, tid: TransactionId) -> Result<(), CacheError> {
        {
            let mut state = self.lock_checked()?;
            let dirty: Vec<NodeId> = state
                .entries
                .iter()
                .filter(|(_, e)| e.page.lock().is_dirty())
                .map(|(id, _)| id)
                .collect();
            for id in dirty {
                if let Some(entry) = state.entries.remove(id) {
                    state.index.remove(&entry.key);
                    debug!("abort {} discarded {}", tid, entry.key);
                }
            }
            state.check_rep(self.capacity)?;
        }
        self.lock_manager.release_all(tid);
        Ok(())
    }

    /// Allows admission to flush every dirty page when nothing is clean.
    ///
    /// The previous setting is restored when the guard drops.
    pub fn allow_flush_when_full(&self) -> FlushWhenFullGuard<'_, P> {
        let mut state = self.state.lock();
        let previous = state.flush_when_full;
        state.flush_when_full = true;
        FlushWhenFullGuard {
            cache: self,
            previous,
        }
    }

    pub fn flush_when_full(&self) -> bool {
        self.state.lock().flush_when_full
    }

    fn lock_checked(&self) -> Result<MutexGuard<'_, CacheState<P>>, CacheError> {
        let state = self.state.lock();
        state.check_rep(self.capacity)?;
        Ok(state)
    }
}

/// Restores the flush-when-full setting on drop.
#[must_use = "the escape valve closes as soon as the guard is dropped"]
pub struct FlushWhenFullGuard<'a, P: Page> {
    cache: &'a PageCache<P>,
    previous: bool,
}

impl<P: Page> Drop for FlushWhenFullGuard<'_, P> {
    fn drop(&mut self) {
        self.cache.state.lock().flush_when_full = self.previous;
    }
}

impl<P> Entry<P>
where
    P: Page,
{
    fn flush(&self) -> Result<(), CacheError> {
        let mut page = self.page.lock();
        self.store.flush_page(&page)?;
        page.set_dirty(false);
        Ok(())
    }
}

impl<P: Page> CacheState<P> {
    fn admit(
        &mut self,
        capacity: usize,
        key: PageKey,
        page: P,
        store: Arc<dyn BackingStore<P>>,
    ) -> Result<PageRef<P>, CacheError> {
        if self.index.contains_key(&key) {
            return Err(CacheError::InvariantViolation(format!(
                "page {} is already resident",
                key
            )));
        }
        if self.entries.len() >= capacity {
            self.evict()?;
        }
        let page = Arc::new(Mutex::new(page));
        let id = self.entries.push_front(Entry {
            key,
            page: Arc::clone(&page),
            store,
        });
        self.index.insert(key, id);
        Ok(page)
    }

    fn evict(&mut self) -> Result<(), CacheError> {
        let victim = match self.first_clean() {
            Some(id) => id,
            None if self.flush_when_full => {
                debug!("all {} pages dirty, flushing to make room", self.entries.len());
                self.flush_all()?;
                self.first_clean().ok_or(CacheError::BufferPoolFull {
                    resident: self.entries.len(),
                })?
            }
            None => {
                return Err(CacheError::BufferPoolFull {
                    resident: self.entries.len(),
                });
            }
        };

        self.entries
            .get(victim)
            .ok_or_else(|| CacheError::InvariantViolation("victim not linked".into()))?
            .flush()?;
        if let Some(entry) = self.entries.remove(victim) {
            self.index.remove(&entry.key);
            debug!("evicted {}", entry.key);
        }
        Ok(())
    }

    /// First clean page scanning from the most recently used end.
    fn first_clean(&self) -> Option<NodeId> {
        self.entries
            .iter()
            .find(|(_, e)| !e.page.lock().is_dirty())
            .map(|(id, _)| id)
    }

    fn flush_all(&mut self) -> Result<(), CacheError> {
        for (_, entry) in self.entries.iter() {
            entry.flush()?;
        }
        Ok(())
    }

    fn check_rep(&self, capacity: usize) -> Result<(), CacheError> {
        let len = self.entries.len();
        let (head, tail) = (self.entries.head(), self.entries.tail());
        if len > capacity {
            return Err(violation(format!("{} pages exceed capacity {}", len, capacity)));
        }
        if (len == 0) != (head.is_none() && tail.is_none()) {
            return Err(violation(format!(
                "len {} with head {:?} and tail {:?}",
                len, head, tail
            )));
        }
        if head.is_none() != tail.is_none() {
            return Err(violation("only one list end is set".into()));
        }
        if len > 0 && (len == 1) != (head == tail) {
            return Err(violation(format!(
                "len {} but head == tail is {}",
                len,
                head == tail
            )));
        }
        if len != self.index.len() {
            return Err(violation(format!(
                "list holds {} pages, key map holds {}",
                len,
                self.index.len()
            )));
        }
        Ok(())
    }
}

fn violation(msg: String) -> CacheError {
    CacheError::InvariantViolation(msg)
}

fn dangling(key: PageKey) -> CacheError {
    violation(format!("key map points {} at an unlinked node", key))
}
