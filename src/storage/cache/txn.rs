//! Transaction identifiers and the lock manager hook.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::error::CacheError;
use super::page::PageKey;

/// Identifies a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Returns a fresh, process-unique id.
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx{}", self.0)
    }
}

/// Access mode requested for a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    Write,
}

/// Concurrency-control hook consulted by the cache.
///
/// The engine assumes a single writer; a real implementation plugs in here
/// without changes to the cache or heap files.
pub trait LockManager: Send + Sync {
    fn begin(&self, tid: TransactionId) -> Result<(), CacheError>;

    /// Called before `tid` touches the page at `key`.
    fn lock_page(
        &self,
        tid: TransactionId,
        key: PageKey,
        perm: Permission,
    ) -> Result<(), CacheError>;

    /// Drops every lock held by `tid`. Called after commit and abort.
    fn release_all(&self, tid: TransactionId);
}

/// Grants everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLockManager;

impl LockManager for NoopLockManager {
    fn begin(&self, _tid: TransactionId) -> Result<(), CacheError> {
        Ok(())
    }

    fn lock_page(
        &self,
        _tid: TransactionId,
        _key: PageKey,
        _perm: Permission,
    ) -> Result<(), CacheError> {
        Ok(())
    }

    fn release_all(&self, _tid: TransactionId) {}
}
