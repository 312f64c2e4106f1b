//! Page cache for keeping table pages in memory.
//!
//! The cache sits between heap files and their storage. Heap files never
//! read or write cached pages themselves: they ask the cache for a shared
//! page handle, mutate it under its lock, and mark it dirty. The cache alone
//! decides residency and write-back.
//!
//! - [`PageCache`]: Capacity-bounded cache with no-steal eviction
//! - [`Page`], [`BackingStore`]: Contracts a page type and its owning file implement
//! - [`LockManager`]: Transaction hook; [`NoopLockManager`] is the default
//! - [`FlushWhenFullGuard`]: Scoped escape valve for bulk loads
//!
//! # Eviction
//!
//! Dirty pages are never evicted (no-steal). When the cache is full, the
//! recency list is scanned from the most recently used end toward the least
//! recently used end and the first clean page found is written back and
//! dropped.
//!
//! ```text
//!  head (MRU)                                  tail (LRU)
//!  +--------+     +--------+     +--------+     +--------+
//!  | dirty  | --> | clean  | --> | dirty  | --> | clean  |
//!  +--------+     +--------+     +--------+     +--------+
//!                     ^ victim
//! ```
//!
//! # Latch order
//!
//! The cache state lock is taken before any page lock. Callers must not
//! call into the cache while holding a page lock.

mod error;
mod page;
mod pool;
mod recency;
mod txn;

pub use error::CacheError;
pub use page::{BackingStore, FileId, Page, PageKey, PageRef};
pub use pool::{FlushWhenFullGuard, PageCache};
pub use txn::{LockManager, NoopLockManager, Permission, TransactionId};
