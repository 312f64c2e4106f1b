//! Heap storage for fixed-width tuples.
//!
//! This module provides the heap file implementation, which stores table rows
//! in slotted pages. The term "heap" refers to an unordered collection of
//! records, as opposed to indexed structures like B+trees.
//!
//! - [`SlottedPage`]: Page-level tuple storage with slot reuse
//! - [`HeapStore`]: Maps pages onto raw page storage for the cache
//! - [`HeapFile`]: A table; routes inserts and deletes, scans lazily
//! - [`TupleSource`]: What query operators consume

mod error;
mod file;
mod page;
mod scan;
mod store;

use std::sync::Arc;

pub use error::HeapError;
pub use file::HeapFile;
pub use page::{SlottedPage, slots_per_page};
pub use scan::HeapScan;
pub use store::HeapStore;

use crate::datum::{RecordId, Tuple, TupleDescriptor};
use crate::storage::cache::TransactionId;

/// Producer of tuples for query operators, with transactional writes.
pub trait TupleSource {
    type Iter<'a>: Iterator<Item = Result<Tuple, HeapError>>
    where
        Self: 'a;

    fn descriptor(&self) -> &Arc<TupleDescriptor>;

    fn iter(&self, tid: TransactionId) -> Self::Iter<'_>;

    fn insert(&mut self, tuple: Tuple, tid: TransactionId) -> Result<RecordId, HeapError>;

    fn delete(&mut self, tuple: &Tuple, tid: TransactionId) -> Result<(), HeapError>;
}

impl TupleSource for HeapFile {
    type Iter<'a> = HeapScan<'a>;

    fn descriptor(&self) -> &Arc<TupleDescriptor> {
        HeapFile::descriptor(self)
    }

    fn iter(&self, tid: TransactionId) -> HeapScan<'_> {
        HeapScan::new(self, Some(tid))
    }

    fn insert(&mut self, tuple: Tuple, tid: TransactionId) -> Result<RecordId, HeapError> {
        self.insert_as(tuple, Some(tid))
    }

    fn delete(&mut self, tuple: &Tuple, tid: TransactionId) -> Result<(), HeapError> {
        self.delete_as(tuple, Some(tid))
    }
}
