//! Lazy page-then-slot scan over a heap file.

use super::error::HeapError;
use super::file::HeapFile;
use crate::datum::{PageNo, SlotNo, Tuple};
use crate::storage::cache::{Permission, TransactionId};

/// Iterator over the live tuples of a heap file.
///
/// Pages are fetched through the cache one at a time, and the page lock is
/// held only while the next tuple is copied out. A fetch error is yielded
/// once and ends the scan.
pub struct HeapScan<'a> {
    heap: &'a HeapFile,
    tid: Option<TransactionId>,
    page_no: PageNo,
    slot: SlotNo,
    done: bool,
}

impl<'a> HeapScan<'a> {
    pub(crate) fn new(heap: &'a HeapFile, tid: Option<TransactionId>) -> Self {
        Self {
            heap,
            tid,
            page_no: 0,
            slot: 0,
            done: false,
        }
    }
}

impl Iterator for HeapScan<'_> {
    type Item = Result<Tuple, HeapError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done && self.page_no < self.heap.num_pages() {
            let page = match self.heap.fetch_page(self.page_no, self.tid, Permission::Read) {
                Ok(page) => page,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            };
            let found = page
                .lock()
                .next_occupied(self.slot)
                .map(|(slot, tuple)| (slot, tuple.clone()));
            match found {
                Some((slot, tuple)) => {
                    self.slot = slot + 1;
                    return Some(Ok(tuple));
                }
                None => {
                    self.page_no += 1;
                    self.slot = 0;
                }
            }
        }
        None
    }
}
