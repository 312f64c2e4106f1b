//! Slotted page of fixed-width tuples.
//!
//! Every tuple of a table has the same width, so a page is an array of
//! equally sized slots. On disk only live tuples are written, packed in slot
//! order:
//!
//! ```text
//! +-----------------------------+ offset 0
//! | num_slots (i32 LE)          |
//! | num_used_slots (i32 LE)     |
//! +-----------------------------+ offset 8
//! | tuple 0                     |
//! | tuple 1                     |
//! | ...  (num_used_slots)       |
//! +-----------------------------+
//! | zero padding                |
//! +-----------------------------+ offset page_size
//! ```
//!
//! Empty slots are not written, so a page that round-trips through disk has
//! its live tuples renumbered densely from slot 0.

use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::{Buf, BufMut};

use super::error::HeapError;
use crate::config::PAGE_HEADER_SIZE;
use crate::datum::{PageNo, RecordId, SlotNo, Tuple, TupleDescriptor};
use crate::storage::cache::Page;

/// Number of slots a page of `page_size` bytes holds for `desc`.
pub fn slots_per_page(page_size: usize, desc: &TupleDescriptor) -> usize {
    let width = desc.width();
    if width == 0 || page_size <= PAGE_HEADER_SIZE {
        return 0;
    }
    (page_size - PAGE_HEADER_SIZE) / width
}

/// In-memory image of one heap page.
#[derive(Debug, Clone)]
pub struct SlottedPage {
    page_no: PageNo,
    desc: Arc<TupleDescriptor>,
    page_size: usize,
    num_used_slots: usize,
    /// Slots at and above this index have never been used since the page
    /// was created or read.
    next_insert_index: SlotNo,
    /// Vacated slots below `next_insert_index`.
    free_indices: BTreeSet<SlotNo>,
    tuples: Vec<Option<Tuple>>,
    dirty: bool,
}

impl SlottedPage {
    /// Creates an empty page.
    pub fn new(page_no: PageNo, desc: Arc<TupleDescriptor>, page_size: usize) -> Self {
        let num_slots = slots_per_page(page_size, &desc);
        Self {
            page_no,
            desc,
            page_size,
            num_used_slots: 0,
            next_insert_index: 0,
            free_indices: BTreeSet::new(),
            tuples: vec![None; num_slots],
            dirty: false,
        }
    }

    pub fn num_slots(&self) -> usize {
        self.tuples.len()
    }

    pub fn num_used_slots(&self) -> usize {
        self.num_used_slots
    }

    pub fn has_free_slot(&self) -> bool {
        self.num_used_slots < self.num_slots()
    }

    pub fn descriptor(&self) -> &Arc<TupleDescriptor> {
        &self.desc
    }

    /// Returns the tuple in `slot`, if any.
    pub fn get(&self, slot: SlotNo) -> Option<&Tuple> {
        self.tuples.get(slot)?.as_ref()
    }

    /// Stores `tuple` in the lowest vacated slot, or the next unused one.
    ///
    /// # Errors
    ///
    /// Returns `HeapError::PageFull` if every slot is occupied.
    pub fn insert(&mut self, mut tuple: Tuple) -> Result<RecordId, HeapError> {
        let slot = match self.free_indices.pop_first() {
            Some(slot) => slot,
            None if self.next_insert_index < self.num_slots() => {
                self.next_insert_index += 1;
                self.next_insert_index - 1
            }
            None => {
                return Err(HeapError::PageFull {
                    page_no: self.page_no,
                    slots: self.num_slots(),
                });
            }
        };

        let rid = RecordId::new(self.page_no, slot);
        tuple.set_rid(Some(rid));
        self.tuples[slot] = Some(tuple);
        self.num_used_slots += 1;
        self.dirty = true;
        self.check_rep()?;
        Ok(rid)
    }

    /// Empties the slot addressed by `rid`. Other slots keep their numbers.
    ///
    /// # Errors
    ///
    /// Returns `HeapError::InvalidRecord` if `rid` belongs to another page,
    /// is out of range, or names an empty slot.
    pub fn delete(&mut self, rid: RecordId) -> Result<(), HeapError> {
        if rid.page_no != self.page_no {
            return Err(HeapError::InvalidRecord(rid));
        }
        if self
            .tuples
            .get_mut(rid.slot_no)
            .and_then(Option::take)
            .is_none()
        {
            return Err(HeapError::InvalidRecord(rid));
        }
        self.free_indices.insert(rid.slot_no);
        self.num_used_slots -= 1;
        self.dirty = true;
        self.check_rep()
    }

    /// Live tuples in ascending slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Tuple> {
        self.tuples.iter().flatten()
    }

    /// Returns the first live slot at or after `from`.
    pub fn next_occupied(&self, from: SlotNo) -> Option<(SlotNo, &Tuple)> {
        self.tuples
            .iter()
            .enumerate()
            .skip(from)
            .find_map(|(slot, t)| t.as_ref().map(|t| (slot, t)))
    }

    /// Produces the on-disk image of this page.
    ///
    /// # Errors
    ///
    /// `HeapError::InvariantViolation` if the number of written tuples or
    /// the padding does not agree with the page geometry.
    pub fn serialize(&self) -> Result<Vec<u8>, HeapError> {
        let width = self.desc.width();
        let num_slots = self.num_slots();
        let mut buf = Vec::with_capacity(self.page_size);
        buf.put_i32_le(header_field(num_slots)?);
        buf.put_i32_le(header_field(self.num_used_slots)?);

        let mut written = 0;
        for tuple in self.iter() {
            tuple.encode(&mut buf)?;
            written += 1;
        }
        if written != self.num_used_slots {
            return Err(HeapError::InvariantViolation(format!(
                "page {} wrote {} tuples but counts {} used slots",
                self.page_no, written, self.num_used_slots
            )));
        }

        let bytes_to_pad = self.page_size.checked_sub(buf.len()).ok_or_else(|| {
            HeapError::InvariantViolation(format!(
                "page {} image of {} bytes exceeds page size {}",
                self.page_no,
                buf.len(),
                self.page_size
            ))
        })?;
        let slack = self.page_size - PAGE_HEADER_SIZE - width * num_slots;
        if (num_slots - written) * width + slack != bytes_to_pad {
            return Err(HeapError::InvariantViolation(format!(
                "page {} padding of {} bytes disagrees with geometry",
                self.page_no, bytes_to_pad
            )));
        }
        buf.put_bytes(0, bytes_to_pad);
        Ok(buf)
    }

    /// Rebuilds a page from its on-disk image.
    ///
    /// Live tuples are assigned slots `0..num_used_slots`. An all-zero
    /// header, as left by a page allocated but never written, yields an
    /// empty page.
    pub fn from_bytes(
        page_no: PageNo,
        desc: Arc<TupleDescriptor>,
        page_size: usize,
        data: &[u8],
    ) -> Result<Self, HeapError> {
        let corrupted = |reason: String| HeapError::Corrupted { page_no, reason };
        if data.len() != page_size || page_size < PAGE_HEADER_SIZE {
            return Err(corrupted(format!(
                "image is {} bytes, expected {}",
                data.len(),
                page_size
            )));
        }

        let mut buf = data;
        let num_slots = buf.get_i32_le();
        let num_used = buf.get_i32_le();

        let mut page = Self::new(page_no, desc, page_size);
        if num_slots == 0 && num_used == 0 {
            return Ok(page);
        }
        if usize::try_from(num_slots).ok() != Some(page.num_slots()) {
            return Err(corrupted(format!(
                "header has {} slots, geometry allows {}",
                num_slots,
                page.num_slots()
            )));
        }
        let num_used = match usize::try_from(num_used) {
            Ok(n) if n <= page.num_slots() => n,
            _ => return Err(corrupted(format!("bad used slot count {}", num_used))),
        };

        for slot in 0..num_used {
            let mut tuple = Tuple::decode(Arc::clone(&page.desc), &mut buf)?;
            tuple.set_rid(Some(RecordId::new(page_no, slot)));
            page.tuples[slot] = Some(tuple);
        }
        page.num_used_slots = num_used;
        page.next_insert_index = num_used;
        page.check_rep()?;
        Ok(page)
    }

    fn check_rep(&self) -> Result<(), HeapError> {
        let num_slots = self.num_slots();
        let unused_tail = num_slots.saturating_sub(self.next_insert_index);
        if self.next_insert_index > num_slots
            || num_slots != self.num_used_slots + self.free_indices.len() + unused_tail
        {
            return Err(HeapError::InvariantViolation(format!(
                "page {}: {} slots != {} used + {} free + {} never used",
                self.page_no,
                num_slots,
                self.num_used_slots,
                self.free_indices.len(),
                unused_tail
            )));
        }
        if self.num_used_slots == num_slots && self.next_insert_index != num_slots {
            return Err(HeapError::InvariantViolation(format!(
                "page {} is full but next insert index is {}",
                self.page_no, self.next_insert_index
            )));
        }
        Ok(())
    }
}

fn header_field(n: usize) -> Result<i32, HeapError> {
    i32::try_from(n)
        .map_err(|_| HeapError::InvariantViolation(format!("{} overflows page header", n)))
}

impl Page for SlottedPage {
    fn page_no(&self) -> PageNo {
        self.page_no
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }
}
