//! Append-only, page-backed storage for fixed-size records.
//!
//! Records are never updated in place except for the aggregate value
//! record's running aggregate state and the key record's back-pointer
//! field, both of which are mutated through [`ArenaRecordStore::get_mut`]
//! rather than re-appended.

use std::sync::Arc;

use crate::page_pool::{Page, PagePool, RecordPointer};
use crate::varlen::VarlenArena;

pub struct ArenaRecordStore {
    pool: Arc<PagePool>,
    pages: Vec<Page>,
    record_size: usize,
    record_align: usize,
    varlen: VarlenArena,
}

impl ArenaRecordStore {
    pub fn new(pool: Arc<PagePool>, record_size: usize, record_align: usize) -> Self {
        assert!(
            record_size <= pool.page_size(),
            "record of {record_size} bytes does not fit in a {}-byte page",
            pool.page_size()
        );
        ArenaRecordStore {
            varlen: VarlenArena::new(Arc::clone(&pool)),
            pool,
            pages: Vec::new(),
            record_size,
            record_align,
        }
    }

    pub fn varlen(&self) -> &VarlenArena {
        &self.varlen
    }

    pub fn varlen_mut(&mut self) -> &mut VarlenArena {
        &mut self.varlen
    }

    /// Copy `bytes` (the fixed part of a record, with any varlen fields
    /// already resolved against `self.varlen()`) into the arena and return
    /// a stable pointer to it.
    pub fn append(&mut self, bytes: &[u8]) -> RecordPointer {
        debug_assert_eq!(bytes.len(), self.record_size);
        if let Some(last) = self.pages.last_mut() {
            if let Some(offset) = last.try_alloc(self.record_size, self.record_align) {
                let page_idx = (self.pages.len() - 1) as u32;
                last.bytes_mut()[offset..offset + self.record_size].copy_from_slice(bytes);
                return RecordPointer::new(page_idx, offset as u32);
            }
        }
        let mut page = self.pool.acquire();
        let offset = page
            .try_alloc(self.record_size, self.record_align)
            .expect("fresh page must fit a record no larger than the page");
        page.bytes_mut()[offset..offset + self.record_size].copy_from_slice(bytes);
        self.pages.push(page);
        RecordPointer::new((self.pages.len() - 1) as u32, offset as u32)
    }

    pub fn get(&self, ptr: RecordPointer) -> &[u8] {
        let page = &self.pages[ptr.page_idx as usize];
        let start = ptr.offset as usize;
        &page.bytes()[start..start + self.record_size]
    }

    pub fn get_mut(&mut self, ptr: RecordPointer) -> &mut [u8] {
        let page = &mut self.pages[ptr.page_idx as usize];
        let start = ptr.offset as usize;
        let size = self.record_size;
        &mut page.bytes_mut()[start..start + size]
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }
}

impl Drop for ArenaRecordStore {
    fn drop(&mut self) {
        for page in self.pages.drain(..) {
            self.pool.release(page);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_get_round_trip() {
        let pool = PagePool::new(64);
        let mut store = ArenaRecordStore::new(Arc::clone(&pool), 16, 8);
        let p1 = store.append(&[1u8; 16]);
        let p2 = store.append(&[2u8; 16]);
        assert_eq!(store.get(p1), &[1u8; 16]);
        assert_eq!(store.get(p2), &[2u8; 16]);
    }

    #[test]
    fn mutation_is_visible_through_pointer() {
        let pool = PagePool::new(64);
        let mut store = ArenaRecordStore::new(Arc::clone(&pool), 8, 8);
        let p = store.append(&[0u8; 8]);
        store.get_mut(p)[0] = 9;
        assert_eq!(store.get(p)[0], 9);
    }

    #[test]
    fn spills_across_pages() {
        let pool = PagePool::new(16);
        let mut store = ArenaRecordStore::new(Arc::clone(&pool), 16, 8);
        let p1 = store.append(&[1u8; 16]);
        let p2 = store.append(&[2u8; 16]);
        assert_ne!(p1.page_idx, p2.page_idx);
    }

    #[test]
    fn releases_pages_on_drop() {
        let pool = PagePool::new(16);
        {
            let mut store = ArenaRecordStore::new(Arc::clone(&pool), 16, 8);
            store.append(&[1u8; 16]);
        }
        assert_eq!(pool.free_count(), 1);
    }
}
