//! Side arena for variable-length payloads (strings, binary blobs).
//!
//! Fixed-size record slots never hold variable-length data directly; they
//! hold a [`VarlenHandle`] that's resolved against a `VarlenArena` owned by
//! the same `ArenaRecordStore`. Keeping the two arenas separate means the
//! fixed part of a record stays a constant size, which is what lets
//! `ArenaRecordStore` bump-allocate fixed slots without per-record size
//! bookkeeping.

use std::sync::Arc;

use crate::page_pool::{Page, PagePool};

/// Opaque reference to a byte payload stored in a [`VarlenArena`].
///
/// This is the variable-length counterpart to `RecordPointer`: an index
/// rather than a pointer, valid for the arena's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VarlenHandle {
    page_idx: u32,
    offset: u32,
    len: u32,
}

pub struct VarlenArena {
    pool: Arc<PagePool>,
    pages: Vec<Page>,
}

impl VarlenArena {
    pub fn new(pool: Arc<PagePool>) -> Self {
        VarlenArena {
            pool,
            pages: Vec::new(),
        }
    }

    /// Deep-copy `bytes` into the arena, returning a handle to the copy.
    ///
    /// Payloads larger than a page are not supported. This crate is scoped
    /// to records whose variable-length fields fit in a single page.
    pub fn alloc(&mut self, bytes: &[u8]) -> VarlenHandle {
        if let Some(last) = self.pages.last_mut() {
            if let Some(offset) = last.try_alloc(bytes.len(), 1) {
                let page_idx = (self.pages.len() - 1) as u32;
                last.bytes_mut()[offset..offset + bytes.len()].copy_from_slice(bytes);
                return VarlenHandle {
                    page_idx,
                    offset: offset as u32,
                    len: bytes.len() as u32,
                };
            }
        }
        let mut page = self.pool.acquire();
        assert!(
            bytes.len() <= page.size(),
            "varlen payload of {} bytes exceeds page size {}",
            bytes.len(),
            page.size()
        );
        let offset = page
            .try_alloc(bytes.len(), 1)
            .expect("fresh page must fit a payload no larger than the page");
        page.bytes_mut()[offset..offset + bytes.len()].copy_from_slice(bytes);
        self.pages.push(page);
        VarlenHandle {
            page_idx: (self.pages.len() - 1) as u32,
            offset: offset as u32,
            len: bytes.len() as u32,
        }
    }

    pub fn get(&self, handle: VarlenHandle) -> &[u8] {
        let page = &self.pages[handle.page_idx as usize];
        let start = handle.offset as usize;
        &page.bytes()[start..start + handle.len as usize]
    }
}

impl Drop for VarlenArena {
    fn drop(&mut self) {
        for page in self.pages.drain(..) {
            self.pool.release(page);
        }
    }
}
