//! Fixed-capacity, append-only table of record pointers.
//!
//! A `PointerTable` fills up to a capacity derived from the page size, after
//! which the partition starts a new one; `InputPartition` owns the list.
//! Once a table is sealed it becomes sortable in place. Entries are
//! pointers, so sorting only ever permutes an array of `(u32, u32)` pairs,
//! never touches record bytes.

use crate::page_pool::RecordPointer;

pub struct PointerTable {
    entries: Vec<RecordPointer>,
    capacity: usize,
    sealed: bool,
}

impl PointerTable {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "pointer table capacity must be positive");
        PointerTable {
            entries: Vec::with_capacity(capacity),
            capacity,
            sealed: false,
        }
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a pointer. Returns `false` without modifying the table if it's
    /// already at capacity or sealed. Callers should check `is_full`
    /// before pushing and start a fresh table instead.
    pub fn push(&mut self, ptr: RecordPointer) -> bool {
        if self.sealed || self.is_full() {
            return false;
        }
        self.entries.push(ptr);
        true
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Sort entries in place using `cmp`, which is expected to compare the
    /// key records the pointers reference. Panics if the table hasn't been
    /// sealed yet: sorting a table still being appended to would reorder
    /// entries out from under a concurrent writer.
    pub fn sort_by<F>(&mut self, mut cmp: F)
    where
        F: FnMut(&RecordPointer, &RecordPointer) -> std::cmp::Ordering,
    {
        assert!(self.sealed, "cannot sort a pointer table before it is sealed");
        self.entries.sort_by(|a, b| cmp(a, b));
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecordPointer> {
        self.entries.iter()
    }

    pub fn get(&self, idx: usize) -> Option<&RecordPointer> {
        self.entries.get(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_push_past_capacity() {
        let mut t = PointerTable::new(2);
        assert!(t.push(RecordPointer::new(0, 0)));
        assert!(t.push(RecordPointer::new(0, 8)));
        assert!(!t.push(RecordPointer::new(0, 16)));
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn sort_permutes_in_place() {
        let mut t = PointerTable::new(4);
        t.push(RecordPointer::new(0, 24));
        t.push(RecordPointer::new(0, 0));
        t.push(RecordPointer::new(0, 16));
        t.push(RecordPointer::new(0, 8));
        t.seal();
        t.sort_by(|a, b| a.offset.cmp(&b.offset));
        let offsets: Vec<u32> = t.iter().map(|p| p.offset).collect();
        assert_eq!(offsets, vec![0, 8, 16, 24]);
    }

    #[test]
    #[should_panic(expected = "sealed")]
    fn sort_before_seal_panics() {
        let mut t = PointerTable::new(4);
        t.push(RecordPointer::new(0, 0));
        t.sort_by(|a, b| a.offset.cmp(&b.offset));
    }
}
