//! Pre-aggregation hash table: a Hopscotch-probed, open-addressed
//! table mapping a key record's pointer to its value record's pointer.
//!
//! Unlike a general-purpose hash table that grows by doubling whenever its
//! load factor crosses a threshold, this table is meant to live entirely
//! inside one page: growth would defeat the point of bounding
//! pre-aggregation memory to a page per partition. Instead,
//! `InputPartition` watches [`PreAggHashTable::load_factor`] and flushes the
//! table to a sorted key/value record pair once it crosses the configured
//! bound, starting a fresh table afterward. `insert` only grows as a last
//! resort, when Hopscotch displacement fails outright, which a caller that
//! flushes at the configured load factor should never actually trigger.

use tracing::warn;

use crate::page_pool::RecordPointer;

#[derive(Clone, Copy)]
struct Bucket {
    occupied: bool,
    hash: u64,
    hop_bitmap: u64,
    key_ptr: RecordPointer,
    value_ptr: RecordPointer,
}

impl Default for Bucket {
    fn default() -> Self {
        Bucket {
            occupied: false,
            hash: 0,
            hop_bitmap: 0,
            key_ptr: RecordPointer::default(),
            value_ptr: RecordPointer::default(),
        }
    }
}

pub struct PreAggHashTable {
    buckets: Vec<Bucket>,
    mask: usize,
    len: usize,
    neighbourhood: usize,
}

fn largest_pow2_leq(n: usize) -> usize {
    if n <= 1 {
        return 1;
    }
    1usize << (usize::BITS - 1 - n.leading_zeros())
}

impl PreAggHashTable {
    /// Size a table to fit within `page_size` bytes, using the largest
    /// power-of-two bucket count that does.
    pub fn for_page(page_size: usize, neighbourhood: usize) -> Self {
        let bucket_size = std::mem::size_of::<Bucket>();
        let raw = (page_size / bucket_size).max(neighbourhood + 1);
        Self::with_capacity(largest_pow2_leq(raw), neighbourhood)
    }

    pub fn with_capacity(capacity: usize, neighbourhood: usize) -> Self {
        let capacity = capacity.next_power_of_two().max(neighbourhood + 1);
        assert!(
            neighbourhood <= 64,
            "neighbourhood size must fit in the bitmap word"
        );
        PreAggHashTable {
            buckets: vec![Bucket::default(); capacity],
            mask: capacity - 1,
            len: 0,
            neighbourhood,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    pub fn load_factor(&self) -> f64 {
        self.len as f64 / self.buckets.len() as f64
    }

    /// Find the bucket slot whose hash and key match, probing only the home
    /// bucket's recorded neighborhood rather than scanning the whole table.
    fn find_slot(&self, hash: u64, mut eq: impl FnMut(RecordPointer) -> bool) -> Option<usize> {
        let home = (hash as usize) & self.mask;
        let bitmap = self.buckets[home].hop_bitmap;
        for j in 0..self.neighbourhood {
            if bitmap & (1 << j) == 0 {
                continue;
            }
            let slot = (home + j) & self.mask;
            let bucket = &self.buckets[slot];
            if bucket.occupied && bucket.hash == hash && eq(bucket.key_ptr) {
                return Some(slot);
            }
        }
        None
    }

    pub fn lookup(
        &self,
        hash: u64,
        eq: impl FnMut(RecordPointer) -> bool,
    ) -> Option<(RecordPointer, RecordPointer)> {
        self.find_slot(hash, eq)
            .map(|slot| (self.buckets[slot].key_ptr, self.buckets[slot].value_ptr))
    }

    /// Remove the matching entry from the table, if present, returning its
    /// key/value pointers. Used by the aggregate merge reader to erase a
    /// peer partition's entry once it's been folded in.
    pub fn remove_if(
        &mut self,
        hash: u64,
        eq: impl FnMut(RecordPointer) -> bool,
    ) -> Option<(RecordPointer, RecordPointer)> {
        let slot = self.find_slot(hash, eq)?;
        let home = (hash as usize) & self.mask;
        let offset = (slot + self.buckets.len() - home) & self.mask;
        let bucket = self.buckets[slot];
        self.buckets[slot].occupied = false;
        self.buckets[home].hop_bitmap &= !(1 << offset);
        self.len -= 1;
        Some((bucket.key_ptr, bucket.value_ptr))
    }

    /// Update the value pointer of an existing entry in place (used when a
    /// new record merges into an existing aggregate in the same slot, i.e.
    /// when the value record itself was reallocated).
    pub fn update_value(&mut self, hash: u64, eq: impl FnMut(RecordPointer) -> bool, value_ptr: RecordPointer) {
        if let Some(slot) = self.find_slot(hash, eq) {
            self.buckets[slot].value_ptr = value_ptr;
        }
    }

    /// Insert a new entry. Callers are expected to have already checked
    /// `lookup` found nothing for this key.
    pub fn insert(&mut self, hash: u64, key_ptr: RecordPointer, value_ptr: RecordPointer) {
        loop {
            match self.try_insert(hash, key_ptr, value_ptr) {
                Ok(()) => {
                    self.len += 1;
                    return;
                }
                Err(()) => {
                    warn!(
                        capacity = self.capacity(),
                        load_factor = self.load_factor(),
                        "pre-aggregation hash table exhausted its neighborhood before reaching \
                         the configured flush threshold; growing instead of flushing"
                    );
                    self.grow();
                }
            }
        }
    }

    fn try_insert(&mut self, hash: u64, key_ptr: RecordPointer, value_ptr: RecordPointer) -> Result<(), ()> {
        let cap = self.buckets.len();
        let home = (hash as usize) & self.mask;

        let mut free = home;
        let mut dist = 0usize;
        while self.buckets[free].occupied {
            free = (free + 1) & self.mask;
            dist += 1;
            if dist >= cap {
                return Err(());
            }
        }

        while dist >= self.neighbourhood {
            let mut moved = false;
            for back in (1..self.neighbourhood).rev() {
                let b = (free + cap - back) & self.mask;
                if let Some(j) = (0..back).find(|&j| self.buckets[b].hop_bitmap & (1 << j) != 0) {
                    let victim = (b + j) & self.mask;
                    self.buckets[free] = self.buckets[victim];
                    self.buckets[victim].occupied = false;
                    self.buckets[b].hop_bitmap &= !(1 << j);
                    self.buckets[b].hop_bitmap |= 1 << back;
                    free = victim;
                    dist = (free + cap - home) & self.mask;
                    moved = true;
                    break;
                }
            }
            if !moved {
                return Err(());
            }
        }

        self.buckets[free] = Bucket {
            occupied: true,
            hash,
            hop_bitmap: 0,
            key_ptr,
            value_ptr,
        };
        self.buckets[home].hop_bitmap |= 1 << dist;
        Ok(())
    }

    fn grow(&mut self) {
        let old = std::mem::replace(
            &mut self.buckets,
            vec![Bucket::default(); self.buckets.len() * 2],
        );
        self.mask = self.buckets.len() - 1;
        self.len = 0;
        for bucket in old.into_iter().filter(|b| b.occupied) {
            self.insert(bucket.hash, bucket.key_ptr, bucket.value_ptr);
        }
    }

    /// Iterate all live entries. Order is unspecified.
    pub fn iter(&self) -> impl Iterator<Item = (u64, RecordPointer, RecordPointer)> + '_ {
        self.buckets
            .iter()
            .filter(|b| b.occupied)
            .map(|b| (b.hash, b.key_ptr, b.value_ptr))
    }
}
