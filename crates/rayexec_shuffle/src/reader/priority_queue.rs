//! Priority-queue (k-way merge) group reader.
//!
//! Each sealed `PointerTable` is already internally sorted, so rather than
//! flattening and re-sorting everything up front (as
//! [`super::sorted_vector::SortedVectorGroupReader`] does), this reader
//! keeps one cursor per table and a min-heap of their current heads,
//! pulling the globally-smallest next pointer one step at a time. Grounded
//! in the same shape as a textbook k-way merge: pop the heap minimum,
//! refill from the table it came from, repeat.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::input_partition::GroupInputPartition;
use crate::page_pool::RecordPointer;

use super::{GroupReader, ReaderState};

struct HeapItem<'a> {
    table_idx: usize,
    ptr: RecordPointer,
    comparator: &'a [u8],
}

impl PartialEq for HeapItem<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.comparator == other.comparator
    }
}
impl Eq for HeapItem<'_> {}

impl PartialOrd for HeapItem<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: `BinaryHeap` is a max-heap, but we want the
        // lexicographically smallest comparator bytes to come out first.
        other.comparator.cmp(self.comparator)
    }
}

pub struct PriorityQueueGroupReader<'a> {
    partition: &'a GroupInputPartition,
    heap: BinaryHeap<HeapItem<'a>>,
    cursors: Vec<usize>,
    lookahead: Option<RecordPointer>,
    group_ptr: Option<RecordPointer>,
    member_ptr: Option<RecordPointer>,
    state: ReaderState,
    limit: Option<usize>,
    member_count: usize,
}

impl<'a> PriorityQueueGroupReader<'a> {
    /// `limit` bounds how many members `next_member` yields per group before
    /// it starts returning `false`; `None` is unbounded, `Some(0)` means no
    /// group is ever yielded at all.
    pub fn new(partition: &'a GroupInputPartition, limit: Option<usize>) -> Self {
        let tables = partition.tables();
        let mut cursors = vec![0usize; tables.len()];
        let mut heap = BinaryHeap::new();
        for (table_idx, table) in tables.iter().enumerate() {
            if let Some(&ptr) = table.get(0) {
                cursors[table_idx] = 1;
                heap.push(HeapItem {
                    table_idx,
                    ptr,
                    comparator: partition.comparator(ptr),
                });
            }
        }
        PriorityQueueGroupReader {
            partition,
            heap,
            cursors,
            lookahead: None,
            group_ptr: None,
            member_ptr: None,
            state: ReaderState::BeforeMember,
            limit,
            member_count: 0,
        }
    }

    fn pop_global(&mut self) -> Option<RecordPointer> {
        let item = self.heap.pop()?;
        let table = &self.partition.tables()[item.table_idx];
        let next_pos = self.cursors[item.table_idx];
        if let Some(&next_ptr) = table.get(next_pos) {
            self.cursors[item.table_idx] += 1;
            self.heap.push(HeapItem {
                table_idx: item.table_idx,
                ptr: next_ptr,
                comparator: self.partition.comparator(next_ptr),
            });
        }
        Some(item.ptr)
    }

    /// Once a group's limit is reached, pop any remaining heap entries still
    /// matching `group_cmp` without copying them into `member_ptr`, so the
    /// next `next_group` call lands on a genuinely distinct group.
    fn discard_remaining_group(&mut self, group_cmp: &[u8]) {
        while let Some(p) = self.lookahead {
            if self.partition.comparator(p) != group_cmp {
                break;
            }
            self.lookahead = self.pop_global();
        }
    }
}

impl<'a> GroupReader for PriorityQueueGroupReader<'a> {
    fn next_group(&mut self) -> bool {
        if self.state == ReaderState::Eof {
            return false;
        }
        if self.limit == Some(0) {
            self.state = ReaderState::Eof;
            return false;
        }
        let first = match self.lookahead.take() {
            Some(p) => p,
            None => match self.pop_global() {
                Some(p) => p,
                None => {
                    self.state = ReaderState::Eof;
                    return false;
                }
            },
        };
        self.group_ptr = Some(first);
        self.lookahead = Some(first);
        self.member_ptr = None;
        self.member_count = 0;
        self.state = ReaderState::BeforeMember;
        true
    }

    fn get_group(&self) -> RecordPointer {
        self.group_ptr.expect("next_group must be called before get_group")
    }

    fn next_member(&mut self) -> bool {
        if matches!(self.state, ReaderState::AfterGroup | ReaderState::Eof) {
            return false;
        }
        let group_cmp = self.partition.comparator(self.group_ptr.expect("group must be set"));

        if let Some(limit) = self.limit {
            if self.member_count >= limit {
                self.discard_remaining_group(group_cmp);
                self.state = ReaderState::AfterGroup;
                return false;
            }
        }

        match self.lookahead.take() {
            Some(p) if self.partition.comparator(p) == group_cmp => {
                self.member_ptr = Some(p);
                self.state = ReaderState::OnMember;
                self.member_count += 1;
                self.lookahead = self.pop_global();
                true
            }
            Some(p) => {
                self.lookahead = Some(p);
                self.state = ReaderState::AfterGroup;
                false
            }
            None => {
                self.state = ReaderState::AfterGroup;
                false
            }
        }
    }

    fn get_member(&self) -> RecordPointer {
        let ptr = self.member_ptr.expect("next_member must return true before get_member");
        self.partition.record_for_key(ptr)
    }

    fn release(&mut self) {
        self.state = ReaderState::Eof;
        self.heap.clear();
        self.lookahead = None;
    }

    fn state(&self) -> ReaderState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::key_encoding::{KeyMetadata, SortSpec};
    use crate::page_pool::PagePool;
    use crate::record::{FieldType, RecordBuilder, RecordMetadata, RecordView};
    use crate::shuffle_info::GroupShuffleInfo;
    use crate::varlen::VarlenArena;

    fn build_partition_with_multiple_tables() -> GroupInputPartition {
        let pool = PagePool::new(4096);
        let record_meta = Arc::new(RecordMetadata::new(&[FieldType::Int64, FieldType::Int64]));
        let key_meta = Arc::new(KeyMetadata::new(
            &[FieldType::Int64, FieldType::Int64],
            vec![0],
            vec![SortSpec::asc()],
            true,
        ));
        // Capacity of 2 forces several pointer tables, exercising the merge.
        let info = GroupShuffleInfo::new(Arc::clone(&record_meta), key_meta);
        let mut part = GroupInputPartition::new(pool.clone(), info, 2, true);
        let mut arena = VarlenArena::new(pool);
        for (k, v) in [(3, 30), (1, 10), (2, 20), (1, 11), (2, 21), (3, 31)] {
            let mut b = RecordBuilder::new(&record_meta);
            b.set_i64(0, k);
            b.set_i64(1, v);
            let bytes = b.finish().materialize(&record_meta, &mut arena);
            part.add(&bytes, &arena).unwrap();
        }
        part.finish();
        part
    }

    #[test]
    fn merges_multiple_pointer_tables_in_order() {
        let part = build_partition_with_multiple_tables();
        assert!(part.tables().len() > 1);
        let mut reader = PriorityQueueGroupReader::new(&part, None);
        let mut groups = Vec::new();
        while reader.next_group() {
            let group_ptr = reader.get_group();
            let key_view = RecordView::new(&part.key_meta().key_meta, part.key_store().get(group_ptr));
            let group_key = key_view.get_i64(0).unwrap();
            let mut members = Vec::new();
            while reader.next_member() {
                let record_ptr = reader.get_member();
                let view = RecordView::new(part.record_meta(), part.record_store().get(record_ptr));
                members.push(view.get_i64(1).unwrap());
            }
            groups.push((group_key, members));
        }
        reader.release();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].0, 1);
        assert_eq!(groups[1].0, 2);
        assert_eq!(groups[2].0, 3);
        assert_eq!(groups[0].1.len(), 2);
    }

    #[test]
    fn matches_sorted_vector_reader_output() {
        let part = build_partition_with_multiple_tables();
        let mut pq = PriorityQueueGroupReader::new(&part, None);
        let mut sv = super::super::SortedVectorGroupReader::new(&part, None);

        let mut pq_out = Vec::new();
        while pq.next_group() {
            let mut members = Vec::new();
            while pq.next_member() {
                members.push(pq.get_member());
            }
            pq_out.push((pq.get_group(), members));
        }

        let mut sv_out = Vec::new();
        while sv.next_group() {
            let mut members = Vec::new();
            while sv.next_member() {
                members.push(sv.get_member());
            }
            sv_out.push((sv.get_group(), members));
        }

        assert_eq!(pq_out.len(), sv_out.len());
        for ((pq_group, pq_members), (sv_group, sv_members)) in pq_out.iter().zip(sv_out.iter()) {
            assert_eq!(
                part.comparator(*pq_group),
                part.comparator(*sv_group)
            );
            similar_asserts::assert_eq!(pq_members, sv_members);
        }
    }

    fn build_partition_with_skewed_group() -> GroupInputPartition {
        let pool = PagePool::new(4096);
        let record_meta = Arc::new(RecordMetadata::new(&[FieldType::Int64, FieldType::Int64]));
        let key_meta = Arc::new(KeyMetadata::new(
            &[FieldType::Int64, FieldType::Int64],
            vec![0],
            vec![SortSpec::asc()],
            true,
        ));
        let info = GroupShuffleInfo::new(Arc::clone(&record_meta), key_meta);
        let mut part = GroupInputPartition::new(pool.clone(), info, 2, true);
        let mut arena = VarlenArena::new(pool);
        for (k, v) in [(1, 10), (1, 11), (1, 12), (2, 20)] {
            let mut b = RecordBuilder::new(&record_meta);
            b.set_i64(0, k);
            b.set_i64(1, v);
            let bytes = b.finish().materialize(&record_meta, &mut arena);
            part.add(&bytes, &arena).unwrap();
        }
        part.finish();
        part
    }

    #[test]
    fn per_group_limit_discards_remaining_heap_entries() {
        let part = build_partition_with_skewed_group();
        let mut reader = PriorityQueueGroupReader::new(&part, Some(2));

        assert!(reader.next_group());
        let key_view = RecordView::new(&part.key_meta().key_meta, part.key_store().get(reader.get_group()));
        assert_eq!(key_view.get_i64(0).unwrap(), 1);
        assert!(reader.next_member());
        assert!(reader.next_member());
        assert!(!reader.next_member());

        assert!(reader.next_group());
        let key_view = RecordView::new(&part.key_meta().key_meta, part.key_store().get(reader.get_group()));
        assert_eq!(key_view.get_i64(0).unwrap(), 2);
        assert!(reader.next_member());
        assert!(!reader.next_member());

        assert!(!reader.next_group());
    }

    #[test]
    fn zero_limit_yields_no_groups() {
        let part = build_partition_with_multiple_tables();
        let mut reader = PriorityQueueGroupReader::new(&part, Some(0));
        assert!(!reader.next_group());
        assert_eq!(reader.state(), ReaderState::Eof);
    }
}
