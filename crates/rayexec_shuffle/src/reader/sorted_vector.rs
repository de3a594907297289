//! Sorted-vector group reader: flatten every sealed pointer table
//! into one vector, sort it once by comparator bytes, then walk it
//! sequentially. Trades reader-side memory (one `Vec` holding every
//! pointer) for a simpler, allocation-light merge step than the
//! priority-queue reader.

use crate::input_partition::GroupInputPartition;
use crate::page_pool::RecordPointer;

use super::{GroupReader, ReaderState};

pub struct SortedVectorGroupReader<'a> {
    partition: &'a GroupInputPartition,
    entries: Vec<RecordPointer>,
    group_start: usize,
    group_end: usize,
    member_idx: usize,
    current_member_idx: usize,
    state: ReaderState,
    limit: Option<usize>,
    member_count: usize,
}

impl<'a> SortedVectorGroupReader<'a> {
    /// `limit` bounds how many members `next_member` yields per group before
    /// it starts returning `false`; `None` is unbounded, `Some(0)` means no
    /// group is ever yielded at all.
    pub fn new(partition: &'a GroupInputPartition, limit: Option<usize>) -> Self {
        let mut entries: Vec<RecordPointer> = partition
            .tables()
            .iter()
            .flat_map(|t| t.iter().copied())
            .collect();
        entries.sort_by(|a, b| partition.comparator(*a).cmp(partition.comparator(*b)));
        SortedVectorGroupReader {
            partition,
            entries,
            group_start: 0,
            group_end: 0,
            member_idx: 0,
            current_member_idx: 0,
            state: ReaderState::BeforeMember,
            limit,
            member_count: 0,
        }
    }
}

impl<'a> GroupReader for SortedVectorGroupReader<'a> {
    fn next_group(&mut self) -> bool {
        if self.state == ReaderState::Eof {
            return false;
        }
        if self.limit == Some(0) {
            self.state = ReaderState::Eof;
            return false;
        }
        let start = self.group_end;
        if start >= self.entries.len() {
            self.state = ReaderState::Eof;
            return false;
        }
        let group_cmp = self.partition.comparator(self.entries[start]);
        let mut end = start + 1;
        while end < self.entries.len() && self.partition.comparator(self.entries[end]) == group_cmp {
            end += 1;
        }
        self.group_start = start;
        self.group_end = end;
        self.member_idx = start;
        self.member_count = 0;
        self.state = ReaderState::BeforeMember;
        true
    }

    fn get_group(&self) -> RecordPointer {
        assert_ne!(self.state, ReaderState::Eof);
        self.entries[self.group_start]
    }

    fn next_member(&mut self) -> bool {
        if matches!(self.state, ReaderState::AfterGroup | ReaderState::Eof) {
            return false;
        }
        if let Some(limit) = self.limit {
            if self.member_count >= limit {
                // Discard the rest of this group: `next_group` resumes its
                // scan from `group_end`, which was already computed above.
                self.member_idx = self.group_end;
                self.state = ReaderState::AfterGroup;
                return false;
            }
        }
        if self.member_idx >= self.group_end {
            self.state = ReaderState::AfterGroup;
            return false;
        }
        self.current_member_idx = self.member_idx;
        self.member_idx += 1;
        self.member_count += 1;
        self.state = ReaderState::OnMember;
        true
    }

    fn get_member(&self) -> RecordPointer {
        assert_eq!(self.state, ReaderState::OnMember);
        self.partition.record_for_key(self.entries[self.current_member_idx])
    }

    fn release(&mut self) {
        self.state = ReaderState::Eof;
        self.entries.clear();
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

    fn build_partition() -> GroupInputPartition {
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
        for (k, v) in [(1, 10), (2, 20), (1, 11), (3, 30), (2, 21)] {
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
    fn groups_and_members_in_sorted_key_order() {
        let part = build_partition();
        let mut reader = SortedVectorGroupReader::new(&part, None);
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
        assert_eq!(
            groups,
            vec![(1, vec![10, 11]), (2, vec![20, 21]), (3, vec![30])]
        );
    }

    #[test]
    fn per_group_limit_discards_extra_members() {
        let part = build_partition();
        let mut reader = SortedVectorGroupReader::new(&part, Some(1));
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
        assert_eq!(
            groups,
            vec![(1, vec![10]), (2, vec![20]), (3, vec![30])]
        );
    }

    #[test]
    fn zero_limit_yields_no_groups() {
        let part = build_partition();
        let mut reader = SortedVectorGroupReader::new(&part, Some(0));
        assert!(!reader.next_group());
        assert_eq!(reader.state(), ReaderState::Eof);
    }
}
