//! Aggregate merge reader. Unlike the group readers, an aggregate
//! partition has already been reduced to at most one row per key by the
//! time it reaches a reader ([`AggregateInputPartition::merge_tables`] does
//! the cross-table reconciliation), so this reader's groups are trivial:
//! each merged row is its own group with exactly one member.

use crate::input_partition::AggregateInputPartition;
use crate::page_pool::RecordPointer;

use super::{GroupReader, ReaderState};

pub struct AggregateMergeReader<'a> {
    partition: &'a AggregateInputPartition,
    rows: Vec<(RecordPointer, RecordPointer)>,
    pos: Option<usize>,
    state: ReaderState,
}

impl<'a> AggregateMergeReader<'a> {
    /// Takes `&mut` only long enough to perform the merge; the reader
    /// itself borrows the partition immutably afterward. Since key/value
    /// stores are not mutated by reading, this is safe to hand to a single
    /// consumer.
    pub fn new(partition: &'a mut AggregateInputPartition) -> Self {
        let rows = partition.merge_tables();
        AggregateMergeReader {
            partition,
            rows,
            pos: None,
            state: ReaderState::AfterGroup,
        }
    }

    pub fn partition(&self) -> &AggregateInputPartition {
        self.partition
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<'a> GroupReader for AggregateMergeReader<'a> {
    /// Advance to the next merged row, treating it as a fresh group.
    fn next_group(&mut self) -> bool {
        if self.state == ReaderState::Eof {
            return false;
        }
        let next_pos = match self.pos {
            Some(p) => p + 1,
            None => 0,
        };
        if next_pos >= self.rows.len() {
            self.state = ReaderState::Eof;
            return false;
        }
        self.pos = Some(next_pos);
        self.state = ReaderState::BeforeMember;
        true
    }

    /// The current row's key pointer. Valid only in `OnMember` or
    /// `AfterGroup` state.
    fn get_group(&self) -> RecordPointer {
        let idx = self.pos.expect("next_group must be called before get_group");
        self.rows[idx].0
    }

    /// Returns `true` exactly once per group, since an aggregate's merged
    /// output has exactly one row per key.
    fn next_member(&mut self) -> bool {
        match self.state {
            ReaderState::BeforeMember => {
                self.state = ReaderState::OnMember;
                true
            }
            ReaderState::OnMember => {
                self.state = ReaderState::AfterGroup;
                false
            }
            _ => false,
        }
    }

    /// The current row's value pointer. Valid only in `OnMember` state.
    fn get_member(&self) -> RecordPointer {
        assert_eq!(self.state, ReaderState::OnMember);
        let idx = self.pos.expect("next_member must return true before get_member");
        self.rows[idx].1
    }

    fn release(&mut self) {
        self.state = ReaderState::Eof;
        self.rows.clear();
    }

    fn state(&self) -> ReaderState {
        self.state
    }
}
