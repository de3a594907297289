//! Consumer-side iteration over a shuffled partition.
//!
//! All three reader strategies ([`priority_queue`], [`sorted_vector`], and
//! [`aggregate`]) implement the same state machine over the same four-call
//! protocol, so callers can be written against [`GroupReader`] without caring
//! which strategy backs a given exchange.
//!
//! ```text
//! before_member --next_group--> on_member --next_member--> on_member (more members)
//!      ^                              |
//!      |                        next_member returns false
//!      |                              v
//!   eof <--next_group returns false-- after_group
//! ```

mod aggregate;
mod priority_queue;
mod sorted_vector;

pub use aggregate::AggregateMergeReader;
pub use priority_queue::PriorityQueueGroupReader;
pub use sorted_vector::SortedVectorGroupReader;

use crate::page_pool::RecordPointer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    BeforeMember,
    OnMember,
    AfterGroup,
    Eof,
}

/// Shared iteration protocol for a grouped (non-aggregate) exchange.
///
/// A typical consumption loop:
/// ```text
/// while reader.next_group() {
///     let group_key_record = reader.get_group();
///     while reader.next_member() {
///         let member_record = reader.get_member();
///         // ... consume member_record ...
///     }
/// }
/// reader.release();
/// ```
pub trait GroupReader {
    /// Advance to the first member of the next group. Returns `false` and
    /// transitions to `Eof` if no groups remain.
    fn next_group(&mut self) -> bool;

    /// The key-record pointer representing the current group. Valid only in
    /// `OnMember` or `AfterGroup` state.
    fn get_group(&self) -> RecordPointer;

    /// Advance to the next member of the current group. Returns `false`
    /// and transitions to `AfterGroup` if the group is exhausted.
    fn next_member(&mut self) -> bool;

    /// The current member's record pointer. Valid only in `OnMember` state.
    fn get_member(&self) -> RecordPointer;

    /// Release any reader-held resources. After this call the reader must
    /// not be iterated further.
    fn release(&mut self);

    fn state(&self) -> ReaderState;
}
