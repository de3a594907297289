//! Consumer-facing handle over a transferred partition.
//!
//! A `Source` owns the partition produced by [`crate::flow`]'s `transfer`
//! and hands out a reader over it. Group sources pick between the two
//! `GroupReader` strategies based on [`ShuffleConfig::use_sorted_vector`];
//! aggregate sources only ever have one reader shape. Only one reader may
//! be live at a time: `acquire_reader` errors rather than panicking if one
//! is already checked out, since that's a planner-side wiring mistake
//! (two consumer tasks on one source), not an internal invariant
//! violation.

use std::sync::atomic::{AtomicBool, Ordering};

use rayexec_error::{rayexec_bail, Result};

use crate::config::ShuffleConfig;
use crate::input_partition::{AggregateInputPartition, GroupInputPartition};
use crate::reader::{AggregateMergeReader, GroupReader, PriorityQueueGroupReader, SortedVectorGroupReader};

pub struct GroupSource {
    partition: GroupInputPartition,
    use_sorted_vector: bool,
    per_group_limit: Option<usize>,
    reader_live: AtomicBool,
}

impl GroupSource {
    pub fn new(partition: GroupInputPartition, config: &ShuffleConfig) -> Self {
        GroupSource {
            partition,
            use_sorted_vector: config.use_sorted_vector,
            per_group_limit: config.per_group_limit,
            reader_live: AtomicBool::new(false),
        }
    }

    /// Check out a reader over this partition. Fails if one is already
    /// live; call [`Self::release_reader`] once the returned reader is
    /// dropped before acquiring another.
    pub fn acquire_reader(&self) -> Result<Box<dyn GroupReader + '_>> {
        if self.reader_live.swap(true, Ordering::AcqRel) {
            rayexec_bail!("a reader is already live for this source");
        }
        if self.use_sorted_vector {
            Ok(Box::new(SortedVectorGroupReader::new(&self.partition, self.per_group_limit)))
        } else {
            Ok(Box::new(PriorityQueueGroupReader::new(&self.partition, self.per_group_limit)))
        }
    }

    /// Mark the checked-out reader as no longer live. Must be called after
    /// the reader returned by `acquire_reader` is dropped and `release()`d.
    pub fn release_reader(&self) {
        self.reader_live.store(false, Ordering::Release);
    }

    pub fn partition(&self) -> &GroupInputPartition {
        &self.partition
    }
}

pub struct AggregateSource {
    partition: AggregateInputPartition,
    reader_live: bool,
}

impl AggregateSource {
    pub fn new(partition: AggregateInputPartition) -> Self {
        AggregateSource {
            partition,
            reader_live: false,
        }
    }

    /// Merge every local hash table and return a cursor over the result.
    /// Mutates the underlying partition (via `merge_tables`), so this can
    /// only succeed once.
    pub fn acquire_reader(&mut self) -> Result<AggregateMergeReader<'_>> {
        if self.reader_live {
            rayexec_bail!("a reader is already live for this source");
        }
        self.reader_live = true;
        Ok(AggregateMergeReader::new(&mut self.partition))
    }

    pub fn partition(&self) -> &AggregateInputPartition {
        &self.partition
    }
}
