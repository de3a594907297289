//! Producer-side owner of one partition's worth of `InputPartition`s.
//! A `Sink` is shared (via `Arc`) across every upstream
//! operator thread that produces input for this shuffle; each thread talks
//! to it through its own [`crate::writer::Writer`].

use std::sync::Arc;

use parking_lot::Mutex;
use rayexec_error::Result;

use crate::aggregator::Aggregator;
use crate::input_partition::{AggregateInputPartition, GroupInputPartition};
use crate::key_encoding::{self, KeyMetadata};
use crate::page_pool::PagePool;
use crate::partitioner::Partitioner;
use crate::record::{RecordMetadata, RecordView};
use crate::shuffle_info::{AggregateShuffleInfo, GroupShuffleInfo};
use crate::varlen::VarlenArena;

/// Sink for a group exchange: every partition keeps every record it's
/// handed, sorted once sealed.
pub struct GroupSink {
    pub(crate) partitions: Vec<Mutex<GroupInputPartition>>,
    pub(crate) partitioner: Partitioner,
    pub(crate) info: Arc<GroupShuffleInfo>,
    pub(crate) normalize_float: bool,
}

impl GroupSink {
    pub fn new(
        pool: Arc<PagePool>,
        record_meta: Arc<RecordMetadata>,
        key_meta: Arc<KeyMetadata>,
        num_partitions: usize,
        pointer_table_capacity: usize,
        normalize_float: bool,
    ) -> Self {
        let info = GroupShuffleInfo::new(record_meta, key_meta);
        let partitions = (0..num_partitions)
            .map(|_| {
                Mutex::new(GroupInputPartition::new(
                    Arc::clone(&pool),
                    Arc::clone(&info),
                    pointer_table_capacity,
                    normalize_float,
                ))
            })
            .collect();
        GroupSink {
            partitions,
            partitioner: Partitioner::new(num_partitions),
            info,
            normalize_float,
        }
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    pub(crate) fn write(&self, src_bytes: &[u8], src_varlen: &VarlenArena) -> Result<()> {
        let key_meta = &self.info.key_meta;
        let src_view = RecordView::new(&self.info.record_meta, src_bytes);
        let key_builder = key_encoding::extract_key(key_meta, &src_view, src_varlen);
        let key_bytes = key_builder.finish().materialize(
            &key_meta.key_meta,
            // The hash only needs the fixed+varlen bytes transiently; borrow a
            // throwaway arena scoped to this call so we don't pollute any
            // partition's storage before we know which one it's going to.
            &mut VarlenArena::new(Arc::new(PagePool::new(key_meta.key_meta.fixed_size.max(64)))),
        );
        let hash = key_encoding::hash_key(
            key_meta,
            &key_bytes,
            &VarlenArena::new(Arc::new(PagePool::new(64))),
            self.normalize_float,
        );
        let idx = self.partitioner.partition_for(hash);
        self.partitions[idx].lock().add(src_bytes, src_varlen)
    }

    /// Finalize every partition (seal and sort pointer tables). Call once
    /// all writers are done, before transfer.
    pub fn finish(&self) {
        for partition in &self.partitions {
            partition.lock().finish();
        }
    }
}

/// Sink for an aggregate exchange: pre-aggregates by key per partition.
pub struct AggregateSink {
    pub(crate) partitions: Vec<Mutex<AggregateInputPartition>>,
    pub(crate) partitioner: Partitioner,
    pub(crate) info: Arc<AggregateShuffleInfo>,
    pub(crate) normalize_float: bool,
}

impl AggregateSink {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: Arc<PagePool>,
        record_meta: Arc<RecordMetadata>,
        key_meta: Arc<KeyMetadata>,
        aggregators: Arc<Vec<Box<dyn Aggregator>>>,
        num_partitions: usize,
        page_size: usize,
        neighbourhood: usize,
        load_factor_bound: f64,
        normalize_float: bool,
    ) -> Self {
        let info = AggregateShuffleInfo::new(record_meta, key_meta, aggregators);
        let partitions = (0..num_partitions)
            .map(|_| {
                Mutex::new(AggregateInputPartition::new(
                    Arc::clone(&pool),
                    Arc::clone(&info),
                    page_size,
                    neighbourhood,
                    load_factor_bound,
                    normalize_float,
                ))
            })
            .collect();
        AggregateSink {
            partitions,
            partitioner: Partitioner::new(num_partitions),
            info,
            normalize_float,
        }
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    pub(crate) fn write(&self, src_bytes: &[u8], src_varlen: &VarlenArena, inputs: &[Option<f64>]) -> Result<()> {
        let key_meta = &self.info.key_meta;
        let src_view = RecordView::new(&self.info.record_meta, src_bytes);
        let key_builder = key_encoding::extract_key(key_meta, &src_view, src_varlen);
        let scratch_pool = Arc::new(PagePool::new(key_meta.key_meta.fixed_size.max(64)));
        let mut scratch_arena = VarlenArena::new(scratch_pool);
        let key_bytes = key_builder.finish().materialize(&key_meta.key_meta, &mut scratch_arena);
        let hash = key_encoding::hash_key(key_meta, &key_bytes, &scratch_arena, self.normalize_float);
        let idx = self.partitioner.partition_for(hash);
        self.partitions[idx].lock().add(src_bytes, src_varlen, inputs)
    }

    /// Inject the synthetic empty-input row into partition 0 if this whole
    /// sink never saw a single record and the exchange is configured for it.
    /// Only meaningful for global (no grouping column) aggregates.
    pub fn generate_record_on_empty(&self) {
        if self.info.key_meta.source_indices.is_empty() && self.partitions[0].lock().rows_seen() == 0 {
            self.partitions[0].lock().add_synthetic_empty_input();
        }
    }

    pub fn total_rows_seen(&self) -> usize {
        self.partitions.iter().map(|p| p.lock().rows_seen()).sum()
    }
}
