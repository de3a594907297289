//! Precomputed, per-exchange layout metadata.
//!
//! `GroupShuffleInfo`/`AggregateShuffleInfo` bundle the record metadata, key
//! metadata, and (for aggregates) the aggregator list that every partition of
//! one exchange shares. A `Flow` computes one of these once, at
//! `setup_partitions` time, and hands out `Arc` clones to the sink, source,
//! and every `InputPartition`, rather than passing the loose pieces
//! separately to each.

use std::sync::Arc;

use crate::aggregator::Aggregator;
use crate::key_encoding::KeyMetadata;
use crate::record::RecordMetadata;

/// Shared layout metadata for a group exchange.
pub struct GroupShuffleInfo {
    pub record_meta: Arc<RecordMetadata>,
    pub key_meta: Arc<KeyMetadata>,
}

impl GroupShuffleInfo {
    pub fn new(record_meta: Arc<RecordMetadata>, key_meta: Arc<KeyMetadata>) -> Arc<Self> {
        Arc::new(GroupShuffleInfo { record_meta, key_meta })
    }
}

/// Shared layout metadata for an aggregate exchange.
pub struct AggregateShuffleInfo {
    pub record_meta: Arc<RecordMetadata>,
    pub key_meta: Arc<KeyMetadata>,
    pub aggregators: Arc<Vec<Box<dyn Aggregator>>>,
}

impl AggregateShuffleInfo {
    pub fn new(
        record_meta: Arc<RecordMetadata>,
        key_meta: Arc<KeyMetadata>,
        aggregators: Arc<Vec<Box<dyn Aggregator>>>,
    ) -> Arc<Self> {
        Arc::new(AggregateShuffleInfo {
            record_meta,
            key_meta,
            aggregators,
        })
    }

    /// Offset of the trailing back-pointer field in a key record, shared by
    /// every reader and partition so it's computed exactly once.
    pub fn back_pointer_field(&self) -> usize {
        self.key_meta
            .back_pointer_field()
            .expect("aggregate key metadata must reserve a back-pointer field")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::SumAggregator;
    use crate::key_encoding::SortSpec;
    use crate::record::FieldType;

    #[test]
    fn group_info_shares_one_arc_across_clones() {
        let record_meta = Arc::new(RecordMetadata::new(&[FieldType::Int64]));
        let key_meta = Arc::new(KeyMetadata::new(&[FieldType::Int64], vec![0], vec![SortSpec::asc()], true));
        let info = GroupShuffleInfo::new(record_meta, key_meta);
        let other = Arc::clone(&info);
        assert!(Arc::ptr_eq(&info, &other));
    }

    #[test]
    fn aggregate_info_exposes_back_pointer_field() {
        let record_meta = Arc::new(RecordMetadata::new(&[FieldType::Int64, FieldType::Float64]));
        let key_meta = Arc::new(KeyMetadata::new(
            &[FieldType::Int64, FieldType::Float64],
            vec![0],
            vec![SortSpec::asc()],
            true,
        ));
        let aggs: Arc<Vec<Box<dyn Aggregator>>> = Arc::new(vec![Box::new(SumAggregator)]);
        let info = AggregateShuffleInfo::new(record_meta, key_meta, aggs);
        assert_eq!(info.back_pointer_field(), key_meta_back_pointer(&info));
    }

    fn key_meta_back_pointer(info: &AggregateShuffleInfo) -> usize {
        info.key_meta.back_pointer_field().unwrap()
    }
}
