//! Utilities useful for testing.
//!
//! Note these aren't placed behind a `cfg(test)` annotation since they
//! should be usable outside of this crate too.

use std::sync::{Arc, Mutex};

use crate::key_encoding::{KeyMetadata, SortSpec};
use crate::page_pool::PagePool;
use crate::record::{FieldType, RecordBuilder, RecordMetadata};
use crate::varlen::VarlenArena;

/// Build record metadata for `types`, an ascending key over `key_indices`
/// (reserving a back-pointer field), and a fresh page pool all at once:
/// the trio almost every test in this crate needs to set up a partition.
pub fn int_key_schema(
    types: &[FieldType],
    key_indices: &[usize],
) -> (Arc<PagePool>, Arc<RecordMetadata>, Arc<KeyMetadata>) {
    let pool = PagePool::new(crate::page_pool::DEFAULT_PAGE_SIZE);
    let record_meta = Arc::new(RecordMetadata::new(types));
    let sort = key_indices.iter().map(|_| SortSpec::asc()).collect();
    let key_meta = Arc::new(KeyMetadata::new(types, key_indices.to_vec(), sort, true));
    (pool, record_meta, key_meta)
}

/// Materialize an `(i64, f64)` record into `arena`, for tests that don't
/// need the full `RecordBuilder` ceremony spelled out inline.
pub fn int_float_record(meta: &RecordMetadata, arena: &mut VarlenArena, key: i64, value: f64) -> Vec<u8> {
    let mut builder = RecordBuilder::new(meta);
    builder.set_i64(0, key);
    builder.set_f64(1, value);
    builder.finish().materialize(meta, arena)
}

/// A sink stand-in that just collects every record it's handed, with none
/// of the partitioning/pre-aggregation a real `Sink` does. For tests of
/// operator code that only needs something shaped like a sink to write
/// into, not the exchange's actual grouping behavior.
#[derive(Default)]
pub struct MockSink {
    records: Mutex<Vec<Vec<u8>>>,
}

impl MockSink {
    pub fn new() -> Self {
        MockSink::default()
    }

    pub fn write(&self, record_bytes: &[u8]) {
        self.records.lock().unwrap().push(record_bytes.to_vec());
    }

    pub fn into_records(self) -> Vec<Vec<u8>> {
        self.records.into_inner().unwrap()
    }
}

/// A source stand-in over a fixed, pre-supplied list of records. For tests
/// of operator code that only needs to consume records from something
/// source-shaped, without a transfer barrier or a real reader strategy.
pub struct MockSource {
    records: Vec<Vec<u8>>,
    pos: usize,
}

impl MockSource {
    pub fn new(records: Vec<Vec<u8>>) -> Self {
        MockSource { records, pos: 0 }
    }

    pub fn next(&mut self) -> Option<&[u8]> {
        let record = self.records.get(self.pos)?;
        self.pos += 1;
        Some(record)
    }

    pub fn remaining(&self) -> usize {
        self.records.len() - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_key_schema_reserves_back_pointer() {
        let (_, record_meta, key_meta) = int_key_schema(&[FieldType::Int64, FieldType::Float64], &[0]);
        assert_eq!(record_meta.num_fields(), 2);
        assert!(key_meta.has_back_pointer);
        assert_eq!(key_meta.back_pointer_field(), Some(1));
    }

    #[test]
    fn int_float_record_round_trips() {
        let (pool, record_meta, _) = int_key_schema(&[FieldType::Int64, FieldType::Float64], &[0]);
        let mut arena = VarlenArena::new(pool);
        let bytes = int_float_record(&record_meta, &mut arena, 7, 3.5);
        let view = crate::record::RecordView::new(&record_meta, &bytes);
        assert_eq!(view.get_i64(0), Some(7));
        assert_eq!(view.get_f64(1), Some(3.5));
    }

    #[test]
    fn mock_sink_collects_records_in_write_order() {
        let sink = MockSink::new();
        sink.write(&[1, 2, 3]);
        sink.write(&[4, 5]);
        assert_eq!(sink.into_records(), vec![vec![1, 2, 3], vec![4, 5]]);
    }

    #[test]
    fn mock_source_yields_records_in_order_then_none() {
        let mut source = MockSource::new(vec![vec![1], vec![2]]);
        assert_eq!(source.remaining(), 2);
        assert_eq!(source.next(), Some(&[1u8][..]));
        assert_eq!(source.next(), Some(&[2u8][..]));
        assert_eq!(source.next(), None);
        assert_eq!(source.remaining(), 0);
    }
}
