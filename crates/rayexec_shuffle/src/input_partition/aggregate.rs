//! Aggregate exchange input partition.
//!
//! Records are pre-aggregated by key into a [`PreAggHashTable`] as they
//! arrive. Once a table's load factor crosses the configured bound it's
//! left in place, never resized, and a fresh table takes over as the
//! active one. A partition therefore ends up owning a short list of
//! "local" hash tables rather than one big one; the aggregate merge reader
//! is what reconciles duplicate keys across them (and across partitions).

use std::sync::Arc;

use rayexec_error::Result;

use crate::aggregator::{AggregateLayout, Aggregator};
use crate::arena_store::ArenaRecordStore;
use crate::hash_table::PreAggHashTable;
use crate::key_encoding::{self, set_back_pointer, KeyMetadata};
use crate::page_pool::{PagePool, RecordPointer};
use crate::record::{RecordMetadata, RecordView};
use crate::shuffle_info::AggregateShuffleInfo;
use crate::varlen::VarlenArena;

pub struct AggregateInputPartition {
    key_store: ArenaRecordStore,
    value_store: ArenaRecordStore,
    info: Arc<AggregateShuffleInfo>,
    layout: AggregateLayout,
    tables: Vec<PreAggHashTable>,
    page_size: usize,
    neighbourhood: usize,
    load_factor_bound: f64,
    normalize_float: bool,
    rows_seen: usize,
}

impl AggregateInputPartition {
    pub fn new(
        pool: Arc<PagePool>,
        info: Arc<AggregateShuffleInfo>,
        page_size: usize,
        neighbourhood: usize,
        load_factor_bound: f64,
        normalize_float: bool,
    ) -> Self {
        assert!(
            info.key_meta.has_back_pointer,
            "aggregate key metadata must reserve a back-pointer field"
        );
        let layout = AggregateLayout::new(&info.aggregators);
        AggregateInputPartition {
            key_store: ArenaRecordStore::new(Arc::clone(&pool), info.key_meta.key_meta.fixed_size, 8),
            value_store: ArenaRecordStore::new(Arc::clone(&pool), layout.total_size.max(1), 8),
            info,
            layout,
            tables: vec![PreAggHashTable::for_page(page_size, neighbourhood)],
            page_size,
            neighbourhood,
            load_factor_bound,
            normalize_float,
            rows_seen: 0,
        }
    }

    pub fn rows_seen(&self) -> usize {
        self.rows_seen
    }

    fn init_value_bytes(&self, inputs: &[Option<f64>]) -> Vec<u8> {
        let mut bytes = vec![0u8; self.layout.total_size.max(1)];
        for (i, agg) in self.info.aggregators.iter().enumerate() {
            let (start, end) = (self.layout.offsets[i], self.layout.offsets[i] + agg.state_size());
            agg.init_state(&mut bytes[start..end]);
            agg.accumulate(&mut bytes[start..end], inputs[i]);
        }
        bytes
    }

    fn accumulate_value(&self, bytes: &mut [u8], inputs: &[Option<f64>]) {
        for (i, agg) in self.info.aggregators.iter().enumerate() {
            let (start, end) = (self.layout.offsets[i], self.layout.offsets[i] + agg.state_size());
            agg.accumulate(&mut bytes[start..end], inputs[i]);
        }
    }

    fn insert_new_key(&mut self, mut key_bytes: Vec<u8>, hash: u64, inputs: &[Option<f64>]) {
        let value_bytes = self.init_value_bytes(inputs);
        let value_ptr = self.value_store.append(&value_bytes);
        set_back_pointer(&self.info.key_meta, &mut key_bytes, value_ptr);
        let key_ptr = self.key_store.append(&key_bytes);

        let active = self.tables.last_mut().unwrap();
        active.insert(hash, key_ptr, value_ptr);
        if active.load_factor() >= self.load_factor_bound {
            self.tables
                .push(PreAggHashTable::for_page(self.page_size, self.neighbourhood));
        }
    }

    fn add_keyed(&mut self, key_bytes: Vec<u8>, comparable: &[u8], hash: u64, inputs: &[Option<f64>]) {
        let key_store = &self.key_store;
        let normalize = self.normalize_float;
        let key_meta = &self.info.key_meta;
        let found = self.tables.last().unwrap().lookup(hash, |candidate| {
            let candidate_bytes = key_store.get(candidate);
            let candidate_comparable =
                key_encoding::encode_comparable(key_meta, candidate_bytes, key_store.varlen(), normalize);
            candidate_comparable == comparable
        });

        match found {
            Some((_, value_ptr)) => {
                let bytes = self.value_store.get_mut(value_ptr);
                self.accumulate_value(bytes, inputs);
            }
            None => self.insert_new_key(key_bytes, hash, inputs),
        }
    }

    /// Fold one input record into the partition's pre-aggregation state.
    /// `inputs` holds one value per aggregator, already projected out of
    /// the source record (`None` for SQL NULL).
    pub fn add(&mut self, src_bytes: &[u8], src_varlen: &VarlenArena, inputs: &[Option<f64>]) -> Result<()> {
        assert_eq!(inputs.len(), self.info.aggregators.len());
        self.rows_seen += 1;

        let src_view = RecordView::new(&self.info.record_meta, src_bytes);
        let key_builder = key_encoding::extract_key(&self.info.key_meta, &src_view, src_varlen);
        let key_bytes = key_builder
            .finish()
            .materialize(&self.info.key_meta.key_meta, self.key_store.varlen_mut());
        let comparable = key_encoding::encode_comparable(
            &self.info.key_meta,
            &key_bytes,
            self.key_store.varlen(),
            self.normalize_float,
        );
        let hash =
            key_encoding::hash_key(&self.info.key_meta, &key_bytes, self.key_store.varlen(), self.normalize_float);

        self.add_keyed(key_bytes, &comparable, hash, inputs);
        Ok(())
    }

    /// Emit a single row with every aggregator fed a null input, for a
    /// global (no grouping columns) aggregate whose upstream partition
    /// produced no rows. Must only be called when this partition is
    /// otherwise empty.
    pub fn add_synthetic_empty_input(&mut self) {
        assert!(
            self.info.key_meta.source_indices.is_empty(),
            "synthetic empty-input rows only apply to global aggregates"
        );
        assert_eq!(self.rows_seen, 0);
        let inputs = vec![None; self.info.aggregators.len()];
        let key_bytes = vec![0u8; self.info.key_meta.key_meta.fixed_size];
        let hash =
            key_encoding::hash_key(&self.info.key_meta, &key_bytes, self.key_store.varlen(), self.normalize_float);
        self.insert_new_key(key_bytes, hash, &inputs);
    }

    pub fn tables(&self) -> &[PreAggHashTable] {
        &self.tables
    }

    pub fn tables_mut(&mut self) -> &mut [PreAggHashTable] {
        &mut self.tables
    }

    pub fn key_store(&self) -> &ArenaRecordStore {
        &self.key_store
    }

    pub fn value_store(&self) -> &ArenaRecordStore {
        &self.value_store
    }

    pub fn value_store_mut(&mut self) -> &mut ArenaRecordStore {
        &mut self.value_store
    }

    pub fn key_meta(&self) -> &KeyMetadata {
        &self.info.key_meta
    }

    pub fn aggregators(&self) -> &[Box<dyn Aggregator>] {
        &self.info.aggregators
    }

    pub fn layout(&self) -> &AggregateLayout {
        &self.layout
    }

    pub fn key_ptr_value(&self, key_ptr: RecordPointer) -> RecordPointer {
        let view = RecordView::new(&self.info.key_meta.key_meta, self.key_store.get(key_ptr));
        view.get_pointer(self.info.back_pointer_field())
    }

    /// Reconcile duplicate keys spread across this partition's local hash
    /// tables: walk tables in flush order, and for each surviving
    /// entry, look it up by its precomputed hash in every later table,
    /// folding a match's accumulator in and erasing it. A later table's own
    /// turn then only ever sees the entries nothing earlier already
    /// absorbed, so every key appears exactly once in the result.
    pub fn merge_tables(&mut self) -> Vec<(RecordPointer, RecordPointer)> {
        let num_tables = self.tables.len();
        let mut results = Vec::with_capacity(self.len_hint());

        for i in 0..num_tables {
            let entries: Vec<(u64, RecordPointer, RecordPointer)> = self.tables[i].iter().collect();
            for (hash, key_ptr, value_ptr) in entries {
                let key_bytes = self.key_store.get(key_ptr).to_vec();
                let comparator = key_encoding::encode_comparable(
                    &self.info.key_meta,
                    &key_bytes,
                    self.key_store.varlen(),
                    self.normalize_float,
                );

                for j in (i + 1)..num_tables {
                    let key_store = &self.key_store;
                    let key_meta = &self.info.key_meta;
                    let normalize_float = self.normalize_float;
                    let found = self.tables[j].remove_if(hash, |candidate| {
                        let candidate_bytes = key_store.get(candidate);
                        let candidate_comparable = key_encoding::encode_comparable(
                            key_meta,
                            candidate_bytes,
                            key_store.varlen(),
                            normalize_float,
                        );
                        candidate_comparable == comparator
                    });
                    if let Some((_, peer_value_ptr)) = found {
                        let peer_bytes = self.value_store.get(peer_value_ptr).to_vec();
                        let bytes = self.value_store.get_mut(value_ptr);
                        for (a, agg) in self.info.aggregators.iter().enumerate() {
                            let (s, e) = (self.layout.offsets[a], self.layout.offsets[a] + agg.state_size());
                            agg.merge(&mut bytes[s..e], &peer_bytes[s..e]);
                        }
                    }
                }

                results.push((key_ptr, value_ptr));
            }
        }

        results
    }

    fn len_hint(&self) -> usize {
        self.tables.iter().map(|t| t.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::SumAggregator;
    use crate::key_encoding::SortSpec;
    use crate::record::{FieldType, RecordBuilder};

    fn setup() -> (AggregateInputPartition, Arc<RecordMetadata>, Arc<PagePool>) {
        let pool = PagePool::new(4096);
        let record_meta = Arc::new(RecordMetadata::new(&[FieldType::Int64, FieldType::Float64]));
        let key_meta = Arc::new(KeyMetadata::new(
            &[FieldType::Int64, FieldType::Float64],
            vec![0],
            vec![SortSpec::asc()],
            true,
        ));
        let aggs: Arc<Vec<Box<dyn Aggregator>>> = Arc::new(vec![Box::new(SumAggregator)]);
        let info = AggregateShuffleInfo::new(Arc::clone(&record_meta), key_meta, aggs);
        let part = AggregateInputPartition::new(Arc::clone(&pool), info, 4096, 8, 0.7, true);
        (part, record_meta, pool)
    }

    fn push_row(
        part: &mut AggregateInputPartition,
        record_meta: &RecordMetadata,
        src_arena: &mut VarlenArena,
        group_key: i64,
        value: f64,
    ) {
        let mut b = RecordBuilder::new(record_meta);
        b.set_i64(0, group_key);
        b.set_f64(1, value);
        let bytes = b.finish().materialize(record_meta, src_arena);
        part.add(&bytes, src_arena, &[Some(value)]).unwrap();
    }

    #[test]
    fn repeated_keys_merge_into_one_entry() {
        let (mut part, record_meta, pool) = setup();
        let mut src_arena = VarlenArena::new(pool);
        push_row(&mut part, &record_meta, &mut src_arena, 1, 10.0);
        push_row(&mut part, &record_meta, &mut src_arena, 1, 20.0);
        push_row(&mut part, &record_meta, &mut src_arena, 2, 5.0);

        assert_eq!(part.rows_seen(), 3);
        let total_entries: usize = part.tables().iter().map(|t| t.len()).sum();
        assert_eq!(total_entries, 2);

        let sum = SumAggregator;
        let mut found_30 = false;
        for table in part.tables() {
            for (_, _, value_ptr) in table.iter() {
                let bytes = part.value_store().get(value_ptr);
                if sum.finalize(bytes) == Some(30.0) {
                    found_30 = true;
                }
            }
        }
        assert!(found_30);
    }

    #[test]
    fn merge_tables_reconciles_keys_split_across_flushes() {
        let pool = PagePool::new(4096);
        let record_meta = Arc::new(RecordMetadata::new(&[FieldType::Int64, FieldType::Float64]));
        let key_meta = Arc::new(KeyMetadata::new(
            &[FieldType::Int64, FieldType::Float64],
            vec![0],
            vec![SortSpec::asc()],
            true,
        ));
        let aggs: Arc<Vec<Box<dyn Aggregator>>> = Arc::new(vec![Box::new(SumAggregator)]);
        // Tiny capacity/low load factor bound forces frequent flushes so the
        // same key ends up in more than one local table.
        let info = AggregateShuffleInfo::new(Arc::clone(&record_meta), key_meta, aggs);
        let mut part = AggregateInputPartition::new(Arc::clone(&pool), info, 256, 4, 0.5, true);
        let mut src_arena = VarlenArena::new(pool);
        for (k, v) in [(1, 1.0), (2, 2.0), (1, 3.0), (3, 4.0), (1, 5.0), (2, 6.0)] {
            push_row(&mut part, &record_meta, &mut src_arena, k, v);
        }
        assert!(part.tables().len() > 1, "test should force multiple local tables");

        let merged = part.merge_tables();
        assert_eq!(merged.len(), 3);

        let sum = SumAggregator;
        let mut totals = Vec::new();
        for (key_ptr, value_ptr) in &merged {
            let key_view = RecordView::new(&part.key_meta().key_meta, part.key_store().get(*key_ptr));
            let k = key_view.get_i64(0).unwrap();
            let total = sum.finalize(part.value_store().get(*value_ptr)).unwrap();
            totals.push((k, total));
        }
        totals.sort_by_key(|(k, _)| *k);
        similar_asserts::assert_eq!(totals, vec![(1, 9.0), (2, 8.0), (3, 4.0)]);
    }

    #[test]
    fn synthetic_empty_input_produces_one_global_row() {
        let pool = PagePool::new(4096);
        let record_meta = Arc::new(RecordMetadata::new(&[FieldType::Float64]));
        let key_meta = Arc::new(KeyMetadata::new(&[], vec![], vec![], true));
        let aggs: Arc<Vec<Box<dyn Aggregator>>> =
            Arc::new(vec![Box::new(crate::aggregator::CountAggregator)]);
        let info = AggregateShuffleInfo::new(record_meta, key_meta, aggs);
        let mut part = AggregateInputPartition::new(Arc::clone(&pool), info, 4096, 8, 0.7, true);
        part.add_synthetic_empty_input();
        let total: usize = part.tables().iter().map(|t| t.len()).sum();
        assert_eq!(total, 1);
        let count_agg = crate::aggregator::CountAggregator;
        for table in part.tables() {
            for (_, _, value_ptr) in table.iter() {
                assert_eq!(count_agg.finalize(part.value_store().get(value_ptr)), Some(0.0));
            }
        }
    }
}
