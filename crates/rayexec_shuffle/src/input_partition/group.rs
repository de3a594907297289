//! Group exchange input partition: every record is kept, pointers to its
//! extracted key are appended to a sequence of [`PointerTable`]s, and those
//! tables are sorted once sealed. No aggregation happens on the sink side;
//! the group-by reduction is the consumer's problem.

use std::collections::HashMap;
use std::sync::Arc;

use rayexec_error::Result;

use crate::arena_store::ArenaRecordStore;
use crate::key_encoding::{self, set_back_pointer, KeyMetadata};
use crate::page_pool::{PagePool, RecordPointer};
use crate::pointer_table::PointerTable;
use crate::record::{self, RecordMetadata, RecordView};
use crate::shuffle_info::GroupShuffleInfo;
use crate::varlen::VarlenArena;

pub struct GroupInputPartition {
    key_store: ArenaRecordStore,
    record_store: ArenaRecordStore,
    info: Arc<GroupShuffleInfo>,
    comparator_cache: HashMap<RecordPointer, Vec<u8>>,
    tables: Vec<PointerTable>,
    capacity: usize,
    normalize_float: bool,
    rows_seen: usize,
}

impl GroupInputPartition {
    pub fn new(
        pool: Arc<PagePool>,
        info: Arc<GroupShuffleInfo>,
        pointer_table_capacity: usize,
        normalize_float: bool,
    ) -> Self {
        assert!(
            info.key_meta.has_back_pointer,
            "group key metadata must reserve a back-pointer field"
        );
        GroupInputPartition {
            key_store: ArenaRecordStore::new(Arc::clone(&pool), info.key_meta.key_meta.fixed_size, 8),
            record_store: ArenaRecordStore::new(pool, info.record_meta.fixed_size, 8),
            info,
            comparator_cache: HashMap::new(),
            tables: vec![PointerTable::new(pointer_table_capacity)],
            capacity: pointer_table_capacity,
            normalize_float,
            rows_seen: 0,
        }
    }

    pub fn rows_seen(&self) -> usize {
        self.rows_seen
    }

    /// Append one input record, identified by its fixed bytes plus the
    /// varlen arena those bytes reference.
    pub fn add(&mut self, src_bytes: &[u8], src_varlen: &VarlenArena) -> Result<()> {
        self.rows_seen += 1;

        let src_view = RecordView::new(&self.info.record_meta, src_bytes);
        let key_builder = key_encoding::extract_key(&self.info.key_meta, &src_view, src_varlen);
        let mut key_bytes = key_builder
            .finish()
            .materialize(&self.info.key_meta.key_meta, self.key_store.varlen_mut());

        let record_fixed = record::copy_record(
            &self.info.record_meta,
            src_bytes,
            src_varlen,
            self.record_store.varlen_mut(),
        );
        let record_ptr = self.record_store.append(&record_fixed);

        set_back_pointer(&self.info.key_meta, &mut key_bytes, record_ptr);
        let comparable = key_encoding::encode_comparable(
            &self.info.key_meta,
            &key_bytes,
            self.key_store.varlen(),
            self.normalize_float,
        );
        let key_ptr = self.key_store.append(&key_bytes);
        self.comparator_cache.insert(key_ptr, comparable);

        if !self.tables.last_mut().unwrap().push(key_ptr) {
            self.tables.last_mut().unwrap().seal();
            let mut table = PointerTable::new(self.capacity);
            table.push(key_ptr);
            self.tables.push(table);
        }

        Ok(())
    }

    /// Seal every pointer table and sort each by comparator bytes. Must be
    /// called once before the partition is handed to a reader.
    pub fn finish(&mut self) {
        let cache = &self.comparator_cache;
        for table in &mut self.tables {
            if !table.is_sealed() {
                table.seal();
            }
            table.sort_by(|a, b| cache[a].cmp(&cache[b]));
        }
    }

    pub fn tables(&self) -> &[PointerTable] {
        &self.tables
    }

    pub fn key_store(&self) -> &ArenaRecordStore {
        &self.key_store
    }

    pub fn record_store(&self) -> &ArenaRecordStore {
        &self.record_store
    }

    pub fn record_meta(&self) -> &RecordMetadata {
        &self.info.record_meta
    }

    pub fn key_meta(&self) -> &KeyMetadata {
        &self.info.key_meta
    }

    pub fn comparator(&self, key_ptr: RecordPointer) -> &[u8] {
        &self.comparator_cache[&key_ptr]
    }

    /// Resolve a key pointer's back-pointer field to the original record.
    pub fn record_for_key(&self, key_ptr: RecordPointer) -> RecordPointer {
        let view = RecordView::new(&self.info.key_meta.key_meta, self.key_store.get(key_ptr));
        view.get_pointer(self.info.key_meta.back_pointer_field().unwrap())
    }
}
