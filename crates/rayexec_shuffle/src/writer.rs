//! Per-upstream-task handle for pushing records into a [`Sink`].
//!
//! Every upstream partition gets its own `Writer`, but all writers for a
//! shuffle share the same `Sink`: the routing decision (which downstream
//! partition a record belongs to) depends only on the record's key, not on
//! which upstream task produced it, so contention is resolved inside the
//! sink's per-partition mutex rather than by the writer.

use std::sync::Arc;

use rayexec_error::Result;

use crate::sink::{AggregateSink, GroupSink};
use crate::varlen::VarlenArena;

pub struct GroupWriter {
    sink: Arc<GroupSink>,
}

impl GroupWriter {
    pub fn new(sink: Arc<GroupSink>) -> Self {
        GroupWriter { sink }
    }

    pub fn write(&self, record_bytes: &[u8], record_varlen: &VarlenArena) -> Result<()> {
        self.sink.write(record_bytes, record_varlen)
    }
}

pub struct AggregateWriter {
    sink: Arc<AggregateSink>,
}

impl AggregateWriter {
    pub fn new(sink: Arc<AggregateSink>) -> Self {
        AggregateWriter { sink }
    }

    /// `inputs` holds one projected value per aggregate function in the
    /// sink's schema, in the same order the sink was built with.
    pub fn write(&self, record_bytes: &[u8], record_varlen: &VarlenArena, inputs: &[Option<f64>]) -> Result<()> {
        self.sink.write(record_bytes, record_varlen, inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{Aggregator, SumAggregator};
    use crate::key_encoding::{KeyMetadata, SortSpec};
    use crate::page_pool::PagePool;
    use crate::record::{FieldType, RecordBuilder, RecordMetadata};

    #[test]
    fn writer_forwards_into_shared_sink() {
        let pool = PagePool::new(4096);
        let record_meta = Arc::new(RecordMetadata::new(&[FieldType::Int64, FieldType::Float64]));
        let key_meta = Arc::new(KeyMetadata::new(
            &[FieldType::Int64, FieldType::Float64],
            vec![0],
            vec![SortSpec::asc()],
            true,
        ));
        let aggs: Arc<Vec<Box<dyn Aggregator>>> = Arc::new(vec![Box::new(SumAggregator)]);
        let sink = Arc::new(AggregateSink::new(
            pool, record_meta.clone(), key_meta, aggs, 2, 4096, 8, 0.7, true,
        ));
        let w1 = AggregateWriter::new(Arc::clone(&sink));
        let w2 = AggregateWriter::new(Arc::clone(&sink));

        let scratch_pool = PagePool::new(64);
        let mut arena = VarlenArena::new(scratch_pool);
        let mut b = RecordBuilder::new(&record_meta);
        b.set_i64(0, 1);
        b.set_f64(1, 10.0);
        let bytes = b.finish().materialize(&record_meta, &mut arena);
        w1.write(&bytes, &arena, &[Some(10.0)]).unwrap();
        w2.write(&bytes, &arena, &[Some(5.0)]).unwrap();

        assert_eq!(sink.total_rows_seen(), 2);
    }
}
