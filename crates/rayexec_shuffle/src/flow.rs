//! Lifecycle state machine shared by group and aggregate exchanges.
//!
//! ```text
//! created -> partitions_set_up -> writing -> transferred -> reading
//! ```
//!
//! `transfer` is the one-shot barrier between the producer and consumer
//! halves: it finalizes every sink partition and moves ownership of each
//! one into the matching source slot. There's no step back from
//! `reading`; a `Flow` is used once per shuffle.

use std::sync::Arc;

use rayexec_error::{rayexec_bail, Result};

use crate::aggregator::Aggregator;
use crate::config::ShuffleConfig;
use crate::input_partition::{AggregateInputPartition, GroupInputPartition};
use crate::key_encoding::KeyMetadata;
use crate::page_pool::PagePool;
use crate::record::RecordMetadata;
use crate::sink::{AggregateSink, GroupSink};
use crate::writer::{AggregateWriter, GroupWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Created,
    PartitionsSetUp,
    Writing,
    Transferred,
    Reading,
}

pub struct GroupFlow {
    config: ShuffleConfig,
    sink: Option<Arc<GroupSink>>,
    sources: Vec<Option<GroupInputPartition>>,
    state: FlowState,
}

impl GroupFlow {
    pub fn new(config: ShuffleConfig) -> Self {
        GroupFlow {
            config,
            sink: None,
            sources: Vec::new(),
            state: FlowState::Created,
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn setup_partitions(
        &mut self,
        pool: Arc<PagePool>,
        record_meta: Arc<RecordMetadata>,
        key_meta: Arc<KeyMetadata>,
        num_downstream: usize,
    ) -> Result<()> {
        if self.state != FlowState::Created {
            rayexec_bail!("partitions can only be set up once, from the created state");
        }
        let capacity = self.config.pointer_table_capacity(8);
        self.sink = Some(Arc::new(GroupSink::new(
            pool,
            record_meta,
            key_meta,
            num_downstream,
            capacity,
            self.config.normalize_float,
        )));
        self.sources = (0..num_downstream).map(|_| None).collect();
        self.state = FlowState::PartitionsSetUp;
        Ok(())
    }

    /// Hand out a writer for one upstream task. Any number of writers may
    /// be created for a sink before `transfer` is called.
    pub fn writer(&mut self) -> Result<GroupWriter> {
        match self.state {
            FlowState::PartitionsSetUp | FlowState::Writing => {
                self.state = FlowState::Writing;
                Ok(GroupWriter::new(Arc::clone(self.sink.as_ref().unwrap())))
            }
            _ => rayexec_bail!("cannot create a writer outside partitions_set_up/writing"),
        }
    }

    /// One-shot transfer: seal and sort every sink partition, then move
    /// each one into its matching source slot.
    pub fn transfer(&mut self) -> Result<()> {
        if !matches!(self.state, FlowState::PartitionsSetUp | FlowState::Writing) {
            rayexec_bail!("transfer requires partitions_set_up or writing state");
        }
        let sink = self.sink.take().expect("partitions_set_up guarantees a sink exists");
        sink.finish();
        let sink = Arc::try_unwrap(sink).unwrap_or_else(|_| {
            panic!("transfer called while a writer still holds a reference to the sink")
        });

        let num_downstream = self.sources.len();
        assert!(sink.partitions.len() <= self.sources.len());
        for (idx, partition) in sink.partitions.into_iter().enumerate().take(num_downstream) {
            self.sources[idx] = Some(partition.into_inner());
        }

        self.state = FlowState::Transferred;
        Ok(())
    }

    /// Take ownership of one downstream partition's finalized data. Each
    /// index can only be read once.
    pub fn take_source(&mut self, idx: usize) -> Result<GroupInputPartition> {
        if !matches!(self.state, FlowState::Transferred | FlowState::Reading) {
            rayexec_bail!("take_source requires the transferred state");
        }
        self.state = FlowState::Reading;
        self.sources[idx]
            .take()
            .ok_or_else(|| rayexec_error::rayexec_error!("partition {idx} was already taken"))
    }
}

pub struct AggregateFlow {
    config: ShuffleConfig,
    sink: Option<Arc<AggregateSink>>,
    sources: Vec<Option<AggregateInputPartition>>,
    state: FlowState,
}

impl AggregateFlow {
    pub fn new(config: ShuffleConfig) -> Self {
        AggregateFlow {
            config,
            sink: None,
            sources: Vec::new(),
            state: FlowState::Created,
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    #[allow(clippy::too_many_arguments)]
    pub fn setup_partitions(
        &mut self,
        pool: Arc<PagePool>,
        record_meta: Arc<RecordMetadata>,
        key_meta: Arc<KeyMetadata>,
        aggregators: Arc<Vec<Box<dyn Aggregator>>>,
        num_downstream: usize,
    ) -> Result<()> {
        if self.state != FlowState::Created {
            rayexec_bail!("partitions can only be set up once, from the created state");
        }
        self.sink = Some(Arc::new(AggregateSink::new(
            pool,
            record_meta,
            key_meta,
            aggregators,
            num_downstream,
            self.config.page_size,
            self.config.preagg_neighbourhood,
            self.config.preagg_load_factor,
            self.config.normalize_float,
        )));
        self.sources = (0..num_downstream).map(|_| None).collect();
        self.state = FlowState::PartitionsSetUp;
        Ok(())
    }

    pub fn writer(&mut self) -> Result<AggregateWriter> {
        match self.state {
            FlowState::PartitionsSetUp | FlowState::Writing => {
                self.state = FlowState::Writing;
                Ok(AggregateWriter::new(Arc::clone(self.sink.as_ref().unwrap())))
            }
            _ => rayexec_bail!("cannot create a writer outside partitions_set_up/writing"),
        }
    }

    /// One-shot transfer. `upstream_ok` reflects whether every upstream
    /// partition completed without error; the synthetic empty-input row is
    /// only injected when that's true, even if `generate_record_on_empty`
    /// is configured on, since an upstream error means the absence of rows
    /// isn't meaningful.
    pub fn transfer(&mut self, upstream_ok: bool) -> Result<()> {
        if !matches!(self.state, FlowState::PartitionsSetUp | FlowState::Writing) {
            rayexec_bail!("transfer requires partitions_set_up or writing state");
        }
        let sink = self.sink.take().expect("partitions_set_up guarantees a sink exists");

        if self.config.generate_record_on_empty && upstream_ok {
            sink.generate_record_on_empty();
        }

        let sink = Arc::try_unwrap(sink).unwrap_or_else(|_| {
            panic!("transfer called while a writer still holds a reference to the sink")
        });

        let num_downstream = self.sources.len();
        assert!(sink.partitions.len() <= self.sources.len());
        for (idx, partition) in sink.partitions.into_iter().enumerate().take(num_downstream) {
            self.sources[idx] = Some(partition.into_inner());
        }

        self.state = FlowState::Transferred;
        Ok(())
    }

    pub fn take_source(&mut self, idx: usize) -> Result<AggregateInputPartition> {
        if !matches!(self.state, FlowState::Transferred | FlowState::Reading) {
            rayexec_bail!("take_source requires the transferred state");
        }
        self.state = FlowState::Reading;
        self.sources[idx]
            .take()
            .ok_or_else(|| rayexec_error::rayexec_error!("partition {idx} was already taken"))
    }
}
