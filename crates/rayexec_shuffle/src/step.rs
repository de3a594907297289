//! Planner-facing wiring around a [`crate::flow`] instance.
//!
//! A `Flow` alone only tracks sink/source state; a planner also needs the
//! `ShuffleConfig` it was built from close at hand (partition counts, reader
//! strategy, and so on) without re-deriving it from the flow's internals.
//! `GroupShuffleStep`/`AggregateShuffleStep` bundle the two together as the
//! single unit a planner embeds for one exchange.

use std::sync::Arc;

use rayexec_error::Result;

use crate::aggregator::Aggregator;
use crate::config::ShuffleConfig;
use crate::flow::{AggregateFlow, FlowState, GroupFlow};
use crate::input_partition::{AggregateInputPartition, GroupInputPartition};
use crate::key_encoding::KeyMetadata;
use crate::page_pool::PagePool;
use crate::record::RecordMetadata;
use crate::writer::{AggregateWriter, GroupWriter};

/// A group exchange's flow plus the configuration it was set up with.
pub struct GroupShuffleStep {
    pub flow: GroupFlow,
    pub config: ShuffleConfig,
}

impl GroupShuffleStep {
    pub fn new(config: ShuffleConfig) -> Self {
        GroupShuffleStep {
            flow: GroupFlow::new(config.clone()),
            config,
        }
    }

    pub fn state(&self) -> FlowState {
        self.flow.state()
    }

    pub fn setup_partitions(
        &mut self,
        pool: Arc<PagePool>,
        record_meta: Arc<RecordMetadata>,
        key_meta: Arc<KeyMetadata>,
        num_downstream: usize,
    ) -> Result<()> {
        self.flow.setup_partitions(pool, record_meta, key_meta, num_downstream)
    }

    pub fn writer(&mut self) -> Result<GroupWriter> {
        self.flow.writer()
    }

    pub fn transfer(&mut self) -> Result<()> {
        self.flow.transfer()
    }

    pub fn take_source(&mut self, idx: usize) -> Result<GroupInputPartition> {
        self.flow.take_source(idx)
    }
}

/// An aggregate exchange's flow plus the configuration it was set up with.
pub struct AggregateShuffleStep {
    pub flow: AggregateFlow,
    pub config: ShuffleConfig,
}

impl AggregateShuffleStep {
    pub fn new(config: ShuffleConfig) -> Self {
        AggregateShuffleStep {
            flow: AggregateFlow::new(config.clone()),
            config,
        }
    }

    pub fn state(&self) -> FlowState {
        self.flow.state()
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
        self.flow
            .setup_partitions(pool, record_meta, key_meta, aggregators, num_downstream)
    }

    pub fn writer(&mut self) -> Result<AggregateWriter> {
        self.flow.writer()
    }

    pub fn transfer(&mut self, upstream_ok: bool) -> Result<()> {
        self.flow.transfer(upstream_ok)
    }

    pub fn take_source(&mut self, idx: usize) -> Result<AggregateInputPartition> {
        self.flow.take_source(idx)
    }
}
