//! Shuffle/exchange stage for group-by and aggregate operators: sink-side
//! pre-partitioning and (for aggregates) pre-aggregation, a one-shot
//! transfer barrier, and source-side readers over the result.

pub mod aggregator;
pub mod arena_store;
pub mod config;
pub mod flow;
pub mod hash_table;
pub mod input_partition;
pub mod key_encoding;
pub mod page_pool;
pub mod partitioner;
pub mod pointer_table;
pub mod reader;
pub mod record;
pub mod shuffle_info;
pub mod sink;
pub mod source;
pub mod step;
pub mod testutil;
pub mod varlen;
pub mod writer;

pub use config::ShuffleConfig;
pub use flow::{AggregateFlow, FlowState, GroupFlow};
pub use reader::{AggregateMergeReader, GroupReader, PriorityQueueGroupReader, ReaderState, SortedVectorGroupReader};
pub use shuffle_info::{AggregateShuffleInfo, GroupShuffleInfo};
pub use source::{AggregateSource, GroupSource};
pub use step::{AggregateShuffleStep, GroupShuffleStep};
pub use writer::{AggregateWriter, GroupWriter};
