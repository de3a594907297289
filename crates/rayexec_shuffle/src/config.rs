//! Knobs that replace the ambient request context the original engine reads
//! these values from. Everything that used to be looked up off a global
//! request object is collected into one struct passed explicitly to
//! [`crate::flow::Flow::new`].

/// Configuration for a single shuffle (group or aggregate exchange).
#[derive(Debug, Clone)]
pub struct ShuffleConfig {
    /// Use the sorted-vector group reader instead of the priority-queue
    /// k-way merge reader. The two are semantically interchangeable; this
    /// only trades reader memory for fewer comparisons during merge.
    pub use_sorted_vector: bool,

    /// Skip the pre-aggregation step on the sink side and forward every
    /// record untouched. Used when the downstream aggregation is cheap
    /// enough that pre-grouping would just add overhead.
    pub noop_pregroup: bool,

    /// Canonicalize NaN payloads and negative zero before encoding sort
    /// keys, so that all NaNs compare equal and `-0.0` compares equal to
    /// `0.0`. Without this, IEEE-754 bit patterns for these values would
    /// otherwise violate the total order the key encoding promises.
    pub normalize_float: bool,

    /// Emit one synthetic, all-null input record for an aggregate exchange
    /// whose upstream partition produced zero rows, so that aggregates like
    /// `COUNT` still return a row instead of nothing. Only applies when the
    /// upstream's completion status was ok.
    pub generate_record_on_empty: bool,

    /// Capacity, in pointer slots, of each `PointerTable` page. Defaults to
    /// `page_size / size_of::<RecordPointer>()`.
    pub pointer_table_capacity: Option<usize>,

    /// Load factor above which `PreAggHashTable::insert` triggers a flush
    /// rather than growing. Default: 0.7.
    pub preagg_load_factor: f64,

    /// Hopscotch neighborhood size (H). Default: 62.
    pub preagg_neighbourhood: usize,

    /// Page size in bytes used for all arenas and the pre-aggregation hash
    /// table in this shuffle instance.
    pub page_size: usize,

    /// Maximum number of members a `GroupReader` yields per group before it
    /// discards the rest and advances to the next group. `Some(0)` means no
    /// group is ever yielded at all; `None` means unbounded.
    pub per_group_limit: Option<usize>,
}

impl Default for ShuffleConfig {
    fn default() -> Self {
        ShuffleConfig {
            use_sorted_vector: false,
            noop_pregroup: false,
            normalize_float: true,
            generate_record_on_empty: false,
            pointer_table_capacity: None,
            preagg_load_factor: 0.7,
            preagg_neighbourhood: 62,
            page_size: crate::page_pool::DEFAULT_PAGE_SIZE,
            per_group_limit: None,
        }
    }
}

impl ShuffleConfig {
    pub fn pointer_table_capacity(&self, pointer_size: usize) -> usize {
        self.pointer_table_capacity
            .unwrap_or(self.page_size / pointer_size)
    }
}
