//! Aggregate function state machines.
//!
//! An aggregate key-record's matching value record holds one fixed-size
//! accumulator per aggregate function, packed back to back. `Aggregator`
//! describes how to initialize, fold a new input into, merge two
//! (partition-local) accumulators together, and finalize that state: the
//! same four operations `InputPartition::add` and the aggregate merge
//! reader need, respectively, on first-seen-key, repeat-key, cross-partition
//! merge, and final output.

pub trait Aggregator: Send + Sync {
    /// Size in bytes of this aggregate's accumulator state.
    fn state_size(&self) -> usize;

    fn init_state(&self, state: &mut [u8]);

    /// Fold one input value (`None` for SQL NULL) into `state`.
    fn accumulate(&self, state: &mut [u8], input: Option<f64>);

    /// Fold another partition's accumulator for the same key into `state`.
    fn merge(&self, state: &mut [u8], other: &[u8]);

    fn finalize(&self, state: &[u8]) -> Option<f64>;
}

fn read_f64(state: &[u8]) -> f64 {
    f64::from_le_bytes(state[0..8].try_into().unwrap())
}

fn write_f64(state: &mut [u8], v: f64) {
    state[0..8].copy_from_slice(&v.to_le_bytes());
}

fn read_i64(state: &[u8]) -> i64 {
    i64::from_le_bytes(state[0..8].try_into().unwrap())
}

fn write_i64(state: &mut [u8], v: i64) {
    state[0..8].copy_from_slice(&v.to_le_bytes());
}

/// `SUM`: null input leaves the running total unchanged; a key that never
/// sees a non-null input finalizes to `None`, matching SQL `SUM` semantics.
pub struct SumAggregator;

impl Aggregator for SumAggregator {
    fn state_size(&self) -> usize {
        16 // running sum (f64) + saw-a-value flag (i64, 0/1)
    }

    fn init_state(&self, state: &mut [u8]) {
        write_f64(&mut state[0..8], 0.0);
        write_i64(&mut state[8..16], 0);
    }

    fn accumulate(&self, state: &mut [u8], input: Option<f64>) {
        if let Some(v) = input {
            let total = read_f64(&state[0..8]) + v;
            write_f64(&mut state[0..8], total);
            write_i64(&mut state[8..16], 1);
        }
    }

    fn merge(&self, state: &mut [u8], other: &[u8]) {
        let saw_other = read_i64(&other[8..16]) != 0;
        if saw_other {
            let total = read_f64(&state[0..8]) + read_f64(&other[0..8]);
            write_f64(&mut state[0..8], total);
            write_i64(&mut state[8..16], 1);
        }
    }

    fn finalize(&self, state: &[u8]) -> Option<f64> {
        if read_i64(&state[8..16]) == 0 {
            None
        } else {
            Some(read_f64(&state[0..8]))
        }
    }
}

/// `COUNT(expr)`: counts non-null inputs. An empty input partition that
/// still receives the synthetic empty-input record finalizes to 0,
/// not `None`.
pub struct CountAggregator;

impl Aggregator for CountAggregator {
    fn state_size(&self) -> usize {
        8
    }

    fn init_state(&self, state: &mut [u8]) {
        write_i64(state, 0);
    }

    fn accumulate(&self, state: &mut [u8], input: Option<f64>) {
        if input.is_some() {
            write_i64(state, read_i64(state) + 1);
        }
    }

    fn merge(&self, state: &mut [u8], other: &[u8]) {
        write_i64(state, read_i64(state) + read_i64(other));
    }

    fn finalize(&self, state: &[u8]) -> Option<f64> {
        Some(read_i64(state) as f64)
    }
}

pub struct MinAggregator;

impl Aggregator for MinAggregator {
    fn state_size(&self) -> usize {
        16
    }

    fn init_state(&self, state: &mut [u8]) {
        write_f64(&mut state[0..8], f64::INFINITY);
        write_i64(&mut state[8..16], 0);
    }

    fn accumulate(&self, state: &mut [u8], input: Option<f64>) {
        if let Some(v) = input {
            let cur = read_f64(&state[0..8]);
            if v < cur {
                write_f64(&mut state[0..8], v);
            }
            write_i64(&mut state[8..16], 1);
        }
    }

    fn merge(&self, state: &mut [u8], other: &[u8]) {
        if read_i64(&other[8..16]) != 0 {
            self.accumulate(state, Some(read_f64(&other[0..8])));
        }
    }

    fn finalize(&self, state: &[u8]) -> Option<f64> {
        if read_i64(&state[8..16]) == 0 {
            None
        } else {
            Some(read_f64(&state[0..8]))
        }
    }
}

pub struct MaxAggregator;

impl Aggregator for MaxAggregator {
    fn state_size(&self) -> usize {
        16
    }

    fn init_state(&self, state: &mut [u8]) {
        write_f64(&mut state[0..8], f64::NEG_INFINITY);
        write_i64(&mut state[8..16], 0);
    }

    fn accumulate(&self, state: &mut [u8], input: Option<f64>) {
        if let Some(v) = input {
            let cur = read_f64(&state[0..8]);
            if v > cur {
                write_f64(&mut state[0..8], v);
            }
            write_i64(&mut state[8..16], 1);
        }
    }

    fn merge(&self, state: &mut [u8], other: &[u8]) {
        if read_i64(&other[8..16]) != 0 {
            self.accumulate(state, Some(read_f64(&other[0..8])));
        }
    }

    fn finalize(&self, state: &[u8]) -> Option<f64> {
        if read_i64(&state[8..16]) == 0 {
            None
        } else {
            Some(read_f64(&state[0..8]))
        }
    }
}

/// Offsets and sizes of each aggregate's state within a shared value-record
/// byte buffer.
pub struct AggregateLayout {
    pub offsets: Vec<usize>,
    pub total_size: usize,
}

impl AggregateLayout {
    pub fn new(aggregators: &[Box<dyn Aggregator>]) -> Self {
        let mut offsets = Vec::with_capacity(aggregators.len());
        let mut cursor = 0;
        for agg in aggregators {
            offsets.push(cursor);
            cursor += agg.state_size();
        }
        AggregateLayout {
            offsets,
            total_size: cursor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_ignores_nulls_until_a_value_seen() {
        let agg = SumAggregator;
        let mut state = vec![0u8; agg.state_size()];
        agg.init_state(&mut state);
        assert_eq!(agg.finalize(&state), None);
        agg.accumulate(&mut state, None);
        assert_eq!(agg.finalize(&state), None);
        agg.accumulate(&mut state, Some(3.0));
        agg.accumulate(&mut state, Some(4.0));
        assert_eq!(agg.finalize(&state), Some(7.0));
    }

    #[test]
    fn count_on_empty_input_is_zero_not_none() {
        let agg = CountAggregator;
        let mut state = vec![0u8; agg.state_size()];
        agg.init_state(&mut state);
        assert_eq!(agg.finalize(&state), Some(0.0));
    }

    #[test]
    fn merge_combines_partition_local_sums() {
        let agg = SumAggregator;
        let mut a = vec![0u8; agg.state_size()];
        let mut b = vec![0u8; agg.state_size()];
        agg.init_state(&mut a);
        agg.init_state(&mut b);
        agg.accumulate(&mut a, Some(1.0));
        agg.accumulate(&mut b, Some(2.0));
        agg.merge(&mut a, &b);
        assert_eq!(agg.finalize(&a), Some(3.0));
    }

    #[test]
    fn min_max_track_extremes() {
        let min = MinAggregator;
        let mut s = vec![0u8; min.state_size()];
        min.init_state(&mut s);
        min.accumulate(&mut s, Some(5.0));
        min.accumulate(&mut s, Some(-2.0));
        min.accumulate(&mut s, None);
        assert_eq!(min.finalize(&s), Some(-2.0));
    }

    #[test]
    fn layout_packs_states_back_to_back() {
        let aggs: Vec<Box<dyn Aggregator>> = vec![Box::new(SumAggregator), Box::new(CountAggregator)];
        let layout = AggregateLayout::new(&aggs);
        assert_eq!(layout.offsets, vec![0, 16]);
        assert_eq!(layout.total_size, 24);
    }
}
