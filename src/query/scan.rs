// The scan kernel: one linear pass over the active rows.
//
// Performance critical. Predicates run in descriptor order and short-circuit
// on the first failure; surviving rows accumulate into a single bucket, or
// into a hash map keyed by the (optionally time-bucketed) group-by value.

use ahash::AHashMap;

use crate::codec::RowCodec;
use crate::query::compile::{CompiledAggregate, CompiledQuery};

/// Accumulator for one group, or the sole bucket when ungrouped. The sums
/// vector spans every column so bucket handling stays uniform; the formatter
/// only reads the queried entries.
pub(crate) struct Bucket {
    pub key: f64,
    pub sums: Vec<f64>,
    pub count: u64,
}

impl Bucket {
    fn zero(key: f64, column_count: usize) -> Self {
        Self {
            key,
            sums: vec![0.0; column_count],
            count: 0,
        }
    }
}

/// Scan rows `[0, count)` of `region` and return the aggregate buckets.
/// Without a grouping exactly one bucket comes back, even when no row
/// matched; with a grouping, buckets come back in unspecified order.
pub(crate) fn scan(
    region: &[u8],
    count: usize,
    codec: &RowCodec,
    query: &CompiledQuery,
    column_count: usize,
) -> Vec<Bucket> {
    let row_size = codec.row_size();
    let matches = |row: &[u8]| query.predicates.iter().all(|predicate| predicate(row));

    match &query.grouping {
        None => {
            let mut bucket = Bucket::zero(0.0, column_count);
            for i in 0..count {
                let row = &region[i * row_size..(i + 1) * row_size];
                if matches(row) {
                    accumulate(&mut bucket, row, codec, &query.aggregates);
                }
            }
            vec![bucket]
        }
        Some(grouping) => {
            let mut buckets: AHashMap<u64, Bucket> = AHashMap::new();
            for i in 0..count {
                let row = &region[i * row_size..(i + 1) * row_size];
                if !matches(row) {
                    continue;
                }
                let mut key = codec.read_f64(row, grouping.column);
                if let Some(divisor) = grouping.divisor {
                    // Floor to the bucket via the truncated integral part.
                    let n = key as i64;
                    key = (n - n % divisor) as f64;
                }
                let bucket = buckets
                    .entry(bucket_key_bits(key))
                    .or_insert_with(|| Bucket::zero(key, column_count));
                accumulate(bucket, row, codec, &query.aggregates);
            }
            buckets.into_values().collect()
        }
    }
}

#[inline]
fn accumulate(bucket: &mut Bucket, row: &[u8], codec: &RowCodec, aggregates: &[CompiledAggregate]) {
    for aggregate in aggregates {
        bucket.sums[aggregate.column] += codec.read_f64(row, aggregate.column);
    }
    bucket.count += 1;
}

/// Map keys are the canonical value's bit pattern, not the float itself:
/// -0.0 folds into 0.0 and every NaN into one canonical pattern, so equal
/// keys always land in the same bucket.
#[inline]
fn bucket_key_bits(key: f64) -> u64 {
    if key == 0.0 {
        return 0.0f64.to_bits();
    }
    if key.is_nan() {
        return f64::NAN.to_bits();
    }
    key.to_bits()
}
