//! Result formatting: aggregate buckets -> user-facing rows

use crate::data::{RowMap, Value};
use crate::dimension::DimensionTable;
use crate::query::compile::CompiledQuery;
use crate::query::scan::Bucket;
use crate::query::{AggregateKind, QueryResults};
use crate::schema::Schema;

/// Convert buckets into result rows: divide for averages, put the group-by
/// value back into user terms, and attach `rowCount`.
pub(crate) fn format_buckets(
    buckets: Vec<Bucket>,
    query: &CompiledQuery,
    schema: &Schema,
    dims: &[DimensionTable],
) -> QueryResults {
    let mut results = Vec::with_capacity(buckets.len());
    for bucket in buckets {
        let mut row = RowMap::with_capacity(query.aggregates.len() + 2);
        for aggregate in &query.aggregates {
            let sum = bucket.sums[aggregate.column];
            let value = match aggregate.kind {
                AggregateKind::Sum => sum,
                // A zero-count bucket only arises on the ungrouped path;
                // its average is defined as 0.0.
                AggregateKind::Average if bucket.count == 0 => 0.0,
                AggregateKind::Average => sum / bucket.count as f64,
            };
            row.insert(aggregate.name.clone(), Value::Number(value));
        }
        if let Some(grouping) = &query.grouping {
            let value = if schema.is_string_dimension(grouping.column) {
                match dims[grouping.column].value(bucket.key as u32) {
                    // Owned copy so results outlive the table.
                    Some(s) => Value::String(s.to_string()),
                    None => Value::Number(bucket.key),
                }
            } else {
                Value::Number(bucket.key)
            };
            row.insert(grouping.name.clone(), value);
        }
        row.insert("rowCount".to_string(), Value::Int(bucket.count as i64));
        results.push(row);
    }
    QueryResults { results }
}
