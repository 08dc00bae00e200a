// Query compilation: descriptor -> closure pipeline.
//
// Each filter becomes a predicate closure that reads one element at a
// captured offset in its native width and compares against a pre-narrowed
// operand. Dimension-string operands are resolved to intern ids here, at
// compile time, so the scan never touches the dimension tables.

use crate::codec::{read_native, RowCodec};
use crate::dimension::DimensionTable;
use crate::query::{AggregateKind, Filter, FilterOp, FilterValue, Query};
use crate::schema::{ElementType, Schema};
use crate::{FactError, Result};

/// Compiled row predicate.
pub(crate) type RowPredicate = Box<dyn Fn(&[u8]) -> bool + Send + Sync>;

pub(crate) struct CompiledGrouping {
    pub name: String,
    pub column: usize,
    /// Bucket width when a time transform was requested.
    pub divisor: Option<i64>,
}

pub(crate) struct CompiledAggregate {
    pub name: String,
    pub column: usize,
    pub kind: AggregateKind,
}

pub(crate) struct CompiledQuery {
    pub predicates: Vec<RowPredicate>,
    pub grouping: Option<CompiledGrouping>,
    pub aggregates: Vec<CompiledAggregate>,
}

pub(crate) fn compile(
    query: &Query,
    schema: &Schema,
    codec: &RowCodec,
    dims: &[DimensionTable],
) -> Result<CompiledQuery> {
    let mut predicates = Vec::with_capacity(query.filters.len());
    for filter in &query.filters {
        predicates.push(compile_filter(filter, schema, codec, dims)?);
    }

    if query.groupings.len() > 1 {
        return Err(FactError::InvalidQuery(
            "at most one grouping is supported".to_string(),
        ));
    }
    let grouping = match query.groupings.first() {
        Some(g) => {
            let column = schema
                .index_of(&g.column)
                .ok_or_else(|| FactError::UnknownColumn(g.column.clone()))?;
            Some(CompiledGrouping {
                name: g.name.clone(),
                column,
                divisor: g.time_transform.divisor(),
            })
        }
        None => None,
    };

    let mut aggregates = Vec::with_capacity(query.aggregates.len());
    for agg in &query.aggregates {
        let column = schema
            .index_of(&agg.column)
            .ok_or_else(|| FactError::UnknownColumn(agg.column.clone()))?;
        aggregates.push(CompiledAggregate {
            name: agg.name.clone(),
            column,
            kind: agg.kind,
        });
    }

    Ok(CompiledQuery {
        predicates,
        grouping,
        aggregates,
    })
}

fn compile_filter(
    filter: &Filter,
    schema: &Schema,
    codec: &RowCodec,
    dims: &[DimensionTable],
) -> Result<RowPredicate> {
    let column = schema
        .index_of(&filter.column)
        .ok_or_else(|| FactError::UnknownColumn(filter.column.clone()))?;
    let ty = codec.column_type(column);
    let offset = codec.offset(column);

    if filter.op == FilterOp::In {
        let values = match &filter.value {
            FilterValue::List(values) => values,
            FilterValue::Scalar(_) => {
                return Err(FactError::InvalidQuery(
                    "`in` filter requires a list value".to_string(),
                ))
            }
        };
        let candidates = if schema.is_string_dimension(column) {
            let mut ids = Vec::with_capacity(values.len());
            for value in values {
                let s = value.as_str().ok_or_else(|| FactError::TypeMismatch {
                    column: filter.column.clone(),
                    expected: "string",
                    got: value.kind_name(),
                })?;
                // Strings the table has never interned cannot match any row.
                if let Some(id) = dims[column].lookup(s) {
                    ids.push(id as f64);
                }
            }
            ids
        } else {
            values
                .iter()
                .map(|value| {
                    value.as_f64().ok_or_else(|| FactError::TypeMismatch {
                        column: filter.column.clone(),
                        expected: "number",
                        got: value.kind_name(),
                    })
                })
                .collect::<Result<Vec<f64>>>()?
        };
        return Ok(in_predicate(ty, offset, candidates));
    }

    let scalar = match &filter.value {
        FilterValue::Scalar(value) => value,
        FilterValue::List(_) => {
            return Err(FactError::InvalidQuery(
                "a list value requires the `in` operator".to_string(),
            ))
        }
    };

    if schema.is_string_dimension(column) {
        let s = scalar.as_str().ok_or_else(|| FactError::TypeMismatch {
            column: filter.column.clone(),
            expected: "string",
            got: scalar.kind_name(),
        })?;
        match dims[column].lookup(s) {
            Some(id) => Ok(scalar_predicate(ty, offset, filter.op, id as f64)),
            // Unknown string: equality can never hold, inequality always
            // does, and there is no ordering against an unassigned id.
            None => match filter.op {
                FilterOp::NotEqual => Ok(constant_predicate(true)),
                _ => Ok(constant_predicate(false)),
            },
        }
    } else {
        let rhs = scalar.as_f64().ok_or_else(|| FactError::TypeMismatch {
            column: filter.column.clone(),
            expected: "number",
            got: scalar.kind_name(),
        })?;
        Ok(scalar_predicate(ty, offset, filter.op, rhs))
    }
}

fn constant_predicate(result: bool) -> RowPredicate {
    Box::new(move |_| result)
}

/// Comparison against a scalar, in the column's native element type.
fn scalar_predicate(ty: ElementType, offset: usize, op: FilterOp, rhs: f64) -> RowPredicate {
    macro_rules! predicate {
        ($t:ty) => {{
            let target = rhs as $t;
            match op {
                FilterOp::Equal => {
                    Box::new(move |row: &[u8]| unsafe { read_native::<$t>(row, offset) == target })
                        as RowPredicate
                }
                FilterOp::NotEqual => {
                    Box::new(move |row: &[u8]| unsafe { read_native::<$t>(row, offset) != target })
                }
                FilterOp::LessThan => {
                    Box::new(move |row: &[u8]| unsafe { read_native::<$t>(row, offset) < target })
                }
                FilterOp::LessEqual => {
                    Box::new(move |row: &[u8]| unsafe { read_native::<$t>(row, offset) <= target })
                }
                FilterOp::GreaterThan => {
                    Box::new(move |row: &[u8]| unsafe { read_native::<$t>(row, offset) > target })
                }
                FilterOp::GreaterEqual => {
                    Box::new(move |row: &[u8]| unsafe { read_native::<$t>(row, offset) >= target })
                }
                FilterOp::In => unreachable!("list operator is compiled separately"),
            }
        }};
    }

    match ty {
        ElementType::U8 => predicate!(u8),
        ElementType::I8 => predicate!(i8),
        ElementType::U16 => predicate!(u16),
        ElementType::I16 => predicate!(i16),
        ElementType::U32 => predicate!(u32),
        ElementType::I32 => predicate!(i32),
        ElementType::U64 => predicate!(u64),
        ElementType::I64 => predicate!(i64),
        ElementType::F32 => predicate!(f32),
        ElementType::F64 => predicate!(f64),
    }
}

/// Linear membership test over a narrowed candidate set.
fn in_predicate(ty: ElementType, offset: usize, candidates: Vec<f64>) -> RowPredicate {
    macro_rules! predicate {
        ($t:ty) => {{
            let targets: Vec<$t> = candidates.iter().map(|&v| v as $t).collect();
            Box::new(move |row: &[u8]| {
                let value = unsafe { read_native::<$t>(row, offset) };
                targets.iter().any(|&target| target == value)
            }) as RowPredicate
        }};
    }

    match ty {
        ElementType::U8 => predicate!(u8),
        ElementType::I8 => predicate!(i8),
        ElementType::U16 => predicate!(u16),
        ElementType::I16 => predicate!(i16),
        ElementType::U32 => predicate!(u32),
        ElementType::I32 => predicate!(i32),
        ElementType::U64 => predicate!(u64),
        ElementType::I64 => predicate!(i64),
        ElementType::F32 => predicate!(f32),
        ElementType::F64 => predicate!(f64),
    }
}
