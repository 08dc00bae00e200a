//! Declarative query descriptors and their execution
//!
//! Queries arrive already structured (wire/JSON-compatible): a list of
//! aggregates, at most one grouping with an optional time-bucket transform,
//! and a conjunctive list of filters. Compilation turns a descriptor into a
//! closure pipeline; the scan kernel runs it in one pass over the rows.

pub(crate) mod compile;
pub(crate) mod result;
pub(crate) mod scan;

use serde::{Deserialize, Serialize};

use crate::data::{RowMap, Value};

/// Aggregate kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateKind {
    Sum,
    Average,
}

/// One requested aggregate: `Kind(Column)` emitted under `Name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregate {
    #[serde(rename = "Type")]
    pub kind: AggregateKind,
    #[serde(rename = "Column")]
    pub column: String,
    #[serde(rename = "Name")]
    pub name: String,
}

impl Aggregate {
    pub fn sum(column: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: AggregateKind::Sum,
            column: column.into(),
            name: name.into(),
        }
    }

    pub fn average(column: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: AggregateKind::Average,
            column: column.into(),
            name: name.into(),
        }
    }
}

/// Floor-to-bucket transform applied to a grouping column's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeTransform {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "minute")]
    Minute,
    #[serde(rename = "hour")]
    Hour,
    #[serde(rename = "day")]
    Day,
}

impl TimeTransform {
    /// Bucket width in seconds; `None` for the identity transform.
    pub fn divisor(self) -> Option<i64> {
        match self {
            TimeTransform::None => None,
            TimeTransform::Minute => Some(60),
            TimeTransform::Hour => Some(3600),
            TimeTransform::Day => Some(86_400),
        }
    }
}

/// The group-by clause. At most one grouping is supported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grouping {
    #[serde(rename = "TimeTransform", default)]
    pub time_transform: TimeTransform,
    #[serde(rename = "Column")]
    pub column: String,
    #[serde(rename = "Name")]
    pub name: String,
}

impl Grouping {
    pub fn new(column: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            time_transform: TimeTransform::None,
            column: column.into(),
            name: name.into(),
        }
    }

    pub fn with_transform(
        column: impl Into<String>,
        name: impl Into<String>,
        transform: TimeTransform,
    ) -> Self {
        Self {
            time_transform: transform,
            column: column.into(),
            name: name.into(),
        }
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessEqual,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    GreaterEqual,
    #[serde(rename = "in")]
    In,
}

/// Filter operand: a scalar for comparison operators, a list for `in`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Scalar(Value),
    List(Vec<Value>),
}

impl From<Value> for FilterValue {
    fn from(v: Value) -> Self {
        FilterValue::Scalar(v)
    }
}

impl From<Vec<Value>> for FilterValue {
    fn from(v: Vec<Value>) -> Self {
        FilterValue::List(v)
    }
}

/// One filter condition; filters compose conjunctively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    #[serde(rename = "Type")]
    pub op: FilterOp,
    #[serde(rename = "Column")]
    pub column: String,
    #[serde(rename = "Value")]
    pub value: FilterValue,
}

impl Filter {
    pub fn new(op: FilterOp, column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self {
            op,
            column: column.into(),
            value: value.into(),
        }
    }
}

/// A full query descriptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Query {
    /// Routing field for outer layers; the engine ignores it.
    #[serde(rename = "TableName", default)]
    pub table_name: String,
    #[serde(rename = "Aggregates", default)]
    pub aggregates: Vec<Aggregate>,
    #[serde(rename = "Groupings", default)]
    pub groupings: Vec<Grouping>,
    #[serde(rename = "Filters", default)]
    pub filters: Vec<Filter>,
}

/// Query response: one map per aggregate bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResults {
    pub results: Vec<RowMap>,
}
