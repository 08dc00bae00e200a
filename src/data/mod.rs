//! Scalar values crossing the table boundary

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A row as the caller sees it: column name to scalar value.
pub type RowMap = HashMap<String, Value>;

/// A scalar crossing the table boundary: row-map entries on ingest, filter
/// operands in query descriptors, and result-row cells. Untagged so the
/// JSON shape is the bare scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Number(f64),
    String(String),
}

impl Value {
    /// Widen to the canonical numeric form; `None` for strings.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Number(n) => Some(*n),
            Value::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Human-readable kind for error messages.
    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Value::Int(_) | Value::Number(_) => "number",
            Value::String(_) => "string",
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
