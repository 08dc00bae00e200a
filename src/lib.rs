//! Factbase core storage engine
//!
//! An in-process column-oriented fact table for event analytics. Rows arrive
//! as maps of string dimensions and numeric metrics, are packed into
//! fixed-width records in a ring buffer (heap or memory-mapped), and are
//! queried by a single linear scan with filters, one optional group-by and
//! sum/average aggregates.

pub mod codec;
pub mod data;
pub mod dimension;
pub mod query;
pub mod schema;
pub mod storage;
pub mod table;

// Re-export main types
pub use data::{RowMap, Value};
pub use dimension::DimensionTable;
pub use query::{
    Aggregate, AggregateKind, Filter, FilterOp, FilterValue, Grouping, Query, QueryResults,
    TimeTransform,
};
pub use schema::{DimensionColumn, ElementType, MetricColumn, Schema};
pub use table::FactTable;

/// Storage engine error type
#[derive(Debug, thiserror::Error)]
pub enum FactError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Type mismatch for column {column}: expected {expected}, got {got}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        got: &'static str,
    },

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Checksum mismatch")]
    ChecksumMismatch,

    #[error("Invalid file format")]
    InvalidFileFormat,

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },
}

pub type Result<T> = std::result::Result<T, FactError>;
