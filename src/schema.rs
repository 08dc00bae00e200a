//! Schema and element-type registry
//!
//! A schema is two ordered groups of columns: dimension columns first, then
//! metric columns, each group sorted lexicographically by name. That ordering
//! fixes column indices and therefore the packed row layout on disk.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{FactError, Result};

/// The closed set of fixed-width numeric element types a column can store.
///
/// Every element widens losslessly to the canonical `f64` transport form;
/// narrowing back follows Rust's `as` conversion (truncation toward zero for
/// float to int, saturation at the type bounds) with no error on loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl ElementType {
    /// Width in bytes of one element.
    pub fn width(self) -> usize {
        match self {
            ElementType::U8 | ElementType::I8 => 1,
            ElementType::U16 | ElementType::I16 => 2,
            ElementType::U32 | ElementType::I32 | ElementType::F32 => 4,
            ElementType::U64 | ElementType::I64 | ElementType::F64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementType::U8 => "u8",
            ElementType::I8 => "i8",
            ElementType::U16 => "u16",
            ElementType::I16 => "i16",
            ElementType::U32 => "u32",
            ElementType::I32 => "i32",
            ElementType::U64 => "u64",
            ElementType::I64 => "i64",
            ElementType::F32 => "f32",
            ElementType::F64 => "f64",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "u8" => Some(ElementType::U8),
            "i8" => Some(ElementType::I8),
            "u16" => Some(ElementType::U16),
            "i16" => Some(ElementType::I16),
            "u32" => Some(ElementType::U32),
            "i32" => Some(ElementType::I32),
            "u64" => Some(ElementType::U64),
            "i64" => Some(ElementType::I64),
            "f32" => Some(ElementType::F32),
            "f64" => Some(ElementType::F64),
            _ => None,
        }
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, ElementType::F32 | ElementType::F64)
    }
}

/// A grouping column. String dimensions are interned through a per-column
/// [`DimensionTable`](crate::DimensionTable) and stored as small integer
/// ids; the schema author picks an element type wide enough for the
/// expected cardinality. Non-string dimensions hold plain numerics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionColumn {
    pub name: String,
    pub ty: ElementType,
    /// Logical values are strings, stored as dimension-table ids.
    #[serde(default)]
    pub string: bool,
}

impl DimensionColumn {
    /// A string-valued dimension column.
    pub fn string(name: impl Into<String>, ty: ElementType) -> Self {
        Self {
            name: name.into(),
            ty,
            string: true,
        }
    }

    /// A numeric dimension column (no intern table).
    pub fn numeric(name: impl Into<String>, ty: ElementType) -> Self {
        Self {
            name: name.into(),
            ty,
            string: false,
        }
    }
}

/// A numeric column aggregated by sum/average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricColumn {
    pub name: String,
    pub ty: ElementType,
}

impl MetricColumn {
    pub fn new(name: impl Into<String>, ty: ElementType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Column ordering and types for one fact table. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    dimensions: Vec<DimensionColumn>,
    metrics: Vec<MetricColumn>,
    name_to_index: HashMap<String, usize>,
}

impl Schema {
    /// Build a schema. Each group is sorted lexicographically by name and
    /// dimensions precede metrics; duplicate names are rejected.
    pub fn new(
        mut dimensions: Vec<DimensionColumn>,
        mut metrics: Vec<MetricColumn>,
    ) -> Result<Self> {
        if dimensions.is_empty() && metrics.is_empty() {
            return Err(FactError::SchemaMismatch("schema has no columns".to_string()));
        }
        dimensions.sort_by(|a, b| a.name.cmp(&b.name));
        metrics.sort_by(|a, b| a.name.cmp(&b.name));

        let mut name_to_index = HashMap::new();
        let names = dimensions
            .iter()
            .map(|c| c.name.as_str())
            .chain(metrics.iter().map(|c| c.name.as_str()));
        for (index, name) in names.enumerate() {
            if name_to_index.insert(name.to_string(), index).is_some() {
                return Err(FactError::SchemaMismatch(format!(
                    "duplicate column name: {name}"
                )));
            }
        }

        Ok(Self {
            dimensions,
            metrics,
            name_to_index,
        })
    }

    pub fn column_count(&self) -> usize {
        self.dimensions.len() + self.metrics.len()
    }

    pub fn dimension_count(&self) -> usize {
        self.dimensions.len()
    }

    pub fn dimensions(&self) -> &[DimensionColumn] {
        &self.dimensions
    }

    pub fn metrics(&self) -> &[MetricColumn] {
        &self.metrics
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn column_name(&self, index: usize) -> &str {
        if index < self.dimensions.len() {
            &self.dimensions[index].name
        } else {
            &self.metrics[index - self.dimensions.len()].name
        }
    }

    pub fn column_type(&self, index: usize) -> ElementType {
        if index < self.dimensions.len() {
            self.dimensions[index].ty
        } else {
            self.metrics[index - self.dimensions.len()].ty
        }
    }

    /// Dimension columns occupy the front of the index space.
    pub fn is_dimension(&self, index: usize) -> bool {
        index < self.dimensions.len()
    }

    pub fn is_string_dimension(&self, index: usize) -> bool {
        index < self.dimensions.len() && self.dimensions[index].string
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_widths() {
        assert_eq!(ElementType::U8.width(), 1);
        assert_eq!(ElementType::I16.width(), 2);
        assert_eq!(ElementType::F32.width(), 4);
        assert_eq!(ElementType::U64.width(), 8);
        for ty in [
            ElementType::U8,
            ElementType::I8,
            ElementType::U16,
            ElementType::I16,
            ElementType::U32,
            ElementType::I32,
            ElementType::U64,
            ElementType::I64,
            ElementType::F32,
            ElementType::F64,
        ] {
            assert_eq!(ElementType::parse(ty.name()), Some(ty));
        }
    }

    #[test]
    fn test_column_ordering_dimensions_first_sorted() {
        let schema = Schema::new(
            vec![
                DimensionColumn::string("zone", ElementType::U32),
                DimensionColumn::string("browser", ElementType::U32),
            ],
            vec![
                MetricColumn::new("views", ElementType::U64),
                MetricColumn::new("clicks", ElementType::U32),
            ],
        )
        .unwrap();

        assert_eq!(schema.column_name(0), "browser");
        assert_eq!(schema.column_name(1), "zone");
        assert_eq!(schema.column_name(2), "clicks");
        assert_eq!(schema.column_name(3), "views");
        assert_eq!(schema.index_of("views"), Some(3));
        assert!(schema.is_dimension(1));
        assert!(!schema.is_dimension(2));

        // The column groups come back sorted, dimensions ahead of metrics.
        let dimension_names: Vec<&str> =
            schema.dimensions().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(dimension_names, ["browser", "zone"]);
        let metric_names: Vec<&str> = schema.metrics().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(metric_names, ["clicks", "views"]);
        assert_eq!(schema.metrics()[0].ty, ElementType::U32);
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let result = Schema::new(
            vec![DimensionColumn::string("name", ElementType::U16)],
            vec![MetricColumn::new("name", ElementType::U16)],
        );
        assert!(matches!(result, Err(FactError::SchemaMismatch(_))));
    }

    #[test]
    fn test_empty_schema_rejected() {
        assert!(Schema::new(vec![], vec![]).is_err());
    }

    #[test]
    fn test_string_flag() {
        let schema = Schema::new(
            vec![
                DimensionColumn::string("country", ElementType::U16),
                DimensionColumn::numeric("shard", ElementType::U8),
            ],
            vec![MetricColumn::new("count", ElementType::U32)],
        )
        .unwrap();
        // "country" sorts before "shard"
        assert!(schema.is_string_dimension(0));
        assert!(!schema.is_string_dimension(1));
        assert!(!schema.is_string_dimension(2));
    }
}
