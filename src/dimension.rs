//! Dimension-string interning tables

use ahash::AHashMap;
use serde::de::{Deserializer, SeqAccess, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Per string-column intern table: a dense mapping between string values and
/// small integer ids. Ids are assigned in first-seen order starting at 0 and
/// never change or become invalid; the table is append-only.
///
/// Only the value vector is serialized; the reverse map is rebuilt by
/// scanning on load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DimensionTable {
    values: Vec<String>,
    value_to_id: AHashMap<String, u32>,
}

impl DimensionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a table from its serialized value vector.
    pub fn from_values(values: Vec<String>) -> Self {
        let value_to_id = values
            .iter()
            .enumerate()
            .map(|(i, v)| (v.clone(), i as u32))
            .collect();
        Self {
            values,
            value_to_id,
        }
    }

    pub fn lookup(&self, value: &str) -> Option<u32> {
        self.value_to_id.get(value).copied()
    }

    /// Return the id for `value`, interning it if absent. The second element
    /// reports whether the value already existed.
    pub fn get_or_insert(&mut self, value: &str) -> (u32, bool) {
        if let Some(&id) = self.value_to_id.get(value) {
            return (id, true);
        }
        let id = self.values.len() as u32;
        self.values.push(value.to_string());
        self.value_to_id.insert(value.to_string(), id);
        (id, false)
    }

    pub fn value(&self, id: u32) -> Option<&str> {
        self.values.get(id as usize).map(|s| s.as_str())
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Serialize for DimensionTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.values.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DimensionTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ValuesVisitor;

        impl<'de> Visitor<'de> for ValuesVisitor {
            type Value = DimensionTable;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a sequence of dimension values")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut values = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(value) = seq.next_element::<String>()? {
                    values.push(value);
                }
                Ok(DimensionTable::from_values(values))
            }
        }

        deserializer.deserialize_seq(ValuesVisitor)
    }
}
