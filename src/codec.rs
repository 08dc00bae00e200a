//! Packed row codec
//!
//! Computes each column's byte offset once from the schema and converts
//! between user-facing row maps and the packed fixed-width record format.
//! Offsets are validated against `row_size` when the codec is built; the
//! per-element accessors then read and write unaligned without further
//! bounds checks, which is what the scan loop relies on.

use crate::data::{RowMap, Value};
use crate::dimension::DimensionTable;
use crate::schema::{ElementType, Schema};
use crate::{FactError, Result};

/// Offset table and element types for one packed row layout.
#[derive(Debug, Clone)]
pub struct RowCodec {
    offsets: Vec<usize>,
    types: Vec<ElementType>,
    row_size: usize,
}

impl RowCodec {
    pub fn new(schema: &Schema) -> Self {
        let column_count = schema.column_count();
        let mut offsets = Vec::with_capacity(column_count);
        let mut types = Vec::with_capacity(column_count);
        let mut offset = 0;
        for index in 0..column_count {
            let ty = schema.column_type(index);
            offsets.push(offset);
            types.push(ty);
            offset += ty.width();
        }
        // Every (offset, width) pair now lies inside [0, row_size).
        Self {
            offsets,
            types,
            row_size: offset,
        }
    }

    pub fn row_size(&self) -> usize {
        self.row_size
    }

    pub fn offset(&self, column: usize) -> usize {
        self.offsets[column]
    }

    pub fn column_type(&self, column: usize) -> ElementType {
        self.types[column]
    }

    /// Read column `column` of a packed row, widened to canonical `f64`.
    #[inline]
    pub fn read_f64(&self, row: &[u8], column: usize) -> f64 {
        debug_assert_eq!(row.len(), self.row_size);
        // Offset validated at construction; the row slice is row_size bytes.
        unsafe { read_element(row.as_ptr().add(self.offsets[column]), self.types[column]) }
    }

    /// Narrow the canonical value to the column's element type and store it.
    #[inline]
    pub fn write_f64(&self, row: &mut [u8], column: usize, value: f64) {
        debug_assert_eq!(row.len(), self.row_size);
        unsafe { write_element(row.as_mut_ptr().add(self.offsets[column]), self.types[column], value) }
    }

    /// Convert a row map into a fresh packed record, interning string
    /// dimension values through `dims`. Columns absent from the map keep
    /// the zero byte pattern: missing means zero.
    pub fn normalize(
        &self,
        schema: &Schema,
        dims: &mut [DimensionTable],
        row_map: &RowMap,
    ) -> Result<Vec<u8>> {
        let mut row = vec![0u8; self.row_size];
        for (name, value) in row_map {
            let index = schema
                .index_of(name)
                .ok_or_else(|| FactError::UnknownColumn(name.clone()))?;
            let canonical = if schema.is_string_dimension(index) {
                let s = value.as_str().ok_or_else(|| FactError::TypeMismatch {
                    column: name.clone(),
                    expected: "string",
                    got: value.kind_name(),
                })?;
                let (id, _) = dims[index].get_or_insert(s);
                id as f64
            } else {
                value.as_f64().ok_or_else(|| FactError::TypeMismatch {
                    column: name.clone(),
                    expected: "number",
                    got: value.kind_name(),
                })?
            };
            self.write_f64(&mut row, index, canonical);
        }
        Ok(row)
    }

    /// Inverse of [`normalize`](Self::normalize) for display: dimension ids
    /// are replaced by owned copies of their strings.
    pub fn denormalize(&self, schema: &Schema, dims: &[DimensionTable], row: &[u8]) -> RowMap {
        let mut map = RowMap::with_capacity(self.types.len());
        for index in 0..self.types.len() {
            let canonical = self.read_f64(row, index);
            let value = if schema.is_string_dimension(index) {
                match dims[index].value(canonical as u32) {
                    Some(s) => Value::String(s.to_string()),
                    // An id the table has never assigned; surface it raw.
                    None => Value::Number(canonical),
                }
            } else {
                Value::Number(canonical)
            };
            map.insert(schema.column_name(index).to_string(), value);
        }
        map
    }
}

/// Read one `T` at `offset` into a packed row, unaligned.
///
/// # Safety
/// `offset + size_of::<T>() <= row.len()` must hold and `T` must be the
/// column's declared element type. Callers get this for free by pairing an
/// offset from a [`RowCodec`] with a row slice of that codec's `row_size`.
#[inline(always)]
pub(crate) unsafe fn read_native<T: Copy>(row: &[u8], offset: usize) -> T {
    debug_assert!(offset + std::mem::size_of::<T>() <= row.len());
    (row.as_ptr().add(offset) as *const T).read_unaligned()
}

/// # Safety
/// `p` must point at `ty.width()` readable bytes.
#[inline(always)]
unsafe fn read_element(p: *const u8, ty: ElementType) -> f64 {
    match ty {
        ElementType::U8 => p.read() as f64,
        ElementType::I8 => (p as *const i8).read() as f64,
        ElementType::U16 => (p as *const u16).read_unaligned() as f64,
        ElementType::I16 => (p as *const i16).read_unaligned() as f64,
        ElementType::U32 => (p as *const u32).read_unaligned() as f64,
        ElementType::I32 => (p as *const i32).read_unaligned() as f64,
        ElementType::U64 => (p as *const u64).read_unaligned() as f64,
        ElementType::I64 => (p as *const i64).read_unaligned() as f64,
        ElementType::F32 => (p as *const f32).read_unaligned() as f64,
        ElementType::F64 => (p as *const f64).read_unaligned(),
    }
}

/// # Safety
/// `p` must point at `ty.width()` writable bytes.
#[inline(always)]
unsafe fn write_element(p: *mut u8, ty: ElementType, value: f64) {
    match ty {
        ElementType::U8 => p.write(value as u8),
        ElementType::I8 => (p as *mut i8).write(value as i8),
        ElementType::U16 => (p as *mut u16).write_unaligned(value as u16),
        ElementType::I16 => (p as *mut i16).write_unaligned(value as i16),
        ElementType::U32 => (p as *mut u32).write_unaligned(value as u32),
        ElementType::I32 => (p as *mut i32).write_unaligned(value as i32),
        ElementType::U64 => (p as *mut u64).write_unaligned(value as u64),
        ElementType::I64 => (p as *mut i64).write_unaligned(value as i64),
        ElementType::F32 => (p as *mut f32).write_unaligned(value as f32),
        ElementType::F64 => (p as *mut f64).write_unaligned(value),
    }
}
