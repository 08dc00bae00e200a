//! The fact table: ring-buffer storage, ingest and query entry points
//!
//! A `FactTable` owns a fixed `capacity x row_size` ring of packed rows plus
//! one dimension table per string column. Inserts normalize row maps and
//! overwrite the oldest rows once the ring is full; queries compile their
//! descriptor and aggregate in a single pass over the valid rows.
//!
//! All mutable state sits behind one `RwLock`: ingest (normalization,
//! dimension interning, the ring write) holds it exclusively, scans hold it
//! shared. Queries are therefore exact even while inserts are in flight.

use parking_lot::RwLock;
use std::io;
use std::path::{Path, PathBuf};

use crate::codec::RowCodec;
use crate::data::RowMap;
use crate::dimension::DimensionTable;
use crate::query::compile::compile;
use crate::query::result::format_buckets;
use crate::query::scan::scan;
use crate::query::{Query, QueryResults};
use crate::schema::Schema;
use crate::storage::{snapshot, RowStore};
use crate::{FactError, Result};

struct TableState {
    dims: Vec<DimensionTable>,
    rows: RowStore,
    count: usize,
    next_insert: usize,
}

/// A fixed-capacity table of packed rows. When more rows arrive than the
/// table can hold, writes wrap around and overwrite from index 0.
pub struct FactTable {
    schema: Schema,
    codec: RowCodec,
    capacity: usize,
    path: Option<PathBuf>,
    created_at: i64,
    state: RwLock<TableState>,
}

impl FactTable {
    /// Allocate a table. With a path, the row region is a memory map of a
    /// snapshot file created at that path; otherwise it lives on the heap.
    pub fn create(schema: Schema, capacity: usize, path: Option<&Path>) -> Result<Self> {
        assert!(capacity > 0, "capacity must be positive");
        let codec = RowCodec::new(&schema);
        let rows_len = capacity * codec.row_size();
        let rows = match path {
            Some(p) => RowStore::create_mapped(p, rows_len)?,
            None => RowStore::heap(rows_len),
        };
        let dims = vec![DimensionTable::new(); schema.dimension_count()];
        log::debug!(
            "created fact table: {} columns, row size {} bytes, capacity {} rows, backing {}",
            schema.column_count(),
            codec.row_size(),
            capacity,
            if rows.is_mapped() { "mmap" } else { "heap" },
        );
        Ok(Self {
            schema,
            codec,
            capacity,
            path: path.map(Path::to_path_buf),
            created_at: chrono::Utc::now().timestamp(),
            state: RwLock::new(TableState {
                dims,
                rows,
                count: 0,
                next_insert: 0,
            }),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn row_size(&self) -> usize {
        self.codec.row_size()
    }

    /// Number of valid rows, at most `capacity`.
    pub fn count(&self) -> usize {
        self.state.read().count
    }

    /// Ring index the next insert will overwrite.
    pub fn next_insert_position(&self) -> usize {
        self.state.read().next_insert
    }

    pub fn is_file_backed(&self) -> bool {
        self.path.is_some()
    }

    /// Insert a batch of row maps, in order, under the exclusive ingest
    /// lock. On error the rows before the failing one remain inserted; the
    /// batch is not atomic.
    pub fn insert(&self, rows: &[RowMap]) -> Result<()> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let row_size = self.codec.row_size();
        for row_map in rows {
            let row = self.codec.normalize(&self.schema, &mut state.dims, row_map)?;
            state
                .rows
                .row_mut(state.next_insert, row_size)
                .copy_from_slice(&row);
            state.next_insert = (state.next_insert + 1) % self.capacity;
            if state.count < self.capacity {
                state.count += 1;
            }
        }
        Ok(())
    }

    /// Compile and run a query, returning one result row per bucket.
    pub fn query(&self, query: &Query) -> Result<QueryResults> {
        let state = self.state.read();
        let compiled = compile(query, &self.schema, &self.codec, &state.dims)?;
        let buckets = scan(
            state.rows.as_slice(),
            state.count,
            &self.codec,
            &compiled,
            self.schema.column_count(),
        );
        Ok(format_buckets(buckets, &compiled, &self.schema, &state.dims))
    }

    /// Denormalized rows in `[start, end)`, in raw storage order. Debug aid;
    /// an out-of-range window is a caller bug.
    pub fn row_maps(&self, start: usize, end: usize) -> Vec<RowMap> {
        let state = self.state.read();
        assert!(
            start <= end && end <= state.count,
            "row range {start}..{end} out of bounds for {} rows",
            state.count
        );
        let row_size = self.codec.row_size();
        (start..end)
            .map(|i| {
                self.codec
                    .denormalize(&self.schema, &state.dims, state.rows.row(i, row_size))
            })
            .collect()
    }

    /// Persist the current state into the backing file: flush mapped row
    /// pages, then rewrite the meta region and header.
    pub fn snapshot(&self) -> Result<()> {
        let state = self.state.read();
        let path = self.path.as_deref().ok_or_else(|| {
            FactError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "table has no backing file; use snapshot_to",
            ))
        })?;
        state.rows.flush()?;
        let file = state
            .rows
            .file()
            .expect("file-backed table has a file handle");
        let meta = snapshot::SnapshotMeta {
            schema: self.schema.clone(),
            dimensions: state.dims.clone(),
        };
        snapshot::write_meta_and_header(
            file,
            self.capacity,
            self.codec.row_size(),
            state.count,
            state.next_insert,
            self.created_at,
            &meta,
        )?;
        log::info!("snapshot of {} rows written to {}", state.count, path.display());
        Ok(())
    }

    /// Write a full snapshot (header, rows, meta) to `path`, regardless of
    /// backing. The table keeps using its current backing afterwards.
    pub fn snapshot_to(&self, path: &Path) -> Result<()> {
        use std::io::{Seek, SeekFrom, Write};

        let state = self.state.read();
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut f = &file;
        f.seek(SeekFrom::Start(snapshot::ROWS_OFFSET as u64))?;
        f.write_all(state.rows.as_slice())?;
        let meta = snapshot::SnapshotMeta {
            schema: self.schema.clone(),
            dimensions: state.dims.clone(),
        };
        snapshot::write_meta_and_header(
            &file,
            self.capacity,
            self.codec.row_size(),
            state.count,
            state.next_insert,
            self.created_at,
            &meta,
        )?;
        log::info!("snapshot of {} rows written to {}", state.count, path.display());
        Ok(())
    }

    /// Reopen a snapshot, memory-mapping its row region. The persisted
    /// schema must equal the supplied one.
    pub fn restore(path: &Path, schema: Schema) -> Result<Self> {
        let (header, meta, codec) = Self::read_and_check(path, &schema)?;
        let rows_len = header.capacity as usize * codec.row_size();
        let rows = RowStore::open_mapped(path, rows_len)?;
        Self::assemble(schema, codec, header, meta, rows, Some(path.to_path_buf()))
    }

    /// Reopen a snapshot into a heap-backed table, leaving the file alone.
    pub fn restore_in_memory(path: &Path, schema: Schema) -> Result<Self> {
        use std::io::{Read, Seek, SeekFrom};

        let (header, meta, codec) = Self::read_and_check(path, &schema)?;
        let rows_len = header.capacity as usize * codec.row_size();
        let mut buf = vec![0u8; rows_len];
        let mut file = std::fs::File::open(path)?;
        file.seek(SeekFrom::Start(snapshot::ROWS_OFFSET as u64))?;
        file.read_exact(&mut buf)?;
        Self::assemble(schema, codec, header, meta, RowStore::Heap(buf), None)
    }

    fn read_and_check(
        path: &Path,
        schema: &Schema,
    ) -> Result<(snapshot::SnapshotHeader, snapshot::SnapshotMeta, RowCodec)> {
        let (header, meta) = snapshot::read_header_and_meta(path)?;
        if &meta.schema != schema {
            return Err(FactError::SchemaMismatch(
                "persisted schema differs from the supplied schema".to_string(),
            ));
        }
        let codec = RowCodec::new(schema);
        if header.row_size != codec.row_size() as u64 || header.count > header.capacity {
            return Err(FactError::InvalidFileFormat);
        }
        Ok((header, meta, codec))
    }

    fn assemble(
        schema: Schema,
        codec: RowCodec,
        header: snapshot::SnapshotHeader,
        meta: snapshot::SnapshotMeta,
        rows: RowStore,
        path: Option<PathBuf>,
    ) -> Result<Self> {
        log::info!("restored fact table: {} of {} rows valid", header.count, header.capacity);
        Ok(Self {
            schema,
            codec,
            capacity: header.capacity as usize,
            path,
            created_at: header.created_at,
            state: RwLock::new(TableState {
                dims: meta.dimensions,
                rows,
                count: header.count as usize,
                next_insert: header.next_insert as usize,
            }),
        })
    }
}
