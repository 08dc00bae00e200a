//! Row-region storage
//!
//! The fact table's rows live in one flat `capacity x row_size` byte region,
//! either on the heap or memory-mapped from the snapshot file. File-backed
//! regions start at a page-aligned offset past the snapshot header so the
//! mapping covers exactly the rows.

pub mod snapshot;

use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::path::Path;

use crate::Result;
use self::snapshot::ROWS_OFFSET;

/// Backing for the row region.
pub enum RowStore {
    Heap(Vec<u8>),
    Mapped { file: File, mmap: MmapMut },
}

impl RowStore {
    /// An in-memory region of `len` zero bytes.
    pub fn heap(len: usize) -> Self {
        RowStore::Heap(vec![0; len])
    }

    /// Create (or truncate) the snapshot file at `path`, size it for the
    /// header plus `rows_len` bytes of rows, and map the row region
    /// writable. Writes through the map go straight to the page cache; the
    /// kernel owns durability.
    pub fn create_mapped(path: &Path, rows_len: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len((ROWS_OFFSET + rows_len) as u64)?;
        let mmap = unsafe {
            MmapOptions::new()
                .offset(ROWS_OFFSET as u64)
                .len(rows_len)
                .map_mut(&file)?
        };
        Ok(RowStore::Mapped { file, mmap })
    }

    /// Map the row region of an existing snapshot file.
    pub fn open_mapped(path: &Path, rows_len: usize) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let mmap = unsafe {
            MmapOptions::new()
                .offset(ROWS_OFFSET as u64)
                .len(rows_len)
                .map_mut(&file)?
        };
        Ok(RowStore::Mapped { file, mmap })
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            RowStore::Heap(buf) => buf,
            RowStore::Mapped { mmap, .. } => mmap,
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            RowStore::Heap(buf) => buf,
            RowStore::Mapped { mmap, .. } => mmap,
        }
    }

    /// View of row `index`.
    #[inline]
    pub fn row(&self, index: usize, row_size: usize) -> &[u8] {
        &self.as_slice()[index * row_size..(index + 1) * row_size]
    }

    #[inline]
    pub fn row_mut(&mut self, index: usize, row_size: usize) -> &mut [u8] {
        &mut self.as_mut_slice()[index * row_size..(index + 1) * row_size]
    }

    /// Flush mapped pages to disk; no-op for heap regions.
    pub fn flush(&self) -> Result<()> {
        if let RowStore::Mapped { mmap, .. } = self {
            mmap.flush()?;
        }
        Ok(())
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self, RowStore::Mapped { .. })
    }

    /// The backing file handle, when file-backed.
    pub fn file(&self) -> Option<&File> {
        match self {
            RowStore::Heap(_) => None,
            RowStore::Mapped { file, .. } => Some(file),
        }
    }
}
