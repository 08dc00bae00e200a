//! Snapshot file format
//!
//! Layout: `[header, 4096 bytes][capacity x row_size rows][meta]`.
//! The header carries the ring cursor and region offsets; the meta region is
//! a bincode image of the schema and dimension tables. The row region starts
//! at a page-aligned offset so it can be memory-mapped directly. Row cells
//! are stored in host byte order, so a snapshot is not portable across
//! architectures; header fields are little-endian.

use byteorder::{LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::dimension::DimensionTable;
use crate::schema::Schema;
use crate::{FactError, Result};

/// Magic bytes "FACTBASE"
pub const MAGIC: &[u8; 8] = b"FACTBASE";
/// Snapshot format version
pub const FORMAT_VERSION: u32 = 1;
/// Header region size; also the row-region offset (page-aligned for mmap).
pub const HEADER_SIZE: usize = 4096;
pub const ROWS_OFFSET: usize = HEADER_SIZE;

/// Fixed-size snapshot header (4KB)
#[derive(Debug, Clone)]
pub struct SnapshotHeader {
    /// Format version
    pub version: u32,
    /// Bytes per packed row
    pub row_size: u64,
    /// Ring capacity in rows
    pub capacity: u64,
    /// Number of valid rows
    pub count: u64,
    /// Ring write cursor
    pub next_insert: u64,
    /// Offset of the row region (always `ROWS_OFFSET`)
    pub rows_offset: u64,
    /// Offset of the meta region
    pub meta_offset: u64,
    /// Meta region length in bytes
    pub meta_len: u64,
    /// CRC32 of the meta region
    pub meta_crc: u32,
    /// Creation timestamp (Unix seconds)
    pub created_at: i64,
    /// Last snapshot timestamp
    pub modified_at: i64,
}

impl SnapshotHeader {
    /// Serialize to bytes: fields little-endian, CRC32 of the preceding
    /// bytes appended, zero-padded to `HEADER_SIZE`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.row_size.to_le_bytes());
        buf.extend_from_slice(&self.capacity.to_le_bytes());
        buf.extend_from_slice(&self.count.to_le_bytes());
        buf.extend_from_slice(&self.next_insert.to_le_bytes());
        buf.extend_from_slice(&self.rows_offset.to_le_bytes());
        buf.extend_from_slice(&self.meta_offset.to_le_bytes());
        buf.extend_from_slice(&self.meta_len.to_le_bytes());
        buf.extend_from_slice(&self.meta_crc.to_le_bytes());
        buf.extend_from_slice(&self.created_at.to_le_bytes());
        buf.extend_from_slice(&self.modified_at.to_le_bytes());

        let checksum = crc32fast::hash(&buf);
        buf.extend_from_slice(&checksum.to_le_bytes());

        buf.resize(HEADER_SIZE, 0);
        buf
    }

    /// Deserialize and validate magic, version and checksum.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(FactError::InvalidFileFormat);
        }

        let mut cursor = Cursor::new(bytes);
        let mut magic = [0u8; 8];
        cursor.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(FactError::InvalidFileFormat);
        }

        let version = cursor.read_u32::<LittleEndian>()?;
        if version != FORMAT_VERSION {
            return Err(FactError::VersionMismatch {
                expected: FORMAT_VERSION,
                actual: version,
            });
        }

        let row_size = cursor.read_u64::<LittleEndian>()?;
        let capacity = cursor.read_u64::<LittleEndian>()?;
        let count = cursor.read_u64::<LittleEndian>()?;
        let next_insert = cursor.read_u64::<LittleEndian>()?;
        let rows_offset = cursor.read_u64::<LittleEndian>()?;
        let meta_offset = cursor.read_u64::<LittleEndian>()?;
        let meta_len = cursor.read_u64::<LittleEndian>()?;
        let meta_crc = cursor.read_u32::<LittleEndian>()?;
        let created_at = cursor.read_i64::<LittleEndian>()?;
        let modified_at = cursor.read_i64::<LittleEndian>()?;

        let checksummed = cursor.position() as usize;
        let stored = cursor.read_u32::<LittleEndian>()?;
        if crc32fast::hash(&bytes[..checksummed]) != stored {
            return Err(FactError::ChecksumMismatch);
        }

        if rows_offset != ROWS_OFFSET as u64 {
            return Err(FactError::InvalidFileFormat);
        }

        Ok(Self {
            version,
            row_size,
            capacity,
            count,
            next_insert,
            rows_offset,
            meta_offset,
            meta_len,
            meta_crc,
            created_at,
            modified_at,
        })
    }
}

/// Everything outside the raw row bytes that a restore needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub schema: Schema,
    pub dimensions: Vec<DimensionTable>,
}

/// Write the meta region after the rows and a fresh header over the front of
/// `file`. The row region itself is expected to be in place already (flushed
/// mmap pages, or written by the caller for heap tables).
pub(crate) fn write_meta_and_header(
    file: &File,
    capacity: usize,
    row_size: usize,
    count: usize,
    next_insert: usize,
    created_at: i64,
    meta: &SnapshotMeta,
) -> Result<()> {
    let meta_bytes =
        bincode::serialize(meta).map_err(|e| FactError::SerializationError(e.to_string()))?;
    let meta_offset = (ROWS_OFFSET + capacity * row_size) as u64;

    let mut f = file;
    f.seek(SeekFrom::Start(meta_offset))?;
    f.write_all(&meta_bytes)?;
    // Drop any stale tail from a previous, larger meta region.
    file.set_len(meta_offset + meta_bytes.len() as u64)?;

    let header = SnapshotHeader {
        version: FORMAT_VERSION,
        row_size: row_size as u64,
        capacity: capacity as u64,
        count: count as u64,
        next_insert: next_insert as u64,
        rows_offset: ROWS_OFFSET as u64,
        meta_offset,
        meta_len: meta_bytes.len() as u64,
        meta_crc: crc32fast::hash(&meta_bytes),
        created_at,
        modified_at: chrono::Utc::now().timestamp(),
    };
    f.seek(SeekFrom::Start(0))?;
    f.write_all(&header.to_bytes())?;
    f.sync_all()?;
    Ok(())
}

/// Read and validate the header and meta regions of a snapshot file.
pub(crate) fn read_header_and_meta(path: &Path) -> Result<(SnapshotHeader, SnapshotMeta)> {
    let mut file = File::open(path)?;
    let mut header_bytes = vec![0u8; HEADER_SIZE];
    file.read_exact(&mut header_bytes)?;
    let header = SnapshotHeader::from_bytes(&header_bytes)?;

    let mut meta_bytes = vec![0u8; header.meta_len as usize];
    file.seek(SeekFrom::Start(header.meta_offset))?;
    file.read_exact(&mut meta_bytes)?;
    if crc32fast::hash(&meta_bytes) != header.meta_crc {
        return Err(FactError::ChecksumMismatch);
    }

    let meta: SnapshotMeta = bincode::deserialize(&meta_bytes)
        .map_err(|e| FactError::SerializationError(e.to_string()))?;
    Ok((header, meta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DimensionColumn, ElementType, MetricColumn};
    use tempfile::tempdir;

    fn header_fixture() -> SnapshotHeader {
        SnapshotHeader {
            version: FORMAT_VERSION,
            row_size: 14,
            capacity: 100,
            count: 42,
            next_insert: 42,
            rows_offset: ROWS_OFFSET as u64,
            meta_offset: (ROWS_OFFSET + 1400) as u64,
            meta_len: 77,
            meta_crc: 0xDEAD_BEEF,
            created_at: 1_700_000_000,
            modified_at: 1_700_000_100,
        }
    }

    #[test]
    fn test_header_round_trip() {
        let header = header_fixture();
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE);

        let back = SnapshotHeader::from_bytes(&bytes).unwrap();
        assert_eq!(back.row_size, 14);
        assert_eq!(back.capacity, 100);
        assert_eq!(back.count, 42);
        assert_eq!(back.next_insert, 42);
        assert_eq!(back.meta_len, 77);
        assert_eq!(back.meta_crc, 0xDEAD_BEEF);
    }

    #[test]
    fn test_header_rejects_bad_magic() {
        let mut bytes = header_fixture().to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            SnapshotHeader::from_bytes(&bytes),
            Err(FactError::InvalidFileFormat)
        ));
    }

    #[test]
    fn test_header_rejects_corruption() {
        let mut bytes = header_fixture().to_bytes();
        bytes[20] ^= 0xFF;
        assert!(matches!(
            SnapshotHeader::from_bytes(&bytes),
            Err(FactError::ChecksumMismatch)
        ));
    }

    #[test]
    fn test_header_rejects_future_version() {
        let mut header = header_fixture();
        header.version = FORMAT_VERSION + 1;
        // to_bytes re-checksums, so only the version check can fire.
        let bytes = header.to_bytes();
        assert!(matches!(
            SnapshotHeader::from_bytes(&bytes),
            Err(FactError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_meta_region_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("table.fact");

        let schema = Schema::new(
            vec![DimensionColumn::string("country", ElementType::U32)],
            vec![MetricColumn::new("hits", ElementType::U64)],
        )
        .unwrap();
        let mut dims = vec![DimensionTable::new()];
        dims[0].get_or_insert("japan");
        dims[0].get_or_insert("peru");
        let meta = SnapshotMeta {
            schema: schema.clone(),
            dimensions: dims.clone(),
        };

        let capacity = 8;
        let row_size = 12;
        {
            let file = std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&path)
                .unwrap();
            file.set_len((ROWS_OFFSET + capacity * row_size) as u64).unwrap();
            write_meta_and_header(&file, capacity, row_size, 3, 3, 1_700_000_000, &meta).unwrap();
        }

        let (header, back) = read_header_and_meta(&path).unwrap();
        assert_eq!(header.count, 3);
        assert_eq!(header.next_insert, 3);
        assert_eq!(header.capacity, capacity as u64);
        assert_eq!(back.schema, schema);
        assert_eq!(back.dimensions, dims);
        assert_eq!(back.dimensions[0].lookup("peru"), Some(1));
    }

    #[test]
    fn test_meta_corruption_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("table.fact");

        let schema = Schema::new(
            vec![],
            vec![MetricColumn::new("hits", ElementType::U64)],
        )
        .unwrap();
        let meta = SnapshotMeta {
            schema,
            dimensions: vec![],
        };
        {
            let file = std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&path)
                .unwrap();
            file.set_len((ROWS_OFFSET + 8) as u64).unwrap();
            write_meta_and_header(&file, 1, 8, 0, 0, 0, &meta).unwrap();
        }
        // Flip a byte inside the meta region.
        {
            let mut file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start((ROWS_OFFSET + 8) as u64)).unwrap();
            file.write_all(&[0xFF]).unwrap();
        }
        assert!(matches!(
            read_header_and_meta(&path),
            Err(FactError::ChecksumMismatch)
        ));
    }
}
