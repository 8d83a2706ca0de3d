//! .seg binary segment format
//!
//! A segment is the durable image of one flushed buffer. The WAL LSN it was
//! flushed under is stored both in the file name and in the header, so the
//! log tail can be correlated with on-disk data without opening the catalog.
//!
//! # File structure
//!
//! ```text
//! Offset   Size    Type        Description
//! ─────────────────────────────────────────────
//! 0x00     8       [u8; 8]     Magic: "STRSEG01"
//! 0x08     4       u32 LE      D: Dimensions
//! 0x0C     4       u32 LE      N: Number of rows
//! 0x10     4       u32 LE      T: Residual tombstone count
//! 0x14     8       u64 LE      WAL LSN
//! 0x1C     4                   Reserved
//! 0x20     N*D*4   [f32]       Vector data (row-major, Little Endian)
//! …        N*8     [u64]       Row ids
//! …        T*8     [u64]       Residual tombstone ids
//! ```
//!
//! Residual tombstones are deletes that did not hit a row buffered in the
//! same segment; the index layer applies them to older segments.

use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use thiserror::Error;

use crate::batch::IdNumber;

/// Magic bytes identifying a .seg file: "STRSEG01"
pub const MAGIC: [u8; 8] = *b"STRSEG01";

/// Header size in bytes.
pub const HEADER_SIZE: usize = 32;

#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("invalid magic bytes: expected STRSEG01")]
    InvalidMagic,

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("file truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("row index out of bounds: {index} >= {count}")]
    IndexOutOfBounds { index: usize, count: usize },

    #[error("vector block not aligned to f32 (4 bytes)")]
    Alignment,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Parsed .seg file header
#[derive(Debug, Clone, Copy)]
pub struct SegmentHeader {
    pub dim: u32,
    pub row_count: u32,
    pub tombstone_count: u32,
    pub wal_lsn: u64,
}

impl SegmentHeader {
    /// Parse header from the first [`HEADER_SIZE`] bytes of a file.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SegmentError> {
        if bytes.len() < HEADER_SIZE {
            return Err(SegmentError::Truncated {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        if bytes[0..8] != MAGIC {
            return Err(SegmentError::InvalidMagic);
        }

        let dim = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let row_count = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        let tombstone_count = u32::from_le_bytes(bytes[16..20].try_into().unwrap());
        let wal_lsn = u64::from_le_bytes(bytes[20..28].try_into().unwrap());

        Ok(Self {
            dim,
            row_count,
            tombstone_count,
            wal_lsn,
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(&MAGIC);
        buf[8..12].copy_from_slice(&self.dim.to_le_bytes());
        buf[12..16].copy_from_slice(&self.row_count.to_le_bytes());
        buf[16..20].copy_from_slice(&self.tombstone_count.to_le_bytes());
        buf[20..28].copy_from_slice(&self.wal_lsn.to_le_bytes());
        buf
    }

    fn vectors_len(&self) -> usize {
        self.row_count as usize * self.dim as usize * std::mem::size_of::<f32>()
    }

    fn ids_offset(&self) -> usize {
        HEADER_SIZE + self.vectors_len()
    }

    fn tombstones_offset(&self) -> usize {
        self.ids_offset() + self.row_count as usize * std::mem::size_of::<u64>()
    }

    /// Total file size implied by the header.
    pub fn file_size(&self) -> usize {
        self.tombstones_offset() + self.tombstone_count as usize * std::mem::size_of::<u64>()
    }
}

/// Incremental writer for .seg files.
///
/// Rows are streamed; ids are buffered and written behind the vector block
/// in `finish()`, which also patches the header with the final counts and
/// fsyncs the file and its parent directory before returning.
pub struct SegmentWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    dim: usize,
    wal_lsn: u64,
    ids: Vec<IdNumber>,
}

impl SegmentWriter {
    /// Create a new segment file, creating parent directories as needed.
    pub fn create(path: impl AsRef<Path>, dim: usize, wal_lsn: u64) -> Result<Self, SegmentError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);

        // Placeholder header, patched with real counts in finish().
        let header = SegmentHeader {
            dim: dim as u32,
            row_count: 0,
            tombstone_count: 0,
            wal_lsn,
        };
        writer.write_all(&header.to_bytes())?;

        Ok(Self {
            writer,
            path,
            dim,
            wal_lsn,
            ids: Vec::new(),
        })
    }

    /// Append one row. Vectors must match the segment dimension.
    pub fn append_row(&mut self, id: IdNumber, vector: &[f32]) -> Result<(), SegmentError> {
        if vector.len() != self.dim {
            return Err(SegmentError::DimensionMismatch {
                expected: self.dim,
                actual: vector.len(),
            });
        }
        for &val in vector {
            self.writer.write_all(&val.to_le_bytes())?;
        }
        self.ids.push(id);
        Ok(())
    }

    /// Write id and tombstone blocks, patch the header, and make the file
    /// durable. Returns the final file size in bytes.
    pub fn finish(mut self, tombstones: &[IdNumber]) -> Result<u64, SegmentError> {
        for &id in &self.ids {
            self.writer.write_all(&id.to_le_bytes())?;
        }
        for &id in tombstones {
            self.writer.write_all(&id.to_le_bytes())?;
        }

        let header = SegmentHeader {
            dim: self.dim as u32,
            row_count: self.ids.len() as u32,
            tombstone_count: tombstones.len() as u32,
            wal_lsn: self.wal_lsn,
        };
        self.writer.flush()?;

        let mut file = self.writer.into_inner().map_err(|e| e.into_error())?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header.to_bytes())?;
        file.sync_all()?;
        sync_parent(&self.path)?;

        Ok(header.file_size() as u64)
    }
}

/// Memory-mapped reader over a .seg file.
pub struct SegmentReader {
    mmap: Mmap,
    header: SegmentHeader,
}

impl SegmentReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SegmentError> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let header = SegmentHeader::from_bytes(&mmap)?;

        let expected = header.file_size();
        if mmap.len() < expected {
            return Err(SegmentError::Truncated {
                expected,
                actual: mmap.len(),
            });
        }

        Ok(Self { mmap, header })
    }

    pub fn header(&self) -> &SegmentHeader {
        &self.header
    }

    pub fn dim(&self) -> usize {
        self.header.dim as usize
    }

    pub fn row_count(&self) -> usize {
        self.header.row_count as usize
    }

    pub fn wal_lsn(&self) -> u64 {
        self.header.wal_lsn
    }

    /// Zero-copy access to one row's vector.
    pub fn vector(&self, index: usize) -> Result<&[f32], SegmentError> {
        let count = self.row_count();
        if index >= count {
            return Err(SegmentError::IndexOutOfBounds { index, count });
        }
        let row_bytes = self.dim() * std::mem::size_of::<f32>();
        let start = HEADER_SIZE + index * row_bytes;
        let bytes = &self.mmap[start..start + row_bytes];
        bytemuck::try_cast_slice(bytes).map_err(|_| SegmentError::Alignment)
    }

    /// Row ids, in row order.
    pub fn ids(&self) -> Vec<IdNumber> {
        let start = self.header.ids_offset();
        let end = self.header.tombstones_offset();
        parse_u64_block(&self.mmap[start..end])
    }

    /// Residual tombstone ids.
    pub fn tombstones(&self) -> Vec<IdNumber> {
        let start = self.header.tombstones_offset();
        let end = self.header.file_size();
        parse_u64_block(&self.mmap[start..end])
    }
}

// The id blocks follow a 4-aligned vector block, so they are read with
// explicit LE decoding rather than a cast.
fn parse_u64_block(bytes: &[u8]) -> Vec<u64> {
    bytes
        .chunks_exact(8)
        .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
        .collect()
}

/// File name for a segment flushed under `wal_lsn`; the LSN prefix keeps a
/// table's segments sortable in flush order.
pub fn segment_file_name(wal_lsn: u64) -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 6];
    rand::thread_rng().fill_bytes(&mut bytes);
    let mut suffix = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        suffix.push_str(&format!("{:02x}", b));
    }
    format!("seg_{:016x}_{}.seg", wal_lsn, suffix)
}

fn sync_parent(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent() {
            File::open(parent)?.sync_all()?;
        }
    }
    Ok(())
}
