//! In-memory write buffers and their manager
//!
//! A [`MemTable`] accumulates one table's inserts and tombstones between
//! flushes. The [`MemManager`] owns the per-table directory of mutable
//! buffers, the queue of promoted immutable buffers, and the admission gate
//! that stalls inserts when the global footprint crosses the configured
//! ceiling.

mod manager;
mod source;
mod table;

pub use manager::{FlushHint, MemManager};
pub use source::VectorSource;
pub use table::MemTable;

use std::time::Duration;

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::segment::SegmentError;

#[derive(Error, Debug)]
pub enum MemError {
    #[error("no buffered writes for table: {0}")]
    TableNotFound(String),

    #[error("id array length {ids} does not match vector count {vectors}")]
    IdCountMismatch { ids: usize, vectors: usize },

    #[error("dimension mismatch for table {table_id}: expected {expected}, got {actual}")]
    DimensionMismatch {
        table_id: String,
        expected: usize,
        actual: usize,
    },

    #[error("tombstone limit {limit} reached for table {table_id}")]
    TombstoneLimit { table_id: String, limit: usize },

    #[error("insert stalled in admission gate for {0:?}")]
    WriteStalled(Duration),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("segment error: {0}")]
    Segment(#[from] SegmentError),
}
