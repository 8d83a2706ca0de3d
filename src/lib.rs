//! Strata-DB: write-ahead buffered ingest layer for a vector database
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  MemManager (per process)                   │
//! │    mutable directory · immutable queue · admission gate     │
//! ├─────────────────────────────────────────────────────────────┤
//! │             MemTable (per table, VectorSource fed)          │
//! │         appended rows · tombstones · byte accounting        │
//! ├─────────────────────────────────────────────────────────────┤
//! │            SegmentWriter (LSN-tagged .seg files)            │
//! │          CatalogStore (schemas + segment manifest)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Inserts and deletes enter [`MemManager`] keyed by table id and accumulate
//! in per-table [`MemTable`] buffers. A flush promotes buffers into an
//! immutable queue and serializes each one into an on-disk segment named
//! with the supplied WAL LSN, so the log can be truncated past persisted
//! data after a crash.

pub mod batch;
pub mod catalog;
pub mod config;
pub mod ids;
pub mod mem;
pub mod segment;

pub use batch::{IdNumber, VectorBatch};
pub use catalog::{CatalogError, CatalogStore, MemoryCatalog, SegmentRecord, TableSchema};
pub use config::BufferConfig;
pub use ids::IdGenerator;
pub use mem::{FlushHint, MemError, MemManager, MemTable, VectorSource};
pub use segment::{SegmentError, SegmentReader, SegmentWriter};
