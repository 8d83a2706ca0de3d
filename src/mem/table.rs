//! Per-table mutable buffer
//!
//! Rows and tombstones accumulate here between flushes. The byte footprint
//! only grows over a buffer's lifetime; the whole object is dropped after
//! serialization, so there is nothing to shrink.
//!
//! Uses parking_lot::RwLock for the row store and atomics for the counters,
//! so footprint and emptiness probes never contend with an in-flight append.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::batch::IdNumber;
use crate::catalog::{CatalogStore, SegmentRecord, TableSchema};
use crate::config::BufferConfig;
use crate::mem::{MemError, VectorSource};
use crate::segment::{segment_file_name, SegmentWriter};

/// Accounted bytes per buffered tombstone.
const TOMBSTONE_BYTES: usize = 16;

struct Row {
    id: IdNumber,
    values: Vec<f32>,
}

#[derive(Default)]
struct Inner {
    rows: Vec<Row>,
    tombstones: HashSet<IdNumber>,
}

/// One table's in-memory write buffer.
///
/// Shared as `Arc<MemTable>` between the manager's collections; all methods
/// take `&self` and are safe against concurrent footprint reads.
pub struct MemTable {
    schema: TableSchema,
    catalog: Arc<dyn CatalogStore>,
    max_tombstones: usize,
    inner: RwLock<Inner>,
    mem_bytes: AtomicUsize,
    touched: AtomicBool,
}

impl MemTable {
    pub fn new(schema: TableSchema, catalog: Arc<dyn CatalogStore>, config: &BufferConfig) -> Self {
        Self {
            schema,
            catalog,
            max_tombstones: config.max_tombstones_per_buffer,
            inner: RwLock::new(Inner::default()),
            mem_bytes: AtomicUsize::new(0),
            touched: AtomicBool::new(false),
        }
    }

    pub fn table_id(&self) -> &str {
        &self.schema.table_id
    }

    pub fn dim(&self) -> usize {
        self.schema.dim
    }

    /// Append every row of `source`, returning the ids that were written.
    ///
    /// A zero-row source is a no-op and does not mark the buffer dirty.
    pub fn add(&self, source: VectorSource<'_>) -> Result<Vec<IdNumber>, MemError> {
        if source.is_empty() {
            return Ok(Vec::new());
        }

        for (_, values) in source.rows() {
            if values.len() != self.schema.dim {
                return Err(MemError::DimensionMismatch {
                    table_id: self.schema.table_id.clone(),
                    expected: self.schema.dim,
                    actual: values.len(),
                });
            }
        }

        let row_bytes = self.schema.dim * std::mem::size_of::<f32>()
            + std::mem::size_of::<IdNumber>();
        let mut inner = self.inner.write();
        let mut appended = 0;
        for (id, values) in source.rows() {
            inner.rows.push(Row {
                id,
                values: values.to_vec(),
            });
            appended += 1;
        }
        drop(inner);

        self.mem_bytes.fetch_add(appended * row_bytes, Ordering::Relaxed);
        self.touched.store(true, Ordering::Release);
        Ok(source.into_ids())
    }

    /// Record a tombstone for `id`. Idempotent; unknown ids are accepted and
    /// carried into the next segment for downstream application.
    pub fn delete(&self, id: IdNumber) -> Result<(), MemError> {
        let mut inner = self.inner.write();
        if inner.tombstones.contains(&id) {
            return Ok(());
        }
        if inner.tombstones.len() >= self.max_tombstones {
            return Err(MemError::TombstoneLimit {
                table_id: self.schema.table_id.clone(),
                limit: self.max_tombstones,
            });
        }
        inner.tombstones.insert(id);
        drop(inner);

        self.mem_bytes.fetch_add(TOMBSTONE_BYTES, Ordering::Relaxed);
        self.touched.store(true, Ordering::Release);
        Ok(())
    }

    /// Current footprint in bytes. Monotone non-decreasing until the buffer
    /// is dropped after serialization.
    pub fn current_mem(&self) -> usize {
        self.mem_bytes.load(Ordering::Relaxed)
    }

    /// True iff no append and no delete has been applied since construction.
    pub fn is_empty(&self) -> bool {
        !self.touched.load(Ordering::Acquire)
    }

    /// Materialize the buffer into a durable segment keyed by `wal_lsn`.
    ///
    /// Tombstones that hit buffered rows suppress those rows; the rest are
    /// persisted in the segment's tombstone block. Returns `None` when the
    /// buffer nets out to nothing (all appends canceled by deletes).
    pub fn serialize(&self, wal_lsn: u64) -> Result<Option<SegmentRecord>, MemError> {
        let inner = self.inner.read();

        let live: Vec<&Row> = inner
            .rows
            .iter()
            .filter(|row| !inner.tombstones.contains(&row.id))
            .collect();
        let buffered: HashSet<IdNumber> = inner.rows.iter().map(|row| row.id).collect();
        let mut residual: Vec<IdNumber> = inner
            .tombstones
            .iter()
            .copied()
            .filter(|id| !buffered.contains(id))
            .collect();
        residual.sort_unstable();

        if live.is_empty() && residual.is_empty() {
            return Ok(None);
        }

        let file_name = segment_file_name(wal_lsn);
        let path = self.catalog.segment_path(&self.schema.table_id, &file_name);
        let mut writer = SegmentWriter::create(&path, self.schema.dim, wal_lsn)?;
        for row in &live {
            writer.append_row(row.id, &row.values)?;
        }
        let size_bytes = writer.finish(&residual)?;

        let record = SegmentRecord {
            segment_id: file_name.trim_end_matches(".seg").to_string(),
            table_id: self.schema.table_id.clone(),
            path,
            row_count: live.len(),
            tombstone_count: residual.len(),
            wal_lsn,
            size_bytes,
        };
        self.catalog.register_segment(record.clone())?;

        tracing::info!(
            "serialized {} rows ({} residual tombstones) for table {} at lsn {}",
            record.row_count,
            record.tombstone_count,
            record.table_id,
            wal_lsn
        );
        Ok(Some(record))
    }
}
