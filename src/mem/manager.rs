//! Write buffer manager
//!
//! Owns two collections under two independent locks:
//!
//! - the mutable directory (`table_id → MemTable`), guarded by `mutable`
//! - the immutable queue of promoted buffers, guarded by `immutable`
//!
//! Lock order is directory before queue, and no path holds both at once:
//! promotion removes buffers under the directory lock and returns them, the
//! flush path then appends and serializes them under the queue lock. The
//! serialization sweep holds the queue lock for its full duration, so an
//! erase racing a flush waits for the sweep to finish.
//!
//! Inserts pass an admission gate first: while the total buffered footprint
//! exceeds `insert_buffer_size`, the inserting thread parks on a condition
//! variable that every drain point (flush, erase) notifies, re-checking in
//! short slices. Crossing the ceiling emits a [`FlushHint`] so a background
//! flusher can start draining. The gate is advisory; the footprint sample
//! is taken without locks and may overshoot by one in-flight insert.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use crate::batch::{IdNumber, VectorBatch};
use crate::catalog::CatalogStore;
use crate::config::BufferConfig;
use crate::ids::IdGenerator;
use crate::mem::{MemError, MemTable, VectorSource};

/// Notification that the memory ceiling has been crossed.
#[derive(Debug, Clone, Copy)]
pub struct FlushHint {
    pub total_bytes: usize,
}

struct MemoryGate {
    lock: Mutex<()>,
    released: Condvar,
}

impl MemoryGate {
    fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            released: Condvar::new(),
        }
    }

    fn notify(&self) {
        self.released.notify_all();
    }
}

/// Per-process write buffer manager.
pub struct MemManager {
    catalog: Arc<dyn CatalogStore>,
    config: BufferConfig,
    ids: IdGenerator,
    mutable: Mutex<HashMap<String, Arc<MemTable>>>,
    immutable: Mutex<Vec<Arc<MemTable>>>,
    gate: MemoryGate,
    hint_tx: Sender<FlushHint>,
    hint_rx: Receiver<FlushHint>,
}

impl MemManager {
    pub fn new(catalog: Arc<dyn CatalogStore>, config: BufferConfig) -> Result<Self, MemError> {
        if config.insert_buffer_size == 0 {
            return Err(MemError::Config(
                "insert_buffer_size must be positive".to_string(),
            ));
        }
        let (hint_tx, hint_rx) = bounded(1);
        Ok(Self {
            catalog,
            config,
            ids: IdGenerator::new(),
            mutable: Mutex::new(HashMap::new()),
            immutable: Mutex::new(Vec::new()),
            gate: MemoryGate::new(),
            hint_tx,
            hint_rx,
        })
    }

    /// Receiver for memory-pressure notifications; a background flusher
    /// listening here is what unblocks gated inserts.
    pub fn flush_hints(&self) -> Receiver<FlushHint> {
        self.hint_rx.clone()
    }

    /// Append `batch` to `table_id`'s buffer.
    ///
    /// Stalls in the admission gate while the total footprint is over the
    /// ceiling. If the batch carried no ids, the assigned ids are written
    /// back into `batch.ids` before returning.
    pub fn insert(&self, table_id: &str, batch: &mut VectorBatch) -> Result<(), MemError> {
        self.wait_for_capacity()?;

        let caller_supplied_ids = !batch.ids.is_empty();
        let mut directory = self.mutable.lock();
        let mem = self.buffer_for(&mut directory, table_id)?;
        let source = VectorSource::new(batch, &self.ids)?;
        let assigned = mem.add(source)?;
        drop(directory);

        if !caller_supplied_ids {
            batch.ids = assigned;
        }
        Ok(())
    }

    /// Record a tombstone for one id. Not subject to the admission gate.
    pub fn delete(&self, table_id: &str, id: IdNumber) -> Result<(), MemError> {
        let mut directory = self.mutable.lock();
        let mem = self.buffer_for(&mut directory, table_id)?;
        mem.delete(id)
    }

    /// Record tombstones for `ids`, stopping at the first failure. Earlier
    /// tombstones within the same call stay applied.
    pub fn delete_batch(&self, table_id: &str, ids: &[IdNumber]) -> Result<(), MemError> {
        let mut directory = self.mutable.lock();
        let mem = self.buffer_for(&mut directory, table_id)?;
        for &id in ids {
            mem.delete(id)?;
        }
        Ok(())
    }

    /// Flush one table under `wal_lsn`.
    ///
    /// The table's buffer is promoted and the entire immutable queue is then
    /// serialized in order, so a flush for one table also drains earlier
    /// promotions that are still pending.
    pub fn flush_table(&self, table_id: &str, wal_lsn: u64) -> Result<(), MemError> {
        let promoted = self.promote_table(table_id)?;
        let mut queue = self.immutable.lock();
        queue.push(promoted);
        self.serialize_queue(&mut queue, wal_lsn);
        drop(queue);
        self.gate.notify();
        Ok(())
    }

    /// Flush every non-empty table under `wal_lsn`, returning the ids of
    /// tables whose buffers reached durable storage. Buffers that fail to
    /// serialize are logged and excluded, so callers never truncate the WAL
    /// past data that did not reach disk.
    pub fn flush_all(&self, wal_lsn: u64) -> Result<BTreeSet<String>, MemError> {
        let promoted = self.promote_non_empty();
        let mut queue = self.immutable.lock();
        queue.extend(promoted);
        let flushed = self.serialize_queue(&mut queue, wal_lsn);
        drop(queue);
        self.gate.notify();
        Ok(flushed)
    }

    /// Discard all buffered state for a table (table dropped).
    ///
    /// Waits for an in-progress serialization sweep before filtering the
    /// queue, so a buffer is never discarded mid-serialize.
    pub fn drop_table_buffers(&self, table_id: &str) {
        {
            self.mutable.lock().remove(table_id);
        }
        {
            self.immutable
                .lock()
                .retain(|mem| mem.table_id() != table_id);
        }
        self.gate.notify();
    }

    /// Bytes held by mutable buffers.
    pub fn mutable_bytes(&self) -> usize {
        self.mutable
            .lock()
            .values()
            .map(|mem| mem.current_mem())
            .sum()
    }

    /// Bytes held by buffers awaiting serialization.
    pub fn immutable_bytes(&self) -> usize {
        self.immutable
            .lock()
            .iter()
            .map(|mem| mem.current_mem())
            .sum()
    }

    /// Total buffered bytes. Each collection is summed under its own lock;
    /// the aggregate is not an atomic snapshot across both.
    pub fn total_bytes(&self) -> usize {
        self.mutable_bytes() + self.immutable_bytes()
    }

    fn wait_for_capacity(&self) -> Result<(), MemError> {
        let ceiling = self.config.insert_buffer_size;
        let total = self.total_bytes();
        if total <= ceiling {
            return Ok(());
        }

        let _ = self.hint_tx.try_send(FlushHint { total_bytes: total });
        tracing::warn!(
            "insert gated: {} buffered bytes over ceiling {}",
            total,
            ceiling
        );

        let start = Instant::now();
        let mut guard = self.gate.lock.lock();
        while self.total_bytes() > ceiling {
            if let Some(deadline) = self.config.gate_deadline {
                if start.elapsed() >= deadline {
                    return Err(MemError::WriteStalled(start.elapsed()));
                }
            }
            let _ = self
                .gate
                .released
                .wait_for(&mut guard, self.config.gate_poll_interval);
        }
        Ok(())
    }

    /// Resolve `table_id`'s buffer, creating it against the catalog schema
    /// on first reference. Caller holds the directory lock.
    fn buffer_for(
        &self,
        directory: &mut HashMap<String, Arc<MemTable>>,
        table_id: &str,
    ) -> Result<Arc<MemTable>, MemError> {
        if let Some(mem) = directory.get(table_id) {
            return Ok(mem.clone());
        }
        let schema = self.catalog.table_schema(table_id)?;
        let mem = Arc::new(MemTable::new(schema, self.catalog.clone(), &self.config));
        directory.insert(table_id.to_string(), mem.clone());
        Ok(mem)
    }

    /// Move one table's buffer out of the directory. Touches only the
    /// directory lock; the caller appends the result to the queue.
    fn promote_table(&self, table_id: &str) -> Result<Arc<MemTable>, MemError> {
        self.mutable
            .lock()
            .remove(table_id)
            .ok_or_else(|| MemError::TableNotFound(table_id.to_string()))
    }

    /// Move every non-empty buffer out of the directory. Empty buffers stay
    /// behind; there is nothing to serialize for them.
    fn promote_non_empty(&self) -> Vec<Arc<MemTable>> {
        let mut promoted = Vec::new();
        self.mutable.lock().retain(|_, mem| {
            if mem.is_empty() {
                true
            } else {
                promoted.push(mem.clone());
                false
            }
        });
        promoted
    }

    /// Serialize and drain the queue in order, under the queue lock held by
    /// the caller. Per-buffer failures are logged and do not stop the sweep;
    /// the queue is cleared either way.
    fn serialize_queue(&self, queue: &mut Vec<Arc<MemTable>>, wal_lsn: u64) -> BTreeSet<String> {
        let mut flushed = BTreeSet::new();
        for mem in queue.drain(..) {
            match mem.serialize(wal_lsn) {
                Ok(_) => {
                    flushed.insert(mem.table_id().to_string());
                }
                Err(err) => {
                    tracing::error!(
                        "failed to serialize buffer for table {}: {}",
                        mem.table_id(),
                        err
                    );
                }
            }
        }
        flushed
    }
}
