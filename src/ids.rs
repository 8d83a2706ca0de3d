//! Vector id assignment
//!
//! Ids are 64-bit values unique within the process: the high bits carry the
//! construction timestamp in milliseconds, the low bits an atomic counter.
//! Restarting the process re-seeds from the clock, so ids keep increasing
//! across runs as long as the clock does not move backwards and fewer than
//! 2^20 ids are handed out per millisecond of uptime.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::batch::IdNumber;

/// Bits reserved for the per-process counter below the timestamp.
const COUNTER_BITS: u32 = 20;

/// Monotonic id source shared by all tables of one manager.
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            next: AtomicU64::new(millis << COUNTER_BITS),
        }
    }

    /// Next single id.
    pub fn next_id(&self) -> IdNumber {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// `count` consecutive ids, returned as a materialized range.
    pub fn next_batch(&self, count: usize) -> Vec<IdNumber> {
        let start = self.next.fetch_add(count as u64, Ordering::Relaxed);
        (start..start + count as u64).collect()
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
