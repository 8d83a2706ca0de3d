//! Configuration for the write buffer manager

use std::time::Duration;

/// Tuning knobs for [`MemManager`](crate::MemManager).
///
/// `insert_buffer_size` is a soft ceiling: an insert observing the total
/// footprint above it stalls in the admission gate until a flush or erase
/// releases memory. The sample is taken without locks, so a modest overshoot
/// by one in-flight insert is expected.
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Soft global memory ceiling in bytes. Must be positive.
    pub insert_buffer_size: usize,

    /// How long a gated insert waits between re-checks of the footprint.
    pub gate_poll_interval: Duration,

    /// Upper bound on how long an insert may stall in the gate.
    /// `None` blocks until memory is released.
    pub gate_deadline: Option<Duration>,

    /// Max tombstones held per buffer between flushes.
    pub max_tombstones_per_buffer: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            insert_buffer_size: 256 * 1024 * 1024, // 256 MB
            gate_poll_interval: Duration::from_millis(1),
            gate_deadline: None,
            max_tombstones_per_buffer: 1 << 20,
        }
    }
}

impl BufferConfig {
    /// Config with the given memory ceiling and default gate behavior.
    pub fn with_buffer_size(insert_buffer_size: usize) -> Self {
        Self {
            insert_buffer_size,
            ..Self::default()
        }
    }
}
