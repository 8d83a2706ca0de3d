//! Batch-to-buffer adapter
//!
//! A [`VectorSource`] wraps one incoming [`VectorBatch`], resolving its ids
//! up front: caller-supplied ids are validated against the vector count,
//! otherwise fresh ids come from the shared [`IdGenerator`]. The source is
//! single-use; appending it to a buffer consumes it and yields the ids that
//! were actually written, which the manager copies back into the batch when
//! the caller supplied none.

use crate::batch::{IdNumber, VectorBatch};
use crate::ids::IdGenerator;
use crate::mem::MemError;

/// Single-use view over one batch with resolved ids.
pub struct VectorSource<'a> {
    vectors: &'a [Vec<f32>],
    ids: Vec<IdNumber>,
}

impl<'a> VectorSource<'a> {
    /// Wrap `batch`, assigning ids from `generator` if the batch has none.
    pub fn new(batch: &'a VectorBatch, generator: &IdGenerator) -> Result<Self, MemError> {
        if !batch.ids.is_empty() && batch.ids.len() != batch.vectors.len() {
            return Err(MemError::IdCountMismatch {
                ids: batch.ids.len(),
                vectors: batch.vectors.len(),
            });
        }

        let ids = if batch.ids.is_empty() {
            generator.next_batch(batch.vectors.len())
        } else {
            batch.ids.clone()
        };

        Ok(Self {
            vectors: &batch.vectors,
            ids,
        })
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Rows in batch order.
    pub(crate) fn rows(&self) -> impl Iterator<Item = (IdNumber, &[f32])> {
        self.ids
            .iter()
            .copied()
            .zip(self.vectors.iter().map(|v| v.as_slice()))
    }

    /// The ids this source carries, consuming it.
    pub(crate) fn into_ids(self) -> Vec<IdNumber> {
        self.ids
    }
}
