//! Vector batches handed to the ingest path
//!
//! A batch is an ordered list of equal-dimension vectors plus an optional
//! parallel id array. When the id array is empty on input, the ingest path
//! assigns fresh ids and writes them back into the batch before returning.

/// Vector identifier, unique within a table.
pub type IdNumber = u64;

/// An ordered batch of vectors with an optional parallel id array.
///
/// `ids` is either empty (ids will be assigned during insert) or exactly as
/// long as `vectors`. Empty batches are legal and insert as a no-op.
#[derive(Debug, Clone, Default)]
pub struct VectorBatch {
    pub vectors: Vec<Vec<f32>>,
    pub ids: Vec<IdNumber>,
}

impl VectorBatch {
    /// Batch with ids to be assigned on insert.
    pub fn new(vectors: Vec<Vec<f32>>) -> Self {
        Self {
            vectors,
            ids: Vec::new(),
        }
    }

    /// Batch with caller-supplied ids.
    pub fn with_ids(vectors: Vec<Vec<f32>>, ids: Vec<IdNumber>) -> Self {
        Self { vectors, ids }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}
