//! End-to-end flush pipeline tests: insert → promote → serialize → catalog.

use std::collections::BTreeSet;
use std::collections::HashSet;
use std::sync::Arc;

use tempfile::tempdir;
use tracing_subscriber::EnvFilter;

use strata_db::{
    BufferConfig, MemError, MemManager, MemoryCatalog, SegmentReader, TableSchema, VectorBatch,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

fn setup(
    dir: &std::path::Path,
    tables: &[(&str, usize)],
) -> (MemManager, Arc<MemoryCatalog>) {
    init_tracing();
    let catalog = Arc::new(MemoryCatalog::open(dir).unwrap());
    for (table_id, dim) in tables {
        catalog
            .create_table(TableSchema {
                table_id: table_id.to_string(),
                dim: *dim,
            })
            .unwrap();
    }
    let manager = MemManager::new(catalog.clone(), BufferConfig::default()).unwrap();
    (manager, catalog)
}

#[test]
fn test_insert_roundtrips_assigned_ids_through_flush() {
    let dir = tempdir().unwrap();
    let (manager, catalog) = setup(dir.path(), &[("t", 4)]);

    let mut batch = VectorBatch::new(vec![
        vec![1.0, 0.0, 0.0, 0.0],
        vec![0.0, 1.0, 0.0, 0.0],
        vec![0.0, 0.0, 1.0, 0.0],
    ]);
    manager.insert("t", &mut batch).unwrap();

    assert_eq!(batch.ids.len(), 3);
    let unique: HashSet<_> = batch.ids.iter().collect();
    assert_eq!(unique.len(), 3);
    assert!(manager.total_bytes() > 0);

    manager.flush_table("t", 7).unwrap();
    assert_eq!(manager.total_bytes(), 0);

    let segments = catalog.segments_for("t");
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].wal_lsn, 7);
    assert_eq!(segments[0].row_count, 3);

    let reader = SegmentReader::open(&segments[0].path).unwrap();
    assert_eq!(reader.wal_lsn(), 7);
    assert_eq!(reader.ids(), batch.ids);
    assert_eq!(reader.vector(1).unwrap(), &[0.0, 1.0, 0.0, 0.0]);
}

#[test]
fn test_flush_unknown_table_touches_nothing() {
    let dir = tempdir().unwrap();
    let (manager, catalog) = setup(dir.path(), &[]);

    assert!(matches!(
        manager.flush_table("missing", 1),
        Err(MemError::TableNotFound(_))
    ));
    assert!(catalog.segments_for("missing").is_empty());
    assert!(!dir.path().join("missing").exists());
}

#[test]
fn test_flush_all_serializes_only_touched_tables() {
    let dir = tempdir().unwrap();
    let (manager, catalog) = setup(dir.path(), &[("a", 2), ("b", 2), ("c", 2)]);

    // "a": insert then fully delete. The buffer saw writes, so it is
    // promoted and reported, but it nets out to nothing on disk.
    let mut batch = VectorBatch::with_ids(vec![vec![1.0, 1.0]], vec![100]);
    manager.insert("a", &mut batch).unwrap();
    manager.delete("a", 100).unwrap();

    // "b": one live vector.
    let mut batch = VectorBatch::new(vec![vec![2.0, 2.0]]);
    manager.insert("b", &mut batch).unwrap();

    // "c": buffer exists but never saw an append or delete.
    let mut empty = VectorBatch::default();
    manager.insert("c", &mut empty).unwrap();

    let flushed = manager.flush_all(5).unwrap();
    assert_eq!(flushed, BTreeSet::from(["a".to_string(), "b".to_string()]));

    assert!(catalog.segments_for("a").is_empty());
    let b_segments = catalog.segments_for("b");
    assert_eq!(b_segments.len(), 1);
    assert_eq!(b_segments[0].wal_lsn, 5);
    assert!(catalog.segments_for("c").is_empty());
    assert_eq!(manager.immutable_bytes(), 0);
}

#[test]
fn test_serialized_state_is_inserts_minus_deletes_per_table() {
    let dir = tempdir().unwrap();
    let (manager, catalog) = setup(dir.path(), &[("x", 2), ("y", 2)]);

    let mut x_batch = VectorBatch::with_ids(
        vec![vec![1.0, 0.0], vec![2.0, 0.0], vec![3.0, 0.0]],
        vec![1, 2, 3],
    );
    manager.insert("x", &mut x_batch).unwrap();
    let mut y_batch = VectorBatch::with_ids(vec![vec![9.0, 9.0]], vec![50]);
    manager.insert("y", &mut y_batch).unwrap();

    manager.delete_batch("x", &[2]).unwrap();

    let flushed = manager.flush_all(11).unwrap();
    assert_eq!(flushed, BTreeSet::from(["x".to_string(), "y".to_string()]));

    let x_reader = SegmentReader::open(&catalog.segments_for("x")[0].path).unwrap();
    assert_eq!(x_reader.ids(), vec![1, 3]);
    assert!(x_reader.tombstones().is_empty());

    let y_reader = SegmentReader::open(&catalog.segments_for("y")[0].path).unwrap();
    assert_eq!(y_reader.ids(), vec![50]);
}

#[test]
fn test_new_buffer_after_flush_is_a_fresh_instance() {
    let dir = tempdir().unwrap();
    let (manager, catalog) = setup(dir.path(), &[("t", 2)]);

    let mut batch = VectorBatch::new(vec![vec![1.0, 1.0]]);
    manager.insert("t", &mut batch).unwrap();
    manager.flush_table("t", 1).unwrap();

    let mut batch = VectorBatch::new(vec![vec![2.0, 2.0]]);
    manager.insert("t", &mut batch).unwrap();
    manager.flush_table("t", 2).unwrap();

    let segments = catalog.segments_for("t");
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].wal_lsn, 1);
    assert_eq!(segments[1].wal_lsn, 2);
    // Each cycle wrote exactly its own row.
    assert_eq!(segments[0].row_count, 1);
    assert_eq!(segments[1].row_count, 1);
}

#[test]
fn test_catalog_replay_preserves_lsn_correlation() {
    let dir = tempdir().unwrap();
    {
        let (manager, _) = setup(dir.path(), &[("t", 2)]);
        let mut batch = VectorBatch::new(vec![vec![1.0, 1.0]]);
        manager.insert("t", &mut batch).unwrap();
        manager.flush_table("t", 33).unwrap();
    }

    // A recovery pass reopening the catalog sees the segment and its LSN.
    let reopened = MemoryCatalog::open(dir.path()).unwrap();
    let segments = reopened.segments_for("t");
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].wal_lsn, 33);
    assert!(segments[0].path.exists());
}
