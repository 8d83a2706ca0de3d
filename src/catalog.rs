//! Metadata catalog: table schemas and the segment manifest
//!
//! The write buffer only needs three things from the catalog: the schema of
//! a table (to size and validate buffers), a place to put segment files,
//! and a durable record of every segment it has written so a recovery pass
//! can correlate on-disk segments with WAL positions.
//!
//! [`MemoryCatalog`] keeps schemas and segment records in memory and mirrors
//! every mutation to an append-only JSON-lines manifest, replayed on open.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("table already exists: {0}")]
    TableExists(String),

    #[error("manifest entry malformed: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// Schema of a logical table. The buffer layer only consumes `dim`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_id: String,
    pub dim: usize,
}

/// Durable record of one serialized segment.
///
/// `wal_lsn` is the log position the segment was flushed under; recovery
/// trims the WAL tail past the highest registered LSN per table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub segment_id: String,
    pub table_id: String,
    pub path: PathBuf,
    pub row_count: usize,
    pub tombstone_count: usize,
    pub wal_lsn: u64,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum ManifestEntry {
    CreateTable(TableSchema),
    AddSegment(SegmentRecord),
}

/// Catalog contract seen by the write buffer.
pub trait CatalogStore: Send + Sync {
    /// Schema lookup; buffers are created against it.
    fn table_schema(&self, table_id: &str) -> Result<TableSchema, CatalogError>;

    /// Where a segment file for `table_id` should live.
    fn segment_path(&self, table_id: &str, file_name: &str) -> PathBuf;

    /// Record a segment that has reached durable storage.
    fn register_segment(&self, record: SegmentRecord) -> Result<(), CatalogError>;
}

/// In-process catalog backed by a JSON-lines manifest under `root`.
pub struct MemoryCatalog {
    root: PathBuf,
    tables: RwLock<HashMap<String, TableSchema>>,
    segments: RwLock<Vec<SegmentRecord>>,
    manifest: Mutex<File>,
}

const MANIFEST_FILE: &str = "manifest.jsonl";

impl MemoryCatalog {
    /// Open (or create) a catalog rooted at `root`, replaying the manifest.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        let manifest_path = root.join(MANIFEST_FILE);

        let mut tables = HashMap::new();
        let mut segments = Vec::new();
        if manifest_path.exists() {
            let reader = BufReader::new(File::open(&manifest_path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ManifestEntry>(&line)? {
                    ManifestEntry::CreateTable(schema) => {
                        tables.insert(schema.table_id.clone(), schema);
                    }
                    ManifestEntry::AddSegment(record) => segments.push(record),
                }
            }
        }

        let manifest = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&manifest_path)?;

        Ok(Self {
            root,
            tables: RwLock::new(tables),
            segments: RwLock::new(segments),
            manifest: Mutex::new(manifest),
        })
    }

    /// Register a new table schema.
    pub fn create_table(&self, schema: TableSchema) -> Result<(), CatalogError> {
        {
            let mut tables = self.tables.write();
            if tables.contains_key(&schema.table_id) {
                return Err(CatalogError::TableExists(schema.table_id));
            }
            tables.insert(schema.table_id.clone(), schema.clone());
        }
        self.append_entry(&ManifestEntry::CreateTable(schema))
    }

    /// Segments registered for `table_id`, in registration order.
    pub fn segments_for(&self, table_id: &str) -> Vec<SegmentRecord> {
        self.segments
            .read()
            .iter()
            .filter(|r| r.table_id == table_id)
            .cloned()
            .collect()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn append_entry(&self, entry: &ManifestEntry) -> Result<(), CatalogError> {
        let line = serde_json::to_string(entry)?;
        let mut file = self.manifest.lock();
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_data()?;
        Ok(())
    }
}

impl CatalogStore for MemoryCatalog {
    fn table_schema(&self, table_id: &str) -> Result<TableSchema, CatalogError> {
        self.tables
            .read()
            .get(table_id)
            .cloned()
            .ok_or_else(|| CatalogError::UnknownTable(table_id.to_string()))
    }

    fn segment_path(&self, table_id: &str, file_name: &str) -> PathBuf {
        self.root.join(table_id).join(file_name)
    }

    fn register_segment(&self, record: SegmentRecord) -> Result<(), CatalogError> {
        self.append_entry(&ManifestEntry::AddSegment(record.clone()))?;
        self.segments.write().push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn schema(table_id: &str, dim: usize) -> TableSchema {
        TableSchema {
            table_id: table_id.to_string(),
            dim,
        }
    }

    #[test]
    fn test_schema_roundtrip() {
        let dir = tempdir().unwrap();
        let catalog = MemoryCatalog::open(dir.path()).unwrap();

        catalog.create_table(schema("clips", 128)).unwrap();
        assert_eq!(catalog.table_schema("clips").unwrap().dim, 128);
        assert!(matches!(
            catalog.table_schema("missing"),
            Err(CatalogError::UnknownTable(_))
        ));
        assert!(matches!(
            catalog.create_table(schema("clips", 64)),
            Err(CatalogError::TableExists(_))
        ));
    }

    #[test]
    fn test_manifest_replay_restores_state() {
        let dir = tempdir().unwrap();
        {
            let catalog = MemoryCatalog::open(dir.path()).unwrap();
            catalog.create_table(schema("clips", 4)).unwrap();
            catalog
                .register_segment(SegmentRecord {
                    segment_id: "seg_1".to_string(),
                    table_id: "clips".to_string(),
                    path: dir.path().join("clips/seg_1.seg"),
                    row_count: 10,
                    tombstone_count: 1,
                    wal_lsn: 42,
                    size_bytes: 1024,
                })
                .unwrap();
        }

        let reopened = MemoryCatalog::open(dir.path()).unwrap();
        assert_eq!(reopened.table_schema("clips").unwrap().dim, 4);
        let segments = reopened.segments_for("clips");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].wal_lsn, 42);
        assert_eq!(segments[0].row_count, 10);
    }
}
