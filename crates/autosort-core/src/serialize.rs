//! Persistence of sorter state across world saves.
//!
//! The host saves one record per upgraded node, grouped by save name, into
//! a single versioned JSON document. Node snapshots as sent over the wire
//! use bitcode instead (see [`encode_snapshot`]).
//!
//! Storage itself is behind [`SnapshotStore`]. [`FileStore`] writes a
//! temporary sibling file and renames it over the target, so a crash during
//! a save leaves either the old or the new document, never a truncated one.

use crate::id::NodeId;
use crate::node::{AdditionalData, FilterRule, NodeSnapshot, SortMode, SorterSettings, StorageNode};
use log::debug;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Current persisted document version.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported format version: expected {FORMAT_VERSION}, got {0}")]
    UnsupportedVersion(u32),
    #[error("document from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotCodecError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Persisted state of one upgraded node under one save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRecord {
    pub node_id: NodeId,
    pub save_name: String,
    pub priority: i32,
    pub mode: SortMode,
    pub filters: Vec<FilterRule>,
    pub additional: AdditionalData,
}

impl StorageRecord {
    /// Record for `node`, or `None` if it is not upgraded.
    pub fn from_node(node: &StorageNode, save_name: &str) -> Option<Self> {
        let settings = node.settings()?;
        Some(Self {
            node_id: node.id(),
            save_name: save_name.to_owned(),
            priority: settings.priority,
            mode: settings.mode,
            filters: settings.filters.values().copied().collect(),
            additional: node.additional,
        })
    }

    /// The snapshot this record restores. Later duplicates of a filter item
    /// win.
    pub fn snapshot(&self) -> NodeSnapshot {
        let mut settings = SorterSettings {
            mode: self.mode,
            priority: self.priority,
            ..SorterSettings::default()
        };
        for rule in &self.filters {
            settings.set_filter(*rule);
        }
        NodeSnapshot {
            settings: Some(settings),
            additional: self.additional,
        }
    }
}

/// Top-level persisted document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedFile {
    pub version: u32,
    pub records: Vec<StorageRecord>,
}

impl PersistedFile {
    pub fn new(records: Vec<StorageRecord>) -> Self {
        Self {
            version: FORMAT_VERSION,
            records,
        }
    }

    pub fn validate(&self) -> Result<(), PersistError> {
        if self.version > FORMAT_VERSION {
            return Err(PersistError::FutureVersion(self.version));
        }
        if self.version != FORMAT_VERSION {
            return Err(PersistError::UnsupportedVersion(self.version));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and validate a document.
    pub fn from_json(text: &str) -> Result<Self, PersistError> {
        let file: PersistedFile = serde_json::from_str(text)?;
        file.validate()?;
        Ok(file)
    }
}

/// All persisted records, across every save name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SavedRecords {
    records: Vec<StorageRecord>,
}

impl SavedRecords {
    pub fn new(records: Vec<StorageRecord>) -> Self {
        Self { records }
    }

    pub fn all(&self) -> &[StorageRecord] {
        &self.records
    }

    pub fn for_save<'a>(&'a self, save_name: &'a str) -> impl Iterator<Item = &'a StorageRecord> + 'a {
        self.records.iter().filter(move |r| r.save_name == save_name)
    }

    /// The record for `node` under `save_name`. The last matching record
    /// wins.
    pub fn find(&self, save_name: &str, node: NodeId) -> Option<&StorageRecord> {
        self.records
            .iter()
            .rev()
            .find(|r| r.save_name == save_name && r.node_id == node)
    }

    /// Drop every record of `save_name` and append `records` in its place.
    pub fn replace_save(&mut self, save_name: &str, records: Vec<StorageRecord>) {
        self.records.retain(|r| r.save_name != save_name);
        self.records.extend(records);
    }
}

// ---------------------------------------------------------------------------
// Snapshot codec
// ---------------------------------------------------------------------------

pub fn encode_snapshot(snapshot: &NodeSnapshot) -> Result<Vec<u8>, SnapshotCodecError> {
    bitcode::serialize(snapshot).map_err(|e| SnapshotCodecError::Encode(e.to_string()))
}

pub fn decode_snapshot(bytes: &[u8]) -> Result<NodeSnapshot, SnapshotCodecError> {
    bitcode::deserialize(bytes).map_err(|e| SnapshotCodecError::Decode(e.to_string()))
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

/// Backing storage for the persisted document.
pub trait SnapshotStore {
    /// Every stored record. A store with nothing saved yet returns an empty
    /// list.
    fn load(&mut self) -> Result<Vec<StorageRecord>, PersistError>;
    /// Replace the stored document with `records`.
    fn save(&mut self, records: &[StorageRecord]) -> Result<(), PersistError>;
}

/// JSON document on disk.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotStore for FileStore {
    fn load(&mut self) -> Result<Vec<StorageRecord>, PersistError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&self.path)?;
        Ok(PersistedFile::from_json(&text)?.records)
    }

    fn save(&mut self, records: &[StorageRecord]) -> Result<(), PersistError> {
        let text = PersistedFile::new(records.to_vec()).to_json()?;
        let temp = self.temp_path();
        std::fs::write(&temp, text)?;
        std::fs::rename(&temp, &self.path)?;
        debug!("saved {} sorter records to {}", records.len(), self.path.display());
        Ok(())
    }
}

/// In-memory store holding the serialized document. Clones share the same
/// contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    contents: Rc<RefCell<Option<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored JSON text, if anything was saved.
    pub fn raw(&self) -> Option<String> {
        self.contents.borrow().clone()
    }

    /// Overwrite the stored text directly.
    pub fn set_raw(&self, text: impl Into<String>) {
        *self.contents.borrow_mut() = Some(text.into());
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&mut self) -> Result<Vec<StorageRecord>, PersistError> {
        match self.contents.borrow().as_deref() {
            Some(text) => Ok(PersistedFile::from_json(text)?.records),
            None => Ok(Vec::new()),
        }
    }

    fn save(&mut self, records: &[StorageRecord]) -> Result<(), PersistError> {
        let text = PersistedFile::new(records.to_vec()).to_json()?;
        *self.contents.borrow_mut() = Some(text);
        Ok(())
    }
}
