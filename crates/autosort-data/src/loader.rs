//! Resolution pipeline: reads data files, resolves item names, builds the
//! sorter configuration.
//!
//! Provides format detection (RON/JSON/TOML), file discovery and
//! deserialization helpers used by [`load_sorter_data`].

use crate::schema::{ItemData, SorterConfigData};
use autosort_core::config::{SorterConfig, UpgradeCost};
use autosort_core::id::ItemTypeId;
use log::{debug, info};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error or an out-of-range value.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A name reference could not be resolved.
    #[error("unresolved {expected_kind} reference '{name}' in {file}")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    /// A duplicate name was found.
    #[error("duplicate name '{name}' in {file}")]
    DuplicateName { file: PathBuf, name: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Scan a directory for a data file with the given base name.
///
/// Looks for `{base_name}.ron`, `{base_name}.toml` and `{base_name}.json`.
/// Returns `Ok(None)` if none exists and `Err(ConflictingFormats)` if more
/// than one does.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;

    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if candidate.exists() {
            if let Some(existing) = found {
                return Err(DataLoadError::ConflictingFormats {
                    a: existing,
                    b: candidate,
                });
            }
            found = Some(candidate);
        }
    }

    Ok(found)
}

/// Like [`find_data_file`], but a missing file is an error.
pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

fn parse_error(path: &Path, detail: impl ToString) -> DataLoadError {
    DataLoadError::Parse {
        file: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

/// Read a file and deserialize it according to its extension.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(path, e)),
    }
}

/// Deserialize a list. TOML has no top-level arrays, so for TOML files the
/// array is read from `toml_key` of the top-level table.
pub fn deserialize_list<T: DeserializeOwned>(
    path: &Path,
    toml_key: &str,
) -> Result<Vec<T>, DataLoadError> {
    if detect_format(path)? != Format::Toml {
        return deserialize_file(path);
    }
    let content = std::fs::read_to_string(path)?;
    let table: toml::Value = toml::from_str(&content).map_err(|e| parse_error(path, e))?;
    let array = table
        .get(toml_key)
        .ok_or_else(|| parse_error(path, format!("missing key '{toml_key}' in TOML file")))?
        .clone();
    array
        .try_into()
        .map_err(|e: toml::de::Error| parse_error(path, e))
}

// ===========================================================================
// Item catalog
// ===========================================================================

/// Item names in file order. An item's position is its [`ItemTypeId`].
#[derive(Debug, Clone, Default)]
pub struct ItemCatalog {
    names: Vec<String>,
    by_name: HashMap<String, ItemTypeId>,
}

impl ItemCatalog {
    /// Build a catalog, rejecting duplicate names.
    pub fn from_items(items: &[ItemData], file: &Path) -> Result<Self, DataLoadError> {
        let mut catalog = Self::default();
        for item in items {
            check_duplicate(&catalog.by_name, &item.name, file)?;
            let id = ItemTypeId(catalog.names.len() as u32);
            catalog.by_name.insert(item.name.clone(), id);
            catalog.names.push(item.name.clone());
        }
        Ok(catalog)
    }

    pub fn id(&self, name: &str) -> Option<ItemTypeId> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, id: ItemTypeId) -> Option<&str> {
        self.names.get(id.0 as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

// ===========================================================================
// Name resolution helpers
// ===========================================================================

/// Look up a name in a map, returning an `UnresolvedRef` error if not found.
pub fn resolve_name<'a, V>(
    map: &'a HashMap<String, V>,
    name: &str,
    file: &Path,
    expected_kind: &'static str,
) -> Result<&'a V, DataLoadError> {
    map.get(name).ok_or_else(|| DataLoadError::UnresolvedRef {
        file: file.to_path_buf(),
        name: name.to_string(),
        expected_kind,
    })
}

/// Returns a `DuplicateName` error if `name` is already in the map.
pub fn check_duplicate<V>(
    map: &HashMap<String, V>,
    name: &str,
    file: &Path,
) -> Result<(), DataLoadError> {
    if map.contains_key(name) {
        Err(DataLoadError::DuplicateName {
            file: file.to_path_buf(),
            name: name.to_string(),
        })
    } else {
        Ok(())
    }
}

// ===========================================================================
// Loading pipeline
// ===========================================================================

/// Everything loaded from a data directory.
#[derive(Debug, Clone)]
pub struct SorterData {
    pub catalog: ItemCatalog,
    pub config: SorterConfig,
}

/// Resolve raw sorter settings against the item catalog.
pub fn resolve_config(
    data: &SorterConfigData,
    catalog: &ItemCatalog,
    file: &Path,
) -> Result<SorterConfig, DataLoadError> {
    let secs = data.check_interval_secs;
    let check_interval = Duration::try_from_secs_f64(secs)
        .map_err(|e| parse_error(file, format!("check_interval_secs {secs}: {e}")))?;

    let upgrade_costs = data
        .upgrade_costs
        .iter()
        .map(|cost| {
            let item = *resolve_name(&catalog.by_name, &cost.item, file, "item")?;
            Ok(UpgradeCost {
                item,
                amount: cost.amount,
            })
        })
        .collect::<Result<Vec<_>, DataLoadError>>()?;

    let defaults = SorterConfig::default();
    Ok(SorterConfig {
        check_interval,
        upgrade_costs,
        checkpoints_per_poll: data
            .checkpoints_per_poll
            .unwrap_or(defaults.checkpoints_per_poll),
    })
}

/// Load `items.*` (required) and `sorter.*` (optional) from `dir`.
///
/// A missing sorter file yields the default configuration.
pub fn load_sorter_data(dir: &Path) -> Result<SorterData, DataLoadError> {
    let items_path = require_data_file(dir, "items")?;
    let items: Vec<ItemData> = deserialize_list(&items_path, "items")?;
    let catalog = ItemCatalog::from_items(&items, &items_path)?;
    debug!("loaded {} item types from {}", catalog.len(), items_path.display());

    let config = match find_data_file(dir, "sorter")? {
        Some(path) => {
            let data: SorterConfigData = deserialize_file(&path)?;
            resolve_config(&data, &catalog, &path)?
        }
        None => {
            info!("no sorter file in {}, using defaults", dir.display());
            SorterConfig::default()
        }
    };

    info!(
        "sorter config: interval {:?}, {} cost entries",
        config.check_interval,
        config.upgrade_costs.len()
    );
    Ok(SorterData { catalog, config })
}

// ===========================================================================
// Tests
// ===========================================================================
