//! Serde data file structs for the item catalog and sorter settings.
//!
//! These define the on-disk format. They are deserialized from RON, JSON or
//! TOML data files and then resolved into core types by the loader.

use serde::Deserialize;

// ===========================================================================
// Items
// ===========================================================================

/// An item type entry. Its position in the file is its `ItemTypeId`.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemData {
    pub name: String,
    /// Stack size shown to players; informational only.
    #[serde(default)]
    pub stack_size: Option<u32>,
}

// ===========================================================================
// Sorter configuration
// ===========================================================================

/// One upgrade cost entry, referencing an item by name.
#[derive(Debug, Clone, Deserialize)]
pub struct CostData {
    pub item: String,
    pub amount: u32,
}

/// The `sorter.*` file.
#[derive(Debug, Clone, Deserialize)]
pub struct SorterConfigData {
    #[serde(default = "default_interval")]
    pub check_interval_secs: f64,
    #[serde(default)]
    pub upgrade_costs: Vec<CostData>,
    #[serde(default)]
    pub checkpoints_per_poll: Option<usize>,
}

fn default_interval() -> f64 {
    1.0
}

impl Default for SorterConfigData {
    fn default() -> Self {
        Self {
            check_interval_secs: default_interval(),
            upgrade_costs: Vec::new(),
            checkpoints_per_poll: None,
        }
    }
}
