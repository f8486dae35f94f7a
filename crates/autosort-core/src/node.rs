//! Per-container sorter state and its local transfer rules.
//!
//! A [`StorageNode`] wraps one container of the host world. It is either a
//! plain container ([`UpgradeState::Unupgraded`]) or an auto-sorter carrying
//! [`SorterSettings`]. The inventory itself stays in the host's
//! [`InventoryStore`](crate::item::InventoryStore); the node only holds its
//! [`InventoryId`].
//!
//! The transfer rules here are pure: they look at node settings and item
//! counts and decide how much may move. The engine applies the result.

use crate::id::{InventoryId, ItemTypeId, NodeId};
use crate::item::{Inventory, UNLIMITED_SUPPLY};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// How an upgraded node chooses what to pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortMode {
    /// Pull more of every item type the node already holds.
    Auto,
    /// Pull exactly the item types listed in the node's filters.
    Filtered,
}

/// Per-item rule of a filtered node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    pub item_type: ItemTypeId,
    pub max_amount: u32,
    /// Bypasses `max_amount` entirely.
    pub unlimited: bool,
}

impl FilterRule {
    pub fn capped(item_type: ItemTypeId, max_amount: u32) -> Self {
        Self {
            item_type,
            max_amount,
            unlimited: false,
        }
    }

    pub fn unlimited(item_type: ItemTypeId) -> Self {
        Self {
            item_type,
            max_amount: 0,
            unlimited: true,
        }
    }

    /// The amount cap, if this rule controls amounts.
    pub fn cap(&self) -> Option<u32> {
        (!self.unlimited).then_some(self.max_amount)
    }
}

/// Settings of an upgraded node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SorterSettings {
    pub mode: SortMode,
    pub priority: i32,
    pub filters: BTreeMap<ItemTypeId, FilterRule>,
}

impl SorterSettings {
    pub fn set_filter(&mut self, rule: FilterRule) {
        self.filters.insert(rule.item_type, rule);
    }

    pub fn filter(&self, item_type: ItemTypeId) -> Option<&FilterRule> {
        self.filters.get(&item_type)
    }

    /// Cap on this node's holding of `item_type` when it is the receiving
    /// side. Only filtered nodes with an amount-controlled rule cap.
    pub fn destination_cap(&self, item_type: ItemTypeId) -> Option<u32> {
        match self.mode {
            SortMode::Auto => None,
            SortMode::Filtered => self.filter(item_type).and_then(FilterRule::cap),
        }
    }

    /// Item types this node asks for, given its current inventory.
    pub fn candidates(&self, inventory: &Inventory) -> Vec<ItemTypeId> {
        match self.mode {
            SortMode::Auto => inventory.item_types(),
            SortMode::Filtered => self.filters.keys().copied().collect(),
        }
    }
}

impl Default for SorterSettings {
    /// State installed by a fresh upgrade.
    fn default() -> Self {
        Self {
            mode: SortMode::Filtered,
            priority: 0,
            filters: BTreeMap::new(),
        }
    }
}

/// Extra per-node data that exists independent of the upgrade state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalData {
    /// Excludes the node from distribution as source and destination.
    pub ignore: bool,
}

/// Upgrade state of a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpgradeState {
    #[default]
    Unupgraded,
    Upgraded(SorterSettings),
}

/// Everything a peer needs to mirror a node: the settings, if upgraded,
/// and the additional data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub settings: Option<SorterSettings>,
    pub additional: AdditionalData,
}

// ---------------------------------------------------------------------------
// Transfer rules
// ---------------------------------------------------------------------------

/// Whether a source may give an item to a destination, and how much.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allowance {
    Denied,
    /// Allowed, optionally limited to the source's surplus.
    Allowed(Option<u32>),
}

// ---------------------------------------------------------------------------
// StorageNode
// ---------------------------------------------------------------------------

/// Errors raised by node-level operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    #[error("node {0} is not registered")]
    NotRegistered(NodeId),
    #[error("node {0} is not upgraded")]
    NotUpgraded(NodeId),
    #[error("node {0} is already upgraded")]
    AlreadyUpgraded(NodeId),
    #[error("inventory of node {0} is no longer present")]
    MissingInventory(NodeId),
}

/// One storage container tracked by the sorter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageNode {
    id: NodeId,
    inventory: InventoryId,
    pub state: UpgradeState,
    pub additional: AdditionalData,
    /// Set when the inventory was changed outside of distribution during
    /// the current cycle.
    pub dirty: bool,
}

impl StorageNode {
    pub fn new(id: NodeId, inventory: InventoryId) -> Self {
        Self {
            id,
            inventory,
            state: UpgradeState::Unupgraded,
            additional: AdditionalData::default(),
            dirty: false,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn inventory(&self) -> InventoryId {
        self.inventory
    }

    pub fn is_upgraded(&self) -> bool {
        matches!(self.state, UpgradeState::Upgraded(_))
    }

    pub fn is_ignored(&self) -> bool {
        self.additional.ignore
    }

    pub fn settings(&self) -> Option<&SorterSettings> {
        match &self.state {
            UpgradeState::Upgraded(settings) => Some(settings),
            UpgradeState::Unupgraded => None,
        }
    }

    pub fn settings_mut(&mut self) -> Result<&mut SorterSettings, NodeError> {
        match &mut self.state {
            UpgradeState::Upgraded(settings) => Ok(settings),
            UpgradeState::Unupgraded => Err(NodeError::NotUpgraded(self.id)),
        }
    }

    pub fn priority(&self) -> Option<i32> {
        self.settings().map(|s| s.priority)
    }

    pub fn mode(&self) -> Option<SortMode> {
        self.settings().map(|s| s.mode)
    }

    /// Upgraded and not ignored: may act as a distribution destination.
    pub fn is_distribution_target(&self) -> bool {
        self.is_upgraded() && !self.is_ignored()
    }

    /// Install fresh settings (filtered mode, priority 0, no filters).
    pub fn install_upgrade(&mut self) {
        self.state = UpgradeState::Upgraded(SorterSettings::default());
    }

    pub fn clear_upgrade(&mut self) {
        self.state = UpgradeState::Unupgraded;
    }

    /// Apply an upgrade notification. `true` always resets to fresh
    /// settings, matching what the sender installed locally.
    pub fn apply_upgrade_flag(&mut self, upgraded: bool) {
        if upgraded {
            self.install_upgrade();
        } else {
            self.clear_upgrade();
        }
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            settings: self.settings().cloned(),
            additional: self.additional,
        }
    }

    /// Overwrite settings and additional data from a snapshot.
    pub fn apply_snapshot(&mut self, snapshot: NodeSnapshot) {
        self.state = match snapshot.settings {
            Some(settings) => UpgradeState::Upgraded(settings),
            None => UpgradeState::Unupgraded,
        };
        self.additional = snapshot.additional;
    }

    /// True if the node holds anything worth sending to a joining peer.
    pub fn has_shareable_state(&self) -> bool {
        self.is_upgraded() || self.additional != AdditionalData::default()
    }

    /// Decide whether this node, as a source, may give `item_type` to a
    /// destination of `dest_priority`. `held` is this node's current count
    /// of the item.
    ///
    /// Plain containers always give. Upgraded sources only give to strictly
    /// higher priorities, and an amount-controlled filtered source only
    /// gives its surplus above its own cap.
    pub fn source_allowance(&self, dest_priority: i32, item_type: ItemTypeId, held: u32) -> Allowance {
        let Some(settings) = self.settings() else {
            return Allowance::Allowed(None);
        };
        if settings.priority >= dest_priority {
            return Allowance::Denied;
        }
        match settings.mode {
            SortMode::Auto => Allowance::Allowed(None),
            SortMode::Filtered => match settings.filter(item_type).and_then(FilterRule::cap) {
                None => Allowance::Allowed(None),
                Some(cap) => {
                    let held = if held == UNLIMITED_SUPPLY { 0 } else { held };
                    match held.checked_sub(cap) {
                        Some(surplus) if surplus > 0 => Allowance::Allowed(Some(surplus)),
                        _ => Allowance::Denied,
                    }
                }
            },
        }
    }
}
