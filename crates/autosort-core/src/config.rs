//! Runtime configuration for the sorter context and distribution engine.

use crate::id::ItemTypeId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One entry of the upgrade cost list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeCost {
    pub item: ItemTypeId,
    pub amount: u32,
}

/// A cost item the acting participant could not cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortfall {
    pub item: ItemTypeId,
    pub required: u32,
    pub held: u32,
}

/// Resolved sorter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SorterConfig {
    /// Target interval between the starts of two distribution cycles.
    pub check_interval: Duration,
    /// Items deducted from the acting participant on upgrade and refunded
    /// on downgrade.
    pub upgrade_costs: Vec<UpgradeCost>,
    /// Engine checkpoints run per host poll before yielding back.
    pub checkpoints_per_poll: usize,
}

impl SorterConfig {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

    pub fn with_costs(upgrade_costs: Vec<UpgradeCost>) -> Self {
        Self {
            upgrade_costs,
            ..Self::default()
        }
    }

    /// Cost list with duplicate entries for the same item summed, in order
    /// of first appearance.
    pub fn merged_costs(&self) -> Vec<UpgradeCost> {
        let mut merged: Vec<UpgradeCost> = Vec::new();
        for cost in &self.upgrade_costs {
            match merged.iter_mut().find(|c| c.item == cost.item) {
                Some(existing) => existing.amount = existing.amount.saturating_add(cost.amount),
                None => merged.push(*cost),
            }
        }
        merged
    }

    /// Checkpoints per poll, clamped to at least one so a running cycle
    /// always makes progress.
    pub fn effective_checkpoints(&self) -> usize {
        self.checkpoints_per_poll.max(1)
    }
}

impl Default for SorterConfig {
    fn default() -> Self {
        Self {
            check_interval: Self::DEFAULT_INTERVAL,
            upgrade_costs: Vec::new(),
            checkpoints_per_poll: 1,
        }
    }
}
