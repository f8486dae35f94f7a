use crate::id::*;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

/// Quantity the host world reports for an item it supplies without limit
/// (creative mode). Such stacks count as zero availability and are never
/// drained by distribution.
pub const UNLIMITED_SUPPLY: u32 = i32::MAX as u32;

/// Inventories owned by the host world, addressed by [`InventoryId`].
pub type InventoryStore = SlotMap<InventoryId, Inventory>;

/// A stack of one item type inside a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item_type: ItemTypeId,
    pub quantity: u32,
}

impl ItemStack {
    pub fn new(item_type: ItemTypeId, quantity: u32) -> Self {
        Self {
            item_type,
            quantity,
        }
    }
}

/// One inventory slot. Inactive or locked slots never receive items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub stack: Option<ItemStack>,
    pub active: bool,
    pub locked: bool,
}

impl Slot {
    pub fn empty() -> Self {
        Self {
            stack: None,
            active: true,
            locked: false,
        }
    }

    fn accepts(&self) -> bool {
        self.active && !self.locked
    }
}

impl Default for Slot {
    fn default() -> Self {
        Self::empty()
    }
}

/// A slot-based container inventory with a uniform stack size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    slots: Vec<Slot>,
    stack_size: u32,
}

impl Inventory {
    pub fn new(slot_count: usize, stack_size: u32) -> Self {
        Self {
            slots: (0..slot_count).map(|_| Slot::empty()).collect(),
            stack_size,
        }
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [Slot] {
        &mut self.slots
    }

    /// Replace every slot, e.g. when a peer broadcasts the authoritative
    /// contents of this container.
    pub fn set_slots(&mut self, slots: Vec<Slot>) {
        self.slots = slots;
    }

    pub fn stack_size(&self) -> u32 {
        self.stack_size
    }

    /// Quantity of an item type across all slots. Totals at or above
    /// [`UNLIMITED_SUPPLY`] are reported as exactly that sentinel.
    pub fn quantity(&self, item_type: ItemTypeId) -> u32 {
        let total: u64 = self
            .slots
            .iter()
            .filter_map(|s| s.stack)
            .filter(|s| s.item_type == item_type)
            .map(|s| s.quantity as u64)
            .sum();
        total.min(UNLIMITED_SUPPLY as u64) as u32
    }

    /// Total items across all types.
    pub fn total(&self) -> u64 {
        self.slots
            .iter()
            .filter_map(|s| s.stack)
            .map(|s| s.quantity as u64)
            .sum()
    }

    /// Distinct item types held in accepting slots, in slot order.
    pub fn item_types(&self) -> Vec<ItemTypeId> {
        let mut seen = Vec::new();
        for slot in self.slots.iter().filter(|s| s.accepts()) {
            if let Some(stack) = slot.stack
                && stack.quantity > 0
                && !seen.contains(&stack.item_type)
            {
                seen.push(stack.item_type);
            }
        }
        seen
    }

    /// True if at least one accepting slot is empty or holds a stack that
    /// is not full.
    pub fn has_space(&self) -> bool {
        self.slots.iter().filter(|s| s.accepts()).any(|s| match s.stack {
            None => self.stack_size > 0,
            Some(stack) => stack.quantity < self.stack_size,
        })
    }

    /// Add items, topping up existing stacks first and then filling empty
    /// slots. Returns the quantity actually added.
    #[must_use = "the added count may be less than requested"]
    pub fn add(&mut self, item_type: ItemTypeId, quantity: u32) -> u32 {
        let stack_size = self.stack_size;
        let mut remaining = quantity;

        for slot in self.slots.iter_mut().filter(|s| s.active && !s.locked) {
            if remaining == 0 {
                break;
            }
            if let Some(stack) = slot.stack.as_mut()
                && stack.item_type == item_type
                && stack.quantity < stack_size
            {
                let moved = remaining.min(stack_size - stack.quantity);
                stack.quantity += moved;
                remaining -= moved;
            }
        }

        for slot in self.slots.iter_mut().filter(|s| s.active && !s.locked) {
            if remaining == 0 {
                break;
            }
            if slot.stack.is_none() {
                let moved = remaining.min(stack_size);
                if moved == 0 {
                    break;
                }
                slot.stack = Some(ItemStack::new(item_type, moved));
                remaining -= moved;
            }
        }

        quantity - remaining
    }

    /// Remove items from any slot holding them. Returns the quantity
    /// actually removed.
    #[must_use = "the removed count may be less than requested"]
    pub fn remove(&mut self, item_type: ItemTypeId, quantity: u32) -> u32 {
        let mut remaining = quantity;
        for slot in self.slots.iter_mut() {
            if remaining == 0 {
                break;
            }
            if let Some(stack) = slot.stack.as_mut()
                && stack.item_type == item_type
            {
                let taken = remaining.min(stack.quantity);
                stack.quantity -= taken;
                remaining -= taken;
                if stack.quantity == 0 {
                    slot.stack = None;
                }
            }
        }
        quantity - remaining
    }
}
