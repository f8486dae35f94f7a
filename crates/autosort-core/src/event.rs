//! Notifications for presentation layers.
//!
//! The context records [`SorterEvent`]s into a bounded queue.
//! UI, audio and toast code drain it once per frame. When the buffer is
//! full the oldest events are dropped; nothing in the sorter depends on an
//! event being read.

use crate::config::Shortfall;
use crate::id::{ItemTypeId, NodeId, PeerId};
use std::collections::VecDeque;

/// Something that happened to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SorterEvent {
    Upgraded {
        node: NodeId,
    },
    Downgraded {
        node: NodeId,
    },
    /// An upgrade attempt failed because the acting participant lacks
    /// the listed cost items.
    UpgradeRejected {
        node: NodeId,
        missing: Vec<Shortfall>,
    },
    ItemsTransferred {
        from: NodeId,
        to: NodeId,
        item_type: ItemTypeId,
        quantity: u32,
    },
    /// A peer changed a node's upgrade state, settings or additional data.
    RemoteStateApplied {
        node: NodeId,
        sender: PeerId,
    },
}

/// Bounded queue of events. Pushing into a full buffer evicts the oldest
/// event and counts it as dropped.
#[derive(Debug)]
pub struct EventBuffer {
    queue: VecDeque<SorterEvent>,
    capacity: usize,
    dropped: u64,
}

impl EventBuffer {
    pub const DEFAULT_CAPACITY: usize = 256;

    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    pub fn push(&mut self, event: SorterEvent) {
        if self.queue.len() == self.capacity {
            self.queue.pop_front();
            self.dropped += 1;
        }
        self.queue.push_back(event);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Events evicted unread since creation. Draining does not count.
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    /// Remove and return all stored events, oldest first.
    pub fn drain(&mut self) -> Vec<SorterEvent> {
        self.queue.drain(..).collect()
    }
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
