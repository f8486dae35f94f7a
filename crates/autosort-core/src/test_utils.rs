//! Shared test helpers for unit tests, integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::config::SorterConfig;
use crate::context::{Role, SorterContext};
use crate::id::*;
use crate::item::{Inventory, ItemStack, Slot};
use crate::message::TransportMessage;
use crate::node::SortMode;
use crate::transport::{Destination, Outbox};

// ===========================================================================
// Item constructors
// ===========================================================================

pub fn plank() -> ItemTypeId {
    ItemTypeId(0)
}
pub fn rope() -> ItemTypeId {
    ItemTypeId(1)
}
pub fn nail() -> ItemTypeId {
    ItemTypeId(2)
}
pub fn stone() -> ItemTypeId {
    ItemTypeId(3)
}

// ===========================================================================
// Inventories
// ===========================================================================

pub const STACK_SIZE: u32 = 50;
pub const SLOT_COUNT: usize = 8;

/// Inventory with one slot per `(item, quantity)` entry, holding exactly that
/// quantity even above the stack size, followed by empty slots up to `slots`.
pub fn sized_inventory(slots: usize, stack_size: u32, contents: &[(ItemTypeId, u32)]) -> Inventory {
    let mut all: Vec<Slot> = contents
        .iter()
        .map(|&(item, quantity)| Slot {
            stack: Some(ItemStack::new(item, quantity)),
            active: true,
            locked: false,
        })
        .collect();
    while all.len() < slots {
        all.push(Slot::empty());
    }
    let mut inventory = Inventory::new(0, stack_size);
    inventory.set_slots(all);
    inventory
}

pub fn inventory_with(contents: &[(ItemTypeId, u32)]) -> Inventory {
    sized_inventory(SLOT_COUNT, STACK_SIZE, contents)
}

// ===========================================================================
// Contexts
// ===========================================================================

pub fn host_context() -> (SorterContext, Outbox) {
    let outbox = Outbox::new();
    let ctx = SorterContext::new(
        PeerId(1),
        Role::Host,
        SorterConfig::default(),
        Box::new(outbox.clone()),
    );
    (ctx, outbox)
}

pub fn peer_context(local: PeerId, host: PeerId) -> (SorterContext, Outbox) {
    let outbox = Outbox::new();
    let ctx = SorterContext::new(
        local,
        Role::Peer { host },
        SorterConfig::default(),
        Box::new(outbox.clone()),
    );
    (ctx, outbox)
}

/// Register container `id` with a fresh inventory holding `contents`.
pub fn add_container(ctx: &mut SorterContext, id: u32, contents: &[(ItemTypeId, u32)]) -> NodeId {
    add_sized_container(ctx, id, SLOT_COUNT, STACK_SIZE, contents)
}

pub fn add_sized_container(
    ctx: &mut SorterContext,
    id: u32,
    slots: usize,
    stack_size: u32,
    contents: &[(ItemTypeId, u32)],
) -> NodeId {
    let inventory = ctx.add_inventory(sized_inventory(slots, stack_size, contents));
    let node = NodeId(id);
    ctx.register_container(node, inventory)
        .expect("container id already registered");
    node
}

/// Upgrade a node in place, skipping costs and broadcasts.
pub fn upgrade_node(ctx: &mut SorterContext, id: NodeId, mode: SortMode, priority: i32) {
    let node = ctx.registry.get_mut(id).expect("node not registered");
    node.install_upgrade();
    let settings = node.settings_mut().expect("just upgraded");
    settings.mode = mode;
    settings.priority = priority;
}

pub fn quantity_of(ctx: &SorterContext, id: NodeId, item: ItemTypeId) -> u32 {
    let node = ctx.registry().get(id).expect("node not registered");
    ctx.inventories()[node.inventory()].quantity(item)
}

/// A message of the host game's own protocol.
pub fn foreign(kind: u16, bytes: &[u8]) -> TransportMessage {
    TransportMessage::opaque(kind, bytes.to_vec())
}

/// Host with `count` containers. Even ids are upgraded auto-sorters with
/// rising priority holding one plank; odd ids are plain containers full of
/// planks and rope.
pub fn build_sorting_floor(count: u32) -> (SorterContext, Outbox) {
    let (mut ctx, outbox) = host_context();
    for id in 0..count {
        if id % 2 == 0 {
            let node = add_container(&mut ctx, id, &[(plank(), 1), (rope(), 1)]);
            upgrade_node(&mut ctx, node, SortMode::Auto, id as i32);
        } else {
            add_container(&mut ctx, id, &[(plank(), 40), (rope(), 40), (nail(), 40)]);
        }
    }
    (ctx, outbox)
}

// ===========================================================================
// Multi-participant network
// ===========================================================================

struct Participant {
    peer: PeerId,
    ctx: SorterContext,
    outbox: Outbox,
}

/// In-memory session: one host and any number of peers whose outboxes are
/// delivered to each other by [`pump`](LocalNetwork::pump).
pub struct LocalNetwork {
    participants: Vec<Participant>,
}

impl LocalNetwork {
    pub const HOST: PeerId = PeerId(1);

    /// A network with only the host.
    pub fn new() -> Self {
        Self::with_config(SorterConfig::default())
    }

    pub fn with_config(config: SorterConfig) -> Self {
        let outbox = Outbox::new();
        let ctx = SorterContext::new(Self::HOST, Role::Host, config, Box::new(outbox.clone()));
        Self {
            participants: vec![Participant {
                peer: Self::HOST,
                ctx,
                outbox,
            }],
        }
    }

    pub fn add_peer(&mut self) -> PeerId {
        let peer = PeerId(self.participants.len() as u64 + 1);
        let outbox = Outbox::new();
        let config = self.participants[0].ctx.config().clone();
        let ctx = SorterContext::new(
            peer,
            Role::Peer { host: Self::HOST },
            config,
            Box::new(outbox.clone()),
        );
        self.participants.push(Participant { peer, ctx, outbox });
        peer
    }

    pub fn peers(&self) -> Vec<PeerId> {
        self.participants.iter().map(|p| p.peer).collect()
    }

    pub fn ctx(&self, peer: PeerId) -> &SorterContext {
        &self.participant(peer).ctx
    }

    pub fn ctx_mut(&mut self, peer: PeerId) -> &mut SorterContext {
        let index = self.index(peer);
        &mut self.participants[index].ctx
    }

    pub fn host(&self) -> &SorterContext {
        self.ctx(Self::HOST)
    }

    pub fn host_mut(&mut self) -> &mut SorterContext {
        self.ctx_mut(Self::HOST)
    }

    /// Register container `id` on every participant, each with its own copy
    /// of an inventory holding `contents`.
    pub fn add_container(&mut self, id: u32, contents: &[(ItemTypeId, u32)]) -> NodeId {
        for p in &mut self.participants {
            add_container(&mut p.ctx, id, contents);
        }
        NodeId(id)
    }

    /// Deliver queued traffic until every outbox is empty. Returns the
    /// number of messages delivered.
    pub fn pump(&mut self) -> usize {
        let mut delivered = 0;
        for _ in 0..64 {
            let mut pending = Vec::new();
            for p in &self.participants {
                for out in p.outbox.drain() {
                    pending.push((p.peer, out));
                }
            }
            if pending.is_empty() {
                return delivered;
            }
            for (sender, out) in pending {
                let receivers: Vec<usize> = match out.destination {
                    Destination::Peer(peer) => vec![self.index(peer)],
                    Destination::Others => (0..self.participants.len())
                        .filter(|&i| self.participants[i].peer != sender)
                        .collect(),
                };
                for i in receivers {
                    let mut batch = vec![out.message.clone()];
                    self.participants[i].ctx.receive(&mut batch, sender);
                    delivered += 1;
                }
            }
        }
        panic!("network did not settle after 64 rounds");
    }

    fn index(&self, peer: PeerId) -> usize {
        self.participants
            .iter()
            .position(|p| p.peer == peer)
            .expect("unknown peer")
    }

    fn participant(&self, peer: PeerId) -> &Participant {
        &self.participants[self.index(peer)]
    }
}

impl Default for LocalNetwork {
    fn default() -> Self {
        Self::new()
    }
}
