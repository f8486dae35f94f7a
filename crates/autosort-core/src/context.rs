//! The sorter context: everything one participant knows about the sorting
//! network, plus the operations the host game calls into.
//!
//! One context is built per session and handed to the router and the
//! distribution engine explicitly. It owns the node registry, the
//! inventories of registered containers, the outgoing transport, the event
//! buffer and the persisted records of the loaded world.
//!
//! # Roles
//!
//! Exactly one participant is the [`Role::Host`]. It answers state requests,
//! owns persistence and runs distribution cycles. Every other participant
//! is a [`Role::Peer`] that mirrors state through the messages in
//! [`message`](crate::message).

use crate::config::{Shortfall, SorterConfig};
use crate::engine::CancelToken;
use crate::event::{EventBuffer, SorterEvent};
use crate::id::{InventoryId, ItemTypeId, NodeId, PeerId};
use crate::item::{Inventory, InventoryStore, UNLIMITED_SUPPLY};
use crate::message::{DomainMessage, TransportMessage, encode};
use crate::node::{AdditionalData, FilterRule, NodeError, SortMode, SorterSettings, StorageNode};
use crate::registry::{NodeRegistry, RegistryError};
use crate::router::{MessageRouter, RouteOutcome};
use crate::serialize::{SavedRecords, SnapshotStore, StorageRecord};
use crate::transport::Transport;
use log::{debug, info, warn};

/// This participant's place in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Authoritative participant.
    Host,
    /// Non-authoritative participant connected to `host`.
    Peer { host: PeerId },
}

/// Errors from the upgrade and downgrade operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpgradeError {
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error("acting inventory is not present")]
    UnknownActor,
    #[error("not enough resources to upgrade node {node}")]
    InsufficientResources { node: NodeId, missing: Vec<Shortfall> },
}

pub struct SorterContext {
    config: SorterConfig,
    local: PeerId,
    role: Role,
    transport: Box<dyn Transport>,
    store: Option<Box<dyn SnapshotStore>>,
    router: MessageRouter,
    pub(crate) registry: NodeRegistry,
    pub(crate) inventories: InventoryStore,
    pub(crate) events: EventBuffer,
    saved: SavedRecords,
    save_name: Option<String>,
    /// Cancellation handle of the cycle currently running, if any.
    pub(crate) active_cycle: Option<CancelToken>,
}

impl SorterContext {
    pub fn new(local: PeerId, role: Role, config: SorterConfig, transport: Box<dyn Transport>) -> Self {
        Self {
            config,
            local,
            role,
            transport,
            store: None,
            router: MessageRouter::new(),
            registry: NodeRegistry::new(),
            inventories: InventoryStore::with_key(),
            events: EventBuffer::default(),
            saved: SavedRecords::default(),
            save_name: None,
            active_cycle: None,
        }
    }

    /// Attach the persistence backend used by [`world_loaded`] and
    /// [`save_world`].
    ///
    /// [`world_loaded`]: Self::world_loaded
    /// [`save_world`]: Self::save_world
    pub fn with_store(mut self, store: Box<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &SorterConfig {
        &self.config
    }

    pub fn local_peer(&self) -> PeerId {
        self.local
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_authoritative(&self) -> bool {
        self.role == Role::Host
    }

    /// The authoritative participant's id.
    pub fn host(&self) -> PeerId {
        match self.role {
            Role::Host => self.local,
            Role::Peer { host } => host,
        }
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn inventories(&self) -> &InventoryStore {
        &self.inventories
    }

    /// Mutable access to the inventories. Edits made here are external to
    /// distribution; call [`mark_inventory_dirty`](Self::mark_inventory_dirty)
    /// for every affected node, or use [`edit_inventory`](Self::edit_inventory).
    pub fn inventories_mut(&mut self) -> &mut InventoryStore {
        &mut self.inventories
    }

    pub fn add_inventory(&mut self, inventory: Inventory) -> InventoryId {
        self.inventories.insert(inventory)
    }

    pub fn save_name(&self) -> Option<&str> {
        self.save_name.as_deref()
    }

    pub fn saved_records(&self) -> &SavedRecords {
        &self.saved
    }

    /// Take all pending notifications, oldest first.
    pub fn drain_events(&mut self) -> Vec<SorterEvent> {
        self.events.drain()
    }

    // -----------------------------------------------------------------------
    // World lifecycle
    // -----------------------------------------------------------------------

    /// A world was loaded under `save_name`. The host reads the persisted
    /// records so that containers registered afterwards are rehydrated. A
    /// failed read is logged and leaves no records.
    pub fn world_loaded(&mut self, save_name: impl Into<String>) {
        let save_name = save_name.into();
        if self.is_authoritative()
            && let Some(store) = self.store.as_mut()
        {
            match store.load() {
                Ok(records) => self.saved = SavedRecords::new(records),
                Err(e) => {
                    warn!("could not load sorter records: {e}");
                    self.saved = SavedRecords::default();
                }
            }
        }
        info!(
            "world '{save_name}' loaded with {} sorter records",
            self.saved.for_save(&save_name).count()
        );
        self.save_name = Some(save_name);
    }

    /// The world is going away: cancel any running cycle, forget every node
    /// and release the container inventories. Inventories that no node was
    /// registered with, such as player wallets, are left alone.
    pub fn world_unloaded(&mut self) {
        if let Some(token) = self.active_cycle.take() {
            token.cancel();
        }
        for node in self.registry.iter() {
            self.inventories.remove(node.inventory());
        }
        self.registry.clear();
        self.save_name = None;
        info!("world unloaded");
    }

    /// Persist every upgraded node under the current save name, replacing
    /// that save's previous records. Only the host persists; failures are
    /// logged and the save skipped.
    pub fn save_world(&mut self) {
        if !self.is_authoritative() {
            return;
        }
        let Some(save_name) = self.save_name.clone() else {
            warn!("save requested with no world loaded");
            return;
        };
        let records: Vec<StorageRecord> = self
            .registry
            .iter()
            .filter_map(|node| StorageRecord::from_node(node, &save_name))
            .collect();
        let count = records.len();
        self.saved.replace_save(&save_name, records);

        if let Some(store) = self.store.as_mut() {
            match store.save(self.saved.all()) {
                Ok(()) => info!("saved {count} sorter records for '{save_name}'"),
                Err(e) => warn!("could not save sorter records: {e}"),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Container lifecycle
    // -----------------------------------------------------------------------

    /// A container became active. The host restores its saved settings; a
    /// peer asks the host for them.
    pub fn register_container(&mut self, id: NodeId, inventory: InventoryId) -> Result<(), RegistryError> {
        let mut node = StorageNode::new(id, inventory);
        if self.is_authoritative()
            && let Some(save_name) = self.save_name.as_deref()
            && let Some(record) = self.saved.find(save_name, id)
        {
            node.apply_snapshot(record.snapshot());
            debug!("restored saved settings for node {id}");
        }
        self.registry.register(node)?;

        if let Role::Peer { host } = self.role {
            self.send_to(host, DomainMessage::request_state(id));
        }
        Ok(())
    }

    /// A container was removed. Its inventory is released unless another
    /// registered node still shares it. No-op for unknown ids.
    pub fn unregister_container(&mut self, id: NodeId) -> Option<StorageNode> {
        let node = self.registry.unregister(id)?;
        let inventory = node.inventory();
        if !self.registry.iter().any(|n| n.inventory() == inventory) {
            self.inventories.remove(inventory);
        }
        Some(node)
    }

    // -----------------------------------------------------------------------
    // Upgrade state
    // -----------------------------------------------------------------------

    /// Upgrade `id`, paying the configured costs out of `actor`.
    ///
    /// Fails with [`UpgradeError::InsufficientResources`] without touching
    /// anything if any cost item is short; the rejection is also pushed as a
    /// [`SorterEvent::UpgradeRejected`].
    pub fn upgrade(&mut self, id: NodeId, actor: InventoryId) -> Result<(), UpgradeError> {
        let node = self.registry.get(id).ok_or(NodeError::NotRegistered(id))?;
        if node.is_upgraded() {
            return Err(NodeError::AlreadyUpgraded(id).into());
        }
        let costs = self.config.merged_costs();
        let wallet = self.inventories.get_mut(actor).ok_or(UpgradeError::UnknownActor)?;

        let missing: Vec<Shortfall> = costs
            .iter()
            .map(|cost| Shortfall {
                item: cost.item,
                required: cost.amount,
                held: wallet.quantity(cost.item),
            })
            .filter(|s| s.held < s.required)
            .collect();
        if !missing.is_empty() {
            warn!("upgrade of node {id} rejected: missing {missing:?}");
            self.events.push(SorterEvent::UpgradeRejected {
                node: id,
                missing: missing.clone(),
            });
            return Err(UpgradeError::InsufficientResources { node: id, missing });
        }

        for cost in &costs {
            if wallet.quantity(cost.item) != UNLIMITED_SUPPLY {
                let _ = wallet.remove(cost.item, cost.amount);
            }
        }

        if let Some(node) = self.registry.get_mut(id) {
            node.install_upgrade();
        }
        self.events.push(SorterEvent::Upgraded { node: id });
        self.broadcast(DomainMessage::upgrade(id, true));
        Ok(())
    }

    /// Downgrade `id`, refunding the configured costs into `actor`. Items
    /// that do not fit are lost and logged.
    pub fn downgrade(&mut self, id: NodeId, actor: InventoryId) -> Result<(), UpgradeError> {
        let node = self.registry.get(id).ok_or(NodeError::NotRegistered(id))?;
        if !node.is_upgraded() {
            return Err(NodeError::NotUpgraded(id).into());
        }
        let costs = self.config.merged_costs();
        let wallet = self.inventories.get_mut(actor).ok_or(UpgradeError::UnknownActor)?;

        for cost in &costs {
            let added = wallet.add(cost.item, cost.amount);
            if added < cost.amount {
                warn!(
                    "refund for node {id} overflowed: {} of item {:?} did not fit",
                    cost.amount - added,
                    cost.item
                );
            }
        }

        if let Some(node) = self.registry.get_mut(id) {
            node.clear_upgrade();
        }
        self.events.push(SorterEvent::Downgraded { node: id });
        self.broadcast(DomainMessage::upgrade(id, false));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    pub fn set_priority(&mut self, id: NodeId, priority: i32) -> Result<(), NodeError> {
        self.update_settings(id, |s| s.priority = priority)
    }

    pub fn set_mode(&mut self, id: NodeId, mode: SortMode) -> Result<(), NodeError> {
        self.update_settings(id, |s| s.mode = mode)
    }

    /// Add or replace the rule for `rule.item_type`.
    pub fn set_filter(&mut self, id: NodeId, rule: FilterRule) -> Result<(), NodeError> {
        self.update_settings(id, |s| s.set_filter(rule))
    }

    pub fn remove_filter(&mut self, id: NodeId, item_type: ItemTypeId) -> Result<(), NodeError> {
        self.update_settings(id, |s| {
            s.filters.remove(&item_type);
        })
    }

    /// Change the ignore flag. Works on plain containers too.
    pub fn set_ignore(&mut self, id: NodeId, ignore: bool) -> Result<(), NodeError> {
        let node = self.registry.get_mut(id).ok_or(NodeError::NotRegistered(id))?;
        let additional = AdditionalData { ignore };
        node.additional = additional;
        self.broadcast(DomainMessage::ignore_update(id, additional));
        Ok(())
    }

    fn update_settings(
        &mut self,
        id: NodeId,
        edit: impl FnOnce(&mut SorterSettings),
    ) -> Result<(), NodeError> {
        let node = self.registry.get_mut(id).ok_or(NodeError::NotRegistered(id))?;
        let settings = node.settings_mut()?;
        edit(settings);
        let settings = settings.clone();
        self.broadcast(DomainMessage::data_update(id, settings));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Inventory changes from outside distribution
    // -----------------------------------------------------------------------

    /// Flag `id` as edited outside distribution; it will not be used as a
    /// source until the running cycle ends. Returns false for unknown ids.
    pub fn mark_inventory_dirty(&mut self, id: NodeId) -> bool {
        self.registry.mark_dirty(id)
    }

    /// Edit a node's inventory, mark it dirty and broadcast the new
    /// contents.
    pub fn edit_inventory<R>(
        &mut self,
        id: NodeId,
        edit: impl FnOnce(&mut Inventory) -> R,
    ) -> Result<R, NodeError> {
        let node = self.registry.get_mut(id).ok_or(NodeError::NotRegistered(id))?;
        let inv = self
            .inventories
            .get_mut(node.inventory())
            .ok_or(NodeError::MissingInventory(id))?;
        node.dirty = true;
        let result = edit(inv);
        self.broadcast_inventory(id);
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Network
    // -----------------------------------------------------------------------

    /// Route an inbound batch from `sender`. Sorter messages are consumed;
    /// what remains in `batch` belongs to the host protocol.
    pub fn receive(&mut self, batch: &mut Vec<TransportMessage>, sender: PeerId) -> RouteOutcome {
        let router = self.router;
        router.route(self, batch, sender)
    }

    pub(crate) fn broadcast(&mut self, message: DomainMessage) {
        match encode(&message) {
            Ok(wire) => {
                debug!("broadcast {:?} for node {}", message.message_type, message.target);
                self.transport.broadcast(wire);
            }
            Err(e) => warn!("could not encode {:?}: {e}", message.message_type),
        }
    }

    pub(crate) fn send_to(&mut self, peer: PeerId, message: DomainMessage) {
        match encode(&message) {
            Ok(wire) => {
                debug!("send {:?} for node {} to {peer}", message.message_type, message.target);
                self.transport.send_to(peer, wire);
            }
            Err(e) => warn!("could not encode {:?}: {e}", message.message_type),
        }
    }

    /// Broadcast the full slot contents of `id`.
    pub(crate) fn broadcast_inventory(&mut self, id: NodeId) {
        let slots = self
            .registry
            .get(id)
            .and_then(|node| self.inventories.get(node.inventory()))
            .map(|inv| inv.slots().to_vec());
        match slots {
            Some(slots) => self.broadcast(DomainMessage::inventory_update(id, slots)),
            None => warn!("no inventory to broadcast for node {id}"),
        }
    }
}

impl std::fmt::Debug for SorterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SorterContext")
            .field("local", &self.local)
            .field("role", &self.role)
            .field("nodes", &self.registry.len())
            .field("save_name", &self.save_name)
            .finish_non_exhaustive()
    }
}
