use crate::id::NodeId;
use crate::node::StorageNode;
use log::warn;
use std::collections::HashMap;

/// Identifier-keyed registry of live storage nodes.
///
/// Registration order is kept so that enumeration (and thereby the
/// distribution tie-break between equal priorities) is stable.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: HashMap<NodeId, StorageNode>,
    order: Vec<NodeId>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node. A node whose id is already present is rejected and
    /// the existing entry kept.
    pub fn register(&mut self, node: StorageNode) -> Result<(), RegistryError> {
        let id = node.id();
        if self.nodes.contains_key(&id) {
            warn!("node {id} was already registered; ignoring duplicate");
            return Err(RegistryError::Duplicate(id));
        }
        self.nodes.insert(id, node);
        self.order.push(id);
        Ok(())
    }

    /// Remove a node. No-op if absent.
    pub fn unregister(&mut self, id: NodeId) -> Option<StorageNode> {
        let node = self.nodes.remove(&id)?;
        self.order.retain(|&other| other != id);
        Some(node)
    }

    pub fn get(&self, id: NodeId) -> Option<&StorageNode> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut StorageNode> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids in registration order.
    pub fn ids(&self) -> Vec<NodeId> {
        self.order.clone()
    }

    /// Nodes in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &StorageNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Upgraded, non-ignored nodes by descending priority. Equal priorities
    /// keep registration order.
    pub fn distribution_order(&self) -> Vec<NodeId> {
        let mut targets: Vec<(i32, NodeId)> = self
            .iter()
            .filter(|n| n.is_distribution_target())
            .filter_map(|n| n.priority().map(|p| (p, n.id())))
            .collect();
        targets.sort_by(|a, b| b.0.cmp(&a.0));
        targets.into_iter().map(|(_, id)| id).collect()
    }

    /// Flag a node's inventory as changed outside distribution. Returns
    /// false if the node is unknown.
    pub fn mark_dirty(&mut self, id: NodeId) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.dirty = true;
                true
            }
            None => false,
        }
    }

    pub fn clear_dirty(&mut self) {
        for node in self.nodes.values_mut() {
            node.dirty = false;
        }
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.order.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("node {0} is already registered")]
    Duplicate(NodeId),
}
