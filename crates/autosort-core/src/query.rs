use crate::context::SorterContext;
use crate::id::NodeId;
use crate::node::{FilterRule, SortMode, StorageNode};

/// Read-only view of a node for presentation layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeView {
    pub id: NodeId,
    pub upgraded: bool,
    pub mode: Option<SortMode>,
    pub priority: Option<i32>,
    /// Filter rules in item-type order. Empty for plain containers.
    pub filters: Vec<FilterRule>,
    pub ignored: bool,
    pub dirty: bool,
}

impl NodeView {
    pub fn of(node: &StorageNode) -> Self {
        Self {
            id: node.id(),
            upgraded: node.is_upgraded(),
            mode: node.mode(),
            priority: node.priority(),
            filters: node
                .settings()
                .map(|s| s.filters.values().copied().collect())
                .unwrap_or_default(),
            ignored: node.is_ignored(),
            dirty: node.dirty,
        }
    }
}

impl SorterContext {
    pub fn node_view(&self, id: NodeId) -> Option<NodeView> {
        self.registry().get(id).map(NodeView::of)
    }

    /// Views of every registered node, in registration order.
    pub fn node_views(&self) -> Vec<NodeView> {
        self.registry().iter().map(NodeView::of).collect()
    }
}
