//! Graph context for dataflow graph manipulation
//!
//! `Graph` is the central structure the passes work on. Nodes live in an
//! arena of [`OpEntry`] slots addressed by [`NodeId`]; a consumer index keeps
//! use lookups O(1).

use super::maps::{Consumer, ConsumerMap, OpEntry};
use super::node::{Node, NodeId, Value};
use super::types::Layout;

/// Graph context for efficient graph operations
///
/// Removal is two-phase: passes call `mark_eliminated`, the driver calls
/// `compact`. Handles of live nodes never change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    /// Node slots indexed by `NodeId`; `None` once compacted away
    pub(crate) nodes: Vec<Option<OpEntry>>,

    /// Maps value → consuming input ports
    pub(crate) consumer_map: ConsumerMap,

    /// Processing order (topological after `compact`)
    pub(crate) order: Vec<NodeId>,

    /// Graph outputs
    pub(crate) outputs: Vec<Value>,
}

impl Graph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Node accessors
    // ========================================================================

    /// Get a node by id
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.entry(id).map(|e| &e.node)
    }

    /// Get a mutable node by id
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.entry_mut(id).map(|e| &mut e.node)
    }

    /// Get OpEntry by id
    pub fn entry(&self, id: NodeId) -> Option<&OpEntry> {
        self.nodes.get(id.0).and_then(|slot| slot.as_ref())
    }

    /// Get mutable OpEntry by id
    pub fn entry_mut(&mut self, id: NodeId) -> Option<&mut OpEntry> {
        self.nodes.get_mut(id.0).and_then(|slot| slot.as_mut())
    }

    /// Check if a node exists (eliminated or not)
    pub fn has_node(&self, id: NodeId) -> bool {
        self.entry(id).is_some()
    }

    /// Get the number of nodes still stored
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    /// Iterate over all stored nodes in processing order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.order.iter().filter_map(move |&id| self.node(id))
    }

    /// Processing order snapshot source
    pub fn processing_order(&self) -> &[NodeId] {
        &self.order
    }

    // ========================================================================
    // Graph traversal
    // ========================================================================

    /// Get the producer node of a value
    pub fn producer(&self, value: Value) -> Option<&Node> {
        self.node(value.node)
    }

    /// Get the layout of a value
    pub fn layout(&self, value: Value) -> Option<&Layout> {
        self.producer(value).and_then(|n| n.outputs.get(value.port))
    }

    /// Get the consumers of a value
    pub fn consumers(&self, value: Value) -> &[Consumer] {
        self.consumer_map
            .get(&value)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Number of consuming input ports of a value
    pub fn consumer_count(&self, value: Value) -> usize {
        self.consumers(value).len()
    }

    /// Get the consumer nodes of a value
    pub fn consumer_nodes(&self, value: Value) -> Vec<&Node> {
        self.consumers(value)
            .iter()
            .filter_map(|c| self.node(c.node))
            .collect()
    }

    /// Graph outputs
    pub fn outputs(&self) -> &[Value] {
        &self.outputs
    }

    /// Check if a value is a graph output
    pub fn is_output_value(&self, value: Value) -> bool {
        self.outputs.contains(&value)
    }

    /// Check if any output of a node is a graph output
    pub fn is_output(&self, id: NodeId) -> bool {
        self.outputs.iter().any(|v| v.node == id)
    }

    // ========================================================================
    // Node state management
    // ========================================================================

    /// Check if a node is marked for elimination
    pub fn is_eliminated(&self, id: NodeId) -> bool {
        self.entry(id).map(|e| e.eliminated).unwrap_or(false)
    }

    /// Get nodes that are not eliminated, in processing order
    pub fn active_nodes(&self) -> impl Iterator<Item = &Node> {
        self.order
            .iter()
            .filter_map(move |&id| self.entry(id))
            .filter(|e| !e.eliminated)
            .map(|e| &e.node)
    }

    /// Count active (non-eliminated) nodes
    pub fn active_node_count(&self) -> usize {
        self.nodes
            .iter()
            .flatten()
            .filter(|e| !e.eliminated)
            .count()
    }
}
