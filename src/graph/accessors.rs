//! Advanced graph accessor methods
//!
//! High-level queries used by pattern predicates and rewrite callbacks.

use crate::tensor::{ElementType, TensorData};

use super::context::Graph;
use super::node::{Node, NodeId, Value};
use super::types::{Layout, OpType};

impl Graph {
    // ========================================================================
    // Pattern matching helpers
    // ========================================================================

    /// Find active nodes by op type
    pub fn find_nodes_by_op(&self, op: OpType) -> Vec<&Node> {
        self.active_nodes().filter(|n| n.op == op).collect()
    }

    /// Find active nodes matching any of the given op types
    pub fn find_nodes_by_ops(&self, ops: &[OpType]) -> Vec<&Node> {
        self.active_nodes().filter(|n| ops.contains(&n.op)).collect()
    }

    /// Find a node by name
    pub fn find_node_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes().find(|n| n.name == name)
    }

    /// Op type of the producer of a value
    pub fn op_of(&self, value: Value) -> Option<OpType> {
        self.producer(value).map(|n| n.op)
    }

    // ========================================================================
    // Constants
    // ========================================================================

    /// Constant payload of a value produced by `Constant`/`Data`
    pub fn constant_data(&self, value: Value) -> Option<&TensorData> {
        if value.port != 0 {
            return None;
        }
        self.producer(value).and_then(|n| n.constant_value())
    }

    /// Check if a value is produced by a `Constant` or `Data` node
    pub fn is_constant(&self, value: Value) -> bool {
        matches!(self.op_of(value), Some(OpType::Constant | OpType::Data))
    }

    /// Integer contents of a constant value
    pub fn constant_ints(&self, value: Value) -> Option<Vec<i64>> {
        self.constant_data(value).and_then(|t| t.to_i64_vec().ok())
    }

    // ========================================================================
    // Shape and type queries
    // ========================================================================

    /// Layout of input `port` of a node
    pub fn input_layout(&self, id: NodeId, port: usize) -> Option<&Layout> {
        let input = *self.node(id)?.inputs.get(port)?;
        self.layout(input)
    }

    /// Element type of a value
    pub fn element_type(&self, value: Value) -> Option<ElementType> {
        self.layout(value).map(|l| l.element_type)
    }

    /// Check if any input or output layout of a node is dynamic
    pub fn is_dynamic_node(&self, id: NodeId) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        node.is_dynamic()
            || node
                .inputs
                .iter()
                .any(|&v| self.layout(v).map(|l| l.is_dynamic()).unwrap_or(false))
    }

    // ========================================================================
    // Connectivity analysis
    // ========================================================================

    /// Check if a value is unused (dead)
    pub fn is_unused(&self, value: Value) -> bool {
        !self.is_output_value(value) && self.consumer_count(value) == 0
    }

    /// Check if no output of a node is used
    pub fn is_node_unused(&self, id: NodeId) -> bool {
        self.node(id)
            .map(|n| n.output_values().all(|v| self.is_unused(v)))
            .unwrap_or(true)
    }

    /// Inputs and graph outputs of live nodes that point at missing or
    /// eliminated producers
    pub fn dangling_references(&self) -> Vec<Value> {
        let mut dangling: Vec<Value> = self
            .active_nodes()
            .flat_map(|n| n.inputs.iter().copied())
            .chain(self.outputs.iter().copied())
            .filter(|&v| match self.entry(v.node) {
                Some(e) => e.eliminated || v.port >= e.node.outputs.len(),
                None => true,
            })
            .collect();
        dangling.dedup();
        dangling
    }
}
