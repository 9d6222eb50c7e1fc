//! Graph mutation operations
//!
//! Methods for modifying the graph structure: adding nodes, rewiring uses,
//! eliminating and compacting.

use smallvec::SmallVec;

use crate::error::{RewriteError, RewriteResult};
use crate::tensor::TensorData;

use super::context::Graph;
use super::maps::{build_consumer_map, Consumer, OpEntry};
use super::node::{AttrValue, NodeBuilder, NodeId, Value};
use super::types::{Layout, OpType};

impl Graph {
    // ========================================================================
    // Node insertion
    // ========================================================================

    /// Insert a new node into the graph
    ///
    /// Every input must reference an existing output of a live node. The
    /// node is appended to the processing order.
    pub fn add_node(&mut self, builder: NodeBuilder) -> RewriteResult<NodeId> {
        for input in &builder.inputs {
            self.check_value(*input)?;
        }

        let id = NodeId(self.nodes.len());
        let node = builder.build(id);

        for (port, input) in node.inputs.iter().enumerate() {
            self.consumer_map
                .entry(*input)
                .or_default()
                .push(Consumer { node: id, port });
        }

        self.nodes.push(Some(OpEntry::new(node)));
        self.order.push(id);
        Ok(id)
    }

    /// Add a `Parameter` node and return its value
    pub fn add_parameter(&mut self, name: &str, layout: Layout) -> Value {
        self.push_leaf(NodeBuilder::new(OpType::Parameter).name(name).output(layout))
    }

    /// Add a `Constant` node and return its value
    pub fn add_constant(&mut self, name: &str, data: TensorData) -> Value {
        let layout = Layout::new(data.partial_shape(), data.element_type());
        self.push_leaf(
            NodeBuilder::new(OpType::Constant)
                .name(name)
                .output(layout)
                .attr("value", AttrValue::Tensor(data)),
        )
    }

    fn push_leaf(&mut self, builder: NodeBuilder) -> Value {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(OpEntry::new(builder.build(id))));
        self.order.push(id);
        Value::new(id, 0)
    }

    // ========================================================================
    // Graph outputs
    // ========================================================================

    /// Replace the graph outputs
    pub fn set_outputs(&mut self, outputs: Vec<Value>) {
        self.outputs = outputs;
    }

    /// Append a graph output
    pub fn add_output(&mut self, value: Value) {
        self.outputs.push(value);
    }

    // ========================================================================
    // Rewiring
    // ========================================================================

    /// Update a node's input at the given index
    pub fn set_input(&mut self, id: NodeId, port: usize, value: Value) -> RewriteResult<()> {
        self.check_value(value)?;
        let node = self.node_mut(id).ok_or(RewriteError::InvalidNode(id))?;
        let slot = node.inputs.get_mut(port).ok_or_else(|| {
            RewriteError::Internal(format!("node {} has no input {}", id, port))
        })?;
        let old = std::mem::replace(slot, value);
        self.move_consumer(Consumer { node: id, port }, old, value);
        Ok(())
    }

    /// Rewire every use of `from` to `to`
    ///
    /// Input ports of `to`'s own producer are left alone so a replacement
    /// node may still read `from`. Graph outputs referencing `from` are
    /// updated too. Returns the number of rewired uses.
    pub fn redirect_consumers(&mut self, from: Value, to: Value) -> usize {
        if from == to {
            return 0;
        }

        let consumers: SmallVec<[Consumer; 4]> = self
            .consumers(from)
            .iter()
            .copied()
            .filter(|c| c.node != to.node)
            .collect();

        let mut count = 0;
        for c in consumers {
            if let Some(slot) = self
                .node_mut(c.node)
                .and_then(|n| n.inputs.get_mut(c.port))
            {
                *slot = to;
                self.move_consumer(c, from, to);
                count += 1;
            }
        }

        for output in self.outputs.iter_mut() {
            if *output == from {
                *output = to;
                count += 1;
            }
        }

        count
    }

    fn move_consumer(&mut self, consumer: Consumer, from: Value, to: Value) {
        if let Some(uses) = self.consumer_map.get_mut(&from) {
            uses.retain(|c| *c != consumer);
            if uses.is_empty() {
                self.consumer_map.remove(&from);
            }
        }
        self.consumer_map.entry(to).or_default().push(consumer);
    }

    fn check_value(&self, value: Value) -> RewriteResult<()> {
        match self.entry(value.node) {
            Some(e) if !e.eliminated && value.port < e.node.outputs.len() => Ok(()),
            _ => Err(RewriteError::InvalidNode(value.node)),
        }
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Mark a node for elimination
    ///
    /// Its input edges are dropped right away so producers see the use
    /// counts they will have after compaction.
    pub fn mark_eliminated(&mut self, id: NodeId) -> bool {
        let inputs = match self.entry_mut(id) {
            Some(entry) if !entry.eliminated => {
                entry.mark_eliminated();
                entry.node.inputs.clone()
            }
            _ => return false,
        };

        for (port, input) in inputs.iter().enumerate() {
            if let Some(uses) = self.consumer_map.get_mut(input) {
                uses.retain(|c| !(c.node == id && c.port == port));
                if uses.is_empty() {
                    self.consumer_map.remove(input);
                }
            }
        }
        true
    }

    /// Drop eliminated nodes and recompute the processing order
    ///
    /// Returns the number of removed nodes.
    pub fn compact(&mut self) -> usize {
        let mut removed = 0;
        for slot in self.nodes.iter_mut() {
            if slot.as_ref().map(|e| e.eliminated).unwrap_or(false) {
                *slot = None;
                removed += 1;
            }
        }

        self.consumer_map = build_consumer_map(self.nodes.iter().flatten());
        self.refresh_order();
        removed
    }

    /// Stable depth-first topological sort
    ///
    /// Seeds follow the previous order, then nodes not yet in it by id, so
    /// an already sorted order is left unchanged.
    fn refresh_order(&mut self) {
        let len = self.nodes.len();
        let mut queued = vec![false; len];
        let mut seeds: Vec<NodeId> = Vec::with_capacity(len);
        for &id in &self.order {
            if self.has_node(id) && !queued[id.0] {
                queued[id.0] = true;
                seeds.push(id);
            }
        }
        for index in 0..len {
            if !queued[index] && self.nodes[index].is_some() {
                seeds.push(NodeId(index));
            }
        }

        // 0 = unvisited, 1 = on stack, 2 = emitted
        let mut state = vec![0u8; len];
        let mut order = Vec::with_capacity(seeds.len());
        for seed in seeds {
            if state[seed.0] != 0 {
                continue;
            }
            state[seed.0] = 1;
            let mut stack = vec![(seed, 0usize)];
            while let Some((id, next)) = stack.pop() {
                let pred = self
                    .node(id)
                    .and_then(|n| n.inputs.get(next))
                    .map(|v| v.node);
                match pred {
                    Some(pred) => {
                        stack.push((id, next + 1));
                        if pred.0 < len && state[pred.0] == 0 && self.has_node(pred) {
                            state[pred.0] = 1;
                            stack.push((pred, 0));
                        }
                    }
                    None => {
                        state[id.0] = 2;
                        order.push(id);
                    }
                }
            }
        }

        self.order = order;
    }
}
