//! Runtime-skip marking
//!
//! Flags `Gather`, `Permute` and `StridedSlice` nodes that may turn into
//! no-ops once runtime shapes are known, so the scheduler can skip them.

use log::debug;

use crate::error::RewriteResult;
use crate::graph::{Graph, ImplType, Node, NodeId, OpType};
use crate::tensor::{normalize_axis, Dim};
use crate::traits::GraphPass;
use crate::transform::PassResult;

use super::common::{get_attr_i, get_attr_ints};

/// Mark nodes that can be skipped at runtime
///
/// One scan over the processing order. Nodes preferring the CPU
/// implementation are left alone.
#[derive(Debug, Default)]
pub struct MarkRuntimeSkippableNodes;

impl MarkRuntimeSkippableNodes {
    /// Create the pass
    pub fn new() -> Self {
        Self
    }

    /// Check a single node
    pub fn can_be_optimized(graph: &Graph, node: &Node) -> bool {
        match node.op {
            OpType::Gather => gather_skippable(graph, node),
            OpType::Permute => permute_skippable(graph, node),
            OpType::StridedSlice => strided_slice_skippable(graph, node),
            _ => false,
        }
    }
}

impl GraphPass for MarkRuntimeSkippableNodes {
    fn name(&self) -> &str {
        "mark_runtime_skippable_nodes"
    }

    fn run(&self, graph: &mut Graph) -> RewriteResult<PassResult> {
        let mut result = PassResult::new();
        result.iterations = 1;

        let candidates: Vec<NodeId> = graph
            .processing_order()
            .iter()
            .filter_map(|&id| graph.node(id))
            .filter(|n| !graph.is_eliminated(n.id))
            .filter(|n| {
                matches!(
                    n.op,
                    OpType::Gather | OpType::Permute | OpType::StridedSlice
                )
            })
            .filter(|n| n.preferred_impl != ImplType::Cpu)
            .filter(|n| Self::can_be_optimized(graph, n))
            .map(|n| n.id)
            .collect();

        result.patterns_matched = candidates.len();

        for id in candidates {
            if let Some(node) = graph.node_mut(id) {
                node.runtime_skippable = true;
                debug!("[mark_runtime_skippable_nodes] : {} can_be_optimized", node.name);
                result.record(id);
            }
        }

        Ok(result)
    }

    fn is_applicable(&self, graph: &Graph) -> bool {
        !graph
            .find_nodes_by_ops(&[OpType::Gather, OpType::Permute, OpType::StridedSlice])
            .is_empty()
    }
}

/// Input 0 and output 0 share element type
fn same_element_type(graph: &Graph, node: &Node) -> bool {
    match (graph.input_layout(node.id, 0), node.outputs.first()) {
        (Some(input), Some(output)) => input.element_type == output.element_type,
        _ => false,
    }
}

fn gather_skippable(graph: &Graph, node: &Node) -> bool {
    if node.has_fused_primitives() || !same_element_type(graph, node) {
        return false;
    }

    let Some(&indices) = node.inputs.get(1) else {
        return false;
    };
    if graph.is_constant(indices) {
        return false;
    }

    let (Some(data), Some(index)) = (graph.input_layout(node.id, 0), graph.layout(indices)) else {
        return false;
    };
    if index.shape.rank() != 1 {
        return false;
    }
    let Some(axis) = get_attr_i(node, "axis")
        .and_then(|a| normalize_axis(a, data.shape.rank()).ok())
    else {
        return false;
    };

    match (data.shape.get(axis), index.shape[0]) {
        (Some(Dim::Dynamic), _) | (_, Dim::Dynamic) => true,
        (Some(Dim::Static(a)), Dim::Static(i)) => a == i,
        (None, _) => false,
    }
}

fn permute_skippable(graph: &Graph, node: &Node) -> bool {
    if graph.is_output(node.id) || node.has_fused_primitives() || !same_element_type(graph, node) {
        return false;
    }
    if !graph.is_dynamic_node(node.id) {
        return false;
    }
    let Some(&input) = node.inputs.first() else {
        return false;
    };
    if graph.op_of(input) == Some(OpType::KvCache) {
        return false;
    }

    // A Permute feeding only a Concat stays
    let mut users: Vec<NodeId> = node
        .output_values()
        .flat_map(|v| graph.consumers(v).iter().map(|c| c.node))
        .collect();
    users.sort();
    users.dedup();
    let only_concat = users.len() == 1
        && graph.node(users[0]).map(|n| n.op) == Some(OpType::Concat);
    !only_concat
}

fn is_all(values: &[i64], expected: i64) -> bool {
    values.iter().all(|&v| v == expected)
}

fn strided_slice_skippable(graph: &Graph, node: &Node) -> bool {
    if graph.is_output(node.id) || node.has_fused_primitives() {
        return false;
    }
    let (Some(input), Some(output)) = (graph.input_layout(node.id, 0), node.outputs.first()) else {
        return false;
    };
    if input.format != output.format || input.element_type != output.element_type {
        return false;
    }

    let ints = |name: &str| get_attr_ints(node, name).unwrap_or(&[]);
    let begin = ints("begin");
    let end = ints("end");
    let strides = ints("strides");
    let begin_mask = ints("begin_mask");
    let end_mask = ints("end_mask");

    if ["new_axis_mask", "shrink_axis_mask", "ellipsis_mask"]
        .iter()
        .any(|m| ints(*m).contains(&1))
    {
        return false;
    }

    let begin_ok = is_all(begin, 0) || (!begin_mask.is_empty() && is_all(begin_mask, 1));
    if !begin_ok || !is_all(strides, 1) {
        return false;
    }

    end.iter().enumerate().all(|(i, &e)| {
        let masked = end.len() == end_mask.len() && end_mask[i] == 1;
        let full = match input.shape.get(i) {
            Some(Dim::Static(d)) => e >= 0 && d == e as usize,
            _ => false,
        };
        masked || full
    })
}
