//! Node elimination
//!
//! Removes nodes while keeping every use wired to a live value.

use log::trace;

use crate::graph::{Graph, NodeId, OpType, Value};

/// Result of an elimination operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EliminationResult {
    /// Eliminated node
    pub node: NodeId,
    /// Number of uses bridged to the node's input
    pub bridged_connections: usize,
}

/// Eliminate a pass-through node and bridge its uses
///
/// Uses of output 0 are rewired to input `bridge_input`.
///
/// # Returns
/// * `Some(EliminationResult)` if successful
/// * `None` if the node is missing, already eliminated or has no such input
pub fn eliminate_node(
    graph: &mut Graph,
    id: NodeId,
    bridge_input: usize,
) -> Option<EliminationResult> {
    if graph.is_eliminated(id) {
        return None;
    }
    let source = *graph.node(id)?.inputs.get(bridge_input)?;

    let bridged = graph.redirect_consumers(Value::new(id, 0), source);
    graph.mark_eliminated(id);

    Some(EliminationResult {
        node: id,
        bridged_connections: bridged,
    })
}

/// Eliminate a node only if none of its outputs is used
pub fn eliminate_if_unused(graph: &mut Graph, id: NodeId) -> bool {
    if graph.is_eliminated(id) || !graph.is_node_unused(id) {
        return false;
    }
    graph.mark_eliminated(id)
}

/// Eliminate the `Constant` producers of `values` left without uses
///
/// Used after a rewrite drops the node that read them.
pub fn eliminate_unused_constants(graph: &mut Graph, values: &[Value]) -> usize {
    let mut removed = 0;
    for &value in values {
        if graph.op_of(value) == Some(OpType::Constant) && eliminate_if_unused(graph, value.node) {
            trace!("eliminated unused constant {}", value.node);
            removed += 1;
        }
    }
    removed
}

/// Eliminate dead nodes (outputs not used by any node or graph output)
///
/// `Parameter` nodes are kept. Repeats until no more nodes die.
pub fn eliminate_dead_nodes(graph: &mut Graph) -> Vec<NodeId> {
    let mut removed = Vec::new();

    loop {
        let dead: Vec<NodeId> = graph
            .active_nodes()
            .filter(|n| n.op != OpType::Parameter)
            .filter(|n| graph.is_node_unused(n.id))
            .map(|n| n.id)
            .collect();

        if dead.is_empty() {
            break;
        }

        for id in dead {
            if graph.mark_eliminated(id) {
                trace!("eliminated dead node {}", id);
                removed.push(id);
            }
        }
    }

    removed
}
