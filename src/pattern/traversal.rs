//! Graph traversal utilities
//!
//! Breadth-first walks over producer/consumer edges.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::graph::{Graph, Node, NodeId};

/// Direction of traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Forward: follow consumer edges (input → output)
    Forward,
    /// Backward: follow producer edges (output → input)
    Backward,
}

/// Live neighbours of a node in the given direction
fn neighbours(graph: &Graph, node: &Node, direction: Direction) -> SmallVec<[NodeId; 8]> {
    match direction {
        Direction::Forward => node
            .output_values()
            .flat_map(|v| graph.consumers(v).iter().map(|c| c.node))
            .collect(),
        Direction::Backward => node
            .inputs
            .iter()
            .map(|v| v.node)
            .filter(|&id| !graph.is_eliminated(id))
            .collect(),
    }
}

/// BFS traversal iterator
pub struct BfsIterator<'a> {
    graph: &'a Graph,
    queue: VecDeque<NodeId>,
    visited: FxHashSet<NodeId>,
    direction: Direction,
}

impl<'a> BfsIterator<'a> {
    /// Create a new BFS iterator starting from the given node
    pub fn new(graph: &'a Graph, start: NodeId, direction: Direction) -> Self {
        let mut queue = VecDeque::new();
        let mut visited = FxHashSet::default();

        if graph.has_node(start) {
            queue.push_back(start);
            visited.insert(start);
        }

        Self {
            graph,
            queue,
            visited,
            direction,
        }
    }

    /// Create forward BFS (follows consumers)
    pub fn forward(graph: &'a Graph, start: NodeId) -> Self {
        Self::new(graph, start, Direction::Forward)
    }

    /// Create backward BFS (follows producers)
    pub fn backward(graph: &'a Graph, start: NodeId) -> Self {
        Self::new(graph, start, Direction::Backward)
    }
}

impl<'a> Iterator for BfsIterator<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.queue.pop_front()?;
        let node = self.graph.node(id)?;

        for next in neighbours(self.graph, node, self.direction) {
            if self.visited.insert(next) {
                self.queue.push_back(next);
            }
        }

        Some(node)
    }
}

/// Collect all predecessor nodes (backward reachable)
pub fn predecessors(graph: &Graph, start: NodeId) -> Vec<&Node> {
    BfsIterator::backward(graph, start).skip(1).collect()
}

/// Collect all successor nodes (forward reachable)
pub fn successors(graph: &Graph, start: NodeId) -> Vec<&Node> {
    BfsIterator::forward(graph, start).skip(1).collect()
}

/// Check if there's a forward path between two nodes
pub fn has_path(graph: &Graph, from: NodeId, to: NodeId) -> bool {
    from == to || BfsIterator::forward(graph, from).any(|n| n.id == to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Layout, NodeBuilder, OpType, Value};

    /// x -> relu_0 -> relu_1 -> relu_2, plus x -> side
    fn make_chain_graph() -> (Graph, Vec<NodeId>, NodeId) {
        let mut graph = Graph::new();
        let x = graph.add_parameter("x", Layout::f32(&[4]));
        let mut ids = vec![x.node];
        let mut prev = x;
        for i in 0..3 {
            let id = graph
                .add_node(
                    NodeBuilder::new(OpType::Relu)
                        .name(format!("relu_{}", i))
                        .input(prev)
                        .output(Layout::f32(&[4])),
                )
                .unwrap();
            ids.push(id);
            prev = Value::new(id, 0);
        }
        let side = graph
            .add_node(
                NodeBuilder::new(OpType::Identity)
                    .input(x)
                    .output(Layout::f32(&[4])),
            )
            .unwrap();
        (graph, ids, side)
    }

    #[test]
    fn test_bfs_forward() {
        let (graph, ids, side) = make_chain_graph();

        let visited: Vec<_> = BfsIterator::forward(&graph, ids[1]).map(|n| n.id).collect();
        assert_eq!(visited, vec![ids[1], ids[2], ids[3]]);

        let from_x: Vec<_> = BfsIterator::forward(&graph, ids[0]).map(|n| n.id).collect();
        assert_eq!(from_x.len(), 5);
        assert!(from_x.contains(&side));
    }

    #[test]
    fn test_bfs_backward() {
        let (graph, ids, _) = make_chain_graph();

        let visited: Vec<_> = BfsIterator::backward(&graph, ids[3]).map(|n| n.id).collect();
        assert_eq!(visited, vec![ids[3], ids[2], ids[1], ids[0]]);
    }

    #[test]
    fn test_predecessors_successors() {
        let (graph, ids, side) = make_chain_graph();

        assert_eq!(predecessors(&graph, ids[3]).len(), 3);
        let succs = successors(&graph, ids[1]);
        assert_eq!(succs.len(), 2);
        assert!(succs.iter().all(|n| n.id != side));
    }

    #[test]
    fn test_has_path() {
        let (graph, ids, side) = make_chain_graph();

        assert!(has_path(&graph, ids[0], ids[3]));
        assert!(has_path(&graph, ids[1], ids[1]));
        assert!(!has_path(&graph, ids[3], ids[0]));
        assert!(!has_path(&graph, ids[1], side));
    }
}
