//! Graph map types and builders
//!
//! Defines the slot and index structures behind [`Graph`](super::Graph).

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::node::{Node, NodeId, Value};

/// Arena slot - tracks a node and its state
#[derive(Debug, Clone, PartialEq)]
pub struct OpEntry {
    /// The node itself
    pub node: Node,
    /// Whether this node should be eliminated at the next compaction
    pub eliminated: bool,
}

impl OpEntry {
    /// Create a new entry with the given node
    pub fn new(node: Node) -> Self {
        Self {
            node,
            eliminated: false,
        }
    }

    /// Mark this node for elimination
    pub fn mark_eliminated(&mut self) {
        self.eliminated = true;
    }
}

/// One use of a value: input `port` of `node`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Consumer {
    /// Consuming node
    pub node: NodeId,
    /// Input index on the consumer
    pub port: usize,
}

/// Type alias for consumer map: value → consuming input ports
/// SmallVec optimized for common case of 1-4 consumers
pub type ConsumerMap = FxHashMap<Value, SmallVec<[Consumer; 4]>>;

/// Build consumer map from live nodes
///
/// Eliminated entries contribute no edges.
pub fn build_consumer_map<'a>(entries: impl IntoIterator<Item = &'a OpEntry>) -> ConsumerMap {
    let mut map: ConsumerMap = FxHashMap::default();

    for entry in entries {
        if entry.eliminated {
            continue;
        }
        for (port, input) in entry.node.inputs.iter().enumerate() {
            map.entry(*input).or_default().push(Consumer {
                node: entry.node.id,
                port,
            });
        }
    }

    map
}
