//! Structural pattern matcher
//!
//! Binds a pattern tree to graph values depth-first, root first. The only
//! alternation is the one encoded by `Optional`; any predicate or arity
//! mismatch fails the whole attempt.

use log::trace;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::graph::{Graph, NodeId, OpType, Value};

use super::ops::{Pattern, PatternId, PatternKind};

/// Result of a successful pattern match
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    root: Value,
    bindings: FxHashMap<PatternId, Value>,
    labels: FxHashMap<String, Value>,
    /// Producers claimed by `Op` or present `Optional` nodes, in match order
    nodes: SmallVec<[NodeId; 8]>,
}

impl MatchResult {
    /// Value matched by the pattern root
    pub fn root(&self) -> Value {
        self.root
    }

    /// Value bound to a pattern node
    pub fn get(&self, pattern: &Pattern) -> Option<Value> {
        self.bindings.get(&pattern.id()).copied()
    }

    /// Value bound to a labelled pattern node
    pub fn label(&self, name: &str) -> Option<Value> {
        self.labels.get(name).copied()
    }

    /// Producer node of the value bound to a pattern node
    pub fn node_of(&self, pattern: &Pattern) -> Option<NodeId> {
        self.get(pattern).map(|v| v.node)
    }

    /// Nodes matched by op patterns, root first
    pub fn matched_nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Check if a pattern node took part in the match
    pub fn contains(&self, pattern: &Pattern) -> bool {
        self.bindings.contains_key(&pattern.id())
    }

    /// Number of bound pattern nodes
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Check if nothing is bound
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[derive(Default)]
struct MatchState {
    bindings: FxHashMap<PatternId, Value>,
    labels: FxHashMap<String, Value>,
    /// Value → op pattern node owning it
    claimed: FxHashMap<Value, PatternId>,
    nodes: SmallVec<[NodeId; 8]>,
}

impl MatchState {
    fn bind(&mut self, pattern: &Pattern, value: Value) {
        self.bindings.insert(pattern.id(), value);
        if let Some(label) = pattern.label() {
            self.labels.insert(label.to_string(), value);
        }
    }

    /// Claim `value` for an op node; fails if another op node owns it
    fn claim(&mut self, pattern: &Pattern, value: Value) -> bool {
        match self.claimed.get(&value) {
            Some(&owner) => owner == pattern.id(),
            None => {
                self.claimed.insert(value, pattern.id());
                if !self.nodes.contains(&value.node) {
                    self.nodes.push(value.node);
                }
                true
            }
        }
    }
}

/// Pattern matcher
///
/// Built once per pass and reused for every candidate value.
#[derive(Debug, Clone)]
pub struct Matcher {
    pattern: Pattern,
    name: String,
}

impl Matcher {
    /// Create a matcher for a pattern root
    pub fn new(pattern: Pattern, name: impl Into<String>) -> Self {
        Self {
            pattern,
            name: name.into(),
        }
    }

    /// Root pattern
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Matcher name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Match the pattern with `value` as root
    pub fn match_value(&self, graph: &Graph, value: Value) -> Option<MatchResult> {
        let mut state = MatchState::default();
        if !match_pattern(graph, &self.pattern, value, &mut state) {
            return None;
        }
        trace!("{} matched at {}", self.name, value);
        Some(MatchResult {
            root: value,
            bindings: state.bindings,
            labels: state.labels,
            nodes: state.nodes,
        })
    }

    /// Match against every output of an active node
    pub fn match_node(&self, graph: &Graph, id: NodeId) -> Option<MatchResult> {
        let node = graph.node(id)?;
        node.output_values().find_map(|v| self.match_value(graph, v))
    }

    /// Find all matches in processing order
    pub fn find_all(&self, graph: &Graph) -> Vec<MatchResult> {
        graph
            .active_nodes()
            .filter_map(|n| self.match_node(graph, n.id))
            .collect()
    }
}

/// Count inputs not produced by `Constant`/`Data` nodes
fn data_input_count(graph: &Graph, inputs: &[Value]) -> usize {
    inputs
        .iter()
        .filter(|&&v| !matches!(graph.op_of(v), Some(OpType::Constant | OpType::Data)))
        .count()
}

fn match_pattern(graph: &Graph, pattern: &Pattern, value: Value, state: &mut MatchState) -> bool {
    // Shared pattern node: must see the same value again
    if let Some(&bound) = state.bindings.get(&pattern.id()) {
        return bound == value;
    }

    let node = match graph.entry(value.node) {
        Some(e) if !e.eliminated && value.port < e.node.outputs.len() => &e.node,
        _ => return false,
    };

    if !pattern.accepts(graph, value) {
        return false;
    }

    match pattern.kind() {
        PatternKind::Any => {
            state.bind(pattern, value);
            true
        }
        PatternKind::Op(types) => {
            if !types.contains(&node.op) || !state.claim(pattern, value) {
                return false;
            }
            state.bind(pattern, value);

            let children = pattern.children();
            if children.is_empty() {
                return true;
            }
            if children.len() != node.inputs.len() {
                return false;
            }
            children
                .iter()
                .zip(node.inputs.iter())
                .all(|(child, &input)| match_pattern(graph, child, input, state))
        }
        PatternKind::Optional(types) => {
            let inner = &pattern.children()[0];
            if types.contains(&node.op) {
                // The optional node passes one data value through
                let passes_through = node.outputs.len() == 1
                    && !node.inputs.is_empty()
                    && data_input_count(graph, &node.inputs) == 1
                    && !graph.is_constant(node.inputs[0]);
                if !passes_through || !state.claim(pattern, value) {
                    return false;
                }
                state.bind(pattern, value);
                match_pattern(graph, inner, node.inputs[0], state)
            } else {
                // Absent: the optional node aliases the inner match
                state.bind(pattern, value);
                match_pattern(graph, inner, value, state)
            }
        }
    }
}
