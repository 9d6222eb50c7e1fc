//! Reverse LSTM fusion
//!
//! Folds a forward `LstmSequence` sandwiched between two `ReverseSequence`
//! nodes into one reverse `LstmSequence`:
//!
//! ```text
//! X -> ReverseSequence(L) -> LstmSequence(forward, L) -> [Squeeze] -> ReverseSequence(L)
//! ```
//!
//! becomes
//!
//! ```text
//! X -> LstmSequence(reverse, L) -> [Squeeze]
//! ```

use log::debug;

use crate::error::RewriteResult;
use crate::graph::{AttrValue, Graph, Node, NodeBuilder, NodeId, OpType, Value};
use crate::op_types;
use crate::pattern::{
    any_input, any_input_with, consumers_count, optional, rank_equals, wrap_type,
    wrap_type_with, MatchResult, Pattern,
};
use crate::tensor::normalize_axis;
use crate::traits::GraphPass;
use crate::transform::{eliminate_if_unused, MatcherPass, PassResult, RewriteConfig};

use super::common::{get_attr_i, get_attr_s, make_squeeze};

/// Patterns of the sandwich, kept to read the bindings back
struct ReversePatterns {
    first_reverse: Pattern,
    lengths: Pattern,
    lstm: Pattern,
    squeeze: Pattern,
}

fn build_pattern() -> RewriteResult<(Pattern, ReversePatterns)> {
    let data = any_input_with(rank_equals(3));
    let lengths = any_input();
    let first_reverse = wrap_type(&op_types![ReverseSequence], vec![data, lengths.clone()]);

    let mut lstm_inputs = vec![first_reverse.clone()];
    lstm_inputs.extend((0..6).map(|_| any_input()));
    let lstm = wrap_type_with(&op_types![LstmSequence], lstm_inputs, consumers_count(1));
    let squeeze = optional(&op_types![Squeeze], vec![lstm.clone()], Some(consumers_count(1)))?;

    let root = wrap_type(
        &op_types![ReverseSequence],
        vec![squeeze.clone(), lengths.clone()],
    );
    Ok((
        root,
        ReversePatterns {
            first_reverse,
            lengths,
            lstm,
            squeeze,
        },
    ))
}

/// ReverseSequence axes, negative values normalized
fn reverse_axes(node: &Node, rank: usize) -> Option<(usize, usize)> {
    let batch = normalize_axis(get_attr_i(node, "batch_axis").unwrap_or(0), rank).ok()?;
    let seq = normalize_axis(get_attr_i(node, "seq_axis").unwrap_or(1), rank).ok()?;
    Some((batch, seq))
}

fn is_forward(node: &Node) -> bool {
    get_attr_s(node, "direction").unwrap_or("forward") == "forward"
}

/// Nodes taking part in one fusion, collected before mutation
struct ReversePlan {
    first_reverse: NodeId,
    second_reverse: NodeId,
    lstm: NodeId,
    squeeze: Option<NodeId>,
    lengths: Value,
}

fn analyze(graph: &Graph, m: &MatchResult, p: &ReversePatterns) -> Option<ReversePlan> {
    let second = graph.node(m.root().node)?;
    let first = graph.node(m.node_of(&p.first_reverse)?)?;
    let lstm_value = m.get(&p.lstm)?;
    let lstm = graph.node(lstm_value.node)?;
    let lengths = m.get(&p.lengths)?;

    if lstm_value.port != 0 || !is_forward(lstm) || graph.is_output_value(lstm_value) {
        return None;
    }

    // The squeeze binds to the LSTM output when absent
    let squeeze_value = m.get(&p.squeeze)?;
    let squeeze = if squeeze_value == lstm_value {
        None
    } else {
        let node = graph.node(squeeze_value.node)?;
        let axes = graph.constant_ints(node.inputs[1])?;
        if axes.len() != 1 || normalize_axis(axes[0], 4).ok()? != 1 {
            return None;
        }
        if graph.is_output_value(squeeze_value) {
            return None;
        }
        Some(node.id)
    };

    if reverse_axes(first, 3)? != (0, 1) {
        return None;
    }
    let expected = if squeeze.is_some() { (0, 1) } else { (0, 2) };
    let out_rank = graph.layout(second.inputs[0])?.shape.rank();
    if reverse_axes(second, out_rank)? != expected {
        return None;
    }

    // LSTM lengths must be the reversal lengths
    let lstm_lengths = lstm.inputs[3];
    if lstm_lengths != lengths {
        match (graph.constant_ints(lstm_lengths), graph.constant_ints(lengths)) {
            (Some(a), Some(b)) if a == b => {}
            _ => return None,
        }
    }

    Some(ReversePlan {
        first_reverse: first.id,
        second_reverse: second.id,
        lstm: lstm.id,
        squeeze,
        lengths,
    })
}

fn fuse(graph: &mut Graph, plan: ReversePlan) -> RewriteResult<bool> {
    let Some(old) = graph.node(plan.lstm).cloned() else {
        return Ok(false);
    };
    let Some(data) = graph.node(plan.first_reverse).map(|n| n.inputs[0]) else {
        return Ok(false);
    };

    let mut inputs = old.inputs.clone();
    inputs[0] = data;
    inputs[3] = plan.lengths;

    let fused = graph.add_node(
        NodeBuilder::new(OpType::LstmSequence)
            .name(format!("{}/reverse", old.name))
            .inputs(inputs)
            .outputs(old.outputs.iter().cloned())
            .attrs_from(&old.attributes)
            .attr("direction", AttrValue::Str("reverse".to_string())),
    )?;

    let y = match plan.squeeze {
        Some(_) => make_squeeze(graph, &format!("{}/y", old.name), Value::new(fused, 0), 1)?,
        None => Value::new(fused, 0),
    };
    graph.redirect_consumers(Value::new(plan.second_reverse, 0), y);
    for port in 1..old.outputs.len() {
        graph.redirect_consumers(Value::new(plan.lstm, port), Value::new(fused, port));
    }

    graph.mark_eliminated(plan.second_reverse);
    if let Some(squeeze) = plan.squeeze {
        graph.mark_eliminated(squeeze);
    }
    graph.mark_eliminated(plan.lstm);
    eliminate_if_unused(graph, plan.first_reverse);

    debug!("fuse_reverse_lstm_sequence: {} -> {}", old.name, fused);
    Ok(true)
}

/// ReverseSequence → forward LSTMSequence → ReverseSequence to reverse LSTMSequence
#[derive(Debug)]
pub struct FuseReverseLstmSequence {
    pass: MatcherPass,
}

impl FuseReverseLstmSequence {
    /// Create the pass
    pub fn new() -> RewriteResult<Self> {
        let (root, patterns) = build_pattern()?;
        let pass = MatcherPass::new("fuse_reverse_lstm_sequence", root, move |graph, m| {
            match analyze(graph, m, &patterns) {
                Some(plan) => fuse(graph, plan),
                None => Ok(false),
            }
        });
        Ok(Self { pass })
    }

    /// Configure standalone runs
    pub fn with_config(self, config: RewriteConfig) -> Self {
        Self {
            pass: self.pass.with_config(config),
        }
    }

    /// Underlying matcher pass
    pub fn into_pass(self) -> MatcherPass {
        self.pass
    }
}

impl GraphPass for FuseReverseLstmSequence {
    fn name(&self) -> &str {
        self.pass.name()
    }

    fn run(&self, graph: &mut Graph) -> RewriteResult<PassResult> {
        self.pass.run(graph)
    }

    fn is_applicable(&self, graph: &Graph) -> bool {
        !graph.find_nodes_by_op(OpType::ReverseSequence).is_empty()
    }
}
