//! Bidirectional LSTM fusion
//!
//! Merges a forward and a reverse `LstmSequence` that read the same input
//! and sequence lengths, and whose `Y` outputs are concatenated, into one
//! bidirectional `LstmSequence`.
//!
//! Two concatenation layouts are recognised:
//!
//! - `Concat(Y_fw, Y_bw, axis=1)` on `[B, 1, T, H]` outputs, replaced by the
//!   bidirectional `Y` directly
//! - `Concat(Squeeze(Y_fw, 1), Squeeze(Y_bw, 1), axis=-1)`, replaced by
//!   `Reshape(Transpose(Y, [0, 2, 1, 3]), [0, 0, -1])`

use log::{debug, trace};

use crate::error::RewriteResult;
use crate::graph::{AttrValue, Graph, Layout, Node, NodeBuilder, NodeId, OpType, Value};
use crate::op_types;
use crate::pattern::{
    any_input, consumers_count, has_path, optional, wrap_type, wrap_type_with, MatchResult,
    Pattern,
};
use crate::tensor::{concat_tensors, normalize_axis, Dim};
use crate::traits::GraphPass;
use crate::transform::{eliminate_unused_constants, MatcherPass, PassResult, RewriteConfig};

use super::common::{
    get_attr_i, get_attr_s, layout_of, make_concat, make_reshape, make_split, make_transpose,
};

/// Attributes both directions must agree on
const SHARED_ATTRIBUTES: &[&str] = &[
    "hidden_size",
    "activations",
    "activations_alpha",
    "activations_beta",
    "clip",
];

struct BidirectionalPatterns {
    forward: Pattern,
    backward: Pattern,
    forward_squeeze: Pattern,
    backward_squeeze: Pattern,
}

fn lstm_pattern(data: &Pattern, lengths: &Pattern) -> Pattern {
    let inputs = vec![
        data.clone(),
        any_input(),
        any_input(),
        lengths.clone(),
        any_input(),
        any_input(),
        any_input(),
    ];
    wrap_type_with(&op_types![LstmSequence], inputs, consumers_count(1))
}

fn build_pattern() -> RewriteResult<(Pattern, BidirectionalPatterns)> {
    let data = any_input();
    let lengths = any_input();
    let forward = lstm_pattern(&data, &lengths);
    let backward = lstm_pattern(&data, &lengths);
    let forward_squeeze = optional(
        &op_types![Squeeze],
        vec![forward.clone()],
        Some(consumers_count(1)),
    )?;
    let backward_squeeze = optional(
        &op_types![Squeeze],
        vec![backward.clone()],
        Some(consumers_count(1)),
    )?;
    let root = wrap_type(
        &op_types![Concat],
        vec![forward_squeeze.clone(), backward_squeeze.clone()],
    );
    Ok((
        root,
        BidirectionalPatterns {
            forward,
            backward,
            forward_squeeze,
            backward_squeeze,
        },
    ))
}

/// How the two `Y` outputs are joined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConcatLayout {
    /// `[B, 1, T, H]` concatenated on axis 1
    Direction,
    /// `[B, T, H]` concatenated on the last axis
    Feature,
}

struct BidirectionalPlan {
    concat: NodeId,
    forward: NodeId,
    backward: NodeId,
    squeezes: Vec<NodeId>,
    layout: ConcatLayout,
}

/// Node id of the squeeze bound by an optional, if present
fn squeeze_node(graph: &Graph, m: &MatchResult, optional: &Pattern, lstm: Value) -> Option<Option<NodeId>> {
    let value = m.get(optional)?;
    if value == lstm {
        return Some(None);
    }
    let node = graph.node(value.node)?;
    let axes = graph.constant_ints(*node.inputs.get(1)?)?;
    if axes.len() == 1 && normalize_axis(axes[0], 4).ok()? == 1 {
        Some(Some(node.id))
    } else {
        None
    }
}

fn direction(node: &Node) -> &str {
    get_attr_s(node, "direction").unwrap_or("forward")
}

fn analyze(graph: &Graph, m: &MatchResult, p: &BidirectionalPatterns) -> Option<BidirectionalPlan> {
    let concat = graph.node(m.root().node)?;
    let fw_value = m.get(&p.forward)?;
    let bw_value = m.get(&p.backward)?;
    if fw_value.port != 0 || bw_value.port != 0 {
        return None;
    }
    let fw = graph.node(fw_value.node)?;
    let bw = graph.node(bw_value.node)?;

    if direction(fw) != "forward" || direction(bw) != "reverse" {
        return None;
    }
    if SHARED_ATTRIBUTES
        .iter()
        .any(|a| fw.get_attribute(a) != bw.get_attribute(a))
    {
        trace!("fuse_bidirectional_lstm_sequence: attributes differ");
        return None;
    }
    if has_path(graph, fw.id, bw.id) || has_path(graph, bw.id, fw.id) {
        return None;
    }

    if !directions_compatible(graph, fw, bw) {
        trace!("fuse_bidirectional_lstm_sequence: operand layouts differ");
        return None;
    }

    let fw_squeeze = squeeze_node(graph, m, &p.forward_squeeze, fw_value)?;
    let bw_squeeze = squeeze_node(graph, m, &p.backward_squeeze, bw_value)?;
    let rank = concat.outputs.first()?.shape.rank();
    let axis = normalize_axis(get_attr_i(concat, "axis")?, rank).ok()?;
    let (layout, squeezes) = match (fw_squeeze, bw_squeeze) {
        (Some(a), Some(b)) if rank == 3 && axis == 2 => (ConcatLayout::Feature, vec![a, b]),
        (None, None) if rank == 4 && axis == 1 => (ConcatLayout::Direction, Vec::new()),
        _ => return None,
    };

    Some(BidirectionalPlan {
        concat: concat.id,
        forward: fw.id,
        backward: bw.id,
        squeezes,
        layout,
    })
}

/// Operand ranks: H, C and W, R, B by input index
const OPERAND_RANKS: [(usize, usize); 5] = [(1, 3), (2, 3), (4, 3), (5, 3), (6, 2)];

/// Both directions read states and weights of one layout and produce
/// `[B, 1, T, H]` and `[B, 1, H]` results of one layout
fn directions_compatible(graph: &Graph, fw: &Node, bw: &Node) -> bool {
    let operands_match = OPERAND_RANKS.iter().all(|&(i, rank)| {
        let (Some(a), Some(b)) = (graph.layout(fw.inputs[i]), graph.layout(bw.inputs[i])) else {
            return false;
        };
        if a != b || a.shape.rank() != rank {
            return false;
        }
        match (graph.constant_data(fw.inputs[i]), graph.constant_data(bw.inputs[i])) {
            (Some(x), Some(y)) => {
                x.shape() == y.shape()
                    && x.shape().len() == rank
                    && x.element_type() == y.element_type()
            }
            _ => true,
        }
    });
    let one = Some(Dim::Static(1));
    operands_match
        && fw.outputs.len() == 3
        && fw.outputs == bw.outputs
        && fw.outputs[0].shape.rank() == 4
        && fw.outputs[0].shape.get(1) == one
        && fw.outputs[1].shape.rank() == 3
        && fw.outputs[1].shape.get(1) == one
        && fw.outputs[2] == fw.outputs[1]
}

/// Concatenate two operands on `axis`, folding constants
fn join(graph: &mut Graph, name: &str, a: Value, b: Value, axis: usize) -> RewriteResult<Value> {
    if let (Some(x), Some(y)) = (graph.constant_data(a), graph.constant_data(b)) {
        let data = concat_tensors(&[x, y], axis)?;
        return Ok(graph.add_constant(name, data));
    }
    make_concat(graph, name, &[a, b], axis)
}

fn fuse(graph: &mut Graph, plan: BidirectionalPlan) -> RewriteResult<bool> {
    let (Some(fw), Some(bw)) = (
        graph.node(plan.forward).cloned(),
        graph.node(plan.backward).cloned(),
    ) else {
        return Ok(false);
    };
    let name = fw.name.clone();

    let h = make_concat(graph, &format!("{}/h_init", name), &[fw.inputs[1], bw.inputs[1]], 1)?;
    let c = make_concat(graph, &format!("{}/c_init", name), &[fw.inputs[2], bw.inputs[2]], 1)?;
    let w = join(graph, &format!("{}/W", name), fw.inputs[4], bw.inputs[4], 0)?;
    let r = join(graph, &format!("{}/R", name), fw.inputs[5], bw.inputs[5], 0)?;
    let b = join(graph, &format!("{}/B", name), fw.inputs[6], bw.inputs[6], 0)?;

    let y = layout_of(graph, fw.output(0))?;
    let state = layout_of(graph, fw.output(1))?;
    let two = Dim::Static(2);
    let state = Layout::new(state.shape.with_dim(1, two), state.element_type);
    let outputs = [
        Layout::new(y.shape.with_dim(1, two), y.element_type),
        state.clone(),
        state,
    ];

    let fused = graph.add_node(
        NodeBuilder::new(OpType::LstmSequence)
            .name(format!("{}/bidirectional", name))
            .inputs([fw.inputs[0], h, c, fw.inputs[3], w, r, b])
            .outputs(outputs)
            .attrs_from(&fw.attributes)
            .attr("direction", AttrValue::Str("bidirectional".to_string())),
    )?;

    let y_value = match plan.layout {
        ConcatLayout::Direction => Value::new(fused, 0),
        ConcatLayout::Feature => {
            let t = make_transpose(
                graph,
                &format!("{}/y_transpose", name),
                Value::new(fused, 0),
                &[0, 2, 1, 3],
            )?;
            make_reshape(graph, &format!("{}/y_reshape", name), t, &[0, 0, -1])?
        }
    };
    graph.redirect_consumers(Value::new(plan.concat, 0), y_value);

    // Split states back per direction when anything reads them
    for port in 1..3 {
        let fw_state = Value::new(plan.forward, port);
        let bw_state = Value::new(plan.backward, port);
        if graph.is_unused(fw_state) && graph.is_unused(bw_state) {
            continue;
        }
        let parts = make_split(
            graph,
            &format!("{}/split_{}", name, port),
            Value::new(fused, port),
            1,
            2,
        )?;
        graph.redirect_consumers(fw_state, parts[0]);
        graph.redirect_consumers(bw_state, parts[1]);
    }

    let mut replaced: Vec<Value> = fw.inputs.iter().chain(bw.inputs.iter()).copied().collect();
    graph.mark_eliminated(plan.concat);
    for squeeze in plan.squeezes {
        if let Some(node) = graph.node(squeeze) {
            replaced.extend(node.inputs.iter().copied());
        }
        graph.mark_eliminated(squeeze);
    }
    graph.mark_eliminated(plan.forward);
    graph.mark_eliminated(plan.backward);
    eliminate_unused_constants(graph, &replaced);

    debug!(
        "fuse_bidirectional_lstm_sequence: {} + {} -> {}",
        fw.name, bw.name, fused
    );
    Ok(true)
}

/// Forward and reverse LSTMSequence pair to one bidirectional LSTMSequence
#[derive(Debug)]
pub struct FuseBidirectionalLstmSequence {
    pass: MatcherPass,
}

impl FuseBidirectionalLstmSequence {
    /// Create the pass
    pub fn new() -> RewriteResult<Self> {
        let (root, patterns) = build_pattern()?;
        let pass = MatcherPass::new("fuse_bidirectional_lstm_sequence", root, move |graph, m| {
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

impl GraphPass for FuseBidirectionalLstmSequence {
    fn name(&self) -> &str {
        self.pass.name()
    }

    fn run(&self, graph: &mut Graph) -> RewriteResult<PassResult> {
        self.pass.run(graph)
    }

    fn is_applicable(&self, graph: &Graph) -> bool {
        graph.find_nodes_by_op(OpType::LstmSequence).len() >= 2
    }
}
