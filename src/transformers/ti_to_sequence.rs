//! Recurrent loop to Sequence conversion
//!
//! Replaces a `TensorIterator` (or `Loop`) whose body runs one recurrent
//! cell per time step by a single `LstmSequence`, `RnnSequence` or
//! `GruSequence` node.
//!
//! The body must contain the chain
//!
//! ```text
//! Parameter(X slice) -> Squeeze(axis) -> Cell -> Unsqueeze(axis) -> Result
//! ```
//!
//! where `Reshape` may stand in for `Squeeze`/`Unsqueeze`. The slice walks the
//! whole time axis forward (stride 1) or backward (stride -1), the hidden and
//! cell states are carried through back-edges from the cell outputs, and the
//! weights resolve to constants.
//!
//! # Example
//!
//! ```ignore
//! use graph_rewriter::transformers::ConvertTensorIteratorToSequence;
//! use graph_rewriter::traits::GraphPass;
//!
//! let result = ConvertTensorIteratorToSequence::new().run(&mut graph)?;
//! println!("converted {} loops", result.transforms_applied);
//! ```

use std::sync::Arc;

use log::{debug, trace};

use crate::error::RewriteResult;
use crate::graph::{
    AttrValue, Attributes, Body, Graph, InputDescription, Layout, Node, NodeBuilder, NodeId,
    OpType, OutputDescription, Value,
};
use crate::op_types;
use crate::pattern::{
    any_input, wrap_type, wrap_type_with, MatchResult, Matcher, Pattern, SQUEEZE_LIKE,
    UNSQUEEZE_LIKE,
};
use crate::tensor::{insert_axis, normalize_axis, Dim, PartialShape, TensorData};
use crate::traits::GraphPass;
use crate::transform::{
    eliminate_unused_constants, GraphRewrite, MatcherPass, PassResult, RewriteConfig,
};

use super::common::{
    get_attr_i, layout_of, make_sequence_lengths, make_squeeze, make_transpose, make_unsqueeze,
};

// ============================================================================
// Cell kinds
// ============================================================================

/// Recurrent cell flavour handled by the conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Lstm,
    Rnn,
    Gru,
}

impl CellKind {
    /// Body cell op
    pub fn cell_op(self) -> OpType {
        match self {
            CellKind::Lstm => OpType::LstmCell,
            CellKind::Rnn => OpType::RnnCell,
            CellKind::Gru => OpType::GruCell,
        }
    }

    /// Replacement sequence op
    pub fn sequence_op(self) -> OpType {
        match self {
            CellKind::Lstm => OpType::LstmSequence,
            CellKind::Rnn => OpType::RnnSequence,
            CellKind::Gru => OpType::GruSequence,
        }
    }

    /// Number of gates stacked in W/R/B
    pub fn gates(self) -> usize {
        match self {
            CellKind::Lstm => 4,
            CellKind::Rnn => 1,
            CellKind::Gru => 3,
        }
    }

    /// Whether the cell carries a cell state
    pub fn has_cell_state(self) -> bool {
        self == CellKind::Lstm
    }

    /// Cell input port of W; R and B follow
    fn weights_port(self) -> usize {
        if self.has_cell_state() {
            3
        } else {
            2
        }
    }

    fn pass_name(self) -> &'static str {
        match self {
            CellKind::Lstm => "convert_ti_to_lstm_sequence",
            CellKind::Rnn => "convert_ti_to_rnn_sequence",
            CellKind::Gru => "convert_ti_to_gru_sequence",
        }
    }
}

// ============================================================================
// Body analysis
// ============================================================================

/// Body chain matched by [`body_matcher`]
struct BodyChain {
    x_param: Value,
    squeeze: NodeId,
    cell: NodeId,
    unsqueeze: NodeId,
}

/// Pattern of the per-step chain inside a loop body
fn body_matcher(kind: CellKind) -> (Matcher, Pattern, Pattern, Pattern) {
    let x = wrap_type(&op_types![Parameter], vec![]);
    let squeeze = wrap_type(SQUEEZE_LIKE, vec![x.clone(), any_input()]);

    let mut cell_inputs = vec![squeeze.clone(), any_input()];
    if kind.has_cell_state() {
        cell_inputs.push(any_input());
    }
    cell_inputs.extend([any_input(), any_input(), any_input()]);
    let cell = wrap_type(&[kind.cell_op()], cell_inputs);

    let unsqueeze = wrap_type(UNSQUEEZE_LIKE, vec![cell.clone(), any_input()]);
    (
        Matcher::new(unsqueeze, format!("{}_body", kind.pass_name())),
        x,
        squeeze,
        cell,
    )
}

fn find_body_chain(body: &Body, kind: CellKind) -> Option<BodyChain> {
    let (matcher, x, squeeze, cell) = body_matcher(kind);
    let matches = matcher.find_all(&body.graph);
    let m: &MatchResult = match matches.as_slice() {
        [m] => m,
        _ => {
            trace!("{}: expected one cell chain, found {}", kind.pass_name(), matches.len());
            return None;
        }
    };

    // Unsqueeze must consume the hidden output
    let cell_value = m.get(&cell)?;
    if cell_value.port != 0 {
        return None;
    }

    Some(BodyChain {
        x_param: m.get(&x)?,
        squeeze: m.node_of(&squeeze)?,
        cell: cell_value.node,
        unsqueeze: m.root().node,
    })
}

/// Check that a Squeeze-like node drops exactly `axis` of a rank-3 slice
fn squeezes_axis(body: &Graph, id: NodeId, axis: usize) -> bool {
    let Some(node) = body.node(id) else {
        return false;
    };
    match node.op {
        OpType::Squeeze => match body.constant_ints(node.inputs[1]) {
            Some(axes) if axes.len() == 1 => normalize_axis(axes[0], 3).ok() == Some(axis),
            _ => false,
        },
        OpType::Reshape => {
            let (Some(input), Some(output)) = (body.layout(node.inputs[0]), node.outputs.first())
            else {
                return false;
            };
            input.shape.get(axis) == Some(Dim::Static(1))
                && output.shape == input.shape.without_axis(axis)
        }
        _ => false,
    }
}

/// Check that an Unsqueeze-like node inserts `axis` into a rank-2 value
fn unsqueezes_axis(body: &Graph, id: NodeId, axis: usize) -> bool {
    let Some(node) = body.node(id) else {
        return false;
    };
    match node.op {
        OpType::Unsqueeze => match body.constant_ints(node.inputs[1]) {
            Some(axes) if axes.len() == 1 => normalize_axis(axes[0], 3).ok() == Some(axis),
            _ => false,
        },
        OpType::Reshape => {
            let (Some(input), Some(output)) = (body.layout(node.inputs[0]), node.outputs.first())
            else {
                return false;
            };
            output.shape == input.shape.with_axis(axis, Dim::Static(1))
        }
        _ => false,
    }
}

/// Resolve a cell operand to a constant
///
/// Accepts body constants and invariant parameters fed by outer constants.
fn resolve_constant(graph: &Graph, loop_node: &Node, body: &Body, value: Value) -> Option<TensorData> {
    if let Some(data) = body.graph.constant_data(value) {
        return Some(data.clone());
    }
    let param = body.param_index(value)?;
    match body.input_for_param(param)? {
        InputDescription::Invariant { input, .. } => {
            let outer = *loop_node.inputs.get(*input)?;
            graph.constant_data(outer).cloned()
        }
        _ => None,
    }
}

/// Outer value feeding a merged parameter whose back-edge is `cell:port`
fn merged_init(loop_node: &Node, body: &Body, param_value: Value, back_edge: Value) -> Option<Value> {
    let param = body.param_index(param_value)?;
    match body.input_for_param(param)? {
        InputDescription::Merged { input, result, .. } => {
            if body.result_value(*result)? != back_edge {
                return None;
            }
            loop_node.inputs.get(*input).copied()
        }
        _ => None,
    }
}

/// Everything needed to build the replacement, collected before mutation
#[derive(Debug)]
struct SequencePlan {
    kind: CellKind,
    loop_node: NodeId,
    name: String,
    x: Value,
    time_axis: usize,
    reverse: bool,
    h_init: Value,
    c_init: Option<Value>,
    weights: [TensorData; 3],
    hidden_size: usize,
    attributes: Attributes,
    y_ports: Vec<usize>,
    ho_ports: Vec<usize>,
    co_ports: Vec<usize>,
}

fn analyze(graph: &Graph, id: NodeId, kind: CellKind) -> Option<SequencePlan> {
    let loop_node = graph.node(id)?;
    let body = loop_node.body.as_deref()?;
    let chain = find_body_chain(body, kind)?;
    let cell = body.graph.node(chain.cell)?;

    // Sliced input
    let x_param = body.param_index(chain.x_param)?;
    let slice = match body.input_for_param(x_param)? {
        InputDescription::Sliced(s) if s.is_full_unit_walk() => *s,
        _ => {
            trace!("{}: {} input is not a full unit slice", kind.pass_name(), loop_node.name);
            return None;
        }
    };
    let x = *loop_node.inputs.get(slice.input)?;
    let x_layout = graph.layout(x)?;
    if x_layout.shape.rank() != 3 {
        return None;
    }
    let time_axis = normalize_axis(slice.axis, 3).ok()?;
    if time_axis > 1 {
        return None;
    }
    if !squeezes_axis(&body.graph, chain.squeeze, time_axis)
        || !unsqueezes_axis(&body.graph, chain.unsqueeze, time_axis)
    {
        trace!("{}: squeeze axes differ from slice axis", kind.pass_name());
        return None;
    }

    // Back-edges
    let h_init = merged_init(loop_node, body, cell.inputs[1], cell.output(0))?;
    let c_init = if kind.has_cell_state() {
        Some(merged_init(loop_node, body, cell.inputs[2], cell.output(1))?)
    } else {
        None
    };

    // Weights
    let wp = kind.weights_port();
    let w = resolve_constant(graph, loop_node, body, cell.inputs[wp])?;
    let r = resolve_constant(graph, loop_node, body, cell.inputs[wp + 1])?;
    let b = resolve_constant(graph, loop_node, body, cell.inputs[wp + 2])?;
    if w.shape().len() != 2 || r.shape().len() != 2 || b.shape().len() != 1 {
        return None;
    }
    let hidden_size = r.shape()[1];
    let gated = kind.gates() * hidden_size;
    let bias_ok = b.shape()[0] == gated
        || (kind == CellKind::Gru && b.shape()[0] == (kind.gates() + 1) * hidden_size);
    if w.shape()[0] != gated || r.shape()[0] != gated || !bias_ok {
        return None;
    }
    if let Dim::Static(i) = x_layout.shape[2] {
        if i != w.shape()[1] {
            return None;
        }
    }
    if let Some(hs) = get_attr_i(cell, "hidden_size") {
        if hs != hidden_size as i64 {
            return None;
        }
    }

    // Outputs
    let y_value = Value::new(chain.unsqueeze, 0);
    let mut plan = SequencePlan {
        kind,
        loop_node: id,
        name: loop_node.name.clone(),
        x,
        time_axis,
        reverse: slice.stride < 0,
        h_init,
        c_init,
        weights: [w, r, b],
        hidden_size,
        attributes: cell.attributes.clone(),
        y_ports: Vec::new(),
        ho_ports: Vec::new(),
        co_ports: Vec::new(),
    };
    for desc in &body.outputs {
        let result = body.result_value(desc.result())?;
        match desc {
            OutputDescription::Concat(c) if result == y_value => {
                if c.part_size != 1
                    || c.stride != slice.stride
                    || normalize_axis(c.axis, 3).ok() != Some(time_axis)
                {
                    return None;
                }
                plan.y_ports.push(c.output);
            }
            OutputDescription::Last { output, .. } if result == cell.output(0) => {
                plan.ho_ports.push(*output)
            }
            OutputDescription::Last { output, .. }
                if kind.has_cell_state() && result == cell.output(1) =>
            {
                plan.co_ports.push(*output)
            }
            _ => {
                trace!("{}: unmapped body result {}", kind.pass_name(), result);
                return None;
            }
        }
    }

    Some(plan)
}

/// Extra conditions for `Loop` nodes
///
/// Trip count and execution condition are constants allowing a full walk,
/// the body keeps iterating unconditionally and ignores the counter.
fn loop_is_plain(graph: &Graph, id: NodeId, plan: &SequencePlan) -> bool {
    let Some(node) = graph.node(id) else {
        return false;
    };
    let (Some(body), Some(ports)) = (
        node.body.as_deref(),
        node.body.as_deref().and_then(|b| b.loop_ports),
    ) else {
        return false;
    };
    if node.inputs.len() < 2 {
        return false;
    }

    let time_len = graph.layout(plan.x).and_then(|l| l.shape[plan.time_axis].get_length());
    let trip_ok = match graph.constant_ints(node.inputs[0]).as_deref() {
        Some([-1]) => true,
        Some([n]) => time_len == Some(*n as usize),
        _ => false,
    };
    let exec_ok = graph.constant_ints(node.inputs[1]).as_deref() == Some(&[1][..]);
    let cond_ok = body
        .result_value(ports.condition_result)
        .and_then(|v| body.graph.constant_ints(v))
        .as_deref()
        == Some(&[1][..]);
    let counter_unused = ports
        .current_iteration
        .and_then(|p| body.param_value(p))
        .map_or(true, |v| body.graph.is_unused(v));

    trip_ok && exec_ok && cond_ok && counter_unused
}

// ============================================================================
// Rewrite
// ============================================================================

fn build_sequence(graph: &mut Graph, plan: SequencePlan) -> RewriteResult<bool> {
    let name = plan.name.clone();

    // Batch-major input
    let x = if plan.time_axis == 0 {
        make_transpose(graph, &format!("{}/x_batch_major", name), plan.x, &[1, 0, 2])?
    } else {
        plan.x
    };
    let x_layout = layout_of(graph, x)?;
    let (batch, time) = (x_layout.shape[0], x_layout.shape[1]);

    let h = make_unsqueeze(graph, &format!("{}/h_init", name), plan.h_init, 1)?;
    let c = match plan.c_init {
        Some(c) => Some(make_unsqueeze(graph, &format!("{}/c_init", name), c, 1)?),
        None => None,
    };
    let seq_len = make_sequence_lengths(graph, &format!("{}/seq_len", name), x)?;

    let [w, r, b] = &plan.weights;
    let w = graph.add_constant(&format!("{}/W", name), insert_axis(w, 0)?);
    let r = graph.add_constant(&format!("{}/R", name), insert_axis(r, 0)?);
    let b = graph.add_constant(&format!("{}/B", name), insert_axis(b, 0)?);

    let mut inputs = vec![x, h];
    inputs.extend(c);
    inputs.extend([seq_len, w, r, b]);

    let hs = Dim::Static(plan.hidden_size);
    let ty = x_layout.element_type;
    let state = Layout::new(PartialShape::new([batch, Dim::Static(1), hs]), ty);
    let mut outputs = vec![
        Layout::new(PartialShape::new([batch, Dim::Static(1), time, hs]), ty),
        state.clone(),
    ];
    if plan.kind.has_cell_state() {
        outputs.push(state);
    }

    let direction = if plan.reverse { "reverse" } else { "forward" };
    let seq = graph.add_node(
        NodeBuilder::new(plan.kind.sequence_op())
            .name(format!("{}/sequence", name))
            .inputs(inputs)
            .outputs(outputs)
            .attrs_from(&plan.attributes)
            .attr("hidden_size", AttrValue::Int(plan.hidden_size as i64))
            .attr("direction", AttrValue::Str(direction.to_string())),
    )?;

    // Back to the loop's output layouts
    if !plan.y_ports.is_empty() {
        let mut y = make_squeeze(graph, &format!("{}/y", name), Value::new(seq, 0), 1)?;
        if plan.time_axis == 0 {
            y = make_transpose(graph, &format!("{}/y_time_major", name), y, &[1, 0, 2])?;
        }
        for &port in &plan.y_ports {
            graph.redirect_consumers(Value::new(plan.loop_node, port), y);
        }
    }
    if !plan.ho_ports.is_empty() {
        let ho = make_squeeze(graph, &format!("{}/ho", name), Value::new(seq, 1), 1)?;
        for &port in &plan.ho_ports {
            graph.redirect_consumers(Value::new(plan.loop_node, port), ho);
        }
    }
    if !plan.co_ports.is_empty() {
        let co = make_squeeze(graph, &format!("{}/co", name), Value::new(seq, 2), 1)?;
        for &port in &plan.co_ports {
            graph.redirect_consumers(Value::new(plan.loop_node, port), co);
        }
    }

    let loop_inputs = graph
        .node(plan.loop_node)
        .map(|n| n.inputs.to_vec())
        .unwrap_or_default();
    graph.mark_eliminated(plan.loop_node);
    eliminate_unused_constants(graph, &loop_inputs);
    debug!(
        "{}: replaced {} with {} {}",
        plan.kind.pass_name(),
        name,
        direction,
        plan.kind.sequence_op()
    );
    Ok(true)
}

/// Root pattern: port 0 of a loop node, so each node is tried once
fn loop_root(op: OpType) -> Pattern {
    wrap_type_with(&[op], vec![], Arc::new(|_: &Graph, v: Value| v.port == 0))
}

fn tensor_iterator_pass(kind: CellKind) -> MatcherPass {
    MatcherPass::new(kind.pass_name(), loop_root(OpType::TensorIterator), move |graph, m| {
        match analyze(graph, m.root().node, kind) {
            Some(plan) => build_sequence(graph, plan),
            None => Ok(false),
        }
    })
}

// ============================================================================
// Passes
// ============================================================================

macro_rules! tensor_iterator_conversion {
    ($(#[$doc:meta])* $name:ident, $kind:expr) => {
        $(#[$doc])*
        #[derive(Debug)]
        pub struct $name {
            pass: MatcherPass,
        }

        impl $name {
            /// Create the pass
            pub fn new() -> Self {
                Self {
                    pass: tensor_iterator_pass($kind),
                }
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

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl GraphPass for $name {
            fn name(&self) -> &str {
                self.pass.name()
            }

            fn run(&self, graph: &mut Graph) -> RewriteResult<PassResult> {
                self.pass.run(graph)
            }

            fn is_applicable(&self, graph: &Graph) -> bool {
                !graph.find_nodes_by_op(OpType::TensorIterator).is_empty()
            }
        }
    };
}

tensor_iterator_conversion!(
    /// TensorIterator over an `LstmCell` to `LstmSequence`
    ConvertTensorIteratorToLstmSequence,
    CellKind::Lstm
);
tensor_iterator_conversion!(
    /// TensorIterator over an `RnnCell` to `RnnSequence`
    ConvertTensorIteratorToRnnSequence,
    CellKind::Rnn
);
tensor_iterator_conversion!(
    /// TensorIterator over a `GruCell` to `GruSequence`
    ConvertTensorIteratorToGruSequence,
    CellKind::Gru
);

/// `Loop` over an `LstmCell` to `LstmSequence`
#[derive(Debug)]
pub struct ConvertLoopToLstmSequence {
    pass: MatcherPass,
}

impl ConvertLoopToLstmSequence {
    /// Create the pass
    pub fn new() -> Self {
        let kind = CellKind::Lstm;
        let pass = MatcherPass::new(
            "convert_loop_to_lstm_sequence",
            loop_root(OpType::Loop),
            move |graph, m| {
                let id = m.root().node;
                match analyze(graph, id, kind) {
                    Some(plan) if loop_is_plain(graph, id, &plan) => build_sequence(graph, plan),
                    _ => Ok(false),
                }
            },
        );
        Self { pass }
    }

    /// Configure standalone runs
    pub fn with_config(self, config: RewriteConfig) -> Self {
        Self {
            pass: self.pass.with_config(config),
        }
    }
}

impl Default for ConvertLoopToLstmSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphPass for ConvertLoopToLstmSequence {
    fn name(&self) -> &str {
        self.pass.name()
    }

    fn run(&self, graph: &mut Graph) -> RewriteResult<PassResult> {
        self.pass.run(graph)
    }

    fn is_applicable(&self, graph: &Graph) -> bool {
        !graph.find_nodes_by_op(OpType::Loop).is_empty()
    }
}

/// All TensorIterator conversions, LSTM first
#[derive(Debug)]
pub struct ConvertTensorIteratorToSequence {
    rewrite: GraphRewrite,
}

impl ConvertTensorIteratorToSequence {
    /// Create the rewrite with LSTM, RNN and GRU conversions
    pub fn new() -> Self {
        Self {
            rewrite: GraphRewrite::new("convert_ti_to_sequence")
                .add_pass(ConvertTensorIteratorToLstmSequence::new().into_pass())
                .add_pass(ConvertTensorIteratorToRnnSequence::new().into_pass())
                .add_pass(ConvertTensorIteratorToGruSequence::new().into_pass()),
        }
    }

    /// Configure the rewrite
    pub fn with_config(self, config: RewriteConfig) -> Self {
        Self {
            rewrite: self.rewrite.with_config(config),
        }
    }
}

impl Default for ConvertTensorIteratorToSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphPass for ConvertTensorIteratorToSequence {
    fn name(&self) -> &str {
        self.rewrite.name()
    }

    fn run(&self, graph: &mut Graph) -> RewriteResult<PassResult> {
        self.rewrite.run(graph)
    }

    fn is_applicable(&self, graph: &Graph) -> bool {
        !graph.find_nodes_by_op(OpType::TensorIterator).is_empty()
    }
}
