//! Shared fixtures for integration tests
//!
//! A small ndarray interpreter for the ops the passes produce or consume,
//! plus builders for recurrent test graphs.

#![allow(dead_code)]

use graph_rewriter::graph::{
    AttrValue, Body, ConcatOutput, Graph, InputDescription, Layout, LoopPorts, Node,
    NodeBuilder, NodeId, OpType, OutputDescription, SliceInput, Value,
};
use graph_rewriter::tensor::{ints_to_tensor, scalar_i64, vec_to_tensor_f32, TensorData};
use graph_rewriter::transformers::{get_attr_i, get_attr_s};
use ndarray::{
    concatenate, Array1, Array2, ArrayD, ArrayView, ArrayView1, ArrayView2, Axis, Dimension, Ix1, Ix2,
    IxDyn,
};
use rustc_hash::FxHashMap;

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Data helpers
// ============================================================================

/// Deterministic values in [-scale, scale)
pub fn values(len: usize, seed: usize, scale: f32) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let v = ((i * 37 + seed * 101 + 13) % 97) as f32 / 97.0;
            (v - 0.5) * 2.0 * scale
        })
        .collect()
}

pub fn tensor(shape: &[usize], seed: usize) -> TensorData {
    let len = shape.iter().product();
    vec_to_tensor_f32(&values(len, seed, 0.5), shape).unwrap()
}

/// Every live constant still feeds something
pub fn assert_no_unused_constants(graph: &Graph) {
    for node in graph.nodes().filter(|n| n.op == OpType::Constant) {
        assert!(!graph.is_node_unused(node.id), "unused constant {}", node.name);
    }
}

pub fn assert_close(a: &TensorData, b: &TensorData) {
    let (a, b) = (a.as_f32().unwrap(), b.as_f32().unwrap());
    assert_eq!(a.shape(), b.shape());
    for (x, y) in a.iter().zip(b.iter()) {
        assert!((x - y).abs() < 1e-5, "{} vs {}", x, y);
    }
}

macro_rules! each {
    ($t:expr, $a:ident => $body:expr) => {
        match $t {
            TensorData::F32($a) => TensorData::F32($body),
            TensorData::I64($a) => TensorData::I64($body),
        }
    };
}

fn reshape<T: Clone>(a: &ArrayD<T>, shape: &[usize]) -> ArrayD<T> {
    ArrayD::from_shape_vec(IxDyn(shape), a.iter().cloned().collect()).unwrap()
}

fn transpose<T: Clone>(a: &ArrayD<T>, order: &[usize]) -> ArrayD<T> {
    a.view()
        .permuted_axes(IxDyn(order))
        .as_standard_layout()
        .to_owned()
}

fn slice_axis<T: Clone>(a: &ArrayD<T>, axis: usize, start: usize, len: usize) -> ArrayD<T> {
    a.slice_axis(Axis(axis), ndarray::Slice::from(start..start + len))
        .to_owned()
}

fn reverse_sequence<T: Clone>(a: &ArrayD<T>, lens: &[i64], batch: usize, seq: usize) -> ArrayD<T> {
    let mut out = a.clone();
    let inner_seq = if seq > batch { seq - 1 } else { seq };
    for (b, &len) in lens.iter().enumerate() {
        let len = len as usize;
        let src = a.index_axis(Axis(batch), b);
        let mut dst = out.index_axis_mut(Axis(batch), b);
        for t in 0..len {
            dst.index_axis_mut(Axis(inner_seq), t)
                .assign(&src.index_axis(Axis(inner_seq), len - 1 - t));
        }
    }
    out
}

fn ints(t: &TensorData) -> Vec<i64> {
    t.to_i64_vec().unwrap()
}

fn f32s(t: &TensorData) -> &ArrayD<f32> {
    t.as_f32().unwrap()
}

fn axis_attr(node: &Node, rank: usize) -> usize {
    let axis = get_attr_i(node, "axis").unwrap_or(0);
    if axis < 0 {
        (axis + rank as i64) as usize
    } else {
        axis as usize
    }
}

// ============================================================================
// Recurrent steps
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Cell {
    Lstm,
    Rnn,
    Gru { linear_before_reset: bool },
}

impl Cell {
    fn of(node: &Node) -> Cell {
        match node.op {
            OpType::LstmCell | OpType::LstmSequence => Cell::Lstm,
            OpType::RnnCell | OpType::RnnSequence => Cell::Rnn,
            _ => Cell::Gru {
                linear_before_reset: get_attr_i(node, "linear_before_reset").unwrap_or(0) != 0,
            },
        }
    }
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

/// One time step for one batch row
fn step(
    cell: Cell,
    x: ArrayView1<f32>,
    h: &Array1<f32>,
    c: &Array1<f32>,
    w: ArrayView2<f32>,
    r: ArrayView2<f32>,
    b: ArrayView1<f32>,
) -> (Array1<f32>, Array1<f32>) {
    let hs = h.len();
    match cell {
        Cell::Lstm => {
            let g = w.dot(&x) + r.dot(h) + b;
            let f = g.slice(ndarray::s![0..hs]).mapv(sigmoid);
            let i = g.slice(ndarray::s![hs..2 * hs]).mapv(sigmoid);
            let cc = g.slice(ndarray::s![2 * hs..3 * hs]).mapv(f32::tanh);
            let o = g.slice(ndarray::s![3 * hs..4 * hs]).mapv(sigmoid);
            let c_next = &f * c + &i * &cc;
            let h_next = &o * &c_next.mapv(f32::tanh);
            (h_next, c_next)
        }
        Cell::Rnn => ((w.dot(&x) + r.dot(h) + b).mapv(f32::tanh), c.clone()),
        Cell::Gru {
            linear_before_reset,
        } => {
            let wx = w.dot(&x);
            let rh = r.slice(ndarray::s![0..2 * hs, ..]).dot(h);
            let zr = &wx.slice(ndarray::s![0..2 * hs]) + &rh + &b.slice(ndarray::s![0..2 * hs]);
            let z = zr.slice(ndarray::s![0..hs]).mapv(sigmoid);
            let rg = zr.slice(ndarray::s![hs..2 * hs]).mapv(sigmoid);
            let rh_w = r.slice(ndarray::s![2 * hs..3 * hs, ..]);
            let wx_h = wx.slice(ndarray::s![2 * hs..3 * hs]);
            let candidate = if linear_before_reset {
                let rb = b.slice(ndarray::s![3 * hs..4 * hs]);
                let wb = b.slice(ndarray::s![2 * hs..3 * hs]);
                &wx_h + &(&rg * &(rh_w.dot(h) + rb)) + wb
            } else {
                &wx_h + &rh_w.dot(&(&rg * h)) + b.slice(ndarray::s![2 * hs..3 * hs])
            }
            .mapv(f32::tanh);
            let h_next = (1.0 - &z) * &candidate + &z * h;
            (h_next, c.clone())
        }
    }
}

fn row<D: Dimension>(a: ArrayView<f32, D>) -> ArrayView1<f32> {
    a.into_dimensionality::<Ix1>().unwrap()
}

fn as2(a: &ArrayD<f32>) -> ArrayView2<f32> {
    a.view().into_dimensionality::<Ix2>().unwrap()
}

fn eval_cell(node: &Node, ins: &[TensorData]) -> Vec<TensorData> {
    let cell = Cell::of(node);
    let wp = if cell == Cell::Lstm { 3 } else { 2 };
    let x = as2(f32s(&ins[0])).to_owned();
    let h = as2(f32s(&ins[1])).to_owned();
    let c = if cell == Cell::Lstm {
        as2(f32s(&ins[2])).to_owned()
    } else {
        Array2::zeros(h.raw_dim())
    };
    let (w, r, b) = (f32s(&ins[wp]), f32s(&ins[wp + 1]), f32s(&ins[wp + 2]));
    let b = b.view().into_dimensionality::<Ix1>().unwrap();

    let mut h_out = h.clone();
    let mut c_out = c.clone();
    for i in 0..x.nrows() {
        let (hn, cn) = step(
            cell,
            x.row(i),
            &h.row(i).to_owned(),
            &c.row(i).to_owned(),
            as2(w),
            as2(r),
            b,
        );
        h_out.row_mut(i).assign(&hn);
        c_out.row_mut(i).assign(&cn);
    }

    let mut outs = vec![TensorData::F32(h_out.into_dyn())];
    if cell == Cell::Lstm {
        outs.push(TensorData::F32(c_out.into_dyn()));
    }
    outs
}

fn eval_sequence(node: &Node, ins: &[TensorData]) -> Vec<TensorData> {
    let cell = Cell::of(node);
    let lstm = cell == Cell::Lstm;
    let x = f32s(&ins[0]);
    let h0 = f32s(&ins[1]);
    let c0 = if lstm { Some(f32s(&ins[2])) } else { None };
    let base = if lstm { 3 } else { 2 };
    let lens = ints(&ins[base]);
    let (w, r, b) = (f32s(&ins[base + 1]), f32s(&ins[base + 2]), f32s(&ins[base + 3]));

    let (batch, time) = (x.shape()[0], x.shape()[1]);
    let dirs = w.shape()[0];
    let hs = h0.shape()[2];
    let direction = get_attr_s(node, "direction").unwrap_or("forward");

    let mut y = ArrayD::<f32>::zeros(IxDyn(&[batch, dirs, time, hs]));
    let mut ho = ArrayD::<f32>::zeros(IxDyn(&[batch, dirs, hs]));
    let mut co = ArrayD::<f32>::zeros(IxDyn(&[batch, dirs, hs]));

    for d in 0..dirs {
        let reverse = direction == "reverse" || (direction == "bidirectional" && d == 1);
        let wd = w.index_axis(Axis(0), d).into_dimensionality::<Ix2>().unwrap();
        let rd = r.index_axis(Axis(0), d).into_dimensionality::<Ix2>().unwrap();
        let bd = b.index_axis(Axis(0), d).into_dimensionality::<Ix1>().unwrap();
        for bi in 0..batch {
            let len = lens[bi] as usize;
            let mut h = row(h0.slice(ndarray::s![bi, d, ..])).to_owned();
            let mut c = match c0 {
                Some(c0) => row(c0.slice(ndarray::s![bi, d, ..])).to_owned(),
                None => Array1::zeros(hs),
            };
            let steps: Vec<usize> = if reverse {
                (0..len).rev().collect()
            } else {
                (0..len).collect()
            };
            for t in steps {
                let xt = row(x.slice(ndarray::s![bi, t, ..]));
                let (hn, cn) = step(cell, xt, &h, &c, wd, rd, bd);
                h = hn;
                c = cn;
                y.slice_mut(ndarray::s![bi, d, t, ..]).assign(&h);
            }
            ho.slice_mut(ndarray::s![bi, d, ..]).assign(&h);
            co.slice_mut(ndarray::s![bi, d, ..]).assign(&c);
        }
    }

    let mut outs = vec![TensorData::F32(y), TensorData::F32(ho)];
    if lstm {
        outs.push(TensorData::F32(co));
    }
    outs
}

// ============================================================================
// Loops
// ============================================================================

fn normalize_bound(v: i64, dim: usize) -> usize {
    if v < 0 {
        (v + dim as i64 + 1) as usize
    } else {
        v as usize
    }
}

fn eval_loop(node: &Node, ins: &[TensorData]) -> Vec<TensorData> {
    let body = node.body.as_deref().unwrap();
    let is_loop = node.op == OpType::Loop;

    // Iteration count from the slices
    let mut iterations = None;
    for desc in &body.inputs {
        if let InputDescription::Sliced(s) = desc {
            let dim = ins[s.input].shape()[s.axis.rem_euclid(ins[s.input].shape().len() as i64) as usize];
            let (start, end) = (normalize_bound(s.start, dim), normalize_bound(s.end, dim));
            iterations = Some(start.abs_diff(end) / s.part_size as usize);
        }
    }
    if is_loop {
        let trip = ints(&ins[0])[0];
        if trip >= 0 {
            iterations = Some(iterations.map_or(trip as usize, |n: usize| n.min(trip as usize)));
        }
        if ints(&ins[1])[0] == 0 {
            iterations = Some(0);
        }
    }
    let iterations = iterations.unwrap();

    let mut merged: FxHashMap<usize, TensorData> = FxHashMap::default();
    let mut per_iteration: Vec<Vec<TensorData>> = Vec::new();
    for i in 0..iterations {
        let mut params: FxHashMap<NodeId, TensorData> = FxHashMap::default();
        for desc in &body.inputs {
            let param = body.parameters[desc.param()];
            let value = match desc {
                InputDescription::Sliced(s) => {
                    let data = &ins[s.input];
                    let rank = data.shape().len();
                    let axis = s.axis.rem_euclid(rank as i64) as usize;
                    let dim = data.shape()[axis];
                    let start = normalize_bound(s.start, dim);
                    let part = s.part_size as usize;
                    let offset = if s.stride > 0 {
                        start + i * part
                    } else {
                        start - (i + 1) * part
                    };
                    each!(data, a => slice_axis(a, axis, offset, part))
                }
                InputDescription::Merged { input, param, .. } => merged
                    .get(param)
                    .cloned()
                    .unwrap_or_else(|| ins[*input].clone()),
                InputDescription::Invariant { input, .. } => ins[*input].clone(),
            };
            params.insert(param, value);
        }
        if let Some(counter) = body.loop_ports.and_then(|p| p.current_iteration) {
            params.insert(body.parameters[counter], scalar_i64(i as i64));
        }

        let results = evaluate_with(&body.graph, |n| params.get(&n.id).cloned());
        for desc in &body.inputs {
            if let InputDescription::Merged { param, result, .. } = desc {
                merged.insert(*param, results[*result].clone());
            }
        }
        let stop = body
            .loop_ports
            .map(|p| ints(&results[p.condition_result])[0] == 0)
            .unwrap_or(false);
        per_iteration.push(results);
        if stop {
            break;
        }
    }

    let mut outs: Vec<Option<TensorData>> = vec![None; node.outputs.len()];
    for desc in &body.outputs {
        let value = match desc {
            OutputDescription::Last { result, .. } => per_iteration.last().unwrap()[*result].clone(),
            OutputDescription::Concat(c) => {
                let mut parts: Vec<&ArrayD<f32>> = per_iteration
                    .iter()
                    .map(|r| f32s(&r[c.result]))
                    .collect();
                if c.stride < 0 {
                    parts.reverse();
                }
                let rank = parts[0].ndim();
                let axis = c.axis.rem_euclid(rank as i64) as usize;
                let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
                TensorData::F32(concatenate(Axis(axis), &views).unwrap())
            }
        };
        outs[desc.output()] = Some(value);
    }
    outs.into_iter().map(|o| o.unwrap()).collect()
}

// ============================================================================
// Interpreter
// ============================================================================

fn eval_node(node: &Node, ins: &[TensorData]) -> Vec<TensorData> {
    let one = |t: TensorData| vec![t];
    match node.op {
        OpType::Identity | OpType::Convert => one(ins[0].clone()),
        OpType::Relu => one(TensorData::F32(f32s(&ins[0]).mapv(|v| v.max(0.0)))),
        OpType::Add => one(TensorData::F32(f32s(&ins[0]) + f32s(&ins[1]))),
        OpType::Squeeze | OpType::Unsqueeze | OpType::Reshape => {
            let shape = infer_shape(node, &ins[0], &ints(&ins[1]));
            one(each!(&ins[0], a => reshape(a, &shape)))
        }
        OpType::Transpose => {
            let order: Vec<usize> = ints(&ins[1]).iter().map(|&o| o as usize).collect();
            one(each!(&ins[0], a => transpose(a, &order)))
        }
        OpType::Concat => {
            let rank = ins[0].shape().len();
            let axis = axis_attr(node, rank);
            one(match &ins[0] {
                TensorData::F32(_) => {
                    let views: Vec<_> = ins.iter().map(|t| f32s(t).view()).collect();
                    TensorData::F32(concatenate(Axis(axis), &views).unwrap())
                }
                TensorData::I64(_) => {
                    let views: Vec<_> = ins.iter().map(|t| t.as_i64().unwrap().view()).collect();
                    TensorData::I64(concatenate(Axis(axis), &views).unwrap())
                }
            })
        }
        OpType::Split => {
            let axis = axis_attr(node, ins[0].shape().len());
            let parts = get_attr_i(node, "num_splits").unwrap() as usize;
            let len = ins[0].shape()[axis] / parts;
            (0..parts)
                .map(|p| each!(&ins[0], a => slice_axis(a, axis, p * len, len)))
                .collect()
        }
        OpType::Gather => {
            let axis = axis_attr(node, ins[0].shape().len());
            let idx: Vec<usize> = ints(&ins[1]).iter().map(|&i| i as usize).collect();
            one(each!(&ins[0], a => a.select(Axis(axis), &idx)))
        }
        OpType::ShapeOf => {
            let dims: Vec<i64> = ins[0].shape().iter().map(|&d| d as i64).collect();
            one(ints_to_tensor(&dims))
        }
        OpType::Broadcast => {
            let shape: Vec<usize> = ints(&ins[1]).iter().map(|&d| d as usize).collect();
            one(each!(&ins[0], a => a.broadcast(IxDyn(&shape)).unwrap().to_owned()))
        }
        OpType::ReverseSequence => {
            let rank = ins[0].shape().len();
            let norm = |v: i64| v.rem_euclid(rank as i64) as usize;
            let batch = norm(get_attr_i(node, "batch_axis").unwrap_or(0));
            let seq = norm(get_attr_i(node, "seq_axis").unwrap_or(1));
            let lens = ints(&ins[1]);
            one(each!(&ins[0], a => reverse_sequence(a, &lens, batch, seq)))
        }
        OpType::LstmCell | OpType::RnnCell | OpType::GruCell => eval_cell(node, ins),
        OpType::LstmSequence | OpType::RnnSequence | OpType::GruSequence => {
            eval_sequence(node, ins)
        }
        OpType::TensorIterator | OpType::Loop => eval_loop(node, ins),
        op => panic!("interpreter does not support {}", op),
    }
}

/// Runtime output shape of Squeeze, Unsqueeze and Reshape
fn infer_shape(node: &Node, input: &TensorData, operand: &[i64]) -> Vec<usize> {
    let mut shape = input.shape().to_vec();
    match node.op {
        OpType::Squeeze => {
            let mut axes: Vec<usize> = operand
                .iter()
                .map(|&a| a.rem_euclid(shape.len() as i64) as usize)
                .collect();
            axes.sort_unstable();
            for a in axes.into_iter().rev() {
                shape.remove(a);
            }
            shape
        }
        OpType::Unsqueeze => {
            let rank = shape.len() + operand.len();
            let mut axes: Vec<usize> = operand
                .iter()
                .map(|&a| a.rem_euclid(rank as i64) as usize)
                .collect();
            axes.sort_unstable();
            for a in axes {
                shape.insert(a, 1);
            }
            shape
        }
        _ => {
            let total: usize = shape.iter().product();
            let mut out: Vec<usize> = operand
                .iter()
                .enumerate()
                .map(|(i, &t)| if t == 0 { shape[i] } else { t.max(1) as usize })
                .collect();
            if let Some(pos) = operand.iter().position(|&t| t == -1) {
                let known: usize = out
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != pos)
                    .map(|(_, d)| d)
                    .product();
                out[pos] = total / known;
            }
            out
        }
    }
}

/// Evaluate a graph, binding parameters through `bind`
pub fn evaluate_with<F>(graph: &Graph, bind: F) -> Vec<TensorData>
where
    F: Fn(&Node) -> Option<TensorData>,
{
    let mut env: FxHashMap<Value, TensorData> = FxHashMap::default();
    for &id in graph.processing_order() {
        let Some(node) = graph.node(id) else {
            continue;
        };
        if graph.is_eliminated(id) {
            continue;
        }
        let outs = match node.op {
            OpType::Parameter => {
                vec![bind(node).unwrap_or_else(|| panic!("no value for {}", node.name))]
            }
            OpType::Constant | OpType::Data => vec![node.constant_value().unwrap().clone()],
            _ => {
                let ins: Vec<TensorData> = node.inputs.iter().map(|v| env[v].clone()).collect();
                eval_node(node, &ins)
            }
        };
        for (port, out) in outs.into_iter().enumerate() {
            env.insert(Value::new(id, port), out);
        }
    }
    graph.outputs().iter().map(|v| env[v].clone()).collect()
}

/// Evaluate a graph with named parameter values
pub fn evaluate(graph: &Graph, inputs: &[(&str, TensorData)]) -> Vec<TensorData> {
    evaluate_with(graph, |n| {
        inputs
            .iter()
            .find(|(name, _)| *name == n.name)
            .map(|(_, t)| t.clone())
    })
}

// ============================================================================
// Graph builders
// ============================================================================

/// Recurrent cell under test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestCell {
    Lstm,
    Rnn,
    Gru,
}

impl TestCell {
    pub fn cell_op(self) -> OpType {
        match self {
            TestCell::Lstm => OpType::LstmCell,
            TestCell::Rnn => OpType::RnnCell,
            TestCell::Gru => OpType::GruCell,
        }
    }

    pub fn sequence_op(self) -> OpType {
        match self {
            TestCell::Lstm => OpType::LstmSequence,
            TestCell::Rnn => OpType::RnnSequence,
            TestCell::Gru => OpType::GruSequence,
        }
    }

    pub fn gates(self) -> usize {
        match self {
            TestCell::Lstm => 4,
            TestCell::Rnn => 1,
            TestCell::Gru => 3,
        }
    }
}

/// Shape configuration of a recurrent loop fixture
#[derive(Debug, Clone, Copy)]
pub struct LoopSpec {
    pub cell: TestCell,
    pub batch: usize,
    pub time: usize,
    pub input: usize,
    pub hidden: usize,
    pub time_axis: usize,
    pub stride: i64,
    pub dynamic_batch: bool,
    /// Feed W/R/B through invariant inputs from outer constants
    pub outer_weights: bool,
    /// Build a `Loop` instead of a `TensorIterator`
    pub as_loop: bool,
}

impl LoopSpec {
    pub fn new(cell: TestCell) -> Self {
        Self {
            cell,
            batch: 2,
            time: 5,
            input: 3,
            hidden: 4,
            time_axis: 1,
            stride: 1,
            dynamic_batch: false,
            outer_weights: false,
            as_loop: false,
        }
    }

    pub fn x_dims(&self) -> [usize; 3] {
        if self.time_axis == 0 {
            [self.time, self.batch, self.input]
        } else {
            [self.batch, self.time, self.input]
        }
    }

    /// Named input values for [`evaluate`]
    pub fn inputs(&self) -> Vec<(&'static str, TensorData)> {
        let mut inputs = vec![
            ("x", tensor(&self.x_dims(), 1)),
            ("h0", tensor(&[self.batch, self.hidden], 2)),
        ];
        if self.cell == TestCell::Lstm {
            inputs.push(("c0", tensor(&[self.batch, self.hidden], 3)));
        }
        inputs
    }
}

fn dims_i64(dims: &[usize], dynamic: Option<usize>) -> Vec<i64> {
    dims.iter()
        .enumerate()
        .map(|(i, &d)| if Some(i) == dynamic { -1 } else { d as i64 })
        .collect()
}

/// Outer graph: loop node over one cell, each output feeding a Relu
pub fn build_loop_graph(spec: LoopSpec) -> Graph {
    let lstm = spec.cell == TestCell::Lstm;
    let (hs, gated) = (spec.hidden, spec.cell.gates() * spec.hidden);
    let batch_axis = 1 - spec.time_axis;
    let dyn_batch = spec.dynamic_batch.then_some(batch_axis);

    // Body
    let mut body = Graph::new();
    let mut slice = spec.x_dims();
    slice[spec.time_axis] = 1;
    let state_dims = dims_i64(&[spec.batch, hs], spec.dynamic_batch.then_some(0));
    let x = body.add_parameter("x_t", Layout::f32(&dims_i64(&slice, dyn_batch)));
    let h = body.add_parameter("h_t", Layout::f32(&state_dims));
    let mut params = vec![x.node, h.node];
    let c = if lstm {
        let c = body.add_parameter("c_t", Layout::f32(&state_dims));
        params.push(c.node);
        Some(c)
    } else {
        None
    };

    let weight_data = [
        tensor(&[gated, spec.input], 4),
        tensor(&[gated, hs], 5),
        tensor(&[gated], 6),
    ];
    let weights: Vec<Value> = if spec.outer_weights {
        ["w_t", "r_t", "b_t"]
            .iter()
            .zip(weight_data.iter())
            .map(|(name, data)| {
                let dims: Vec<i64> = data.shape().iter().map(|&d| d as i64).collect();
                let p = body.add_parameter(name, Layout::f32(&dims));
                params.push(p.node);
                p
            })
            .collect()
    } else {
        ["w", "r", "b"]
            .iter()
            .zip(weight_data.iter())
            .map(|(name, data)| body.add_constant(name, data.clone()))
            .collect()
    };

    let axes = body.add_constant("axes", ints_to_tensor(&[spec.time_axis as i64]));
    let mut squeezed = slice.to_vec();
    squeezed.remove(spec.time_axis);
    let squeeze = body
        .add_node(
            NodeBuilder::new(OpType::Squeeze)
                .inputs([x, axes])
                .output(Layout::f32(&dims_i64(&squeezed, spec.dynamic_batch.then_some(0)))),
        )
        .unwrap();

    let mut cell_inputs = vec![Value::new(squeeze, 0), h];
    cell_inputs.extend(c);
    cell_inputs.extend(weights.iter().copied());
    let mut cell_outputs = vec![Layout::f32(&state_dims)];
    if lstm {
        cell_outputs.push(Layout::f32(&state_dims));
    }
    let cell = body
        .add_node(
            NodeBuilder::new(spec.cell.cell_op())
                .inputs(cell_inputs)
                .outputs(cell_outputs)
                .attr("hidden_size", AttrValue::Int(hs as i64)),
        )
        .unwrap();

    let mut y_step = vec![spec.batch, hs];
    y_step.insert(spec.time_axis, 1);
    let unsqueeze = body
        .add_node(
            NodeBuilder::new(OpType::Unsqueeze)
                .inputs([Value::new(cell, 0), axes])
                .output(Layout::f32(&dims_i64(&y_step, dyn_batch))),
        )
        .unwrap();

    let mut results = vec![Value::new(unsqueeze, 0), Value::new(cell, 0)];
    if lstm {
        results.push(Value::new(cell, 1));
    }
    let condition = if spec.as_loop {
        let keep = body.add_constant("keep_going", scalar_i64(1));
        results.push(keep);
        Some(results.len() - 1)
    } else {
        None
    };
    body.set_outputs(results);

    // Port maps
    let offset = if spec.as_loop { 2 } else { 0 };
    let mut body = Body::new(body, params)
        .with_input(InputDescription::Sliced(SliceInput::full(
            offset,
            0,
            spec.time_axis as i64,
            spec.stride,
        )))
        .with_input(InputDescription::Merged {
            input: offset + 1,
            param: 1,
            result: 1,
        })
        .with_output(OutputDescription::Concat(ConcatOutput::full(
            0,
            0,
            spec.time_axis as i64,
            spec.stride,
        )))
        .with_output(OutputDescription::Last {
            result: 1,
            output: 1,
        });
    if lstm {
        body = body
            .with_input(InputDescription::Merged {
                input: offset + 2,
                param: 2,
                result: 2,
            })
            .with_output(OutputDescription::Last {
                result: 2,
                output: 2,
            });
    }
    if spec.outer_weights {
        let first_input = offset + if lstm { 3 } else { 2 };
        let first_param = if lstm { 3 } else { 2 };
        for k in 0..3 {
            body = body.with_input(InputDescription::Invariant {
                input: first_input + k,
                param: first_param + k,
            });
        }
    }
    if let Some(condition_result) = condition {
        body = body.with_loop_ports(LoopPorts {
            current_iteration: None,
            condition_result,
        });
    }

    // Outer graph
    let mut graph = Graph::new();
    let outer_state = dims_i64(&[spec.batch, hs], spec.dynamic_batch.then_some(0));
    let mut inputs = Vec::new();
    if spec.as_loop {
        inputs.push(graph.add_constant("trip_count", scalar_i64(-1)));
        inputs.push(graph.add_constant("execution_condition", scalar_i64(1)));
    }
    inputs.push(graph.add_parameter("x", Layout::f32(&dims_i64(&spec.x_dims(), dyn_batch))));
    inputs.push(graph.add_parameter("h0", Layout::f32(&outer_state)));
    if lstm {
        inputs.push(graph.add_parameter("c0", Layout::f32(&outer_state)));
    }
    if spec.outer_weights {
        for (name, data) in ["W", "R", "B"].iter().zip(weight_data.iter()) {
            inputs.push(graph.add_constant(name, data.clone()));
        }
    }

    let mut y_dims = spec.x_dims();
    y_dims[2] = hs;
    let mut outputs = vec![
        Layout::f32(&dims_i64(&y_dims, dyn_batch)),
        Layout::f32(&outer_state),
    ];
    if lstm {
        outputs.push(Layout::f32(&outer_state));
    }
    let op = if spec.as_loop {
        OpType::Loop
    } else {
        OpType::TensorIterator
    };
    let loop_node = graph
        .add_node(
            NodeBuilder::new(op)
                .name("recurrent_loop")
                .inputs(inputs)
                .outputs(outputs.clone())
                .body(body),
        )
        .unwrap();

    for (port, layout) in outputs.into_iter().enumerate() {
        let relu = graph
            .add_node(
                NodeBuilder::new(OpType::Relu)
                    .input(Value::new(loop_node, port))
                    .output(layout),
            )
            .unwrap();
        graph.add_output(Value::new(relu, 0));
    }
    graph
}

/// Weights of one LSTM direction, `[1, 4H, I]`, `[1, 4H, H]`, `[1, 4H]`
pub fn lstm_weights(graph: &mut Graph, prefix: &str, input: usize, hidden: usize, seed: usize) -> [Value; 3] {
    let gated = 4 * hidden;
    [
        graph.add_constant(&format!("{}_w", prefix), tensor(&[1, gated, input], seed)),
        graph.add_constant(&format!("{}_r", prefix), tensor(&[1, gated, hidden], seed + 1)),
        graph.add_constant(&format!("{}_b", prefix), tensor(&[1, gated], seed + 2)),
    ]
}

/// Add an LstmSequence node over `x` `[B, T, I]`
#[allow(clippy::too_many_arguments)]
pub fn add_lstm_sequence(
    graph: &mut Graph,
    name: &str,
    x: Value,
    h: Value,
    c: Value,
    lengths: Value,
    weights: [Value; 3],
    direction: &str,
    dims: (usize, usize, usize),
) -> NodeId {
    let (batch, time, hidden) = dims;
    let (b, t, hs) = (batch as i64, time as i64, hidden as i64);
    graph
        .add_node(
            NodeBuilder::new(OpType::LstmSequence)
                .name(name)
                .inputs([x, h, c, lengths, weights[0], weights[1], weights[2]])
                .attr("hidden_size", AttrValue::Int(hs))
                .attr("direction", AttrValue::Str(direction.to_string()))
                .outputs([
                    Layout::f32(&[b, 1, t, hs]),
                    Layout::f32(&[b, 1, hs]),
                    Layout::f32(&[b, 1, hs]),
                ]),
        )
        .unwrap()
}
