//! Common utilities for transformers
//!
//! Attribute accessors and layout-aware node builders shared by the
//! fusion and marking passes.
//!
//! Operand conventions of the IR nodes built here:
//!
//! | Op | Inputs | Attributes |
//! |----|--------|------------|
//! | Squeeze / Unsqueeze | data, axes (i64 constant) | |
//! | Reshape | data, target shape (i64 constant, `0` copies, `-1` infers) | |
//! | Transpose | data, order (i64 constant) | |
//! | Concat | parts... | `axis` |
//! | Split | data | `axis`, `num_splits` |
//! | Gather | data, indices | `axis` |
//! | ShapeOf | data | |
//! | Broadcast | data, target shape | |

use crate::error::{RewriteError, RewriteResult};
use crate::graph::{AttrValue, Graph, Layout, Node, NodeBuilder, OpType, Value};
use crate::tensor::{ints_to_tensor, Dim, ElementType, PartialShape};

// ============================================================================
// Attribute accessors
// ============================================================================

/// Get attribute value as i64
pub fn get_attr_i(node: &Node, name: &str) -> Option<i64> {
    match node.get_attribute(name)? {
        AttrValue::Int(v) => Some(*v),
        _ => None,
    }
}

/// Get attribute value as string
pub fn get_attr_s<'a>(node: &'a Node, name: &str) -> Option<&'a str> {
    match node.get_attribute(name)? {
        AttrValue::Str(v) => Some(v.as_str()),
        _ => None,
    }
}

/// Get attribute value as i64 list
pub fn get_attr_ints<'a>(node: &'a Node, name: &str) -> Option<&'a [i64]> {
    match node.get_attribute(name)? {
        AttrValue::Ints(v) => Some(v.as_slice()),
        _ => None,
    }
}

// ============================================================================
// Layout helpers
// ============================================================================

/// Layout of a value, or `InvalidNode`
pub fn layout_of(graph: &Graph, value: Value) -> RewriteResult<Layout> {
    graph
        .layout(value)
        .cloned()
        .ok_or(RewriteError::InvalidNode(value.node))
}

/// Sum of two dims along a concatenation axis
fn add_dims(a: Dim, b: Dim) -> Dim {
    match (a, b) {
        (Dim::Static(x), Dim::Static(y)) => Dim::Static(x + y),
        _ => Dim::Dynamic,
    }
}

/// Output shape of a Reshape with `0`/`-1` target semantics
pub fn reshape_shape(input: &PartialShape, target: &[i64]) -> RewriteResult<PartialShape> {
    let mut dims: Vec<Dim> = Vec::with_capacity(target.len());
    let mut infer_at = None;
    for (i, &t) in target.iter().enumerate() {
        match t {
            0 => dims.push(input.get(i).ok_or(RewriteError::InvalidAxis {
                axis: i as i64,
                rank: input.rank(),
            })?),
            -1 if infer_at.is_none() => {
                infer_at = Some(i);
                dims.push(Dim::Dynamic);
            }
            t if t > 0 => dims.push(Dim::Static(t as usize)),
            _ => {
                return Err(RewriteError::ShapeMismatch(format!(
                    "invalid reshape target {:?}",
                    target
                )))
            }
        }
    }

    if let Some(at) = infer_at {
        let total: Option<usize> = input.dims().iter().map(|d| d.get_length()).product();
        let known: Option<usize> = dims
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != at)
            .map(|(_, d)| d.get_length())
            .product();
        if let (Some(total), Some(known)) = (total, known) {
            if known == 0 || total % known != 0 {
                return Err(RewriteError::ShapeMismatch(format!(
                    "cannot reshape {} to {:?}",
                    input, target
                )));
            }
            dims[at] = Dim::Static(total / known);
        }
    }

    Ok(PartialShape::new(dims))
}

// ============================================================================
// Node builders
// ============================================================================

/// Add an i64 1-D constant
pub fn make_ints_constant(graph: &mut Graph, name: &str, values: &[i64]) -> Value {
    graph.add_constant(name, ints_to_tensor(values))
}

/// Insert a unit axis at `axis`
pub fn make_unsqueeze(
    graph: &mut Graph,
    name: &str,
    input: Value,
    axis: usize,
) -> RewriteResult<Value> {
    let layout = layout_of(graph, input)?;
    if axis > layout.shape.rank() {
        return Err(RewriteError::InvalidAxis {
            axis: axis as i64,
            rank: layout.shape.rank(),
        });
    }
    let axes = make_ints_constant(graph, &format!("{}/axes", name), &[axis as i64]);
    let out = Layout::new(
        layout.shape.with_axis(axis, Dim::Static(1)),
        layout.element_type,
    );
    let id = graph.add_node(
        NodeBuilder::new(OpType::Unsqueeze)
            .name(name)
            .inputs([input, axes])
            .output(out),
    )?;
    Ok(Value::new(id, 0))
}

/// Drop the unit axis at `axis`
pub fn make_squeeze(
    graph: &mut Graph,
    name: &str,
    input: Value,
    axis: usize,
) -> RewriteResult<Value> {
    let layout = layout_of(graph, input)?;
    match layout.shape.get(axis) {
        Some(Dim::Static(1)) | Some(Dim::Dynamic) => {}
        _ => {
            return Err(RewriteError::ShapeMismatch(format!(
                "cannot squeeze axis {} of {}",
                axis, layout.shape
            )))
        }
    }
    let axes = make_ints_constant(graph, &format!("{}/axes", name), &[axis as i64]);
    let out = Layout::new(layout.shape.without_axis(axis), layout.element_type);
    let id = graph.add_node(
        NodeBuilder::new(OpType::Squeeze)
            .name(name)
            .inputs([input, axes])
            .output(out),
    )?;
    Ok(Value::new(id, 0))
}

/// Permute dimensions
pub fn make_transpose(
    graph: &mut Graph,
    name: &str,
    input: Value,
    order: &[usize],
) -> RewriteResult<Value> {
    let layout = layout_of(graph, input)?;
    let shape = layout.shape.permuted(order)?;
    let order_i64: Vec<i64> = order.iter().map(|&o| o as i64).collect();
    let order_const = make_ints_constant(graph, &format!("{}/order", name), &order_i64);
    let id = graph.add_node(
        NodeBuilder::new(OpType::Transpose)
            .name(name)
            .inputs([input, order_const])
            .output(Layout::new(shape, layout.element_type)),
    )?;
    Ok(Value::new(id, 0))
}

/// Reshape with `0`/`-1` target semantics
pub fn make_reshape(
    graph: &mut Graph,
    name: &str,
    input: Value,
    target: &[i64],
) -> RewriteResult<Value> {
    let layout = layout_of(graph, input)?;
    let shape = reshape_shape(&layout.shape, target)?;
    let target_const = make_ints_constant(graph, &format!("{}/shape", name), target);
    let id = graph.add_node(
        NodeBuilder::new(OpType::Reshape)
            .name(name)
            .inputs([input, target_const])
            .output(Layout::new(shape, layout.element_type)),
    )?;
    Ok(Value::new(id, 0))
}

/// Concatenate along `axis`
pub fn make_concat(
    graph: &mut Graph,
    name: &str,
    inputs: &[Value],
    axis: usize,
) -> RewriteResult<Value> {
    let first = layout_of(graph, *inputs.first().ok_or_else(|| {
        RewriteError::Internal("concat of zero inputs".to_string())
    })?)?;
    let rank = first.shape.rank();
    if axis >= rank {
        return Err(RewriteError::InvalidAxis {
            axis: axis as i64,
            rank,
        });
    }

    let mut dims: Vec<Dim> = first.shape.dims().to_vec();
    for &input in &inputs[1..] {
        let layout = layout_of(graph, input)?;
        if layout.shape.rank() != rank || layout.element_type != first.element_type {
            return Err(RewriteError::ShapeMismatch(format!(
                "cannot concat {} with {}",
                first.shape, layout.shape
            )));
        }
        dims[axis] = add_dims(dims[axis], layout.shape[axis]);
    }

    let id = graph.add_node(
        NodeBuilder::new(OpType::Concat)
            .name(name)
            .inputs(inputs.iter().copied())
            .attr("axis", AttrValue::Int(axis as i64))
            .output(Layout::new(PartialShape::new(dims), first.element_type)),
    )?;
    Ok(Value::new(id, 0))
}

/// Split into `parts` equal chunks along `axis`
pub fn make_split(
    graph: &mut Graph,
    name: &str,
    input: Value,
    axis: usize,
    parts: usize,
) -> RewriteResult<Vec<Value>> {
    let layout = layout_of(graph, input)?;
    let dim = match layout.shape.get(axis) {
        Some(Dim::Static(d)) if parts > 0 && d % parts == 0 => Dim::Static(d / parts),
        Some(Dim::Dynamic) => Dim::Dynamic,
        _ => {
            return Err(RewriteError::ShapeMismatch(format!(
                "cannot split axis {} of {} into {}",
                axis, layout.shape, parts
            )))
        }
    };
    let part_shape = layout.shape.with_dim(axis, dim);
    let id = graph.add_node(
        NodeBuilder::new(OpType::Split)
            .name(name)
            .input(input)
            .attr("axis", AttrValue::Int(axis as i64))
            .attr("num_splits", AttrValue::Int(parts as i64))
            .outputs((0..parts).map(|_| Layout::new(part_shape.clone(), layout.element_type))),
    )?;
    Ok((0..parts).map(|port| Value::new(id, port)).collect())
}

/// `[batch]` tensor filled with the time length of a `[batch, time, ...]` value
///
/// Folds to a constant when both dims are static, otherwise builds
/// ShapeOf → Gather → Broadcast.
pub fn make_sequence_lengths(graph: &mut Graph, name: &str, x: Value) -> RewriteResult<Value> {
    let layout = layout_of(graph, x)?;
    let (batch, time) = match (layout.shape.get(0), layout.shape.get(1)) {
        (Some(b), Some(t)) => (b, t),
        _ => {
            return Err(RewriteError::ShapeMismatch(format!(
                "sequence input {} needs batch and time axes",
                layout.shape
            )))
        }
    };

    if let (Dim::Static(b), Dim::Static(t)) = (batch, time) {
        return Ok(make_ints_constant(graph, name, &vec![t as i64; b]));
    }

    let rank = layout.shape.rank();
    let shape_of = graph.add_node(
        NodeBuilder::new(OpType::ShapeOf)
            .name(format!("{}/shape_of", name))
            .input(x)
            .output(Layout::new(
                PartialShape::from_static(&[rank]),
                ElementType::I64,
            )),
    )?;
    let gather = |graph: &mut Graph, suffix: &str, index: i64| -> RewriteResult<Value> {
        let indices = make_ints_constant(graph, &format!("{}/{}_index", name, suffix), &[index]);
        let id = graph.add_node(
            NodeBuilder::new(OpType::Gather)
                .name(format!("{}/{}", name, suffix))
                .inputs([Value::new(shape_of, 0), indices])
                .attr("axis", AttrValue::Int(0))
                .output(Layout::new(PartialShape::from_static(&[1]), ElementType::I64)),
        )?;
        Ok(Value::new(id, 0))
    };
    let time_len = gather(graph, "time", 1)?;
    let batch_len = gather(graph, "batch", 0)?;

    let id = graph.add_node(
        NodeBuilder::new(OpType::Broadcast)
            .name(name)
            .inputs([time_len, batch_len])
            .output(Layout::new(PartialShape::new([batch]), ElementType::I64)),
    )?;
    Ok(Value::new(id, 0))
}
