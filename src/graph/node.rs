//! Nodes, values and attributes
//!
//! A [`Node`] is owned by its [`Graph`](super::Graph) and addressed by a
//! stable [`NodeId`]. A [`Value`] is one output port of a node.

use std::fmt;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::tensor::TensorData;

use super::body::Body;
use super::types::{ImplType, Layout, OpType};

/// Stable handle of a node inside its graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Output port of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value {
    /// Producing node
    pub node: NodeId,
    /// Output index on the producer
    pub port: usize,
}

impl Value {
    /// Create a value handle
    pub fn new(node: NodeId, port: usize) -> Self {
        Self { node, port }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.port)
    }
}

/// Attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Integer
    Int(i64),
    /// Integer list
    Ints(Vec<i64>),
    /// Float
    Float(f32),
    /// Float list
    Floats(Vec<f32>),
    /// String
    Str(String),
    /// String list
    Strs(Vec<String>),
    /// Tensor payload (constants)
    Tensor(TensorData),
}

/// Ordered attribute map
pub type Attributes = IndexMap<String, AttrValue>;

/// A graph node
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Unique id within the owning graph
    pub id: NodeId,
    /// Human readable name
    pub name: String,
    /// Operation type
    pub op: OpType,
    /// Ordered input values
    pub inputs: SmallVec<[Value; 4]>,
    /// Output layouts, one per output port
    pub outputs: SmallVec<[Layout; 1]>,
    /// Attributes
    pub attributes: Attributes,
    /// Number of primitives fused into this node
    pub fused_primitives: usize,
    /// Preferred implementation
    pub preferred_impl: ImplType,
    /// Set when the scheduler may skip the node once runtime shapes allow it
    pub runtime_skippable: bool,
    /// Body of loop nodes
    pub body: Option<Box<Body>>,
}

impl Node {
    /// Output value at `port`
    pub fn output(&self, port: usize) -> Value {
        Value::new(self.id, port)
    }

    /// All output values
    pub fn output_values(&self) -> impl Iterator<Item = Value> + '_ {
        (0..self.outputs.len()).map(move |port| Value::new(self.id, port))
    }

    /// Get attribute by name
    pub fn get_attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    /// Check if any output layout is dynamic
    ///
    /// See `Graph::is_dynamic_node` for the check that includes inputs.
    pub fn is_dynamic(&self) -> bool {
        self.outputs.iter().any(|l| l.is_dynamic())
    }

    /// Check if the node has fused primitives attached
    pub fn has_fused_primitives(&self) -> bool {
        self.fused_primitives > 0
    }

    /// Constant payload of `Constant`/`Data` nodes
    pub fn constant_value(&self) -> Option<&TensorData> {
        match (self.op, self.attributes.get("value")) {
            (OpType::Constant | OpType::Data, Some(AttrValue::Tensor(t))) => Some(t),
            _ => None,
        }
    }
}

/// Builder for nodes not yet inserted in a graph
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    pub(crate) name: Option<String>,
    pub(crate) op: OpType,
    pub(crate) inputs: SmallVec<[Value; 4]>,
    pub(crate) outputs: SmallVec<[Layout; 1]>,
    pub(crate) attributes: Attributes,
    pub(crate) fused_primitives: usize,
    pub(crate) preferred_impl: ImplType,
    pub(crate) body: Option<Box<Body>>,
}

impl NodeBuilder {
    /// Start building a node of type `op`
    pub fn new(op: OpType) -> Self {
        Self {
            name: None,
            op,
            inputs: SmallVec::new(),
            outputs: SmallVec::new(),
            attributes: Attributes::new(),
            fused_primitives: 0,
            preferred_impl: ImplType::Any,
            body: None,
        }
    }

    /// Set the node name (defaults to `<op>_<id>`)
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append an input
    pub fn input(mut self, value: Value) -> Self {
        self.inputs.push(value);
        self
    }

    /// Append several inputs
    pub fn inputs(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.inputs.extend(values);
        self
    }

    /// Append an output layout
    pub fn output(mut self, layout: Layout) -> Self {
        self.outputs.push(layout);
        self
    }

    /// Append several output layouts
    pub fn outputs(mut self, layouts: impl IntoIterator<Item = Layout>) -> Self {
        self.outputs.extend(layouts);
        self
    }

    /// Set an attribute
    pub fn attr(mut self, name: &str, value: AttrValue) -> Self {
        self.attributes.insert(name.to_string(), value);
        self
    }

    /// Copy all attributes from another node
    pub fn attrs_from(mut self, other: &Attributes) -> Self {
        for (k, v) in other {
            self.attributes.insert(k.clone(), v.clone());
        }
        self
    }

    /// Set the fused primitive count
    pub fn fused_primitives(mut self, count: usize) -> Self {
        self.fused_primitives = count;
        self
    }

    /// Set the preferred implementation
    pub fn preferred_impl(mut self, impl_type: ImplType) -> Self {
        self.preferred_impl = impl_type;
        self
    }

    /// Attach a loop body
    pub fn body(mut self, body: Body) -> Self {
        self.body = Some(Box::new(body));
        self
    }

    pub(crate) fn build(self, id: NodeId) -> Node {
        let name = self
            .name
            .unwrap_or_else(|| format!("{}_{}", self.op.name().to_lowercase(), id.0));
        Node {
            id,
            name,
            op: self.op,
            inputs: self.inputs,
            outputs: self.outputs,
            attributes: self.attributes,
            fused_primitives: self.fused_primitives,
            preferred_impl: self.preferred_impl,
            runtime_skippable: false,
            body: self.body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::scalar_i64;

    #[test]
    fn test_builder_defaults() {
        let node = NodeBuilder::new(OpType::Relu)
            .input(Value::new(NodeId(0), 0))
            .output(Layout::f32(&[1, 4]))
            .build(NodeId(3));

        assert_eq!(node.name, "relu_3");
        assert_eq!(node.inputs.len(), 1);
        assert_eq!(node.output(0), Value::new(NodeId(3), 0));
        assert!(!node.runtime_skippable);
        assert!(!node.has_fused_primitives());
    }

    #[test]
    fn test_constant_value() {
        let node = NodeBuilder::new(OpType::Constant)
            .attr("value", AttrValue::Tensor(scalar_i64(3)))
            .build(NodeId(0));
        assert!(node.constant_value().unwrap().all_equal_to(3));

        let relu = NodeBuilder::new(OpType::Relu)
            .attr("value", AttrValue::Tensor(scalar_i64(3)))
            .build(NodeId(1));
        assert!(relu.constant_value().is_none());
    }

    #[test]
    fn test_is_dynamic() {
        let node = NodeBuilder::new(OpType::Permute)
            .output(Layout::f32(&[-1, 8]))
            .build(NodeId(0));
        assert!(node.is_dynamic());
    }
}
