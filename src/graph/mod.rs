//! Graph IR module
//!
//! This module provides the dataflow graph the rewrite passes operate on:
//!
//! - [`Graph`]: arena of nodes with O(1) consumer lookups
//! - [`Node`], [`NodeBuilder`], [`Value`]: nodes and their output ports
//! - [`Body`]: nested graphs of `TensorIterator`/`Loop` nodes
//! - [`maps`]: slot and index types
//!
//! # Overview
//!
//! Nodes are addressed by stable [`NodeId`] handles. Removal is two-phase:
//! passes mark nodes eliminated while they run, the driver compacts the
//! arena and recomputes the processing order afterwards.
//!
//! # Example
//!
//! ```ignore
//! use graph_rewriter::graph::{Graph, Layout, NodeBuilder, OpType, Value};
//!
//! let mut graph = Graph::new();
//! let x = graph.add_parameter("x", Layout::f32(&[1, 8]));
//! let relu = graph.add_node(
//!     NodeBuilder::new(OpType::Relu).input(x).output(Layout::f32(&[1, 8])),
//! )?;
//!
//! // Traverse graph
//! let consumers = graph.consumers(x);
//! let producer = graph.producer(Value::new(relu, 0));
//!
//! // Replace and clean up
//! graph.redirect_consumers(Value::new(relu, 0), x);
//! graph.mark_eliminated(relu);
//! graph.compact();
//! ```

pub mod accessors;
pub mod body;
pub mod context;
pub mod maps;
pub mod mutators;
pub mod node;
pub mod types;

// Re-export main types
pub use body::{
    Body, ConcatOutput, InputDescription, LoopPorts, OutputDescription, SliceInput,
};
pub use context::Graph;
pub use maps::{Consumer, ConsumerMap, OpEntry};
pub use node::{AttrValue, Attributes, Node, NodeBuilder, NodeId, Value};
pub use types::{ImplType, Layout, MemoryFormat, OpType};
