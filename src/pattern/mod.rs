//! Pattern matching module for graph rewriting
//!
//! This module provides the declarative pattern language and the matcher that
//! binds it to graph values.
//!
//! # Overview
//!
//! The pattern matching system works by:
//! 1. Building a pattern tree once per pass (`wrap_type`, `any_input`, `optional`)
//! 2. Matching it root first against a candidate value
//! 3. Handing the bindings to the pass callback on success
//!
//! # Example
//!
//! ```ignore
//! use graph_rewriter::op_types;
//! use graph_rewriter::pattern::{any_input, optional, wrap_type, Matcher};
//!
//! let data = any_input();
//! let relu = wrap_type(&op_types![Relu], vec![data.clone()]);
//! let root = optional(&op_types![Squeeze, Reshape], vec![relu.clone()], None)?;
//!
//! let matcher = Matcher::new(root, "relu_squeeze");
//! if let Some(m) = matcher.match_value(&graph, value) {
//!     let relu_node = m.node_of(&relu);
//!     let input = m.get(&data);
//! }
//! ```
//!
//! # Traversal
//!
//! The module also provides graph traversal utilities:
//!
//! ```ignore
//! use graph_rewriter::pattern::traversal::{BfsIterator, has_path};
//!
//! for node in BfsIterator::forward(&graph, start) {
//!     println!("Visiting: {}", node.name);
//! }
//! ```

pub mod matcher;
pub mod ops;
pub mod traversal;

// Re-export main types
pub use matcher::{MatchResult, Matcher};
pub use ops::{
    all_of, any_input, any_input_with, collect_types, consumers_count, element_type_is,
    has_static_rank, has_static_shape, is_constant, labeled, optional, rank_equals, wrap_type,
    wrap_type_with, Pattern, PatternId, PatternKind, PatternNode, Predicate, TypeList, CELL_OPS,
    SQUEEZE_LIKE, UNSQUEEZE_LIKE,
};
pub use traversal::{has_path, predecessors, successors, BfsIterator, Direction};
