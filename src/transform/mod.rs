//! Graph rewrite driver module
//!
//! This module provides the rewrite infrastructure:
//!
//! - [`MatcherPass`]: one pattern plus one rewrite callback
//! - [`GraphRewrite`]: ordered passes driven to fixed point
//! - [`eliminate`]: node elimination helpers
//!
//! # Overview
//!
//! Rewrites mutate the [`Graph`](crate::graph::Graph) in place. The typical
//! workflow is:
//!
//! 1. Build the pattern once
//! 2. Wrap it with a callback in a `MatcherPass`
//! 3. Register passes on a `GraphRewrite` and run it
//!
//! # Example
//!
//! ```ignore
//! use graph_rewriter::op_types;
//! use graph_rewriter::pattern::{any_input, wrap_type};
//! use graph_rewriter::transform::{eliminate::eliminate_node, GraphRewrite, MatcherPass};
//!
//! let identity = MatcherPass::new(
//!     "eliminate_identity",
//!     wrap_type(&op_types![Identity], vec![any_input()]),
//!     |graph, m| Ok(eliminate_node(graph, m.root().node, 0).is_some()),
//! );
//!
//! let result = GraphRewrite::new("cleanup").add_pass(identity).run(&mut graph)?;
//! println!("applied {} rewrites", result.transforms_applied);
//! ```

pub mod core;
pub mod eliminate;
pub mod matcher_pass;

// Re-export main types and functions
pub use core::{GraphRewrite, PassResult, RewriteConfig};
pub use eliminate::{
    eliminate_dead_nodes, eliminate_if_unused, eliminate_node, eliminate_unused_constants,
    EliminationResult,
};
pub use matcher_pass::{Attempt, Callback, MatcherPass};
