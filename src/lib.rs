//! # Graph Rewriter
//!
//! Pattern-driven rewriting of dataflow graphs for an inference compiler.
//!
//! This crate provides a declarative pattern language with optional nodes,
//! a matcher and fixed-point rewrite driver, and a set of passes for
//! recurrent networks and runtime scheduling.
//!
//! ## Features
//!
//! - **Pattern Matching**: wildcard, typed and optional pattern nodes with
//!   value predicates
//! - **Rewrite Driver**: matcher passes grouped into graph rewrites run to a
//!   fixed point with an iteration cap
//! - **Loop Conversion**: TensorIterator/Loop over LSTM, RNN or GRU cells to
//!   one Sequence node
//! - **LSTM Fusion**: reverse and bidirectional LSTMSequence fusion
//! - **Runtime Skipping**: mark Gather, Permute and StridedSlice nodes that
//!   may be skipped at runtime
//!
//! ## Example
//!
//! ```ignore
//! use graph_rewriter::prelude::*;
//!
//! let result = ConvertTensorIteratorToSequence::new().run(&mut graph)?;
//! MarkRuntimeSkippableNodes::new().run(&mut graph)?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// ============================================================================
// Module declarations
// ============================================================================

pub mod error;
pub mod graph;
pub mod pattern;
pub mod tensor;
pub mod traits;
pub mod transform;
pub mod transformers;

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Prelude module - import commonly used types with `use graph_rewriter::prelude::*`
pub mod prelude {
    pub use crate::error::{RewriteError, RewriteResult};
    pub use crate::graph::{
        AttrValue, Body, Graph, Layout, Node, NodeBuilder, NodeId, OpType, Value,
    };
    pub use crate::op_types;
    pub use crate::pattern::{
        any_input, optional, wrap_type, MatchResult, Matcher, Pattern,
    };
    pub use crate::tensor::{ElementType, PartialShape, TensorData};
    pub use crate::traits::{GraphPass, PassChain};
    pub use crate::transform::{GraphRewrite, MatcherPass, PassResult, RewriteConfig};
    pub use crate::transformers::{
        ConvertLoopToLstmSequence, ConvertTensorIteratorToSequence,
        FuseBidirectionalLstmSequence, FuseReverseLstmSequence, MarkRuntimeSkippableNodes,
    };
}

// ============================================================================
// Crate-level re-exports
// ============================================================================

pub use error::{RewriteError, RewriteResult};
pub use traits::GraphPass;

// ============================================================================
// Version information
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
