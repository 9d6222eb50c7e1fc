//! Graph passes
//!
//! This module provides ready-to-use passes built on the rewrite driver:
//!
//! - **Loop conversion**: TensorIterator/Loop over a recurrent cell to one
//!   Sequence node
//! - **Fusion**: reverse and bidirectional LSTM sequence fusion
//! - **Marking**: flag nodes the runtime may skip
//!
//! # Overview
//!
//! Each pass implements the [`GraphPass`](crate::traits::GraphPass) trait and
//! can be applied individually or combined in a
//! [`PassChain`](crate::traits::PassChain).
//!
//! # Example
//!
//! ```ignore
//! use graph_rewriter::transformers::{
//!     ConvertTensorIteratorToSequence, FuseBidirectionalLstmSequence,
//!     FuseReverseLstmSequence, MarkRuntimeSkippableNodes,
//! };
//! use graph_rewriter::traits::PassChain;
//!
//! let chain = PassChain::new()
//!     .add(ConvertTensorIteratorToSequence::new())
//!     .add(FuseReverseLstmSequence::new()?)
//!     .add(FuseBidirectionalLstmSequence::new()?)
//!     .add(MarkRuntimeSkippableNodes::new());
//!
//! let result = chain.run(&mut graph)?;
//! println!("applied {} rewrites", result.transforms_applied);
//! ```

/// Common utilities and node builders
pub mod common;
/// Bidirectional LSTM fusion
pub mod fuse_bidirectional_lstm;
/// Reverse LSTM fusion
pub mod fuse_reverse_lstm;
/// Runtime-skip marking
pub mod mark_runtime_skippable;
/// Recurrent loop to Sequence conversion
pub mod ti_to_sequence;

// Re-export common helpers
pub use common::{
    get_attr_i, get_attr_ints, get_attr_s, layout_of, make_concat, make_ints_constant,
    make_reshape, make_sequence_lengths, make_split, make_squeeze, make_transpose, make_unsqueeze,
};

// Re-export passes
pub use fuse_bidirectional_lstm::FuseBidirectionalLstmSequence;
pub use fuse_reverse_lstm::FuseReverseLstmSequence;
pub use mark_runtime_skippable::MarkRuntimeSkippableNodes;
pub use ti_to_sequence::{
    CellKind, ConvertLoopToLstmSequence, ConvertTensorIteratorToGruSequence,
    ConvertTensorIteratorToLstmSequence, ConvertTensorIteratorToRnnSequence,
    ConvertTensorIteratorToSequence,
};
