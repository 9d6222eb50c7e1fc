//! Error types for graph-rewriter
//!
//! This module defines all error types used throughout the crate.
//!
//! A pattern that fails to match is not an error: matching returns `Option`.
//! Errors are reserved for contract violations (malformed patterns, dangling
//! handles) and internal inconsistencies.

use thiserror::Error;

use crate::graph::NodeId;

/// Main error type for graph rewrite operations
#[derive(Error, Debug)]
pub enum RewriteError {
    /// Pattern was constructed with an invalid shape
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// Node handle does not refer to a live node
    #[error("Invalid node: {0}")]
    InvalidNode(NodeId),

    /// Missing required field or attribute
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// A value expected to be constant has no constant producer
    #[error("Constant not found for input {port} of node {node}")]
    ConstantNotFound {
        /// Consuming node
        node: NodeId,
        /// Input port
        port: usize,
    },

    /// Shapes are inconsistent
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Axis out of range for the given rank
    #[error("Axis {axis} out of bounds for rank {rank}")]
    InvalidAxis {
        /// Requested axis (possibly negative)
        axis: i64,
        /// Rank of the tensor
        rank: usize,
    },

    /// Tensor payload has an unexpected element type
    #[error("Invalid data type: {0}")]
    InvalidDataType(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for rewrite operations
pub type RewriteResult<T> = Result<T, RewriteError>;
