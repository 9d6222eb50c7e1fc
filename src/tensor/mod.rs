//! Tensor utilities
//!
//! This module provides the tensor-level vocabulary of the IR:
//! - Element types (`dtype`)
//! - Partial shapes and axis helpers (`shape`)
//! - Constant payloads (`data`) and their construction (`convert`)
//!
//! # Example
//!
//! ```ignore
//! use graph_rewriter::tensor::{concat_tensors, insert_axis, vec_to_tensor_f32};
//!
//! let w = vec_to_tensor_f32(&weights, &[4 * hidden, input])?;
//! // Add the num_directions axis expected by sequence ops
//! let w = insert_axis(&w, 0)?;
//! ```

pub mod convert;
pub mod data;
pub mod dtype;
pub mod shape;

// Re-export commonly used items
pub use convert::{concat_tensors, insert_axis, ints_to_tensor, scalar_i64, vec_to_tensor_f32};
pub use data::TensorData;
pub use dtype::ElementType;
pub use shape::{normalize_axis, numel, Dim, PartialShape};
