//! Constant tensor payloads
//!
//! `TensorData` is the value carried by `Constant` nodes. Only the element
//! types the rewrites actually produce are represented.

use ndarray::ArrayD;

use crate::error::{RewriteError, RewriteResult};

use super::dtype::ElementType;
use super::shape::PartialShape;

/// Constant payload of a tensor
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    /// f32 payload
    F32(ArrayD<f32>),
    /// i64 payload
    I64(ArrayD<i64>),
}

impl TensorData {
    /// Element type of the payload
    pub fn element_type(&self) -> ElementType {
        match self {
            TensorData::F32(_) => ElementType::F32,
            TensorData::I64(_) => ElementType::I64,
        }
    }

    /// Static shape of the payload
    pub fn shape(&self) -> &[usize] {
        match self {
            TensorData::F32(a) => a.shape(),
            TensorData::I64(a) => a.shape(),
        }
    }

    /// Shape as a partial shape
    pub fn partial_shape(&self) -> PartialShape {
        PartialShape::from_static(self.shape())
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(a) => a.len(),
            TensorData::I64(a) => a.len(),
        }
    }

    /// Check if the payload has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow as an f32 array
    pub fn as_f32(&self) -> RewriteResult<&ArrayD<f32>> {
        match self {
            TensorData::F32(a) => Ok(a),
            other => Err(RewriteError::InvalidDataType(format!(
                "expected f32 payload, got {}",
                other.element_type()
            ))),
        }
    }

    /// Borrow as an i64 array
    pub fn as_i64(&self) -> RewriteResult<&ArrayD<i64>> {
        match self {
            TensorData::I64(a) => Ok(a),
            other => Err(RewriteError::InvalidDataType(format!(
                "expected i64 payload, got {}",
                other.element_type()
            ))),
        }
    }

    /// Flatten integer payloads into a vector
    ///
    /// f32 payloads are accepted only when every element is integral.
    pub fn to_i64_vec(&self) -> RewriteResult<Vec<i64>> {
        match self {
            TensorData::I64(a) => Ok(a.iter().copied().collect()),
            TensorData::F32(a) => a
                .iter()
                .map(|&v| {
                    if v.fract() == 0.0 {
                        Ok(v as i64)
                    } else {
                        Err(RewriteError::InvalidDataType(format!(
                            "non-integral value {} in index tensor",
                            v
                        )))
                    }
                })
                .collect(),
        }
    }

    /// Check if every element equals `value`
    pub fn all_equal_to(&self, value: i64) -> bool {
        match self {
            TensorData::I64(a) => a.iter().all(|&v| v == value),
            TensorData::F32(a) => a.iter().all(|&v| v == value as f32),
        }
    }
}

impl From<ArrayD<f32>> for TensorData {
    fn from(a: ArrayD<f32>) -> Self {
        TensorData::F32(a)
    }
}

impl From<ArrayD<i64>> for TensorData {
    fn from(a: ArrayD<i64>) -> Self {
        TensorData::I64(a)
    }
}
