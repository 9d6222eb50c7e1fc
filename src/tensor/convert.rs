//! Tensor construction and reshaping helpers
//!
//! Build `TensorData` payloads from plain vectors and combine constant
//! weights the way sequence fusions need (extra leading axis, concatenation
//! along the direction axis).

use ndarray::{concatenate, Array, ArrayD, Axis, IxDyn};

use crate::error::{RewriteError, RewriteResult};

use super::data::TensorData;
use super::shape::numel;

/// Build an f32 tensor from a flat vector and a shape
pub fn vec_to_tensor_f32(data: &[f32], shape: &[usize]) -> RewriteResult<TensorData> {
    check_len(data.len(), shape)?;
    Array::from_shape_vec(IxDyn(shape), data.to_vec())
        .map(TensorData::F32)
        .map_err(|e| RewriteError::Internal(e.to_string()))
}

/// Build a 1-D i64 tensor
pub fn ints_to_tensor(data: &[i64]) -> TensorData {
    TensorData::I64(Array::from_vec(data.to_vec()).into_dyn())
}

/// Build a rank-0 i64 tensor
pub fn scalar_i64(value: i64) -> TensorData {
    TensorData::I64(ArrayD::from_elem(IxDyn(&[]), value))
}

/// Insert a unit axis at `axis`
pub fn insert_axis(data: &TensorData, axis: usize) -> RewriteResult<TensorData> {
    let rank = data.shape().len();
    if axis > rank {
        return Err(RewriteError::InvalidAxis {
            axis: axis as i64,
            rank,
        });
    }
    Ok(match data {
        TensorData::F32(a) => TensorData::F32(a.clone().insert_axis(Axis(axis))),
        TensorData::I64(a) => TensorData::I64(a.clone().insert_axis(Axis(axis))),
    })
}

/// Concatenate payloads of the same element type along `axis`
pub fn concat_tensors(parts: &[&TensorData], axis: usize) -> RewriteResult<TensorData> {
    let first = parts
        .first()
        .ok_or_else(|| RewriteError::Internal("concat of zero tensors".to_string()))?;
    let rank = first.shape().len();
    if axis >= rank {
        return Err(RewriteError::InvalidAxis {
            axis: axis as i64,
            rank,
        });
    }

    let shape_err = |e: ndarray::ShapeError| RewriteError::ShapeMismatch(e.to_string());
    match first {
        TensorData::F32(_) => {
            let views = parts
                .iter()
                .map(|p| p.as_f32().map(|a| a.view()))
                .collect::<RewriteResult<Vec<_>>>()?;
            concatenate(Axis(axis), &views)
                .map(TensorData::F32)
                .map_err(shape_err)
        }
        TensorData::I64(_) => {
            let views = parts
                .iter()
                .map(|p| p.as_i64().map(|a| a.view()))
                .collect::<RewriteResult<Vec<_>>>()?;
            concatenate(Axis(axis), &views)
                .map(TensorData::I64)
                .map_err(shape_err)
        }
    }
}

fn check_len(len: usize, shape: &[usize]) -> RewriteResult<()> {
    let expected = numel(shape);
    if len != expected {
        return Err(RewriteError::ShapeMismatch(format!(
            "data length {} does not match shape {:?} (expected {})",
            len, shape, expected
        )));
    }
    Ok(())
}
