//! Shape utilities
//!
//! Partial shapes with possibly dynamic dimensions, plus axis helpers.
//! Dimensions use the `-1` convention for "dynamic" when built from `i64`.

use std::fmt;
use std::ops::Index;

use smallvec::SmallVec;

use crate::error::{RewriteError, RewriteResult};

/// A single dimension, static or dynamic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    /// Known at compile time
    Static(usize),
    /// Known only at runtime
    Dynamic,
}

impl Dim {
    /// Check if the dimension is static
    pub fn is_static(self) -> bool {
        matches!(self, Dim::Static(_))
    }

    /// Check if the dimension is dynamic
    pub fn is_dynamic(self) -> bool {
        matches!(self, Dim::Dynamic)
    }

    /// Static length, if known
    pub fn get_length(self) -> Option<usize> {
        match self {
            Dim::Static(d) => Some(d),
            Dim::Dynamic => None,
        }
    }
}

impl From<i64> for Dim {
    fn from(d: i64) -> Self {
        if d < 0 {
            Dim::Dynamic
        } else {
            Dim::Static(d as usize)
        }
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Static(d) => write!(f, "{}", d),
            Dim::Dynamic => f.write_str("?"),
        }
    }
}

/// Shape with a static rank and possibly dynamic dimensions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PartialShape(SmallVec<[Dim; 4]>);

impl PartialShape {
    /// Create from dimensions
    pub fn new(dims: impl IntoIterator<Item = Dim>) -> Self {
        Self(dims.into_iter().collect())
    }

    /// Create from `i64` dimensions, negative values meaning dynamic
    pub fn from_dims(dims: &[i64]) -> Self {
        Self(dims.iter().map(|&d| Dim::from(d)).collect())
    }

    /// Create a fully static shape
    pub fn from_static(dims: &[usize]) -> Self {
        Self(dims.iter().map(|&d| Dim::Static(d)).collect())
    }

    /// Number of dimensions
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// All dimensions
    pub fn dims(&self) -> &[Dim] {
        &self.0
    }

    /// Dimension at `axis`, if in range
    pub fn get(&self, axis: usize) -> Option<Dim> {
        self.0.get(axis).copied()
    }

    /// Check if every dimension is static
    pub fn is_static(&self) -> bool {
        self.0.iter().all(|d| d.is_static())
    }

    /// Check if any dimension is dynamic
    pub fn is_dynamic(&self) -> bool {
        !self.is_static()
    }

    /// Static dimensions, if the shape is fully static
    pub fn to_static(&self) -> Option<Vec<usize>> {
        self.0.iter().map(|d| d.get_length()).collect()
    }

    /// Shape with `axis` removed
    pub fn without_axis(&self, axis: usize) -> Self {
        Self(
            self.0
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != axis)
                .map(|(_, d)| *d)
                .collect(),
        )
    }

    /// Shape with `dim` inserted at `axis`
    pub fn with_axis(&self, axis: usize, dim: Dim) -> Self {
        let mut dims = self.0.clone();
        dims.insert(axis.min(dims.len()), dim);
        Self(dims)
    }

    /// Shape with the dimension at `axis` replaced by `dim`
    pub fn with_dim(&self, axis: usize, dim: Dim) -> Self {
        let mut dims = self.0.clone();
        if let Some(d) = dims.get_mut(axis) {
            *d = dim;
        }
        Self(dims)
    }

    /// Shape with dimensions permuted by `order`
    pub fn permuted(&self, order: &[usize]) -> RewriteResult<Self> {
        if order.len() != self.rank() {
            return Err(RewriteError::ShapeMismatch(format!(
                "permutation {:?} does not fit rank {}",
                order,
                self.rank()
            )));
        }
        order
            .iter()
            .map(|&i| {
                self.get(i).ok_or(RewriteError::InvalidAxis {
                    axis: i as i64,
                    rank: self.rank(),
                })
            })
            .collect::<RewriteResult<SmallVec<[Dim; 4]>>>()
            .map(Self)
    }
}

impl Index<usize> for PartialShape {
    type Output = Dim;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl fmt::Display for PartialShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", d)?;
        }
        f.write_str("]")
    }
}

/// Calculate total number of elements from a static shape
pub fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Normalize axis to positive index
pub fn normalize_axis(axis: i64, rank: usize) -> RewriteResult<usize> {
    let rank_i64 = rank as i64;
    let normalized = if axis < 0 { axis + rank_i64 } else { axis };

    if normalized < 0 || normalized >= rank_i64 {
        return Err(RewriteError::InvalidAxis { axis, rank });
    }

    Ok(normalized as usize)
}
