//! Operation type identifiers and value layouts

#![allow(missing_docs)]

use std::fmt;

use crate::tensor::{ElementType, PartialShape};

/// Operation type of a graph node
///
/// Stable, comparable and hashable: type-specific logic dispatches on this
/// identifier instead of downcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OpType {
    Parameter,
    Constant,
    /// Pure data node (weights baked into the program)
    Data,
    Identity,
    Convert,
    Reshape,
    Squeeze,
    Unsqueeze,
    Transpose,
    Permute,
    Concat,
    Split,
    Gather,
    StridedSlice,
    ShapeOf,
    Broadcast,
    KvCache,
    Add,
    MatMul,
    Relu,
    ReverseSequence,
    LstmCell,
    RnnCell,
    GruCell,
    LstmSequence,
    RnnSequence,
    GruSequence,
    TensorIterator,
    Loop,
}

impl OpType {
    /// Canonical operation name
    pub fn name(self) -> &'static str {
        match self {
            OpType::Parameter => "Parameter",
            OpType::Constant => "Constant",
            OpType::Data => "Data",
            OpType::Identity => "Identity",
            OpType::Convert => "Convert",
            OpType::Reshape => "Reshape",
            OpType::Squeeze => "Squeeze",
            OpType::Unsqueeze => "Unsqueeze",
            OpType::Transpose => "Transpose",
            OpType::Permute => "Permute",
            OpType::Concat => "Concat",
            OpType::Split => "Split",
            OpType::Gather => "Gather",
            OpType::StridedSlice => "StridedSlice",
            OpType::ShapeOf => "ShapeOf",
            OpType::Broadcast => "Broadcast",
            OpType::KvCache => "KvCache",
            OpType::Add => "Add",
            OpType::MatMul => "MatMul",
            OpType::Relu => "Relu",
            OpType::ReverseSequence => "ReverseSequence",
            OpType::LstmCell => "LSTMCell",
            OpType::RnnCell => "RNNCell",
            OpType::GruCell => "GRUCell",
            OpType::LstmSequence => "LSTMSequence",
            OpType::RnnSequence => "RNNSequence",
            OpType::GruSequence => "GRUSequence",
            OpType::TensorIterator => "TensorIterator",
            OpType::Loop => "Loop",
        }
    }

    /// Check if the op is a recurrent cell
    pub fn is_cell(self) -> bool {
        matches!(self, OpType::LstmCell | OpType::RnnCell | OpType::GruCell)
    }

    /// Check if the op is a fused recurrent sequence
    pub fn is_sequence(self) -> bool {
        matches!(
            self,
            OpType::LstmSequence | OpType::RnnSequence | OpType::GruSequence
        )
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Memory format of a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryFormat {
    /// Planar, rank <= 4
    Bfyx,
    /// Planar, rank 5
    Bfzyx,
    /// Planar, rank 6
    Bfwzyx,
    /// Channels-last
    Byxf,
    /// Feature-blocked by 16
    BFsYxFsv16,
}

impl MemoryFormat {
    /// Default planar format for a rank
    pub fn default_for_rank(rank: usize) -> Self {
        match rank {
            0..=4 => MemoryFormat::Bfyx,
            5 => MemoryFormat::Bfzyx,
            _ => MemoryFormat::Bfwzyx,
        }
    }
}

/// Shape, element type and memory format of a value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Layout {
    /// Partial shape
    pub shape: PartialShape,
    /// Element type
    pub element_type: ElementType,
    /// Memory format
    pub format: MemoryFormat,
}

impl Layout {
    /// Create a layout with the default planar format
    pub fn new(shape: PartialShape, element_type: ElementType) -> Self {
        let format = MemoryFormat::default_for_rank(shape.rank());
        Self {
            shape,
            element_type,
            format,
        }
    }

    /// f32 layout from `i64` dims (negative = dynamic)
    pub fn f32(dims: &[i64]) -> Self {
        Self::new(PartialShape::from_dims(dims), ElementType::F32)
    }

    /// i64 layout from `i64` dims (negative = dynamic)
    pub fn i64(dims: &[i64]) -> Self {
        Self::new(PartialShape::from_dims(dims), ElementType::I64)
    }

    /// Replace the memory format
    pub fn with_format(mut self, format: MemoryFormat) -> Self {
        self.format = format;
        self
    }

    /// Check if the shape has dynamic dimensions
    pub fn is_dynamic(&self) -> bool {
        self.shape.is_dynamic()
    }
}

/// Preferred implementation of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImplType {
    /// No preference
    #[default]
    Any,
    /// Device kernels
    Ocl,
    /// Host fallback
    Cpu,
}
