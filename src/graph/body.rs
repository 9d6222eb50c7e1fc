//! Loop bodies
//!
//! `TensorIterator` and `Loop` nodes own a nested [`Graph`] plus port maps
//! describing how outer inputs feed body parameters and how body results
//! become outer outputs.
//!
//! Port indices refer to:
//! - `input`: input port of the outer loop node
//! - `output`: output port of the outer loop node
//! - `param`: index into [`Body::parameters`]
//! - `result`: index into the body graph's outputs

use super::context::Graph;
use super::node::{NodeId, Value};

/// Outer input sliced along an axis, one part per iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceInput {
    pub input: usize,
    pub param: usize,
    pub axis: i64,
    pub start: i64,
    pub stride: i64,
    pub part_size: i64,
    pub end: i64,
}

impl SliceInput {
    /// Slice covering the whole axis one element at a time
    ///
    /// Stride 1 walks `0..=-1`, stride -1 walks `-1..=0`.
    pub fn full(input: usize, param: usize, axis: i64, stride: i64) -> Self {
        let (start, end) = if stride < 0 { (-1, 0) } else { (0, -1) };
        Self {
            input,
            param,
            axis,
            start,
            stride,
            part_size: 1,
            end,
        }
    }

    /// Check if the slice walks the whole axis one element per iteration
    pub fn is_full_unit_walk(&self) -> bool {
        self.part_size == 1
            && match self.stride {
                1 => self.start == 0 && self.end == -1,
                -1 => self.start == -1 && self.end == 0,
                _ => false,
            }
    }
}

/// How an outer input reaches the body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputDescription {
    /// Per-iteration slice of the outer input
    Sliced(SliceInput),
    /// Initial value from outside, then the back-edge `result` of the
    /// previous iteration
    Merged {
        input: usize,
        param: usize,
        result: usize,
    },
    /// Same outer value every iteration
    Invariant { input: usize, param: usize },
}

impl InputDescription {
    /// Outer input port
    pub fn input(&self) -> usize {
        match self {
            InputDescription::Sliced(s) => s.input,
            InputDescription::Merged { input, .. } | InputDescription::Invariant { input, .. } => {
                *input
            }
        }
    }

    /// Body parameter index
    pub fn param(&self) -> usize {
        match self {
            InputDescription::Sliced(s) => s.param,
            InputDescription::Merged { param, .. } | InputDescription::Invariant { param, .. } => {
                *param
            }
        }
    }
}

/// Per-iteration results concatenated along an axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcatOutput {
    pub result: usize,
    pub output: usize,
    pub axis: i64,
    pub start: i64,
    pub stride: i64,
    pub part_size: i64,
    pub end: i64,
}

impl ConcatOutput {
    /// Concatenation covering the whole axis one element at a time
    pub fn full(result: usize, output: usize, axis: i64, stride: i64) -> Self {
        let (start, end) = if stride < 0 { (-1, 0) } else { (0, -1) };
        Self {
            result,
            output,
            axis,
            start,
            stride,
            part_size: 1,
            end,
        }
    }
}

/// How a body result reaches the outside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputDescription {
    /// Concatenation over all iterations
    Concat(ConcatOutput),
    /// Value of the last iteration
    Last { result: usize, output: usize },
}

impl OutputDescription {
    /// Outer output port
    pub fn output(&self) -> usize {
        match self {
            OutputDescription::Concat(c) => c.output,
            OutputDescription::Last { output, .. } => *output,
        }
    }

    /// Body result index
    pub fn result(&self) -> usize {
        match self {
            OutputDescription::Concat(c) => c.result,
            OutputDescription::Last { result, .. } => *result,
        }
    }
}

/// Special ports of `Loop` bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopPorts {
    /// Parameter receiving the iteration counter
    pub current_iteration: Option<usize>,
    /// Result deciding whether to continue
    pub condition_result: usize,
}

/// Body of a loop node
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    /// Body graph; its outputs are the body results
    pub graph: Graph,
    /// Parameter nodes, indexed by `param`
    pub parameters: Vec<NodeId>,
    /// Input port map
    pub inputs: Vec<InputDescription>,
    /// Output port map
    pub outputs: Vec<OutputDescription>,
    /// Loop-only ports
    pub loop_ports: Option<LoopPorts>,
}

impl Body {
    /// Create a body from a graph and its parameters
    pub fn new(graph: Graph, parameters: Vec<NodeId>) -> Self {
        Self {
            graph,
            parameters,
            inputs: Vec::new(),
            outputs: Vec::new(),
            loop_ports: None,
        }
    }

    /// Add an input description
    pub fn with_input(mut self, desc: InputDescription) -> Self {
        self.inputs.push(desc);
        self
    }

    /// Add an output description
    pub fn with_output(mut self, desc: OutputDescription) -> Self {
        self.outputs.push(desc);
        self
    }

    /// Set loop ports
    pub fn with_loop_ports(mut self, ports: LoopPorts) -> Self {
        self.loop_ports = Some(ports);
        self
    }

    /// Value of parameter `param`
    pub fn param_value(&self, param: usize) -> Option<Value> {
        self.parameters.get(param).map(|&id| Value::new(id, 0))
    }

    /// Index of the parameter producing `value`
    pub fn param_index(&self, value: Value) -> Option<usize> {
        if value.port != 0 {
            return None;
        }
        self.parameters.iter().position(|&id| id == value.node)
    }

    /// Value of result `result`
    pub fn result_value(&self, result: usize) -> Option<Value> {
        self.graph.outputs().get(result).copied()
    }

    /// Input description feeding parameter `param`
    pub fn input_for_param(&self, param: usize) -> Option<&InputDescription> {
        self.inputs.iter().find(|d| d.param() == param)
    }

    /// Output description producing outer port `output`
    pub fn output_for_port(&self, output: usize) -> Option<&OutputDescription> {
        self.outputs.iter().find(|d| d.output() == output)
    }
}
