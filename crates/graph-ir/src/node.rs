// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! IR node definitions.
//!
//! Nodes never own their operands: they refer to them through
//! [`NodeValue`] handles into the same [`crate::Graph`]. Constant payloads
//! are shared behind an [`Arc`], so every consumer of a weight points at the
//! same buffer.

use std::fmt;
use std::sync::Arc;
use tensor_core::{ArithmeticOp, Conv2dParams, DType, PoolParams, Shape, Tensor, UnaryOp};

/// Index of a node inside its graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Returns the position of this node in insertion order.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// A handle to one result of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeValue {
    pub node: NodeId,
    pub result: usize,
}

impl NodeValue {
    /// The first (and usually only) result of `node`.
    pub fn of(node: NodeId) -> Self {
        Self { node, result: 0 }
    }
}

impl fmt::Display for NodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.result == 0 {
            write!(f, "{}", self.node)
        } else {
            write!(f, "{}.{}", self.node, self.result)
        }
    }
}

/// Element type plus shape of an IR value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ValueType {
    pub dtype: DType,
    pub shape: Shape,
}

impl ValueType {
    pub fn new(dtype: DType, shape: Shape) -> Self {
        Self { dtype, shape }
    }

    /// The type of an existing tensor.
    pub fn of_tensor(tensor: &Tensor) -> Self {
        Self::new(tensor.dtype(), tensor.shape().clone())
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.dtype, self.shape)
    }
}

/// What a `Variable` node stands for.
#[derive(Debug, Clone)]
pub enum VariableKind {
    /// Bound to a caller-supplied tensor at execution time.
    Placeholder,
    /// A weight, shared read-only by every consumer.
    Constant(Arc<Tensor>),
    /// Written by exactly one `Save` node.
    Output,
}

impl VariableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariableKind::Placeholder => "placeholder",
            VariableKind::Constant(_) => "constant",
            VariableKind::Output => "output",
        }
    }
}

/// The closed set of IR primitives.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Variable {
        kind: VariableKind,
        ty: ValueType,
    },
    /// NCHW convolution: input `[N, C, H, W]`, filter `[O, C/group, kh, kw]`.
    Convolution {
        input: NodeValue,
        filter: NodeValue,
        bias: Option<NodeValue>,
        params: Conv2dParams,
    },
    Pool {
        input: NodeValue,
        params: PoolParams,
    },
    /// 2-D matrix product.
    MatMul {
        lhs: NodeValue,
        rhs: NodeValue,
    },
    Transpose {
        input: NodeValue,
        perm: Vec<usize>,
    },
    Reshape {
        input: NodeValue,
        dims: Vec<usize>,
    },
    /// Window of extent `size` starting at `start`.
    Slice {
        input: NodeValue,
        start: Vec<usize>,
        size: Vec<usize>,
    },
    Concat {
        inputs: Vec<NodeValue>,
        axis: usize,
    },
    /// Expands `input` to `dims`, aligning its dims at `axis`.
    Broadcast {
        input: NodeValue,
        axis: usize,
        dims: Vec<usize>,
    },
    /// A tensor of the given type with every element equal to `value`.
    Splat {
        value: f64,
        ty: ValueType,
    },
    IsNaN {
        input: NodeValue,
    },
    Select {
        cond: NodeValue,
        on_true: NodeValue,
        on_false: NodeValue,
    },
    Clip {
        input: NodeValue,
        min: f64,
        max: f64,
    },
    Arithmetic {
        op: ArithmeticOp,
        lhs: NodeValue,
        rhs: NodeValue,
    },
    Unary {
        op: UnaryOp,
        input: NodeValue,
    },
    /// Row-wise softmax over a 2-D input.
    Softmax {
        input: NodeValue,
    },
    /// Copies `input` into the output variable `output`. Produces no value.
    Save {
        input: NodeValue,
        output: NodeId,
    },
}

impl NodeKind {
    /// Returns the node kind's label, as used in summaries.
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Variable { .. } => "Variable",
            NodeKind::Convolution { .. } => "Convolution",
            NodeKind::Pool { .. } => "Pool",
            NodeKind::MatMul { .. } => "MatMul",
            NodeKind::Transpose { .. } => "Transpose",
            NodeKind::Reshape { .. } => "Reshape",
            NodeKind::Slice { .. } => "Slice",
            NodeKind::Concat { .. } => "Concat",
            NodeKind::Broadcast { .. } => "Broadcast",
            NodeKind::Splat { .. } => "Splat",
            NodeKind::IsNaN { .. } => "IsNaN",
            NodeKind::Select { .. } => "Select",
            NodeKind::Clip { .. } => "Clip",
            NodeKind::Arithmetic { .. } => "Arithmetic",
            NodeKind::Unary { .. } => "Unary",
            NodeKind::Softmax { .. } => "Softmax",
            NodeKind::Save { .. } => "Save",
        }
    }

    /// Returns every value this node reads, in operand order.
    ///
    /// The output variable of a `Save` is a write target, not an operand.
    pub fn operands(&self) -> Vec<NodeValue> {
        match self {
            NodeKind::Variable { .. } | NodeKind::Splat { .. } => vec![],
            NodeKind::Convolution {
                input,
                filter,
                bias,
                ..
            } => {
                let mut ops = vec![*input, *filter];
                ops.extend(bias.iter().copied());
                ops
            }
            NodeKind::MatMul { lhs, rhs } | NodeKind::Arithmetic { lhs, rhs, .. } => {
                vec![*lhs, *rhs]
            }
            NodeKind::Concat { inputs, .. } => inputs.clone(),
            NodeKind::Select {
                cond,
                on_true,
                on_false,
            } => vec![*cond, *on_true, *on_false],
            NodeKind::Pool { input, .. }
            | NodeKind::Transpose { input, .. }
            | NodeKind::Reshape { input, .. }
            | NodeKind::Slice { input, .. }
            | NodeKind::Broadcast { input, .. }
            | NodeKind::IsNaN { input }
            | NodeKind::Clip { input, .. }
            | NodeKind::Unary { input, .. }
            | NodeKind::Softmax { input }
            | NodeKind::Save { input, .. } => vec![*input],
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, NodeKind::Variable { .. })
    }
}

/// A named node and the types of the values it produces.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub results: Vec<ValueType>,
}

impl Node {
    /// Returns the variable kind when this node is a `Variable`.
    pub fn variable_kind(&self) -> Option<&VariableKind> {
        match &self.kind {
            NodeKind::Variable { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// One-line description used by graph summaries.
    pub fn summary(&self) -> String {
        let operands: Vec<String> = self.kind.operands().iter().map(|v| v.to_string()).collect();
        let kind = match &self.kind {
            NodeKind::Variable { kind, .. } => format!("Variable<{}>", kind.as_str()),
            NodeKind::Arithmetic { op, .. } => format!("Arithmetic<{}>", op.as_str()),
            NodeKind::Unary { op, .. } => format!("Unary<{}>", op.as_str()),
            other => other.label().to_string(),
        };
        let results: Vec<String> = self.results.iter().map(|t| t.to_string()).collect();
        format!(
            "{:<22} {:<18} ({}) -> {}",
            self.name,
            kind,
            operands.join(", "),
            if results.is_empty() {
                "()".to_string()
            } else {
                results.join(", ")
            }
        )
    }
}
