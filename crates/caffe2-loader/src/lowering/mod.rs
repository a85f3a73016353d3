// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operator lowering.
//!
//! [`OpKind`] is parsed from an operator's type string and its exhaustive
//! [`OpKind::handler`] match is the dispatch table. A handler reads the
//! operator's arguments, resolves its inputs through the [`Environment`],
//! builds one or more IR nodes and binds each produced value to the
//! operator's declared output name.
//!
//! Handlers are plain functions over an [`OperatorRecord`] and a
//! [`Lowering`] context, so they can be exercised without any wire format.

mod conv;
mod elementwise;
mod matmul;
mod tensor;

use crate::environment::Environment;
use crate::record::OperatorRecord;
use crate::weights::WeightTable;
use crate::LoadError;
use graph_ir::{Graph, GraphError, NodeValue, ValueType, VariableKind};
use std::sync::Arc;
use tensor_core::Tensor;

/// Signature shared by every lowering.
pub type Handler = fn(&OperatorRecord, &mut Lowering<'_>) -> Result<(), LoadError>;

/// Predict-net operators with a lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Conv,
    MaxPool,
    AveragePool,
    Concat,
    BatchMatMul,
    MatMul,
    FC,
    FCTransposed,
    Clip,
    ReplaceNaN,
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
    Add,
    Sub,
    Mul,
    Div,
    Sum,
    Transpose,
    Reshape,
    Flatten,
    Dropout,
}

impl OpKind {
    /// Parses a Caffe2 operator type string.
    pub fn parse(kind: &str) -> Option<Self> {
        let op = match kind {
            "Conv" | "Conv2D" => OpKind::Conv,
            "MaxPool" | "MaxPool2D" => OpKind::MaxPool,
            "AveragePool" | "AveragePool2D" => OpKind::AveragePool,
            "Concat" => OpKind::Concat,
            "BatchMatMul" => OpKind::BatchMatMul,
            "MatMul" => OpKind::MatMul,
            "FC" => OpKind::FC,
            "FCTransposed" => OpKind::FCTransposed,
            "Clip" => OpKind::Clip,
            "ReplaceNaN" => OpKind::ReplaceNaN,
            "Relu" => OpKind::Relu,
            "Sigmoid" => OpKind::Sigmoid,
            "Tanh" => OpKind::Tanh,
            "Softmax" => OpKind::Softmax,
            "Add" => OpKind::Add,
            "Sub" => OpKind::Sub,
            "Mul" => OpKind::Mul,
            "Div" => OpKind::Div,
            "Sum" => OpKind::Sum,
            "Transpose" => OpKind::Transpose,
            "Reshape" => OpKind::Reshape,
            "Flatten" => OpKind::Flatten,
            "Dropout" => OpKind::Dropout,
            _ => return None,
        };
        Some(op)
    }

    /// The lowering for this operator kind.
    pub fn handler(self) -> Handler {
        match self {
            OpKind::Conv => conv::lower_conv,
            OpKind::MaxPool => conv::lower_max_pool,
            OpKind::AveragePool => conv::lower_average_pool,
            OpKind::Concat => tensor::lower_concat,
            OpKind::BatchMatMul => matmul::lower_batch_matmul,
            OpKind::MatMul => matmul::lower_matmul,
            OpKind::FC => matmul::lower_fc,
            OpKind::FCTransposed => matmul::lower_fc_transposed,
            OpKind::Clip => elementwise::lower_clip,
            OpKind::ReplaceNaN => elementwise::lower_replace_nan,
            OpKind::Relu => elementwise::lower_relu,
            OpKind::Sigmoid => elementwise::lower_sigmoid,
            OpKind::Tanh => elementwise::lower_tanh,
            OpKind::Softmax => elementwise::lower_softmax,
            OpKind::Add => elementwise::lower_add,
            OpKind::Sub => elementwise::lower_sub,
            OpKind::Mul => elementwise::lower_mul,
            OpKind::Div => elementwise::lower_div,
            OpKind::Sum => elementwise::lower_sum,
            OpKind::Transpose => tensor::lower_transpose,
            OpKind::Reshape => tensor::lower_reshape,
            OpKind::Flatten => tensor::lower_flatten,
            OpKind::Dropout => tensor::lower_dropout,
        }
    }
}

/// Lowers one operator into `ctx`.
pub fn lower(op: &OperatorRecord, ctx: &mut Lowering<'_>) -> Result<(), LoadError> {
    let kind = OpKind::parse(&op.kind).ok_or_else(|| LoadError::UnsupportedOperator {
        kind: op.kind.clone(),
    })?;
    let before = ctx.graph.nodes().len();
    (kind.handler())(op, ctx)?;
    tracing::debug!(
        op = op.label(),
        kind = %op.kind,
        nodes = ctx.graph.nodes().len() - before,
        "lowered operator"
    );
    Ok(())
}

/// Mutable state one load threads through every handler.
pub struct Lowering<'a> {
    pub graph: &'a mut Graph,
    pub env: &'a mut Environment,
    pub weights: &'a WeightTable,
}

impl<'a> Lowering<'a> {
    pub fn new(graph: &'a mut Graph, env: &'a mut Environment, weights: &'a WeightTable) -> Self {
        Self {
            graph,
            env,
            weights,
        }
    }

    /// Resolves input `index` of `op`.
    pub fn input(&self, op: &OperatorRecord, index: usize) -> Result<NodeValue, LoadError> {
        let name = op.inputs.get(index).ok_or_else(|| {
            LoadError::malformed(
                op.label(),
                "input",
                format!("expected at least {} inputs, got {}", index + 1, op.inputs.len()),
            )
        })?;
        self.env.resolve(op.label(), name)
    }

    /// Resolves input `index` when the operator declares it.
    pub fn optional_input(
        &self,
        op: &OperatorRecord,
        index: usize,
    ) -> Result<Option<NodeValue>, LoadError> {
        if index < op.inputs.len() {
            self.input(op, index).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Resolves every input of `op`, requiring at least `min` of them.
    pub fn inputs(&self, op: &OperatorRecord, min: usize) -> Result<Vec<NodeValue>, LoadError> {
        if op.inputs.len() < min {
            return Err(LoadError::malformed(
                op.label(),
                "input",
                format!("expected at least {min} inputs, got {}", op.inputs.len()),
            ));
        }
        (0..op.inputs.len()).map(|i| self.input(op, i)).collect()
    }

    /// Returns the type of `value`.
    pub fn ty(&self, op: &OperatorRecord, value: NodeValue) -> Result<ValueType, LoadError> {
        self.graph
            .value_type(value)
            .cloned()
            .map_err(|e| LoadError::from_graph(op.label(), e))
    }

    /// Binds output `index` of `op` to `value`.
    pub fn bind_output(
        &mut self,
        op: &OperatorRecord,
        index: usize,
        value: NodeValue,
    ) -> Result<(), LoadError> {
        let name = op.outputs.get(index).ok_or_else(|| {
            LoadError::malformed(
                op.label(),
                "output",
                format!("expected at least {} outputs, got {}", index + 1, op.outputs.len()),
            )
        })?;
        self.env.bind(name, value)
    }

    /// Returns the constant payload behind `value`, if it is a weight.
    pub fn constant(&self, value: NodeValue) -> Option<Arc<Tensor>> {
        match self.graph.node(value.node)?.variable_kind()? {
            VariableKind::Constant(t) => Some(Arc::clone(t)),
            _ => None,
        }
    }

    /// Creates a constant for an auxiliary operator output and binds it.
    ///
    /// The constant gets an internal name so the declared output name stays
    /// free for the `Save` of an external output.
    pub fn bind_constant_output(
        &mut self,
        op: &OperatorRecord,
        index: usize,
        tensor: Tensor,
    ) -> Result<(), LoadError> {
        let Some(name) = op.outputs.get(index) else {
            return Ok(());
        };
        let value = self
            .graph
            .create_constant(Self::node_name(op, name), Arc::new(tensor))
            .map_err(|e| match e {
                GraphError::DuplicateName { name } => LoadError::NameConflict { name },
                other => LoadError::from_graph(op.label(), other),
            })?;
        self.env.bind(name, value)
    }

    /// Name for the `suffix` node of `op`.
    pub fn node_name(op: &OperatorRecord, suffix: &str) -> String {
        format!("{}.{}", op.label(), suffix)
    }
}

/// Maps a builder result into a load result attributed to `op`.
pub(crate) fn built<T>(op: &OperatorRecord, result: Result<T, GraphError>) -> Result<T, LoadError> {
    result.map_err(|e| LoadError::from_graph(op.label(), e))
}

/// Dims of `value`, owned so the graph can be mutated afterwards.
pub(crate) fn dims_of(
    op: &OperatorRecord,
    ctx: &Lowering<'_>,
    value: NodeValue,
) -> Result<Vec<usize>, LoadError> {
    Ok(ctx.ty(op, value)?.dims().to_vec())
}

/// Reshapes `value` to `dims`, or returns it unchanged when it already has
/// them.
pub(crate) fn reshape_to(
    op: &OperatorRecord,
    ctx: &mut Lowering<'_>,
    value: NodeValue,
    dims: Vec<usize>,
    suffix: &str,
) -> Result<NodeValue, LoadError> {
    if dims_of(op, ctx, value)? == dims {
        return Ok(value);
    }
    built(
        op,
        ctx.graph
            .create_reshape(Lowering::node_name(op, suffix), value, dims),
    )
}

/// Resolves a possibly negative axis against `rank`.
pub(crate) fn canonical_axis(
    op: &OperatorRecord,
    arg: &str,
    axis: i64,
    rank: usize,
) -> Result<usize, LoadError> {
    let resolved = if axis < 0 { axis + rank as i64 } else { axis };
    if resolved < 0 || resolved as usize >= rank {
        return Err(LoadError::malformed(
            op.label(),
            arg,
            format!("axis {axis} out of range for rank {rank}"),
        ));
    }
    Ok(resolved as usize)
}


#[cfg(test)]
mod tests {
    use super::test_util::Fixture;
    use super::*;

    #[test]
    fn test_parse_known_and_unknown() {
        assert_eq!(OpKind::parse("BatchMatMul"), Some(OpKind::BatchMatMul));
        assert_eq!(OpKind::parse("AveragePool"), Some(OpKind::AveragePool));
        assert_eq!(OpKind::parse("LSTM"), None);
    }

    #[test]
    fn test_unsupported_operator_names_kind() {
        let mut fx = Fixture::new(&[("x", vec![2])]);
        let op = OperatorRecord::new("SpatialBN", &["x"], &["y"]);
        assert!(matches!(
            fx.lower(&op),
            Err(LoadError::UnsupportedOperator { kind }) if kind == "SpatialBN"
        ));
    }

    #[test]
    fn test_missing_input_is_malformed() {
        let mut fx = Fixture::new(&[("x", vec![2])]);
        let op = OperatorRecord::new("Relu", &[], &["y"]);
        assert!(matches!(fx.lower(&op), Err(LoadError::MalformedArgument { .. })));
    }

    #[test]
    fn test_canonical_axis() {
        let op = OperatorRecord::new("Concat", &[], &[]);
        assert_eq!(canonical_axis(&op, "axis", -1, 3).unwrap(), 2);
        assert_eq!(canonical_axis(&op, "axis", 1, 3).unwrap(), 1);
        assert!(canonical_axis(&op, "axis", 3, 3).is_err());
        assert!(canonical_axis(&op, "axis", -4, 3).is_err());
    }
}
