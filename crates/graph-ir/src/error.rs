// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for IR construction and verification.

use crate::NodeValue;
use tensor_core::{DType, TensorError};

/// Errors raised by graph builders and by [`crate::Graph::verify`].
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// An operand refers to a node or result that does not exist.
    #[error("unknown value {value}")]
    UnknownValue { value: NodeValue },

    /// Operand shapes are inconsistent with the node's semantics.
    #[error("shape mismatch in {op}: {detail}")]
    ShapeMismatch { op: &'static str, detail: String },

    /// Operand element types are inconsistent with the node's semantics.
    #[error("type mismatch in {op}: expected {expected}, got {actual}")]
    TypeMismatch {
        op: &'static str,
        expected: DType,
        actual: DType,
    },

    /// A builder parameter is out of range (axis, permutation, stride...).
    #[error("invalid argument for {op}: {detail}")]
    InvalidArgument { op: &'static str, detail: String },

    /// Two variables share a name.
    #[error("duplicate variable name '{name}'")]
    DuplicateName { name: String },

    /// A structural invariant does not hold.
    #[error("verification failed at node '{node}': {detail}")]
    Verification { node: String, detail: String },
}

impl GraphError {
    /// Returns `true` for errors describing bad builder parameters rather
    /// than inconsistent operand shapes or types.
    pub fn is_argument_error(&self) -> bool {
        matches!(
            self,
            GraphError::InvalidArgument { .. } | GraphError::DuplicateName { .. }
        )
    }
}

impl From<TensorError> for GraphError {
    fn from(err: TensorError) -> Self {
        match err {
            TensorError::ShapeMismatch { op, .. } => GraphError::ShapeMismatch {
                op,
                detail: err.to_string(),
            },
            TensorError::BufferSizeMismatch { .. } => GraphError::ShapeMismatch {
                op: "tensor",
                detail: err.to_string(),
            },
            TensorError::UnsupportedDType { op, dtype } => GraphError::TypeMismatch {
                op,
                expected: DType::F32,
                actual: dtype,
            },
            TensorError::DTypeMismatch { op, lhs, rhs } => GraphError::TypeMismatch {
                op,
                expected: lhs,
                actual: rhs,
            },
            TensorError::InvalidArgument { op, detail } => {
                GraphError::InvalidArgument { op, detail }
            }
        }
    }
}
