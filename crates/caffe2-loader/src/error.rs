// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for Caffe2 model import.

use graph_ir::GraphError;

/// Errors that abort a model load.
///
/// Every failure is eager: the load stops at the first error and the target
/// graph is rolled back to its state before the load.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// A name was bound twice (weights, inputs or operator outputs).
    #[error("name '{name}' is already bound")]
    NameConflict { name: String },

    /// An operator consumes a name that no earlier step produced.
    #[error("operator '{op}' reads unbound input '{name}'")]
    UnboundInput { op: String, name: String },

    /// Shapes or element types are inconsistent with an operator's semantics.
    #[error("shape mismatch in '{op}': {detail}")]
    ShapeMismatch { op: String, detail: String },

    /// The operator kind has no lowering.
    #[error("unsupported operator type '{kind}'")]
    UnsupportedOperator { kind: String },

    /// A single output was requested but the net declares `count` outputs.
    #[error("expected exactly one output, the net declares {count}")]
    MultipleOutputs { count: usize },

    /// An argument (or input arity) is invalid for the operator.
    #[error("malformed argument '{arg}' of '{op}': {detail}")]
    MalformedArgument {
        op: String,
        arg: String,
        detail: String,
    },

    /// A net definition file could not be read.
    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The protobuf payload is not a valid `NetDef`.
    #[error("failed to decode protobuf net: {0}")]
    Decode(#[from] prost::DecodeError),

    /// The text payload is not a valid text-format `NetDef`.
    #[error("failed to parse text-format net: {0}")]
    Text(#[from] prost_reflect::text_format::ParseError),

    /// The built-in `caffe2.proto` descriptor was rejected.
    #[error("invalid caffe2 message descriptor: {0}")]
    Descriptor(#[from] prost_reflect::DescriptorError),

    /// A text-format net is not valid UTF-8.
    #[error("text-format net is not UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// The JSON payload is not a valid net definition.
    #[error("failed to parse JSON net: {0}")]
    Json(#[from] serde_json::Error),
}

impl LoadError {
    /// Maps an IR builder failure raised while lowering operator `op`.
    pub(crate) fn from_graph(op: &str, err: GraphError) -> Self {
        if err.is_argument_error() {
            LoadError::MalformedArgument {
                op: op.to_string(),
                arg: "(builder)".to_string(),
                detail: err.to_string(),
            }
        } else {
            LoadError::ShapeMismatch {
                op: op.to_string(),
                detail: err.to_string(),
            }
        }
    }

    pub(crate) fn malformed(op: &str, arg: &str, detail: impl Into<String>) -> Self {
        LoadError::MalformedArgument {
            op: op.to_string(),
            arg: arg.to_string(),
            detail: detail.into(),
        }
    }

    pub(crate) fn shape(op: &str, detail: impl Into<String>) -> Self {
        LoadError::ShapeMismatch {
            op: op.to_string(),
            detail: detail.into(),
        }
    }
}
