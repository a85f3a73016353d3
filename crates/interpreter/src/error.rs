// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for graph execution.

/// Errors that can occur while loading, preparing or running a graph.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Model import failed.
    #[error("model load failed: {0}")]
    Load(#[from] caffe2_loader::LoadError),

    /// The imported graph failed verification.
    #[error("graph verification failed: {0}")]
    Graph(#[from] graph_ir::GraphError),

    /// A placeholder has no binding, or the bound tensor has the wrong type.
    #[error("binding error for '{name}': {detail}")]
    Binding { name: String, detail: String },

    /// A kernel failed while executing a node.
    #[error("execution error in node '{node}': {source}")]
    Execution {
        node: String,
        #[source]
        source: tensor_core::TensorError,
    },
}
