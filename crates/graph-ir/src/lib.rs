// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # graph-ir
//!
//! The typed intermediate representation the Caffe2 importer lowers into.
//!
//! - [`Graph`] — an arena of [`Node`]s in insertion order, with a
//!   **type-state pattern** (`Building` → `Verified`).
//! - [`NodeKind`] — the closed set of IR primitives. Every external operator
//!   is expressed with these, possibly as a small subgraph.
//! - [`NodeValue`] — a handle to one result of one node; its [`ValueType`]
//!   is always queried from the graph.
//!
//! Every `create_*` builder checks operand types and computes the result
//! type eagerly, so an ill-typed graph cannot be constructed.
//!
//! # Example
//! ```
//! use graph_ir::Graph;
//! use tensor_core::{DType, Shape};
//!
//! let mut graph = Graph::new("demo");
//! let x = graph.create_placeholder("x", DType::F32, Shape::matrix(2, 3)).unwrap();
//! let t = graph.create_transpose("x_t", x, vec![1, 0]).unwrap();
//! graph.create_save("y", t).unwrap();
//!
//! let verified = graph.verify().unwrap();
//! assert_eq!(verified.count_nodes(), 2); // Transpose + Save
//! ```

mod error;
pub mod graph;
mod node;
pub mod shape_infer;

pub use error::GraphError;
pub use graph::{Building, Checkpoint, Graph, GraphState, Verified};
pub use node::{Node, NodeId, NodeKind, NodeValue, ValueType, VariableKind};
