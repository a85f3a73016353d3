// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # caffe2-loader
//!
//! Imports a Caffe2 model (a predict net plus an init net of weight fills)
//! into a [`graph_ir::Graph`].
//!
//! ```text
//! predict.pb / .json ─┐
//!                     ├─► NetDefinition ─► lowering (per operator) ─► Graph
//! init.pb / .json ────┘        │                    ▲
//!                              └─► WeightTable ─────┘ (one constant per weight)
//! ```
//!
//! Loading is a single forward pass over the predict net. Every operator
//! consumes names bound by earlier steps (caller inputs, weights or earlier
//! operator outputs) and binds its own outputs in the [`Environment`].
//! Operators without a direct IR counterpart are rewritten into an
//! equivalent subgraph; see [`lowering`].
//!
//! ```
//! use caffe2_loader::{Caffe2ModelLoader, NetDefinition};
//! use graph_ir::Graph;
//! use tensor_core::{DType, Shape, Tensor};
//!
//! let predict = NetDefinition::from_json(r#"{
//!     "name": "clip",
//!     "external_output": ["y"],
//!     "op": [{ "type": "Clip", "input": ["x"], "output": ["y"],
//!              "arg": { "min": 20.0, "max": 60.0 } }]
//! }"#).unwrap();
//! let x = Tensor::zeros(Shape::matrix(5, 5), DType::F32);
//!
//! let mut graph = Graph::new("clip");
//! let loader = Caffe2ModelLoader::load(
//!     &predict, &NetDefinition::default(), &["x"], &[&x], &mut graph,
//! ).unwrap();
//! let out = loader.single_output().unwrap();
//! assert_eq!(graph.value_type(out).unwrap().dims(), &[5, 5]);
//! assert_eq!(graph.count_nodes(), 2); // Clip + Save
//! ```

mod args;
mod environment;
mod error;
mod loader;
pub mod lowering;
pub mod proto;
mod record;
mod weights;

pub use environment::Environment;
pub use error::LoadError;
pub use loader::Caffe2ModelLoader;
pub use lowering::{Lowering, OpKind};
pub use record::{ArgValue, NetDefinition, NetFormat, OperatorRecord};
pub use weights::WeightTable;
