// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # interpreter
//!
//! Executes verified `graph-ir` graphs on the CPU with the `tensor-core`
//! kernels, so imported models can be checked numerically.
//!
//! The [`ExecutionEngine`] uses a **type-state pattern**:
//!
//! ```text
//! ExecutionEngine<Idle> ──load_model()──► ExecutionEngine<Loaded>
//!                                                 │
//!                                            prepare()
//!                                                 ▼
//!                                       ExecutionEngine<Ready> ──run()──► ExecutionOutput
//! ```
//!
//! # Example
//! ```
//! use graph_ir::Graph;
//! use interpreter::{Bindings, ExecutionEngine, RuntimeConfig};
//! use tensor_core::{DType, Shape, Tensor};
//!
//! let mut graph = Graph::new("relu");
//! let x = graph.create_placeholder("x", DType::F32, Shape::vector(3)).unwrap();
//! let clipped = graph.create_clip("clip", x, 0.0, f32::MAX as f64).unwrap();
//! graph.create_save("y", clipped).unwrap();
//!
//! let mut engine = ExecutionEngine::from_graph(RuntimeConfig::default(), graph.verify().unwrap())
//!     .prepare()
//!     .unwrap();
//! let bindings = Bindings::new()
//!     .with("x", Tensor::from_f32(Shape::vector(3), &[-1.0, 0.0, 2.0]).unwrap());
//! let out = engine.run(&bindings).unwrap();
//! assert_eq!(out.get("y").unwrap().as_f32_slice(), &[0.0, 0.0, 2.0]);
//! ```

mod bindings;
mod config;
mod engine;
mod error;
mod metrics;

pub use bindings::Bindings;
pub use config::{InputSpec, RuntimeConfig};
pub use engine::{
    EngineState, ExecutionEngine, ExecutionOutput, Idle, Loaded, Ready,
};
pub use error::RuntimeError;
pub use metrics::{ExecutionMetrics, NodeMetrics};
