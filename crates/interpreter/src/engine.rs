// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The execution engine with a type-state–enforced pipeline.
//!
//! ```text
//! ExecutionEngine<Idle>
//!     │  .load_model()        (or ExecutionEngine::from_graph)
//!     ▼
//! ExecutionEngine<Loaded>
//!     │  .prepare()
//!     ▼
//! ExecutionEngine<Ready>
//!     │  .run(&bindings)
//!     ▼
//!   ExecutionOutput
//! ```
//!
//! Each state transition consumes the old value and returns a new one,
//! making invalid state sequences a compile error. The data a state needs
//! lives in the state itself, so no accessor has to assume a field is set.

use crate::{Bindings, ExecutionMetrics, RuntimeConfig, RuntimeError};
use caffe2_loader::Caffe2ModelLoader;
use graph_ir::{Graph, Node, NodeKind, NodeValue, ValueType, Verified, VariableKind};
use std::sync::Arc;
use std::time::Instant;
use tensor_core::{ops, Tensor, TensorError};

// ── Type-state markers ─────────────────────────────────────────

/// Engine is created but no model is loaded.
#[derive(Debug)]
pub struct Idle;

/// A verified graph is loaded.
#[derive(Debug)]
pub struct Loaded {
    graph: Graph<Verified>,
}

/// Every value has a buffer and the graph can be run repeatedly.
#[derive(Debug)]
pub struct Ready {
    graph: Graph<Verified>,
    /// One buffer per node, indexed by node position.
    slots: Vec<Buffer>,
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Idle {}
    impl Sealed for super::Loaded {}
    impl Sealed for super::Ready {}
}

/// Sealed trait for engine states.
pub trait EngineState: sealed::Sealed + std::fmt::Debug {}
impl EngineState for Idle {}
impl EngineState for Loaded {}
impl EngineState for Ready {}

// ── Buffers ────────────────────────────────────────────────────

/// Storage behind one node's result.
#[derive(Debug)]
enum Buffer {
    /// The node produces no value (`Save`).
    Empty,
    /// Written by the node (or by binding, for placeholders).
    Owned(Tensor),
    /// A constant, shared with the graph.
    Shared(Arc<Tensor>),
}

impl Buffer {
    fn tensor(&self) -> Option<&Tensor> {
        match self {
            Buffer::Empty => None,
            Buffer::Owned(t) => Some(t),
            Buffer::Shared(t) => Some(t),
        }
    }

    fn owned_bytes(&self) -> usize {
        match self {
            Buffer::Owned(t) => t.size_bytes(),
            _ => 0,
        }
    }
}

// ── Execution output ───────────────────────────────────────────

/// The result of a single run.
#[derive(Debug)]
pub struct ExecutionOutput {
    /// Output variables in creation order.
    pub outputs: Vec<(String, Tensor)>,
    pub metrics: ExecutionMetrics,
}

impl ExecutionOutput {
    /// Returns the output named `name`.
    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.outputs.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }
}

// ── Engine ─────────────────────────────────────────────────────

/// The graph interpreter.
///
/// Generic over `S` (the current state), enforcing at compile time that
/// operations are called in the correct order.
pub struct ExecutionEngine<S: EngineState> {
    config: RuntimeConfig,
    state: S,
}

// ── Idle state ─────────────────────────────────────────────────

impl ExecutionEngine<Idle> {
    /// Creates a new engine with the given configuration.
    pub fn new(config: RuntimeConfig) -> Self {
        tracing::info!(
            predict_net = %config.predict_net.display(),
            init_net = %config.init_net.display(),
            "creating execution engine"
        );
        Self { config, state: Idle }
    }

    /// Imports both nets with the configured inputs and verifies the graph.
    ///
    /// Transitions: `Idle → Loaded`.
    pub fn load_model(self) -> Result<ExecutionEngine<Loaded>, RuntimeError> {
        let inputs = self.config.input_tensors()?;
        let names: Vec<&str> = inputs.iter().map(|(n, _)| n.as_str()).collect();
        let tensors: Vec<&Tensor> = inputs.iter().map(|(_, t)| t).collect();

        let graph_name = self
            .config
            .predict_net
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "caffe2".to_string());
        let mut graph = Graph::new(graph_name);
        let loader = Caffe2ModelLoader::from_files(
            &self.config.predict_net,
            &self.config.init_net,
            &names,
            &tensors,
            &mut graph,
        )?;
        tracing::info!(outputs = loader.outputs().len(), "model imported");

        let graph = graph.verify()?;
        Ok(ExecutionEngine {
            config: self.config,
            state: Loaded { graph },
        })
    }
}

// ── Loaded state ───────────────────────────────────────────────

impl ExecutionEngine<Loaded> {
    /// Wraps an already verified graph.
    pub fn from_graph(config: RuntimeConfig, graph: Graph<Verified>) -> Self {
        Self {
            config,
            state: Loaded { graph },
        }
    }

    pub fn graph(&self) -> &Graph<Verified> {
        &self.state.graph
    }

    /// Allocates one buffer per produced value.
    ///
    /// Constants share the graph's payload; every other value gets a zeroed
    /// tensor of its static type that runs overwrite in place.
    ///
    /// Transitions: `Loaded → Ready`.
    pub fn prepare(self) -> Result<ExecutionEngine<Ready>, RuntimeError> {
        let graph = self.state.graph;
        let slots: Vec<Buffer> = graph
            .nodes()
            .iter()
            .map(|node| match (&node.kind, node.results.first()) {
                (
                    NodeKind::Variable {
                        kind: VariableKind::Constant(tensor),
                        ..
                    },
                    _,
                ) => Buffer::Shared(Arc::clone(tensor)),
                (_, Some(ty)) => Buffer::Owned(Tensor::zeros(ty.shape.clone(), ty.dtype)),
                (_, None) => Buffer::Empty,
            })
            .collect();

        let allocated_kb = slots.iter().map(Buffer::owned_bytes).sum::<usize>() as f64 / 1024.0;
        tracing::info!(
            graph = %graph.name(),
            buffers = slots.len(),
            allocated_kb,
            "engine prepared"
        );

        Ok(ExecutionEngine {
            config: self.config,
            state: Ready { graph, slots },
        })
    }
}

// ── Ready state ────────────────────────────────────────────────

impl ExecutionEngine<Ready> {
    pub fn graph(&self) -> &Graph<Verified> {
        &self.state.graph
    }

    /// Bytes held by buffers this engine owns (constants excluded).
    pub fn allocated_bytes(&self) -> usize {
        self.state.slots.iter().map(Buffer::owned_bytes).sum()
    }

    /// Runs the graph once with the configured inputs.
    pub fn run_configured(&mut self) -> Result<ExecutionOutput, RuntimeError> {
        let bindings = self.config.bindings()?;
        self.run(&bindings)
    }

    /// Binds every placeholder, executes the nodes in order and returns the
    /// output variables.
    ///
    /// Every placeholder must be bound to a tensor of exactly its type.
    pub fn run(&mut self, bindings: &Bindings) -> Result<ExecutionOutput, RuntimeError> {
        let run_start = Instant::now();
        let detailed = self.config.enable_profiling;
        let Ready { graph, slots } = &mut self.state;

        bind_placeholders(graph, slots, bindings)?;

        let mut metrics = ExecutionMetrics::new();
        for (i, node) in graph.nodes().iter().enumerate() {
            if node.kind.is_variable() {
                continue;
            }
            let node_start = Instant::now();
            let (before, rest) = slots.split_at_mut(i);
            let written = execute(node, before, &mut rest[0]).map_err(|source| {
                RuntimeError::Execution {
                    node: node.name.clone(),
                    source,
                }
            })?;
            metrics.record_node(
                &node.name,
                node.kind.label(),
                node_start.elapsed(),
                written,
                detailed,
            );
        }

        let outputs: Vec<(String, Tensor)> = graph
            .outputs()
            .filter_map(|(id, node)| {
                slots[id.index()]
                    .tensor()
                    .map(|t| (node.name.clone(), t.clone()))
            })
            .collect();

        metrics.finalise(run_start.elapsed());
        tracing::info!("{}", metrics.summary());
        Ok(ExecutionOutput { outputs, metrics })
    }
}

// ── Execution ──────────────────────────────────────────────────

fn bind_placeholders(
    graph: &Graph<Verified>,
    slots: &mut [Buffer],
    bindings: &Bindings,
) -> Result<(), RuntimeError> {
    for name in bindings.names() {
        if graph.find_variable(name).is_none() {
            tracing::warn!(binding = name, "binding does not name a placeholder; ignored");
        }
    }

    for (id, node) in graph.placeholders() {
        let tensor = bindings.get(&node.name).ok_or_else(|| RuntimeError::Binding {
            name: node.name.clone(),
            detail: "no tensor bound".into(),
        })?;
        let bound = ValueType::of_tensor(tensor);
        if node.results.first() != Some(&bound) {
            let expected = node
                .results
                .first()
                .map(|ty| ty.to_string())
                .unwrap_or_default();
            return Err(RuntimeError::Binding {
                name: node.name.clone(),
                detail: format!("expected {expected}, got {bound}"),
            });
        }
        slots[id.index()] = Buffer::Owned(tensor.clone());
    }
    Ok(())
}

fn read(slots: &[Buffer], value: NodeValue) -> Result<&Tensor, TensorError> {
    slots
        .get(value.node.index())
        .and_then(Buffer::tensor)
        .ok_or_else(|| TensorError::InvalidArgument {
            op: "read",
            detail: format!("value {value} is not available"),
        })
}

/// Executes one non-variable node, returning the bytes it wrote.
///
/// `before` holds the buffers of every earlier node; `slot` is the node's
/// own buffer.
fn execute(node: &Node, before: &mut [Buffer], slot: &mut Buffer) -> Result<usize, TensorError> {
    if let NodeKind::Save { input, output } = &node.kind {
        let value = read(before, *input)?.clone();
        let bytes = value.size_bytes();
        let target = before
            .get_mut(output.index())
            .ok_or_else(|| TensorError::InvalidArgument {
                op: "save",
                detail: format!("output {output} is not defined before its save"),
            })?;
        *target = Buffer::Owned(value);
        return Ok(bytes);
    }

    let Buffer::Owned(out) = slot else {
        return Err(TensorError::InvalidArgument {
            op: node.kind.label(),
            detail: format!("node '{}' has no output buffer", node.name),
        });
    };
    let before: &[Buffer] = before;
    let arg = |v: &NodeValue| read(before, *v);

    match &node.kind {
        NodeKind::Convolution {
            input,
            filter,
            bias,
            params,
        } => {
            let bias = bias.as_ref().map(arg).transpose()?;
            ops::conv2d(arg(input)?, arg(filter)?, bias, params, out)?;
        }
        NodeKind::Pool { input, params } => ops::pool2d(arg(input)?, params, out)?,
        NodeKind::MatMul { lhs, rhs } => ops::matmul(arg(lhs)?, arg(rhs)?, out)?,
        NodeKind::Transpose { input, perm } => ops::transpose(arg(input)?, perm, out)?,
        NodeKind::Reshape { input, .. } => ops::reshape(arg(input)?, out)?,
        NodeKind::Slice { input, start, .. } => ops::slice(arg(input)?, start, out)?,
        NodeKind::Concat { inputs, axis } => {
            let tensors = inputs.iter().map(arg).collect::<Result<Vec<_>, _>>()?;
            ops::concat(&tensors, *axis, out)?;
        }
        NodeKind::Broadcast { input, axis, .. } => ops::broadcast(arg(input)?, *axis, out)?,
        NodeKind::Splat { value, .. } => ops::splat(*value, out),
        NodeKind::IsNaN { input } => ops::is_nan(arg(input)?, out)?,
        NodeKind::Select {
            cond,
            on_true,
            on_false,
        } => ops::select(arg(cond)?, arg(on_true)?, arg(on_false)?, out)?,
        NodeKind::Clip { input, min, max } => ops::clip(arg(input)?, *min, *max, out)?,
        NodeKind::Arithmetic { op, lhs, rhs } => ops::arithmetic(*op, arg(lhs)?, arg(rhs)?, out)?,
        NodeKind::Unary { op, input } => ops::unary(*op, arg(input)?, out)?,
        NodeKind::Softmax { input } => ops::softmax(arg(input)?, out)?,
        NodeKind::Variable { .. } | NodeKind::Save { .. } => {}
    }
    Ok(out.size_bytes())
}

impl<S: EngineState> std::fmt::Debug for ExecutionEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("state", &std::any::type_name::<S>())
            .field("predict_net", &self.config.predict_net)
            .field("profiling", &self.config.enable_profiling)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_core::{ArithmeticOp, DType, Shape, UnaryOp};

    fn x_placeholder(graph: &mut Graph) -> NodeValue {
        graph
            .create_placeholder("x", DType::F32, Shape::matrix(2, 2))
            .unwrap()
    }

    fn ready(graph: Graph) -> ExecutionEngine<Ready> {
        ExecutionEngine::from_graph(RuntimeConfig::default(), graph.verify().unwrap())
            .prepare()
            .unwrap()
    }

    fn x(values: &[f32]) -> Bindings {
        Bindings::new().with("x", Tensor::from_f32(Shape::matrix(2, 2), values).unwrap())
    }

    #[test]
    fn test_clip_graph() {
        let mut graph = Graph::new("clip");
        let input = x_placeholder(&mut graph);
        let clipped = graph.create_clip("clip", input, 0.0, 1.0).unwrap();
        graph.create_save("y", clipped).unwrap();

        let mut engine = ready(graph);
        let out = engine.run(&x(&[-2.0, 0.5, 1.0, 3.0])).unwrap();
        assert_eq!(out.get("y").unwrap().as_f32_slice(), &[0.0, 0.5, 1.0, 1.0]);
        assert_eq!(out.metrics.nodes_executed, 2);
        assert_eq!(out.metrics.node_metrics.len(), 2);
    }

    #[test]
    fn test_constants_are_shared() {
        let mut graph = Graph::new("add");
        let input = x_placeholder(&mut graph);
        let bias = Arc::new(Tensor::from_f32(Shape::matrix(2, 2), &[10.0; 4]).unwrap());
        let c = graph.create_constant("bias", Arc::clone(&bias)).unwrap();
        let sum = graph
            .create_arithmetic("add", ArithmeticOp::Add, input, c)
            .unwrap();
        let relu = graph.create_unary("relu", UnaryOp::Relu, sum).unwrap();
        graph.create_save("y", relu).unwrap();

        let mut engine = ready(graph);
        // Held by the test, the graph and the engine's buffer.
        assert_eq!(Arc::strong_count(&bias), 3);
        let out = engine.run(&x(&[-20.0, 1.0, 2.0, 3.0])).unwrap();
        assert_eq!(out.get("y").unwrap().as_f32_slice(), &[0.0, 11.0, 12.0, 13.0]);
    }

    #[test]
    fn test_runs_are_independent() {
        let mut graph = Graph::new("t");
        let input = x_placeholder(&mut graph);
        let t = graph.create_transpose("t", input, vec![1, 0]).unwrap();
        graph.create_save("y", t).unwrap();

        let mut engine = ready(graph);
        let first = engine.run(&x(&[1.0, 2.0, 3.0, 4.0])).unwrap();
        let second = engine.run(&x(&[5.0, 6.0, 7.0, 8.0])).unwrap();
        assert_eq!(first.get("y").unwrap().as_f32_slice(), &[1.0, 3.0, 2.0, 4.0]);
        assert_eq!(second.get("y").unwrap().as_f32_slice(), &[5.0, 7.0, 6.0, 8.0]);
    }

    #[test]
    fn test_missing_binding() {
        let mut graph = Graph::new("g");
        let input = x_placeholder(&mut graph);
        graph.create_save("y", input).unwrap();

        let mut engine = ready(graph);
        let err = engine.run(&Bindings::new()).unwrap_err();
        assert!(matches!(err, RuntimeError::Binding { ref name, .. } if name == "x"));
    }

    #[test]
    fn test_binding_type_is_checked() {
        let mut graph = Graph::new("g");
        let input = x_placeholder(&mut graph);
        graph.create_save("y", input).unwrap();

        let mut engine = ready(graph);
        let wrong_shape = Bindings::new().with("x", Tensor::zeros(Shape::vector(4), DType::F32));
        let err = engine.run(&wrong_shape).unwrap_err();
        match err {
            RuntimeError::Binding { detail, .. } => {
                assert!(detail.contains("f32[2, 2]"), "{detail}")
            }
            other => panic!("unexpected error: {other}"),
        }

        let wrong_dtype =
            Bindings::new().with("x", Tensor::zeros(Shape::matrix(2, 2), DType::I32));
        assert!(matches!(
            engine.run(&wrong_dtype),
            Err(RuntimeError::Binding { .. })
        ));
    }

    #[test]
    fn test_profiling_disabled_keeps_aggregates() {
        let mut graph = Graph::new("g");
        let input = x_placeholder(&mut graph);
        graph.create_save("y", input).unwrap();

        let config = RuntimeConfig {
            enable_profiling: false,
            ..RuntimeConfig::default()
        };
        let mut engine = ExecutionEngine::from_graph(config, graph.verify().unwrap())
            .prepare()
            .unwrap();
        let out = engine.run(&x(&[0.0; 4])).unwrap();
        assert_eq!(out.metrics.nodes_executed, 1);
        assert!(out.metrics.node_metrics.is_empty());
    }

    #[test]
    fn test_allocated_bytes_excludes_constants() {
        let mut graph = Graph::new("g");
        let c = graph
            .create_constant("c", Arc::new(Tensor::zeros(Shape::vector(100), DType::F32)))
            .unwrap();
        graph.create_save("y", c).unwrap();
        let engine = ready(graph);
        // Only the output variable owns storage.
        assert_eq!(engine.allocated_bytes(), 400);
    }

    #[test]
    fn test_debug_shows_state() {
        let engine = ExecutionEngine::new(RuntimeConfig::default());
        assert!(format!("{engine:?}").contains("Idle"));
    }

    #[test]
    fn test_load_model_missing_files() {
        let config = RuntimeConfig {
            predict_net: "/nonexistent/predict_net.pb".into(),
            init_net: "/nonexistent/init_net.pb".into(),
            ..RuntimeConfig::default()
        };
        let err = ExecutionEngine::new(config).load_model().unwrap_err();
        assert!(matches!(err, RuntimeError::Load(_)));
    }
}
