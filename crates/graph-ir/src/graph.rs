// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The IR graph container.
//!
//! # Type-State Pattern
//!
//! ```text
//! Graph<Building>   — nodes are being appended by builders.
//!       │  .verify()
//!       ▼
//! Graph<Verified>   — every structural invariant re-checked; executable.
//! ```
//!
//! Builders exist only on `Graph<Building>`, so a verified graph can never
//! be mutated behind the verifier's back.

use crate::shape_infer;
use crate::{GraphError, Node, NodeId, NodeKind, NodeValue, ValueType, VariableKind};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tensor_core::{ArithmeticOp, Conv2dParams, DType, PoolParams, Shape, Tensor, UnaryOp};

// ── Type-state markers ─────────────────────────────────────────────

/// Marker: nodes may still be added.
#[derive(Debug, Clone)]
pub struct Building;

/// Marker: the graph passed [`Graph::verify`].
#[derive(Debug, Clone)]
pub struct Verified;

/// Sealed trait for graph states.
pub trait GraphState: fmt::Debug + Clone {}
impl GraphState for Building {}
impl GraphState for Verified {}

/// A position in a graph's node arena that [`Graph::rollback`] can return to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    len: usize,
}

// ── Graph ──────────────────────────────────────────────────────────

/// An arena of typed nodes in insertion order.
///
/// Operands always refer to earlier nodes, so insertion order is a valid
/// execution order.
#[derive(Debug, Clone)]
pub struct Graph<S: GraphState = Building> {
    name: String,
    nodes: Vec<Node>,
    _state: std::marker::PhantomData<S>,
}

// ── Building state ─────────────────────────────────────────────────

impl Graph<Building> {
    /// Creates an empty graph.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            _state: std::marker::PhantomData,
        }
    }

    /// Type-checks `kind` against the existing nodes and appends it.
    fn push(&mut self, name: impl Into<String>, kind: NodeKind) -> Result<NodeId, GraphError> {
        let name = name.into();
        let results = shape_infer::infer(&kind, &self.nodes)?;
        if kind.is_variable() && self.find_variable(&name).is_some() {
            return Err(GraphError::DuplicateName { name });
        }
        let id = NodeId(self.nodes.len());
        tracing::trace!(%id, name = %name, kind = kind.label(), "node created");
        self.nodes.push(Node {
            name,
            kind,
            results,
        });
        Ok(id)
    }

    fn push_value(
        &mut self,
        name: impl Into<String>,
        kind: NodeKind,
    ) -> Result<NodeValue, GraphError> {
        self.push(name, kind).map(NodeValue::of)
    }

    /// Creates a variable bound to a caller-supplied tensor at execution time.
    pub fn create_placeholder(
        &mut self,
        name: impl Into<String>,
        dtype: DType,
        shape: Shape,
    ) -> Result<NodeValue, GraphError> {
        let kind = NodeKind::Variable {
            kind: VariableKind::Placeholder,
            ty: ValueType::new(dtype, shape),
        };
        self.push_value(name, kind)
    }

    /// Creates a constant variable sharing `tensor`'s payload.
    pub fn create_constant(
        &mut self,
        name: impl Into<String>,
        tensor: Arc<Tensor>,
    ) -> Result<NodeValue, GraphError> {
        let ty = ValueType::of_tensor(&tensor);
        let kind = NodeKind::Variable {
            kind: VariableKind::Constant(tensor),
            ty,
        };
        self.push_value(name, kind)
    }

    pub fn create_convolution(
        &mut self,
        name: impl Into<String>,
        input: NodeValue,
        filter: NodeValue,
        bias: Option<NodeValue>,
        params: Conv2dParams,
    ) -> Result<NodeValue, GraphError> {
        let kind = NodeKind::Convolution {
            input,
            filter,
            bias,
            params,
        };
        self.push_value(name, kind)
    }

    pub fn create_pool(
        &mut self,
        name: impl Into<String>,
        input: NodeValue,
        params: PoolParams,
    ) -> Result<NodeValue, GraphError> {
        self.push_value(name, NodeKind::Pool { input, params })
    }

    pub fn create_matmul(
        &mut self,
        name: impl Into<String>,
        lhs: NodeValue,
        rhs: NodeValue,
    ) -> Result<NodeValue, GraphError> {
        self.push_value(name, NodeKind::MatMul { lhs, rhs })
    }

    pub fn create_transpose(
        &mut self,
        name: impl Into<String>,
        input: NodeValue,
        perm: Vec<usize>,
    ) -> Result<NodeValue, GraphError> {
        self.push_value(name, NodeKind::Transpose { input, perm })
    }

    pub fn create_reshape(
        &mut self,
        name: impl Into<String>,
        input: NodeValue,
        dims: Vec<usize>,
    ) -> Result<NodeValue, GraphError> {
        self.push_value(name, NodeKind::Reshape { input, dims })
    }

    pub fn create_slice(
        &mut self,
        name: impl Into<String>,
        input: NodeValue,
        start: Vec<usize>,
        size: Vec<usize>,
    ) -> Result<NodeValue, GraphError> {
        self.push_value(name, NodeKind::Slice { input, start, size })
    }

    pub fn create_concat(
        &mut self,
        name: impl Into<String>,
        inputs: Vec<NodeValue>,
        axis: usize,
    ) -> Result<NodeValue, GraphError> {
        self.push_value(name, NodeKind::Concat { inputs, axis })
    }

    pub fn create_broadcast(
        &mut self,
        name: impl Into<String>,
        input: NodeValue,
        axis: usize,
        dims: Vec<usize>,
    ) -> Result<NodeValue, GraphError> {
        self.push_value(name, NodeKind::Broadcast { input, axis, dims })
    }

    pub fn create_splat(
        &mut self,
        name: impl Into<String>,
        ty: ValueType,
        value: f64,
    ) -> Result<NodeValue, GraphError> {
        self.push_value(name, NodeKind::Splat { value, ty })
    }

    pub fn create_is_nan(
        &mut self,
        name: impl Into<String>,
        input: NodeValue,
    ) -> Result<NodeValue, GraphError> {
        self.push_value(name, NodeKind::IsNaN { input })
    }

    pub fn create_select(
        &mut self,
        name: impl Into<String>,
        cond: NodeValue,
        on_true: NodeValue,
        on_false: NodeValue,
    ) -> Result<NodeValue, GraphError> {
        let kind = NodeKind::Select {
            cond,
            on_true,
            on_false,
        };
        self.push_value(name, kind)
    }

    pub fn create_clip(
        &mut self,
        name: impl Into<String>,
        input: NodeValue,
        min: f64,
        max: f64,
    ) -> Result<NodeValue, GraphError> {
        self.push_value(name, NodeKind::Clip { input, min, max })
    }

    pub fn create_arithmetic(
        &mut self,
        name: impl Into<String>,
        op: ArithmeticOp,
        lhs: NodeValue,
        rhs: NodeValue,
    ) -> Result<NodeValue, GraphError> {
        self.push_value(name, NodeKind::Arithmetic { op, lhs, rhs })
    }

    pub fn create_unary(
        &mut self,
        name: impl Into<String>,
        op: UnaryOp,
        input: NodeValue,
    ) -> Result<NodeValue, GraphError> {
        self.push_value(name, NodeKind::Unary { op, input })
    }

    pub fn create_softmax(
        &mut self,
        name: impl Into<String>,
        input: NodeValue,
    ) -> Result<NodeValue, GraphError> {
        self.push_value(name, NodeKind::Softmax { input })
    }

    /// Creates an output variable named `name` with `input`'s type, plus the
    /// `Save` node that writes `input` into it.
    ///
    /// Returns the output variable. Either both nodes are added or neither.
    pub fn create_save(
        &mut self,
        name: impl Into<String>,
        input: NodeValue,
    ) -> Result<NodeValue, GraphError> {
        let name = name.into();
        let ty = self.value_type(input)?.clone();
        let checkpoint = self.checkpoint();
        let output = self.push(
            name.clone(),
            NodeKind::Variable {
                kind: VariableKind::Output,
                ty,
            },
        )?;
        if let Err(err) = self.push(format!("save_{name}"), NodeKind::Save { input, output }) {
            self.rollback(checkpoint);
            return Err(err);
        }
        Ok(NodeValue::of(output))
    }

    /// Records the current arena length.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            len: self.nodes.len(),
        }
    }

    /// Removes every node added after `checkpoint`.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        if checkpoint.len < self.nodes.len() {
            tracing::debug!(
                removed = self.nodes.len() - checkpoint.len,
                graph = %self.name,
                "rolling back graph"
            );
            self.nodes.truncate(checkpoint.len);
        }
    }

    /// Re-checks every structural invariant and transitions to `Verified`.
    ///
    /// # Checks
    /// - Every node's operands are defined before it and its result types
    ///   re-derive from them.
    /// - Variable names are unique.
    /// - Every output variable is written by exactly one `Save`.
    pub fn verify(self) -> Result<Graph<Verified>, GraphError> {
        self.check_invariants()?;
        tracing::debug!(graph = %self.name, nodes = self.nodes.len(), "graph verified");
        Ok(Graph {
            name: self.name,
            nodes: self.nodes,
            _state: std::marker::PhantomData,
        })
    }

    fn check_invariants(&self) -> Result<(), GraphError> {
        let mut variable_names = HashSet::new();
        let mut writers: HashMap<NodeId, usize> = HashMap::new();

        for (i, node) in self.nodes.iter().enumerate() {
            let derived = shape_infer::infer(&node.kind, &self.nodes[..i]).map_err(|err| {
                GraphError::Verification {
                    node: node.name.clone(),
                    detail: err.to_string(),
                }
            })?;
            if derived != node.results {
                return Err(GraphError::Verification {
                    node: node.name.clone(),
                    detail: "recorded result types do not match operands".into(),
                });
            }
            match &node.kind {
                NodeKind::Variable { .. } => {
                    if !variable_names.insert(node.name.as_str()) {
                        return Err(GraphError::DuplicateName {
                            name: node.name.clone(),
                        });
                    }
                }
                NodeKind::Save { output, .. } => *writers.entry(*output).or_default() += 1,
                _ => {}
            }
        }

        for (id, node) in self.variables() {
            if let Some(VariableKind::Output) = node.variable_kind() {
                let count = writers.get(&id).copied().unwrap_or(0);
                if count != 1 {
                    return Err(GraphError::Verification {
                        node: node.name.clone(),
                        detail: format!("output written by {count} save nodes"),
                    });
                }
            }
        }
        Ok(())
    }
}

// ── Verified state ─────────────────────────────────────────────────

impl Graph<Verified> {
    /// Returns the placeholders in creation order.
    pub fn placeholders(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.variables()
            .filter(|(_, n)| matches!(n.variable_kind(), Some(VariableKind::Placeholder)))
    }

    /// Returns the output variables in creation order.
    pub fn outputs(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.variables()
            .filter(|(_, n)| matches!(n.variable_kind(), Some(VariableKind::Output)))
    }
}

// ── Shared implementations ─────────────────────────────────────────

impl<S: GraphState> Graph<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns all nodes in insertion (and execution) order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Returns the type of `value`.
    pub fn value_type(&self, value: NodeValue) -> Result<&ValueType, GraphError> {
        shape_infer::operand(&self.nodes, value)
    }

    /// Returns the `Variable` nodes in creation order.
    pub fn variables(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.kind.is_variable())
            .map(|(i, n)| (NodeId(i), n))
    }

    /// Looks up a variable by name.
    pub fn find_variable(&self, name: &str) -> Option<NodeId> {
        self.variables().find(|(_, n)| n.name == name).map(|(id, _)| id)
    }

    /// Number of non-variable nodes.
    pub fn count_nodes(&self) -> usize {
        self.nodes.iter().filter(|n| !n.kind.is_variable()).count()
    }

    pub fn count_variables(&self) -> usize {
        self.nodes.len() - self.count_nodes()
    }

    /// Counts non-variable nodes by label, in first-seen order.
    pub fn histogram(&self) -> Vec<(&'static str, usize)> {
        let mut counts: Vec<(&'static str, usize)> = Vec::new();
        for node in self.nodes.iter().filter(|n| !n.kind.is_variable()) {
            let label = node.kind.label();
            match counts.iter_mut().find(|(l, _)| *l == label) {
                Some((_, c)) => *c += 1,
                None => counts.push((label, 1)),
            }
        }
        counts
    }

    /// Returns a one-line description of the graph.
    pub fn summary(&self) -> String {
        let constant_bytes: usize = self
            .variables()
            .filter_map(|(_, n)| match n.variable_kind() {
                Some(VariableKind::Constant(t)) => Some(t.size_bytes()),
                _ => None,
            })
            .sum();
        format!(
            "Graph '{}': {} nodes, {} variables, {:.1} KB constants",
            self.name,
            self.count_nodes(),
            self.count_variables(),
            constant_bytes as f64 / 1024.0,
        )
    }
}

impl<S: GraphState> fmt::Display for Graph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.summary())?;
        for (i, node) in self.nodes.iter().enumerate() {
            writeln!(f, "  {:>4}  {}", NodeId(i), node.summary())?;
        }
        Ok(())
    }
}
