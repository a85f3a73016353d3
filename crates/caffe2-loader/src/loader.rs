// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Model loading: placeholders, weights, operator lowering and outputs.

use crate::environment::Environment;
use crate::lowering::{self, Lowering};
use crate::record::NetDefinition;
use crate::weights::WeightTable;
use crate::LoadError;
use graph_ir::{Graph, GraphError, NodeValue};
use std::path::Path;
use std::sync::Arc;
use tensor_core::Tensor;

/// The result of importing one Caffe2 model into a graph.
///
/// Holds only output names and value handles; the graph, the weight table
/// and the environment used during the load are not referenced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caffe2ModelLoader {
    outputs: Vec<(String, NodeValue)>,
}

/// Label used for failures that belong to no single operator.
const LOADER: &str = "(loader)";

fn name_conflict(op: &str, err: GraphError) -> LoadError {
    match err {
        GraphError::DuplicateName { name } => LoadError::NameConflict { name },
        other => LoadError::from_graph(op, other),
    }
}

impl Caffe2ModelLoader {
    /// Imports `predict` (with weights from `init`) into `graph`.
    ///
    /// `names[i]` is bound to a placeholder with the exact type of
    /// `tensors[i]`. The tensors are only inspected, never retained.
    ///
    /// On error the graph is rolled back to its state before the call.
    ///
    /// # Errors
    /// Any [`LoadError`]; see the variant docs.
    pub fn load(
        predict: &NetDefinition,
        init: &NetDefinition,
        names: &[&str],
        tensors: &[&Tensor],
        graph: &mut Graph,
    ) -> Result<Self, LoadError> {
        if names.len() != tensors.len() {
            return Err(LoadError::malformed(
                LOADER,
                "inputs",
                format!("{} names for {} tensors", names.len(), tensors.len()),
            ));
        }

        let checkpoint = graph.checkpoint();
        match Self::populate(predict, init, names, tensors, graph) {
            Ok(loader) => Ok(loader),
            Err(err) => {
                graph.rollback(checkpoint);
                tracing::warn!(net = %predict.name, error = %err, "model load failed");
                Err(err)
            }
        }
    }

    /// Reads both nets from disk (format by extension) and loads them.
    pub fn from_files(
        predict_path: &Path,
        init_path: &Path,
        names: &[&str],
        tensors: &[&Tensor],
        graph: &mut Graph,
    ) -> Result<Self, LoadError> {
        let predict = NetDefinition::from_file(predict_path)?;
        let init = NetDefinition::from_file(init_path)?;
        Self::load(&predict, &init, names, tensors, graph)
    }

    fn populate(
        predict: &NetDefinition,
        init: &NetDefinition,
        names: &[&str],
        tensors: &[&Tensor],
        graph: &mut Graph,
    ) -> Result<Self, LoadError> {
        let weights = WeightTable::from_init_net(init)?;
        let mut env = Environment::new();

        for (&name, tensor) in names.iter().zip(tensors) {
            if weights.contains(name) {
                return Err(LoadError::NameConflict {
                    name: name.to_string(),
                });
            }
            let value = graph
                .create_placeholder(name, tensor.dtype(), tensor.shape().clone())
                .map_err(|e| name_conflict(LOADER, e))?;
            env.bind(name, value)?;
        }

        for (name, tensor) in weights.iter() {
            let value = graph
                .create_constant(name, Arc::clone(tensor))
                .map_err(|e| name_conflict(LOADER, e))?;
            env.bind(name, value)?;
        }

        {
            let mut ctx = Lowering::new(graph, &mut env, &weights);
            for op in &predict.ops {
                lowering::lower(op, &mut ctx)?;
            }
        }

        let mut outputs = Vec::with_capacity(predict.external_output.len());
        for name in &predict.external_output {
            let value = env.resolve(LOADER, name)?;
            let output = graph
                .create_save(name.clone(), value)
                .map_err(|e| name_conflict(LOADER, e))?;
            outputs.push((name.clone(), output));
        }

        tracing::info!(
            net = %predict.name,
            operators = predict.ops.len(),
            inputs = names.len(),
            weights = weights.len(),
            weight_kb = weights.total_bytes() as f64 / 1024.0,
            outputs = outputs.len(),
            nodes = graph.count_nodes(),
            "model loaded"
        );
        Ok(Self { outputs })
    }

    /// The output variable, when the net declares exactly one output.
    pub fn single_output(&self) -> Result<NodeValue, LoadError> {
        match self.outputs.as_slice() {
            [(_, value)] => Ok(*value),
            outputs => Err(LoadError::MultipleOutputs {
                count: outputs.len(),
            }),
        }
    }

    /// The output variable saved for the declared output `name`.
    pub fn output(&self, name: &str) -> Option<NodeValue> {
        self.outputs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    /// Declared outputs in declaration order.
    pub fn outputs(&self) -> &[(String, NodeValue)] {
        &self.outputs
    }
}
