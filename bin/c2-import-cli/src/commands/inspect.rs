// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `c2-import inspect` command: lower a model and print the graph.

use super::truncate;
use caffe2_loader::Caffe2ModelLoader;
use graph_ir::Graph;
use std::path::PathBuf;
use tensor_core::{DType, Shape, Tensor};

/// A `--input name=d0xd1[:dtype]` argument.
#[derive(Debug, Clone, PartialEq)]
pub struct InputArg {
    pub name: String,
    pub dims: Vec<usize>,
    pub dtype: DType,
}

/// Parses `name=2x3` or `name=2x3:i64`. A scalar is written `name=`.
pub fn parse_input(s: &str) -> Result<InputArg, String> {
    let (name, rest) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=dims[:dtype], got '{s}'"))?;
    if name.is_empty() {
        return Err(format!("input '{s}' has no name"));
    }
    let (dims, dtype) = match rest.split_once(':') {
        Some((dims, dtype)) => (
            dims,
            DType::parse(dtype).ok_or_else(|| format!("unknown dtype '{dtype}'"))?,
        ),
        None => (rest, DType::F32),
    };
    let dims = if dims.is_empty() {
        Vec::new()
    } else {
        dims.split('x')
            .map(|d| {
                d.parse::<usize>()
                    .map_err(|_| format!("invalid dimension '{d}' in '{s}'"))
            })
            .collect::<Result<Vec<_>, _>>()?
    };
    Ok(InputArg {
        name: name.to_string(),
        dims,
        dtype,
    })
}

pub fn execute(
    predict_net: PathBuf,
    init_net: PathBuf,
    inputs: Vec<InputArg>,
    show_nodes: bool,
) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║              c2-import · Model Inspector            ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let tensors: Vec<Tensor> = inputs
        .iter()
        .map(|i| Tensor::zeros(Shape::new(i.dims.clone()), i.dtype))
        .collect();
    let names: Vec<&str> = inputs.iter().map(|i| i.name.as_str()).collect();
    let tensor_refs: Vec<&Tensor> = tensors.iter().collect();

    let mut graph = Graph::new(
        predict_net
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "caffe2".into()),
    );
    let loader =
        Caffe2ModelLoader::from_files(&predict_net, &init_net, &names, &tensor_refs, &mut graph)
            .map_err(|e| {
                tracing::warn!("model import failed: {e}");
                anyhow::anyhow!("failed to import '{}': {e}", predict_net.display())
            })?;
    tracing::info!(
        predict_net = %predict_net.display(),
        outputs = loader.outputs().len(),
        "model imported"
    );
    let graph = graph.verify()?;

    // ── Summary ────────────────────────────────────────────────
    println!("  {}", graph.summary());
    println!();
    println!("  Outputs:");
    for (name, value) in loader.outputs() {
        println!("   {:<30} {}", truncate(name, 30), graph.value_type(*value)?);
    }
    println!();

    // ── Node histogram ─────────────────────────────────────────
    println!("  {:<14} {:>6}", "Kind", "Count");
    println!("  {}", "-".repeat(21));
    for (label, count) in graph.histogram() {
        println!("  {label:<14} {count:>6}");
    }
    println!();

    if show_nodes {
        println!("  {:<5} {}", "Id", "Node");
        println!("  {}", "-".repeat(82));
        for (i, node) in graph.nodes().iter().enumerate() {
            println!("  %{i:<4} {}", node.summary());
        }
        println!();
    }

    Ok(())
}
