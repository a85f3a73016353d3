// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `c2-import run` command: import and execute a configured model.
//!
//! Demonstrates the full type-state pipeline:
//! ```text
//! ExecutionEngine<Idle> → load_model → <Loaded> → prepare → <Ready> → run
//! ```

use super::truncate;
use interpreter::{ExecutionEngine, RuntimeConfig};
use std::path::PathBuf;
use tensor_core::Tensor;

/// Number of leading elements printed per output.
const PREVIEW: usize = 8;

pub fn execute(config_path: PathBuf, metrics_json: bool) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║               c2-import · Model Runner              ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let config = RuntimeConfig::from_file(&config_path)?;
    println!("  Config:");
    println!("   Predict net: {}", config.predict_net.display());
    println!("   Init net:    {}", config.init_net.display());
    println!("   Inputs:      {}", config.inputs.len());
    println!();

    // Step 1: Idle → Loaded (import + verify).
    println!("  [1/3] Importing model...");
    let loaded = ExecutionEngine::new(config).load_model().map_err(|e| {
        tracing::warn!("model load failed: {e}");
        e
    })?;
    println!("        {}", loaded.graph().summary());
    println!();

    // Step 2: Loaded → Ready (allocate buffers).
    println!("  [2/3] Allocating buffers...");
    let mut ready = loaded.prepare()?;
    println!(
        "        {:.1} KB allocated.",
        ready.allocated_bytes() as f64 / 1024.0
    );
    println!();

    // Step 3: run once with the configured inputs.
    println!("  [3/3] Running...");
    let output = ready.run_configured()?;
    tracing::info!(
        outputs = output.outputs.len(),
        nodes = output.metrics.nodes_executed,
        "run complete"
    );
    println!();

    println!("  Outputs:");
    for (name, tensor) in &output.outputs {
        println!(
            "   {:<24} {}{}  {}",
            truncate(name, 24),
            tensor.dtype(),
            tensor.shape(),
            preview(tensor)
        );
    }
    println!();

    println!("  {}", output.metrics.summary());
    if metrics_json {
        println!("{}", serde_json::to_string_pretty(&output.metrics)?);
    }
    Ok(())
}

/// Formats the leading elements of `tensor`.
fn preview(tensor: &Tensor) -> String {
    let shown = tensor.num_elements().min(PREVIEW);
    let values: Vec<String> = (0..shown)
        .map(|i| format_element(tensor, i))
        .collect();
    let more = if tensor.num_elements() > shown { ", ..." } else { "" };
    format!("[{}{more}]", values.join(", "))
}

fn format_element(tensor: &Tensor, i: usize) -> String {
    if let Some(v) = tensor.as_slice::<f32>() {
        return format!("{:.4}", v[i]);
    }
    if let Some(v) = tensor.as_slice::<bool>() {
        return v[i].to_string();
    }
    tensor
        .to_i64_vec()
        .and_then(|v| v.get(i).copied())
        .map(|v| v.to_string())
        .unwrap_or_else(|| "?".into())
}
