// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Execution profiling metrics.
//!
//! [`ExecutionMetrics`] collects per-node and aggregate timing plus the
//! bytes each node wrote.

use std::time::Duration;

/// Metrics for a single node's execution.
#[derive(Debug, Clone, serde::Serialize)]
pub struct NodeMetrics {
    pub node_name: String,
    /// Node kind label (`"MatMul"`, `"Save"`, ...).
    pub kind: &'static str,
    pub duration: Duration,
    /// Size of the value the node produced.
    pub output_bytes: usize,
}

/// Aggregate metrics for one `run`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecutionMetrics {
    /// Total wall-clock time, including binding checks.
    pub total_duration: Duration,
    /// Sum of the per-node kernel durations.
    pub total_compute_duration: Duration,
    /// Number of non-variable nodes executed.
    pub nodes_executed: usize,
    /// Largest single value produced, in bytes.
    pub peak_output_bytes: usize,
    /// Per-node metrics, empty when profiling is disabled.
    pub node_metrics: Vec<NodeMetrics>,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self {
            total_duration: Duration::ZERO,
            total_compute_duration: Duration::ZERO,
            nodes_executed: 0,
            peak_output_bytes: 0,
            node_metrics: Vec::new(),
        }
    }

    /// Records an executed node. Per-node detail is kept only when `detailed`.
    pub fn record_node(
        &mut self,
        name: &str,
        kind: &'static str,
        duration: Duration,
        output_bytes: usize,
        detailed: bool,
    ) {
        self.nodes_executed += 1;
        self.total_compute_duration += duration;
        self.peak_output_bytes = self.peak_output_bytes.max(output_bytes);
        if detailed {
            self.node_metrics.push(NodeMetrics {
                node_name: name.to_string(),
                kind,
                duration,
                output_bytes,
            });
        }
    }

    pub fn finalise(&mut self, total: Duration) {
        self.total_duration = total;
    }

    /// Time spent per node kind, largest first.
    pub fn time_by_kind(&self) -> Vec<(&'static str, Duration)> {
        let mut totals: Vec<(&'static str, Duration)> = Vec::new();
        for m in &self.node_metrics {
            match totals.iter_mut().find(|(k, _)| *k == m.kind) {
                Some((_, d)) => *d += m.duration,
                None => totals.push((m.kind, m.duration)),
            }
        }
        totals.sort_by(|a, b| b.1.cmp(&a.1));
        totals
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        let mut s = format!(
            "Execution: {:.3}ms total, {} nodes, {:.3}ms compute, peak value {:.1} KB",
            self.total_duration.as_secs_f64() * 1000.0,
            self.nodes_executed,
            self.total_compute_duration.as_secs_f64() * 1000.0,
            self.peak_output_bytes as f64 / 1024.0,
        );
        if let Some((kind, d)) = self.time_by_kind().first() {
            s.push_str(&format!(
                ", slowest kind {kind} ({:.3}ms)",
                d.as_secs_f64() * 1000.0
            ));
        }
        s
    }
}

impl Default for ExecutionMetrics {
    fn default() -> Self {
        Self::new()
    }
}
