// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Imports small Caffe2 nets and checks the numbers the lowered graphs
//! compute.

use caffe2_loader::{ArgValue, Caffe2ModelLoader, NetDefinition, OperatorRecord};
use graph_ir::Graph;
use interpreter::{Bindings, ExecutionEngine, RuntimeConfig, RuntimeError};
use tensor_core::{Shape, Tensor};

// ── Helpers ────────────────────────────────────────────────────

fn net(ops: Vec<OperatorRecord>, outputs: &[&str]) -> NetDefinition {
    NetDefinition {
        name: "test".to_string(),
        ops,
        external_input: vec![],
        external_output: outputs.iter().map(|s| s.to_string()).collect(),
    }
}

fn fill(name: &str, dims: &[i64], values: Vec<f32>) -> OperatorRecord {
    OperatorRecord::new("GivenTensorFill", &[], &[name])
        .with_arg("shape", ArgValue::Ints(dims.to_vec()))
        .with_arg("values", ArgValue::Floats(values))
}

fn tensor(dims: &[usize], values: &[f32]) -> Tensor {
    Tensor::from_f32(Shape::new(dims.to_vec()), values).unwrap()
}

fn range(n: usize) -> Vec<f32> {
    (0..n).map(|i| i as f32).collect()
}

/// Imports `predict`/`init` with `inputs` bound, runs once and returns the
/// single output.
fn run(predict: &NetDefinition, init: &NetDefinition, inputs: &[(&str, Tensor)]) -> Tensor {
    let names: Vec<&str> = inputs.iter().map(|(n, _)| *n).collect();
    let tensors: Vec<&Tensor> = inputs.iter().map(|(_, t)| t).collect();
    let mut graph = Graph::new("test");
    Caffe2ModelLoader::load(predict, init, &names, &tensors, &mut graph).unwrap();

    let mut engine = ExecutionEngine::from_graph(RuntimeConfig::default(), graph.verify().unwrap())
        .prepare()
        .unwrap();
    let bindings: Bindings = inputs.iter().map(|(n, t)| (*n, t.clone())).collect();
    let mut out = engine.run(&bindings).unwrap();
    assert_eq!(out.outputs.len(), 1);
    out.outputs.remove(0).1
}

fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!((a - e).abs() < 1e-5, "element {i}: {a} vs {e}");
    }
}

// ── Convolution / pooling ──────────────────────────────────────

#[test]
fn test_conv_with_padding_and_bias() {
    let predict = net(
        vec![OperatorRecord::new("Conv", &["data", "w", "b"], &["y"])
            .with_arg("pad", ArgValue::Int(1))],
        &["y"],
    );
    let init = net(
        vec![fill("w", &[1, 1, 2, 2], vec![1.0; 4]), fill("b", &[1], vec![2.0])],
        &[],
    );
    let y = run(&predict, &init, &[("data", tensor(&[1, 1, 3, 3], &range(9)))]);

    assert_eq!(y.shape().dims(), &[1, 1, 4, 4]);
    assert_eq!(
        y.as_f32_slice(),
        &[
            2.0, 3.0, 5.0, 4.0, 5.0, 10.0, 14.0, 9.0, 11.0, 22.0, 26.0, 15.0, 8.0, 15.0, 17.0,
            10.0
        ]
    );
}

#[test]
fn test_nhwc_conv_matches_nchw() {
    let predict = net(
        vec![OperatorRecord::new("Conv", &["data", "w"], &["y"])
            .with_arg("order", ArgValue::Str("NHWC".into()))],
        &["y"],
    );
    // Filter is [O, kh, kw, C] in NHWC.
    let init = net(vec![fill("w", &[1, 2, 2, 1], vec![1.0; 4])], &[]);
    let y = run(&predict, &init, &[("data", tensor(&[1, 3, 3, 1], &range(9)))]);

    assert_eq!(y.shape().dims(), &[1, 2, 2, 1]);
    assert_eq!(y.as_f32_slice(), &[8.0, 12.0, 20.0, 24.0]);
}

#[test]
fn test_max_and_average_pool() {
    let max = net(
        vec![OperatorRecord::new("MaxPool", &["x"], &["y"])
            .with_arg("kernel", ArgValue::Int(2))
            .with_arg("stride", ArgValue::Int(2))],
        &["y"],
    );
    let y = run(&max, &NetDefinition::default(), &[("x", tensor(&[1, 1, 4, 4], &range(16)))]);
    assert_eq!(y.as_f32_slice(), &[5.0, 7.0, 13.0, 15.0]);

    let avg = net(
        vec![OperatorRecord::new("AveragePool", &["x"], &["y"])
            .with_arg("global_pooling", ArgValue::Int(1))],
        &["y"],
    );
    let y = run(&avg, &NetDefinition::default(), &[("x", tensor(&[1, 1, 4, 4], &range(16)))]);
    assert_eq!(y.shape().dims(), &[1, 1, 1, 1]);
    assert_close(y.as_f32_slice(), &[7.5]);
}

// ── Concat ─────────────────────────────────────────────────────

#[test]
fn test_concat_add_axis_stacks_inputs() {
    let predict = net(
        vec![OperatorRecord::new("Concat", &["a", "b", "c"], &["y"])
            .with_arg("axis", ArgValue::Int(1))
            .with_arg("add_axis", ArgValue::Int(1))],
        &["y"],
    );
    let a = tensor(&[2, 3], &range(6));
    let b = tensor(&[2, 3], &range(6).iter().map(|v| v + 10.0).collect::<Vec<_>>());
    let c = tensor(&[2, 3], &range(6).iter().map(|v| v + 20.0).collect::<Vec<_>>());
    let inputs = [("a", a.clone()), ("b", b.clone()), ("c", c.clone())];
    let y = run(&predict, &NetDefinition::default(), &inputs);

    assert_eq!(y.shape().dims(), &[2, 3, 3]);
    for (i, src) in [&a, &b, &c].into_iter().enumerate() {
        for r in 0..2 {
            for col in 0..3 {
                assert_eq!(y.get::<f32>(&[r, i, col]), src.get::<f32>(&[r, col]));
            }
        }
    }
}

#[test]
fn test_concat_add_axis_at_the_end() {
    let predict = net(
        vec![OperatorRecord::new("Concat", &["a", "b"], &["y"])
            .with_arg("axis", ArgValue::Int(2))
            .with_arg("add_axis", ArgValue::Int(1))],
        &["y"],
    );
    let inputs = [
        ("a", tensor(&[1, 2], &[1.0, 2.0])),
        ("b", tensor(&[1, 2], &[3.0, 4.0])),
    ];
    let y = run(&predict, &NetDefinition::default(), &inputs);
    assert_eq!(y.shape().dims(), &[1, 2, 2]);
    assert_eq!(y.as_f32_slice(), &[1.0, 3.0, 2.0, 4.0]);
}

#[test]
fn test_plain_concat_keeps_column_order() {
    let predict = net(
        vec![OperatorRecord::new("Concat", &["a", "b"], &["y"])],
        &["y"],
    );
    let inputs = [
        ("a", tensor(&[2, 1], &[1.0, 2.0])),
        ("b", tensor(&[2, 2], &[10.0, 11.0, 20.0, 21.0])),
    ];
    let y = run(&predict, &NetDefinition::default(), &inputs);
    assert_eq!(y.shape().dims(), &[2, 3]);
    assert_eq!(y.as_f32_slice(), &[1.0, 10.0, 11.0, 2.0, 20.0, 21.0]);
}

// ── Elementwise ────────────────────────────────────────────────

#[test]
fn test_clip_bounds_and_identity_default() {
    let x = tensor(&[5, 5], &range(25).iter().map(|v| v * 4.0).collect::<Vec<_>>());

    let bounded = net(
        vec![OperatorRecord::new("Clip", &["x"], &["y"])
            .with_arg("min", ArgValue::Float(20.0))
            .with_arg("max", ArgValue::Float(60.0))],
        &["y"],
    );
    let y = run(&bounded, &NetDefinition::default(), &[("x", x.clone())]);
    for (out, inp) in y.as_f32_slice().iter().zip(x.as_f32_slice()) {
        assert_eq!(*out, inp.clamp(20.0, 60.0));
    }

    let unbounded = net(vec![OperatorRecord::new("Clip", &["x"], &["y"])], &["y"]);
    let y = run(&unbounded, &NetDefinition::default(), &[("x", x.clone())]);
    assert_eq!(y, x);
}

#[test]
fn test_replace_nan_leaves_infinities() {
    let predict = net(
        vec![OperatorRecord::new("ReplaceNaN", &["x"], &["y"])
            .with_arg("value", ArgValue::Float(-1.0))],
        &["y"],
    );
    let x = tensor(&[2, 2], &[f32::NAN, 3.0, f32::INFINITY, f32::NEG_INFINITY]);
    let y = run(&predict, &NetDefinition::default(), &[("x", x)]);
    assert_eq!(y.as_f32_slice(), &[-1.0, 3.0, f32::INFINITY, f32::NEG_INFINITY]);
}

#[test]
fn test_legacy_broadcast_add_and_sum() {
    let predict = net(
        vec![
            OperatorRecord::new("Add", &["x", "b"], &["h"]).with_arg("broadcast", ArgValue::Int(1)),
            OperatorRecord::new("Sum", &["h", "x", "x"], &["y"]),
        ],
        &["y"],
    );
    let init = net(vec![fill("b", &[3], vec![1.0, 2.0, 3.0])], &[]);
    let y = run(&predict, &init, &[("x", tensor(&[2, 3], &range(6)))]);
    // 3x + b
    assert_eq!(y.as_f32_slice(), &[1.0, 5.0, 9.0, 10.0, 14.0, 18.0]);
}

#[test]
fn test_softmax_rows_sum_to_one() {
    let predict = net(vec![OperatorRecord::new("Softmax", &["x"], &["y"])], &["y"]);
    let x = tensor(&[2, 3], &[0.0, 0.0, 0.0, 1.0, 2.0, 3.0]);
    let y = run(&predict, &NetDefinition::default(), &[("x", x)]);

    let v = y.as_f32_slice();
    assert_close(&v[..3], &[1.0 / 3.0; 3]);
    assert!((v[3..].iter().sum::<f32>() - 1.0).abs() < 1e-5);
    assert!(v[3] < v[4] && v[4] < v[5]);
}

// ── Matrix products ────────────────────────────────────────────

#[test]
fn test_fully_connected_adds_bias() {
    let predict = net(vec![OperatorRecord::new("FC", &["x", "w", "b"], &["y"])], &["y"]);
    let init = net(
        vec![
            fill("w", &[2, 3], vec![1.0, 0.0, 0.0, 0.0, 1.0, 1.0]),
            fill("b", &[2], vec![0.5, -0.5]),
        ],
        &[],
    );
    let y = run(&predict, &init, &[("x", tensor(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]))]);
    assert_eq!(y.shape().dims(), &[2, 2]);
    assert_eq!(y.as_f32_slice(), &[1.5, 4.5, 4.5, 10.5]);
}

#[test]
fn test_broadcast_batch_matmul_values() {
    let predict = net(
        vec![OperatorRecord::new("BatchMatMul", &["lhs", "rhs"], &["y"])
            .with_arg("broadcast", ArgValue::Int(1))
            .with_arg("trans_b", ArgValue::Int(1))],
        &["y"],
    );
    let inputs = [
        ("lhs", tensor(&[2, 2, 3], &range(12))),
        ("rhs", tensor(&[2, 3], &[1.0, 0.0, 0.0, 0.0, 1.0, 1.0])),
    ];
    let y = run(&predict, &NetDefinition::default(), &inputs);
    assert_eq!(y.shape().dims(), &[2, 2, 2]);
    assert_eq!(y.as_f32_slice(), &[0.0, 3.0, 3.0, 9.0, 6.0, 15.0, 9.0, 21.0]);
}

#[test]
fn test_parallel_batch_matmul_values() {
    let predict = net(
        vec![OperatorRecord::new("BatchMatMul", &["lhs", "rhs"], &["y"])],
        &["y"],
    );
    let inputs = [
        ("lhs", tensor(&[2, 2, 2], &[1.0, 2.0, 3.0, 4.0, 1.0, 0.0, 0.0, 1.0])),
        ("rhs", tensor(&[2, 2, 2], &[1.0, 0.0, 0.0, 1.0, 5.0, 6.0, 7.0, 8.0])),
    ];
    let y = run(&predict, &NetDefinition::default(), &inputs);
    assert_eq!(y.shape().dims(), &[2, 2, 2]);
    assert_eq!(y.as_f32_slice(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
}

// ── Engine pipeline ────────────────────────────────────────────

#[test]
fn test_unbound_placeholder_is_a_binding_error() {
    let predict = net(vec![OperatorRecord::new("Relu", &["x"], &["y"])], &["y"]);
    let x = tensor(&[2], &[1.0, -1.0]);
    let mut graph = Graph::new("relu");
    Caffe2ModelLoader::load(&predict, &NetDefinition::default(), &["x"], &[&x], &mut graph)
        .unwrap();

    let mut engine = ExecutionEngine::from_graph(RuntimeConfig::default(), graph.verify().unwrap())
        .prepare()
        .unwrap();
    let err = engine.run(&Bindings::new()).unwrap_err();
    assert!(matches!(err, RuntimeError::Binding { ref name, .. } if name == "x"));

    let out = engine.run(&Bindings::new().with("x", x)).unwrap();
    assert_eq!(out.get("y").unwrap().as_f32_slice(), &[1.0, 0.0]);
}

#[test]
fn test_config_file_drives_the_whole_pipeline() {
    let predict = net(vec![OperatorRecord::new("FC", &["x", "w", "b"], &["y"])], &["y"]);
    let init = net(
        vec![
            fill("w", &[1, 2], vec![2.0, 3.0]),
            fill("b", &[1], vec![1.0]),
        ],
        &[],
    );
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("predict_net.pb"), predict.to_proto_bytes()).unwrap();
    std::fs::write(dir.path().join("init_net.json"), init.to_json().unwrap()).unwrap();
    let config_path = dir.path().join("model.toml");
    std::fs::write(
        &config_path,
        r#"
predict_net = "predict_net.pb"
init_net = "init_net.json"

[[inputs]]
name = "x"
dims = [2, 2]
values = [1, 1, 0, 2]
"#,
    )
    .unwrap();

    let config = RuntimeConfig::from_file(&config_path).unwrap();
    let mut engine = ExecutionEngine::new(config)
        .load_model()
        .unwrap()
        .prepare()
        .unwrap();
    assert_eq!(engine.graph().name(), "predict_net");

    let out = engine.run_configured().unwrap();
    assert_eq!(out.get("y").unwrap().as_f32_slice(), &[6.0, 7.0]);
    assert!(out.metrics.nodes_executed >= 3);
}
