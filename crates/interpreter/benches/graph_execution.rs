// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for importing and running lowered Caffe2 nets.

use caffe2_loader::{ArgValue, Caffe2ModelLoader, NetDefinition, OperatorRecord};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use graph_ir::Graph;
use interpreter::{Bindings, ExecutionEngine, RuntimeConfig};
use tensor_core::{DType, Shape, Tensor};

fn filled(dims: &[usize]) -> Tensor {
    let shape = Shape::new(dims.to_vec());
    let data: Vec<f32> = (0..shape.num_elements()).map(|i| (i % 13) as f32 * 0.1).collect();
    Tensor::from_f32(shape, &data).unwrap()
}

fn batch_matmul_net(broadcast: bool) -> NetDefinition {
    let mut op = OperatorRecord::new("BatchMatMul", &["lhs", "rhs"], &["y"]);
    if broadcast {
        op = op.with_arg("broadcast", ArgValue::Int(1));
    }
    NetDefinition {
        name: "bmm".into(),
        ops: vec![op],
        external_input: vec![],
        external_output: vec!["y".into()],
    }
}

fn import(predict: &NetDefinition, inputs: &[(&str, &Tensor)]) -> Graph {
    let names: Vec<&str> = inputs.iter().map(|(n, _)| *n).collect();
    let tensors: Vec<&Tensor> = inputs.iter().map(|(_, t)| *t).collect();
    let mut graph = Graph::new("bench");
    Caffe2ModelLoader::load(predict, &NetDefinition::default(), &names, &tensors, &mut graph)
        .unwrap();
    graph
}

fn bench_import(c: &mut Criterion) {
    let mut group = c.benchmark_group("import_batch_matmul");
    for batch in [4usize, 16, 64] {
        let lhs = Tensor::zeros(Shape::new(vec![batch, 32, 32]), DType::F32);
        let rhs = Tensor::zeros(Shape::new(vec![batch, 32, 32]), DType::F32);
        let net = batch_matmul_net(false);
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |bench, _| {
            bench.iter(|| black_box(import(&net, &[("lhs", &lhs), ("rhs", &rhs)])))
        });
    }
    group.finish();
}

fn bench_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("run_batch_matmul");
    for (label, broadcast, rhs_dims) in [
        ("parallel", false, vec![16, 32, 32]),
        ("broadcast", true, vec![32, 32]),
    ] {
        let lhs = filled(&[16, 32, 32]);
        let rhs = filled(&rhs_dims);
        let graph = import(&batch_matmul_net(broadcast), &[("lhs", &lhs), ("rhs", &rhs)]);
        let mut engine = ExecutionEngine::from_graph(RuntimeConfig::default(), graph.verify().unwrap())
            .prepare()
            .unwrap();
        let bindings = Bindings::new().with("lhs", lhs).with("rhs", rhs);
        group.bench_function(label, |bench| {
            bench.iter(|| engine.run(black_box(&bindings)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_import, bench_run);
criterion_main!(benches);
