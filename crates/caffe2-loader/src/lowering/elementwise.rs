// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Elementwise, activation and normalization lowerings.

use super::{built, canonical_axis, dims_of, reshape_to, Lowering};
use crate::args::ArgReader;
use crate::record::OperatorRecord;
use crate::LoadError;
use graph_ir::NodeValue;
use tensor_core::{ArithmeticOp, DType, UnaryOp};

/// `Clip` with bounds defaulting to the element type's finite range.
pub(super) fn lower_clip(op: &OperatorRecord, ctx: &mut Lowering<'_>) -> Result<(), LoadError> {
    let input = ctx.input(op, 0)?;
    let dtype = ctx.ty(op, input)?.dtype;
    let args = ArgReader::new(op);
    let min = args.number("min")?.unwrap_or(dtype.lowest());
    let max = args.number("max")?.unwrap_or(dtype.highest());
    let value = built(op, ctx.graph.create_clip(op.label(), input, min, max))?;
    ctx.bind_output(op, 0, value)
}

/// `ReplaceNaN` as `Select(IsNaN(x), Splat(value), x)`.
pub(super) fn lower_replace_nan(
    op: &OperatorRecord,
    ctx: &mut Lowering<'_>,
) -> Result<(), LoadError> {
    let input = ctx.input(op, 0)?;
    let ty = ctx.ty(op, input)?;
    if !ty.dtype.is_float() {
        return Err(LoadError::shape(
            op.label(),
            format!("NaN replacement needs a floating-point input, got {}", ty.dtype),
        ));
    }
    let value = ArgReader::new(op).float_or("value", 0.0)?;

    let mask = built(
        op,
        ctx.graph
            .create_is_nan(Lowering::node_name(op, "isnan"), input),
    )?;
    let fill = built(
        op,
        ctx.graph
            .create_splat(Lowering::node_name(op, "value"), ty, f64::from(value)),
    )?;
    let result = built(op, ctx.graph.create_select(op.label(), mask, fill, input))?;
    ctx.bind_output(op, 0, result)
}

fn lower_unary(op: &OperatorRecord, ctx: &mut Lowering<'_>, kind: UnaryOp) -> Result<(), LoadError> {
    let input = ctx.input(op, 0)?;
    let value = built(op, ctx.graph.create_unary(op.label(), kind, input))?;
    ctx.bind_output(op, 0, value)
}

pub(super) fn lower_relu(op: &OperatorRecord, ctx: &mut Lowering<'_>) -> Result<(), LoadError> {
    lower_unary(op, ctx, UnaryOp::Relu)
}

pub(super) fn lower_sigmoid(op: &OperatorRecord, ctx: &mut Lowering<'_>) -> Result<(), LoadError> {
    lower_unary(op, ctx, UnaryOp::Sigmoid)
}

pub(super) fn lower_tanh(op: &OperatorRecord, ctx: &mut Lowering<'_>) -> Result<(), LoadError> {
    lower_unary(op, ctx, UnaryOp::Tanh)
}

/// Softmax over `dims[axis..]`, computed on the input coerced to 2-D.
pub(super) fn lower_softmax(op: &OperatorRecord, ctx: &mut Lowering<'_>) -> Result<(), LoadError> {
    let input = ctx.input(op, 0)?;
    let dims = dims_of(op, ctx, input)?;
    let axis = canonical_axis(op, "axis", ArgReader::new(op).int_or("axis", 1)?, dims.len())?;

    let rows = dims[..axis].iter().product();
    let cols = dims[axis..].iter().product();
    let flat = reshape_to(op, ctx, input, vec![rows, cols], "input_2d")?;
    let probs = built(op, ctx.graph.create_softmax(op.label(), flat))?;
    let value = reshape_to(op, ctx, probs, dims, "reshape")?;
    ctx.bind_output(op, 0, value)
}

/// Legacy Caffe2 binary op: the RHS either matches the LHS exactly or, with
/// `broadcast = 1`, matches a contiguous run of LHS dims starting at `axis`.
fn lower_binary(
    op: &OperatorRecord,
    ctx: &mut Lowering<'_>,
    kind: ArithmeticOp,
) -> Result<(), LoadError> {
    let args = ArgReader::new(op);
    let broadcast = args.flag("broadcast")?;
    let axis = args.int_or("axis", -1)?;

    let lhs = ctx.input(op, 0)?;
    let mut rhs = ctx.input(op, 1)?;
    let a = dims_of(op, ctx, lhs)?;
    let b = dims_of(op, ctx, rhs)?;

    if !broadcast {
        if args.has("axis") {
            tracing::warn!(op = op.label(), "axis is ignored without broadcast");
        }
    } else if a != b {
        if b.len() > a.len() {
            return Err(LoadError::shape(
                op.label(),
                format!("cannot broadcast {b:?} into {a:?}"),
            ));
        }
        let axis = match axis {
            -1 => a.len() - b.len(),
            axis if axis < 0 => {
                return Err(LoadError::malformed(
                    op.label(),
                    "axis",
                    format!("invalid broadcast axis {axis}"),
                ))
            }
            axis => axis as usize,
        };
        if axis + b.len() > a.len() {
            return Err(LoadError::shape(
                op.label(),
                format!("{b:?} does not fit {a:?} at axis {axis}"),
            ));
        }
        rhs = built(
            op,
            ctx.graph
                .create_broadcast(Lowering::node_name(op, "rhs_broadcast"), rhs, axis, a),
        )?;
    }

    let value = built(op, ctx.graph.create_arithmetic(op.label(), kind, lhs, rhs))?;
    ctx.bind_output(op, 0, value)
}

pub(super) fn lower_add(op: &OperatorRecord, ctx: &mut Lowering<'_>) -> Result<(), LoadError> {
    lower_binary(op, ctx, ArithmeticOp::Add)
}

pub(super) fn lower_sub(op: &OperatorRecord, ctx: &mut Lowering<'_>) -> Result<(), LoadError> {
    lower_binary(op, ctx, ArithmeticOp::Sub)
}

pub(super) fn lower_mul(op: &OperatorRecord, ctx: &mut Lowering<'_>) -> Result<(), LoadError> {
    lower_binary(op, ctx, ArithmeticOp::Mul)
}

pub(super) fn lower_div(op: &OperatorRecord, ctx: &mut Lowering<'_>) -> Result<(), LoadError> {
    lower_binary(op, ctx, ArithmeticOp::Div)
}

/// Variadic `Sum` as a left fold of `Add`.
pub(super) fn lower_sum(op: &OperatorRecord, ctx: &mut Lowering<'_>) -> Result<(), LoadError> {
    let inputs = ctx.inputs(op, 1)?;
    let last = inputs.len() - 1;
    let mut acc: NodeValue = inputs[0];
    for (i, &next) in inputs.iter().enumerate().skip(1) {
        let name = if i == last {
            op.label().to_string()
        } else {
            Lowering::node_name(op, &format!("partial{i}"))
        };
        acc = built(
            op,
            ctx.graph.create_arithmetic(name, ArithmeticOp::Add, acc, next),
        )?;
    }
    ctx.bind_output(op, 0, acc)
}

#[cfg(test)]
mod tests {
    use super::super::test_util::Fixture;
    use super::*;
    use crate::record::ArgValue;
    use graph_ir::NodeKind;
    use tensor_core::{Shape, Tensor};

    fn clip_bounds(fx: &Fixture) -> (f64, f64) {
        fx.graph
            .nodes()
            .iter()
            .find_map(|n| match n.kind {
                NodeKind::Clip { min, max, .. } => Some((min, max)),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_clip_explicit_bounds() {
        let mut fx = Fixture::new(&[("x", vec![5, 5])]);
        let op = OperatorRecord::new("Clip", &["x"], &["y"])
            .with_arg("min", ArgValue::Float(20.0))
            .with_arg("max", ArgValue::Float(60.0));
        fx.lower(&op).unwrap();
        assert_eq!(clip_bounds(&fx), (20.0, 60.0));
        assert_eq!(fx.output_type("y").dims(), &[5, 5]);
    }

    #[test]
    fn test_clip_integer_bounds_are_exact() {
        let mut fx = Fixture::new(&[("x", vec![2])]);
        let op = OperatorRecord::new("Clip", &["x"], &["y"])
            .with_arg("min", ArgValue::Int(-16_777_217))
            .with_arg("max", ArgValue::Int(16_777_217));
        fx.lower(&op).unwrap();
        assert_eq!(clip_bounds(&fx), (-16_777_217.0, 16_777_217.0));
    }

    #[test]
    fn test_clip_defaults_are_finite() {
        let mut fx = Fixture::new(&[("x", vec![3])]);
        fx.lower(&OperatorRecord::new("Clip", &["x"], &["y"])).unwrap();
        let (min, max) = clip_bounds(&fx);
        assert_eq!(min, f64::from(f32::MIN));
        assert_eq!(max, f64::from(f32::MAX));
        assert!(min.is_finite() && max.is_finite());
    }

    #[test]
    fn test_replace_nan_structure() {
        let mut fx = Fixture::new(&[("x", vec![4, 4])]);
        let op = OperatorRecord::new("ReplaceNaN", &["x"], &["y"])
            .with_arg("value", ArgValue::Float(1.5));
        fx.lower(&op).unwrap();
        assert_eq!(fx.labels(), vec!["IsNaN", "Splat", "Select"]);
        let ty = fx.output_type("y");
        assert_eq!(ty.dtype, DType::F32);
        assert_eq!(ty.dims(), &[4, 4]);
    }

    #[test]
    fn test_replace_nan_rejects_integers() {
        let ints = Tensor::from_vec(Shape::vector(2), vec![1i32, 2]).unwrap();
        let mut fx = Fixture::new(&[]).with_constant("x", ints);
        let op = OperatorRecord::new("ReplaceNaN", &["x"], &["y"]);
        assert!(matches!(fx.lower(&op), Err(LoadError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_softmax_coerces_to_2d() {
        let mut fx = Fixture::new(&[("x", vec![2, 3, 4])]);
        fx.lower(&OperatorRecord::new("Softmax", &["x"], &["y"])).unwrap();
        assert_eq!(fx.output_type("y").dims(), &[2, 3, 4]);
        assert_eq!(fx.labels(), vec!["Reshape", "Softmax", "Reshape"]);

        let mut fx = Fixture::new(&[("x", vec![2, 5])]);
        fx.lower(&OperatorRecord::new("Softmax", &["x"], &["y"])).unwrap();
        assert_eq!(fx.labels(), vec!["Softmax"]);
    }

    #[test]
    fn test_binary_broadcast_at_axis() {
        let mut fx = Fixture::new(&[("a", vec![2, 3, 4]), ("b", vec![3])]);
        let op = OperatorRecord::new("Mul", &["a", "b"], &["y"])
            .with_arg("broadcast", ArgValue::Int(1))
            .with_arg("axis", ArgValue::Int(1));
        fx.lower(&op).unwrap();
        assert_eq!(fx.output_type("y").dims(), &[2, 3, 4]);
        assert_eq!(fx.labels(), vec!["Broadcast", "Arithmetic"]);
    }

    #[test]
    fn test_binary_trailing_broadcast() {
        let mut fx = Fixture::new(&[("a", vec![2, 3, 4]), ("b", vec![3, 4])]);
        let op = OperatorRecord::new("Add", &["a", "b"], &["y"]).with_arg("broadcast", ArgValue::Int(1));
        fx.lower(&op).unwrap();
        let axis = fx
            .graph
            .nodes()
            .iter()
            .find_map(|n| match n.kind {
                NodeKind::Broadcast { axis, .. } => Some(axis),
                _ => None,
            })
            .unwrap();
        assert_eq!(axis, 1);
    }

    #[test]
    fn test_binary_without_broadcast_needs_equal_shapes() {
        let mut fx = Fixture::new(&[("a", vec![2, 3]), ("b", vec![3])]);
        let op = OperatorRecord::new("Sub", &["a", "b"], &["y"]);
        assert!(matches!(fx.lower(&op), Err(LoadError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_sum_folds_adds() {
        let mut fx = Fixture::new(&[("a", vec![2]), ("b", vec![2]), ("c", vec![2])]);
        fx.lower(&OperatorRecord::new("Sum", &["a", "b", "c"], &["y"])).unwrap();
        assert_eq!(fx.labels(), vec!["Arithmetic", "Arithmetic"]);

        fx.lower(&OperatorRecord::new("Sum", &["a"], &["z"])).unwrap();
        assert_eq!(fx.env.get("z"), fx.env.get("a"));
    }

    #[test]
    fn test_activations() {
        let mut fx = Fixture::new(&[("x", vec![3])]);
        for (kind, out) in [("Relu", "r"), ("Sigmoid", "s"), ("Tanh", "t")] {
            fx.lower(&OperatorRecord::new(kind, &["x"], &[out])).unwrap();
        }
        let ops: Vec<_> = fx
            .graph
            .nodes()
            .iter()
            .filter_map(|n| match n.kind {
                NodeKind::Unary { op, .. } => Some(op),
                _ => None,
            })
            .collect();
        assert_eq!(ops, vec![UnaryOp::Relu, UnaryOp::Sigmoid, UnaryOp::Tanh]);
    }
}
