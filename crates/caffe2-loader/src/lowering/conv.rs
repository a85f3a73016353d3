// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Convolution and pooling lowerings.
//!
//! Caffe2 spells window geometry several ways (`kernel`, `kernels`,
//! `kernel_h`/`kernel_w`, and likewise for strides and pads); all of them
//! resolve into one [`Window`] before any node is built.

use super::{built, Lowering};
use crate::args::ArgReader;
use crate::record::OperatorRecord;
use crate::LoadError;
use graph_ir::NodeValue;
use tensor_core::{Conv2dParams, PoolMode, PoolParams};

const NHWC_TO_NCHW: [usize; 4] = [0, 3, 1, 2];
const NCHW_TO_NHWC: [usize; 4] = [0, 2, 3, 1];

/// Storage order of a 4-D activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Order {
    Nchw,
    Nhwc,
}

impl Order {
    fn read(op: &OperatorRecord) -> Result<Self, LoadError> {
        match ArgReader::new(op).str("order")? {
            None | Some("NCHW") => Ok(Order::Nchw),
            Some("NHWC") => Ok(Order::Nhwc),
            Some(other) => Err(LoadError::malformed(
                op.label(),
                "order",
                format!("unknown storage order '{other}'"),
            )),
        }
    }
}

/// Resolved window geometry. `kernel` is `None` when no argument names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    kernel: Option<[usize; 2]>,
    stride: [usize; 2],
    pads: [usize; 4],
}

impl Window {
    fn read(op: &OperatorRecord) -> Result<Self, LoadError> {
        let args = ArgReader::new(op);
        let kernel = pair(op, &args, "kernel", "kernels", ["kernel_h", "kernel_w"])?;
        let stride = pair(op, &args, "stride", "strides", ["stride_h", "stride_w"])?.unwrap_or([1, 1]);
        let pads = quad(op, &args)?;

        for arg in ["dilation", "dilation_h", "dilation_w"] {
            if args.usize_or(arg, 1)? != 1 {
                return Err(LoadError::malformed(op.label(), arg, "only dilation 1 is supported"));
            }
        }
        if let Some(dilations) = args.usizes("dilations")? {
            if dilations.iter().any(|&d| d != 1) {
                return Err(LoadError::malformed(op.label(), "dilations", "only dilation 1 is supported"));
            }
        }
        Ok(Self { kernel, stride, pads })
    }
}

/// Reads a 2-D quantity given as a scalar, a two-element list or a pair of
/// per-axis arguments.
fn pair(
    op: &OperatorRecord,
    args: &ArgReader<'_>,
    scalar: &str,
    list: &str,
    split: [&str; 2],
) -> Result<Option<[usize; 2]>, LoadError> {
    if let Some(v) = args.usize(scalar)? {
        return Ok(Some([v, v]));
    }
    if let Some(v) = args.usizes(list)? {
        return match v.as_slice() {
            [h, w] => Ok(Some([*h, *w])),
            _ => Err(LoadError::malformed(
                op.label(),
                list,
                format!("expected 2 values, got {}", v.len()),
            )),
        };
    }
    match (args.usize(split[0])?, args.usize(split[1])?) {
        (Some(h), Some(w)) => Ok(Some([h, w])),
        (None, None) => Ok(None),
        _ => Err(LoadError::malformed(
            op.label(),
            split[0],
            format!("'{}' and '{}' must be given together", split[0], split[1]),
        )),
    }
}

/// Reads padding as `[top, left, bottom, right]`.
fn quad(op: &OperatorRecord, args: &ArgReader<'_>) -> Result<[usize; 4], LoadError> {
    if let Some(p) = args.usize("pad")? {
        return Ok([p; 4]);
    }
    if let Some(v) = args.usizes("pads")? {
        return match v.as_slice() {
            [t, l, b, r] => Ok([*t, *l, *b, *r]),
            _ => Err(LoadError::malformed(
                op.label(),
                "pads",
                format!("expected 4 values, got {}", v.len()),
            )),
        };
    }
    Ok([
        args.usize_or("pad_t", 0)?,
        args.usize_or("pad_l", 0)?,
        args.usize_or("pad_b", 0)?,
        args.usize_or("pad_r", 0)?,
    ])
}

/// Transposes `value` into NCHW when the operator works in NHWC.
fn to_nchw(
    op: &OperatorRecord,
    ctx: &mut Lowering<'_>,
    order: Order,
    value: NodeValue,
    suffix: &str,
) -> Result<NodeValue, LoadError> {
    match order {
        Order::Nchw => Ok(value),
        Order::Nhwc => built(
            op,
            ctx.graph
                .create_transpose(Lowering::node_name(op, suffix), value, NHWC_TO_NCHW.to_vec()),
        ),
    }
}

/// Transposes an NCHW result back to the operator's order and binds it.
fn bind_result(
    op: &OperatorRecord,
    ctx: &mut Lowering<'_>,
    order: Order,
    value: NodeValue,
) -> Result<(), LoadError> {
    let value = match order {
        Order::Nchw => value,
        Order::Nhwc => built(
            op,
            ctx.graph
                .create_transpose(Lowering::node_name(op, "to_nhwc"), value, NCHW_TO_NHWC.to_vec()),
        )?,
    };
    ctx.bind_output(op, 0, value)
}

fn require_rank4(op: &OperatorRecord, what: &str, dims: &[usize]) -> Result<(), LoadError> {
    if dims.len() != 4 {
        return Err(LoadError::shape(
            op.label(),
            format!("{what} must be 4-D, got {dims:?}"),
        ));
    }
    Ok(())
}

pub(super) fn lower_conv(op: &OperatorRecord, ctx: &mut Lowering<'_>) -> Result<(), LoadError> {
    let order = Order::read(op)?;
    let window = Window::read(op)?;
    let group = ArgReader::new(op).usize_or("group", 1)?;

    let input = ctx.input(op, 0)?;
    let filter = ctx.input(op, 1)?;
    let bias = ctx.optional_input(op, 2)?;

    require_rank4(op, "input", ctx.ty(op, input)?.dims())?;
    require_rank4(op, "filter", ctx.ty(op, filter)?.dims())?;

    let input = to_nchw(op, ctx, order, input, "input_nchw")?;
    let filter = to_nchw(op, ctx, order, filter, "filter_nchw")?;

    let filter_dims = ctx.ty(op, filter)?.dims().to_vec();
    let kernel = window.kernel.unwrap_or([filter_dims[2], filter_dims[3]]);
    let params = Conv2dParams {
        kernel,
        stride: window.stride,
        pads: window.pads,
        group,
    };
    let conv = built(
        op,
        ctx.graph
            .create_convolution(op.label(), input, filter, bias, params),
    )?;
    bind_result(op, ctx, order, conv)
}

fn lower_pool(
    op: &OperatorRecord,
    ctx: &mut Lowering<'_>,
    mode: PoolMode,
) -> Result<(), LoadError> {
    let order = Order::read(op)?;
    let window = Window::read(op)?;
    let global = ArgReader::new(op).flag("global_pooling")?;

    let input = ctx.input(op, 0)?;
    require_rank4(op, "input", ctx.ty(op, input)?.dims())?;
    let input = to_nchw(op, ctx, order, input, "input_nchw")?;
    let dims = ctx.ty(op, input)?.dims().to_vec();

    let (kernel, pads) = if global {
        if window.kernel.is_some() {
            tracing::warn!(op = op.label(), "global_pooling overrides the kernel argument");
        }
        ([dims[2], dims[3]], [0; 4])
    } else {
        let kernel = window.kernel.ok_or_else(|| {
            LoadError::malformed(op.label(), "kernel", "required unless global_pooling is set")
        })?;
        (kernel, window.pads)
    };
    let params = PoolParams {
        mode,
        kernel,
        stride: if global { [1, 1] } else { window.stride },
        pads,
    };
    let pooled = built(op, ctx.graph.create_pool(op.label(), input, params))?;
    bind_result(op, ctx, order, pooled)
}

pub(super) fn lower_max_pool(op: &OperatorRecord, ctx: &mut Lowering<'_>) -> Result<(), LoadError> {
    lower_pool(op, ctx, PoolMode::Max)
}

pub(super) fn lower_average_pool(
    op: &OperatorRecord,
    ctx: &mut Lowering<'_>,
) -> Result<(), LoadError> {
    lower_pool(op, ctx, PoolMode::Avg)
}

#[cfg(test)]
mod tests {
    use super::super::test_util::Fixture;
    use super::*;
    use crate::record::ArgValue;
    use graph_ir::NodeKind;
    use tensor_core::{Shape, Tensor};

    fn ones_filter(out: usize, cin: usize, k: usize) -> Tensor {
        Tensor::splat(Shape::new(vec![out, cin, k, k]), tensor_core::DType::F32, 1.0)
    }

    #[test]
    fn test_kernel_defaults_to_filter_extent() {
        let mut fx = Fixture::new(&[("x", vec![1, 1, 3, 3])])
            .with_constant("w", ones_filter(1, 1, 2))
            .with_constant("b", Tensor::from_f32(Shape::vector(1), &[2.0]).unwrap());
        let op = OperatorRecord::new("Conv", &["x", "w", "b"], &["y"])
            .with_arg("pad", ArgValue::Int(1));
        fx.lower(&op).unwrap();
        assert_eq!(fx.output_type("y").dims(), &[1, 1, 4, 4]);
        assert_eq!(fx.labels(), vec!["Convolution"]);
    }

    #[test]
    fn test_strides_and_split_pads() {
        let mut fx = Fixture::new(&[("x", vec![1, 2, 7, 7])]).with_constant("w", ones_filter(4, 2, 3));
        let op = OperatorRecord::new("Conv", &["x", "w"], &["y"])
            .with_arg("strides", ArgValue::Ints(vec![2, 2]))
            .with_arg("pad_t", ArgValue::Int(1))
            .with_arg("pad_b", ArgValue::Int(1));
        fx.lower(&op).unwrap();
        // h: (7 + 2 - 3) / 2 + 1 = 4, w: (7 - 3) / 2 + 1 = 3
        assert_eq!(fx.output_type("y").dims(), &[1, 4, 4, 3]);
    }

    #[test]
    fn test_nhwc_wraps_in_transposes() {
        let mut fx = Fixture::new(&[("x", vec![1, 5, 5, 3])])
            .with_constant("w", Tensor::zeros(Shape::new(vec![8, 2, 2, 3]), tensor_core::DType::F32));
        let op = OperatorRecord::new("Conv", &["x", "w"], &["y"])
            .with_arg("order", ArgValue::Str("NHWC".into()));
        fx.lower(&op).unwrap();
        assert_eq!(fx.output_type("y").dims(), &[1, 4, 4, 8]);
        assert_eq!(
            fx.labels(),
            vec!["Transpose", "Transpose", "Convolution", "Transpose"]
        );
    }

    #[test]
    fn test_kernel_disagreeing_with_filter() {
        let mut fx = Fixture::new(&[("x", vec![1, 1, 4, 4])]).with_constant("w", ones_filter(1, 1, 2));
        let op = OperatorRecord::new("Conv", &["x", "w"], &["y"]).with_arg("kernel", ArgValue::Int(3));
        assert!(matches!(fx.lower(&op), Err(LoadError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_dilation_rejected() {
        let mut fx = Fixture::new(&[("x", vec![1, 1, 4, 4])]).with_constant("w", ones_filter(1, 1, 2));
        let op = OperatorRecord::new("Conv", &["x", "w"], &["y"]).with_arg("dilation", ArgValue::Int(2));
        assert!(matches!(
            fx.lower(&op),
            Err(LoadError::MalformedArgument { arg, .. }) if arg == "dilation"
        ));
    }

    #[test]
    fn test_pools() {
        let mut fx = Fixture::new(&[("x", vec![2, 3, 6, 6])]);
        let max = OperatorRecord::new("MaxPool", &["x"], &["m"])
            .with_arg("kernel", ArgValue::Int(2))
            .with_arg("stride", ArgValue::Int(2));
        let global = OperatorRecord::new("AveragePool", &["x"], &["g"])
            .with_arg("global_pooling", ArgValue::Int(1));
        fx.lower(&max).unwrap();
        fx.lower(&global).unwrap();
        assert_eq!(fx.output_type("m").dims(), &[2, 3, 3, 3]);
        assert_eq!(fx.output_type("g").dims(), &[2, 3, 1, 1]);

        let pool_modes: Vec<_> = fx
            .graph
            .nodes()
            .iter()
            .filter_map(|n| match &n.kind {
                NodeKind::Pool { params, .. } => Some(params.mode),
                _ => None,
            })
            .collect();
        assert_eq!(pool_modes, vec![PoolMode::Max, PoolMode::Avg]);
    }

    #[test]
    fn test_pool_without_kernel() {
        let mut fx = Fixture::new(&[("x", vec![1, 1, 4, 4])]);
        let op = OperatorRecord::new("MaxPool", &["x"], &["y"]);
        assert!(matches!(
            fx.lower(&op),
            Err(LoadError::MalformedArgument { arg, .. }) if arg == "kernel"
        ));
    }
}
