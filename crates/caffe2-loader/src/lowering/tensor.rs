// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Layout lowerings: Concat, Transpose, Reshape, Flatten and Dropout.

use super::{built, canonical_axis, Lowering};
use crate::args::ArgReader;
use crate::record::OperatorRecord;
use crate::LoadError;
use tensor_core::{DType, Shape, Tensor};

pub(super) fn lower_concat(op: &OperatorRecord, ctx: &mut Lowering<'_>) -> Result<(), LoadError> {
    let args = ArgReader::new(op);
    let add_axis = args.flag("add_axis")?;
    let axis = match args.int("axis")? {
        Some(axis) => axis,
        None if args.str("order")? == Some("NHWC") => 3,
        None => 1,
    };

    let inputs = ctx.inputs(op, 1)?;
    let mut types = Vec::with_capacity(inputs.len());
    for &v in &inputs {
        types.push(ctx.ty(op, v)?);
    }
    let first = types[0].dims().to_vec();
    let count = inputs.len();

    let (value, extents) = if add_axis {
        // The new axis indexes the output, whose rank is one higher.
        let axis = canonical_axis(op, "axis", axis, first.len() + 1)?;
        if let Some(t) = types.iter().find(|t| t.dims() != first.as_slice()) {
            return Err(LoadError::shape(
                op.label(),
                format!("add_axis needs equal input shapes, got {:?} and {:?}", first, t.dims()),
            ));
        }
        let mut stacked = first.clone();
        stacked.insert(axis, count);

        let value = if axis < first.len() {
            let joined = built(
                op,
                ctx.graph.create_concat(op.label(), inputs, axis),
            )?;
            built(
                op,
                ctx.graph
                    .create_reshape(Lowering::node_name(op, "stack"), joined, stacked),
            )?
        } else {
            let mut unit = first.clone();
            unit.push(1);
            let mut expanded = Vec::with_capacity(count);
            for (i, v) in inputs.into_iter().enumerate() {
                let name = Lowering::node_name(op, &format!("expand{i}"));
                expanded.push(built(op, ctx.graph.create_reshape(name, v, unit.clone()))?);
            }
            built(op, ctx.graph.create_concat(op.label(), expanded, axis))?
        };
        (value, vec![1; count])
    } else {
        let axis = canonical_axis(op, "axis", axis, first.len())?;
        let extents = types
            .iter()
            .map(|t| t.dims().get(axis).copied().unwrap_or(0))
            .collect();
        let value = built(op, ctx.graph.create_concat(op.label(), inputs, axis))?;
        (value, extents)
    };

    ctx.bind_output(op, 0, value)?;
    if op.outputs.len() > 1 {
        let split_info = extents
            .into_iter()
            .map(|e| {
                i32::try_from(e)
                    .map_err(|_| LoadError::shape(op.label(), format!("extent {e} overflows i32")))
            })
            .collect::<Result<Vec<i32>, _>>()?;
        let tensor = Tensor::from_vec(Shape::vector(count), split_info)
            .map_err(|e| LoadError::shape(op.label(), e.to_string()))?;
        ctx.bind_constant_output(op, 1, tensor)?;
    }
    Ok(())
}

pub(super) fn lower_transpose(op: &OperatorRecord, ctx: &mut Lowering<'_>) -> Result<(), LoadError> {
    let input = ctx.input(op, 0)?;
    let rank = ctx.ty(op, input)?.dims().len();
    let perm = ArgReader::new(op)
        .usizes("axes")?
        .unwrap_or_else(|| (0..rank).rev().collect());
    let value = built(op, ctx.graph.create_transpose(op.label(), input, perm))?;
    ctx.bind_output(op, 0, value)
}

/// Resolves Caffe2 reshape dims: `0` copies the input dim at the same
/// position and a single `-1` absorbs the remaining elements.
fn resolve_reshape(op: &OperatorRecord, input: &[usize], spec: &[i64]) -> Result<Vec<usize>, LoadError> {
    let mut dims = Vec::with_capacity(spec.len());
    let mut inferred = None;
    for (i, &d) in spec.iter().enumerate() {
        let dim = match d {
            -1 => {
                if inferred.replace(i).is_some() {
                    return Err(LoadError::malformed(op.label(), "shape", "more than one -1"));
                }
                1
            }
            0 => *input.get(i).ok_or_else(|| {
                LoadError::malformed(
                    op.label(),
                    "shape",
                    format!("0 at position {i} but the input has rank {}", input.len()),
                )
            })?,
            d if d < 0 => {
                return Err(LoadError::malformed(op.label(), "shape", format!("invalid dim {d}")))
            }
            d => d as usize,
        };
        dims.push(dim);
    }

    let total: usize = input.iter().product();
    if let Some(i) = inferred {
        let known: usize = dims.iter().product();
        if known == 0 || total % known != 0 {
            return Err(LoadError::shape(
                op.label(),
                format!("cannot infer -1 reshaping {input:?} to {spec:?}"),
            ));
        }
        dims[i] = total / known;
    }
    if dims.iter().product::<usize>() != total {
        return Err(LoadError::shape(
            op.label(),
            format!("reshape {input:?} to {dims:?} changes the element count"),
        ));
    }
    Ok(dims)
}

pub(super) fn lower_reshape(op: &OperatorRecord, ctx: &mut Lowering<'_>) -> Result<(), LoadError> {
    let input = ctx.input(op, 0)?;
    let input_dims = ctx.ty(op, input)?.dims().to_vec();

    let spec = match ArgReader::new(op).ints("shape")? {
        Some(spec) => {
            if op.inputs.len() > 1 {
                tracing::warn!(op = op.label(), "shape argument given; ignoring the shape input");
            }
            spec
        }
        None => {
            let source = ctx.input(op, 1)?;
            let tensor = ctx.constant(source).ok_or_else(|| {
                LoadError::malformed(op.label(), "shape", "the shape input must be a weight")
            })?;
            let dtype = tensor.dtype();
            tensor
                .to_i64_vec()
                .filter(|_| matches!(dtype, DType::I32 | DType::I64))
                .ok_or_else(|| {
                    LoadError::malformed(
                        op.label(),
                        "shape",
                        format!("the shape input must hold i32 or i64, got {dtype}"),
                    )
                })?
        }
    };

    let dims = resolve_reshape(op, &input_dims, &spec)?;
    let value = built(op, ctx.graph.create_reshape(op.label(), input, dims))?;
    ctx.bind_output(op, 0, value)?;

    if op.outputs.len() > 1 {
        let old: Vec<i64> = input_dims.iter().map(|&d| d as i64).collect();
        let tensor = Tensor::from_vec(Shape::vector(old.len()), old)
            .map_err(|e| LoadError::shape(op.label(), e.to_string()))?;
        ctx.bind_constant_output(op, 1, tensor)?;
    }
    Ok(())
}

pub(super) fn lower_flatten(op: &OperatorRecord, ctx: &mut Lowering<'_>) -> Result<(), LoadError> {
    let input = ctx.input(op, 0)?;
    let dims = ctx.ty(op, input)?.dims().to_vec();
    let axis = ArgReader::new(op).usize_or("axis", 1)?;
    if axis > dims.len() {
        return Err(LoadError::malformed(
            op.label(),
            "axis",
            format!("axis {axis} out of range for rank {}", dims.len()),
        ));
    }
    let outer = dims[..axis].iter().product();
    let inner = dims[axis..].iter().product();
    let value = built(op, ctx.graph.create_reshape(op.label(), input, vec![outer, inner]))?;
    ctx.bind_output(op, 0, value)
}

pub(super) fn lower_dropout(op: &OperatorRecord, ctx: &mut Lowering<'_>) -> Result<(), LoadError> {
    let input = ctx.input(op, 0)?;
    if op.outputs.len() > 1 {
        tracing::debug!(op = op.label(), mask = %op.outputs[1], "dropout mask left unbound");
    }
    ctx.bind_output(op, 0, input)
}
