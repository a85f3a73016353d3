// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Data-movement kernels, generic over every element type.

use super::{next_coords, require_shape, typed, typed_mut};
use crate::{DType, Element, Shape, Tensor, TensorError};

/// Calls `$f::<T>(args..)` with `T` matching `$dtype`.
macro_rules! dispatch {
    ($dtype:expr, $f:ident($($arg:expr),* $(,)?)) => {
        match $dtype {
            DType::F32 => $f::<f32>($($arg),*),
            DType::I8 => $f::<i8>($($arg),*),
            DType::U8 => $f::<u8>($($arg),*),
            DType::I32 => $f::<i32>($($arg),*),
            DType::I64 => $f::<i64>($($arg),*),
            DType::Bool => $f::<bool>($($arg),*),
        }
    };
}

fn require_same_dtype(op: &'static str, lhs: DType, rhs: DType) -> Result<(), TensorError> {
    if lhs != rhs {
        return Err(TensorError::DTypeMismatch { op, lhs, rhs });
    }
    Ok(())
}

// ── Reshape ────────────────────────────────────────────────────────────────

/// Copies `input` into `output`, which must hold the same number of elements.
pub fn reshape(input: &Tensor, output: &mut Tensor) -> Result<(), TensorError> {
    require_same_dtype("reshape", input.dtype(), output.dtype())?;
    if input.num_elements() != output.num_elements() {
        return Err(TensorError::ShapeMismatch {
            op: "reshape",
            lhs: input.shape().clone(),
            rhs: output.shape().clone(),
        });
    }
    *output.data_mut() = input.data().clone();
    Ok(())
}

// ── Transpose ──────────────────────────────────────────────────────────────

/// Permutes axes: `output.dims[i] == input.dims[perm[i]]`.
pub fn transpose(input: &Tensor, perm: &[usize], output: &mut Tensor) -> Result<(), TensorError> {
    require_same_dtype("transpose", input.dtype(), output.dtype())?;
    let expected = transposed_shape(input.shape(), perm)?;
    require_shape("transpose (output)", &expected, output.shape())?;
    dispatch!(input.dtype(), transpose_typed(input, perm, output))
}

/// Derives the shape produced by permuting `shape` with `perm`.
pub fn transposed_shape(shape: &Shape, perm: &[usize]) -> Result<Shape, TensorError> {
    let rank = shape.rank();
    let mut seen = vec![false; rank];
    let valid = perm.len() == rank
        && perm.iter().all(|&p| p < rank && !std::mem::replace(&mut seen[p], true));
    if !valid {
        return Err(TensorError::InvalidArgument {
            op: "transpose",
            detail: format!("{perm:?} is not a permutation of rank {rank}"),
        });
    }
    Ok(Shape::new(perm.iter().map(|&p| shape.dims()[p]).collect()))
}

fn transpose_typed<T: Element>(
    input: &Tensor,
    perm: &[usize],
    output: &mut Tensor,
) -> Result<(), TensorError> {
    let in_strides = input.shape().strides();
    let out_dims = output.shape().dims().to_vec();
    let src = typed::<T>(input, "transpose")?;
    let dst = typed_mut::<T>(output, "transpose")?;
    if dst.is_empty() {
        return Ok(());
    }

    let mut coords = vec![0usize; out_dims.len()];
    for y in dst.iter_mut() {
        let offset: usize = coords
            .iter()
            .zip(perm)
            .map(|(&c, &p)| c * in_strides[p])
            .sum();
        *y = src[offset];
        next_coords(&mut coords, &out_dims);
    }
    Ok(())
}

// ── Slice ──────────────────────────────────────────────────────────────────

/// Copies the window starting at `start` whose extent is `output`'s shape.
pub fn slice(input: &Tensor, start: &[usize], output: &mut Tensor) -> Result<(), TensorError> {
    require_same_dtype("slice", input.dtype(), output.dtype())?;
    let in_dims = input.shape().dims();
    let out_dims = output.shape().dims();
    let fits = start.len() == in_dims.len()
        && out_dims.len() == in_dims.len()
        && start
            .iter()
            .zip(out_dims)
            .zip(in_dims)
            .all(|((&s, &size), &dim)| s + size <= dim);
    if !fits {
        return Err(TensorError::InvalidArgument {
            op: "slice",
            detail: format!(
                "window at {start:?} of size {} exceeds input {}",
                output.shape(),
                input.shape()
            ),
        });
    }
    dispatch!(input.dtype(), slice_typed(input, start, output))
}

fn slice_typed<T: Element>(
    input: &Tensor,
    start: &[usize],
    output: &mut Tensor,
) -> Result<(), TensorError> {
    let in_strides = input.shape().strides();
    let out_dims = output.shape().dims().to_vec();
    let src = typed::<T>(input, "slice")?;
    let dst = typed_mut::<T>(output, "slice")?;
    if dst.is_empty() {
        return Ok(());
    }

    let mut coords = vec![0usize; out_dims.len()];
    for y in dst.iter_mut() {
        let offset: usize = coords
            .iter()
            .zip(start)
            .zip(&in_strides)
            .map(|((&c, &s), &stride)| (c + s) * stride)
            .sum();
        *y = src[offset];
        next_coords(&mut coords, &out_dims);
    }
    Ok(())
}

// ── Concat ─────────────────────────────────────────────────────────────────

/// Joins `inputs` along `axis`, in order.
pub fn concat(inputs: &[&Tensor], axis: usize, output: &mut Tensor) -> Result<(), TensorError> {
    let first = inputs.first().ok_or_else(|| TensorError::InvalidArgument {
        op: "concat",
        detail: "no inputs".to_string(),
    })?;
    require_same_dtype("concat", first.dtype(), output.dtype())?;
    for t in inputs {
        require_same_dtype("concat", first.dtype(), t.dtype())?;
    }
    let shapes: Vec<&Shape> = inputs.iter().map(|t| t.shape()).collect();
    let expected = concat_shape(&shapes, axis)?;
    require_shape("concat (output)", &expected, output.shape())?;
    dispatch!(first.dtype(), concat_typed(inputs, axis, output))
}

/// Derives the shape of a concatenation along `axis`.
pub fn concat_shape(shapes: &[&Shape], axis: usize) -> Result<Shape, TensorError> {
    let first = shapes.first().ok_or_else(|| TensorError::InvalidArgument {
        op: "concat",
        detail: "no inputs".to_string(),
    })?;
    if axis >= first.rank() {
        return Err(TensorError::InvalidArgument {
            op: "concat",
            detail: format!("axis {axis} out of range for {first}"),
        });
    }
    let mut dims = first.dims().to_vec();
    for s in &shapes[1..] {
        let agrees = s.rank() == first.rank()
            && s.dims()
                .iter()
                .zip(first.dims())
                .enumerate()
                .all(|(i, (a, b))| i == axis || a == b);
        if !agrees {
            return Err(TensorError::ShapeMismatch {
                op: "concat",
                lhs: (*first).clone(),
                rhs: (*s).clone(),
            });
        }
        dims[axis] += s.dims()[axis];
    }
    Ok(Shape::new(dims))
}

fn concat_typed<T: Element>(
    inputs: &[&Tensor],
    axis: usize,
    output: &mut Tensor,
) -> Result<(), TensorError> {
    let out_dims = output.shape().dims().to_vec();
    let outer: usize = out_dims[..axis].iter().product();
    let inner: usize = out_dims[axis + 1..].iter().product();
    let out_row = out_dims[axis] * inner;

    let dst = typed_mut::<T>(output, "concat")?;
    let mut col = 0;
    for t in inputs {
        let src = typed::<T>(t, "concat")?;
        let chunk = t.shape().dims()[axis] * inner;
        for o in 0..outer {
            dst[o * out_row + col..o * out_row + col + chunk]
                .copy_from_slice(&src[o * chunk..(o + 1) * chunk]);
        }
        col += chunk;
    }
    Ok(())
}

// ── Broadcast ──────────────────────────────────────────────────────────────

/// Expands `input` to `output`'s shape with its dims aligned at `axis`.
///
/// Each input dim must equal the target dim at the same aligned position or
/// be 1.
pub fn broadcast(input: &Tensor, axis: usize, output: &mut Tensor) -> Result<(), TensorError> {
    require_same_dtype("broadcast", input.dtype(), output.dtype())?;
    check_broadcast(input.shape(), output.shape(), axis)?;
    dispatch!(input.dtype(), broadcast_typed(input, axis, output))
}

/// Validates that `input` can be broadcast into `target` starting at `axis`.
pub fn check_broadcast(input: &Shape, target: &Shape, axis: usize) -> Result<(), TensorError> {
    let fits = axis + input.rank() <= target.rank()
        && input
            .dims()
            .iter()
            .zip(&target.dims()[axis..])
            .all(|(&d, &t)| d == t || d == 1);
    if !fits {
        return Err(TensorError::ShapeMismatch {
            op: "broadcast",
            lhs: input.clone(),
            rhs: target.clone(),
        });
    }
    Ok(())
}

fn broadcast_typed<T: Element>(
    input: &Tensor,
    axis: usize,
    output: &mut Tensor,
) -> Result<(), TensorError> {
    let in_dims = input.shape().dims().to_vec();
    let in_strides = input.shape().strides();
    let out_dims = output.shape().dims().to_vec();
    let src = typed::<T>(input, "broadcast")?;
    let dst = typed_mut::<T>(output, "broadcast")?;
    if dst.is_empty() {
        return Ok(());
    }

    let mut coords = vec![0usize; out_dims.len()];
    for y in dst.iter_mut() {
        let offset: usize = in_dims
            .iter()
            .enumerate()
            .map(|(i, &d)| if d == 1 { 0 } else { coords[axis + i] * in_strides[i] })
            .sum();
        *y = src[offset];
        next_coords(&mut coords, &out_dims);
    }
    Ok(())
}

// ── Splat / Select ─────────────────────────────────────────────────────────

/// Fills `output` with `value` converted to its element type.
pub fn splat(value: f64, output: &mut Tensor) {
    output.fill(value);
}

/// `output[i] = if cond[i] { on_true[i] } else { on_false[i] }`.
pub fn select(
    cond: &Tensor,
    on_true: &Tensor,
    on_false: &Tensor,
    output: &mut Tensor,
) -> Result<(), TensorError> {
    if cond.dtype() != DType::Bool {
        return Err(TensorError::UnsupportedDType {
            op: "select",
            dtype: cond.dtype(),
        });
    }
    require_same_dtype("select", on_true.dtype(), on_false.dtype())?;
    require_same_dtype("select", on_true.dtype(), output.dtype())?;
    for t in [on_true, on_false] {
        require_shape("select", cond.shape(), t.shape())?;
    }
    require_shape("select (output)", cond.shape(), output.shape())?;
    dispatch!(output.dtype(), select_typed(cond, on_true, on_false, output))
}

fn select_typed<T: Element>(
    cond: &Tensor,
    on_true: &Tensor,
    on_false: &Tensor,
    output: &mut Tensor,
) -> Result<(), TensorError> {
    let c = typed::<bool>(cond, "select")?;
    let a = typed::<T>(on_true, "select")?;
    let b = typed::<T>(on_false, "select")?;
    let dst = typed_mut::<T>(output, "select")?;
    for (i, y) in dst.iter_mut().enumerate() {
        *y = if c[i] { a[i] } else { b[i] };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iota(shape: Shape) -> Tensor {
        let data: Vec<f32> = (0..shape.num_elements()).map(|v| v as f32).collect();
        Tensor::from_f32(shape, &data).unwrap()
    }

    #[test]
    fn test_transpose_2d() {
        let x = iota(Shape::matrix(2, 3));
        let mut y = Tensor::zeros(Shape::matrix(3, 2), DType::F32);
        transpose(&x, &[1, 0], &mut y).unwrap();
        assert_eq!(y.as_f32_slice(), &[0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
    }

    #[test]
    fn test_transpose_nchw_to_nhwc_i64() {
        let x = Tensor::from_vec(Shape::new(vec![1, 2, 1, 2]), vec![1i64, 2, 3, 4]).unwrap();
        let mut y = Tensor::zeros(Shape::new(vec![1, 1, 2, 2]), DType::I64);
        transpose(&x, &[0, 2, 3, 1], &mut y).unwrap();
        assert_eq!(y.as_slice::<i64>(), Some(&[1i64, 3, 2, 4][..]));
    }

    #[test]
    fn test_transposed_shape_rejects_repeats() {
        assert!(transposed_shape(&Shape::matrix(2, 3), &[0, 0]).is_err());
        assert!(transposed_shape(&Shape::matrix(2, 3), &[0]).is_err());
    }

    #[test]
    fn test_slice_batch() {
        let x = iota(Shape::new(vec![3, 2, 2]));
        let mut y = Tensor::zeros(Shape::new(vec![1, 2, 2]), DType::F32);
        slice(&x, &[2, 0, 0], &mut y).unwrap();
        assert_eq!(y.as_f32_slice(), &[8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn test_slice_out_of_bounds() {
        let x = iota(Shape::matrix(2, 2));
        let mut y = Tensor::zeros(Shape::matrix(1, 2), DType::F32);
        assert!(slice(&x, &[2, 0], &mut y).is_err());
    }

    #[test]
    fn test_concat_columns_in_input_order() {
        let a = Tensor::from_f32(Shape::matrix(2, 1), &[1.0, 2.0]).unwrap();
        let b = Tensor::from_f32(Shape::matrix(2, 2), &[3.0, 4.0, 5.0, 6.0]).unwrap();
        let mut y = Tensor::zeros(Shape::matrix(2, 3), DType::F32);
        concat(&[&a, &b], 1, &mut y).unwrap();
        assert_eq!(y.as_f32_slice(), &[1.0, 3.0, 4.0, 2.0, 5.0, 6.0]);
    }

    #[test]
    fn test_concat_shape_mismatch() {
        let a = Shape::matrix(2, 1);
        let b = Shape::matrix(3, 1);
        assert!(matches!(
            concat_shape(&[&a, &b], 1),
            Err(TensorError::ShapeMismatch { op: "concat", .. })
        ));
    }

    #[test]
    fn test_broadcast_row_vector() {
        let b = Tensor::from_f32(Shape::vector(3), &[1.0, 2.0, 3.0]).unwrap();
        let mut y = Tensor::zeros(Shape::matrix(2, 3), DType::F32);
        broadcast(&b, 1, &mut y).unwrap();
        assert_eq!(y.as_f32_slice(), &[1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_broadcast_at_leading_axis() {
        let b = Tensor::from_f32(Shape::vector(2), &[1.0, 2.0]).unwrap();
        let mut y = Tensor::zeros(Shape::new(vec![2, 3]), DType::F32);
        broadcast(&b, 0, &mut y).unwrap();
        assert_eq!(y.as_f32_slice(), &[1.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_select() {
        let c = Tensor::from_vec(Shape::vector(3), vec![true, false, true]).unwrap();
        let a = Tensor::splat(Shape::vector(3), DType::F32, 1.0);
        let b = iota(Shape::vector(3));
        let mut y = Tensor::zeros(Shape::vector(3), DType::F32);
        select(&c, &a, &b, &mut y).unwrap();
        assert_eq!(y.as_f32_slice(), &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_reshape_copies_payload() {
        let x = iota(Shape::matrix(2, 2));
        let mut y = Tensor::zeros(Shape::vector(4), DType::F32);
        reshape(&x, &mut y).unwrap();
        assert_eq!(y.as_f32_slice(), x.as_f32_slice());
        assert_eq!(y.shape(), &Shape::vector(4));
    }
}
