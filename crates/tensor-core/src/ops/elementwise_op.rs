// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Elementwise math: activations, binary arithmetic, clipping and NaN tests.

use super::{require_f32, require_shape, typed_mut, ArithmeticOp, UnaryOp};
use crate::{DType, Tensor, TensorData, TensorError};

/// Applies `op` to every element of an `F32` tensor.
pub fn unary(op: UnaryOp, input: &Tensor, output: &mut Tensor) -> Result<(), TensorError> {
    require_f32(input, op.as_str())?;
    require_f32(output, op.as_str())?;
    require_shape(op.as_str(), input.shape(), output.shape())?;

    for (y, &x) in output.as_f32_slice_mut().iter_mut().zip(input.as_f32_slice()) {
        *y = op.apply(x);
    }
    Ok(())
}

/// Computes `output = lhs <op> rhs` over two `F32` tensors of identical shape.
///
/// Broadcasting is resolved before this kernel by an explicit broadcast node.
pub fn arithmetic(
    op: ArithmeticOp,
    lhs: &Tensor,
    rhs: &Tensor,
    output: &mut Tensor,
) -> Result<(), TensorError> {
    require_f32(lhs, op.as_str())?;
    require_f32(rhs, op.as_str())?;
    require_f32(output, op.as_str())?;
    require_shape(op.as_str(), lhs.shape(), rhs.shape())?;
    require_shape(op.as_str(), lhs.shape(), output.shape())?;

    let (a, b) = (lhs.as_f32_slice(), rhs.as_f32_slice());
    for ((y, &x0), &x1) in output.as_f32_slice_mut().iter_mut().zip(a).zip(b) {
        *y = op.apply(x0, x1);
    }
    Ok(())
}

/// Clamps every element into `[min, max]`, with the bounds converted to the
/// tensor's element type.
///
/// NaN inputs stay NaN. Boolean tensors are rejected.
pub fn clip(input: &Tensor, min: f64, max: f64, output: &mut Tensor) -> Result<(), TensorError> {
    if input.dtype() != output.dtype() {
        return Err(TensorError::DTypeMismatch {
            op: "clip",
            lhs: input.dtype(),
            rhs: output.dtype(),
        });
    }
    require_shape("clip", input.shape(), output.shape())?;
    if min > max {
        return Err(TensorError::InvalidArgument {
            op: "clip",
            detail: format!("min {min} is greater than max {max}"),
        });
    }

    macro_rules! clamp_into {
        ($src:expr, $ty:ty) => {{
            let (lo, hi) = (min as $ty, max as $ty);
            let dst = typed_mut::<$ty>(output, "clip")?;
            for (y, &x) in dst.iter_mut().zip($src) {
                *y = if x < lo {
                    lo
                } else if x > hi {
                    hi
                } else {
                    x
                };
            }
        }};
    }

    match input.data() {
        TensorData::F32(src) => clamp_into!(src, f32),
        TensorData::I8(src) => clamp_into!(src, i8),
        TensorData::U8(src) => clamp_into!(src, u8),
        TensorData::I32(src) => clamp_into!(src, i32),
        TensorData::I64(src) => clamp_into!(src, i64),
        TensorData::Bool(_) => {
            return Err(TensorError::UnsupportedDType {
                op: "clip",
                dtype: DType::Bool,
            })
        }
    }
    Ok(())
}

/// Writes `true` where the `F32` input holds an IEEE-754 NaN.
///
/// Infinities are not NaN and map to `false`.
pub fn is_nan(input: &Tensor, output: &mut Tensor) -> Result<(), TensorError> {
    require_f32(input, "is_nan")?;
    require_shape("is_nan", input.shape(), output.shape())?;

    let dst = typed_mut::<bool>(output, "is_nan")?;
    for (y, &x) in dst.iter_mut().zip(input.as_f32_slice()) {
        *y = x.is_nan();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Shape;

    #[test]
    fn test_relu() {
        let x = Tensor::from_f32(Shape::vector(3), &[-1.0, 0.0, 2.5]).unwrap();
        let mut y = Tensor::zeros(Shape::vector(3), DType::F32);
        unary(UnaryOp::Relu, &x, &mut y).unwrap();
        assert_eq!(y.as_f32_slice(), &[0.0, 0.0, 2.5]);
    }

    #[test]
    fn test_arithmetic_div() {
        let a = Tensor::from_f32(Shape::vector(2), &[6.0, 1.0]).unwrap();
        let b = Tensor::from_f32(Shape::vector(2), &[3.0, 4.0]).unwrap();
        let mut y = Tensor::zeros(Shape::vector(2), DType::F32);
        arithmetic(ArithmeticOp::Div, &a, &b, &mut y).unwrap();
        assert_eq!(y.as_f32_slice(), &[2.0, 0.25]);
    }

    #[test]
    fn test_arithmetic_requires_equal_shapes() {
        let a = Tensor::zeros(Shape::vector(2), DType::F32);
        let b = Tensor::zeros(Shape::vector(3), DType::F32);
        let mut y = Tensor::zeros(Shape::vector(2), DType::F32);
        assert!(arithmetic(ArithmeticOp::Add, &a, &b, &mut y).is_err());
    }

    #[test]
    fn test_clip_f32() {
        let x = Tensor::from_f32(Shape::vector(4), &[10.0, 20.0, 45.0, 99.0]).unwrap();
        let mut y = Tensor::zeros(Shape::vector(4), DType::F32);
        clip(&x, 20.0, 60.0, &mut y).unwrap();
        assert_eq!(y.as_f32_slice(), &[20.0, 20.0, 45.0, 60.0]);
    }

    #[test]
    fn test_clip_full_range_is_identity() {
        let x = Tensor::from_f32(Shape::vector(3), &[-3.0e38, 0.0, 3.0e38]).unwrap();
        let mut y = Tensor::zeros(Shape::vector(3), DType::F32);
        clip(&x, DType::F32.lowest(), DType::F32.highest(), &mut y).unwrap();
        assert_eq!(y, x);
    }

    #[test]
    fn test_clip_i64() {
        let x = Tensor::from_vec(Shape::vector(3), vec![-5i64, 3, 8]).unwrap();
        let mut y = Tensor::zeros(Shape::vector(3), DType::I64);
        clip(&x, 0.0, 4.0, &mut y).unwrap();
        assert_eq!(y.as_slice::<i64>(), Some(&[0i64, 3, 4][..]));
    }

    #[test]
    fn test_is_nan_ignores_infinities() {
        let x = Tensor::from_f32(
            Shape::vector(4),
            &[f32::NAN, 1.0, f32::INFINITY, f32::NEG_INFINITY],
        )
        .unwrap();
        let mut y = Tensor::zeros(Shape::vector(4), DType::Bool);
        is_nan(&x, &mut y).unwrap();
        assert_eq!(y.as_slice::<bool>(), Some(&[true, false, false, false][..]));
    }
}
