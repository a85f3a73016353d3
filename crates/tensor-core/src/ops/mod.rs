// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor kernels.
//!
//! Each operation writes into a pre-allocated output tensor whose shape and
//! type the caller has already derived. Kernels re-check that contract and
//! fail with a [`TensorError`] instead of resizing the output.
//!
//! Layout kernels (transpose, slice, concat, broadcast, select) are generic
//! over every [`DType`]; math kernels are `F32` only unless noted.

mod conv_op;
mod elementwise_op;
mod layout_op;
mod matmul_op;
mod pool_op;
mod softmax_op;

pub use conv_op::{conv2d, conv_output_shape};
pub use elementwise_op::{arithmetic, clip, is_nan, unary};
pub use layout_op::{
    broadcast, check_broadcast, concat, concat_shape, reshape, select, slice, splat, transpose,
    transposed_shape,
};
pub use matmul_op::matmul;
pub use pool_op::{pool2d, pool_output_shape};
pub use softmax_op::softmax;

use crate::{DType, Element, Shape, Tensor, TensorError};

// ── Operator parameters ────────────────────────────────────────────────────

/// Binary elementwise arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithmeticOp {
    /// Applies the operation to a pair of scalars.
    #[inline]
    pub fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            ArithmeticOp::Add => a + b,
            ArithmeticOp::Sub => a - b,
            ArithmeticOp::Mul => a * b,
            ArithmeticOp::Div => a / b,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "add",
            ArithmeticOp::Sub => "sub",
            ArithmeticOp::Mul => "mul",
            ArithmeticOp::Div => "div",
        }
    }
}

/// Unary activation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum UnaryOp {
    Relu,
    Sigmoid,
    Tanh,
}

impl UnaryOp {
    #[inline]
    pub fn apply(self, x: f32) -> f32 {
        match self {
            UnaryOp::Relu => x.max(0.0),
            UnaryOp::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            UnaryOp::Tanh => x.tanh(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Relu => "relu",
            UnaryOp::Sigmoid => "sigmoid",
            UnaryOp::Tanh => "tanh",
        }
    }
}

/// Parameters of a 2-D NCHW convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Conv2dParams {
    /// Kernel extent `[height, width]`.
    pub kernel: [usize; 2],
    /// Stride `[height, width]`.
    pub stride: [usize; 2],
    /// Padding `[top, left, bottom, right]`.
    pub pads: [usize; 4],
    /// Number of channel groups.
    pub group: usize,
}

impl Conv2dParams {
    /// Output spatial extent for an `in_h x in_w` input, or `None` when the
    /// padded input is smaller than the kernel or the stride is zero.
    pub fn output_hw(&self, in_h: usize, in_w: usize) -> Option<(usize, usize)> {
        window_output_hw(self.kernel, self.stride, self.pads, in_h, in_w)
    }
}

/// Reduction applied over each pooling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PoolMode {
    Max,
    /// Mean over the in-bounds cells of the window (padding excluded).
    Avg,
}

/// Parameters of a 2-D NCHW pooling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PoolParams {
    pub mode: PoolMode,
    pub kernel: [usize; 2],
    pub stride: [usize; 2],
    pub pads: [usize; 4],
}

impl PoolParams {
    pub fn output_hw(&self, in_h: usize, in_w: usize) -> Option<(usize, usize)> {
        window_output_hw(self.kernel, self.stride, self.pads, in_h, in_w)
    }
}

/// `floor((in + pad_begin + pad_end - kernel) / stride) + 1` per spatial axis.
fn window_output_hw(
    kernel: [usize; 2],
    stride: [usize; 2],
    pads: [usize; 4],
    in_h: usize,
    in_w: usize,
) -> Option<(usize, usize)> {
    if stride[0] == 0 || stride[1] == 0 || kernel[0] == 0 || kernel[1] == 0 {
        return None;
    }
    let padded_h = in_h + pads[0] + pads[2];
    let padded_w = in_w + pads[1] + pads[3];
    let out_h = padded_h.checked_sub(kernel[0])? / stride[0] + 1;
    let out_w = padded_w.checked_sub(kernel[1])? / stride[1] + 1;
    Some((out_h, out_w))
}

// ── Shared kernel helpers ──────────────────────────────────────────────────

fn typed<'a, T: Element>(t: &'a Tensor, op: &'static str) -> Result<&'a [T], TensorError> {
    t.as_slice::<T>().ok_or(TensorError::DTypeMismatch {
        op,
        lhs: T::DTYPE,
        rhs: t.dtype(),
    })
}

fn typed_mut<'a, T: Element>(
    t: &'a mut Tensor,
    op: &'static str,
) -> Result<&'a mut [T], TensorError> {
    let dtype = t.dtype();
    t.as_mut_slice::<T>().ok_or(TensorError::DTypeMismatch {
        op,
        lhs: T::DTYPE,
        rhs: dtype,
    })
}

fn require_f32(t: &Tensor, op: &'static str) -> Result<(), TensorError> {
    if t.dtype() != DType::F32 {
        return Err(TensorError::UnsupportedDType { op, dtype: t.dtype() });
    }
    Ok(())
}

fn require_shape(op: &'static str, expected: &Shape, actual: &Shape) -> Result<(), TensorError> {
    if expected != actual {
        return Err(TensorError::ShapeMismatch {
            op,
            lhs: expected.clone(),
            rhs: actual.clone(),
        });
    }
    Ok(())
}

/// Advances `coords` to the next row-major position inside `dims`.
///
/// Returns `false` once every position has been visited.
fn next_coords(coords: &mut [usize], dims: &[usize]) -> bool {
    for axis in (0..dims.len()).rev() {
        coords[axis] += 1;
        if coords[axis] < dims[axis] {
            return true;
        }
        coords[axis] = 0;
    }
    false
}
