// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Row-wise softmax.

use super::{require_f32, require_shape};
use crate::{Tensor, TensorError};

/// Computes softmax over each row of a 2-D `F32` tensor:
/// `output[r, j] = exp(x[r, j] - max_r) / sum_j exp(x[r, j] - max_r)`.
///
/// Inputs of other ranks are reshaped to 2-D by the importer before reaching
/// this kernel.
///
/// # Errors
/// Returns [`TensorError::ShapeMismatch`] if the input is not 2-D or the
/// output shape differs.
/// Returns [`TensorError::UnsupportedDType`] if the dtype is not `F32`.
pub fn softmax(input: &Tensor, output: &mut Tensor) -> Result<(), TensorError> {
    require_f32(input, "softmax")?;
    require_f32(output, "softmax")?;
    require_shape("softmax", input.shape(), output.shape())?;
    if input.shape().rank() != 2 {
        return Err(TensorError::InvalidArgument {
            op: "softmax",
            detail: format!("expected a 2-D input, got {}", input.shape()),
        });
    }

    let cols = input.shape().dims()[1];
    if cols == 0 {
        return Ok(());
    }

    let src = input.as_f32_slice();
    let dst = output.as_f32_slice_mut();
    for (row_src, row_dst) in src.chunks_exact(cols).zip(dst.chunks_exact_mut(cols)) {
        // Subtract the row max so exp() cannot overflow.
        let max_val = row_src.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0f32;
        for (d, &s) in row_dst.iter_mut().zip(row_src) {
            *d = (s - max_val).exp();
            sum += *d;
        }
        if sum > 0.0 {
            let inv_sum = sum.recip();
            row_dst.iter_mut().for_each(|d| *d *= inv_sum);
        }
    }

    Ok(())
}
