// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Max and average pooling over NCHW tensors.

use super::{require_f32, require_shape, PoolMode, PoolParams};
use crate::{Shape, Tensor, TensorError};

/// Pools each `kernel`-sized window of an `[N, C, H, W]` input.
///
/// Padding cells are never part of a window's reduction: max pooling ignores
/// them and average pooling divides by the in-bounds cell count.
pub fn pool2d(input: &Tensor, params: &PoolParams, output: &mut Tensor) -> Result<(), TensorError> {
    require_f32(input, "pool2d")?;
    require_f32(output, "pool2d")?;
    let expected = pool_output_shape(input.shape(), params)?;
    require_shape("pool2d (output)", &expected, output.shape())?;

    let d = input.shape().dims();
    let (planes, in_h, in_w) = (d[0] * d[1], d[2], d[3]);
    let (out_h, out_w) = (expected.dims()[2], expected.dims()[3]);
    let [kh, kw] = params.kernel;
    let [sh, sw] = params.stride;
    let (pad_t, pad_l) = (params.pads[0] as isize, params.pads[1] as isize);

    let x = input.as_f32_slice();
    let y = output.as_f32_slice_mut();

    for p in 0..planes {
        let plane = &x[p * in_h * in_w..(p + 1) * in_h * in_w];
        for oh in 0..out_h {
            let h0 = (oh * sh) as isize - pad_t;
            let rows = h0.max(0) as usize..((h0 + kh as isize).max(0) as usize).min(in_h);
            for ow in 0..out_w {
                let w0 = (ow * sw) as isize - pad_l;
                let cols = w0.max(0) as usize..((w0 + kw as isize).max(0) as usize).min(in_w);

                let mut max = f32::NEG_INFINITY;
                let mut sum = 0.0f32;
                let mut count = 0usize;
                for r in rows.clone() {
                    for v in &plane[r * in_w + cols.start..r * in_w + cols.end] {
                        max = max.max(*v);
                        sum += v;
                        count += 1;
                    }
                }

                y[(p * out_h + oh) * out_w + ow] = match params.mode {
                    PoolMode::Max => max,
                    PoolMode::Avg if count == 0 => 0.0,
                    PoolMode::Avg => sum / count as f32,
                };
            }
        }
    }

    Ok(())
}

/// Derives the NCHW output shape of a pooling window.
pub fn pool_output_shape(input: &Shape, params: &PoolParams) -> Result<Shape, TensorError> {
    let invalid = |detail: String| TensorError::InvalidArgument { op: "pool2d", detail };
    if input.rank() != 4 {
        return Err(invalid(format!("expected an NCHW input, got {input}")));
    }
    let d = input.dims();
    let (out_h, out_w) = params.output_hw(d[2], d[3]).ok_or_else(|| {
        invalid(format!(
            "kernel {:?} with stride {:?} does not fit input {input}",
            params.kernel, params.stride
        ))
    })?;
    Ok(Shape::new(vec![d[0], d[1], out_h, out_w]))
}
