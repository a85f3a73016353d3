// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Grouped 2-D convolution over NCHW tensors.

use super::{require_f32, require_shape, Conv2dParams};
use crate::{Shape, Tensor, TensorError};

/// Computes a direct (non-im2col) NCHW convolution.
///
/// - `input`: `[N, C_in, H, W]`
/// - `filter`: `[C_out, C_in / group, kh, kw]`
/// - `bias`: optional `[C_out]`
/// - `output`: `[N, C_out, H_out, W_out]` per [`Conv2dParams::output_hw`]
///
/// Padding cells contribute zero.
pub fn conv2d(
    input: &Tensor,
    filter: &Tensor,
    bias: Option<&Tensor>,
    params: &Conv2dParams,
    output: &mut Tensor,
) -> Result<(), TensorError> {
    require_f32(input, "conv2d")?;
    require_f32(filter, "conv2d")?;
    require_f32(output, "conv2d")?;

    let expected = conv_output_shape(input.shape(), filter.shape(), params)?;
    require_shape("conv2d (output)", &expected, output.shape())?;

    let in_dims = input.shape().dims();
    let (batch, in_c, in_h, in_w) = (in_dims[0], in_dims[1], in_dims[2], in_dims[3]);
    let f_dims = filter.shape().dims();
    let (out_c, group_c, kh, kw) = (f_dims[0], f_dims[1], f_dims[2], f_dims[3]);
    let (out_h, out_w) = (expected.dims()[2], expected.dims()[3]);
    let out_per_group = out_c / params.group;

    let bias_values = match bias {
        Some(b) => {
            require_f32(b, "conv2d")?;
            require_shape("conv2d (bias)", &Shape::vector(out_c), b.shape())?;
            Some(b.as_f32_slice())
        }
        None => None,
    };

    let x = input.as_f32_slice();
    let w = filter.as_f32_slice();
    let y = output.as_f32_slice_mut();
    let [stride_h, stride_w] = params.stride;
    let (pad_t, pad_l) = (params.pads[0], params.pads[1]);

    for n in 0..batch {
        for oc in 0..out_c {
            let g = oc / out_per_group;
            let b = bias_values.map_or(0.0, |bv| bv[oc]);
            for oh in 0..out_h {
                for ow in 0..out_w {
                    let mut acc = b;
                    for gc in 0..group_c {
                        let ic = g * group_c + gc;
                        for i in 0..kh {
                            // Signed arithmetic: the window may start in the padding.
                            let ih = (oh * stride_h + i) as isize - pad_t as isize;
                            if ih < 0 || ih as usize >= in_h {
                                continue;
                            }
                            for j in 0..kw {
                                let iw = (ow * stride_w + j) as isize - pad_l as isize;
                                if iw < 0 || iw as usize >= in_w {
                                    continue;
                                }
                                let xi = ((n * in_c + ic) * in_h + ih as usize) * in_w
                                    + iw as usize;
                                let wi = ((oc * group_c + gc) * kh + i) * kw + j;
                                acc += x[xi] * w[wi];
                            }
                        }
                    }
                    y[((n * out_c + oc) * out_h + oh) * out_w + ow] = acc;
                }
            }
        }
    }

    Ok(())
}

/// Derives the NCHW output shape of a convolution, validating channel and
/// kernel agreement between `input` and `filter`.
pub fn conv_output_shape(
    input: &Shape,
    filter: &Shape,
    params: &Conv2dParams,
) -> Result<Shape, TensorError> {
    let mismatch = || TensorError::ShapeMismatch {
        op: "conv2d",
        lhs: input.clone(),
        rhs: filter.clone(),
    };
    if input.rank() != 4 || filter.rank() != 4 || params.group == 0 {
        return Err(mismatch());
    }
    let (i, f) = (input.dims(), filter.dims());
    if i[1] != f[1] * params.group
        || f[0] % params.group != 0
        || [f[2], f[3]] != params.kernel
    {
        return Err(mismatch());
    }
    let (out_h, out_w) = params.output_hw(i[2], i[3]).ok_or_else(mismatch)?;
    Ok(Shape::new(vec![i[0], f[0], out_h, out_w]))
}
