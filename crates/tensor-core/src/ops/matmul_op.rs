// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Matrix multiplication operation.

use super::{require_f32, require_shape};
use crate::{Shape, Tensor, TensorError};

/// Performs matrix multiplication: `output = lhs @ rhs`.
///
/// Both inputs must be 2-D `F32` tensors with compatible inner dimensions:
/// `lhs` is `[M, K]`, `rhs` is `[K, N]`, and `output` must be `[M, N]`.
/// Batched products are expressed by the importer as slices of 2-D products,
/// so no batch dimension is accepted here.
///
/// # Errors
/// Returns [`TensorError::ShapeMismatch`] if dimensions are incompatible.
/// Returns [`TensorError::UnsupportedDType`] if the dtype is not `F32`.
pub fn matmul(lhs: &Tensor, rhs: &Tensor, output: &mut Tensor) -> Result<(), TensorError> {
    require_f32(lhs, "matmul")?;
    require_f32(rhs, "matmul")?;
    require_f32(output, "matmul")?;

    if !lhs.shape().is_matmul_compatible(rhs.shape()) {
        return Err(TensorError::ShapeMismatch {
            op: "matmul",
            lhs: lhs.shape().clone(),
            rhs: rhs.shape().clone(),
        });
    }

    let (m, k) = (lhs.shape().dims()[0], lhs.shape().dims()[1]);
    let n = rhs.shape().dims()[1];
    require_shape("matmul (output)", &Shape::matrix(m, n), output.shape())?;

    matmul_f32(lhs.as_f32_slice(), rhs.as_f32_slice(), output.as_f32_slice_mut(), m, k, n);
    Ok(())
}

/// Portable f32 matrix multiplication.
///
/// ikj loop order keeps the inner loop a saxpy over a contiguous row of `c`.
fn matmul_f32(a: &[f32], b: &[f32], c: &mut [f32], m: usize, k: usize, n: usize) {
    c.fill(0.0);
    if n == 0 {
        return;
    }
    for (i, c_row) in c.chunks_exact_mut(n).enumerate().take(m) {
        for p in 0..k {
            let a_ip = a[i * k + p];
            let b_row = &b[p * n..(p + 1) * n];
            for (cj, &bj) in c_row.iter_mut().zip(b_row) {
                *cj += a_ip * bj;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DType;

    #[test]
    fn test_matmul_2x3_times_3x2() {
        // [[1, 2, 3], [4, 5, 6]] @ [[7, 8], [9, 10], [11, 12]] = [[58, 64], [139, 154]]
        let a = Tensor::from_f32(Shape::matrix(2, 3), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let b =
            Tensor::from_f32(Shape::matrix(3, 2), &[7.0, 8.0, 9.0, 10.0, 11.0, 12.0]).unwrap();
        let mut c = Tensor::zeros(Shape::matrix(2, 2), DType::F32);

        matmul(&a, &b, &mut c).unwrap();

        assert_eq!(c.as_f32_slice(), &[58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_matmul_overwrites_stale_output() {
        let a = Tensor::from_f32(Shape::matrix(1, 1), &[3.0]).unwrap();
        let b = Tensor::from_f32(Shape::matrix(1, 1), &[4.0]).unwrap();
        let mut c = Tensor::splat(Shape::matrix(1, 1), DType::F32, 100.0);

        matmul(&a, &b, &mut c).unwrap();
        assert_eq!(c.as_f32_slice(), &[12.0]);
    }

    #[test]
    fn test_matmul_shape_mismatch() {
        let a = Tensor::zeros(Shape::matrix(2, 3), DType::F32);
        let b = Tensor::zeros(Shape::matrix(4, 2), DType::F32);
        let mut c = Tensor::zeros(Shape::matrix(2, 2), DType::F32);

        assert!(matches!(
            matmul(&a, &b, &mut c),
            Err(TensorError::ShapeMismatch { op: "matmul", .. })
        ));
    }

    #[test]
    fn test_matmul_rejects_wrong_output_shape() {
        let a = Tensor::zeros(Shape::matrix(2, 3), DType::F32);
        let b = Tensor::zeros(Shape::matrix(3, 4), DType::F32);
        let mut c = Tensor::zeros(Shape::matrix(4, 2), DType::F32);

        assert!(matmul(&a, &b, &mut c).is_err());
    }

    #[test]
    fn test_matmul_rejects_integer_input() {
        let a = Tensor::zeros(Shape::matrix(1, 1), DType::I32);
        let b = Tensor::zeros(Shape::matrix(1, 1), DType::F32);
        let mut c = Tensor::zeros(Shape::matrix(1, 1), DType::F32);

        assert!(matches!(
            matmul(&a, &b, &mut c),
            Err(TensorError::UnsupportedDType { dtype: DType::I32, .. })
        ));
    }
}
