// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor shape descriptors and dimension utilities.

use std::fmt;

/// The extents of a [`crate::Tensor`], outermost first.
///
/// A rank-0 shape describes a scalar holding exactly one element. Any zero
/// extent makes the shape empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// # Examples
    /// ```
    /// use tensor_core::Shape;
    /// let s = Shape::new(vec![2, 3, 4]);
    /// assert_eq!(s.rank(), 3);
    /// assert_eq!(s.num_elements(), 24);
    /// ```
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    pub fn scalar() -> Self {
        Self::new(Vec::new())
    }

    pub fn vector(len: usize) -> Self {
        Self::new(vec![len])
    }

    pub fn matrix(rows: usize, cols: usize) -> Self {
        Self::new(vec![rows, cols])
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Product of the extents; 1 for a scalar.
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Extent of `axis`, or `None` past the rank.
    pub fn dim(&self, axis: usize) -> Option<usize> {
        self.dims.get(axis).copied()
    }

    /// Bytes needed to store this many `dtype` elements.
    pub fn size_bytes(&self, dtype: super::DType) -> usize {
        self.num_elements() * dtype.size_bytes()
    }

    /// Row-major element strides, innermost axis contiguous.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1usize; self.dims.len()];
        let mut step = 1;
        for (stride, &extent) in strides.iter_mut().zip(&self.dims).rev() {
            *stride = step;
            step *= extent;
        }
        strides
    }

    /// Row-major offset of `coords`, or `None` when the rank differs or a
    /// coordinate is out of range.
    pub fn flat_index(&self, coords: &[usize]) -> Option<usize> {
        if coords.len() != self.dims.len() {
            return None;
        }
        coords
            .iter()
            .zip(&self.dims)
            .zip(self.strides())
            .try_fold(0, |offset, ((&c, &extent), stride)| {
                (c < extent).then_some(offset + c * stride)
            })
    }

    /// This shape with a new axis of extent `size` at position `axis`.
    ///
    /// `axis` may equal the rank, which appends a trailing axis.
    pub fn with_inserted(&self, axis: usize, size: usize) -> Option<Shape> {
        if axis > self.dims.len() {
            return None;
        }
        let mut dims = self.dims.clone();
        dims.insert(axis, size);
        Some(Shape::new(dims))
    }

    /// `[M, K] x [K, N]`: both rank 2 with matching inner extents.
    pub fn is_matmul_compatible(&self, rhs: &Shape) -> bool {
        matches!((self.dims(), rhs.dims()), ([_, k], [k2, _]) if k == k2)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self.dims.iter().map(usize::to_string).collect();
        write!(f, "[{}]", dims.join(", "))
    }
}
