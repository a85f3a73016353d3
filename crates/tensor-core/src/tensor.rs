// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Core tensor type and typed storage.

use crate::{DType, Shape, TensorError};

/// Typed, contiguous, row-major storage backing a [`Tensor`].
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    I8(Vec<i8>),
    U8(Vec<u8>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    Bool(Vec<bool>),
}

impl TensorData {
    /// Allocates `len` default-valued elements of the given type.
    pub fn zeros(dtype: DType, len: usize) -> Self {
        match dtype {
            DType::F32 => TensorData::F32(vec![0.0; len]),
            DType::I8 => TensorData::I8(vec![0; len]),
            DType::U8 => TensorData::U8(vec![0; len]),
            DType::I32 => TensorData::I32(vec![0; len]),
            DType::I64 => TensorData::I64(vec![0; len]),
            DType::Bool => TensorData::Bool(vec![false; len]),
        }
    }

    /// Returns the element type of the storage.
    pub fn dtype(&self) -> DType {
        match self {
            TensorData::F32(_) => DType::F32,
            TensorData::I8(_) => DType::I8,
            TensorData::U8(_) => DType::U8,
            TensorData::I32(_) => DType::I32,
            TensorData::I64(_) => DType::I64,
            TensorData::Bool(_) => DType::Bool,
        }
    }

    /// Returns the number of stored elements.
    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(v) => v.len(),
            TensorData::I8(v) => v.len(),
            TensorData::U8(v) => v.len(),
            TensorData::I32(v) => v.len(),
            TensorData::I64(v) => v.len(),
            TensorData::Bool(v) => v.len(),
        }
    }

    /// Returns `true` if the storage holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrites every element with `value`, converted with `as` semantics
    /// (saturating for integers, non-zero is `true` for booleans).
    pub fn fill(&mut self, value: f64) {
        match self {
            TensorData::F32(v) => v.fill(value as f32),
            TensorData::I8(v) => v.fill(value as i8),
            TensorData::U8(v) => v.fill(value as u8),
            TensorData::I32(v) => v.fill(value as i32),
            TensorData::I64(v) => v.fill(value as i64),
            TensorData::Bool(v) => v.fill(value != 0.0),
        }
    }
}

/// A Rust scalar type that can be stored in a [`Tensor`].
pub trait Element: Copy + PartialEq + std::fmt::Debug + Send + Sync + 'static {
    /// The matching runtime type tag.
    const DTYPE: DType;

    /// Borrows the storage as `&[Self]` if the variant matches.
    fn slice(data: &TensorData) -> Option<&[Self]>;

    /// Borrows the storage as `&mut [Self]` if the variant matches.
    fn slice_mut(data: &mut TensorData) -> Option<&mut [Self]>;

    /// Wraps a vector into the matching storage variant.
    fn wrap(values: Vec<Self>) -> TensorData;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident) => {
        impl Element for $ty {
            const DTYPE: DType = DType::$variant;

            fn slice(data: &TensorData) -> Option<&[Self]> {
                match data {
                    TensorData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn slice_mut(data: &mut TensorData) -> Option<&mut [Self]> {
                match data {
                    TensorData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn wrap(values: Vec<Self>) -> TensorData {
                TensorData::$variant(values)
            }
        }
    };
}

impl_element!(f32, F32);
impl_element!(i8, I8);
impl_element!(u8, U8);
impl_element!(i32, I32);
impl_element!(i64, I64);
impl_element!(bool, Bool);

/// An owned, n-dimensional tensor stored in contiguous memory.
///
/// `Tensor` is the value type for weights, caller-supplied inputs and
/// interpreter activations. Equality compares shape, type and payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Shape,
    data: TensorData,
}

impl Tensor {
    /// Creates a new tensor filled with zeros.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape, DType};
    /// let t = Tensor::zeros(Shape::matrix(2, 3), DType::F32);
    /// assert_eq!(t.size_bytes(), 24); // 2 * 3 * 4 bytes
    /// ```
    pub fn zeros(shape: Shape, dtype: DType) -> Self {
        let data = TensorData::zeros(dtype, shape.num_elements());
        Self { shape, data }
    }

    /// Creates a tensor with every element set to `value`.
    pub fn splat(shape: Shape, dtype: DType, value: f64) -> Self {
        let mut t = Self::zeros(shape, dtype);
        t.data.fill(value);
        t
    }

    /// Creates a tensor from typed storage.
    ///
    /// Returns an error if the storage length does not match the shape.
    pub fn from_data(shape: Shape, data: TensorData) -> Result<Self, TensorError> {
        let expected = shape.num_elements();
        if data.len() != expected {
            return Err(TensorError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// Creates a tensor from a vector of any supported element type.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape, DType};
    /// let t = Tensor::from_vec(Shape::vector(2), vec![7i64, 9]).unwrap();
    /// assert_eq!(t.dtype(), DType::I64);
    /// ```
    pub fn from_vec<T: Element>(shape: Shape, values: Vec<T>) -> Result<Self, TensorError> {
        Self::from_data(shape, T::wrap(values))
    }

    /// Creates a tensor from a slice of `f32` values.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape};
    /// let t = Tensor::from_f32(Shape::vector(3), &[1.0, 2.0, 3.0]).unwrap();
    /// assert_eq!(t.as_f32_slice(), &[1.0, 2.0, 3.0]);
    /// ```
    pub fn from_f32(shape: Shape, values: &[f32]) -> Result<Self, TensorError> {
        Self::from_vec(shape, values.to_vec())
    }

    /// Returns the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the tensor's data type.
    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// Returns the number of elements.
    pub fn num_elements(&self) -> usize {
        self.data.len()
    }

    /// Returns the memory footprint of this tensor in bytes.
    pub fn size_bytes(&self) -> usize {
        self.shape.size_bytes(self.dtype())
    }

    /// Returns the typed storage.
    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// Returns the typed storage mutably.
    pub fn data_mut(&mut self) -> &mut TensorData {
        &mut self.data
    }

    /// Borrows the elements as `&[T]`, or `None` if `T` is not the tensor's type.
    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        T::slice(&self.data)
    }

    /// Borrows the elements as `&mut [T]`, or `None` if `T` is not the tensor's type.
    pub fn as_mut_slice<T: Element>(&mut self) -> Option<&mut [T]> {
        T::slice_mut(&mut self.data)
    }

    /// Interprets the buffer as a slice of `f32`.
    ///
    /// # Panics
    /// Panics if `self.dtype() != DType::F32`.
    pub fn as_f32_slice(&self) -> &[f32] {
        match &self.data {
            TensorData::F32(v) => v,
            other => panic!("as_f32_slice called on {} tensor", other.dtype()),
        }
    }

    /// Interprets the buffer as a mutable slice of `f32`.
    ///
    /// # Panics
    /// Panics if `self.dtype() != DType::F32`.
    pub fn as_f32_slice_mut(&mut self) -> &mut [f32] {
        match &mut self.data {
            TensorData::F32(v) => v,
            other => panic!("as_f32_slice_mut called on {} tensor", other.dtype()),
        }
    }

    /// Returns the element at the given coordinates, or `None` when the type
    /// does not match or the coordinates are out of bounds.
    pub fn get<T: Element>(&self, coords: &[usize]) -> Option<T> {
        let offset = self.shape.flat_index(coords)?;
        self.as_slice::<T>().map(|s| s[offset])
    }

    /// Fills the tensor with a constant value (converted to the tensor's type).
    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    /// Returns a copy of this tensor with a new shape of equal element count.
    pub fn reshaped(&self, shape: Shape) -> Result<Self, TensorError> {
        if shape.num_elements() != self.shape.num_elements() {
            return Err(TensorError::ShapeMismatch {
                op: "reshape",
                lhs: self.shape.clone(),
                rhs: shape,
            });
        }
        Ok(Self {
            shape,
            data: self.data.clone(),
        })
    }

    /// Converts an integer tensor into a vector of `i64` values.
    ///
    /// Returns `None` for non-integer types.
    pub fn to_i64_vec(&self) -> Option<Vec<i64>> {
        match &self.data {
            TensorData::I8(v) => Some(v.iter().map(|&x| i64::from(x)).collect()),
            TensorData::U8(v) => Some(v.iter().map(|&x| i64::from(x)).collect()),
            TensorData::I32(v) => Some(v.iter().map(|&x| i64::from(x)).collect()),
            TensorData::I64(v) => Some(v.clone()),
            TensorData::F32(_) | TensorData::Bool(_) => None,
        }
    }
}
