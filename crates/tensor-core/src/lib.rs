// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! Typed tensors and reference CPU kernels shared by the importer and the
//! interpreter.
//!
//! This crate provides:
//! - [`Tensor`] — an owned, n-dimensional tensor with typed contiguous storage.
//! - [`Shape`] — runtime shape descriptors with stride and index helpers.
//! - [`DType`] — supported element types (f32, i8, u8, i32, i64, bool).
//! - Kernels for every IR primitive: matrix multiplication, convolution,
//!   pooling, softmax, elementwise math and layout operations (transpose,
//!   slice, concat, broadcast, select).
//!
//! # Design Goals
//! - No unsafe byte reinterpretation: storage is a typed enum.
//! - Kernels write into pre-allocated output tensors, so the caller decides
//!   when memory is allocated.
//! - Clean error types via `thiserror`.

mod dtype;
mod error;
pub mod ops;
mod shape;
mod tensor;

pub use dtype::DType;
pub use error::TensorError;
pub use ops::{
    ArithmeticOp, Conv2dParams, PoolMode, PoolParams, UnaryOp,
};
pub use shape::Shape;
pub use tensor::{Element, Tensor, TensorData};
