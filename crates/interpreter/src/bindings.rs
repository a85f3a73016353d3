// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Placeholder bindings for one run.

use std::collections::HashMap;
use tensor_core::Tensor;

/// Maps placeholder names to the tensors a run reads.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    tensors: HashMap<String, Tensor>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `tensor` to `name`, returning the tensor it replaced.
    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) -> Option<Tensor> {
        self.tensors.insert(name.into(), tensor)
    }

    /// Builder form of [`Bindings::insert`].
    pub fn with(mut self, name: impl Into<String>, tensor: Tensor) -> Self {
        self.insert(name, tensor);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Tensor)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (K, Tensor)>>(iter: I) -> Self {
        let mut bindings = Self::new();
        for (name, tensor) in iter {
            bindings.insert(name, tensor);
        }
        bindings
    }
}
