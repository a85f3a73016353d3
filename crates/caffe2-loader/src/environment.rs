// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Name → IR value bindings for one load.

use crate::LoadError;
use graph_ir::NodeValue;
use std::collections::HashMap;

/// Append-only symbol table threaded through operator lowering.
///
/// Names are bound once; a second binding is a [`LoadError::NameConflict`].
/// Iteration follows binding order.
#[derive(Debug, Default)]
pub struct Environment {
    order: Vec<String>,
    values: HashMap<String, NodeValue>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: &str, value: NodeValue) -> Result<(), LoadError> {
        if self.values.contains_key(name) {
            return Err(LoadError::NameConflict {
                name: name.to_string(),
            });
        }
        self.values.insert(name.to_string(), value);
        self.order.push(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<NodeValue> {
        self.values.get(name).copied()
    }

    /// Looks up an input of operator `op`.
    pub fn resolve(&self, op: &str, name: &str) -> Result<NodeValue, LoadError> {
        self.get(name).ok_or_else(|| LoadError::UnboundInput {
            op: op.to_string(),
            name: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Iterates bindings in the order they were made.
    pub fn iter(&self) -> impl Iterator<Item = (&str, NodeValue)> {
        self.order.iter().map(|n| (n.as_str(), self.values[n]))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
