// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Typed access to operator arguments.
//!
//! Accessors return `Ok(None)` (or the supplied default) when an argument is
//! absent and [`LoadError::MalformedArgument`] when it is present with the
//! wrong payload kind or an out-of-range value. Integers are accepted where
//! floats are expected, since JSON nets write `20` for `20.0`.

use crate::record::{ArgValue, OperatorRecord};
use crate::LoadError;

/// Borrowing view over one operator's arguments.
#[derive(Debug, Clone, Copy)]
pub struct ArgReader<'a> {
    op: &'a OperatorRecord,
}

impl<'a> ArgReader<'a> {
    pub fn new(op: &'a OperatorRecord) -> Self {
        Self { op }
    }

    pub fn has(&self, name: &str) -> bool {
        self.op.args.contains_key(name)
    }

    fn wrong_kind(&self, name: &str, expected: &str, got: &ArgValue) -> LoadError {
        LoadError::malformed(
            self.op.label(),
            name,
            format!("expected {expected}, got {}", got.kind()),
        )
    }

    pub fn int(&self, name: &str) -> Result<Option<i64>, LoadError> {
        match self.op.args.get(name) {
            None => Ok(None),
            Some(ArgValue::Int(i)) => Ok(Some(*i)),
            Some(other) => Err(self.wrong_kind(name, "int", other)),
        }
    }

    pub fn int_or(&self, name: &str, default: i64) -> Result<i64, LoadError> {
        Ok(self.int(name)?.unwrap_or(default))
    }

    /// Reads a non-negative integer.
    pub fn usize(&self, name: &str) -> Result<Option<usize>, LoadError> {
        self.int(name)?
            .map(|i| self.to_usize(name, i))
            .transpose()
    }

    pub fn usize_or(&self, name: &str, default: usize) -> Result<usize, LoadError> {
        Ok(self.usize(name)?.unwrap_or(default))
    }

    /// Reads a 0/1 flag; any non-zero integer is `true`.
    pub fn flag(&self, name: &str) -> Result<bool, LoadError> {
        Ok(self.int(name)?.is_some_and(|i| i != 0))
    }

    pub fn float(&self, name: &str) -> Result<Option<f32>, LoadError> {
        match self.op.args.get(name) {
            None => Ok(None),
            Some(ArgValue::Float(f)) => Ok(Some(*f)),
            Some(ArgValue::Int(i)) => Ok(Some(*i as f32)),
            Some(other) => Err(self.wrong_kind(name, "float", other)),
        }
    }

    pub fn float_or(&self, name: &str, default: f32) -> Result<f32, LoadError> {
        Ok(self.float(name)?.unwrap_or(default))
    }

    /// Reads a scalar as `f64`. Integers convert exactly up to 2^53.
    pub fn number(&self, name: &str) -> Result<Option<f64>, LoadError> {
        match self.op.args.get(name) {
            None => Ok(None),
            Some(ArgValue::Float(f)) => Ok(Some(f64::from(*f))),
            Some(ArgValue::Int(i)) => Ok(Some(*i as f64)),
            Some(other) => Err(self.wrong_kind(name, "number", other)),
        }
    }

    /// Reads a scalar that must hold a whole number. A float is accepted only
    /// when it has no fractional part.
    pub fn integer(&self, name: &str) -> Result<Option<i64>, LoadError> {
        match self.op.args.get(name) {
            None => Ok(None),
            Some(ArgValue::Int(i)) => Ok(Some(*i)),
            Some(ArgValue::Float(f)) if f.fract() == 0.0 && f.abs() < 9.2e18 => {
                Ok(Some(*f as i64))
            }
            Some(ArgValue::Float(f)) => Err(LoadError::malformed(
                self.op.label(),
                name,
                format!("{f} is not a whole number"),
            )),
            Some(other) => Err(self.wrong_kind(name, "integer", other)),
        }
    }

    pub fn str(&self, name: &str) -> Result<Option<&'a str>, LoadError> {
        match self.op.args.get(name) {
            None => Ok(None),
            Some(ArgValue::Str(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(self.wrong_kind(name, "string", other)),
        }
    }

    pub fn ints(&self, name: &str) -> Result<Option<Vec<i64>>, LoadError> {
        match self.op.args.get(name) {
            None => Ok(None),
            Some(ArgValue::Ints(v)) => Ok(Some(v.clone())),
            // An empty repeated field decodes as whichever list kind is tried first.
            Some(ArgValue::Floats(v)) if v.is_empty() => Ok(Some(vec![])),
            Some(other) => Err(self.wrong_kind(name, "ints", other)),
        }
    }

    /// Reads a list of non-negative integers.
    pub fn usizes(&self, name: &str) -> Result<Option<Vec<usize>>, LoadError> {
        self.ints(name)?
            .map(|v| {
                v.into_iter()
                    .map(|i| self.to_usize(name, i))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()
    }

    pub fn floats(&self, name: &str) -> Result<Option<Vec<f32>>, LoadError> {
        match self.op.args.get(name) {
            None => Ok(None),
            Some(ArgValue::Floats(v)) => Ok(Some(v.clone())),
            Some(ArgValue::Ints(v)) => Ok(Some(v.iter().map(|&i| i as f32).collect())),
            Some(other) => Err(self.wrong_kind(name, "floats", other)),
        }
    }

    fn to_usize(&self, name: &str, value: i64) -> Result<usize, LoadError> {
        usize::try_from(value).map_err(|_| {
            LoadError::malformed(self.op.label(), name, format!("{value} is negative"))
        })
    }
}
