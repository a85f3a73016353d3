// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Runtime configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! predict_net = "./model/predict_net.pb"
//! init_net = "./model/init_net.pb"
//! enable_profiling = true
//!
//! [[inputs]]
//! name = "data"
//! dims = [1, 1, 3, 3]
//! values = [0, 1, 2, 3, 4, 5, 6, 7, 8]
//!
//! [[inputs]]
//! name = "mask"
//! dims = [4]
//! dtype = "i32"
//! fill = 1
//! ```

use crate::{Bindings, RuntimeError};
use std::path::{Path, PathBuf};
use tensor_core::{DType, Shape, Tensor};

/// One caller-supplied input tensor.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InputSpec {
    /// External input name in the predict net.
    pub name: String,
    pub dims: Vec<usize>,
    #[serde(default = "default_dtype")]
    pub dtype: DType,
    /// Value of every element when `values` is absent (default 0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<f64>,
    /// Explicit row-major element values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<f64>>,
}

fn default_dtype() -> DType {
    DType::F32
}

impl InputSpec {
    /// Builds the tensor this spec describes.
    pub fn to_tensor(&self) -> Result<Tensor, RuntimeError> {
        let shape = Shape::new(self.dims.clone());
        let Some(values) = &self.values else {
            return Ok(Tensor::splat(shape, self.dtype, self.fill.unwrap_or(0.0)));
        };
        if self.fill.is_some() {
            tracing::warn!(input = %self.name, "both fill and values given; using values");
        }
        tensor_from_values(shape, self.dtype, values).map_err(|e| {
            RuntimeError::Config(format!("input '{}': {e}", self.name))
        })
    }
}

/// Converts `f64` config values into a tensor of `dtype`.
fn tensor_from_values(
    shape: Shape,
    dtype: DType,
    values: &[f64],
) -> Result<Tensor, tensor_core::TensorError> {
    match dtype {
        DType::F32 => Tensor::from_vec(shape, values.iter().map(|&v| v as f32).collect()),
        DType::I8 => Tensor::from_vec(shape, values.iter().map(|&v| v as i8).collect()),
        DType::U8 => Tensor::from_vec(shape, values.iter().map(|&v| v as u8).collect()),
        DType::I32 => Tensor::from_vec(shape, values.iter().map(|&v| v as i32).collect()),
        DType::I64 => Tensor::from_vec(shape, values.iter().map(|&v| v as i64).collect()),
        DType::Bool => Tensor::from_vec(shape, values.iter().map(|&v| v != 0.0).collect()),
    }
}

/// Configuration for loading and running one Caffe2 model.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RuntimeConfig {
    /// Predict net path (`.json` for JSON, anything else for protobuf).
    pub predict_net: PathBuf,
    /// Init net path holding the weight fills.
    pub init_net: PathBuf,
    /// Inputs bound as placeholders, in order.
    #[serde(default)]
    pub inputs: Vec<InputSpec>,
    /// Whether to record per-node profiling metrics.
    #[serde(default = "default_true")]
    pub enable_profiling: bool,
}

fn default_true() -> bool {
    true
}

impl RuntimeConfig {
    /// Loads configuration from a TOML file.
    ///
    /// Relative net paths are resolved against the config file's directory.
    pub fn from_file(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RuntimeError::Config(format!("cannot read config '{}': {e}", path.display()))
        })?;
        let mut config = Self::from_toml(&content)?;
        if let Some(dir) = path.parent() {
            config.predict_net = dir.join(&config.predict_net);
            config.init_net = dir.join(&config.init_net);
        }
        Ok(config)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, RuntimeError> {
        toml::from_str(toml_str)
            .map_err(|e| RuntimeError::Config(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, RuntimeError> {
        toml::to_string_pretty(self)
            .map_err(|e| RuntimeError::Config(format!("TOML serialise error: {e}")))
    }

    /// Builds every configured input tensor, in order.
    pub fn input_tensors(&self) -> Result<Vec<(String, Tensor)>, RuntimeError> {
        self.inputs
            .iter()
            .map(|spec| Ok((spec.name.clone(), spec.to_tensor()?)))
            .collect()
    }

    /// Builds run-time bindings from the configured inputs.
    pub fn bindings(&self) -> Result<Bindings, RuntimeError> {
        let mut bindings = Bindings::new();
        for (name, tensor) in self.input_tensors()? {
            bindings.insert(name, tensor);
        }
        Ok(bindings)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            predict_net: PathBuf::from("./model/predict_net.pb"),
            init_net: PathBuf::from("./model/init_net.pb"),
            inputs: Vec::new(),
            enable_profiling: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
predict_net = "nets/predict.json"
init_net = "nets/init.pb"
enable_profiling = false

[[inputs]]
name = "data"
dims = [2, 2]
values = [1, 2, 3.5, 4]

[[inputs]]
name = "ids"
dims = [3]
dtype = "i64"
fill = 7
"#;

    #[test]
    fn test_default() {
        let c = RuntimeConfig::default();
        assert!(c.inputs.is_empty());
        assert!(c.enable_profiling);
    }

    #[test]
    fn test_from_toml() {
        let c = RuntimeConfig::from_toml(CONFIG).unwrap();
        assert_eq!(c.predict_net, PathBuf::from("nets/predict.json"));
        assert!(!c.enable_profiling);
        assert_eq!(c.inputs.len(), 2);
        assert_eq!(c.inputs[0].dtype, DType::F32);
        assert_eq!(c.inputs[1].dtype, DType::I64);
    }

    #[test]
    fn test_input_tensors() {
        let c = RuntimeConfig::from_toml(CONFIG).unwrap();
        let tensors = c.input_tensors().unwrap();
        assert_eq!(tensors[0].1.as_f32_slice(), &[1.0, 2.0, 3.5, 4.0]);
        assert_eq!(tensors[1].1.as_slice::<i64>(), Some(&[7i64, 7, 7][..]));
    }

    #[test]
    fn test_value_count_mismatch() {
        let spec = InputSpec {
            name: "x".into(),
            dims: vec![3],
            dtype: DType::F32,
            fill: None,
            values: Some(vec![1.0]),
        };
        assert!(matches!(spec.to_tensor(), Err(RuntimeError::Config(_))));
    }

    #[test]
    fn test_from_file_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, CONFIG).unwrap();
        let c = RuntimeConfig::from_file(&path).unwrap();
        assert_eq!(c.predict_net, dir.path().join("nets/predict.json"));
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let c = RuntimeConfig::from_toml(CONFIG).unwrap();
        let back = RuntimeConfig::from_toml(&c.to_toml().unwrap()).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_missing_required_path() {
        assert!(RuntimeConfig::from_toml("init_net = \"x\"").is_err());
    }
}
