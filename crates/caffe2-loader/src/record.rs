// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Format-independent net definitions.
//!
//! Both wire formats decode into [`NetDefinition`]:
//! - binary protobuf (`caffe2.proto` `NetDef`), the format Caffe2 writes;
//! - JSON with the same field names, convenient for hand-written nets:
//!
//! ```json
//! {
//!   "name": "tiny",
//!   "external_input": ["data"],
//!   "external_output": ["y"],
//!   "op": [
//!     { "type": "Relu", "input": ["data"], "output": ["y"] },
//!     { "type": "Clip", "input": ["y"], "output": ["y2"], "arg": { "min": 0.0 } }
//!   ]
//! }
//! ```

use crate::proto;
use crate::LoadError;
use prost::Message;
use std::collections::BTreeMap;
use std::path::Path;

/// A decoded operator argument value.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Int(i64),
    Float(f32),
    Str(String),
    Ints(Vec<i64>),
    Floats(Vec<f32>),
    Strings(Vec<String>),
}

impl ArgValue {
    /// Returns a short name for the payload kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ArgValue::Int(_) => "int",
            ArgValue::Float(_) => "float",
            ArgValue::Str(_) => "string",
            ArgValue::Ints(_) => "ints",
            ArgValue::Floats(_) => "floats",
            ArgValue::Strings(_) => "strings",
        }
    }
}

impl From<&proto::Argument> for ArgValue {
    fn from(arg: &proto::Argument) -> Self {
        let text = |b: &[u8]| String::from_utf8_lossy(b).into_owned();
        if let Some(s) = &arg.s {
            ArgValue::Str(text(s))
        } else if let Some(f) = arg.f {
            ArgValue::Float(f)
        } else if let Some(i) = arg.i {
            ArgValue::Int(i)
        } else if !arg.floats.is_empty() {
            ArgValue::Floats(arg.floats.clone())
        } else if !arg.strings.is_empty() {
            ArgValue::Strings(arg.strings.iter().map(|s| text(s)).collect())
        } else {
            ArgValue::Ints(arg.ints.clone())
        }
    }
}

impl From<(&str, &ArgValue)> for proto::Argument {
    fn from((name, value): (&str, &ArgValue)) -> Self {
        let mut arg = proto::Argument {
            name: Some(name.to_string()),
            ..Default::default()
        };
        match value {
            ArgValue::Int(i) => arg.i = Some(*i),
            ArgValue::Float(f) => arg.f = Some(*f),
            ArgValue::Str(s) => arg.s = Some(s.clone().into_bytes()),
            ArgValue::Ints(v) => arg.ints = v.clone(),
            ArgValue::Floats(v) => arg.floats = v.clone(),
            ArgValue::Strings(v) => arg.strings = v.iter().map(|s| s.clone().into_bytes()).collect(),
        }
        arg
    }
}

/// One operator of a net, immutable once parsed.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OperatorRecord {
    /// Operator kind tag (`"Conv"`, `"Concat"`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "input", default)]
    pub inputs: Vec<String>,
    #[serde(rename = "output", default)]
    pub outputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Arguments keyed by name; iteration is in sorted key order.
    #[serde(rename = "arg", default)]
    pub args: BTreeMap<String, ArgValue>,
}

impl OperatorRecord {
    /// Creates a record with no arguments.
    pub fn new(kind: &str, inputs: &[&str], outputs: &[&str]) -> Self {
        Self {
            kind: kind.to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            name: None,
            args: BTreeMap::new(),
        }
    }

    /// Builder-style argument setter.
    pub fn with_arg(mut self, name: &str, value: ArgValue) -> Self {
        self.args.insert(name.to_string(), value);
        self
    }

    /// Label used in logs and errors: the operator name, else its first
    /// output, else its kind.
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or_else(|| self.outputs.first().map(String::as_str))
            .unwrap_or(&self.kind)
    }
}

impl From<&proto::OperatorDef> for OperatorRecord {
    fn from(op: &proto::OperatorDef) -> Self {
        let mut args = BTreeMap::new();
        for arg in &op.arg {
            // Later duplicates win, as in the Caffe2 argument helper.
            args.insert(arg.name.clone().unwrap_or_default(), ArgValue::from(arg));
        }
        Self {
            kind: op.r#type.clone().unwrap_or_default(),
            inputs: op.input.clone(),
            outputs: op.output.clone(),
            name: op.name.clone().filter(|n| !n.is_empty()),
            args,
        }
    }
}

impl From<&OperatorRecord> for proto::OperatorDef {
    fn from(op: &OperatorRecord) -> Self {
        proto::OperatorDef {
            input: op.inputs.clone(),
            output: op.outputs.clone(),
            name: op.name.clone(),
            r#type: Some(op.kind.clone()),
            arg: op
                .args
                .iter()
                .map(|(name, value)| proto::Argument::from((name.as_str(), value)))
                .collect(),
        }
    }
}

/// A predict or init net: ordered operators plus declared boundary names.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NetDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "op", default)]
    pub ops: Vec<OperatorRecord>,
    #[serde(default)]
    pub external_input: Vec<String>,
    #[serde(default)]
    pub external_output: Vec<String>,
}

/// Serialized net encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetFormat {
    /// Binary protobuf `NetDef`.
    Protobuf,
    /// Protobuf text format.
    Text,
    Json,
}

impl NetFormat {
    /// `.json` is JSON, `.pbtxt`/`.prototxt` is protobuf text, anything else
    /// is binary protobuf.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => NetFormat::Json,
            Some("pbtxt" | "prototxt") => NetFormat::Text,
            _ => NetFormat::Protobuf,
        }
    }
}

impl NetDefinition {
    /// Reads a net from disk, choosing the format by file extension.
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        Self::from_file_with_format(path, NetFormat::from_path(path))
    }

    /// Reads a net from disk in an explicit format.
    ///
    /// The file is memory-mapped; decoding copies what it keeps, so the map
    /// is released before returning.
    pub fn from_file_with_format(path: &Path, format: NetFormat) -> Result<Self, LoadError> {
        let io_err = |source| LoadError::Io {
            path: path.display().to_string(),
            source,
        };
        let file = std::fs::File::open(path).map_err(io_err)?;
        let mmap = unsafe { memmap2::Mmap::map(&file) }.map_err(io_err)?;
        tracing::debug!(
            path = %path.display(),
            bytes = mmap.len(),
            ?format,
            "mapped net definition"
        );
        Self::from_bytes(&mmap, format)
    }

    pub fn from_bytes(bytes: &[u8], format: NetFormat) -> Result<Self, LoadError> {
        match format {
            NetFormat::Protobuf => Self::from_proto_bytes(bytes),
            NetFormat::Text => Self::from_text(std::str::from_utf8(bytes)?),
            NetFormat::Json => Ok(serde_json::from_slice(bytes)?),
        }
    }

    /// Parses a protobuf text-format `NetDef`.
    pub fn from_text(text: &str) -> Result<Self, LoadError> {
        let net = proto::parse_text(text)?;
        Ok(Self::from(&net))
    }

    pub fn from_proto_bytes(bytes: &[u8]) -> Result<Self, LoadError> {
        let net = proto::NetDef::decode(bytes)?;
        Ok(Self::from(&net))
    }

    pub fn from_json(text: &str) -> Result<Self, LoadError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encodes this net as a binary `NetDef`.
    pub fn to_proto_bytes(&self) -> Vec<u8> {
        proto::NetDef::from(self).encode_to_vec()
    }

    pub fn to_json(&self) -> Result<String, LoadError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl From<&proto::NetDef> for NetDefinition {
    fn from(net: &proto::NetDef) -> Self {
        Self {
            name: net.name.clone().unwrap_or_default(),
            ops: net.op.iter().map(OperatorRecord::from).collect(),
            external_input: net.external_input.clone(),
            external_output: net.external_output.clone(),
        }
    }
}

impl From<&NetDefinition> for proto::NetDef {
    fn from(net: &NetDefinition) -> Self {
        proto::NetDef {
            name: Some(net.name.clone()),
            op: net.ops.iter().map(proto::OperatorDef::from).collect(),
            external_input: net.external_input.clone(),
            external_output: net.external_output.clone(),
        }
    }
}
