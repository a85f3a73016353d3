// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Wire messages from `caffe2.proto`.
//!
//! Only the fields the importer reads are declared; prost skips unknown
//! fields (device options, engine hints, nested nets) while decoding. Tags
//! match the upstream schema.
//!
//! Text-format nets (`.pbtxt`) are parsed against a runtime descriptor of the
//! same messages, which also names the fields the importer ignores so that
//! text files carrying them still parse.

use crate::LoadError;
use prost_reflect::{DescriptorPool, DynamicMessage};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet};

/// A named operator argument. At most one of the payload fields is set.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Argument {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(float, optional, tag = "2")]
    pub f: Option<f32>,
    #[prost(int64, optional, tag = "3")]
    pub i: Option<i64>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub s: Option<Vec<u8>>,
    #[prost(float, repeated, packed = "false", tag = "5")]
    pub floats: Vec<f32>,
    #[prost(int64, repeated, packed = "false", tag = "6")]
    pub ints: Vec<i64>,
    #[prost(bytes = "vec", repeated, tag = "7")]
    pub strings: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct OperatorDef {
    #[prost(string, repeated, tag = "1")]
    pub input: Vec<String>,
    #[prost(string, repeated, tag = "2")]
    pub output: Vec<String>,
    #[prost(string, optional, tag = "3")]
    pub name: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub r#type: Option<String>,
    #[prost(message, repeated, tag = "5")]
    pub arg: Vec<Argument>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct NetDef {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(message, repeated, tag = "2")]
    pub op: Vec<OperatorDef>,
    #[prost(string, repeated, tag = "7")]
    pub external_input: Vec<String>,
    #[prost(string, repeated, tag = "8")]
    pub external_output: Vec<String>,
}

// ── Text format ────────────────────────────────────────────────

const NET_DEF: &str = "caffe2.NetDef";

/// Parses a text-format `NetDef`.
pub fn parse_text(text: &str) -> Result<NetDef, LoadError> {
    let pool = DescriptorPool::from_file_descriptor_set(descriptor_set())?;
    let descriptor = pool
        .get_message_by_name(NET_DEF)
        .ok_or_else(|| LoadError::malformed("caffe2.proto", "descriptor", "NetDef is missing"))?;
    let message = DynamicMessage::parse_text_format(descriptor, text)?;
    Ok(message.transcode_to::<NetDef>()?)
}

fn field(name: &str, number: i32, label: Label, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(label as i32),
        r#type: Some(ty as i32),
        ..Default::default()
    }
}

fn message_field(name: &str, number: i32, label: Label, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        type_name: Some(format!(".caffe2.{type_name}")),
        ..field(name, number, label, Type::Message)
    }
}

fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field: fields,
        ..Default::default()
    }
}

/// `caffe2.proto` restricted to the net, operator, argument and device
/// messages.
fn descriptor_set() -> FileDescriptorSet {
    use Label::{Optional, Repeated};

    let device_option = message(
        "DeviceOption",
        vec![
            field("device_type", 1, Optional, Type::Int32),
            field("device_id", 2, Optional, Type::Int32),
            field("random_seed", 3, Optional, Type::Uint32),
            field("node_name", 4, Optional, Type::String),
            field("numa_node_id", 5, Optional, Type::Int32),
            field("extra_info", 6, Repeated, Type::String),
        ],
    );
    let argument = message(
        "Argument",
        vec![
            field("name", 1, Optional, Type::String),
            field("f", 2, Optional, Type::Float),
            field("i", 3, Optional, Type::Int64),
            field("s", 4, Optional, Type::Bytes),
            field("floats", 5, Repeated, Type::Float),
            field("ints", 6, Repeated, Type::Int64),
            field("strings", 7, Repeated, Type::Bytes),
            message_field("n", 8, Optional, "NetDef"),
            message_field("nets", 9, Repeated, "NetDef"),
        ],
    );
    let operator = message(
        "OperatorDef",
        vec![
            field("input", 1, Repeated, Type::String),
            field("output", 2, Repeated, Type::String),
            field("name", 3, Optional, Type::String),
            field("type", 4, Optional, Type::String),
            message_field("arg", 5, Repeated, "Argument"),
            message_field("device_option", 6, Optional, "DeviceOption"),
            field("engine", 7, Optional, Type::String),
            field("control_input", 8, Repeated, Type::String),
            field("is_gradient_op", 9, Optional, Type::Bool),
            field("debug_info", 10, Optional, Type::String),
            field("domain", 11, Optional, Type::String),
            field("op_version", 12, Optional, Type::Int64),
        ],
    );
    let net = message(
        "NetDef",
        vec![
            field("name", 1, Optional, Type::String),
            message_field("op", 2, Repeated, "OperatorDef"),
            field("type", 3, Optional, Type::String),
            field("num_workers", 4, Optional, Type::Int32),
            message_field("device_option", 5, Optional, "DeviceOption"),
            message_field("arg", 6, Repeated, "Argument"),
            field("external_input", 7, Repeated, Type::String),
            field("external_output", 8, Repeated, Type::String),
        ],
    );

    FileDescriptorSet {
        file: vec![FileDescriptorProto {
            name: Some("caffe2/proto/caffe2.proto".to_string()),
            package: Some("caffe2".to_string()),
            message_type: vec![device_option, argument, operator, net],
            syntax: Some("proto2".to_string()),
            ..Default::default()
        }],
    }
}
