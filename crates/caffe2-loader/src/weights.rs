// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The weight table built from an init net.
//!
//! Each fill operator of the init net materializes exactly one tensor, named
//! after the operator's single output. Tensors are wrapped in [`Arc`] once
//! here and shared from then on.

use crate::args::ArgReader;
use crate::record::{NetDefinition, OperatorRecord};
use crate::LoadError;
use std::collections::HashMap;
use std::sync::Arc;
use tensor_core::{DType, Shape, Tensor};

/// `caffe2.TensorProto.DataType` codes accepted by `ConstantFill`.
fn dtype_from_code(code: i64) -> Option<DType> {
    match code {
        1 => Some(DType::F32),
        2 => Some(DType::I32),
        5 => Some(DType::Bool),
        6 => Some(DType::U8),
        7 => Some(DType::I8),
        10 => Some(DType::I64),
        _ => None,
    }
}

/// Name → tensor mapping in init-net order. Read-only after construction.
#[derive(Debug, Default)]
pub struct WeightTable {
    entries: Vec<(String, Arc<Tensor>)>,
    index: HashMap<String, usize>,
}

impl WeightTable {
    /// Executes the fill operators of `init`.
    ///
    /// # Errors
    /// - [`LoadError::UnsupportedOperator`] for anything but a known fill op.
    /// - [`LoadError::NameConflict`] when two fills produce the same name.
    /// - [`LoadError::ShapeMismatch`] when `values` disagrees with `shape`.
    /// - [`LoadError::MalformedArgument`] for missing or invalid arguments.
    pub fn from_init_net(init: &NetDefinition) -> Result<Self, LoadError> {
        let mut table = Self::default();
        for op in &init.ops {
            let tensor = materialize(op)?;
            let name = match op.outputs.as_slice() {
                [name] => name.clone(),
                outputs => {
                    return Err(LoadError::malformed(
                        op.label(),
                        "output",
                        format!("fill operators produce one output, got {}", outputs.len()),
                    ))
                }
            };
            tracing::debug!(
                weight = %name,
                dtype = %tensor.dtype(),
                shape = %tensor.shape(),
                "materialized weight"
            );
            table.insert(name, tensor)?;
        }
        Ok(table)
    }

    fn insert(&mut self, name: String, tensor: Tensor) -> Result<(), LoadError> {
        if self.index.contains_key(&name) {
            return Err(LoadError::NameConflict { name });
        }
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push((name, Arc::new(tensor)));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Tensor>> {
        self.index.get(name).map(|&i| &self.entries[i].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Iterates weights in init-net order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<Tensor>)> {
        self.entries.iter().map(|(n, t)| (n.as_str(), t))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total payload size in bytes.
    pub fn total_bytes(&self) -> usize {
        self.entries.iter().map(|(_, t)| t.size_bytes()).sum()
    }
}

/// Builds the tensor described by one fill operator.
fn materialize(op: &OperatorRecord) -> Result<Tensor, LoadError> {
    let args = ArgReader::new(op);
    let label = op.label();

    let shape = || -> Result<Shape, LoadError> {
        args.usizes("shape")?
            .map(Shape::new)
            .ok_or_else(|| LoadError::malformed(label, "shape", "required by tensor fills"))
    };
    let values = |dtype: DType| -> Result<Vec<i64>, LoadError> {
        args.ints("values")?.ok_or_else(|| {
            LoadError::malformed(label, "values", format!("required for {dtype} fills"))
        })
    };
    let sized = |shape: Shape, len: usize| -> Result<Shape, LoadError> {
        if shape.num_elements() != len {
            return Err(LoadError::shape(
                label,
                format!("shape {shape} needs {} values, got {len}", shape.num_elements()),
            ));
        }
        Ok(shape)
    };

    let tensor = match op.kind.as_str() {
        "GivenTensorFill" => {
            let data = args
                .floats("values")?
                .ok_or_else(|| LoadError::malformed(label, "values", "required for f32 fills"))?;
            Tensor::from_vec(sized(shape()?, data.len())?, data)
        }
        "GivenTensorIntFill" => {
            let data = values(DType::I32)?
                .into_iter()
                .map(|v| {
                    i32::try_from(v).map_err(|_| {
                        LoadError::malformed(label, "values", format!("{v} overflows i32"))
                    })
                })
                .collect::<Result<Vec<i32>, _>>()?;
            Tensor::from_vec(sized(shape()?, data.len())?, data)
        }
        "GivenTensorInt64Fill" => {
            let data = values(DType::I64)?;
            Tensor::from_vec(sized(shape()?, data.len())?, data)
        }
        "GivenTensorBoolFill" => {
            let data: Vec<bool> = values(DType::Bool)?.into_iter().map(|v| v != 0).collect();
            Tensor::from_vec(sized(shape()?, data.len())?, data)
        }
        "ConstantFill" => {
            let shape = args.usizes("shape")?.map(Shape::new).unwrap_or_else(Shape::scalar);
            let code = args.int_or("dtype", 1)?;
            let dtype = dtype_from_code(code).ok_or_else(|| {
                LoadError::malformed(label, "dtype", format!("unsupported data type code {code}"))
            })?;
            return constant_fill(&args, label, shape, dtype);
        }
        other => {
            return Err(LoadError::UnsupportedOperator {
                kind: other.to_string(),
            })
        }
    };
    tensor.map_err(|e| LoadError::shape(label, e.to_string()))
}

/// `ConstantFill` payload. Integer element types read `value` exactly and
/// reject values outside their range.
fn constant_fill(
    args: &ArgReader<'_>,
    label: &str,
    shape: Shape,
    dtype: DType,
) -> Result<Tensor, LoadError> {
    let n = shape.num_elements();
    let narrow = |value: i64| {
        LoadError::malformed(label, "value", format!("{value} overflows {dtype}"))
    };
    let tensor = match dtype {
        DType::I64 => Tensor::from_vec(shape, vec![args.integer("value")?.unwrap_or(0); n]),
        DType::I32 => {
            let value = args.integer("value")?.unwrap_or(0);
            let value = i32::try_from(value).map_err(|_| narrow(value))?;
            Tensor::from_vec(shape, vec![value; n])
        }
        DType::I8 => {
            let value = args.integer("value")?.unwrap_or(0);
            let value = i8::try_from(value).map_err(|_| narrow(value))?;
            Tensor::from_vec(shape, vec![value; n])
        }
        DType::U8 => {
            let value = args.integer("value")?.unwrap_or(0);
            let value = u8::try_from(value).map_err(|_| narrow(value))?;
            Tensor::from_vec(shape, vec![value; n])
        }
        DType::F32 | DType::Bool => {
            let value = args.number("value")?.unwrap_or(0.0);
            Ok(Tensor::splat(shape, dtype, value))
        }
    };
    tensor.map_err(|e| LoadError::shape(label, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ArgValue;

    fn fill(kind: &str, name: &str, shape: Vec<i64>, values: ArgValue) -> OperatorRecord {
        OperatorRecord::new(kind, &[], &[name])
            .with_arg("shape", ArgValue::Ints(shape))
            .with_arg("values", values)
    }

    fn net(ops: Vec<OperatorRecord>) -> NetDefinition {
        NetDefinition {
            name: "init".into(),
            ops,
            ..Default::default()
        }
    }

    #[test]
    fn test_given_tensor_fill() {
        let init = net(vec![fill(
            "GivenTensorFill",
            "w",
            vec![2, 2],
            ArgValue::Floats(vec![1.0, 2.0, 3.0, 4.0]),
        )]);
        let table = WeightTable::from_init_net(&init).unwrap();
        let w = table.get("w").unwrap();
        assert_eq!(w.shape(), &Shape::matrix(2, 2));
        assert_eq!(w.as_f32_slice(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_int_fills() {
        let init = net(vec![
            fill("GivenTensorIntFill", "a", vec![2], ArgValue::Ints(vec![7, -1])),
            fill("GivenTensorInt64Fill", "b", vec![1], ArgValue::Ints(vec![1 << 40])),
            fill("GivenTensorBoolFill", "c", vec![2], ArgValue::Ints(vec![0, 3])),
        ]);
        let table = WeightTable::from_init_net(&init).unwrap();
        assert_eq!(table.get("a").unwrap().as_slice::<i32>(), Some(&[7, -1][..]));
        assert_eq!(table.get("b").unwrap().as_slice::<i64>(), Some(&[1i64 << 40][..]));
        assert_eq!(table.get("c").unwrap().as_slice::<bool>(), Some(&[false, true][..]));
        let names: Vec<_> = table.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_constant_fill_defaults() {
        let init = net(vec![
            OperatorRecord::new("ConstantFill", &[], &["zero"]),
            OperatorRecord::new("ConstantFill", &[], &["sevens"])
                .with_arg("shape", ArgValue::Ints(vec![3]))
                .with_arg("value", ArgValue::Float(7.0))
                .with_arg("dtype", ArgValue::Int(10)),
        ]);
        let table = WeightTable::from_init_net(&init).unwrap();
        let zero = table.get("zero").unwrap();
        assert_eq!(zero.shape(), &Shape::scalar());
        assert_eq!(zero.as_f32_slice(), &[0.0]);
        assert_eq!(table.get("sevens").unwrap().as_slice::<i64>(), Some(&[7i64, 7, 7][..]));
    }

    #[test]
    fn test_constant_fill_integers_are_exact() {
        let init = net(vec![
            OperatorRecord::new("ConstantFill", &[], &["big"])
                .with_arg("shape", ArgValue::Ints(vec![1]))
                .with_arg("value", ArgValue::Int(16_777_217))
                .with_arg("dtype", ArgValue::Int(10)),
            OperatorRecord::new("ConstantFill", &[], &["int32"])
                .with_arg("shape", ArgValue::Ints(vec![2]))
                .with_arg("value", ArgValue::Int(2_147_483_647))
                .with_arg("dtype", ArgValue::Int(2)),
        ]);
        let table = WeightTable::from_init_net(&init).unwrap();
        assert_eq!(table.get("big").unwrap().as_slice::<i64>(), Some(&[16_777_217i64][..]));
        assert_eq!(
            table.get("int32").unwrap().as_slice::<i32>(),
            Some(&[i32::MAX, i32::MAX][..])
        );
    }

    #[test]
    fn test_constant_fill_rejects_lossy_values() {
        let overflow = net(vec![OperatorRecord::new("ConstantFill", &[], &["w"])
            .with_arg("value", ArgValue::Int(300))
            .with_arg("dtype", ArgValue::Int(6))]);
        assert!(matches!(
            WeightTable::from_init_net(&overflow),
            Err(LoadError::MalformedArgument { arg, .. }) if arg == "value"
        ));

        let fractional = net(vec![OperatorRecord::new("ConstantFill", &[], &["w"])
            .with_arg("value", ArgValue::Float(2.5))
            .with_arg("dtype", ArgValue::Int(10))]);
        assert!(WeightTable::from_init_net(&fractional).is_err());
    }

    #[test]
    fn test_value_count_mismatch() {
        let init = net(vec![fill(
            "GivenTensorFill",
            "w",
            vec![2, 2],
            ArgValue::Floats(vec![1.0]),
        )]);
        assert!(matches!(
            WeightTable::from_init_net(&init),
            Err(LoadError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_duplicate_weight_name() {
        let op = fill("GivenTensorFill", "w", vec![1], ArgValue::Floats(vec![1.0]));
        let init = net(vec![op.clone(), op]);
        assert!(matches!(
            WeightTable::from_init_net(&init),
            Err(LoadError::NameConflict { name }) if name == "w"
        ));
    }

    #[test]
    fn test_unknown_fill() {
        let init = net(vec![OperatorRecord::new("XavierFill", &[], &["w"])]);
        assert!(matches!(
            WeightTable::from_init_net(&init),
            Err(LoadError::UnsupportedOperator { kind }) if kind == "XavierFill"
        ));
    }

    #[test]
    fn test_missing_shape() {
        let init = net(vec![OperatorRecord::new("GivenTensorFill", &[], &["w"])
            .with_arg("values", ArgValue::Floats(vec![1.0]))]);
        assert!(matches!(
            WeightTable::from_init_net(&init),
            Err(LoadError::MalformedArgument { arg, .. }) if arg == "shape"
        ));
    }
}
