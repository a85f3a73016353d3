// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Result-type inference for every [`NodeKind`].
//!
//! [`infer`] is the single source of truth for node typing: builders call it
//! before appending a node and [`crate::Graph::verify`] calls it again over
//! the prefix of nodes preceding each node, which also proves that operands
//! are defined before their users.

use crate::{GraphError, Node, NodeKind, NodeValue, ValueType, VariableKind};
use tensor_core::{ops, DType, Shape};

/// Computes the result types of `kind` given the nodes defined before it.
pub fn infer(kind: &NodeKind, defined: &[Node]) -> Result<Vec<ValueType>, GraphError> {
    let ty = move |v: NodeValue| operand(defined, v);
    let result = match kind {
        NodeKind::Variable { kind: var, ty: declared } => {
            if let VariableKind::Constant(tensor) = var {
                let actual = ValueType::of_tensor(tensor);
                if &actual != declared {
                    return Err(GraphError::ShapeMismatch {
                        op: "constant",
                        detail: format!("payload is {actual}, declared {declared}"),
                    });
                }
            }
            declared.clone()
        }

        NodeKind::Convolution {
            input,
            filter,
            bias,
            params,
        } => {
            let (x, w) = (ty(*input)?, ty(*filter)?);
            expect_dtype("convolution", DType::F32, x.dtype)?;
            expect_dtype("convolution", DType::F32, w.dtype)?;
            let shape = ops::conv_output_shape(&x.shape, &w.shape, params)?;
            if let Some(b) = bias {
                let b = ty(*b)?;
                expect_dtype("convolution", DType::F32, b.dtype)?;
                expect_shape("convolution (bias)", &Shape::vector(w.dims()[0]), &b.shape)?;
            }
            ValueType::new(DType::F32, shape)
        }

        NodeKind::Pool { input, params } => {
            let x = ty(*input)?;
            expect_dtype("pool", DType::F32, x.dtype)?;
            ValueType::new(DType::F32, ops::pool_output_shape(&x.shape, params)?)
        }

        NodeKind::MatMul { lhs, rhs } => {
            let (a, b) = (ty(*lhs)?, ty(*rhs)?);
            expect_dtype("matmul", DType::F32, a.dtype)?;
            expect_dtype("matmul", DType::F32, b.dtype)?;
            if !a.shape.is_matmul_compatible(&b.shape) {
                return Err(GraphError::ShapeMismatch {
                    op: "matmul",
                    detail: format!("{} x {}", a.shape, b.shape),
                });
            }
            ValueType::new(DType::F32, Shape::matrix(a.dims()[0], b.dims()[1]))
        }

        NodeKind::Transpose { input, perm } => {
            let x = ty(*input)?;
            ValueType::new(x.dtype, ops::transposed_shape(&x.shape, perm)?)
        }

        NodeKind::Reshape { input, dims } => {
            let x = ty(*input)?;
            let target = Shape::new(dims.clone());
            if target.num_elements() != x.shape.num_elements() {
                return Err(GraphError::ShapeMismatch {
                    op: "reshape",
                    detail: format!("cannot reshape {} into {}", x.shape, target),
                });
            }
            ValueType::new(x.dtype, target)
        }

        NodeKind::Slice { input, start, size } => {
            let x = ty(*input)?;
            let fits = start.len() == x.shape.rank()
                && size.len() == x.shape.rank()
                && start
                    .iter()
                    .zip(size)
                    .zip(x.dims())
                    .all(|((&s, &n), &d)| s + n <= d);
            if !fits {
                return Err(GraphError::InvalidArgument {
                    op: "slice",
                    detail: format!("start {start:?} size {size:?} exceeds {}", x.shape),
                });
            }
            ValueType::new(x.dtype, Shape::new(size.clone()))
        }

        NodeKind::Concat { inputs, axis } => {
            let types = inputs
                .iter()
                .map(|v| ty(*v))
                .collect::<Result<Vec<_>, _>>()?;
            let first = types.first().ok_or_else(|| GraphError::InvalidArgument {
                op: "concat",
                detail: "no inputs".to_string(),
            })?;
            for t in &types[1..] {
                expect_dtype("concat", first.dtype, t.dtype)?;
            }
            let shapes: Vec<&Shape> = types.iter().map(|t| &t.shape).collect();
            ValueType::new(first.dtype, ops::concat_shape(&shapes, *axis)?)
        }

        NodeKind::Broadcast { input, axis, dims } => {
            let x = ty(*input)?;
            let target = Shape::new(dims.clone());
            ops::check_broadcast(&x.shape, &target, *axis)?;
            ValueType::new(x.dtype, target)
        }

        NodeKind::Splat { ty: splat_ty, .. } => splat_ty.clone(),

        NodeKind::IsNaN { input } => {
            let x = ty(*input)?;
            expect_dtype("is_nan", DType::F32, x.dtype)?;
            ValueType::new(DType::Bool, x.shape.clone())
        }

        NodeKind::Select {
            cond,
            on_true,
            on_false,
        } => {
            let (c, a, b) = (ty(*cond)?, ty(*on_true)?, ty(*on_false)?);
            expect_dtype("select", DType::Bool, c.dtype)?;
            expect_dtype("select", a.dtype, b.dtype)?;
            expect_shape("select", &c.shape, &a.shape)?;
            expect_shape("select", &c.shape, &b.shape)?;
            a.clone()
        }

        NodeKind::Clip { input, min, max } => {
            let x = ty(*input)?;
            if x.dtype == DType::Bool {
                return Err(GraphError::TypeMismatch {
                    op: "clip",
                    expected: DType::F32,
                    actual: DType::Bool,
                });
            }
            if min > max {
                return Err(GraphError::InvalidArgument {
                    op: "clip",
                    detail: format!("min {min} is greater than max {max}"),
                });
            }
            x.clone()
        }

        NodeKind::Arithmetic { op, lhs, rhs } => {
            let (a, b) = (ty(*lhs)?, ty(*rhs)?);
            expect_dtype(op.as_str(), DType::F32, a.dtype)?;
            expect_dtype(op.as_str(), DType::F32, b.dtype)?;
            expect_shape(op.as_str(), &a.shape, &b.shape)?;
            a.clone()
        }

        NodeKind::Unary { op, input } => {
            let x = ty(*input)?;
            expect_dtype(op.as_str(), DType::F32, x.dtype)?;
            x.clone()
        }

        NodeKind::Softmax { input } => {
            let x = ty(*input)?;
            expect_dtype("softmax", DType::F32, x.dtype)?;
            if x.shape.rank() != 2 {
                return Err(GraphError::ShapeMismatch {
                    op: "softmax",
                    detail: format!("expected a 2-D input, got {}", x.shape),
                });
            }
            x.clone()
        }

        NodeKind::Save { input, output } => {
            let x = ty(*input)?;
            let target = defined.get(output.index()).ok_or(GraphError::UnknownValue {
                value: NodeValue::of(*output),
            })?;
            match &target.kind {
                NodeKind::Variable {
                    kind: VariableKind::Output,
                    ty: out_ty,
                } => expect_same_type("save", out_ty, x)?,
                other => {
                    return Err(GraphError::InvalidArgument {
                        op: "save",
                        detail: format!("target '{}' is a {}", target.name, other.label()),
                    })
                }
            }
            return Ok(vec![]);
        }
    };
    Ok(vec![result])
}

/// Looks up the type of `value` among `defined` nodes.
pub fn operand(defined: &[Node], value: NodeValue) -> Result<&ValueType, GraphError> {
    defined
        .get(value.node.index())
        .and_then(|n| n.results.get(value.result))
        .ok_or(GraphError::UnknownValue { value })
}

fn expect_dtype(op: &'static str, expected: DType, actual: DType) -> Result<(), GraphError> {
    if expected != actual {
        return Err(GraphError::TypeMismatch {
            op,
            expected,
            actual,
        });
    }
    Ok(())
}

fn expect_shape(op: &'static str, expected: &Shape, actual: &Shape) -> Result<(), GraphError> {
    if expected != actual {
        return Err(GraphError::ShapeMismatch {
            op,
            detail: format!("expected {expected}, got {actual}"),
        });
    }
    Ok(())
}

fn expect_same_type(
    op: &'static str,
    expected: &ValueType,
    actual: &ValueType,
) -> Result<(), GraphError> {
    expect_dtype(op, expected.dtype, actual.dtype)?;
    expect_shape(op, &expected.shape, &actual.shape)
}
