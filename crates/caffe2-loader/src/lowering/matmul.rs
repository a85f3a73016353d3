// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Matrix-product lowerings.
//!
//! The IR only has a 2-D `MatMul`, so every Caffe2 product is rewritten
//! around it:
//!
//! ```text
//! MatMul / FC     flatten to 2-D, optional transposes, MatMul (+ bias Add)
//! BatchMatMul     rank 2          → MatMul
//!                 RHS unbatched   → Reshape(lhs) → MatMul → Reshape
//!                 equal batches   → per batch: Slice/Reshape → MatMul,
//!                                   then Concat(axis 0) → Reshape
//! ```

use super::{built, dims_of, reshape_to, Lowering};
use crate::args::ArgReader;
use crate::record::OperatorRecord;
use crate::LoadError;
use graph_ir::NodeValue;
use tensor_core::ArithmeticOp;

// ── Shared helpers ─────────────────────────────────────────────────

fn transpose_2d(
    op: &OperatorRecord,
    ctx: &mut Lowering<'_>,
    v: NodeValue,
    suffix: &str,
) -> Result<NodeValue, LoadError> {
    built(
        op,
        ctx.graph
            .create_transpose(Lowering::node_name(op, suffix), v, vec![1, 0]),
    )
}

/// Flattens `v` to `(Π dims[..axis], Π dims[axis..])`.
fn flatten_at(
    op: &OperatorRecord,
    ctx: &mut Lowering<'_>,
    v: NodeValue,
    arg: &str,
    axis: usize,
    suffix: &str,
) -> Result<NodeValue, LoadError> {
    let dims = dims_of(op, ctx, v)?;
    if axis == 0 || axis >= dims.len() {
        return Err(LoadError::malformed(
            op.label(),
            arg,
            format!("axis {axis} cannot split {dims:?} into a matrix"),
        ));
    }
    let rows = dims[..axis].iter().product();
    let cols = dims[axis..].iter().product();
    reshape_to(op, ctx, v, vec![rows, cols], suffix)
}

// ── MatMul / FC ────────────────────────────────────────────────────

pub(super) fn lower_matmul(op: &OperatorRecord, ctx: &mut Lowering<'_>) -> Result<(), LoadError> {
    let args = ArgReader::new(op);
    let (trans_a, trans_b) = (args.flag("trans_a")?, args.flag("trans_b")?);
    let axis_a = args.usize_or("axis_a", 1)?;
    let axis_b = args.usize_or("axis_b", 1)?;

    let a = ctx.input(op, 0)?;
    let b = ctx.input(op, 1)?;
    let mut a = flatten_at(op, ctx, a, "axis_a", axis_a, "lhs_2d")?;
    let mut b = flatten_at(op, ctx, b, "axis_b", axis_b, "rhs_2d")?;
    if trans_a {
        a = transpose_2d(op, ctx, a, "lhs_t")?;
    }
    if trans_b {
        b = transpose_2d(op, ctx, b, "rhs_t")?;
    }
    let value = built(op, ctx.graph.create_matmul(op.label(), a, b))?;
    ctx.bind_output(op, 0, value)
}

/// `Y = X · Wᵀ + b` (`FC`) or `Y = X · W + b` (`FCTransposed`).
fn lower_fully_connected(
    op: &OperatorRecord,
    ctx: &mut Lowering<'_>,
    weight_transposed: bool,
) -> Result<(), LoadError> {
    let args = ArgReader::new(op);
    let axis = args.usize_or("axis", 1)?;
    let axis_w = args.usize_or("axis_w", 1)?;

    let x = ctx.input(op, 0)?;
    let w = ctx.input(op, 1)?;
    let bias = ctx.input(op, 2)?;
    let x_dims = dims_of(op, ctx, x)?;

    let x = flatten_at(op, ctx, x, "axis", axis, "input_2d")?;
    let w = flatten_at(op, ctx, w, "axis_w", axis_w, "weight_2d")?;
    let w = if weight_transposed {
        w
    } else {
        transpose_2d(op, ctx, w, "weight_t")?
    };

    let product = built(
        op,
        ctx.graph
            .create_matmul(Lowering::node_name(op, "matmul"), x, w),
    )?;
    let out_2d = dims_of(op, ctx, product)?;
    let bias = built(
        op,
        ctx.graph
            .create_broadcast(Lowering::node_name(op, "bias"), bias, 1, out_2d.clone()),
    )?;
    let sum = built(
        op,
        ctx.graph
            .create_arithmetic(op.label(), ArithmeticOp::Add, product, bias),
    )?;

    let mut out_dims = x_dims[..axis].to_vec();
    out_dims.push(out_2d[1]);
    let value = reshape_to(op, ctx, sum, out_dims, "reshape")?;
    ctx.bind_output(op, 0, value)
}

pub(super) fn lower_fc(op: &OperatorRecord, ctx: &mut Lowering<'_>) -> Result<(), LoadError> {
    lower_fully_connected(op, ctx, false)
}

pub(super) fn lower_fc_transposed(
    op: &OperatorRecord,
    ctx: &mut Lowering<'_>,
) -> Result<(), LoadError> {
    lower_fully_connected(op, ctx, true)
}

// ── BatchMatMul ────────────────────────────────────────────────────

/// One BatchMatMul operand split into batch dims and its matrix.
#[derive(Debug, Clone)]
struct Operand {
    value: NodeValue,
    batch: Vec<usize>,
    rows: usize,
    cols: usize,
    transpose: bool,
}

impl Operand {
    fn read(
        op: &OperatorRecord,
        ctx: &Lowering<'_>,
        value: NodeValue,
        transpose: bool,
    ) -> Result<Self, LoadError> {
        let dims = dims_of(op, ctx, value)?;
        if dims.len() < 2 {
            return Err(LoadError::shape(
                op.label(),
                format!("operands must have rank >= 2, got {dims:?}"),
            ));
        }
        let r = dims.len() - 2;
        Ok(Self {
            value,
            batch: dims[..r].to_vec(),
            rows: dims[r],
            cols: dims[r + 1],
            transpose,
        })
    }

    /// True when the operand has no batch dims or only unit ones.
    fn is_unbatched(&self) -> bool {
        self.batch.iter().all(|&d| d == 1)
    }

    fn batch_count(&self) -> usize {
        self.batch.iter().product()
    }

    /// Reduces an unbatched operand to its 2-D matrix, transposed if asked.
    fn to_matrix(
        &self,
        op: &OperatorRecord,
        ctx: &mut Lowering<'_>,
        side: &str,
    ) -> Result<NodeValue, LoadError> {
        let m = reshape_to(op, ctx, self.value, vec![self.rows, self.cols], &format!("{side}_2d"))?;
        if self.transpose {
            transpose_2d(op, ctx, m, &format!("{side}_t"))
        } else {
            Ok(m)
        }
    }

    /// Matrix `index` of a batched operand.
    fn slice(
        &self,
        op: &OperatorRecord,
        ctx: &mut Lowering<'_>,
        flat: NodeValue,
        index: usize,
        side: &str,
    ) -> Result<NodeValue, LoadError> {
        let slice = built(
            op,
            ctx.graph.create_slice(
                Lowering::node_name(op, &format!("{side}{index}")),
                flat,
                vec![index, 0, 0],
                vec![1, self.rows, self.cols],
            ),
        )?;
        let m = built(
            op,
            ctx.graph.create_reshape(
                Lowering::node_name(op, &format!("{side}{index}_2d")),
                slice,
                vec![self.rows, self.cols],
            ),
        )?;
        if self.transpose {
            transpose_2d(op, ctx, m, &format!("{side}{index}_t"))
        } else {
            Ok(m)
        }
    }

    /// Collapses multiple batch dims into one.
    fn flatten_batch(
        &self,
        op: &OperatorRecord,
        ctx: &mut Lowering<'_>,
        side: &str,
    ) -> Result<NodeValue, LoadError> {
        reshape_to(
            op,
            ctx,
            self.value,
            vec![self.batch_count(), self.rows, self.cols],
            &format!("{side}_3d"),
        )
    }
}

pub(super) fn lower_batch_matmul(
    op: &OperatorRecord,
    ctx: &mut Lowering<'_>,
) -> Result<(), LoadError> {
    let args = ArgReader::new(op);
    let trans_a = args.flag("trans_a")?;
    let trans_b = args.flag("trans_b")?;
    let broadcast = args.flag("broadcast")?;

    let a = ctx.input(op, 0)?;
    let b = ctx.input(op, 1)?;
    let lhs = Operand::read(op, ctx, a, trans_a)?;
    let rhs = Operand::read(op, ctx, b, trans_b)?;

    if lhs.batch.len() != rhs.batch.len() && !broadcast {
        return Err(LoadError::shape(
            op.label(),
            format!(
                "operand ranks differ ({} vs {}) and broadcast is not set",
                lhs.batch.len() + 2,
                rhs.batch.len() + 2
            ),
        ));
    }

    let value = if lhs.batch.is_empty() && rhs.batch.is_empty() {
        let a = lhs.to_matrix(op, ctx, "lhs")?;
        let b = rhs.to_matrix(op, ctx, "rhs")?;
        built(op, ctx.graph.create_matmul(op.label(), a, b))?
    } else if lhs.batch == rhs.batch {
        let batch = lhs.batch.clone();
        lower_parallel(op, ctx, &lhs, &rhs, &batch)?
    } else if !broadcast {
        return Err(LoadError::shape(
            op.label(),
            format!(
                "batch dims {:?} and {:?} differ and broadcast is not set",
                lhs.batch, rhs.batch
            ),
        ));
    } else if rhs.is_unbatched() {
        lower_broadcast_rhs(op, ctx, &lhs, &rhs)?
    } else if lhs.is_unbatched() {
        let mut batch = rhs.batch.clone();
        if lhs.batch.len() > batch.len() {
            batch.splice(0..0, std::iter::repeat(1).take(lhs.batch.len() - batch.len()));
        }
        lower_parallel(op, ctx, &lhs, &rhs, &batch)?
    } else {
        return Err(LoadError::shape(
            op.label(),
            format!("cannot broadcast batch dims {:?} against {:?}", lhs.batch, rhs.batch),
        ));
    };
    ctx.bind_output(op, 0, value)
}

/// `(b.., M, K) × (K, N)`: fold the LHS batch into its rows.
fn lower_broadcast_rhs(
    op: &OperatorRecord,
    ctx: &mut Lowering<'_>,
    lhs: &Operand,
    rhs: &Operand,
) -> Result<NodeValue, LoadError> {
    let mut a = lhs.value;
    let (mut m, mut k) = (lhs.rows, lhs.cols);
    if lhs.transpose {
        let rank = lhs.batch.len() + 2;
        let mut perm: Vec<usize> = (0..rank).collect();
        perm.swap(rank - 2, rank - 1);
        a = built(
            op,
            ctx.graph
                .create_transpose(Lowering::node_name(op, "lhs_t"), a, perm),
        )?;
        std::mem::swap(&mut m, &mut k);
    }
    let a = reshape_to(op, ctx, a, vec![lhs.batch_count() * m, k], "lhs_2d")?;
    let b = rhs.to_matrix(op, ctx, "rhs")?;
    let product = built(
        op,
        ctx.graph
            .create_matmul(Lowering::node_name(op, "matmul"), a, b),
    )?;

    let n = dims_of(op, ctx, product)?[1];
    let mut out = vec![1; rhs.batch.len().saturating_sub(lhs.batch.len())];
    out.extend_from_slice(&lhs.batch);
    out.extend([m, n]);
    reshape_to(op, ctx, product, out, "reshape")
}

/// One MatMul per batch index, stitched back with Concat and Reshape.
fn lower_parallel(
    op: &OperatorRecord,
    ctx: &mut Lowering<'_>,
    lhs: &Operand,
    rhs: &Operand,
    batch: &[usize],
) -> Result<NodeValue, LoadError> {
    let count: usize = batch.iter().product();

    // Batched operands are sliced per index; unbatched ones are shared.
    #[derive(Clone, Copy)]
    enum Source {
        Sliced(NodeValue),
        Shared(NodeValue),
    }
    let mut prepare = |operand: &Operand, side: &str| -> Result<Source, LoadError> {
        if operand.is_unbatched() && operand.batch_count() != count {
            Ok(Source::Shared(operand.to_matrix(op, ctx, side)?))
        } else {
            Ok(Source::Sliced(operand.flatten_batch(op, ctx, side)?))
        }
    };
    let a_src = prepare(lhs, "lhs")?;
    let b_src = prepare(rhs, "rhs")?;

    let mut products = Vec::with_capacity(count);
    for i in 0..count {
        let a = match a_src {
            Source::Sliced(flat) => lhs.slice(op, ctx, flat, i, "lhs")?,
            Source::Shared(m) => m,
        };
        let b = match b_src {
            Source::Sliced(flat) => rhs.slice(op, ctx, flat, i, "rhs")?,
            Source::Shared(m) => m,
        };
        products.push(built(
            op,
            ctx.graph
                .create_matmul(Lowering::node_name(op, &format!("matmul{i}")), a, b),
        )?);
    }

    let (m, n) = match products.first() {
        Some(&p) => {
            let d = dims_of(op, ctx, p)?;
            (d[0], d[1])
        }
        None => {
            return Err(LoadError::shape(op.label(), "batch dims have no elements"));
        }
    };
    let joined = built(
        op,
        ctx.graph
            .create_concat(Lowering::node_name(op, "concat"), products, 0),
    )?;
    let mut out = batch.to_vec();
    out.extend([m, n]);
    built(op, ctx.graph.create_reshape(op.label(), joined, out))
}
