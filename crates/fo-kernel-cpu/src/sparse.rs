use fo_core::{
    Density, Element, Numeric, OperatorClass, OperatorTag, Shape, SparseMatrix, TypedArray,
};

use crate::dense::{arithmetic, evaluate, logical};
use crate::linalg::{dense_quotient, multiply, product_shape};
use crate::{
    KernelContext, KernelError, ResultBuilder, element_values, elementwise_shape, shape_mismatch,
};

/// Compressed columns produced by a sparse kernel before storing into the planned kind.
struct Columns<N> {
    col_ptr: Vec<usize>,
    row_idx: Vec<usize>,
    values: Vec<N>,
}

impl<N> Columns<N> {
    fn with_capacity(cols: usize, nnz: usize) -> Self {
        let mut col_ptr = Vec::with_capacity(cols + 1);
        col_ptr.push(0);
        Self {
            col_ptr,
            row_idx: Vec::with_capacity(nnz),
            values: Vec::with_capacity(nnz),
        }
    }

    fn push(&mut self, row: usize, value: N) {
        self.row_idx.push(row);
        self.values.push(value);
    }

    fn close_column(&mut self) {
        self.col_ptr.push(self.row_idx.len());
    }
}

fn stored<'a, E: Element>(
    matrix: &'a SparseMatrix,
    side: &'static str,
    array: &TypedArray,
) -> Result<&'a [E], KernelError> {
    matrix
        .typed_values::<E>()
        .ok_or_else(|| KernelError::OperandMismatch {
            side,
            expected_kind: E::KIND,
            expected_density: Density::Sparse,
            actual_kind: array.kind(),
            actual_density: array.density(),
        })
}

/// Sparse `+`/`-` of equal shapes: union of the stored patterns.
fn merge<L: Element, R: Element, N: Numeric>(
    kernel: &'static str,
    lhs: (&SparseMatrix, &[L]),
    rhs: (&SparseMatrix, &[R]),
    op: OperatorTag,
) -> Result<Columns<N>, KernelError> {
    let (a, a_values) = lhs;
    let (b, b_values) = rhs;
    let mut out = Columns::with_capacity(a.cols(), a.nnz() + b.nnz());
    for col in 0..a.cols() {
        let (mut i, a_end) = (a.column_range(col).start, a.column_range(col).end);
        let (mut j, b_end) = (b.column_range(col).start, b.column_range(col).end);
        while i < a_end || j < b_end {
            let a_row = (i < a_end).then(|| a.row_idx()[i]);
            let b_row = (j < b_end).then(|| b.row_idx()[j]);
            let (row, left, right) = match (a_row, b_row) {
                (Some(ra), Some(rb)) if ra == rb => {
                    i += 1;
                    j += 1;
                    (ra, a_values[i - 1].lift::<N>(), b_values[j - 1].lift::<N>())
                }
                (Some(ra), Some(rb)) if ra < rb => {
                    i += 1;
                    (ra, a_values[i - 1].lift::<N>(), N::zero())
                }
                (Some(ra), None) => {
                    i += 1;
                    (ra, a_values[i - 1].lift::<N>(), N::zero())
                }
                (_, Some(rb)) => {
                    j += 1;
                    (rb, N::zero(), b_values[j - 1].lift::<N>())
                }
                (None, None) => break,
            };
            out.push(row, arithmetic(kernel, op, left, right)?);
        }
        out.close_column();
    }
    Ok(out)
}

/// Visits entries stored in both operands; `combine` sees `(lhs, rhs)` values.
fn intersect<L: Element, R: Element, T>(
    lhs: (&SparseMatrix, &[L]),
    rhs: (&SparseMatrix, &[R]),
    mut combine: impl FnMut(L, R) -> Result<T, KernelError>,
) -> Result<Columns<T>, KernelError> {
    let (a, a_values) = lhs;
    let (b, b_values) = rhs;
    let mut out = Columns::with_capacity(a.cols(), a.nnz().min(b.nnz()));
    for col in 0..a.cols() {
        let (mut i, a_end) = (a.column_range(col).start, a.column_range(col).end);
        let (mut j, b_end) = (b.column_range(col).start, b.column_range(col).end);
        while i < a_end && j < b_end {
            let (ra, rb) = (a.row_idx()[i], b.row_idx()[j]);
            if ra == rb {
                out.push(ra, combine(a_values[i], b_values[j])?);
                i += 1;
                j += 1;
            } else if ra < rb {
                i += 1;
            } else {
                j += 1;
            }
        }
        out.close_column();
    }
    Ok(out)
}

/// Maps each stored entry of `matrix`; `value_at` sees `(slot, linear index)`.
fn map_stored<N>(
    matrix: &SparseMatrix,
    mut value_at: impl FnMut(usize, usize) -> Result<N, KernelError>,
) -> Result<Columns<N>, KernelError> {
    let mut out = Columns::with_capacity(matrix.cols(), matrix.nnz());
    for col in 0..matrix.cols() {
        for slot in matrix.column_range(col) {
            let row = matrix.row_idx()[slot];
            out.push(row, value_at(slot, row + col * matrix.rows())?);
        }
        out.close_column();
    }
    Ok(out)
}

fn ensure_no_nan<E: Element>(values: &[E]) -> Result<(), KernelError> {
    match values.iter().position(|value| value.truth().is_none()) {
        Some(index) => Err(KernelError::NanToLogical { index }),
        None => Ok(()),
    }
}

/// Elementwise kernel for the `(S,S)`, `(S,D)` and `(D,S)` density families.
///
/// Equal-shape `S+S`, `S-S`, `S.*S` and `S&S` work on stored entries only,
/// as does `.*` against a dense operand or scalar. Every other combination is
/// evaluated over the full shape, so structural zeros take part as 0.
pub fn sparse_elementwise<L: Element, R: Element, N: Numeric>(
    lhs: &TypedArray,
    rhs: &TypedArray,
    ctx: &KernelContext,
) -> Result<TypedArray, KernelError> {
    const KERNEL: &str = "sparse_elementwise";
    if ctx.op.is_matrix_op() {
        return Err(KernelError::UnsupportedOperator {
            kernel: KERNEL,
            op: ctx.op,
        });
    }
    let shape = elementwise_shape(lhs, rhs)?;
    if shape != ctx.plan.shape {
        return Err(shape_mismatch(lhs, rhs));
    }
    let builder = ResultBuilder::new(&ctx.plan);
    let sparse_plan = ctx.plan.density == Density::Sparse;
    let same_shape = lhs.shape() == rhs.shape();

    match (lhs.sparse_matrix(), rhs.sparse_matrix()) {
        (Some(a), Some(b)) if sparse_plan && same_shape => {
            let a_values = stored::<L>(a, "lhs", lhs)?;
            let b_values = stored::<R>(b, "rhs", rhs)?;
            match ctx.op {
                OperatorTag::Add | OperatorTag::Sub => {
                    let out = merge::<L, R, N>(KERNEL, (a, a_values), (b, b_values), ctx.op)?;
                    return builder.finish_sparse_numeric(out.col_ptr, out.row_idx, out.values);
                }
                OperatorTag::MulElementwise => {
                    let out = intersect((a, a_values), (b, b_values), |x, y| {
                        Ok(x.lift::<N>().times(y.lift::<N>()))
                    })?;
                    return builder.finish_sparse_numeric(out.col_ptr, out.row_idx, out.values);
                }
                OperatorTag::And => {
                    ensure_no_nan(a_values)?;
                    ensure_no_nan(b_values)?;
                    let out = intersect((a, a_values), (b, b_values), |x, y| {
                        let (left, right) = (x.truth().unwrap_or(true), y.truth().unwrap_or(true));
                        logical(KERNEL, OperatorTag::And, left, right)
                    })?;
                    return builder.finish_sparse(
                        out.col_ptr,
                        out.row_idx,
                        fo_core::ArrayData::Bool(out.values),
                    );
                }
                _ => {}
            }
        }
        (Some(a), None) if sparse_plan && ctx.op == OperatorTag::MulElementwise => {
            if rhs.is_scalar() || same_shape {
                let a_values = stored::<L>(a, "lhs", lhs)?;
                let dense = element_values::<R>(rhs, "rhs")?;
                let broadcast = rhs.is_scalar();
                let out = map_stored(a, |slot, index| {
                    let other = dense[if broadcast { 0 } else { index }];
                    Ok(a_values[slot].lift::<N>().times(other.lift::<N>()))
                })?;
                return builder.finish_sparse_numeric(out.col_ptr, out.row_idx, out.values);
            }
        }
        (None, Some(b)) if sparse_plan && ctx.op == OperatorTag::MulElementwise => {
            if lhs.is_scalar() || same_shape {
                let b_values = stored::<R>(b, "rhs", rhs)?;
                let dense = element_values::<L>(lhs, "lhs")?;
                let broadcast = lhs.is_scalar();
                let out = map_stored(b, |slot, index| {
                    let other = dense[if broadcast { 0 } else { index }];
                    Ok(other.lift::<N>().times(b_values[slot].lift::<N>()))
                })?;
                return builder.finish_sparse_numeric(out.col_ptr, out.row_idx, out.values);
            }
        }
        _ => {}
    }

    let left = element_values::<L>(lhs, "lhs")?;
    let right = element_values::<R>(rhs, "rhs")?;
    let data = evaluate::<L, R, N>(KERNEL, (&left, lhs.shape()), (&right, rhs.shape()), ctx)?;
    builder.finish_data(data)
}

/// Matrix product with at least one sparse operand.
///
/// `S*S` stays sparse; `S*D` and `D*S` produce dense results.
pub fn sparse_product<L: Element, R: Element, N: Numeric>(
    lhs: &TypedArray,
    rhs: &TypedArray,
    ctx: &KernelContext,
) -> Result<TypedArray, KernelError> {
    const KERNEL: &str = "sparse_product";
    if ctx.op != OperatorTag::Product {
        return Err(KernelError::UnsupportedOperator {
            kernel: KERNEL,
            op: ctx.op,
        });
    }
    let ((m, k), n) = product_shape(lhs, rhs)?;
    if ctx.plan.shape != Shape::matrix(m, n) {
        return Err(shape_mismatch(lhs, rhs));
    }
    let builder = ResultBuilder::new(&ctx.plan);

    match (lhs.sparse_matrix(), rhs.sparse_matrix()) {
        (Some(a), Some(b)) => {
            let a_values = stored::<L>(a, "lhs", lhs)?;
            let b_values = stored::<R>(b, "rhs", rhs)?;
            let mut out = Columns::with_capacity(n, a.nnz().max(b.nnz()));
            let mut work = vec![N::zero(); m];
            let mut touched = vec![false; m];
            let mut rows = Vec::new();
            for j in 0..n {
                for slot in b.column_range(j) {
                    let p = b.row_idx()[slot];
                    let scale = b_values[slot].lift::<N>();
                    for inner in a.column_range(p) {
                        let i = a.row_idx()[inner];
                        work[i] = work[i].plus(a_values[inner].lift::<N>().times(scale));
                        if !touched[i] {
                            touched[i] = true;
                            rows.push(i);
                        }
                    }
                }
                rows.sort_unstable();
                for i in rows.drain(..) {
                    out.push(i, work[i]);
                    work[i] = N::zero();
                    touched[i] = false;
                }
                out.close_column();
            }
            if ctx.plan.density == Density::Sparse {
                builder.finish_sparse_numeric(out.col_ptr, out.row_idx, out.values)
            } else {
                let mut dense = vec![N::zero(); m * n];
                for j in 0..n {
                    for slot in out.col_ptr[j]..out.col_ptr[j + 1] {
                        dense[out.row_idx[slot] + j * m] = out.values[slot];
                    }
                }
                builder.finish_numeric(dense)
            }
        }
        (Some(a), None) => {
            let a_values = stored::<L>(a, "lhs", lhs)?;
            let dense = element_values::<R>(rhs, "rhs")?;
            let mut out = vec![N::zero(); m * n];
            for j in 0..n {
                for p in 0..k {
                    let scale = dense[p + j * k].lift::<N>();
                    for slot in a.column_range(p) {
                        let i = a.row_idx()[slot];
                        out[i + j * m] = out[i + j * m].plus(a_values[slot].lift::<N>().times(scale));
                    }
                }
            }
            builder.finish_numeric(out)
        }
        (None, Some(b)) => {
            let b_values = stored::<R>(b, "rhs", rhs)?;
            let dense = element_values::<L>(lhs, "lhs")?;
            let mut out = vec![N::zero(); m * n];
            for j in 0..n {
                for slot in b.column_range(j) {
                    let p = b.row_idx()[slot];
                    let scale = b_values[slot].lift::<N>();
                    for i in 0..m {
                        out[i + j * m] = out[i + j * m].plus(dense[i + p * m].lift::<N>().times(scale));
                    }
                }
            }
            builder.finish_numeric(out)
        }
        (None, None) => {
            let left: Vec<N> = element_values::<L>(lhs, "lhs")?
                .iter()
                .map(|value| value.lift::<N>())
                .collect();
            let right: Vec<N> = element_values::<R>(rhs, "rhs")?
                .iter()
                .map(|value| value.lift::<N>())
                .collect();
            builder.finish_numeric(multiply(&left, (m, k), &right, n))
        }
    }
}

/// Matrix right division with a sparse operand; the result is dense.
pub fn sparse_quotient<L: Element, R: Element, N: Numeric>(
    lhs: &TypedArray,
    rhs: &TypedArray,
    ctx: &KernelContext,
) -> Result<TypedArray, KernelError> {
    if ctx.op.class() != OperatorClass::Arithmetic || ctx.plan.density != Density::Dense {
        return Err(KernelError::UnsupportedOperator {
            kernel: "sparse_quotient",
            op: ctx.op,
        });
    }
    dense_quotient::<L, R, N>(lhs, rhs, ctx)
}
