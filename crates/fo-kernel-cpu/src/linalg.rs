use fo_core::{Element, Numeric, OperatorTag, Shape, TypedArray};
use tracing::warn;

use crate::{
    KernelContext, KernelError, MatrixDims, ResultBuilder, element_values, matrix_dims,
    shape_mismatch,
};

/// Column-major `m x k` times `k x n`.
pub(crate) fn multiply<N: Numeric>(a: &[N], a_dims: MatrixDims, b: &[N], n: usize) -> Vec<N> {
    let (m, k) = a_dims;
    let mut out = vec![N::zero(); m * n];
    for j in 0..n {
        for p in 0..k {
            let scale = b[p + j * k];
            if scale.is_zero() {
                continue;
            }
            for i in 0..m {
                out[i + j * m] = out[i + j * m].plus(a[i + p * m].times(scale));
            }
        }
    }
    out
}

/// LU factors of a column-major square matrix with partial pivoting.
struct LuFactors<N> {
    n: usize,
    lu: Vec<N>,
    rows: Vec<usize>,
    singular: bool,
}

impl<N: Numeric> LuFactors<N> {
    fn factor(mut lu: Vec<N>, n: usize) -> Self {
        let mut rows: Vec<usize> = (0..n).collect();
        let mut singular = false;
        for col in 0..n {
            let mut pivot_row = col;
            let mut pivot_mag = lu[col + col * n].magnitude();
            for row in col + 1..n {
                let mag = lu[row + col * n].magnitude();
                if mag > pivot_mag {
                    pivot_row = row;
                    pivot_mag = mag;
                }
            }
            if pivot_mag == 0.0 || pivot_mag.is_nan() {
                singular = true;
                continue;
            }
            if pivot_row != col {
                for k in 0..n {
                    lu.swap(col + k * n, pivot_row + k * n);
                }
                rows.swap(col, pivot_row);
            }
            let pivot = lu[col + col * n];
            for row in col + 1..n {
                let factor = lu[row + col * n].divide(pivot);
                lu[row + col * n] = factor;
                if factor.is_zero() {
                    continue;
                }
                for k in col + 1..n {
                    lu[row + k * n] = lu[row + k * n].minus(factor.times(lu[col + k * n]));
                }
            }
        }
        Self {
            n,
            lu,
            rows,
            singular,
        }
    }

    fn solve(&self, rhs: &[N]) -> Vec<N> {
        let n = self.n;
        let mut y: Vec<N> = self.rows.iter().map(|row| rhs[*row]).collect();
        for i in 0..n {
            for j in 0..i {
                y[i] = y[i].minus(self.lu[i + j * n].times(y[j]));
            }
        }
        for i in (0..n).rev() {
            for j in i + 1..n {
                y[i] = y[i].minus(self.lu[i + j * n].times(y[j]));
            }
            y[i] = y[i].divide(self.lu[i + i * n]);
        }
        y
    }
}

/// Solves `X * B = A` for `A` of `m x n` and square `B` of `n x n`.
///
/// Returns the column-major solution and whether `B` was singular.
pub(crate) fn right_divide<N: Numeric>(a: &[N], m: usize, b: &[N], n: usize) -> (Vec<N>, bool) {
    // X * B = A  <=>  B^T * X^T = A^T
    let mut transposed = vec![N::zero(); n * n];
    for i in 0..n {
        for j in 0..n {
            transposed[i + j * n] = b[j + i * n];
        }
    }
    let factors = LuFactors::factor(transposed, n);
    let mut out = vec![N::zero(); m * n];
    let mut row = vec![N::zero(); n];
    for r in 0..m {
        for (j, slot) in row.iter_mut().enumerate() {
            *slot = a[r + j * m];
        }
        for (j, value) in factors.solve(&row).into_iter().enumerate() {
            out[r + j * m] = value;
        }
    }
    (out, factors.singular)
}

pub(crate) fn product_shape(
    lhs: &TypedArray,
    rhs: &TypedArray,
) -> Result<(MatrixDims, usize), KernelError> {
    let ((m, k), (inner, n)) = matrix_dims(lhs, rhs)?;
    if k != inner {
        return Err(shape_mismatch(lhs, rhs));
    }
    Ok(((m, k), n))
}

pub(crate) fn quotient_shape(lhs: &TypedArray, rhs: &TypedArray) -> Result<MatrixDims, KernelError> {
    let ((m, cols), (rows, n)) = matrix_dims(lhs, rhs)?;
    if rows != n || cols != n {
        return Err(shape_mismatch(lhs, rhs));
    }
    Ok((m, n))
}

pub(crate) fn warn_singular(kernel: &'static str, dims: MatrixDims) {
    warn!(
        kernel,
        rows = dims.0,
        cols = dims.1,
        "matrix singular to machine precision"
    );
}

fn ensure_op(kernel: &'static str, ctx: &KernelContext, expected: OperatorTag) -> Result<(), KernelError> {
    if ctx.op == expected {
        Ok(())
    } else {
        Err(KernelError::UnsupportedOperator {
            kernel,
            op: ctx.op,
        })
    }
}

fn lifted<E: Element, N: Numeric>(values: &[E]) -> Vec<N> {
    values.iter().map(|value| value.lift::<N>()).collect()
}

/// Dense matrix product `lhs * rhs`.
pub fn dense_product<L: Element, R: Element, N: Numeric>(
    lhs: &TypedArray,
    rhs: &TypedArray,
    ctx: &KernelContext,
) -> Result<TypedArray, KernelError> {
    const KERNEL: &str = "dense_product";
    ensure_op(KERNEL, ctx, OperatorTag::Product)?;
    let left = element_values::<L>(lhs, "lhs")?;
    let right = element_values::<R>(rhs, "rhs")?;
    let ((m, k), n) = product_shape(lhs, rhs)?;
    if ctx.plan.shape != Shape::matrix(m, n) {
        return Err(shape_mismatch(lhs, rhs));
    }
    let out = multiply(&lifted::<L, N>(&left), (m, k), &lifted::<R, N>(&right), n);
    ResultBuilder::new(&ctx.plan).finish_numeric(out)
}

/// Dense matrix right division `lhs / rhs` for a square divisor.
pub fn dense_quotient<L: Element, R: Element, N: Numeric>(
    lhs: &TypedArray,
    rhs: &TypedArray,
    ctx: &KernelContext,
) -> Result<TypedArray, KernelError> {
    const KERNEL: &str = "dense_quotient";
    ensure_op(KERNEL, ctx, OperatorTag::Quotient)?;
    let left = element_values::<L>(lhs, "lhs")?;
    let right = element_values::<R>(rhs, "rhs")?;
    let (m, n) = quotient_shape(lhs, rhs)?;
    if ctx.plan.shape != Shape::matrix(m, n) {
        return Err(shape_mismatch(lhs, rhs));
    }
    let (out, singular) = right_divide(&lifted::<L, N>(&left), m, &lifted::<R, N>(&right), n);
    if singular {
        warn_singular(KERNEL, (n, n));
    }
    ResultBuilder::new(&ctx.plan).finish_numeric(out)
}
