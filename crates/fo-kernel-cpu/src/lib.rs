#![forbid(unsafe_code)]

mod broadcast;
mod builder;
mod dense;
mod linalg;
mod sparse;

use std::borrow::Cow;
use std::fmt;

use fo_core::{
    ArrayError, Density, Element, ElementKind, ExecutionMode, OperatorTag, Shape, TypedArray,
    broadcast_shape,
};

pub use builder::{ResultBuilder, store_numeric};
pub use dense::{dense_elementwise, dense_elementwise_in_place};
pub use linalg::{dense_product, dense_quotient};
pub use sparse::{sparse_elementwise, sparse_product, sparse_quotient};

/// Out-of-place kernel entry point.
pub type KernelFn =
    fn(&TypedArray, &TypedArray, &KernelContext) -> Result<TypedArray, KernelError>;

/// In-place kernel entry point; the first argument is the reused operand.
pub type InPlaceFn =
    fn(&mut TypedArray, &TypedArray, Side, &KernelContext) -> Result<(), KernelError>;

/// Which operand position a reused buffer occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Lhs,
    Rhs,
}

impl Side {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Lhs => "lhs",
            Self::Rhs => "rhs",
        }
    }

    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Lhs => Self::Rhs,
            Self::Rhs => Self::Lhs,
        }
    }
}

/// Kind, density and shape of the value a kernel must produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultPlan {
    pub kind: ElementKind,
    pub density: Density,
    pub shape: Shape,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelContext {
    pub op: OperatorTag,
    pub mode: ExecutionMode,
    pub plan: ResultPlan,
}

impl KernelContext {
    #[must_use]
    pub fn new(op: OperatorTag, mode: ExecutionMode, plan: ResultPlan) -> Self {
        Self { op, mode, plan }
    }

    /// Integer results reject zero divisors in hardened mode.
    fn guards_zero_divisor(&self) -> bool {
        self.mode == ExecutionMode::Hardened
            && self.plan.kind.is_integer()
            && self.op == OperatorTag::DivElementwise
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    ShapeMismatch {
        lhs: Shape,
        rhs: Shape,
    },
    OperandMismatch {
        side: &'static str,
        expected_kind: ElementKind,
        expected_density: Density,
        actual_kind: ElementKind,
        actual_density: Density,
    },
    UnsupportedOperator {
        kernel: &'static str,
        op: OperatorTag,
    },
    DivisionByZero {
        index: usize,
    },
    NanToLogical {
        index: usize,
    },
    ResultMismatch {
        expected: ResultPlan,
        actual_kind: ElementKind,
        actual_len: usize,
    },
    ReuseIneligible {
        reason: &'static str,
    },
    Array(ArrayError),
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShapeMismatch { lhs, rhs } => {
                write!(f, "shape mismatch: lhs={lhs}, rhs={rhs}")
            }
            Self::OperandMismatch {
                side,
                expected_kind,
                expected_density,
                actual_kind,
                actual_density,
            } => write!(
                f,
                "operand mismatch on {side}: expected {} {expected_kind}, got {} {actual_kind}",
                expected_density.name(),
                actual_density.name()
            ),
            Self::UnsupportedOperator { kernel, op } => {
                write!(f, "kernel {kernel} does not implement operator {op}")
            }
            Self::DivisionByZero { index } => {
                write!(f, "integer division by zero at element {index}")
            }
            Self::NanToLogical { index } => {
                write!(f, "NaN cannot be converted to logical at element {index}")
            }
            Self::ResultMismatch {
                expected,
                actual_kind,
                actual_len,
            } => write!(
                f,
                "result mismatch: planned {} {} {}, produced {actual_len} values of {actual_kind}",
                expected.density.name(),
                expected.kind,
                expected.shape
            ),
            Self::ReuseIneligible { reason } => {
                write!(f, "operand buffer cannot be reused: {reason}")
            }
            Self::Array(error) => write!(f, "array error: {error}"),
        }
    }
}

impl std::error::Error for KernelError {}

impl From<ArrayError> for KernelError {
    fn from(value: ArrayError) -> Self {
        Self::Array(value)
    }
}

fn ensure_kind<E: Element>(array: &TypedArray, side: &'static str) -> Result<(), KernelError> {
    if array.kind() == E::KIND {
        Ok(())
    } else {
        Err(KernelError::OperandMismatch {
            side,
            expected_kind: E::KIND,
            expected_density: array.density(),
            actual_kind: array.kind(),
            actual_density: array.density(),
        })
    }
}

/// Borrowed dense buffer of `array`, which must be dense and of kind `E`.
fn dense_operand<'a, E: Element>(
    array: &'a TypedArray,
    side: &'static str,
) -> Result<&'a [E], KernelError> {
    array
        .dense_values::<E>()
        .ok_or(KernelError::OperandMismatch {
            side,
            expected_kind: E::KIND,
            expected_density: Density::Dense,
            actual_kind: array.kind(),
            actual_density: array.density(),
        })
}

/// Column-major values of `array` in either density.
fn element_values<'a, E: Element>(
    array: &'a TypedArray,
    side: &'static str,
) -> Result<Cow<'a, [E]>, KernelError> {
    ensure_kind::<E>(array, side)?;
    if let Some(values) = array.dense_values::<E>() {
        return Ok(Cow::Borrowed(values));
    }
    array
        .sparse_matrix()
        .and_then(|matrix| matrix.densify::<E>())
        .map(Cow::Owned)
        .ok_or(KernelError::OperandMismatch {
            side,
            expected_kind: E::KIND,
            expected_density: array.density(),
            actual_kind: array.kind(),
            actual_density: array.density(),
        })
}

fn elementwise_shape(lhs: &TypedArray, rhs: &TypedArray) -> Result<Shape, KernelError> {
    broadcast_shape(lhs.shape(), rhs.shape()).map_err(|_| shape_mismatch(lhs, rhs))
}

type MatrixDims = (usize, usize);

/// Rows/columns of both operands of a matrix operator.
fn matrix_dims(lhs: &TypedArray, rhs: &TypedArray) -> Result<(MatrixDims, MatrixDims), KernelError> {
    match (lhs.shape().matrix_dims(), rhs.shape().matrix_dims()) {
        (Some(left), Some(right)) => Ok((left, right)),
        _ => Err(shape_mismatch(lhs, rhs)),
    }
}

fn shape_mismatch(lhs: &TypedArray, rhs: &TypedArray) -> KernelError {
    KernelError::ShapeMismatch {
        lhs: lhs.shape().clone(),
        rhs: rhs.shape().clone(),
    }
}
