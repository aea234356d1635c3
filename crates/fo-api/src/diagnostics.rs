use std::fmt;

use fo_core::{ArrayError, Density, ElementKind, OperatorTag, Shape};
use fo_dispatch::{DispatchError, OperandDescriptor};
use fo_kernel_cpu::KernelError;

/// Taxonomy of operator failures. Every class is recoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    ShapeMismatch,
    UnsupportedOperatorForType,
    DivisionByZero,
    NanToLogical,
    Internal,
}

impl ErrorClass {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ShapeMismatch => "shape_mismatch",
            Self::UnsupportedOperatorForType => "unsupported_operator_for_type",
            Self::DivisionByZero => "division_by_zero",
            Self::NanToLogical => "nan_to_logical",
            Self::Internal => "internal",
        }
    }

    #[must_use]
    pub const fn identifier(self) -> &'static str {
        match self {
            Self::ShapeMismatch => "Octave:nonconformant-args",
            Self::UnsupportedOperatorForType => "Octave:undefined-function",
            Self::DivisionByZero => "Octave:divide-by-zero",
            Self::NanToLogical => "Octave:nan-to-logical-conversion",
            Self::Internal => "Octave:internal-error",
        }
    }
}

/// Identifier and message as the interpreter prints them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub identifier: &'static str,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.identifier, self.message)
    }
}

/// Interpreter type name of a value, e.g. `int8 matrix` or `sparse bool matrix`.
#[must_use]
pub fn type_name(kind: ElementKind, density: Density, scalar: bool) -> String {
    if density == Density::Sparse {
        return match kind {
            ElementKind::Bool => "sparse bool matrix",
            ElementKind::Complex32 | ElementKind::Complex64 => "sparse complex matrix",
            _ => "sparse matrix",
        }
        .to_string();
    }
    let (scalar_name, matrix_name) = match kind {
        ElementKind::Bool => ("bool", "bool matrix"),
        ElementKind::Float32 => ("float scalar", "float matrix"),
        ElementKind::Float64 => ("double", "matrix"),
        ElementKind::Complex32 => ("float complex scalar", "float complex matrix"),
        ElementKind::Complex64 => ("complex scalar", "complex matrix"),
        integer => {
            let suffix = if scalar { "scalar" } else { "matrix" };
            return format!("{} {suffix}", integer.name());
        }
    };
    let name = if scalar { scalar_name } else { matrix_name };
    name.to_string()
}

fn operand_type_name(operand: &OperandDescriptor) -> String {
    type_name(operand.kind, operand.density, operand.is_scalar())
}

fn nonconformant(op: OperatorTag, lhs: &Shape, rhs: &Shape) -> Diagnostic {
    Diagnostic {
        identifier: ErrorClass::ShapeMismatch.identifier(),
        message: format!(
            "operator {}: nonconformant arguments (op1 is {lhs}, op2 is {rhs})",
            op.symbol()
        ),
    }
}

/// Class and diagnostic for a failed `op`.
#[must_use]
pub fn diagnose(op: OperatorTag, error: &DispatchError) -> (ErrorClass, Diagnostic) {
    let internal = |detail: String| {
        (
            ErrorClass::Internal,
            Diagnostic {
                identifier: ErrorClass::Internal.identifier(),
                message: format!("operator {}: {detail}", op.symbol()),
            },
        )
    };
    match error {
        DispatchError::ShapeMismatch { op, lhs, rhs } => {
            (ErrorClass::ShapeMismatch, nonconformant(*op, lhs, rhs))
        }
        DispatchError::Kernel(KernelError::ShapeMismatch { lhs, rhs }) => {
            (ErrorClass::ShapeMismatch, nonconformant(op, lhs, rhs))
        }
        DispatchError::UnsupportedOperatorForType { op, lhs, rhs, .. } => (
            ErrorClass::UnsupportedOperatorForType,
            Diagnostic {
                identifier: ErrorClass::UnsupportedOperatorForType.identifier(),
                message: format!(
                    "binary operator '{}' not implemented for '{}' by '{}' operations",
                    op.symbol(),
                    operand_type_name(lhs),
                    operand_type_name(rhs)
                ),
            },
        ),
        DispatchError::Kernel(KernelError::DivisionByZero { index }) => (
            ErrorClass::DivisionByZero,
            Diagnostic {
                identifier: ErrorClass::DivisionByZero.identifier(),
                message: format!(
                    "operator {}: integer division by zero (element {})",
                    op.symbol(),
                    index + 1
                ),
            },
        ),
        DispatchError::Kernel(KernelError::NanToLogical { .. }) => (
            ErrorClass::NanToLogical,
            Diagnostic {
                identifier: ErrorClass::NanToLogical.identifier(),
                message: "logical: NaN can't be converted to logical value".to_string(),
            },
        ),
        DispatchError::Kernel(KernelError::Array(ArrayError::NonConformant { lhs, rhs }))
        | DispatchError::Array(ArrayError::NonConformant { lhs, rhs }) => {
            (ErrorClass::ShapeMismatch, nonconformant(op, lhs, rhs))
        }
        DispatchError::Kernel(other) => internal(other.to_string()),
        DispatchError::Array(other) => internal(other.to_string()),
    }
}
