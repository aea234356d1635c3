use fo_core::{Density, ElementKind, OperatorClass, OperatorTag, Shape, TypedArray, broadcast_shape};
use fo_kernel_cpu::{ResultPlan, Side};
use tracing::{debug, trace};

use crate::{DispatchError, KernelEntry, KernelKey, KernelRegistry};

/// Kind, density and shape of one operand; all resolution looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperandDescriptor {
    pub kind: ElementKind,
    pub density: Density,
    pub shape: Shape,
}

impl OperandDescriptor {
    #[must_use]
    pub fn new(kind: ElementKind, density: Density, shape: impl Into<Shape>) -> Self {
        Self {
            kind,
            density,
            shape: shape.into(),
        }
    }

    #[must_use]
    pub fn of(array: &TypedArray) -> Self {
        Self {
            kind: array.kind(),
            density: array.density(),
            shape: array.shape().clone(),
        }
    }

    #[must_use]
    pub fn is_scalar(&self) -> bool {
        self.shape.is_scalar()
    }
}

/// How the executed key relates to the operands as given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionPath {
    Exact,
    ConvertedOperand {
        side: Side,
        from: ElementKind,
        to: ElementKind,
    },
    PromotedBoth {
        to: ElementKind,
    },
}

impl ResolutionPath {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::ConvertedOperand { .. } => "converted_operand",
            Self::PromotedBoth { .. } => "promoted_both",
        }
    }
}

/// Outcome of resolution: which kernel runs, on what, producing what.
#[derive(Debug, Clone)]
pub struct ResolvedKernel {
    pub requested_op: OperatorTag,
    pub key: KernelKey,
    pub entry: KernelEntry,
    pub path: ResolutionPath,
    pub plan: ResultPlan,
}

impl ResolvedKernel {
    /// Operator after canonicalization.
    #[must_use]
    pub fn effective_op(&self) -> OperatorTag {
        self.key.op
    }

    /// Kind the operand on `side` must be converted to before the kernel runs.
    #[must_use]
    pub fn conversion(&self, side: Side) -> Option<ElementKind> {
        match self.path {
            ResolutionPath::Exact => None,
            ResolutionPath::ConvertedOperand { side: converted, to, .. } => {
                (converted == side).then_some(to)
            }
            ResolutionPath::PromotedBoth { to } => Some(to),
        }
    }
}

/// Matrix operators with a scalar operand act elementwise.
#[must_use]
pub fn canonicalize(op: OperatorTag, lhs: &OperandDescriptor, rhs: &OperandDescriptor) -> OperatorTag {
    match op {
        OperatorTag::Product if lhs.is_scalar() || rhs.is_scalar() => OperatorTag::MulElementwise,
        OperatorTag::Quotient if rhs.is_scalar() => OperatorTag::DivElementwise,
        other => other,
    }
}

/// Storage the result of `op` takes for the given operand densities.
#[must_use]
pub fn result_density(op: OperatorTag, lhs: Density, rhs: Density) -> Density {
    let any_sparse = lhs == Density::Sparse || rhs == Density::Sparse;
    let both_sparse = lhs == Density::Sparse && rhs == Density::Sparse;
    let sparse = match op {
        OperatorTag::Add | OperatorTag::Sub | OperatorTag::Product => both_sparse,
        OperatorTag::Quotient => false,
        _ => any_sparse,
    };
    if sparse { Density::Sparse } else { Density::Dense }
}

fn result_shape(op: OperatorTag, lhs: &Shape, rhs: &Shape) -> Option<Shape> {
    match op {
        OperatorTag::Product => {
            let ((m, k), (inner, n)) = (lhs.matrix_dims()?, rhs.matrix_dims()?);
            (k == inner).then(|| Shape::matrix(m, n))
        }
        OperatorTag::Quotient => {
            let ((m, cols), (rows, n)) = (lhs.matrix_dims()?, rhs.matrix_dims()?);
            (rows == n && cols == n).then(|| Shape::matrix(m, n))
        }
        _ => broadcast_shape(lhs, rhs).ok(),
    }
}

/// Picks the kernel for `op` over the two operands without touching any data.
pub fn resolve(
    registry: &KernelRegistry,
    op: OperatorTag,
    lhs: &OperandDescriptor,
    rhs: &OperandDescriptor,
) -> Result<ResolvedKernel, DispatchError> {
    let unsupported = |reason: &'static str| DispatchError::UnsupportedOperatorForType {
        op,
        lhs: lhs.clone(),
        rhs: rhs.clone(),
        reason,
    };
    let effective = canonicalize(op, lhs, rhs);
    let table = registry.table();
    if effective.class() == OperatorClass::Arithmetic
        && !table.arithmetic_allowed(lhs.kind, rhs.kind)
    {
        return Err(unsupported("promotion policy defines no arithmetic for these kinds"));
    }

    let requested = KernelKey::new(lhs.kind, lhs.density, rhs.kind, rhs.density, effective);
    let (key, path) = if registry.contains(&requested) {
        trace!(key = %requested, "exact kernel match");
        (requested, ResolutionPath::Exact)
    } else {
        if lhs.kind == rhs.kind {
            return Err(unsupported("no kernel registered for operand types"));
        }
        let promoted = table.promote(lhs.kind, rhs.kind);
        let path = if promoted == lhs.kind {
            ResolutionPath::ConvertedOperand {
                side: Side::Rhs,
                from: rhs.kind,
                to: promoted,
            }
        } else if promoted == rhs.kind {
            ResolutionPath::ConvertedOperand {
                side: Side::Lhs,
                from: lhs.kind,
                to: promoted,
            }
        } else {
            ResolutionPath::PromotedBoth { to: promoted }
        };
        if !promoted.supports_sparse() && requested.has_sparse_operand() {
            return Err(unsupported("sparse storage cannot hold the promoted kind"));
        }
        let key = requested.with_kinds(promoted, promoted);
        if !registry.contains(&key) {
            return Err(unsupported("no kernel registered for operand types"));
        }
        debug!(
            requested = %requested,
            key = %key,
            path = path.label(),
            "kernel resolved through conversion"
        );
        (key, path)
    };
    let entry = *registry
        .get(&key)
        .ok_or_else(|| unsupported("no kernel registered for operand types"))?;

    let kind = table.result_kind(effective, lhs.kind, rhs.kind);
    let density = result_density(effective, lhs.density, rhs.density);
    if density == Density::Sparse && !kind.supports_sparse() {
        return Err(unsupported("sparse storage cannot hold the result kind"));
    }
    let shape = result_shape(effective, &lhs.shape, &rhs.shape).ok_or_else(|| {
        DispatchError::ShapeMismatch {
            op,
            lhs: lhs.shape.clone(),
            rhs: rhs.shape.clone(),
        }
    })?;

    Ok(ResolvedKernel {
        requested_op: op,
        key,
        entry,
        path,
        plan: ResultPlan {
            kind,
            density,
            shape,
        },
    })
}
