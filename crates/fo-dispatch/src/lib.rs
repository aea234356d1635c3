#![forbid(unsafe_code)]

mod registry;
mod resolve;

use std::borrow::Cow;
use std::fmt;

use fo_core::{ArrayError, ElementKind, ExecutionMode, OperatorTag, Shape, TypedArray};
use fo_kernel_cpu::{KernelContext, KernelError, ResultBuilder, ResultPlan, Side};
use fo_promote::PromotionPolicy;
use tracing::debug;

pub use registry::{
    KernelEntry, KernelKey, KernelRegistry, RegistryBuilder, RegistryError, install_registry,
    shared_registry,
};
pub use resolve::{
    OperandDescriptor, ResolutionPath, ResolvedKernel, canonicalize, resolve, result_density,
};

/// An operand that is either borrowed or handed over for possible reuse.
#[derive(Debug)]
pub enum Operand<'a> {
    Borrowed(&'a TypedArray),
    Owned(TypedArray),
}

impl Operand<'_> {
    #[must_use]
    pub fn array(&self) -> &TypedArray {
        match self {
            Self::Borrowed(array) => array,
            Self::Owned(array) => array,
        }
    }

    #[must_use]
    pub fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchDecision {
    pub op: OperatorTag,
    pub effective_op: OperatorTag,
    pub mode: ExecutionMode,
    pub policy: PromotionPolicy,
    pub kernel: &'static str,
    pub key: KernelKey,
    pub path: ResolutionPath,
    pub plan: ResultPlan,
    pub in_place: Option<Side>,
}

#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub array: TypedArray,
    pub decision: DispatchDecision,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    ShapeMismatch {
        op: OperatorTag,
        lhs: Shape,
        rhs: Shape,
    },
    UnsupportedOperatorForType {
        op: OperatorTag,
        lhs: OperandDescriptor,
        rhs: OperandDescriptor,
        reason: &'static str,
    },
    Kernel(KernelError),
    Array(ArrayError),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShapeMismatch { op, lhs, rhs } => write!(
                f,
                "operator {}: nonconformant arguments (op1 is {lhs}, op2 is {rhs})",
                op.symbol()
            ),
            Self::UnsupportedOperatorForType {
                op,
                lhs,
                rhs,
                reason,
            } => write!(
                f,
                "operator {} unsupported for {} {} by {} {}: {reason}",
                op.symbol(),
                lhs.density.name(),
                lhs.kind,
                rhs.density.name(),
                rhs.kind
            ),
            Self::Kernel(error) => write!(f, "kernel dispatch failure: {error}"),
            Self::Array(error) => write!(f, "operand conversion failure: {error}"),
        }
    }
}

impl std::error::Error for DispatchError {}

impl From<KernelError> for DispatchError {
    fn from(value: KernelError) -> Self {
        Self::Kernel(value)
    }
}

impl From<ArrayError> for DispatchError {
    fn from(value: ArrayError) -> Self {
        Self::Array(value)
    }
}

/// Resolves and runs `lhs op rhs` out of place.
pub fn dispatch_binary(
    registry: &KernelRegistry,
    mode: ExecutionMode,
    op: OperatorTag,
    lhs: &TypedArray,
    rhs: &TypedArray,
) -> Result<DispatchOutcome, DispatchError> {
    dispatch_operands(
        registry,
        mode,
        op,
        Operand::Borrowed(lhs),
        Operand::Borrowed(rhs),
        false,
    )
}

/// Resolves and runs `lhs op rhs`, writing into an owned operand when allowed.
///
/// Reuse needs an exact kernel match with an in-place variant and an owned
/// operand whose layout equals the planned result; otherwise this behaves like
/// [`dispatch_binary`].
pub fn dispatch_operands(
    registry: &KernelRegistry,
    mode: ExecutionMode,
    op: OperatorTag,
    lhs: Operand<'_>,
    rhs: Operand<'_>,
    allow_in_place: bool,
) -> Result<DispatchOutcome, DispatchError> {
    let resolved = resolve(
        registry,
        op,
        &OperandDescriptor::of(lhs.array()),
        &OperandDescriptor::of(rhs.array()),
    )?;
    let ctx = KernelContext::new(resolved.effective_op(), mode, resolved.plan.clone());
    let decision = |in_place: Option<Side>| DispatchDecision {
        op,
        effective_op: resolved.effective_op(),
        mode,
        policy: registry.policy(),
        kernel: resolved.entry.name,
        key: resolved.key,
        path: resolved.path,
        plan: resolved.plan.clone(),
        in_place,
    };

    let in_place = resolved
        .entry
        .in_place
        .filter(|_| allow_in_place && resolved.path == ResolutionPath::Exact);
    let (lhs, rhs) = match (in_place, lhs, rhs) {
        (Some(kernel), Operand::Owned(mut target), other)
            if ResultBuilder::can_reuse(&ctx.plan, &target) =>
        {
            kernel(&mut target, other.array(), Side::Lhs, &ctx)?;
            debug!(op = %op, storage_id = target.storage_id(), "lhs buffer reused");
            return Ok(DispatchOutcome {
                array: target,
                decision: decision(Some(Side::Lhs)),
            });
        }
        (Some(kernel), other, Operand::Owned(mut target))
            if ResultBuilder::can_reuse(&ctx.plan, &target) =>
        {
            kernel(&mut target, other.array(), Side::Rhs, &ctx)?;
            debug!(op = %op, storage_id = target.storage_id(), "rhs buffer reused");
            return Ok(DispatchOutcome {
                array: target,
                decision: decision(Some(Side::Rhs)),
            });
        }
        (_, lhs, rhs) => (lhs, rhs),
    };

    let left = converted(lhs.array(), resolved.conversion(Side::Lhs))?;
    let right = converted(rhs.array(), resolved.conversion(Side::Rhs))?;
    let array = (resolved.entry.kernel)(&left, &right, &ctx)?;
    Ok(DispatchOutcome {
        array,
        decision: decision(None),
    })
}

fn converted(array: &TypedArray, target: Option<ElementKind>) -> Result<Cow<'_, TypedArray>, ArrayError> {
    match target {
        Some(kind) => Ok(Cow::Owned(array.converted(kind)?)),
        None => Ok(Cow::Borrowed(array)),
    }
}

#[cfg(test)]
mod tests {
    use fo_core::{
        Complex64, Density, ElementKind, ExecutionMode, OperatorTag, Scalar, Shape, SparseMatrix,
        TypedArray,
    };
    use fo_kernel_cpu::{KernelError, Side};
    use fo_promote::{PromotionPolicy, saturating_cast};
    use proptest::prelude::*;

    use super::{
        DispatchError, Operand, OperandDescriptor, ResolutionPath, dispatch_binary,
        dispatch_operands, shared_registry,
    };

    fn run(
        mode: ExecutionMode,
        op: OperatorTag,
        lhs: &TypedArray,
        rhs: &TypedArray,
    ) -> Result<super::DispatchOutcome, DispatchError> {
        dispatch_binary(shared_registry(PromotionPolicy::Lattice), mode, op, lhs, rhs)
    }

    fn sparse_f64(rows: usize, cols: usize, values: Vec<f64>) -> TypedArray {
        let matrix = SparseMatrix::from_dense(rows, cols, &fo_core::ArrayData::Float64(values))
            .expect("compress");
        TypedArray::sparse(matrix)
    }

    #[test]
    fn complex_plus_real_stays_complex() {
        let lhs = TypedArray::from_scalar(Complex64::new(1.0, 0.0));
        let rhs = TypedArray::from_scalar(2.0_f64);
        let outcome = run(ExecutionMode::Strict, OperatorTag::Add, &lhs, &rhs).expect("c + r");
        assert_eq!(
            outcome.array.to_scalars(),
            vec![Scalar::Complex64(Complex64::new(3.0, 0.0))]
        );
        assert_eq!(outcome.decision.path, ResolutionPath::Exact);
        assert_eq!(outcome.decision.kernel, "dense_elementwise");
    }

    #[test]
    fn broadcast_column_with_row() {
        let lhs = TypedArray::from_vec([3, 1], vec![1.0_f64, 2.0, 3.0]).expect("column");
        let rhs = TypedArray::row(vec![10.0_f64, 20.0, 30.0, 40.0]);
        let outcome = run(ExecutionMode::Strict, OperatorTag::Add, &lhs, &rhs).expect("3x1 + 1x4");
        assert_eq!(outcome.array.shape(), &Shape::from([3, 4]));
        assert_eq!(outcome.array.get(4), Some(Scalar::Float64(22.0)));
    }

    #[test]
    fn nonconformant_operands_report_shape_mismatch() {
        let lhs = TypedArray::zeros(ElementKind::Float64, Density::Dense, [3, 2]).expect("3x2");
        let rhs = TypedArray::zeros(ElementKind::Float64, Density::Dense, [4, 2]).expect("4x2");
        let err = run(ExecutionMode::Strict, OperatorTag::Add, &lhs, &rhs).expect_err("3x2 + 4x2");
        assert_eq!(
            err.to_string(),
            "operator +: nonconformant arguments (op1 is 3x2, op2 is 4x2)"
        );
    }

    #[test]
    fn int16_compared_with_double() {
        let lhs = TypedArray::row(vec![1_i16, 2, 3]);
        let rhs = TypedArray::from_scalar(2.0_f64);
        let outcome = run(ExecutionMode::Strict, OperatorTag::Lt, &lhs, &rhs).expect("int16 < 2.0");
        assert_eq!(outcome.array.dense_values::<bool>(), Some(&[true, false, false][..]));
    }

    #[test]
    fn integer_saturation_and_division() {
        let hundred = TypedArray::from_scalar(100_i8);
        let sum = run(ExecutionMode::Strict, OperatorTag::Add, &hundred, &hundred).expect("int8 add");
        assert_eq!(sum.array.to_scalars(), vec![Scalar::Int8(127)]);

        let seven = TypedArray::from_scalar(7_i32);
        let two = TypedArray::from_scalar(2_i32);
        let quotient = run(ExecutionMode::Strict, OperatorTag::DivElementwise, &seven, &two)
            .expect("int32 division");
        assert_eq!(quotient.array.to_scalars(), vec![Scalar::Int32(4)]);
    }

    #[test]
    fn integer_division_by_zero_depends_on_mode() {
        let five = TypedArray::from_scalar(5_i32);
        let zero = TypedArray::from_scalar(0_i32);
        let strict = run(ExecutionMode::Strict, OperatorTag::DivElementwise, &five, &zero)
            .expect("strict saturates");
        assert_eq!(strict.array.to_scalars(), vec![Scalar::Int32(i32::MAX)]);
        let err = run(ExecutionMode::Hardened, OperatorTag::DivElementwise, &five, &zero)
            .expect_err("hardened rejects");
        assert_eq!(err, DispatchError::Kernel(KernelError::DivisionByZero { index: 0 }));
    }

    #[test]
    fn sparse_plus_sparse_stays_sparse() {
        let lhs = sparse_f64(2, 2, vec![1.0, 0.0, 0.0, 2.0]);
        let rhs = sparse_f64(2, 2, vec![0.0, 3.0, 0.0, -2.0]);
        let outcome = run(ExecutionMode::Strict, OperatorTag::Add, &lhs, &rhs).expect("S + S");
        assert_eq!(outcome.array.density(), Density::Sparse);
        assert_eq!(
            outcome.array.sparse_matrix().map(SparseMatrix::nnz),
            Some(2)
        );

        let dense = TypedArray::from_vec([2, 2], vec![1.0_f64; 4]).expect("dense");
        let mixed = run(ExecutionMode::Strict, OperatorTag::Add, &lhs, &dense).expect("S + D");
        assert_eq!(mixed.array.density(), Density::Dense);
    }

    #[test]
    fn sparse_bool_operands_convert_to_sparse_double() {
        let flags = SparseMatrix::from_dense(2, 1, &fo_core::ArrayData::Bool(vec![true, false]))
            .expect("compress");
        let lhs = TypedArray::sparse(flags);
        let rhs = sparse_f64(1, 2, vec![2.0, 0.0]);
        let outcome = run(ExecutionMode::Strict, OperatorTag::Product, &lhs, &rhs)
            .expect("sparse bool * sparse double");
        assert_eq!(
            outcome.decision.path,
            ResolutionPath::ConvertedOperand {
                side: Side::Lhs,
                from: ElementKind::Bool,
                to: ElementKind::Float64
            }
        );
        assert_eq!(outcome.array.density(), Density::Sparse);
        assert_eq!(outcome.array.get(0), Some(Scalar::Float64(2.0)));
    }

    #[test]
    fn owned_operand_is_reused_in_place() {
        let registry = shared_registry(PromotionPolicy::Lattice);
        let lhs = TypedArray::row(vec![1_i32, 2, 3]);
        let storage_id = lhs.storage_id();
        let rhs = TypedArray::from_scalar(10_i32);
        let outcome = dispatch_operands(
            registry,
            ExecutionMode::Strict,
            OperatorTag::Add,
            Operand::Owned(lhs),
            Operand::Borrowed(&rhs),
            true,
        )
        .expect("in-place add");
        assert_eq!(outcome.decision.in_place, Some(Side::Lhs));
        assert_eq!(outcome.array.storage_id(), storage_id);
        assert_eq!(outcome.array.dense_values::<i32>(), Some(&[11, 12, 13][..]));
    }

    #[test]
    fn owned_rhs_is_reused_when_lhs_broadcasts() {
        let registry = shared_registry(PromotionPolicy::Lattice);
        let lhs = TypedArray::from_scalar(10.0_f64);
        let rhs = TypedArray::row(vec![1.0_f64, 2.0]);
        let storage_id = rhs.storage_id();
        let outcome = dispatch_operands(
            registry,
            ExecutionMode::Strict,
            OperatorTag::Sub,
            Operand::Borrowed(&lhs),
            Operand::Owned(rhs),
            true,
        )
        .expect("in-place sub");
        assert_eq!(outcome.decision.in_place, Some(Side::Rhs));
        assert_eq!(outcome.array.storage_id(), storage_id);
        assert_eq!(outcome.array.dense_values::<f64>(), Some(&[9.0, 8.0][..]));
    }

    #[test]
    fn reuse_is_skipped_without_permission_or_for_conversions() {
        let registry = shared_registry(PromotionPolicy::Lattice);
        let lhs = TypedArray::row(vec![1.0_f64, 2.0]);
        let storage_id = lhs.storage_id();
        let outcome = dispatch_operands(
            registry,
            ExecutionMode::Strict,
            OperatorTag::Add,
            Operand::Owned(lhs),
            Operand::Owned(TypedArray::row(vec![1.0_f64, 1.0])),
            false,
        )
        .expect("out of place");
        assert_eq!(outcome.decision.in_place, None);
        assert_ne!(outcome.array.storage_id(), storage_id);

        let converted = dispatch_operands(
            registry,
            ExecutionMode::Strict,
            OperatorTag::Add,
            Operand::Owned(TypedArray::row(vec![1_i8, 2])),
            Operand::Owned(TypedArray::row(vec![1_i16, 2])),
            true,
        )
        .expect("int8 + int16");
        assert_eq!(converted.decision.in_place, None);
        assert_eq!(converted.array.kind(), ElementKind::Int16);
    }

    #[test]
    fn unsupported_error_names_both_operands() {
        let lhs = TypedArray::row(vec![1_u8]);
        let rhs = TypedArray::row(vec![1_i64]);
        let err = dispatch_binary(
            shared_registry(PromotionPolicy::IntegerDominant),
            ExecutionMode::Strict,
            OperatorTag::Add,
            &lhs,
            &rhs,
        )
        .expect_err("uint8 + int64 under integer dominance");
        assert!(matches!(
            err,
            DispatchError::UnsupportedOperatorForType {
                op: OperatorTag::Add,
                lhs: OperandDescriptor { kind: ElementKind::UInt8, .. },
                rhs: OperandDescriptor { kind: ElementKind::Int64, .. },
                ..
            }
        ));
    }

    proptest! {
        #[test]
        fn prop_commutative_ops_ignore_operand_order(
            left in prop::collection::vec(-200i32..200, 4),
            right in prop::collection::vec(-3.0f64..3.0, 4),
            op_index in 0usize..4,
        ) {
            let op = [OperatorTag::Add, OperatorTag::MulElementwise, OperatorTag::Eq, OperatorTag::And][op_index];
            let lhs = TypedArray::from_vec([2, 2], left.iter().map(|v| *v as i16).collect::<Vec<_>>())
                .expect("int16 operand");
            let rhs = TypedArray::from_vec([2, 2], right.clone()).expect("float64 operand");
            let forward = run(ExecutionMode::Strict, op, &lhs, &rhs).expect("forward");
            let backward = run(ExecutionMode::Strict, op, &rhs, &lhs).expect("backward");
            prop_assert!(forward.array.same_values(&backward.array));
            prop_assert_eq!(forward.decision.mode, ExecutionMode::Strict);
            prop_assert_eq!(forward.decision.effective_op, op);
            prop_assert_eq!(&forward.decision.plan, &backward.decision.plan);
            prop_assert_eq!(forward.decision.kernel, backward.decision.kernel);
        }

        #[test]
        fn prop_int8_cast_then_widen_matches_clamp(value in -100_000i64..100_000) {
            let narrowed = saturating_cast(Scalar::Int64(value), ElementKind::Int8);
            let widened = saturating_cast(narrowed, ElementKind::Int32);
            let expected = i32::try_from(value.clamp(-128, 127)).expect("clamped fits");
            prop_assert_eq!(widened, Scalar::Int32(expected));
        }

        #[test]
        fn prop_hardened_matches_strict_without_zero_divisors(
            left in prop::collection::vec(-1000i32..1000, 3),
            right in prop::collection::vec(1i32..50, 3),
        ) {
            let lhs = TypedArray::row(left);
            let rhs = TypedArray::row(right);
            let strict = run(ExecutionMode::Strict, OperatorTag::DivElementwise, &lhs, &rhs)
                .expect("strict");
            let hardened = run(ExecutionMode::Hardened, OperatorTag::DivElementwise, &lhs, &rhs)
                .expect("hardened");
            prop_assert!(strict.array.same_values(&hardened.array));
            prop_assert_eq!(strict.decision.key, hardened.decision.key);
            prop_assert_eq!(strict.decision.path, hardened.decision.path);
            prop_assert_eq!(strict.decision.kernel, hardened.decision.kernel);
            prop_assert_eq!(hardened.decision.mode, ExecutionMode::Hardened);
        }
    }
}
