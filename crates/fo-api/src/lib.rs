#![forbid(unsafe_code)]

mod diagnostics;

use std::fmt;
use std::sync::Arc;

use fo_core::{ExecutionMode, OperatorTag, TypedArray};
use fo_dispatch::{
    DispatchDecision, DispatchError, KernelRegistry, Operand, ResolutionPath, dispatch_operands,
    shared_registry,
};
use fo_promote::PromotionPolicy;
use fo_runtime::{EvidenceKind, RuntimeConfig, RuntimeContext};
use tracing::debug;

pub use diagnostics::{Diagnostic, ErrorClass, diagnose, type_name};

/// Shared, immutable array value.
#[derive(Debug, Clone)]
pub struct ArrayHandle(Arc<TypedArray>);

impl ArrayHandle {
    #[must_use]
    pub fn new(array: TypedArray) -> Self {
        Self(Arc::new(array))
    }

    #[must_use]
    pub fn array(&self) -> &TypedArray {
        &self.0
    }

    /// True when no other handle or weak reference shares the value.
    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        Arc::strong_count(&self.0) == 1 && Arc::weak_count(&self.0) == 0
    }

    /// The array itself when this is the only handle, otherwise the handle back.
    pub fn try_into_exclusive(self) -> Result<TypedArray, Self> {
        Arc::try_unwrap(self.0).map_err(Self)
    }

    /// The array, copied under a fresh identity if the value is shared.
    #[must_use]
    pub fn into_array(self) -> TypedArray {
        Arc::try_unwrap(self.0).unwrap_or_else(|shared| shared.duplicate())
    }
}

impl From<TypedArray> for ArrayHandle {
    fn from(value: TypedArray) -> Self {
        Self::new(value)
    }
}

impl AsRef<TypedArray> for ArrayHandle {
    fn as_ref(&self) -> &TypedArray {
        &self.0
    }
}

/// A failed operator application with its interpreter diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorError {
    op: OperatorTag,
    class: ErrorClass,
    diagnostic: Diagnostic,
    source: DispatchError,
}

impl OperatorError {
    #[must_use]
    pub fn new(op: OperatorTag, source: DispatchError) -> Self {
        let (class, diagnostic) = diagnose(op, &source);
        Self {
            op,
            class,
            diagnostic,
            source,
        }
    }

    #[must_use]
    pub fn op(&self) -> OperatorTag {
        self.op
    }

    #[must_use]
    pub fn class(&self) -> ErrorClass {
        self.class
    }

    #[must_use]
    pub fn diagnostic(&self) -> &Diagnostic {
        &self.diagnostic
    }

    #[must_use]
    pub fn identifier(&self) -> &'static str {
        self.diagnostic.identifier
    }

    #[must_use]
    pub fn dispatch_error(&self) -> &DispatchError {
        &self.source
    }

    /// Operator failures never poison the session.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        true
    }
}

impl fmt::Display for OperatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.diagnostic.message)
    }
}

impl std::error::Error for OperatorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Applies binary operators to array handles under one runtime context.
#[derive(Debug)]
pub struct OperatorSession {
    runtime: RuntimeContext,
    registry: &'static KernelRegistry,
}

impl Default for OperatorSession {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl OperatorSession {
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        let registry = shared_registry(config.promotion_policy);
        Self {
            runtime: RuntimeContext::new(config),
            registry,
        }
    }

    #[must_use]
    pub fn with_mode(mode: ExecutionMode) -> Self {
        Self::new(RuntimeConfig {
            mode,
            ..RuntimeConfig::default()
        })
    }

    /// Session over a toolbox registry; its policy overrides the config's.
    #[must_use]
    pub fn with_registry(config: RuntimeConfig, registry: &'static KernelRegistry) -> Self {
        let config = RuntimeConfig {
            promotion_policy: registry.policy(),
            ..config
        };
        Self {
            runtime: RuntimeContext::new(config),
            registry,
        }
    }

    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        self.runtime.mode()
    }

    pub fn set_mode(&mut self, mode: ExecutionMode) {
        self.runtime.set_mode(mode);
    }

    #[must_use]
    pub fn promotion_policy(&self) -> PromotionPolicy {
        self.registry.policy()
    }

    pub fn set_allow_in_place(&mut self, allow: bool) {
        self.runtime.set_allow_in_place(allow);
    }

    #[must_use]
    pub fn runtime(&self) -> &RuntimeContext {
        &self.runtime
    }

    #[must_use]
    pub fn registry(&self) -> &'static KernelRegistry {
        self.registry
    }

    pub fn binary(
        &mut self,
        op: OperatorTag,
        lhs: &ArrayHandle,
        rhs: &ArrayHandle,
    ) -> Result<ArrayHandle, OperatorError> {
        self.run(
            op,
            Operand::Borrowed(lhs.array()),
            Operand::Borrowed(rhs.array()),
            false,
        )
    }

    /// Like [`Self::binary`], but may write the result into an operand buffer
    /// when in-place reuse is enabled and that handle is the only one.
    pub fn binary_owned(
        &mut self,
        op: OperatorTag,
        lhs: ArrayHandle,
        rhs: ArrayHandle,
    ) -> Result<ArrayHandle, OperatorError> {
        let allow = self.runtime.allow_in_place();
        let claim = |handle: ArrayHandle| {
            if allow {
                handle.try_into_exclusive()
            } else {
                Err(handle)
            }
        };
        match (claim(lhs), claim(rhs)) {
            (Ok(lhs), Ok(rhs)) => self.run(op, Operand::Owned(lhs), Operand::Owned(rhs), allow),
            (Ok(lhs), Err(rhs)) => {
                self.run(op, Operand::Owned(lhs), Operand::Borrowed(rhs.array()), allow)
            }
            (Err(lhs), Ok(rhs)) => {
                self.run(op, Operand::Borrowed(lhs.array()), Operand::Owned(rhs), allow)
            }
            (Err(lhs), Err(rhs)) => self.run(
                op,
                Operand::Borrowed(lhs.array()),
                Operand::Borrowed(rhs.array()),
                allow,
            ),
        }
    }

    pub fn add(&mut self, lhs: &ArrayHandle, rhs: &ArrayHandle) -> Result<ArrayHandle, OperatorError> {
        self.binary(OperatorTag::Add, lhs, rhs)
    }

    pub fn sub(&mut self, lhs: &ArrayHandle, rhs: &ArrayHandle) -> Result<ArrayHandle, OperatorError> {
        self.binary(OperatorTag::Sub, lhs, rhs)
    }

    pub fn mul_elementwise(
        &mut self,
        lhs: &ArrayHandle,
        rhs: &ArrayHandle,
    ) -> Result<ArrayHandle, OperatorError> {
        self.binary(OperatorTag::MulElementwise, lhs, rhs)
    }

    pub fn div_elementwise(
        &mut self,
        lhs: &ArrayHandle,
        rhs: &ArrayHandle,
    ) -> Result<ArrayHandle, OperatorError> {
        self.binary(OperatorTag::DivElementwise, lhs, rhs)
    }

    pub fn product(&mut self, lhs: &ArrayHandle, rhs: &ArrayHandle) -> Result<ArrayHandle, OperatorError> {
        self.binary(OperatorTag::Product, lhs, rhs)
    }

    pub fn quotient(&mut self, lhs: &ArrayHandle, rhs: &ArrayHandle) -> Result<ArrayHandle, OperatorError> {
        self.binary(OperatorTag::Quotient, lhs, rhs)
    }

    pub fn lt(&mut self, lhs: &ArrayHandle, rhs: &ArrayHandle) -> Result<ArrayHandle, OperatorError> {
        self.binary(OperatorTag::Lt, lhs, rhs)
    }

    pub fn le(&mut self, lhs: &ArrayHandle, rhs: &ArrayHandle) -> Result<ArrayHandle, OperatorError> {
        self.binary(OperatorTag::Le, lhs, rhs)
    }

    pub fn ge(&mut self, lhs: &ArrayHandle, rhs: &ArrayHandle) -> Result<ArrayHandle, OperatorError> {
        self.binary(OperatorTag::Ge, lhs, rhs)
    }

    pub fn gt(&mut self, lhs: &ArrayHandle, rhs: &ArrayHandle) -> Result<ArrayHandle, OperatorError> {
        self.binary(OperatorTag::Gt, lhs, rhs)
    }

    pub fn eq(&mut self, lhs: &ArrayHandle, rhs: &ArrayHandle) -> Result<ArrayHandle, OperatorError> {
        self.binary(OperatorTag::Eq, lhs, rhs)
    }

    pub fn ne(&mut self, lhs: &ArrayHandle, rhs: &ArrayHandle) -> Result<ArrayHandle, OperatorError> {
        self.binary(OperatorTag::Ne, lhs, rhs)
    }

    pub fn and(&mut self, lhs: &ArrayHandle, rhs: &ArrayHandle) -> Result<ArrayHandle, OperatorError> {
        self.binary(OperatorTag::And, lhs, rhs)
    }

    pub fn or(&mut self, lhs: &ArrayHandle, rhs: &ArrayHandle) -> Result<ArrayHandle, OperatorError> {
        self.binary(OperatorTag::Or, lhs, rhs)
    }

    /// `lhs & !rhs`
    pub fn and_not(&mut self, lhs: &ArrayHandle, rhs: &ArrayHandle) -> Result<ArrayHandle, OperatorError> {
        self.binary(OperatorTag::AndNot, lhs, rhs)
    }

    /// `lhs | !rhs`
    pub fn or_not(&mut self, lhs: &ArrayHandle, rhs: &ArrayHandle) -> Result<ArrayHandle, OperatorError> {
        self.binary(OperatorTag::OrNot, lhs, rhs)
    }

    /// `!lhs & rhs`
    pub fn not_and(&mut self, lhs: &ArrayHandle, rhs: &ArrayHandle) -> Result<ArrayHandle, OperatorError> {
        self.binary(OperatorTag::NotAnd, lhs, rhs)
    }

    /// `!lhs | rhs`
    pub fn not_or(&mut self, lhs: &ArrayHandle, rhs: &ArrayHandle) -> Result<ArrayHandle, OperatorError> {
        self.binary(OperatorTag::NotOr, lhs, rhs)
    }

    fn run(
        &mut self,
        op: OperatorTag,
        lhs: Operand<'_>,
        rhs: Operand<'_>,
        allow_in_place: bool,
    ) -> Result<ArrayHandle, OperatorError> {
        match dispatch_operands(self.registry, self.mode(), op, lhs, rhs, allow_in_place) {
            Ok(outcome) => {
                self.record_decision(&outcome.decision);
                Ok(ArrayHandle::new(outcome.array))
            }
            Err(source) => {
                let error = OperatorError::new(op, source);
                debug!(
                    op = %op,
                    class = error.class().label(),
                    "operator failed"
                );
                self.runtime.record(
                    EvidenceKind::Diagnostic,
                    format!(
                        "op={op} class={} identifier={} message={}",
                        error.class().label(),
                        error.identifier(),
                        error.diagnostic().message
                    ),
                );
                Err(error)
            }
        }
    }

    fn record_decision(&mut self, decision: &DispatchDecision) {
        self.runtime.record(
            EvidenceKind::Dispatch,
            format!(
                "op={} effective={} kernel={} key={} path={} mode={} policy={} result={} {} {}",
                decision.op,
                decision.effective_op,
                decision.kernel,
                decision.key,
                decision.path.label(),
                decision.mode.label(),
                decision.policy.label(),
                decision.plan.density.name(),
                decision.plan.kind,
                decision.plan.shape
            ),
        );
        match decision.path {
            ResolutionPath::Exact => {}
            ResolutionPath::ConvertedOperand { side, from, to } => self.runtime.record(
                EvidenceKind::Promotion,
                format!("op={} converted {} {from} -> {to}", decision.op, side.label()),
            ),
            ResolutionPath::PromotedBoth { to } => self.runtime.record(
                EvidenceKind::Promotion,
                format!("op={} promoted both operands -> {to}", decision.op),
            ),
        }
        if let Some(side) = decision.in_place {
            self.runtime.record(
                EvidenceKind::InPlace,
                format!("op={} reused {} buffer", decision.op, side.label()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use fo_core::{
        ArrayData, Complex64, Density, ElementKind, ExecutionMode, OperatorTag, Scalar, Shape,
        SparseMatrix, TypedArray,
    };
    use fo_promote::PromotionPolicy;
    use fo_runtime::{EvidenceKind, RuntimeConfig};
    use proptest::prelude::*;

    use super::{ArrayHandle, ErrorClass, OperatorSession, type_name};

    fn handle<E: fo_core::Element>(shape: [usize; 2], values: Vec<E>) -> ArrayHandle {
        ArrayHandle::new(TypedArray::from_vec(shape, values).expect("valid array"))
    }

    fn scalar<E: fo_core::Element>(value: E) -> ArrayHandle {
        ArrayHandle::new(TypedArray::from_scalar(value))
    }

    fn sparse(kind_values: ArrayData, rows: usize, cols: usize) -> ArrayHandle {
        let matrix = SparseMatrix::from_dense(rows, cols, &kind_values).expect("compress");
        ArrayHandle::new(TypedArray::sparse(matrix))
    }

    fn reuse_session() -> OperatorSession {
        OperatorSession::new(RuntimeConfig {
            allow_in_place: true,
            ..RuntimeConfig::default()
        })
    }

    #[test]
    fn complex_plus_double() {
        let mut session = OperatorSession::default();
        let out = session
            .add(&scalar(Complex64::new(1.0, 0.0)), &scalar(2.0_f64))
            .expect("complex + double");
        assert_eq!(out.array().kind(), ElementKind::Complex64);
        assert_eq!(
            out.array().to_scalars(),
            vec![Scalar::Complex64(Complex64::new(3.0, 0.0))]
        );
    }

    #[test]
    fn broadcast_and_nonconformant_shapes() {
        let mut session = OperatorSession::default();
        let column = handle([3, 1], vec![1.0_f64, 2.0, 3.0]);
        let row = handle([1, 4], vec![1.0_f64; 4]);
        let out = session.add(&column, &row).expect("3x1 + 1x4");
        assert_eq!(out.array().shape(), &Shape::from([3, 4]));

        let lhs = handle([3, 2], vec![0.0_f64; 6]);
        let rhs = handle([4, 2], vec![0.0_f64; 8]);
        let err = session.add(&lhs, &rhs).expect_err("3x2 + 4x2");
        assert_eq!(err.class(), ErrorClass::ShapeMismatch);
        assert_eq!(err.identifier(), "Octave:nonconformant-args");
        assert_eq!(
            err.to_string(),
            "operator +: nonconformant arguments (op1 is 3x2, op2 is 4x2)"
        );
        assert!(err.is_recoverable());
    }

    #[test]
    fn int16_less_than_double() {
        let mut session = OperatorSession::default();
        let out = session
            .lt(&handle([1, 3], vec![1_i16, 2, 3]), &scalar(2.0_f64))
            .expect("int16 < 2.0");
        assert_eq!(
            out.array().to_scalars(),
            vec![Scalar::Bool(true), Scalar::Bool(false), Scalar::Bool(false)]
        );
    }

    #[test]
    fn integer_arithmetic_saturates_and_rounds() {
        let mut session = OperatorSession::default();
        let sum = session.add(&scalar(100_i8), &scalar(100_i8)).expect("int8 add");
        assert_eq!(sum.array().to_scalars(), vec![Scalar::Int8(127)]);
        let quotient = session
            .div_elementwise(&scalar(7_i32), &scalar(2_i32))
            .expect("int32 division");
        assert_eq!(quotient.array().to_scalars(), vec![Scalar::Int32(4)]);
    }

    #[test]
    fn integer_division_by_zero_by_mode() {
        let mut strict = OperatorSession::with_mode(ExecutionMode::Strict);
        let out = strict
            .div_elementwise(&scalar(5_i32), &scalar(0_i32))
            .expect("strict saturates");
        assert_eq!(out.array().to_scalars(), vec![Scalar::Int32(2_147_483_647)]);

        let mut hardened = OperatorSession::with_mode(ExecutionMode::Hardened);
        let err = hardened
            .div_elementwise(&scalar(5_i32), &scalar(0_i32))
            .expect_err("hardened rejects");
        assert_eq!(err.class(), ErrorClass::DivisionByZero);
        assert_eq!(err.identifier(), "Octave:divide-by-zero");
        let latest = hardened.runtime().ledger().latest().expect("diagnostic evidence");
        assert_eq!(latest.kind, EvidenceKind::Diagnostic);
    }

    #[test]
    fn nan_in_logical_operator() {
        let mut session = OperatorSession::default();
        let err = session
            .and(&scalar(f64::NAN), &scalar(true))
            .expect_err("NaN & true");
        assert_eq!(err.class(), ErrorClass::NanToLogical);
        assert_eq!(err.identifier(), "Octave:nan-to-logical-conversion");
    }

    #[test]
    fn sparse_bool_product_diagnostic() {
        let mut session = OperatorSession::default();
        let flags = sparse(ArrayData::Bool(vec![true, false, false, true]), 2, 2);
        let err = session.product(&flags, &flags).expect_err("no sparse bool product");
        assert_eq!(err.class(), ErrorClass::UnsupportedOperatorForType);
        assert_eq!(err.identifier(), "Octave:undefined-function");
        assert_eq!(
            err.to_string(),
            "binary operator '*' not implemented for 'sparse bool matrix' by 'sparse bool matrix' operations"
        );
    }

    #[test]
    fn sparse_density_rules() {
        let mut session = OperatorSession::default();
        let a = sparse(ArrayData::Float64(vec![1.0, 0.0, 0.0, 2.0]), 2, 2);
        let b = sparse(ArrayData::Float64(vec![0.0, 1.0, 0.0, 0.0]), 2, 2);
        let dense = handle([2, 2], vec![1.0_f64; 4]);
        assert_eq!(session.add(&a, &b).expect("S+S").array().density(), Density::Sparse);
        assert_eq!(session.add(&a, &dense).expect("S+D").array().density(), Density::Dense);
        assert_eq!(
            session.mul_elementwise(&a, &dense).expect("S.*D").array().density(),
            Density::Sparse
        );
        assert_eq!(session.product(&a, &b).expect("S*S").array().density(), Density::Sparse);
        assert_eq!(session.product(&a, &dense).expect("S*D").array().density(), Density::Dense);
        assert_eq!(session.quotient(&dense, &a).expect("D/S").array().density(), Density::Dense);
        assert_eq!(session.gt(&a, &dense).expect("S>D").array().kind(), ElementKind::Bool);
    }

    #[test]
    fn every_operator_method_runs_on_doubles() {
        let mut session = OperatorSession::default();
        let a = handle([2, 2], vec![1.0_f64, 0.0, 3.0, 4.0]);
        let b = handle([2, 2], vec![2.0_f64, 1.0, 0.0, 1.0]);
        type Method = fn(
            &mut OperatorSession,
            &ArrayHandle,
            &ArrayHandle,
        ) -> Result<ArrayHandle, super::OperatorError>;
        let methods: [(OperatorTag, Method); 18] = [
            (OperatorTag::Add, OperatorSession::add),
            (OperatorTag::Sub, OperatorSession::sub),
            (OperatorTag::MulElementwise, OperatorSession::mul_elementwise),
            (OperatorTag::DivElementwise, OperatorSession::div_elementwise),
            (OperatorTag::Product, OperatorSession::product),
            (OperatorTag::Quotient, OperatorSession::quotient),
            (OperatorTag::Lt, OperatorSession::lt),
            (OperatorTag::Le, OperatorSession::le),
            (OperatorTag::Ge, OperatorSession::ge),
            (OperatorTag::Gt, OperatorSession::gt),
            (OperatorTag::Eq, OperatorSession::eq),
            (OperatorTag::Ne, OperatorSession::ne),
            (OperatorTag::And, OperatorSession::and),
            (OperatorTag::Or, OperatorSession::or),
            (OperatorTag::AndNot, OperatorSession::and_not),
            (OperatorTag::OrNot, OperatorSession::or_not),
            (OperatorTag::NotAnd, OperatorSession::not_and),
            (OperatorTag::NotOr, OperatorSession::not_or),
        ];
        for (op, method) in methods {
            let via_method = method(&mut session, &a, &b).expect("method");
            let via_binary = session.binary(op, &a, &b).expect("binary");
            assert!(via_method.array().same_values(via_binary.array()), "{op}");
        }
        let not_and = session.not_and(&a, &b).expect("!a & b");
        assert_eq!(
            not_and.array().to_scalars(),
            vec![
                Scalar::Bool(false),
                Scalar::Bool(true),
                Scalar::Bool(false),
                Scalar::Bool(false)
            ]
        );
    }

    #[test]
    fn exclusive_handle_is_reused() {
        let mut session = reuse_session();
        let lhs = handle([1, 3], vec![1_i32, 2, 3]);
        let storage_id = lhs.array().storage_id();
        let out = session
            .binary_owned(OperatorTag::Add, lhs, scalar(1_i32))
            .expect("owned add");
        assert_eq!(out.array().storage_id(), storage_id);
        assert_eq!(out.array().dense_values::<i32>(), Some(&[2, 3, 4][..]));
        assert!(
            session
                .runtime()
                .ledger()
                .entries()
                .any(|entry| entry.kind == EvidenceKind::InPlace)
        );
    }

    #[test]
    fn shared_handle_is_not_reused() {
        let mut session = reuse_session();
        let lhs = handle([1, 3], vec![1_i32, 2, 3]);
        let keep = lhs.clone();
        assert!(!lhs.is_exclusive());
        let out = session
            .binary_owned(OperatorTag::Add, lhs, scalar(1_i32))
            .expect("shared add");
        assert_ne!(out.array().storage_id(), keep.array().storage_id());
        assert_eq!(keep.array().dense_values::<i32>(), Some(&[1, 2, 3][..]));
    }

    #[test]
    fn reuse_requires_config_opt_in() {
        let mut session = OperatorSession::default();
        let lhs = handle([1, 2], vec![1.0_f64, 2.0]);
        let storage_id = lhs.array().storage_id();
        let out = session
            .binary_owned(OperatorTag::Sub, lhs, scalar(1.0_f64))
            .expect("owned sub");
        assert_ne!(out.array().storage_id(), storage_id);
    }

    #[test]
    fn conversions_are_recorded_as_promotion_evidence() {
        let mut session = OperatorSession::default();
        session
            .add(&scalar(1_i8), &scalar(1_u8))
            .expect("int8 + uint8");
        let kinds: Vec<EvidenceKind> = session
            .runtime()
            .ledger()
            .entries()
            .map(|entry| entry.kind)
            .collect();
        assert!(kinds.contains(&EvidenceKind::Dispatch));
        assert!(kinds.contains(&EvidenceKind::Promotion));
    }

    #[test]
    fn integer_dominant_session_keeps_integer_kind() {
        let mut session = OperatorSession::new(RuntimeConfig {
            promotion_policy: PromotionPolicy::IntegerDominant,
            ..RuntimeConfig::default()
        });
        assert_eq!(session.promotion_policy(), PromotionPolicy::IntegerDominant);
        let out = session
            .add(&handle([1, 2], vec![1_i16, 2]), &scalar(0.6_f64))
            .expect("int16 + double");
        assert_eq!(out.array().to_scalars(), vec![Scalar::Int16(2), Scalar::Int16(3)]);
        let err = session
            .add(&scalar(1_i8), &scalar(1_i16))
            .expect_err("mixed integers");
        assert_eq!(
            err.to_string(),
            "binary operator '+' not implemented for 'int8 scalar' by 'int16 scalar' operations"
        );
    }

    #[test]
    fn integer_dominant_int64_with_double_is_exact() {
        let mut session = OperatorSession::new(RuntimeConfig {
            promotion_policy: PromotionPolicy::IntegerDominant,
            ..RuntimeConfig::default()
        });
        let past_mantissa = scalar(9_007_199_254_740_993_i64);
        let same = session.add(&past_mantissa, &scalar(0.0_f64)).expect("int64 + 0.0");
        assert_eq!(same.array().to_scalars(), vec![Scalar::Int64(9_007_199_254_740_993)]);

        let below_max = session
            .add(&scalar(i64::MAX), &scalar(-1.0_f64))
            .expect("intmax + -1.0");
        assert_eq!(below_max.array().to_scalars(), vec![Scalar::Int64(i64::MAX - 1)]);

        let unsigned = session
            .sub(&scalar(u64::MAX), &scalar(1.0_f64))
            .expect("uintmax - 1.0");
        assert_eq!(unsigned.array().to_scalars(), vec![Scalar::UInt64(u64::MAX - 1)]);

        let equal = session
            .eq(&past_mantissa, &scalar(9_007_199_254_740_992.0_f64))
            .expect("int64 == double");
        assert_eq!(equal.array().to_scalars(), vec![Scalar::Bool(false)]);
    }

    #[test]
    fn interpreter_type_names() {
        assert_eq!(type_name(ElementKind::Float64, Density::Dense, true), "double");
        assert_eq!(type_name(ElementKind::Float64, Density::Dense, false), "matrix");
        assert_eq!(type_name(ElementKind::Complex32, Density::Dense, false), "float complex matrix");
        assert_eq!(type_name(ElementKind::UInt16, Density::Dense, true), "uint16 scalar");
        assert_eq!(type_name(ElementKind::Bool, Density::Dense, false), "bool matrix");
        assert_eq!(type_name(ElementKind::Complex64, Density::Sparse, true), "sparse complex matrix");
    }

    proptest! {
        #[test]
        fn prop_commutative_session_ops(
            left in prop::collection::vec(-50i8..50, 4),
            right in prop::collection::vec(-50i8..50, 4),
            op_index in 0usize..4,
        ) {
            let op = [OperatorTag::Add, OperatorTag::MulElementwise, OperatorTag::Eq, OperatorTag::And][op_index];
            let mut session = OperatorSession::default();
            let lhs = handle([2, 2], left);
            let rhs = handle([2, 2], right.into_iter().map(i32::from).collect::<Vec<_>>());
            let forward = session.binary(op, &lhs, &rhs).expect("forward");
            let backward = session.binary(op, &rhs, &lhs).expect("backward");
            prop_assert!(forward.array().same_values(backward.array()));
        }
    }
}
