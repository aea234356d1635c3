#![forbid(unsafe_code)]

mod array;
mod element;
mod sparse;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use array::{Storage, TypedArray};
pub use element::{ArrayData, Element, MixedValue, Numeric, Scalar};
pub use num_complex::{Complex32, Complex64};
pub use sparse::SparseMatrix;

/// Element kind of every value stored in a [`TypedArray`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Complex32,
    Complex64,
}

const ALL_KINDS: [ElementKind; 13] = [
    ElementKind::Bool,
    ElementKind::Int8,
    ElementKind::Int16,
    ElementKind::Int32,
    ElementKind::Int64,
    ElementKind::UInt8,
    ElementKind::UInt16,
    ElementKind::UInt32,
    ElementKind::UInt64,
    ElementKind::Float32,
    ElementKind::Float64,
    ElementKind::Complex32,
    ElementKind::Complex64,
];

impl ElementKind {
    pub const COUNT: usize = ALL_KINDS.len();

    #[must_use]
    pub const fn all() -> &'static [ElementKind] {
        &ALL_KINDS
    }

    /// Dense position of the kind, used to index promotion tables.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Complex32 => "complex32",
            Self::Complex64 => "complex64",
        }
    }

    #[must_use]
    pub fn from_name(raw: &str) -> Option<Self> {
        ALL_KINDS.iter().copied().find(|kind| kind.name() == raw)
    }

    /// Interpreter-visible class name (`class(x)`).
    #[must_use]
    pub const fn class_name(self) -> &'static str {
        match self {
            Self::Bool => "logical",
            Self::Float32 | Self::Complex32 => "single",
            Self::Float64 | Self::Complex64 => "double",
            other => other.name(),
        }
    }

    #[must_use]
    pub const fn is_bool(self) -> bool {
        matches!(self, Self::Bool)
    }

    #[must_use]
    pub const fn is_signed_integer(self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    #[must_use]
    pub const fn is_unsigned_integer(self) -> bool {
        matches!(
            self,
            Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64
        )
    }

    #[must_use]
    pub const fn is_integer(self) -> bool {
        self.is_signed_integer() || self.is_unsigned_integer()
    }

    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    #[must_use]
    pub const fn is_complex(self) -> bool {
        matches!(self, Self::Complex32 | Self::Complex64)
    }

    /// Integer bit width; `None` for bool, float and complex kinds.
    #[must_use]
    pub const fn integer_width(self) -> Option<u32> {
        match self {
            Self::Int8 | Self::UInt8 => Some(8),
            Self::Int16 | Self::UInt16 => Some(16),
            Self::Int32 | Self::UInt32 => Some(32),
            Self::Int64 | Self::UInt64 => Some(64),
            _ => None,
        }
    }

    #[must_use]
    pub const fn signed_integer_of_width(width: u32) -> Option<Self> {
        match width {
            8 => Some(Self::Int8),
            16 => Some(Self::Int16),
            32 => Some(Self::Int32),
            64 => Some(Self::Int64),
            _ => None,
        }
    }

    /// Inclusive value range of an integer kind.
    #[must_use]
    pub const fn integer_bounds(self) -> Option<(i128, i128)> {
        match self {
            Self::Int8 => Some((i8::MIN as i128, i8::MAX as i128)),
            Self::Int16 => Some((i16::MIN as i128, i16::MAX as i128)),
            Self::Int32 => Some((i32::MIN as i128, i32::MAX as i128)),
            Self::Int64 => Some((i64::MIN as i128, i64::MAX as i128)),
            Self::UInt8 => Some((0, u8::MAX as i128)),
            Self::UInt16 => Some((0, u16::MAX as i128)),
            Self::UInt32 => Some((0, u32::MAX as i128)),
            Self::UInt64 => Some((0, u64::MAX as i128)),
            _ => None,
        }
    }

    /// Compressed-column storage only exists for logical, double and complex double.
    #[must_use]
    pub const fn supports_sparse(self) -> bool {
        matches!(self, Self::Bool | Self::Float64 | Self::Complex64)
    }

    #[must_use]
    pub const fn natural_domain(self) -> Domain {
        match self {
            Self::Float32 => Domain::Float32,
            Self::Float64 => Domain::Float64,
            Self::Complex32 => Domain::Complex32,
            Self::Complex64 => Domain::Complex64,
            _ => Domain::Integer,
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Arithmetic domain a kernel computes in before storing into the result kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    /// Widened `i128`, wide enough for every bool/integer kind.
    Integer,
    /// Integer kind dominating a float: exact `i128` while values stay integral.
    Mixed,
    Float32,
    Float64,
    Complex32,
    Complex64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Density {
    Dense,
    Sparse,
}

impl Density {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Dense => "dense",
            Self::Sparse => "sparse",
        }
    }

    #[must_use]
    pub fn from_name(raw: &str) -> Option<Self> {
        match raw {
            "dense" => Some(Self::Dense),
            "sparse" => Some(Self::Sparse),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Reference-interpreter behavior, including sentinel results.
    #[default]
    Strict,
    /// Fails closed where the reference interpreter returns sentinels.
    Hardened,
}

impl ExecutionMode {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Hardened => "hardened",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorClass {
    Arithmetic,
    Relational,
    Logical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorTag {
    Add,
    Sub,
    MulElementwise,
    DivElementwise,
    /// Matrix product `a * b`.
    Product,
    /// Matrix right division `a / b`.
    Quotient,
    Lt,
    Le,
    Ge,
    Gt,
    Eq,
    Ne,
    And,
    Or,
    AndNot,
    OrNot,
    NotAnd,
    NotOr,
}

const ALL_OPERATORS: [OperatorTag; 18] = [
    OperatorTag::Add,
    OperatorTag::Sub,
    OperatorTag::MulElementwise,
    OperatorTag::DivElementwise,
    OperatorTag::Product,
    OperatorTag::Quotient,
    OperatorTag::Lt,
    OperatorTag::Le,
    OperatorTag::Ge,
    OperatorTag::Gt,
    OperatorTag::Eq,
    OperatorTag::Ne,
    OperatorTag::And,
    OperatorTag::Or,
    OperatorTag::AndNot,
    OperatorTag::OrNot,
    OperatorTag::NotAnd,
    OperatorTag::NotOr,
];

impl OperatorTag {
    #[must_use]
    pub const fn all() -> &'static [OperatorTag] {
        &ALL_OPERATORS
    }

    #[must_use]
    pub const fn class(self) -> OperatorClass {
        match self {
            Self::Add
            | Self::Sub
            | Self::MulElementwise
            | Self::DivElementwise
            | Self::Product
            | Self::Quotient => OperatorClass::Arithmetic,
            Self::Lt | Self::Le | Self::Ge | Self::Gt | Self::Eq | Self::Ne => {
                OperatorClass::Relational
            }
            Self::And | Self::Or | Self::AndNot | Self::OrNot | Self::NotAnd | Self::NotOr => {
                OperatorClass::Logical
            }
        }
    }

    /// True for the two matrix-sense operators.
    #[must_use]
    pub const fn is_matrix_op(self) -> bool {
        matches!(self, Self::Product | Self::Quotient)
    }

    #[must_use]
    pub const fn is_elementwise(self) -> bool {
        !self.is_matrix_op()
    }

    #[must_use]
    pub const fn is_commutative(self) -> bool {
        matches!(
            self,
            Self::Add | Self::MulElementwise | Self::Eq | Self::Ne | Self::And | Self::Or
        )
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::MulElementwise => "mul_elementwise",
            Self::DivElementwise => "div_elementwise",
            Self::Product => "product",
            Self::Quotient => "quotient",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Ge => "ge",
            Self::Gt => "gt",
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::And => "and",
            Self::Or => "or",
            Self::AndNot => "and_not",
            Self::OrNot => "or_not",
            Self::NotAnd => "not_and",
            Self::NotOr => "not_or",
        }
    }

    #[must_use]
    pub fn from_name(raw: &str) -> Option<Self> {
        ALL_OPERATORS.iter().copied().find(|op| op.name() == raw)
    }

    /// Source-level spelling used in diagnostics.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::MulElementwise => ".*",
            Self::DivElementwise => "./",
            Self::Product => "*",
            Self::Quotient => "/",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Gt => ">",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::And => "&",
            Self::Or => "|",
            Self::AndNot => "and_not",
            Self::OrNot => "or_not",
            Self::NotAnd => "not_and",
            Self::NotOr => "not_or",
        }
    }
}

impl fmt::Display for OperatorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Dimension sizes of an array. Scalars are `1x1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    #[must_use]
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    #[must_use]
    pub fn scalar() -> Self {
        Self { dims: vec![1, 1] }
    }

    #[must_use]
    pub fn matrix(rows: usize, cols: usize) -> Self {
        Self {
            dims: vec![rows, cols],
        }
    }

    #[must_use]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    #[must_use]
    pub fn numel(&self) -> usize {
        self.dims.iter().copied().product()
    }

    #[must_use]
    pub fn is_scalar(&self) -> bool {
        self.numel() == 1
    }

    /// Rows/columns of a rank-2 shape.
    #[must_use]
    pub fn matrix_dims(&self) -> Option<(usize, usize)> {
        match self.dims.as_slice() {
            [rows, cols] => Some((*rows, *cols)),
            _ => None,
        }
    }

    /// Size of dimension `axis`, with implicit trailing singletons.
    #[must_use]
    pub fn dim(&self, axis: usize) -> usize {
        self.dims.get(axis).copied().unwrap_or(1)
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self::new(dims.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Self::new(dims.to_vec())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dims.is_empty() {
            return f.write_str("1x1");
        }
        for (axis, size) in self.dims.iter().enumerate() {
            if axis > 0 {
                f.write_str("x")?;
            }
            write!(f, "{size}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayError {
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        actual: usize,
    },
    SparseRankMismatch {
        rank: usize,
    },
    UnsupportedSparseKind {
        kind: ElementKind,
    },
    InvalidSparseStructure {
        reason: &'static str,
    },
    NonConformant {
        lhs: Shape,
        rhs: Shape,
    },
}

impl fmt::Display for ArrayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ElementCountMismatch {
                shape,
                expected,
                actual,
            } => write!(
                f,
                "element count mismatch for shape {shape}: expected={expected}, actual={actual}"
            ),
            Self::SparseRankMismatch { rank } => {
                write!(f, "sparse arrays must be rank 2, got rank {rank}")
            }
            Self::UnsupportedSparseKind { kind } => {
                write!(f, "sparse storage is not available for {kind}")
            }
            Self::InvalidSparseStructure { reason } => {
                write!(f, "invalid sparse structure: {reason}")
            }
            Self::NonConformant { lhs, rhs } => {
                write!(f, "nonconformant shapes: lhs={lhs}, rhs={rhs}")
            }
        }
    }
}

impl std::error::Error for ArrayError {}

/// Column-major strides for `shape`; the first dimension varies fastest.
#[must_use]
pub fn column_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = Vec::with_capacity(shape.len());
    let mut running = 1usize;
    for size in shape {
        strides.push(running);
        running = running.saturating_mul(*size);
    }
    strides
}

/// Elementwise broadcast: dims must match or one of them must be 1.
pub fn broadcast_shape(lhs: &Shape, rhs: &Shape) -> Result<Shape, ArrayError> {
    if lhs == rhs {
        return Ok(lhs.clone());
    }
    match (lhs.is_scalar(), rhs.is_scalar()) {
        (true, false) => return Ok(rhs.clone()),
        (false, true) => return Ok(lhs.clone()),
        _ => {}
    }

    let rank = lhs.rank().max(rhs.rank());
    let mut dims = Vec::with_capacity(rank);
    for axis in 0..rank {
        let (left, right) = (lhs.dim(axis), rhs.dim(axis));
        let size = if left == right {
            left
        } else if left == 1 {
            right
        } else if right == 1 {
            left
        } else {
            return Err(ArrayError::NonConformant {
                lhs: lhs.clone(),
                rhs: rhs.clone(),
            });
        };
        dims.push(size);
    }
    Ok(Shape::new(dims))
}

/// Runs `$body` with `$ty` bound to the Rust element type of `$kind`.
#[macro_export]
macro_rules! match_element_kind {
    ($kind:expr, $ty:ident => $body:expr) => {
        match $kind {
            $crate::ElementKind::Bool => {
                type $ty = bool;
                $body
            }
            $crate::ElementKind::Int8 => {
                type $ty = i8;
                $body
            }
            $crate::ElementKind::Int16 => {
                type $ty = i16;
                $body
            }
            $crate::ElementKind::Int32 => {
                type $ty = i32;
                $body
            }
            $crate::ElementKind::Int64 => {
                type $ty = i64;
                $body
            }
            $crate::ElementKind::UInt8 => {
                type $ty = u8;
                $body
            }
            $crate::ElementKind::UInt16 => {
                type $ty = u16;
                $body
            }
            $crate::ElementKind::UInt32 => {
                type $ty = u32;
                $body
            }
            $crate::ElementKind::UInt64 => {
                type $ty = u64;
                $body
            }
            $crate::ElementKind::Float32 => {
                type $ty = f32;
                $body
            }
            $crate::ElementKind::Float64 => {
                type $ty = f64;
                $body
            }
            $crate::ElementKind::Complex32 => {
                type $ty = $crate::Complex32;
                $body
            }
            $crate::ElementKind::Complex64 => {
                type $ty = $crate::Complex64;
                $body
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{
        ArrayError, Density, ElementKind, OperatorClass, OperatorTag, Shape, broadcast_shape,
        column_major_strides,
    };

    #[test]
    fn kind_names_roundtrip() {
        for kind in ElementKind::all() {
            assert_eq!(ElementKind::from_name(kind.name()), Some(*kind));
        }
        assert_eq!(ElementKind::from_name("quaternion"), None);
    }

    #[test]
    fn kind_indices_are_dense() {
        for (position, kind) in ElementKind::all().iter().enumerate() {
            assert_eq!(kind.index(), position);
        }
        assert_eq!(ElementKind::COUNT, 13);
    }

    #[test]
    fn class_names_follow_interpreter() {
        assert_eq!(ElementKind::Bool.class_name(), "logical");
        assert_eq!(ElementKind::Complex32.class_name(), "single");
        assert_eq!(ElementKind::Float64.class_name(), "double");
        assert_eq!(ElementKind::UInt16.class_name(), "uint16");
    }

    #[test]
    fn integer_bounds_cover_unsigned_64() {
        assert_eq!(
            ElementKind::UInt64.integer_bounds(),
            Some((0, i128::from(u64::MAX)))
        );
        assert_eq!(
            ElementKind::Int8.integer_bounds(),
            Some((-128, 127))
        );
        assert_eq!(ElementKind::Float32.integer_bounds(), None);
    }

    #[test]
    fn sparse_support_is_limited() {
        let sparse: Vec<_> = ElementKind::all()
            .iter()
            .copied()
            .filter(|kind| kind.supports_sparse())
            .collect();
        assert_eq!(
            sparse,
            vec![
                ElementKind::Bool,
                ElementKind::Float64,
                ElementKind::Complex64
            ]
        );
    }

    #[test]
    fn operator_classes_partition_tags() {
        let arithmetic = OperatorTag::all()
            .iter()
            .filter(|op| op.class() == OperatorClass::Arithmetic)
            .count();
        let relational = OperatorTag::all()
            .iter()
            .filter(|op| op.class() == OperatorClass::Relational)
            .count();
        let logical = OperatorTag::all()
            .iter()
            .filter(|op| op.class() == OperatorClass::Logical)
            .count();
        assert_eq!((arithmetic, relational, logical), (6, 6, 6));
        for op in OperatorTag::all() {
            assert_eq!(OperatorTag::from_name(op.name()), Some(*op));
        }
    }

    #[test]
    fn density_names_roundtrip() {
        assert_eq!(Density::from_name("sparse"), Some(Density::Sparse));
        assert_eq!(Density::from_name(Density::Dense.name()), Some(Density::Dense));
        assert_eq!(Density::from_name("csr"), None);
    }

    #[test]
    fn shape_display_matches_interpreter_dims() {
        assert_eq!(Shape::from([3, 2]).to_string(), "3x2");
        assert_eq!(Shape::from([2, 3, 4]).to_string(), "2x3x4");
        assert_eq!(Shape::scalar().to_string(), "1x1");
    }

    #[test]
    fn column_major_strides_start_at_one() {
        assert_eq!(column_major_strides(&[2, 3, 4]), vec![1, 2, 6]);
        assert!(column_major_strides(&[]).is_empty());
    }

    #[test]
    fn broadcast_expands_singletons() {
        let out = broadcast_shape(&Shape::from([3, 1]), &Shape::from([1, 4]))
            .expect("singleton dims broadcast");
        assert_eq!(out, Shape::from([3, 4]));
    }

    #[test]
    fn broadcast_rejects_mismatched_dims() {
        let err = broadcast_shape(&Shape::from([3, 2]), &Shape::from([4, 2]))
            .expect_err("3 vs 4 must not broadcast");
        assert!(matches!(err, ArrayError::NonConformant { .. }));
    }

    #[test]
    fn broadcast_pads_trailing_dims() {
        let out = broadcast_shape(&Shape::from([2, 3]), &Shape::from([2, 1, 5]))
            .expect("trailing singleton padding");
        assert_eq!(out, Shape::from([2, 3, 5]));
    }

    #[test]
    fn broadcast_scalar_takes_other_shape() {
        let out = broadcast_shape(&Shape::scalar(), &Shape::from([0, 3]))
            .expect("scalar broadcasts against empty");
        assert_eq!(out, Shape::from([0, 3]));
    }

    proptest! {
        #[test]
        fn prop_broadcast_is_symmetric(
            lhs in prop::collection::vec(1usize..=3, 1..=3),
            rhs in prop::collection::vec(1usize..=3, 1..=3),
        ) {
            let left = Shape::new(lhs);
            let right = Shape::new(rhs);
            let forward = broadcast_shape(&left, &right).ok();
            let backward = broadcast_shape(&right, &left).ok();
            prop_assert_eq!(forward, backward);
        }

        #[test]
        fn prop_broadcast_with_self_is_identity(dims in prop::collection::vec(0usize..=4, 1..=4)) {
            let shape = Shape::new(dims);
            let out = broadcast_shape(&shape, &shape).expect("self broadcast");
            prop_assert_eq!(out, shape);
        }

        #[test]
        fn prop_numel_is_dim_product(dims in prop::collection::vec(0usize..=5, 1..=4)) {
            let expected: usize = dims.iter().copied().product();
            prop_assert_eq!(Shape::new(dims).numel(), expected);
        }
    }
}
