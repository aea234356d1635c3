use std::cmp::Ordering;
use std::fmt;

use num_complex::{Complex32, Complex64};

use crate::{Domain, ElementKind, match_element_kind};

/// Arithmetic domain a kernel computes in.
///
/// Integer kinds all widen to `i128`, so a single instantiation covers every
/// integer pairing; saturation happens when the value is stored back.
pub trait Numeric: Copy + PartialEq + fmt::Debug + Send + Sync + 'static {
    const DOMAIN: Domain;

    fn from_bool(value: bool) -> Self;
    fn from_i128(value: i128) -> Self;
    fn from_f32(value: f32) -> Self;
    fn from_f64(value: f64) -> Self;
    fn from_c32(value: Complex32) -> Self;
    fn from_c64(value: Complex64) -> Self;

    fn to_bool(self) -> bool;
    /// Rounds half away from zero; NaN maps to 0 and infinities saturate.
    fn to_i128_saturating(self) -> i128;
    fn to_f32(self) -> f32;
    fn to_f64(self) -> f64;
    fn to_c32(self) -> Complex32;
    fn to_c64(self) -> Complex64;

    fn zero() -> Self;
    fn plus(self, rhs: Self) -> Self;
    fn minus(self, rhs: Self) -> Self;
    fn times(self, rhs: Self) -> Self;
    fn divide(self, rhs: Self) -> Self;

    fn is_zero(self) -> bool;
    fn is_nan(self) -> bool;
    fn magnitude(self) -> f64;
    /// Ordering used by `<`, `<=`, `>`, `>=`. `None` when either side is NaN.
    fn compare(self, rhs: Self) -> Option<Ordering>;
}

impl Numeric for i128 {
    const DOMAIN: Domain = Domain::Integer;

    fn from_bool(value: bool) -> Self {
        i128::from(value)
    }

    fn from_i128(value: i128) -> Self {
        value
    }

    fn from_f32(value: f32) -> Self {
        value.round() as i128
    }

    fn from_f64(value: f64) -> Self {
        value.round() as i128
    }

    fn from_c32(value: Complex32) -> Self {
        value.re.round() as i128
    }

    fn from_c64(value: Complex64) -> Self {
        value.re.round() as i128
    }

    fn to_bool(self) -> bool {
        self != 0
    }

    fn to_i128_saturating(self) -> i128 {
        self
    }

    fn to_f32(self) -> f32 {
        self as f32
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn to_c32(self) -> Complex32 {
        Complex32::new(self as f32, 0.0)
    }

    fn to_c64(self) -> Complex64 {
        Complex64::new(self as f64, 0.0)
    }

    fn zero() -> Self {
        0
    }

    fn plus(self, rhs: Self) -> Self {
        self.saturating_add(rhs)
    }

    fn minus(self, rhs: Self) -> Self {
        self.saturating_sub(rhs)
    }

    fn times(self, rhs: Self) -> Self {
        self.saturating_mul(rhs)
    }

    fn divide(self, rhs: Self) -> Self {
        if rhs == 0 {
            return match self.cmp(&0) {
                Ordering::Greater => i128::MAX,
                Ordering::Less => i128::MIN,
                Ordering::Equal => 0,
            };
        }
        let (Some(quotient), Some(remainder)) = (self.checked_div(rhs), self.checked_rem(rhs))
        else {
            return i128::MAX;
        };
        if remainder != 0 && remainder.unsigned_abs() * 2 >= rhs.unsigned_abs() {
            if (self < 0) == (rhs < 0) {
                quotient + 1
            } else {
                quotient - 1
            }
        } else {
            quotient
        }
    }

    fn is_zero(self) -> bool {
        self == 0
    }

    fn is_nan(self) -> bool {
        false
    }

    fn magnitude(self) -> f64 {
        (self as f64).abs()
    }

    fn compare(self, rhs: Self) -> Option<Ordering> {
        Some(self.cmp(&rhs))
    }
}

macro_rules! impl_float_numeric {
    ($ty:ty, $domain:ident) => {
        impl Numeric for $ty {
            const DOMAIN: Domain = Domain::$domain;

            fn from_bool(value: bool) -> Self {
                if value { 1.0 } else { 0.0 }
            }

            fn from_i128(value: i128) -> Self {
                value as $ty
            }

            fn from_f32(value: f32) -> Self {
                value as $ty
            }

            fn from_f64(value: f64) -> Self {
                value as $ty
            }

            fn from_c32(value: Complex32) -> Self {
                value.re as $ty
            }

            fn from_c64(value: Complex64) -> Self {
                value.re as $ty
            }

            fn to_bool(self) -> bool {
                self != 0.0
            }

            fn to_i128_saturating(self) -> i128 {
                self.round() as i128
            }

            fn to_f32(self) -> f32 {
                self as f32
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn to_c32(self) -> Complex32 {
                Complex32::new(self as f32, 0.0)
            }

            fn to_c64(self) -> Complex64 {
                Complex64::new(self as f64, 0.0)
            }

            fn zero() -> Self {
                0.0
            }

            fn plus(self, rhs: Self) -> Self {
                self + rhs
            }

            fn minus(self, rhs: Self) -> Self {
                self - rhs
            }

            fn times(self, rhs: Self) -> Self {
                self * rhs
            }

            fn divide(self, rhs: Self) -> Self {
                self / rhs
            }

            fn is_zero(self) -> bool {
                self == 0.0
            }

            fn is_nan(self) -> bool {
                <$ty>::is_nan(self)
            }

            fn magnitude(self) -> f64 {
                (self as f64).abs()
            }

            fn compare(self, rhs: Self) -> Option<Ordering> {
                self.partial_cmp(&rhs)
            }
        }
    };
}

impl_float_numeric!(f32, Float32);
impl_float_numeric!(f64, Float64);

macro_rules! impl_complex_numeric {
    ($ty:ident, $part:ty, $domain:ident) => {
        impl Numeric for $ty {
            const DOMAIN: Domain = Domain::$domain;

            fn from_bool(value: bool) -> Self {
                $ty::new(if value { 1.0 } else { 0.0 }, 0.0)
            }

            fn from_i128(value: i128) -> Self {
                $ty::new(value as $part, 0.0)
            }

            fn from_f32(value: f32) -> Self {
                $ty::new(value as $part, 0.0)
            }

            fn from_f64(value: f64) -> Self {
                $ty::new(value as $part, 0.0)
            }

            fn from_c32(value: Complex32) -> Self {
                $ty::new(value.re as $part, value.im as $part)
            }

            fn from_c64(value: Complex64) -> Self {
                $ty::new(value.re as $part, value.im as $part)
            }

            fn to_bool(self) -> bool {
                self.re != 0.0 || self.im != 0.0
            }

            fn to_i128_saturating(self) -> i128 {
                self.re.round() as i128
            }

            fn to_f32(self) -> f32 {
                self.re as f32
            }

            fn to_f64(self) -> f64 {
                self.re as f64
            }

            fn to_c32(self) -> Complex32 {
                Complex32::new(self.re as f32, self.im as f32)
            }

            fn to_c64(self) -> Complex64 {
                Complex64::new(self.re as f64, self.im as f64)
            }

            fn zero() -> Self {
                $ty::new(0.0, 0.0)
            }

            fn plus(self, rhs: Self) -> Self {
                self + rhs
            }

            fn minus(self, rhs: Self) -> Self {
                self - rhs
            }

            fn times(self, rhs: Self) -> Self {
                self * rhs
            }

            fn divide(self, rhs: Self) -> Self {
                // Division by an exact zero divides each part, giving Inf/NaN per part.
                if rhs.re == 0.0 && rhs.im == 0.0 {
                    return $ty::new(self.re / 0.0, self.im / 0.0);
                }
                self / rhs
            }

            fn is_zero(self) -> bool {
                self.re == 0.0 && self.im == 0.0
            }

            fn is_nan(self) -> bool {
                self.re.is_nan() || self.im.is_nan()
            }

            fn magnitude(self) -> f64 {
                self.norm() as f64
            }

            fn compare(self, rhs: Self) -> Option<Ordering> {
                match self.norm().partial_cmp(&rhs.norm())? {
                    Ordering::Equal => self.arg().partial_cmp(&rhs.arg()),
                    other => Some(other),
                }
            }
        }
    };
}

impl_complex_numeric!(Complex32, f32, Complex32);
impl_complex_numeric!(Complex64, f64, Complex64);

/// Values of [`Domain::Mixed`]: exact while integral, double precision otherwise.
///
/// An integer kind that dominates a float keeps every integral operand exact,
/// so `int64` values past 2^53 survive `+ 0.0` or `- 1.0` unchanged.
#[derive(Debug, Clone, Copy)]
pub enum MixedValue {
    Exact(i128),
    Inexact(f64),
}

/// 2^126; integral doubles below it convert to `i128` without overflow.
const EXACT_LIMIT: f64 = 85_070_591_730_234_615_865_843_651_857_942_052_864.0;

impl MixedValue {
    fn of_f64(value: f64) -> Self {
        // -0.0 stays inexact so that `x / -0.0` keeps its sign.
        let negative_zero = value == 0.0 && value.is_sign_negative();
        if value.is_finite() && value.fract() == 0.0 && value.abs() < EXACT_LIMIT && !negative_zero {
            Self::Exact(value as i128)
        } else {
            Self::Inexact(value)
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Self::Exact(value) => value as f64,
            Self::Inexact(value) => value,
        }
    }

    fn combine(
        self,
        rhs: Self,
        exact: impl FnOnce(i128, i128) -> i128,
        inexact: impl FnOnce(f64, f64) -> f64,
    ) -> Self {
        match (self, rhs) {
            (Self::Exact(lhs), Self::Exact(rhs)) => Self::Exact(exact(lhs, rhs)),
            (lhs, rhs) => Self::of_f64(inexact(lhs.as_f64(), rhs.as_f64())),
        }
    }
}

impl PartialEq for MixedValue {
    fn eq(&self, other: &Self) -> bool {
        self.compare(*other) == Some(Ordering::Equal)
    }
}

impl Numeric for MixedValue {
    const DOMAIN: Domain = Domain::Mixed;

    fn from_bool(value: bool) -> Self {
        Self::Exact(i128::from(value))
    }

    fn from_i128(value: i128) -> Self {
        Self::Exact(value)
    }

    fn from_f32(value: f32) -> Self {
        Self::of_f64(f64::from(value))
    }

    fn from_f64(value: f64) -> Self {
        Self::of_f64(value)
    }

    fn from_c32(value: Complex32) -> Self {
        Self::of_f64(f64::from(value.re))
    }

    fn from_c64(value: Complex64) -> Self {
        Self::of_f64(value.re)
    }

    fn to_bool(self) -> bool {
        !self.is_zero()
    }

    fn to_i128_saturating(self) -> i128 {
        match self {
            Self::Exact(value) => value,
            Self::Inexact(value) => value.round() as i128,
        }
    }

    fn to_f32(self) -> f32 {
        self.as_f64() as f32
    }

    fn to_f64(self) -> f64 {
        self.as_f64()
    }

    fn to_c32(self) -> Complex32 {
        Complex32::new(self.as_f64() as f32, 0.0)
    }

    fn to_c64(self) -> Complex64 {
        Complex64::new(self.as_f64(), 0.0)
    }

    fn zero() -> Self {
        Self::Exact(0)
    }

    fn plus(self, rhs: Self) -> Self {
        self.combine(rhs, <i128 as Numeric>::plus, |a, b| a + b)
    }

    fn minus(self, rhs: Self) -> Self {
        self.combine(rhs, <i128 as Numeric>::minus, |a, b| a - b)
    }

    fn times(self, rhs: Self) -> Self {
        self.combine(rhs, <i128 as Numeric>::times, |a, b| a * b)
    }

    fn divide(self, rhs: Self) -> Self {
        self.combine(rhs, <i128 as Numeric>::divide, |a, b| a / b)
    }

    fn is_zero(self) -> bool {
        match self {
            Self::Exact(value) => value == 0,
            Self::Inexact(value) => value == 0.0,
        }
    }

    fn is_nan(self) -> bool {
        matches!(self, Self::Inexact(value) if value.is_nan())
    }

    fn magnitude(self) -> f64 {
        self.as_f64().abs()
    }

    fn compare(self, rhs: Self) -> Option<Ordering> {
        match (self, rhs) {
            (Self::Exact(lhs), Self::Exact(rhs)) => Some(lhs.cmp(&rhs)),
            // A fractional double is below 2^52 in magnitude, so rounding the
            // integral side cannot move it across the other operand.
            (lhs, rhs) => lhs.as_f64().partial_cmp(&rhs.as_f64()),
        }
    }
}

/// A Rust type that backs one [`ElementKind`].
pub trait Element: Copy + PartialEq + fmt::Debug + Send + Sync + 'static {
    const KIND: ElementKind;
    /// Domain values of this kind are computed in when no promotion applies.
    type Natural: Numeric;

    fn zero() -> Self;
    fn is_zero(self) -> bool;
    fn lift<N: Numeric>(self) -> N;
    /// Stores a domain value, saturating and rounding as the kind requires.
    fn store<N: Numeric>(value: N) -> Self;
    /// Logical value, or `None` for NaN.
    fn truth(self) -> Option<bool>;

    fn slice(data: &ArrayData) -> Option<&[Self]>;
    fn slice_mut(data: &mut ArrayData) -> Option<&mut [Self]>;
    fn wrap(values: Vec<Self>) -> ArrayData;
    fn into_scalar(self) -> Scalar;

    fn cast<T: Element>(self) -> T {
        T::store(self.lift::<Self::Natural>())
    }
}

macro_rules! impl_storage_access {
    ($variant:ident) => {
        fn slice(data: &ArrayData) -> Option<&[Self]> {
            match data {
                ArrayData::$variant(values) => Some(values),
                _ => None,
            }
        }

        fn slice_mut(data: &mut ArrayData) -> Option<&mut [Self]> {
            match data {
                ArrayData::$variant(values) => Some(values),
                _ => None,
            }
        }

        fn wrap(values: Vec<Self>) -> ArrayData {
            ArrayData::$variant(values)
        }

        fn into_scalar(self) -> Scalar {
            Scalar::$variant(self)
        }
    };
}

impl Element for bool {
    const KIND: ElementKind = ElementKind::Bool;
    type Natural = i128;

    fn zero() -> Self {
        false
    }

    fn is_zero(self) -> bool {
        !self
    }

    fn lift<N: Numeric>(self) -> N {
        N::from_bool(self)
    }

    fn store<N: Numeric>(value: N) -> Self {
        value.to_bool()
    }

    fn truth(self) -> Option<bool> {
        Some(self)
    }

    impl_storage_access!(Bool);
}

macro_rules! impl_integer_element {
    ($ty:ty, $variant:ident) => {
        impl Element for $ty {
            const KIND: ElementKind = ElementKind::$variant;
            type Natural = i128;

            fn zero() -> Self {
                0
            }

            fn is_zero(self) -> bool {
                self == 0
            }

            fn lift<N: Numeric>(self) -> N {
                N::from_i128(i128::from(self))
            }

            fn store<N: Numeric>(value: N) -> Self {
                let wide = value.to_i128_saturating();
                wide.clamp(i128::from(<$ty>::MIN), i128::from(<$ty>::MAX)) as $ty
            }

            fn truth(self) -> Option<bool> {
                Some(self != 0)
            }

            impl_storage_access!($variant);
        }
    };
}

impl_integer_element!(i8, Int8);
impl_integer_element!(i16, Int16);
impl_integer_element!(i32, Int32);
impl_integer_element!(i64, Int64);
impl_integer_element!(u8, UInt8);
impl_integer_element!(u16, UInt16);
impl_integer_element!(u32, UInt32);
impl_integer_element!(u64, UInt64);

impl Element for f32 {
    const KIND: ElementKind = ElementKind::Float32;
    type Natural = f32;

    fn zero() -> Self {
        0.0
    }

    fn is_zero(self) -> bool {
        self == 0.0
    }

    fn lift<N: Numeric>(self) -> N {
        N::from_f32(self)
    }

    fn store<N: Numeric>(value: N) -> Self {
        value.to_f32()
    }

    fn truth(self) -> Option<bool> {
        if self.is_nan() {
            None
        } else {
            Some(self != 0.0)
        }
    }

    impl_storage_access!(Float32);
}

impl Element for f64 {
    const KIND: ElementKind = ElementKind::Float64;
    type Natural = f64;

    fn zero() -> Self {
        0.0
    }

    fn is_zero(self) -> bool {
        self == 0.0
    }

    fn lift<N: Numeric>(self) -> N {
        N::from_f64(self)
    }

    fn store<N: Numeric>(value: N) -> Self {
        value.to_f64()
    }

    fn truth(self) -> Option<bool> {
        if self.is_nan() {
            None
        } else {
            Some(self != 0.0)
        }
    }

    impl_storage_access!(Float64);
}

impl Element for Complex32 {
    const KIND: ElementKind = ElementKind::Complex32;
    type Natural = Complex32;

    fn zero() -> Self {
        Complex32::new(0.0, 0.0)
    }

    fn is_zero(self) -> bool {
        self.re == 0.0 && self.im == 0.0
    }

    fn lift<N: Numeric>(self) -> N {
        N::from_c32(self)
    }

    fn store<N: Numeric>(value: N) -> Self {
        value.to_c32()
    }

    fn truth(self) -> Option<bool> {
        if self.re.is_nan() || self.im.is_nan() {
            None
        } else {
            Some(!Element::is_zero(self))
        }
    }

    impl_storage_access!(Complex32);
}

impl Element for Complex64 {
    const KIND: ElementKind = ElementKind::Complex64;
    type Natural = Complex64;

    fn zero() -> Self {
        Complex64::new(0.0, 0.0)
    }

    fn is_zero(self) -> bool {
        self.re == 0.0 && self.im == 0.0
    }

    fn lift<N: Numeric>(self) -> N {
        N::from_c64(self)
    }

    fn store<N: Numeric>(value: N) -> Self {
        value.to_c64()
    }

    fn truth(self) -> Option<bool> {
        if self.re.is_nan() || self.im.is_nan() {
            None
        } else {
            Some(!Element::is_zero(self))
        }
    }

    impl_storage_access!(Complex64);
}

/// One typed element value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Complex32(Complex32),
    Complex64(Complex64),
}

macro_rules! with_scalar {
    ($scalar:expr, $value:ident => $body:expr) => {
        match $scalar {
            Scalar::Bool($value) => $body,
            Scalar::Int8($value) => $body,
            Scalar::Int16($value) => $body,
            Scalar::Int32($value) => $body,
            Scalar::Int64($value) => $body,
            Scalar::UInt8($value) => $body,
            Scalar::UInt16($value) => $body,
            Scalar::UInt32($value) => $body,
            Scalar::UInt64($value) => $body,
            Scalar::Float32($value) => $body,
            Scalar::Float64($value) => $body,
            Scalar::Complex32($value) => $body,
            Scalar::Complex64($value) => $body,
        }
    };
}

impl Scalar {
    #[must_use]
    pub fn kind(self) -> ElementKind {
        with_scalar!(self, value => element_kind_of(value))
    }

    #[must_use]
    pub fn to_element<T: Element>(self) -> T {
        with_scalar!(self, value => value.cast::<T>())
    }

    /// Converts to `target` with saturating, round-half-away semantics.
    #[must_use]
    pub fn cast(self, target: ElementKind) -> Scalar {
        match_element_kind!(target, T => self.to_element::<T>().into_scalar())
    }

    #[must_use]
    pub fn zero(kind: ElementKind) -> Scalar {
        match_element_kind!(kind, T => <T as Element>::zero().into_scalar())
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        with_scalar!(self, value => Element::is_zero(value))
    }

    #[must_use]
    pub fn is_nan(self) -> bool {
        with_scalar!(self, value => value.truth().is_none())
    }

    /// Real part as `f64`.
    #[must_use]
    pub fn to_f64(self) -> f64 {
        self.to_element::<f64>()
    }

    #[must_use]
    pub fn to_complex64(self) -> Complex64 {
        self.to_element::<Complex64>()
    }

    /// Equality that treats NaN as equal to NaN, for comparing fixtures.
    #[must_use]
    pub fn same_value(self, other: Scalar) -> bool {
        if self.kind() != other.kind() {
            return false;
        }
        let (lhs, rhs) = (self.to_complex64(), other.to_complex64());
        let part = |a: f64, b: f64| a == b || (a.is_nan() && b.is_nan());
        match (self, other) {
            (Scalar::Int64(a), Scalar::Int64(b)) => a == b,
            (Scalar::UInt64(a), Scalar::UInt64(b)) => a == b,
            _ => part(lhs.re, rhs.re) && part(lhs.im, rhs.im),
        }
    }
}

fn element_kind_of<E: Element>(_value: E) -> ElementKind {
    E::KIND
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(value) => write!(f, "{value}"),
            Scalar::Int8(value) => write!(f, "{value}"),
            Scalar::Int16(value) => write!(f, "{value}"),
            Scalar::Int32(value) => write!(f, "{value}"),
            Scalar::Int64(value) => write!(f, "{value}"),
            Scalar::UInt8(value) => write!(f, "{value}"),
            Scalar::UInt16(value) => write!(f, "{value}"),
            Scalar::UInt32(value) => write!(f, "{value}"),
            Scalar::UInt64(value) => write!(f, "{value}"),
            Scalar::Float32(value) => write!(f, "{value}"),
            Scalar::Float64(value) => write!(f, "{value}"),
            Scalar::Complex32(value) => write!(f, "{}{:+}i", value.re, value.im),
            Scalar::Complex64(value) => write!(f, "{}{:+}i", value.re, value.im),
        }
    }
}

/// Column-major element buffer, one variant per [`ElementKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Bool(Vec<bool>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Complex32(Vec<Complex32>),
    Complex64(Vec<Complex64>),
}

macro_rules! with_values {
    ($data:expr, $values:ident => $body:expr) => {
        match $data {
            ArrayData::Bool($values) => $body,
            ArrayData::Int8($values) => $body,
            ArrayData::Int16($values) => $body,
            ArrayData::Int32($values) => $body,
            ArrayData::Int64($values) => $body,
            ArrayData::UInt8($values) => $body,
            ArrayData::UInt16($values) => $body,
            ArrayData::UInt32($values) => $body,
            ArrayData::UInt64($values) => $body,
            ArrayData::Float32($values) => $body,
            ArrayData::Float64($values) => $body,
            ArrayData::Complex32($values) => $body,
            ArrayData::Complex64($values) => $body,
        }
    };
}

pub(crate) use with_values;

impl ArrayData {
    #[must_use]
    pub fn kind(&self) -> ElementKind {
        with_values!(self, values => slice_kind(values))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        with_values!(self, values => values.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn zeros(kind: ElementKind, len: usize) -> ArrayData {
        match_element_kind!(kind, T => T::wrap(vec![<T as Element>::zero(); len]))
    }

    #[must_use]
    pub fn filled(value: Scalar, len: usize) -> ArrayData {
        match_element_kind!(value.kind(), T => T::wrap(vec![value.to_element::<T>(); len]))
    }

    /// Builds a buffer of `kind`, casting every scalar into it.
    #[must_use]
    pub fn from_scalars(kind: ElementKind, scalars: &[Scalar]) -> ArrayData {
        match_element_kind!(kind, T => T::wrap(
            scalars.iter().map(|scalar| scalar.to_element::<T>()).collect()
        ))
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Scalar> {
        with_values!(self, values => values.get(index).map(|value| value.into_scalar()))
    }

    #[must_use]
    pub fn to_scalars(&self) -> Vec<Scalar> {
        with_values!(self, values => values.iter().map(|value| value.into_scalar()).collect())
    }

    #[must_use]
    pub fn cast(&self, target: ElementKind) -> ArrayData {
        if self.kind() == target {
            return self.clone();
        }
        with_values!(self, values => cast_values(values, target))
    }

    #[must_use]
    pub fn count_nonzero(&self) -> usize {
        with_values!(self, values => values.iter().filter(|value| !Element::is_zero(**value)).count())
    }

    #[must_use]
    pub fn typed<E: Element>(&self) -> Option<&[E]> {
        E::slice(self)
    }
}

fn slice_kind<E: Element>(_values: &[E]) -> ElementKind {
    E::KIND
}

fn cast_values<E: Element>(values: &[E], target: ElementKind) -> ArrayData {
    match_element_kind!(target, T => T::wrap(values.iter().map(|value| value.cast::<T>()).collect()))
}
