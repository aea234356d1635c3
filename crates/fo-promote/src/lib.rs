#![forbid(unsafe_code)]

use std::sync::OnceLock;

use fo_core::{Domain, ElementKind, OperatorClass, OperatorTag, Scalar};
use serde::{Deserialize, Serialize};

/// Which promotion table the resolver consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionPolicy {
    /// Monotone lattice: bool < integers < float32 < float64 < complex32 < complex64.
    #[default]
    Lattice,
    /// Integer kinds win over floats, single precision wins over double.
    IntegerDominant,
}

impl PromotionPolicy {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Lattice => "lattice",
            Self::IntegerDominant => "integer_dominant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cell {
    promoted: ElementKind,
    arithmetic: bool,
}

/// Precomputed pairwise promotion results for one policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionTable {
    policy: PromotionPolicy,
    cells: [[Cell; ElementKind::COUNT]; ElementKind::COUNT],
}

static LATTICE_TABLE: OnceLock<PromotionTable> = OnceLock::new();
static INTEGER_DOMINANT_TABLE: OnceLock<PromotionTable> = OnceLock::new();

impl PromotionTable {
    #[must_use]
    pub fn build(policy: PromotionPolicy) -> Self {
        let placeholder = Cell {
            promoted: ElementKind::Bool,
            arithmetic: true,
        };
        let mut cells = [[placeholder; ElementKind::COUNT]; ElementKind::COUNT];
        for lhs in ElementKind::all() {
            for rhs in ElementKind::all() {
                let lattice = lattice_join(*lhs, *rhs);
                cells[lhs.index()][rhs.index()] = match policy {
                    PromotionPolicy::Lattice => Cell {
                        promoted: lattice,
                        arithmetic: true,
                    },
                    PromotionPolicy::IntegerDominant => match integer_dominant_join(*lhs, *rhs) {
                        Some(promoted) => Cell {
                            promoted,
                            arithmetic: true,
                        },
                        None => Cell {
                            promoted: lattice,
                            arithmetic: false,
                        },
                    },
                };
            }
        }
        Self { policy, cells }
    }

    /// Shared table for `policy`, built on first use.
    #[must_use]
    pub fn for_policy(policy: PromotionPolicy) -> &'static PromotionTable {
        let slot = match policy {
            PromotionPolicy::Lattice => &LATTICE_TABLE,
            PromotionPolicy::IntegerDominant => &INTEGER_DOMINANT_TABLE,
        };
        slot.get_or_init(|| Self::build(policy))
    }

    #[must_use]
    pub fn policy(&self) -> PromotionPolicy {
        self.policy
    }

    #[must_use]
    pub fn promote(&self, lhs: ElementKind, rhs: ElementKind) -> ElementKind {
        self.cells[lhs.index()][rhs.index()].promoted
    }

    /// False when the policy defines no arithmetic between the two kinds.
    #[must_use]
    pub fn arithmetic_allowed(&self, lhs: ElementKind, rhs: ElementKind) -> bool {
        self.cells[lhs.index()][rhs.index()].arithmetic
    }

    #[must_use]
    pub fn result_kind(&self, op: OperatorTag, lhs: ElementKind, rhs: ElementKind) -> ElementKind {
        match op.class() {
            OperatorClass::Relational | OperatorClass::Logical => ElementKind::Bool,
            OperatorClass::Arithmetic => {
                if lhs.is_bool() && rhs.is_bool() {
                    ElementKind::Float64
                } else {
                    self.promote(lhs, rhs)
                }
            }
        }
    }

    /// Domain the kernel computes in before storing into the result kind.
    #[must_use]
    pub fn compute_domain(&self, op: OperatorTag, lhs: ElementKind, rhs: ElementKind) -> Domain {
        let integral = |kind: ElementKind| kind.is_bool() || kind.is_integer();
        if op.class() == OperatorClass::Arithmetic && lhs.is_bool() && rhs.is_bool() {
            return Domain::Float64;
        }
        if integral(lhs) && integral(rhs) {
            return Domain::Integer;
        }
        let promoted = self.promote(lhs, rhs);
        if integral(promoted) {
            // An integer kind dominated a float operand.
            Domain::Mixed
        } else {
            promoted.natural_domain()
        }
    }
}

const fn lattice_rank(kind: ElementKind) -> u8 {
    match kind {
        ElementKind::Bool => 0,
        ElementKind::Float32 => 2,
        ElementKind::Float64 => 3,
        ElementKind::Complex32 => 4,
        ElementKind::Complex64 => 5,
        _ => 1,
    }
}

fn integer_join(lhs: ElementKind, rhs: ElementKind) -> ElementKind {
    let (Some(lhs_width), Some(rhs_width)) = (lhs.integer_width(), rhs.integer_width()) else {
        return ElementKind::Float64;
    };
    if lhs.is_signed_integer() == rhs.is_signed_integer() {
        return if lhs_width >= rhs_width { lhs } else { rhs };
    }
    let (signed, signed_width, unsigned_width) = if lhs.is_signed_integer() {
        (lhs, lhs_width, rhs_width)
    } else {
        (rhs, rhs_width, lhs_width)
    };
    if signed_width > unsigned_width {
        signed
    } else {
        ElementKind::signed_integer_of_width(unsigned_width * 2).unwrap_or(ElementKind::Float64)
    }
}

fn lattice_join(lhs: ElementKind, rhs: ElementKind) -> ElementKind {
    if lhs == rhs {
        return lhs;
    }
    if lhs.is_bool() {
        return rhs;
    }
    if rhs.is_bool() {
        return lhs;
    }
    if lhs.is_integer() && rhs.is_integer() {
        return integer_join(lhs, rhs);
    }
    if lattice_rank(lhs) >= lattice_rank(rhs) {
        lhs
    } else {
        rhs
    }
}

/// `None` marks pairs whose arithmetic is undefined under the policy.
fn integer_dominant_join(lhs: ElementKind, rhs: ElementKind) -> Option<ElementKind> {
    if lhs == rhs {
        return Some(lhs);
    }
    if lhs.is_bool() {
        return Some(rhs);
    }
    if rhs.is_bool() {
        return Some(lhs);
    }
    match (lhs.is_integer(), rhs.is_integer()) {
        (true, true) => None,
        (true, false) => rhs.is_float().then_some(lhs),
        (false, true) => lhs.is_float().then_some(rhs),
        (false, false) => {
            let single = matches!(lhs, ElementKind::Float32 | ElementKind::Complex32)
                || matches!(rhs, ElementKind::Float32 | ElementKind::Complex32);
            let complex = lhs.is_complex() || rhs.is_complex();
            Some(match (single, complex) {
                (true, true) => ElementKind::Complex32,
                (true, false) => ElementKind::Float32,
                (false, true) => ElementKind::Complex64,
                (false, false) => ElementKind::Float64,
            })
        }
    }
}

/// Lattice promotion of two kinds. Total and commutative.
#[must_use]
pub fn promote(lhs: ElementKind, rhs: ElementKind) -> ElementKind {
    PromotionTable::for_policy(PromotionPolicy::Lattice).promote(lhs, rhs)
}

#[must_use]
pub fn promote_with(policy: PromotionPolicy, lhs: ElementKind, rhs: ElementKind) -> ElementKind {
    PromotionTable::for_policy(policy).promote(lhs, rhs)
}

#[must_use]
pub fn result_kind(op: OperatorTag, lhs: ElementKind, rhs: ElementKind) -> ElementKind {
    PromotionTable::for_policy(PromotionPolicy::Lattice).result_kind(op, lhs, rhs)
}

#[must_use]
pub fn compute_domain(op: OperatorTag, lhs: ElementKind, rhs: ElementKind) -> Domain {
    PromotionTable::for_policy(PromotionPolicy::Lattice).compute_domain(op, lhs, rhs)
}

#[must_use]
pub fn arithmetic_allowed(policy: PromotionPolicy, lhs: ElementKind, rhs: ElementKind) -> bool {
    PromotionTable::for_policy(policy).arithmetic_allowed(lhs, rhs)
}

/// Converts one value to `target`.
///
/// Integers saturate at the target bounds, floats round half away from zero
/// into integers with NaN mapping to 0, complex values keep their real part
/// when narrowed to a real kind, and bool means nonzero.
#[must_use]
pub fn saturating_cast(value: Scalar, target: ElementKind) -> Scalar {
    value.cast(target)
}
