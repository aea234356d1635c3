use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use fo_core::{
    Complex32, Complex64, Density, Domain, Element, ElementKind, MixedValue, OperatorClass,
    OperatorTag,
};
use fo_kernel_cpu::{
    InPlaceFn, KernelFn, dense_elementwise, dense_elementwise_in_place, dense_product,
    dense_quotient, sparse_elementwise, sparse_product, sparse_quotient,
};
use fo_promote::{PromotionPolicy, PromotionTable};
use tracing::debug;

/// Exact operand signature a kernel is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KernelKey {
    pub lhs_kind: ElementKind,
    pub lhs_density: Density,
    pub rhs_kind: ElementKind,
    pub rhs_density: Density,
    pub op: OperatorTag,
}

impl KernelKey {
    #[must_use]
    pub const fn new(
        lhs_kind: ElementKind,
        lhs_density: Density,
        rhs_kind: ElementKind,
        rhs_density: Density,
        op: OperatorTag,
    ) -> Self {
        Self {
            lhs_kind,
            lhs_density,
            rhs_kind,
            rhs_density,
            op,
        }
    }

    /// Same densities and operator with different element kinds.
    #[must_use]
    pub const fn with_kinds(self, lhs_kind: ElementKind, rhs_kind: ElementKind) -> Self {
        Self {
            lhs_kind,
            rhs_kind,
            ..self
        }
    }

    #[must_use]
    pub fn has_sparse_operand(&self) -> bool {
        self.lhs_density == Density::Sparse || self.rhs_density == Density::Sparse
    }
}

impl fmt::Display for KernelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({} {}, {} {})",
            self.op,
            self.lhs_density.name(),
            self.lhs_kind,
            self.rhs_density.name(),
            self.rhs_kind
        )
    }
}

/// A registered kernel and its optional in-place variant.
#[derive(Debug, Clone, Copy)]
pub struct KernelEntry {
    pub name: &'static str,
    pub kernel: KernelFn,
    pub in_place: Option<InPlaceFn>,
}

impl KernelEntry {
    #[must_use]
    pub const fn new(name: &'static str, kernel: KernelFn) -> Self {
        Self {
            name,
            kernel,
            in_place: None,
        }
    }

    #[must_use]
    pub const fn with_in_place(mut self, in_place: InPlaceFn) -> Self {
        self.in_place = Some(in_place);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    DuplicateKernel { key: KernelKey },
    AlreadyInitialized { policy: PromotionPolicy },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateKernel { key } => write!(f, "kernel already registered for {key}"),
            Self::AlreadyInitialized { policy } => write!(
                f,
                "registry for policy {} is already initialized",
                policy.label()
            ),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Immutable kernel table for one promotion policy.
#[derive(Debug)]
pub struct KernelRegistry {
    policy: PromotionPolicy,
    entries: HashMap<KernelKey, KernelEntry>,
}

impl KernelRegistry {
    #[must_use]
    pub fn policy(&self) -> PromotionPolicy {
        self.policy
    }

    #[must_use]
    pub fn table(&self) -> &'static PromotionTable {
        PromotionTable::for_policy(self.policy)
    }

    #[must_use]
    pub fn get(&self, key: &KernelKey) -> Option<&KernelEntry> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &KernelKey) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered keys in a stable order.
    #[must_use]
    pub fn keys(&self) -> Vec<KernelKey> {
        let mut keys: Vec<KernelKey> = self.entries.keys().copied().collect();
        keys.sort();
        keys
    }
}

/// Runs `$body` with `$n` bound to the numeric type of `$domain`.
macro_rules! with_domain {
    ($domain:expr, $n:ident => $body:expr) => {
        match $domain {
            Domain::Integer => {
                type $n = i128;
                $body
            }
            Domain::Mixed => {
                type $n = MixedValue;
                $body
            }
            Domain::Float32 => {
                type $n = f32;
                $body
            }
            Domain::Float64 => {
                type $n = f64;
                $body
            }
            Domain::Complex32 => {
                type $n = Complex32;
                $body
            }
            Domain::Complex64 => {
                type $n = Complex64;
                $body
            }
        }
    };
}

fn elementwise_kernel<L: Element, R: Element>(sparse: bool, domain: Domain) -> KernelFn {
    with_domain!(domain, N => if sparse {
        sparse_elementwise::<L, R, N> as KernelFn
    } else {
        dense_elementwise::<L, R, N> as KernelFn
    })
}

fn matrix_kernel<L: Element, R: Element>(op: OperatorTag, sparse: bool, domain: Domain) -> KernelFn {
    with_domain!(domain, N => match (op, sparse) {
        (OperatorTag::Quotient, false) => dense_quotient::<L, R, N> as KernelFn,
        (OperatorTag::Quotient, true) => sparse_quotient::<L, R, N> as KernelFn,
        (_, false) => dense_product::<L, R, N> as KernelFn,
        (_, true) => sparse_product::<L, R, N> as KernelFn,
    })
}

fn kernel_name(op: OperatorTag, sparse: bool) -> &'static str {
    match (op, sparse) {
        (OperatorTag::Product, false) => "dense_product",
        (OperatorTag::Product, true) => "sparse_product",
        (OperatorTag::Quotient, false) => "dense_quotient",
        (OperatorTag::Quotient, true) => "sparse_quotient",
        (_, false) => "dense_elementwise",
        (_, true) => "sparse_elementwise",
    }
}

const SPARSE_FAMILIES: [(Density, Density); 3] = [
    (Density::Sparse, Density::Sparse),
    (Density::Sparse, Density::Dense),
    (Density::Dense, Density::Sparse),
];

/// Collects kernels before freezing them into a [`KernelRegistry`].
#[derive(Debug)]
pub struct RegistryBuilder {
    policy: PromotionPolicy,
    entries: HashMap<KernelKey, KernelEntry>,
}

impl RegistryBuilder {
    #[must_use]
    pub fn new(policy: PromotionPolicy) -> Self {
        Self {
            policy,
            entries: HashMap::new(),
        }
    }

    #[must_use]
    pub fn policy(&self) -> PromotionPolicy {
        self.policy
    }

    /// Adds one kernel; a key registered twice is an error.
    pub fn register(mut self, key: KernelKey, entry: KernelEntry) -> Result<Self, RegistryError> {
        if self.entries.contains_key(&key) {
            return Err(RegistryError::DuplicateKernel { key });
        }
        self.entries.insert(key, entry);
        Ok(self)
    }

    /// Adds the builtin kernel families.
    ///
    /// Keys already present are left untouched so that toolbox kernels
    /// registered first keep precedence.
    #[must_use]
    pub fn with_builtin_kernels(mut self) -> Self {
        self.add_same_kind::<bool>(true);
        self.add_same_kind::<i8>(false);
        self.add_same_kind::<i16>(false);
        self.add_same_kind::<i32>(false);
        self.add_same_kind::<i64>(false);
        self.add_same_kind::<u8>(false);
        self.add_same_kind::<u16>(false);
        self.add_same_kind::<u32>(false);
        self.add_same_kind::<u64>(false);
        self.add_same_kind::<f32>(true);
        self.add_same_kind::<f64>(true);
        self.add_same_kind::<Complex32>(true);
        self.add_same_kind::<Complex64>(true);

        self.add_with_floats::<bool>();
        self.add_with_floats::<i8>();
        self.add_with_floats::<i16>();
        self.add_with_floats::<i32>();
        self.add_with_floats::<i64>();
        self.add_with_floats::<u8>();
        self.add_with_floats::<u16>();
        self.add_with_floats::<u32>();
        self.add_with_floats::<u64>();

        self.add_dense_pair::<f32, Complex32>(true);
        self.add_dense_pair::<Complex32, f32>(true);
        self.add_dense_pair::<f64, Complex64>(true);
        self.add_dense_pair::<Complex64, f64>(true);

        self.add_sparse_with::<bool>();
        self.add_sparse_with::<f64>();
        self.add_sparse_with::<Complex64>();

        debug!(
            policy = self.policy.label(),
            kernels = self.entries.len(),
            "builtin kernels registered"
        );
        self
    }

    #[must_use]
    pub fn build(self) -> KernelRegistry {
        KernelRegistry {
            policy: self.policy,
            entries: self.entries,
        }
    }

    fn table(&self) -> &'static PromotionTable {
        PromotionTable::for_policy(self.policy)
    }

    fn add_builtin(&mut self, key: KernelKey, entry: KernelEntry) {
        self.entries.entry(key).or_insert(entry);
    }

    fn add_pair<L: Element, R: Element>(&mut self, lhs: Density, rhs: Density, matrix_ops: bool) {
        let sparse = lhs == Density::Sparse || rhs == Density::Sparse;
        for &op in OperatorTag::all() {
            if op.is_matrix_op() && !matrix_ops {
                continue;
            }
            let domain = self.table().compute_domain(op, L::KIND, R::KIND);
            let kernel = if op.is_matrix_op() {
                matrix_kernel::<L, R>(op, sparse, domain)
            } else {
                elementwise_kernel::<L, R>(sparse, domain)
            };
            self.add_builtin(
                KernelKey::new(L::KIND, lhs, R::KIND, rhs, op),
                KernelEntry::new(kernel_name(op, sparse), kernel),
            );
        }
    }

    fn add_dense_pair<L: Element, R: Element>(&mut self, matrix_ops: bool) {
        self.add_pair::<L, R>(Density::Dense, Density::Dense, matrix_ops);
    }

    /// Dense `E ∘ E` for every operator, with in-place arithmetic when the
    /// result keeps the operand kind.
    fn add_same_kind<E: Element>(&mut self, matrix_ops: bool) {
        let reusable: Vec<KernelKey> = OperatorTag::all()
            .iter()
            .filter(|op| op.class() == OperatorClass::Arithmetic && op.is_elementwise())
            .filter(|op| self.table().result_kind(**op, E::KIND, E::KIND) == E::KIND)
            .map(|op| KernelKey::new(E::KIND, Density::Dense, E::KIND, Density::Dense, *op))
            .filter(|key| !self.entries.contains_key(key))
            .collect();
        self.add_dense_pair::<E, E>(matrix_ops);
        for key in reusable {
            if let Some(entry) = self.entries.get_mut(&key) {
                entry.in_place = Some(dense_elementwise_in_place::<E> as InPlaceFn);
            }
        }
    }

    /// Integer or bool `I` against both real float kinds, in both orders.
    fn add_with_floats<I: Element>(&mut self) {
        self.add_dense_pair::<I, f32>(false);
        self.add_dense_pair::<f32, I>(false);
        self.add_dense_pair::<I, f64>(false);
        self.add_dense_pair::<f64, I>(false);
    }

    /// `E` against every sparse-capable kind for the three sparse families.
    fn add_sparse_with<E: Element>(&mut self) {
        self.add_sparse_family::<E, bool>();
        self.add_sparse_family::<E, f64>();
        self.add_sparse_family::<E, Complex64>();
    }

    fn add_sparse_family<L: Element, R: Element>(&mut self) {
        // Sparse logical matrices have no matrix product of their own.
        let matrix_ops = !L::KIND.is_bool() && !R::KIND.is_bool();
        for (lhs, rhs) in SPARSE_FAMILIES {
            self.add_pair::<L, R>(lhs, rhs, matrix_ops);
        }
    }
}

static LATTICE_REGISTRY: OnceLock<KernelRegistry> = OnceLock::new();
static INTEGER_DOMINANT_REGISTRY: OnceLock<KernelRegistry> = OnceLock::new();

fn slot(policy: PromotionPolicy) -> &'static OnceLock<KernelRegistry> {
    match policy {
        PromotionPolicy::Lattice => &LATTICE_REGISTRY,
        PromotionPolicy::IntegerDominant => &INTEGER_DOMINANT_REGISTRY,
    }
}

/// Shared registry for `policy`, built with the builtin kernels on first use.
#[must_use]
pub fn shared_registry(policy: PromotionPolicy) -> &'static KernelRegistry {
    slot(policy).get_or_init(|| RegistryBuilder::new(policy).with_builtin_kernels().build())
}

/// Installs an extended registry as the shared one for its policy.
///
/// Must happen before the first [`shared_registry`] call for that policy.
pub fn install_registry(registry: KernelRegistry) -> Result<&'static KernelRegistry, RegistryError> {
    let policy = registry.policy;
    let slot = slot(policy);
    slot.set(registry)
        .map_err(|_| RegistryError::AlreadyInitialized { policy })?;
    slot.get().ok_or(RegistryError::AlreadyInitialized { policy })
}
