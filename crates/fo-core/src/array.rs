use std::sync::atomic::{AtomicU64, Ordering};

use crate::element::with_values;
use crate::{ArrayData, ArrayError, Density, Element, ElementKind, Scalar, Shape, SparseMatrix};

static NEXT_ARRAY_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_STORAGE_ID: AtomicU64 = AtomicU64::new(1);

fn next_array_id() -> u64 {
    NEXT_ARRAY_ID.fetch_add(1, Ordering::Relaxed)
}

fn next_storage_id() -> u64 {
    NEXT_STORAGE_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    Dense(ArrayData),
    Sparse(SparseMatrix),
}

/// An interpreter value: element kind, shape, density and buffer, plus identity.
///
/// `storage_id` names the buffer. It survives in-place writes, which bump
/// `version` instead.
#[derive(Debug, Clone)]
pub struct TypedArray {
    id: u64,
    storage_id: u64,
    version: u64,
    shape: Shape,
    storage: Storage,
}

impl TypedArray {
    pub fn dense(shape: impl Into<Shape>, data: ArrayData) -> Result<Self, ArrayError> {
        let shape = shape.into();
        let expected = shape.numel();
        if data.len() != expected {
            return Err(ArrayError::ElementCountMismatch {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self::with_storage(shape, Storage::Dense(data)))
    }

    pub fn from_vec<E: Element>(shape: impl Into<Shape>, values: Vec<E>) -> Result<Self, ArrayError> {
        Self::dense(shape, E::wrap(values))
    }

    /// A `1xN` row vector.
    #[must_use]
    pub fn row<E: Element>(values: Vec<E>) -> Self {
        let shape = Shape::matrix(1, values.len());
        Self::with_storage(shape, Storage::Dense(E::wrap(values)))
    }

    #[must_use]
    pub fn scalar(value: Scalar) -> Self {
        Self::with_storage(Shape::scalar(), Storage::Dense(ArrayData::filled(value, 1)))
    }

    #[must_use]
    pub fn from_scalar<E: Element>(value: E) -> Self {
        Self::scalar(value.into_scalar())
    }

    #[must_use]
    pub fn sparse(matrix: SparseMatrix) -> Self {
        let shape = matrix.shape();
        Self::with_storage(shape, Storage::Sparse(matrix))
    }

    pub fn zeros(kind: ElementKind, density: Density, shape: impl Into<Shape>) -> Result<Self, ArrayError> {
        let shape = shape.into();
        match density {
            Density::Dense => Ok(Self::with_storage(
                shape.clone(),
                Storage::Dense(ArrayData::zeros(kind, shape.numel())),
            )),
            Density::Sparse => {
                let (rows, cols) = shape.matrix_dims().ok_or(ArrayError::SparseRankMismatch {
                    rank: shape.rank(),
                })?;
                Ok(Self::sparse(SparseMatrix::zeros(rows, cols, kind)?))
            }
        }
    }

    fn with_storage(shape: Shape, storage: Storage) -> Self {
        Self {
            id: next_array_id(),
            storage_id: next_storage_id(),
            version: 0,
            shape,
            storage,
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn storage_id(&self) -> u64 {
        self.storage_id
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[must_use]
    pub fn kind(&self) -> ElementKind {
        match &self.storage {
            Storage::Dense(data) => data.kind(),
            Storage::Sparse(matrix) => matrix.kind(),
        }
    }

    #[must_use]
    pub fn density(&self) -> Density {
        match &self.storage {
            Storage::Dense(_) => Density::Dense,
            Storage::Sparse(_) => Density::Sparse,
        }
    }

    #[must_use]
    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    #[must_use]
    pub fn is_scalar(&self) -> bool {
        self.shape.is_scalar()
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn dense_data(&self) -> Option<&ArrayData> {
        match &self.storage {
            Storage::Dense(data) => Some(data),
            Storage::Sparse(_) => None,
        }
    }

    #[must_use]
    pub fn sparse_matrix(&self) -> Option<&SparseMatrix> {
        match &self.storage {
            Storage::Sparse(matrix) => Some(matrix),
            Storage::Dense(_) => None,
        }
    }

    #[must_use]
    pub fn dense_values<E: Element>(&self) -> Option<&[E]> {
        self.dense_data().and_then(E::slice)
    }

    /// Element at column-major `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Scalar> {
        match &self.storage {
            Storage::Dense(data) => data.get(index),
            Storage::Sparse(matrix) => {
                let rows = matrix.rows();
                if rows == 0 {
                    return None;
                }
                matrix.get(index % rows, index / rows)
            }
        }
    }

    /// All elements in column-major order, expanding sparse storage.
    #[must_use]
    pub fn to_scalars(&self) -> Vec<Scalar> {
        match &self.storage {
            Storage::Dense(data) => data.to_scalars(),
            Storage::Sparse(matrix) => matrix.to_dense().to_scalars(),
        }
    }

    /// Dense copy with a fresh identity; dense inputs are copied as-is.
    #[must_use]
    pub fn to_dense(&self) -> TypedArray {
        let data = match &self.storage {
            Storage::Dense(data) => data.clone(),
            Storage::Sparse(matrix) => matrix.to_dense(),
        };
        Self::with_storage(self.shape.clone(), Storage::Dense(data))
    }

    /// Copy of the buffer under a fresh identity.
    #[must_use]
    pub fn duplicate(&self) -> TypedArray {
        Self::with_storage(self.shape.clone(), self.storage.clone())
    }

    /// Copy converted to `target`, keeping density.
    pub fn converted(&self, target: ElementKind) -> Result<TypedArray, ArrayError> {
        let storage = match &self.storage {
            Storage::Dense(data) => Storage::Dense(data.cast(target)),
            Storage::Sparse(matrix) => Storage::Sparse(matrix.cast(target)?),
        };
        Ok(Self::with_storage(self.shape.clone(), storage))
    }

    /// Runs `write` against the dense buffer and bumps `version`.
    ///
    /// Returns `None` for sparse storage. The buffer keeps its `storage_id`.
    pub fn write_dense_in_place<R>(&mut self, write: impl FnOnce(&mut ArrayData) -> R) -> Option<R> {
        match &mut self.storage {
            Storage::Dense(data) => {
                let out = write(data);
                self.version += 1;
                Some(out)
            }
            Storage::Sparse(_) => None,
        }
    }

    /// Value equality over kind, density, shape and elements; NaN equals NaN.
    #[must_use]
    pub fn same_values(&self, other: &TypedArray) -> bool {
        self.kind() == other.kind()
            && self.density() == other.density()
            && self.shape == other.shape
            && self
                .to_scalars()
                .iter()
                .zip(other.to_scalars())
                .all(|(lhs, rhs)| lhs.same_value(rhs))
    }

    /// Stable content fingerprint (FNV-1a over kind, density, shape, elements).
    #[must_use]
    pub fn fingerprint64(&self) -> u64 {
        let mut hash = 0xcbf2_9ce4_8422_2325_u64;
        let mut feed = |bytes: &[u8]| {
            for byte in bytes {
                hash ^= u64::from(*byte);
                hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
            }
        };
        feed(self.kind().name().as_bytes());
        feed(self.density().name().as_bytes());
        for size in self.shape.dims() {
            feed(&(*size as u64).to_le_bytes());
        }
        let dense = match &self.storage {
            Storage::Dense(data) => data.clone(),
            Storage::Sparse(matrix) => matrix.to_dense(),
        };
        with_values!(&dense, values => {
            for value in values {
                feed(format!("{value:?}").as_bytes());
            }
        });
        hash
    }
}
