use fo_core::{
    ArrayData, Density, Element, ElementKind, Numeric, SparseMatrix, TypedArray,
    match_element_kind,
};

use crate::{KernelError, ResultPlan};

/// Stores domain values into a buffer of `kind`, saturating and rounding.
#[must_use]
pub fn store_numeric<N: Numeric>(kind: ElementKind, values: Vec<N>) -> ArrayData {
    match_element_kind!(kind, T => T::wrap(values.into_iter().map(|value| T::store(value)).collect()))
}

/// Produces the array a [`ResultPlan`] describes.
#[derive(Debug, Clone, Copy)]
pub struct ResultBuilder<'a> {
    plan: &'a ResultPlan,
}

impl<'a> ResultBuilder<'a> {
    #[must_use]
    pub fn new(plan: &'a ResultPlan) -> Self {
        Self { plan }
    }

    #[must_use]
    pub fn plan(&self) -> &ResultPlan {
        self.plan
    }

    /// Column-major values for the whole planned shape, compressed when the plan is sparse.
    pub fn finish_data(&self, data: ArrayData) -> Result<TypedArray, KernelError> {
        if data.kind() != self.plan.kind || data.len() != self.plan.shape.numel() {
            return Err(self.mismatch(&data));
        }
        match self.plan.density {
            Density::Dense => Ok(TypedArray::dense(self.plan.shape.clone(), data)?),
            Density::Sparse => {
                let (rows, cols) = self.sparse_dims()?;
                Ok(TypedArray::sparse(SparseMatrix::from_dense(rows, cols, &data)?))
            }
        }
    }

    pub fn finish_numeric<N: Numeric>(&self, values: Vec<N>) -> Result<TypedArray, KernelError> {
        self.finish_data(store_numeric(self.plan.kind, values))
    }

    /// Compressed columns for a sparse plan; entries that stored as zero are dropped.
    pub fn finish_sparse(
        &self,
        col_ptr: Vec<usize>,
        row_idx: Vec<usize>,
        values: ArrayData,
    ) -> Result<TypedArray, KernelError> {
        if self.plan.density != Density::Sparse || values.kind() != self.plan.kind {
            return Err(self.mismatch(&values));
        }
        let (rows, cols) = self.sparse_dims()?;
        Ok(TypedArray::sparse(SparseMatrix::from_parts(
            rows, cols, col_ptr, row_idx, values,
        )?))
    }

    pub fn finish_sparse_numeric<N: Numeric>(
        &self,
        col_ptr: Vec<usize>,
        row_idx: Vec<usize>,
        values: Vec<N>,
    ) -> Result<TypedArray, KernelError> {
        self.finish_sparse(col_ptr, row_idx, store_numeric(self.plan.kind, values))
    }

    /// Whether `candidate` may receive the result in place.
    ///
    /// Only checks layout; the caller must separately prove exclusive ownership.
    #[must_use]
    pub fn can_reuse(plan: &ResultPlan, candidate: &TypedArray) -> bool {
        candidate.density() == Density::Dense
            && plan.density == Density::Dense
            && candidate.kind() == plan.kind
            && candidate.shape() == &plan.shape
    }

    fn sparse_dims(&self) -> Result<(usize, usize), KernelError> {
        self.plan
            .shape
            .matrix_dims()
            .ok_or(KernelError::Array(fo_core::ArrayError::SparseRankMismatch {
                rank: self.plan.shape.rank(),
            }))
    }

    fn mismatch(&self, data: &ArrayData) -> KernelError {
        KernelError::ResultMismatch {
            expected: self.plan.clone(),
            actual_kind: data.kind(),
            actual_len: data.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use fo_core::{ArrayData, Density, ElementKind, Scalar, Shape, TypedArray};

    use super::{ResultBuilder, store_numeric};
    use crate::{KernelError, ResultPlan};

    fn plan(kind: ElementKind, density: Density, shape: [usize; 2]) -> ResultPlan {
        ResultPlan {
            kind,
            density,
            shape: Shape::from(shape),
        }
    }

    #[test]
    fn finish_numeric_saturates_into_plan_kind() {
        let plan = plan(ElementKind::Int8, Density::Dense, [1, 3]);
        let out = ResultBuilder::new(&plan)
            .finish_numeric(vec![200_i128, -3, -500])
            .expect("int8 result");
        assert_eq!(
            out.to_scalars(),
            vec![Scalar::Int8(127), Scalar::Int8(-3), Scalar::Int8(-128)]
        );
    }

    #[test]
    fn finish_compresses_sparse_plans() {
        let plan = plan(ElementKind::Float64, Density::Sparse, [2, 2]);
        let out = ResultBuilder::new(&plan)
            .finish_numeric(vec![0.0_f64, 1.0, 0.0, f64::INFINITY])
            .expect("sparse result");
        assert_eq!(out.sparse_matrix().map(|matrix| matrix.nnz()), Some(2));
    }

    #[test]
    fn finish_rejects_wrong_count() {
        let plan = plan(ElementKind::Bool, Density::Dense, [2, 2]);
        let err = ResultBuilder::new(&plan)
            .finish_data(ArrayData::Bool(vec![true]))
            .expect_err("one value for four slots");
        assert!(matches!(err, KernelError::ResultMismatch { actual_len: 1, .. }));
    }

    #[test]
    fn can_reuse_requires_matching_dense_candidate() {
        let plan = plan(ElementKind::Float64, Density::Dense, [1, 2]);
        assert!(ResultBuilder::can_reuse(&plan, &TypedArray::row(vec![1.0_f64, 2.0])));
        assert!(!ResultBuilder::can_reuse(&plan, &TypedArray::row(vec![1.0_f32, 2.0])));
        assert!(!ResultBuilder::can_reuse(&plan, &TypedArray::row(vec![1.0_f64])));
    }

    #[test]
    fn store_numeric_converts_complex_to_bool() {
        let data = store_numeric(
            ElementKind::Bool,
            vec![fo_core::Complex64::new(0.0, 1.0), fo_core::Complex64::new(0.0, 0.0)],
        );
        assert_eq!(data, ArrayData::Bool(vec![true, false]));
    }
}
