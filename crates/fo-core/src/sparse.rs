use std::ops::Range;

use crate::element::with_values;
use crate::{ArrayData, ArrayError, Element, ElementKind, Scalar, Shape, match_element_kind};

/// Compressed sparse column matrix. Explicit zeros are never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    rows: usize,
    cols: usize,
    col_ptr: Vec<usize>,
    row_idx: Vec<usize>,
    values: ArrayData,
}

impl SparseMatrix {
    pub fn from_parts(
        rows: usize,
        cols: usize,
        col_ptr: Vec<usize>,
        row_idx: Vec<usize>,
        values: ArrayData,
    ) -> Result<Self, ArrayError> {
        ensure_sparse_kind(values.kind())?;
        if col_ptr.len() != cols + 1 {
            return Err(ArrayError::InvalidSparseStructure {
                reason: "column pointer length must be cols + 1",
            });
        }
        if col_ptr.first() != Some(&0) {
            return Err(ArrayError::InvalidSparseStructure {
                reason: "column pointers must start at 0",
            });
        }
        if row_idx.len() != values.len() || col_ptr.last() != Some(&row_idx.len()) {
            return Err(ArrayError::InvalidSparseStructure {
                reason: "stored entry count disagrees with column pointers",
            });
        }
        for window in col_ptr.windows(2) {
            if window[0] > window[1] {
                return Err(ArrayError::InvalidSparseStructure {
                    reason: "column pointers must be non-decreasing",
                });
            }
            let column = &row_idx[window[0]..window[1]];
            if column.iter().any(|row| *row >= rows) {
                return Err(ArrayError::InvalidSparseStructure {
                    reason: "row index out of bounds",
                });
            }
            if column.windows(2).any(|pair| pair[0] >= pair[1]) {
                return Err(ArrayError::InvalidSparseStructure {
                    reason: "row indices must be strictly increasing within a column",
                });
            }
        }
        let matrix = Self {
            rows,
            cols,
            col_ptr,
            row_idx,
            values,
        };
        Ok(matrix.pruned())
    }

    pub fn zeros(rows: usize, cols: usize, kind: ElementKind) -> Result<Self, ArrayError> {
        ensure_sparse_kind(kind)?;
        Ok(Self {
            rows,
            cols,
            col_ptr: vec![0; cols + 1],
            row_idx: Vec::new(),
            values: ArrayData::zeros(kind, 0),
        })
    }

    /// Compresses a column-major dense buffer of `rows * cols` values.
    pub fn from_dense(rows: usize, cols: usize, data: &ArrayData) -> Result<Self, ArrayError> {
        ensure_sparse_kind(data.kind())?;
        let expected = rows.saturating_mul(cols);
        if data.len() != expected {
            return Err(ArrayError::ElementCountMismatch {
                shape: Shape::matrix(rows, cols),
                expected,
                actual: data.len(),
            });
        }
        Ok(with_values!(data, values => compress(rows, cols, values)))
    }

    /// Builds from `(row, col, value)` triplets; duplicates are rejected.
    pub fn from_triplets(
        rows: usize,
        cols: usize,
        kind: ElementKind,
        entries: &[(usize, usize, Scalar)],
    ) -> Result<Self, ArrayError> {
        ensure_sparse_kind(kind)?;
        let mut sorted: Vec<(usize, usize, Scalar)> = entries.to_vec();
        sorted.sort_by_key(|(row, col, _)| (*col, *row));
        if sorted
            .windows(2)
            .any(|pair| (pair[0].0, pair[0].1) == (pair[1].0, pair[1].1))
        {
            return Err(ArrayError::InvalidSparseStructure {
                reason: "duplicate coordinate",
            });
        }
        if sorted.iter().any(|(row, col, _)| *row >= rows || *col >= cols) {
            return Err(ArrayError::InvalidSparseStructure {
                reason: "triplet coordinate out of bounds",
            });
        }
        let matrix = match_element_kind!(kind, T => {
            let mut assembler = SparseAssembler::<T>::new(rows, cols);
            let mut next = sorted.iter().peekable();
            for col in 0..cols {
                while let Some((row, _, value)) = next.next_if(|(_, entry_col, _)| *entry_col == col) {
                    assembler.push(*row, value.to_element::<T>());
                }
                assembler.close_column();
            }
            assembler.finish()
        });
        Ok(matrix)
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[must_use]
    pub fn shape(&self) -> Shape {
        Shape::matrix(self.rows, self.cols)
    }

    #[must_use]
    pub fn nnz(&self) -> usize {
        self.row_idx.len()
    }

    #[must_use]
    pub fn kind(&self) -> ElementKind {
        self.values.kind()
    }

    #[must_use]
    pub fn col_ptr(&self) -> &[usize] {
        &self.col_ptr
    }

    #[must_use]
    pub fn row_idx(&self) -> &[usize] {
        &self.row_idx
    }

    #[must_use]
    pub fn values(&self) -> &ArrayData {
        &self.values
    }

    #[must_use]
    pub fn typed_values<E: Element>(&self) -> Option<&[E]> {
        E::slice(&self.values)
    }

    /// Positions in `row_idx`/`values` holding column `col`.
    #[must_use]
    pub fn column_range(&self, col: usize) -> Range<usize> {
        match (self.col_ptr.get(col), self.col_ptr.get(col + 1)) {
            (Some(start), Some(end)) => *start..*end,
            _ => 0..0,
        }
    }

    /// Element at `(row, col)`; structural zeros come back as a typed zero.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<Scalar> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        let range = self.column_range(col);
        match self.row_idx[range.clone()].binary_search(&row) {
            Ok(offset) => self.values.get(range.start + offset),
            Err(_) => Some(Scalar::zero(self.kind())),
        }
    }

    /// Column-major dense expansion as `E`, or `None` when `E` is not the stored kind.
    #[must_use]
    pub fn densify<E: Element>(&self) -> Option<Vec<E>> {
        self.typed_values::<E>().map(|values| scatter(self, values))
    }

    #[must_use]
    pub fn to_dense(&self) -> ArrayData {
        with_values!(&self.values, values => Element::wrap(scatter(self, values)))
    }

    /// Converts stored values to `target`, dropping entries that become zero.
    pub fn cast(&self, target: ElementKind) -> Result<Self, ArrayError> {
        ensure_sparse_kind(target)?;
        if target == self.kind() {
            return Ok(self.clone());
        }
        let converted = Self {
            rows: self.rows,
            cols: self.cols,
            col_ptr: self.col_ptr.clone(),
            row_idx: self.row_idx.clone(),
            values: self.values.cast(target),
        };
        Ok(converted.pruned())
    }

    fn pruned(self) -> Self {
        if self.values.count_nonzero() == self.nnz() {
            return self;
        }
        with_values!(&self.values, values => retain_nonzero(&self, values))
    }
}

fn ensure_sparse_kind(kind: ElementKind) -> Result<(), ArrayError> {
    if kind.supports_sparse() {
        Ok(())
    } else {
        Err(ArrayError::UnsupportedSparseKind { kind })
    }
}

fn compress<E: Element>(rows: usize, cols: usize, values: &[E]) -> SparseMatrix {
    let mut assembler = SparseAssembler::<E>::new(rows, cols);
    for col in 0..cols {
        for row in 0..rows {
            assembler.push(row, values[col * rows + row]);
        }
        assembler.close_column();
    }
    assembler.finish()
}

fn scatter<E: Element>(matrix: &SparseMatrix, values: &[E]) -> Vec<E> {
    let mut dense = vec![E::zero(); matrix.rows.saturating_mul(matrix.cols)];
    for col in 0..matrix.cols {
        for slot in matrix.column_range(col) {
            dense[col * matrix.rows + matrix.row_idx[slot]] = values[slot];
        }
    }
    dense
}

fn retain_nonzero<E: Element>(matrix: &SparseMatrix, values: &[E]) -> SparseMatrix {
    let mut assembler = SparseAssembler::<E>::new(matrix.rows, matrix.cols);
    for col in 0..matrix.cols {
        for slot in matrix.column_range(col) {
            assembler.push(matrix.row_idx[slot], values[slot]);
        }
        assembler.close_column();
    }
    assembler.finish()
}

/// Column-by-column CSC writer behind compression and conversion.
///
/// Rows must be pushed in increasing order within a column and every column
/// must be closed, in order, before [`SparseAssembler::finish`].
#[derive(Debug)]
pub(crate) struct SparseAssembler<E: Element> {
    rows: usize,
    cols: usize,
    col_ptr: Vec<usize>,
    row_idx: Vec<usize>,
    values: Vec<E>,
}

impl<E: Element> SparseAssembler<E> {
    #[must_use]
    pub(crate) fn new(rows: usize, cols: usize) -> Self {
        let mut col_ptr = Vec::with_capacity(cols + 1);
        col_ptr.push(0);
        Self {
            rows,
            cols,
            col_ptr,
            row_idx: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Appends an entry to the open column; zeros are skipped.
    pub(crate) fn push(&mut self, row: usize, value: E) {
        if !value.is_zero() {
            self.row_idx.push(row);
            self.values.push(value);
        }
    }

    pub(crate) fn close_column(&mut self) {
        self.col_ptr.push(self.row_idx.len());
    }

    #[must_use]
    pub(crate) fn finish(mut self) -> SparseMatrix {
        while self.col_ptr.len() < self.cols + 1 {
            self.col_ptr.push(self.row_idx.len());
        }
        SparseMatrix {
            rows: self.rows,
            cols: self.cols,
            col_ptr: self.col_ptr,
            row_idx: self.row_idx,
            values: E::wrap(self.values),
        }
    }
}
