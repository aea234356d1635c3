use fo_core::{Shape, column_major_strides};

/// Walks an output shape in column-major order, yielding the matching
/// linear index into each broadcast operand.
#[derive(Debug, Clone)]
pub(crate) struct BroadcastIter {
    dims: Vec<usize>,
    counter: Vec<usize>,
    lhs_strides: Vec<usize>,
    rhs_strides: Vec<usize>,
    lhs_offset: usize,
    rhs_offset: usize,
    remaining: usize,
}

impl BroadcastIter {
    pub(crate) fn new(lhs: &Shape, rhs: &Shape, out: &Shape) -> Self {
        let rank = out.rank().max(lhs.rank()).max(rhs.rank());
        let dims: Vec<usize> = (0..rank).map(|axis| out.dim(axis)).collect();
        Self {
            counter: vec![0; rank],
            lhs_strides: operand_strides(lhs, rank),
            rhs_strides: operand_strides(rhs, rank),
            lhs_offset: 0,
            rhs_offset: 0,
            remaining: dims.iter().product(),
            dims,
        }
    }
}

fn operand_strides(shape: &Shape, rank: usize) -> Vec<usize> {
    let padded: Vec<usize> = (0..rank).map(|axis| shape.dim(axis)).collect();
    column_major_strides(&padded)
        .into_iter()
        .zip(&padded)
        .map(|(stride, size)| if *size == 1 { 0 } else { stride })
        .collect()
}

impl Iterator for BroadcastIter {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let item = (self.lhs_offset, self.rhs_offset);
        for axis in 0..self.dims.len() {
            self.counter[axis] += 1;
            self.lhs_offset += self.lhs_strides[axis];
            self.rhs_offset += self.rhs_strides[axis];
            if self.counter[axis] < self.dims[axis] {
                break;
            }
            self.lhs_offset -= self.lhs_strides[axis] * self.dims[axis];
            self.rhs_offset -= self.rhs_strides[axis] * self.dims[axis];
            self.counter[axis] = 0;
        }
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for BroadcastIter {}
