//! Lazy candidate sequences produced by [`Space::extract`](super::Space::extract).

use super::value::{ParamValue, ParamVector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// Cartesian product of the per-axis values, last axis varying fastest.
    Product,
    /// Element-wise zip of equally long per-axis samples.
    Zipped,
}

/// A lazy sequence of parameter vectors with a known total.
///
/// Only the per-axis value lists are materialised; each vector is assembled
/// on demand, so a grid of millions of points costs memory proportional to
/// the sum of the axis lengths.
#[derive(Debug, Clone)]
pub struct Candidates {
    columns: Vec<Vec<ParamValue>>,
    layout: Layout,
    next: usize,
    total: usize,
}

impl Candidates {
    pub(crate) fn product(columns: Vec<Vec<ParamValue>>) -> Option<Self> {
        let total = columns
            .iter()
            .try_fold(1usize, |acc, col| acc.checked_mul(col.len()))?;
        Some(Self {
            columns,
            layout: Layout::Product,
            next: 0,
            total,
        })
    }

    pub(crate) fn zipped(columns: Vec<Vec<ParamValue>>) -> Self {
        let total = if columns.is_empty() {
            1
        } else {
            columns.iter().map(Vec::len).min().unwrap_or(0)
        };
        Self {
            columns,
            layout: Layout::Zipped,
            next: 0,
            total,
        }
    }

    /// Total number of vectors in the sequence, including those already yielded.
    pub fn total(&self) -> usize {
        self.total
    }

    fn vector_at(&self, index: usize) -> ParamVector {
        match self.layout {
            Layout::Zipped => self.columns.iter().map(|c| c[index].clone()).collect(),
            Layout::Product => {
                let mut point = vec![ParamValue::Int(0); self.columns.len()];
                let mut rest = index;
                for (slot, column) in point.iter_mut().zip(&self.columns).rev() {
                    *slot = column[rest % column.len()].clone();
                    rest /= column.len();
                }
                point
            }
        }
    }
}

impl Iterator for Candidates {
    type Item = ParamVector;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total {
            return None;
        }
        let point = self.vector_at(self.next);
        self.next += 1;
        Some(point)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.total - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Candidates {}
