//! Confusion (contingency) matrices between two label assignments.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::IndexPolicy;
use crate::labels::{LabelAssignment, NOISE_LABEL};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContingencyError {
    #[error("label sequences differ in length: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },
    #[error("cannot build a confusion matrix from empty labels")]
    Empty,
    #[error("dense extent {extent} exceeds limit {limit}; use sparse indexing for large or non-contiguous ids")]
    DenseExtentTooLarge { extent: usize, limit: usize },
    #[error("{labels} distinct labels on one axis exceed limit {limit}")]
    TooManyLabels { labels: usize, limit: usize },
    #[error("label {label} has no row/column in the matrix")]
    UnknownLabel { label: i64 },
}

/// Raw co-occurrence counts between method A (rows) and method B (columns).
///
/// Row/column label vectors are ascending, so the noise label (if present)
/// always sits at index 0.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfusionMatrix {
    counts: DMatrix<u64>,
    row_labels: Vec<i64>,
    col_labels: Vec<i64>,
    total: u64,
}

impl ConfusionMatrix {
    pub fn rows(&self) -> usize {
        self.counts.nrows()
    }

    pub fn cols(&self) -> usize {
        self.counts.ncols()
    }

    pub fn get(&self, row: usize, col: usize) -> u64 {
        self.counts[(row, col)]
    }

    pub fn counts(&self) -> &DMatrix<u64> {
        &self.counts
    }

    pub fn row_labels(&self) -> &[i64] {
        &self.row_labels
    }

    pub fn col_labels(&self) -> &[i64] {
        &self.col_labels
    }

    /// Sum of all cells; the number of compared points for a built matrix.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Points both methods left unassigned: the `(-1, -1)` cell, or 0.
    pub fn noise_cell(&self) -> u64 {
        match (self.row_labels.first(), self.col_labels.first()) {
            (Some(&NOISE_LABEL), Some(&NOISE_LABEL)) => self.counts[(0, 0)],
            _ => 0,
        }
    }

    /// The matrix with the noise row and column removed. Its total counts
    /// only points labelled by both methods.
    pub fn without_noise(&self) -> ConfusionMatrix {
        let rows: Vec<usize> = (0..self.rows())
            .filter(|&r| self.row_labels[r] != NOISE_LABEL)
            .collect();
        let cols: Vec<usize> = (0..self.cols())
            .filter(|&c| self.col_labels[c] != NOISE_LABEL)
            .collect();
        let counts = DMatrix::from_fn(rows.len(), cols.len(), |r, c| {
            self.counts[(rows[r], cols[c])]
        });
        let total: u64 = counts.iter().sum();
        ConfusionMatrix {
            counts,
            row_labels: rows.iter().map(|&r| self.row_labels[r]).collect(),
            col_labels: cols.iter().map(|&c| self.col_labels[c]).collect(),
            total,
        }
    }

    pub fn to_table(&self) -> ContingencyTable {
        let counts = (0..self.rows())
            .map(|r| (0..self.cols()).map(|c| self.counts[(r, c)]).collect())
            .collect();
        ContingencyTable {
            counts,
            row_labels: self.row_labels.clone(),
            col_labels: self.col_labels.clone(),
        }
    }
}

/// Serialized form of a confusion matrix for external visualization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContingencyTable {
    pub counts: Vec<Vec<u64>>,
    pub row_labels: Vec<i64>,
    pub col_labels: Vec<i64>,
}

#[derive(Debug, Clone, Copy)]
pub struct ConfusionMatrixBuilder {
    policy: IndexPolicy,
    max_axis_labels: usize,
}

impl Default for ConfusionMatrixBuilder {
    fn default() -> Self {
        Self {
            policy: IndexPolicy::Dense,
            max_axis_labels: 4096,
        }
    }
}

impl ConfusionMatrixBuilder {
    /// `Auto` is treated as `Dense`; resolve it against the input kind first
    /// if tabular inputs should get sparse indexing.
    pub fn new(policy: IndexPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Cap on labels per axis: the dense extent, or the distinct count when sparse.
    pub fn with_max_axis_labels(mut self, limit: usize) -> Self {
        self.max_axis_labels = limit;
        self
    }

    pub fn build(
        &self,
        a: &LabelAssignment,
        b: &LabelAssignment,
    ) -> Result<ConfusionMatrix, ContingencyError> {
        if a.is_empty() || b.is_empty() {
            return Err(ContingencyError::Empty);
        }
        if a.len() != b.len() {
            return Err(ContingencyError::LengthMismatch {
                left: a.len(),
                right: b.len(),
            });
        }

        let row_labels = self.axis_labels(a)?;
        let col_labels = self.axis_labels(b)?;
        let mut counts = DMatrix::<u64>::zeros(row_labels.len(), col_labels.len());

        for (&la, &lb) in a.labels().iter().zip(b.labels()) {
            let r = axis_index(&row_labels, la)?;
            let c = axis_index(&col_labels, lb)?;
            counts[(r, c)] += 1;
        }

        Ok(ConfusionMatrix {
            counts,
            row_labels,
            col_labels,
            total: a.len() as u64,
        })
    }

    fn axis_labels(&self, assignment: &LabelAssignment) -> Result<Vec<i64>, ContingencyError> {
        match self.policy {
            IndexPolicy::Sparse => {
                let distinct = assignment.distinct();
                if distinct.len() > self.max_axis_labels {
                    return Err(ContingencyError::TooManyLabels {
                        labels: distinct.len(),
                        limit: self.max_axis_labels,
                    });
                }
                Ok(distinct.into_iter().collect())
            }
            IndexPolicy::Dense | IndexPolicy::Auto => {
                let mut labels = Vec::new();
                if assignment.contains_noise() {
                    labels.push(NOISE_LABEL);
                }
                if let Some(max) = assignment.max_label() {
                    let extent = usize::try_from(max)
                        .ok()
                        .and_then(|m| m.checked_add(1))
                        .unwrap_or(usize::MAX);
                    if extent > self.max_axis_labels {
                        return Err(ContingencyError::DenseExtentTooLarge {
                            extent,
                            limit: self.max_axis_labels,
                        });
                    }
                    labels.extend(0..=max);
                }
                Ok(labels)
            }
        }
    }
}

fn axis_index(labels: &[i64], label: i64) -> Result<usize, ContingencyError> {
    labels
        .binary_search(&label)
        .map_err(|_| ContingencyError::UnknownLabel { label })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn la(labels: &[i64]) -> LabelAssignment {
        LabelAssignment::new(labels.to_vec()).unwrap()
    }

    #[test]
    fn dense_matrix_covers_full_range() {
        let m = ConfusionMatrixBuilder::new(IndexPolicy::Dense)
            .build(&la(&[0, 0, 2]), &la(&[1, 1, 0]))
            .unwrap();
        assert_eq!(m.rows(), 3);
        assert_eq!(m.cols(), 2);
        assert_eq!(m.row_labels(), &[0, 1, 2]);
        assert_eq!(m.get(0, 1), 2);
        assert_eq!(m.get(2, 0), 1);
        assert_eq!(m.get(1, 0) + m.get(1, 1), 0);
        assert_eq!(m.counts().iter().sum::<u64>(), 3);
    }

    #[test]
    fn sparse_matrix_uses_observed_labels() {
        let m = ConfusionMatrixBuilder::new(IndexPolicy::Sparse)
            .build(&la(&[10, 10, 300, 7]), &la(&[4, 4, 9, 4]))
            .unwrap();
        assert_eq!(m.row_labels(), &[7, 10, 300]);
        assert_eq!(m.col_labels(), &[4, 9]);
        assert_eq!(m.get(1, 0), 2);
        assert_eq!(m.get(2, 1), 1);
        assert_eq!(m.get(0, 0), 1);
        assert_eq!(m.total(), 4);
    }

    #[test]
    fn dense_matrix_gives_noise_its_own_row() {
        let m = ConfusionMatrixBuilder::new(IndexPolicy::Dense)
            .build(&la(&[0, 1, -1]), &la(&[0, 1, 1]))
            .unwrap();
        assert_eq!(m.row_labels(), &[-1, 0, 1]);
        assert_eq!(m.col_labels(), &[0, 1]);
        assert_eq!(m.get(0, 1), 1);
        assert_eq!(m.counts().iter().sum::<u64>(), 3);
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let err = ConfusionMatrixBuilder::default()
            .build(&la(&[0, 1]), &la(&[0]))
            .unwrap_err();
        assert_eq!(err, ContingencyError::LengthMismatch { left: 2, right: 1 });
    }

    #[test]
    fn dense_extent_is_capped() {
        let err = ConfusionMatrixBuilder::new(IndexPolicy::Dense)
            .with_max_axis_labels(10)
            .build(&la(&[0, 50]), &la(&[0, 1]))
            .unwrap_err();
        assert_eq!(
            err,
            ContingencyError::DenseExtentTooLarge {
                extent: 51,
                limit: 10
            }
        );
    }

    #[test]
    fn table_preserves_dimension_order() {
        let m = ConfusionMatrixBuilder::new(IndexPolicy::Sparse)
            .build(&la(&[3, 1, 1]), &la(&[0, 5, 5]))
            .unwrap();
        let table = m.to_table();
        assert_eq!(table.row_labels, vec![1, 3]);
        assert_eq!(table.col_labels, vec![0, 5]);
        assert_eq!(table.counts, vec![vec![0, 2], vec![1, 0]]);
    }

    #[test]
    fn sparse_axis_is_capped() {
        let many: Vec<i64> = (0..20).map(|i| i * 1000).collect();
        let err = ConfusionMatrixBuilder::new(IndexPolicy::Sparse)
            .with_max_axis_labels(10)
            .build(&la(&many), &la(&[0; 20]))
            .unwrap_err();
        assert_eq!(
            err,
            ContingencyError::TooManyLabels {
                labels: 20,
                limit: 10
            }
        );
    }

    #[test]
    fn noise_free_core_drops_noise_row_and_column() {
        let m = ConfusionMatrixBuilder::new(IndexPolicy::Dense)
            .build(&la(&[0, 0, 1, -1, -1, -1]), &la(&[0, -1, 1, -1, 2, 2]))
            .unwrap();
        assert_eq!(m.noise_cell(), 1);

        let core = m.without_noise();
        assert_eq!(core.row_labels(), &[0, 1]);
        assert_eq!(core.col_labels(), &[0, 1, 2]);
        assert_eq!(core.get(0, 0), 1);
        assert_eq!(core.get(1, 1), 1);
        assert_eq!(core.total(), 2);
        assert_eq!(core.noise_cell(), 0);
    }
}
