//! Optimal label matching on a confusion matrix.
//!
//! The solver is a rectangular minimum-cost assignment (shortest augmenting
//! path form of the Hungarian algorithm). [`OptimalMatcher`] owns the sign
//! convention: counts are negated into costs, and the total cost is negated
//! back into a matched count.

use nalgebra::DMatrix;
use thiserror::Error;

use crate::contingency::ConfusionMatrix;

#[derive(Debug, Error, PartialEq)]
pub enum MatchingError {
    #[error("cost matrix contains a non-finite entry at ({row}, {col})")]
    NonFiniteCost { row: usize, col: usize },
    #[error("assignment problem is infeasible")]
    Infeasible,
    #[error("matched count {from_costs} disagrees with matrix sum {from_counts}")]
    Inconsistent { from_costs: f64, from_counts: u64 },
}

/// Minimum-cost assignment for an `R x C` cost matrix.
///
/// Returns `min(R, C)` `(row, col)` pairs sorted by row. Ties resolve by a
/// fixed scan order, so equal inputs always give equal outputs.
pub fn linear_sum_assignment(cost: &DMatrix<f64>) -> Result<Vec<(usize, usize)>, MatchingError> {
    let (nr, nc) = cost.shape();
    if nr == 0 || nc == 0 {
        return Ok(Vec::new());
    }
    for r in 0..nr {
        for c in 0..nc {
            if !cost[(r, c)].is_finite() {
                return Err(MatchingError::NonFiniteCost { row: r, col: c });
            }
        }
    }

    // The solver wants rows <= cols.
    let transpose = nc < nr;
    let work = if transpose {
        cost.transpose()
    } else {
        cost.clone()
    };

    let col4row = SolverState::new(&work).solve()?;

    let mut pairs: Vec<(usize, usize)> = col4row
        .into_iter()
        .enumerate()
        .filter_map(|(row, col)| col.map(|c| if transpose { (c, row) } else { (row, c) }))
        .collect();
    pairs.sort_unstable();
    Ok(pairs)
}

struct SolverState<'a> {
    cost: &'a DMatrix<f64>,
    u: Vec<f64>,
    v: Vec<f64>,
    shortest: Vec<f64>,
    path: Vec<usize>,
    col4row: Vec<Option<usize>>,
    row4col: Vec<Option<usize>>,
    seen_rows: Vec<bool>,
    seen_cols: Vec<bool>,
    remaining: Vec<usize>,
}

impl<'a> SolverState<'a> {
    fn new(cost: &'a DMatrix<f64>) -> Self {
        let (nr, nc) = cost.shape();
        Self {
            cost,
            u: vec![0.0; nr],
            v: vec![0.0; nc],
            shortest: vec![f64::INFINITY; nc],
            path: vec![0; nc],
            col4row: vec![None; nr],
            row4col: vec![None; nc],
            seen_rows: vec![false; nr],
            seen_cols: vec![false; nc],
            remaining: vec![0; nc],
        }
    }

    fn solve(mut self) -> Result<Vec<Option<usize>>, MatchingError> {
        let nr = self.cost.nrows();
        let nc = self.cost.ncols();

        for cur_row in 0..nr {
            let (sink, min_val) = self.augmenting_path(cur_row)?;

            // Update dual variables.
            self.u[cur_row] += min_val;
            for i in 0..nr {
                if self.seen_rows[i] && i != cur_row {
                    if let Some(j) = self.col4row[i] {
                        self.u[i] += min_val - self.shortest[j];
                    }
                }
            }
            for j in 0..nc {
                if self.seen_cols[j] {
                    self.v[j] -= min_val - self.shortest[j];
                }
            }

            // Flip the augmenting path back to cur_row.
            let mut j = sink;
            loop {
                let i = self.path[j];
                self.row4col[j] = Some(i);
                let previous = self.col4row[i].replace(j);
                if i == cur_row {
                    break;
                }
                j = previous.ok_or(MatchingError::Infeasible)?;
            }
        }

        Ok(self.col4row)
    }

    /// Dijkstra-style search from `start_row` to the nearest free column.
    fn augmenting_path(&mut self, start_row: usize) -> Result<(usize, f64), MatchingError> {
        let nc = self.cost.ncols();
        let mut min_val = 0.0;
        let mut num_remaining = nc;
        for (it, slot) in self.remaining.iter_mut().enumerate() {
            *slot = nc - it - 1;
        }
        self.seen_rows.fill(false);
        self.seen_cols.fill(false);
        self.shortest.fill(f64::INFINITY);

        let mut i = start_row;
        loop {
            let mut index = None;
            let mut lowest = f64::INFINITY;
            self.seen_rows[i] = true;

            for it in 0..num_remaining {
                let j = self.remaining[it];
                let reduced = min_val + self.cost[(i, j)] - self.u[i] - self.v[j];
                if reduced < self.shortest[j] {
                    self.path[j] = i;
                    self.shortest[j] = reduced;
                }
                if self.shortest[j] < lowest
                    || (self.shortest[j] == lowest && self.row4col[j].is_none())
                {
                    lowest = self.shortest[j];
                    index = Some(it);
                }
            }

            min_val = lowest;
            let index = match index {
                Some(idx) if min_val.is_finite() => idx,
                _ => return Err(MatchingError::Infeasible),
            };

            let j = self.remaining[index];
            self.seen_cols[j] = true;
            num_remaining -= 1;
            self.remaining[index] = self.remaining[num_remaining];

            match self.row4col[j] {
                None => return Ok((j, min_val)),
                Some(row) => i = row,
            }
        }
    }
}

/// Row/column index pairs maximizing the matched count of a confusion matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimalMatching {
    pairs: Vec<(usize, usize)>,
    matched: u64,
}

impl OptimalMatching {
    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    /// Sum of confusion-matrix cells at the matched pairs.
    pub fn matched(&self) -> u64 {
        self.matched
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OptimalMatcher;

impl OptimalMatcher {
    pub fn solve(&self, matrix: &ConfusionMatrix) -> Result<OptimalMatching, MatchingError> {
        let cost = matrix.counts().map(|c| -(c as f64));
        let pairs = linear_sum_assignment(&cost)?;

        let total_cost: f64 = pairs.iter().map(|&(r, c)| cost[(r, c)]).sum();
        let from_costs = -total_cost;
        let matched: u64 = pairs.iter().map(|&(r, c)| matrix.get(r, c)).sum();
        if (from_costs - matched as f64).abs() > 0.5 {
            return Err(MatchingError::Inconsistent {
                from_costs,
                from_counts: matched,
            });
        }

        Ok(OptimalMatching { pairs, matched })
    }
}
