use std::time::Instant;

use super::{ReconciliationModel, RowBound, Solver};
use crate::{Error, Result};

/// Exact depth-first search over column values in column order.
///
/// For every row the search tracks the partial sum of assigned columns and
/// the least and greatest amounts the unassigned columns could still add.
/// A branch is cut as soon as some row can no longer reach its bound.
#[derive(Debug, Clone, Default)]
pub struct BacktrackingSolver {
    /// Give up with [`Error::Solver`] after visiting this many nodes.
    pub max_nodes: Option<u64>,
}

impl BacktrackingSolver {
    pub fn with_max_nodes(max_nodes: u64) -> Self {
        Self { max_nodes: Some(max_nodes) }
    }
}

struct SearchState<'a> {
    model: &'a ReconciliationModel,
    /// Sum of assigned columns per row.
    partial: Vec<i64>,
    /// Least and greatest contribution of unassigned columns per row.
    lo: Vec<i64>,
    hi: Vec<i64>,
}

impl<'a> SearchState<'a> {
    fn new(model: &'a ReconciliationModel) -> Self {
        let n_rows = model.rows().len();
        let mut lo = vec![0; n_rows];
        let mut hi = vec![0; n_rows];
        for column in model.columns() {
            for &(row, coeff) in &column.entries {
                let (a, b) = (coeff * column.kind.lower(), coeff * column.kind.upper());
                lo[row] += a.min(b);
                hi[row] += a.max(b);
            }
        }
        Self { model, partial: vec![0; n_rows], lo, hi }
    }

    fn row_feasible(&self, row: usize) -> bool {
        let least = self.partial[row] + self.lo[row];
        match self.model.rows()[row] {
            RowBound::Fixed(bound) => least <= bound && bound <= self.partial[row] + self.hi[row],
            RowBound::Upper(bound) => least <= bound,
        }
    }

    fn all_rows_feasible(&self) -> bool {
        (0..self.partial.len()).all(|row| self.row_feasible(row))
    }

    fn assign(&mut self, col: usize, value: i64) {
        let column = &self.model.columns()[col];
        for &(row, coeff) in &column.entries {
            let (a, b) = (coeff * column.kind.lower(), coeff * column.kind.upper());
            self.partial[row] += coeff * value;
            self.lo[row] -= a.min(b);
            self.hi[row] -= a.max(b);
        }
    }

    fn unassign(&mut self, col: usize, value: i64) {
        let column = &self.model.columns()[col];
        for &(row, coeff) in &column.entries {
            let (a, b) = (coeff * column.kind.lower(), coeff * column.kind.upper());
            self.partial[row] -= coeff * value;
            self.lo[row] += a.min(b);
            self.hi[row] += a.max(b);
        }
    }

    fn column_feasible(&self, col: usize) -> bool {
        self.model.columns()[col]
            .entries
            .iter()
            .all(|&(row, _)| self.row_feasible(row))
    }
}

impl Solver for BacktrackingSolver {
    fn solve(&mut self, model: &ReconciliationModel) -> Result<Option<Vec<i64>>> {
        let t1 = Instant::now();
        model.check()?;
        let columns = model.columns();
        let n = columns.len();
        let mut state = SearchState::new(model);
        if !state.all_rows_feasible() {
            return Ok(None);
        }

        let mut values = vec![0i64; n];
        let mut next: Vec<i64> = columns.iter().map(|c| c.kind.lower()).collect();
        let mut depth = 0;
        let mut nodes: u64 = 0;
        loop {
            if depth == n {
                debug!("backtracking found a solution in {} nodes: {:?}", nodes, Instant::now() - t1);
                return Ok(Some(values));
            }
            if next[depth] > columns[depth].kind.upper() {
                next[depth] = columns[depth].kind.lower();
                if depth == 0 {
                    debug!("backtracking exhausted {} nodes: {:?}", nodes, Instant::now() - t1);
                    return Ok(None);
                }
                depth -= 1;
                state.unassign(depth, values[depth]);
                continue;
            }

            nodes += 1;
            if let Some(max_nodes) = self.max_nodes {
                if nodes > max_nodes {
                    return Err(Error::Solver(format!("gave up after {} nodes", max_nodes)));
                }
            }
            let value = next[depth];
            next[depth] += 1;
            state.assign(depth, value);
            if state.column_feasible(depth) {
                values[depth] = value;
                depth += 1;
            } else {
                state.unassign(depth, value);
            }
        }
    }
}
