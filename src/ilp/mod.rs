//! Exact reconciliation model.
//!
//! When peeling stalls, or for tables that carry no key material, the dropped
//! packets are the 0/1 assignment over the candidate packets that reproduces
//! every bucket of the difference table. This module builds that integer
//! program; any [`Solver`] can then search for a feasible point.
//!
//! One binary column per candidate packet, and one row per bucket stating
//! that the selected packets' hash incidences add up to the bucket's count.
//! Tables that track modular key sums add a second row per bucket stating
//! that the selected keys add up to the bucket sum, up to an integer number
//! of wraps around the modulus.
use std::time::Instant;

use itertools::Itertools;

use crate::fingerprint::Fingerprint;
use crate::table::{BucketTable, Cell};
use crate::{Error, Result};

mod backtrack;
pub use backtrack::BacktrackingSolver;

cfg_glpk! {
    mod glpk;
    pub use glpk::GlpkSolver;
}

/// Bound on the left-hand side of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowBound {
    /// The row must equal the value.
    Fixed(i64),
    /// The row must not exceed the value.
    Upper(i64),
}

impl RowBound {
    pub fn is_satisfied(&self, value: i64) -> bool {
        match *self {
            RowBound::Fixed(bound) => value == bound,
            RowBound::Upper(bound) => value <= bound,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Binary,
    Integer { lower: i64, upper: i64 },
}

impl ColumnKind {
    pub fn lower(&self) -> i64 {
        match *self {
            ColumnKind::Binary => 0,
            ColumnKind::Integer { lower, .. } => lower,
        }
    }

    pub fn upper(&self) -> i64 {
        match *self {
            ColumnKind::Binary => 1,
            ColumnKind::Integer { upper, .. } => upper,
        }
    }
}

/// A variable and its nonzero coefficients, as `(row, coefficient)` pairs
/// with at most one pair per row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub kind: ColumnKind,
    pub entries: Vec<(usize, i64)>,
}

/// Whether a solution is the only one the model admits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Uniqueness {
    Unique,
    /// Another selection of candidate indices also satisfies the model.
    Ambiguous(Vec<usize>),
}

/// Finds a feasible point of a model. Returns one value per column, or
/// `Ok(None)` when the model is infeasible. There is no objective; any
/// feasible point will do.
pub trait Solver {
    fn solve(&mut self, model: &ReconciliationModel) -> Result<Option<Vec<i64>>>;
}

/// An integer feasibility program over the candidate packets of a
/// difference table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationModel {
    rows: Vec<RowBound>,
    columns: Vec<Column>,
    /// Candidate index of each binary decision column, ascending. Decision
    /// columns come first, in this order.
    candidates: Vec<usize>,
    /// Number of packets the caller expects the solution to select. Not a
    /// constraint; only used to validate solutions.
    expected: usize,
}

impl ReconciliationModel {
    /// An empty model expecting `expected` selected candidates.
    pub fn new(expected: usize) -> Self {
        Self { rows: vec![], columns: vec![], candidates: vec![], expected }
    }

    /// Builds the model for the difference table `diff`. `candidates` are the
    /// fingerprints of the packets that may have been dropped, and `expected`
    /// is the number of them that were.
    ///
    /// Candidates with a hash incidence in an empty bucket cannot have been
    /// dropped and get no column. A difference with a negative count is
    /// infeasible before any solving.
    pub fn build<C: Cell>(
        diff: &BucketTable<C>,
        candidates: &[Fingerprint],
        expected: usize,
    ) -> Result<Self> {
        let t1 = Instant::now();
        diff.check_difference()?;
        let cells = diff.cells();
        let modulus = diff.config().modulus as i64;
        let track_sums = cells.first().and_then(|c| c.modular_sum()).is_some();

        let mut model = Self::new(expected);
        let count_rows: Vec<usize> = cells
            .iter()
            .map(|c| model.add_row(RowBound::Fixed(c.count())))
            .collect();
        let sum_rows: Vec<usize> = if track_sums {
            cells
                .iter()
                .map(|c| model.add_row(RowBound::Fixed(c.modular_sum().unwrap_or(0) as i64)))
                .collect()
        } else {
            vec![]
        };

        for (i, &key) in candidates.iter().enumerate() {
            if !diff.contains(key) {
                continue;
            }
            let residue = key as i64 % modulus;
            let mut entries = vec![];
            for (mult, bucket) in diff.indexes(key).into_iter().sorted().dedup_with_count() {
                let mult = mult as i64;
                entries.push((count_rows[bucket], mult));
                if track_sums {
                    entries.push((sum_rows[bucket], mult * residue));
                }
            }
            model.add_decision(i, entries);
        }

        if track_sums {
            for (bucket, cell) in cells.iter().enumerate() {
                if cell.count() > 0 {
                    model.add_column(
                        ColumnKind::Integer { lower: 0, upper: cell.count() },
                        vec![(sum_rows[bucket], -modulus)],
                    );
                }
            }
        }
        info!(
            "model of {} rows and {} columns ({} of {} candidates, expect {}): {:?}",
            model.rows.len(),
            model.columns.len(),
            model.candidates.len(),
            candidates.len(),
            expected,
            Instant::now() - t1,
        );
        Ok(model)
    }

    pub fn add_row(&mut self, bound: RowBound) -> usize {
        self.rows.push(bound);
        self.rows.len() - 1
    }

    /// Adds a binary decision column for candidate `candidate`. Decision
    /// columns must be added before any other column, in ascending candidate
    /// order; [`check`](Self::check) rejects models that break this.
    pub fn add_decision(&mut self, candidate: usize, entries: Vec<(usize, i64)>) -> usize {
        self.candidates.push(candidate);
        self.add_column(ColumnKind::Binary, entries)
    }

    /// Adds an auxiliary column.
    pub fn add_column(&mut self, kind: ColumnKind, entries: Vec<(usize, i64)>) -> usize {
        self.columns.push(Column { kind, entries });
        self.columns.len() - 1
    }

    pub fn rows(&self) -> &[RowBound] {
        &self.rows
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Candidate index of each decision column.
    pub fn candidates(&self) -> &[usize] {
        &self.candidates
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Errors with [`Error::Misuse`] if the model is malformed: an entry
    /// names a row that does not exist, an integer column has an empty range,
    /// or the decision columns are not the first columns in ascending
    /// candidate order.
    pub fn check(&self) -> Result<()> {
        let n_rows = self.rows.len();
        for column in &self.columns {
            if column.kind.lower() > column.kind.upper() {
                return Err(Error::Misuse("integer column with an empty range"));
            }
            if column.entries.iter().any(|&(row, _)| row >= n_rows) {
                return Err(Error::Misuse("column entry names a missing row"));
            }
        }
        let decisions = &self.columns[..self.candidates.len().min(self.columns.len())];
        if decisions.len() != self.candidates.len()
            || decisions.iter().any(|c| c.kind != ColumnKind::Binary)
            || self.candidates.windows(2).any(|w| w[0] >= w[1])
        {
            return Err(Error::Misuse("decision columns out of order"));
        }
        Ok(())
    }

    /// Whether `values` respects every column bound and every row. A
    /// malformed model is satisfied by nothing.
    pub fn is_satisfied(&self, values: &[i64]) -> bool {
        if values.len() != self.columns.len() {
            return false;
        }
        let mut lhs = vec![0i64; self.rows.len()];
        for (column, &value) in self.columns.iter().zip(values) {
            if value < column.kind.lower() || value > column.kind.upper() {
                return false;
            }
            for &(row, coeff) in &column.entries {
                match lhs.get_mut(row) {
                    Some(lhs) => *lhs += coeff * value,
                    None => return false,
                }
            }
        }
        self.rows.iter().zip(lhs).all(|(bound, value)| bound.is_satisfied(value))
    }

    /// Candidate indices selected by a solution.
    fn selection(&self, values: &[i64]) -> Vec<usize> {
        self.candidates
            .iter()
            .zip(values)
            .filter(|(_, value)| **value == 1)
            .map(|(&candidate, _)| candidate)
            .collect()
    }

    /// Solves the model and returns the selected candidate indices in
    /// ascending order. Fails with [`Error::Infeasible`] if no assignment
    /// exists and with [`Error::CardinalityMismatch`] if the solution selects
    /// a different number of candidates than expected.
    pub fn solve<S: Solver + ?Sized>(&self, solver: &mut S) -> Result<Vec<usize>> {
        let t1 = Instant::now();
        self.check()?;
        let values = match solver.solve(self)? {
            Some(values) => values,
            None => {
                debug!("model is infeasible: {:?}", Instant::now() - t1);
                return Err(Error::Infeasible);
            }
        };
        if !self.is_satisfied(&values) {
            return Err(Error::Solver("solution violates the model".into()));
        }
        let selection = self.selection(&values);
        debug!("solved for {} packets: {:?}", selection.len(), Instant::now() - t1);
        if selection.len() != self.expected {
            warn!("expected {} dropped packets, solved for {}", self.expected, selection.len());
            return Err(Error::CardinalityMismatch {
                expected: self.expected,
                found: selection.len(),
            });
        }
        Ok(selection)
    }

    /// Adds a row that forbids selecting every candidate of `selection` at
    /// once, forcing the next solve towards a different solution of the same
    /// size. Every candidate must have a decision column, listed once.
    pub fn exclude(&mut self, selection: &[usize]) -> Result<()> {
        let columns = selection
            .iter()
            .map(|candidate| {
                self.candidates
                    .binary_search(candidate)
                    .map_err(|_| Error::Misuse("excluded candidate has no column"))
            })
            .collect::<Result<Vec<_>>>()?;
        if columns.iter().sorted().dedup().count() != columns.len() {
            return Err(Error::Misuse("excluded candidate listed twice"));
        }
        let row = self.add_row(RowBound::Upper(selection.len() as i64 - 1));
        for column in columns {
            self.columns[column].entries.push((row, 1));
        }
        Ok(())
    }

    /// Checks whether `selection` is the only solution by excluding it and
    /// solving again.
    pub fn confirm_unique<S: Solver + ?Sized>(
        &self,
        solver: &mut S,
        selection: &[usize],
    ) -> Result<Uniqueness> {
        let mut model = self.clone();
        model.exclude(selection)?;
        match model.solve(solver) {
            Ok(other) => Ok(Uniqueness::Ambiguous(other)),
            Err(Error::Infeasible) => Ok(Uniqueness::Unique),
            Err(e) => Err(e),
        }
    }
}
