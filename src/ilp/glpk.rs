use std::time::Instant;

use super::{ColumnKind, ReconciliationModel, RowBound, Solver};
use crate::{Error, Result};

#[link(name = "glpk", kind = "dylib")]
extern "C" {
    fn dropsketch_glpk_solve(
        n_rows: usize,
        row_kind: *const i32,
        row_bound: *const f64,
        n_cols: usize,
        col_kind: *const i32,
        col_lb: *const f64,
        col_ub: *const f64,
        nnz: usize,
        ia: *const i32,
        ja: *const i32,
        ar: *const f64,
        out: *mut f64,
    ) -> i32;
}

/// Solves reconciliation models with GLPK's branch-and-cut, with presolve
/// on. Requires `libglpk` at link time.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlpkSolver;

impl Solver for GlpkSolver {
    fn solve(&mut self, model: &ReconciliationModel) -> Result<Option<Vec<i64>>> {
        let t1 = Instant::now();
        model.check()?;
        let (row_kind, row_bound): (Vec<i32>, Vec<f64>) = model
            .rows()
            .iter()
            .map(|bound| match *bound {
                RowBound::Fixed(v) => (0, v as f64),
                RowBound::Upper(v) => (1, v as f64),
            })
            .unzip();
        let mut col_kind = Vec::with_capacity(model.columns().len());
        let mut col_lb = Vec::with_capacity(model.columns().len());
        let mut col_ub = Vec::with_capacity(model.columns().len());
        let (mut ia, mut ja, mut ar) = (vec![], vec![], vec![]);
        for (j, column) in model.columns().iter().enumerate() {
            col_kind.push(match column.kind {
                ColumnKind::Binary => 0,
                ColumnKind::Integer { .. } => 1,
            });
            col_lb.push(column.kind.lower() as f64);
            col_ub.push(column.kind.upper() as f64);
            for &(row, coeff) in &column.entries {
                ia.push(row as i32);
                ja.push(j as i32);
                ar.push(coeff as f64);
            }
        }

        let mut out = vec![0f64; model.columns().len()];
        let err = unsafe {
            dropsketch_glpk_solve(
                row_kind.len(),
                row_kind.as_ptr(),
                row_bound.as_ptr(),
                col_kind.len(),
                col_kind.as_ptr(),
                col_lb.as_ptr(),
                col_ub.as_ptr(),
                ar.len(),
                ia.as_ptr(),
                ja.as_ptr(),
                ar.as_ptr(),
                out.as_mut_ptr(),
            )
        };
        debug!("glpk returned {} after {:?}", err, Instant::now() - t1);
        match err {
            0 => Ok(Some(out.into_iter().map(|v| v.round() as i64).collect())),
            1 => Ok(None),
            err => Err(Error::Solver(format!("glpk error {}", err))),
        }
    }
}
