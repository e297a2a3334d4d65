//! Built-in dense two-phase simplex backend.
//!
//! This is an enabling backend, not a high-performance solver: the LPs
//! produced by the encoder are small and sparse-ish, and the pipeline
//! needs *some* always-available backend behind the registry. Pivoting
//! uses Bland's rule, which guarantees termination on degenerate
//! problems at the cost of speed.
//!
//! Columns are continuous with lower bound 0; upper bounds are turned
//! into explicit rows. Reduced costs are recomputed from the tableau on
//! every iteration, trading speed for numerical drift resistance.

use log::{debug, trace};

use crate::error::Error;
use crate::lp::{Cmp, LpSolver, LpStatus, Row};

const EPS: f64 = 1e-9;
const FEAS_TOL: f64 = 1e-7;
const MAX_ITER: usize = 100_000;

/// Dense two-phase simplex solver.
pub struct Simplex {
    cols: usize,
    upper: Vec<Option<f64>>,
    rows: Vec<Row>,
    objective: Vec<f64>,
    maximize: bool,
    solution: Vec<f64>,
    objective_value: f64,
}

impl Simplex {
    /// Creates a solver over `cols` columns, all `[0, ∞)` until bounded.
    pub fn new(cols: usize) -> Self {
        Self {
            cols,
            upper: vec![None; cols],
            rows: Vec::new(),
            objective: vec![0.0; cols],
            maximize: true,
            solution: Vec::new(),
            objective_value: 0.0,
        }
    }
}

enum PivotResult {
    Optimal,
    Unbounded,
}

/// Minimizes `cost` over the current basic feasible solution.
///
/// `blocked` columns may never enter the basis. Entering and leaving
/// columns are chosen by Bland's rule.
fn optimize(
    tableau: &mut Vec<Vec<f64>>,
    basis: &mut Vec<usize>,
    cost: &[f64],
    blocked: &[bool],
) -> Result<PivotResult, Error> {
    let m = tableau.len();
    let n = cost.len();

    for iter in 0..MAX_ITER {
        // Reduced costs: r_j = c_j - Σ_i c_basis(i) · T[i][j].
        let mut entering = None;
        'columns: for j in 0..n {
            if blocked[j] || basis.contains(&j) {
                continue;
            }
            let mut r = cost[j];
            for i in 0..m {
                let cb = cost[basis[i]];
                if cb != 0.0 {
                    r -= cb * tableau[i][j];
                }
            }
            if r < -EPS {
                entering = Some(j);
                break 'columns; // Bland: smallest improving index
            }
        }

        let j = match entering {
            Some(j) => j,
            None => {
                trace!("optimize: optimal after {} iterations", iter);
                return Ok(PivotResult::Optimal);
            }
        };

        // Ratio test; Bland tie-break on the smallest basis index.
        let mut leaving: Option<(usize, f64)> = None;
        for i in 0..m {
            let a = tableau[i][j];
            if a > EPS {
                let ratio = tableau[i][n] / a;
                let better = match leaving {
                    None => true,
                    Some((li, lr)) => {
                        ratio < lr - EPS || (ratio < lr + EPS && basis[i] < basis[li])
                    }
                };
                if better {
                    leaving = Some((i, ratio));
                }
            }
        }

        let i = match leaving {
            Some((i, _)) => i,
            None => return Ok(PivotResult::Unbounded),
        };

        pivot(tableau, basis, i, j);
    }

    Err(Error::Solver {
        reason: format!("simplex did not converge within {} pivots", MAX_ITER),
    })
}

fn pivot(tableau: &mut Vec<Vec<f64>>, basis: &mut Vec<usize>, row: usize, col: usize) {
    let m = tableau.len();
    let width = tableau[row].len();

    let p = tableau[row][col];
    debug_assert!(p.abs() > EPS, "Pivot on a (near-)zero element");
    for v in tableau[row].iter_mut() {
        *v /= p;
    }

    for r in 0..m {
        if r == row {
            continue;
        }
        let factor = tableau[r][col];
        if factor != 0.0 {
            for k in 0..width {
                let delta = factor * tableau[row][k];
                tableau[r][k] -= delta;
            }
            tableau[r][col] = 0.0; // exact, against rounding residue
        }
    }

    basis[row] = col;
}

impl LpSolver for Simplex {
    fn num_cols(&self) -> usize {
        self.cols
    }

    fn set_upper_bound(&mut self, col: usize, bound: f64) {
        assert!(col < self.cols, "Column out of range");
        assert!(bound >= 0.0, "Upper bound below the lower bound 0");
        self.upper[col] = Some(bound);
    }

    fn add_row(&mut self, row: Row) {
        for &(col, _) in &row.coeffs {
            assert!(col < self.cols, "Row references column out of range");
        }
        self.rows.push(row);
    }

    fn set_objective(&mut self, coeffs: Vec<(usize, f64)>, maximize: bool) {
        self.objective = vec![0.0; self.cols];
        for (col, w) in coeffs {
            assert!(col < self.cols, "Objective references column out of range");
            self.objective[col] += w;
        }
        self.maximize = maximize;
    }

    fn solve(&mut self) -> Result<LpStatus, Error> {
        // Densify user rows, then append upper-bound rows.
        let mut dense: Vec<(Vec<f64>, Cmp, f64)> = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let mut coeffs = vec![0.0; self.cols];
            for &(col, w) in &row.coeffs {
                coeffs[col] += w;
            }
            dense.push((coeffs, row.cmp, row.rhs));
        }
        for (col, bound) in self.upper.iter().enumerate() {
            if let Some(hi) = bound {
                if hi.is_finite() {
                    let mut coeffs = vec![0.0; self.cols];
                    coeffs[col] = 1.0;
                    dense.push((coeffs, Cmp::Le, *hi));
                }
            }
        }

        // Normalize to non-negative right-hand sides.
        for (coeffs, cmp, rhs) in dense.iter_mut() {
            if *rhs < 0.0 {
                for v in coeffs.iter_mut() {
                    *v = -*v;
                }
                *rhs = -*rhs;
                *cmp = match *cmp {
                    Cmp::Le => Cmp::Ge,
                    Cmp::Ge => Cmp::Le,
                    Cmp::Eq => Cmp::Eq,
                };
            }
        }

        let m = dense.len();
        let num_slack = dense
            .iter()
            .filter(|(_, cmp, _)| matches!(cmp, Cmp::Le | Cmp::Ge))
            .count();
        let num_art = dense
            .iter()
            .filter(|(_, cmp, _)| matches!(cmp, Cmp::Ge | Cmp::Eq))
            .count();
        let total = self.cols + num_slack + num_art;

        let mut tableau: Vec<Vec<f64>> = Vec::with_capacity(m);
        let mut basis: Vec<usize> = Vec::with_capacity(m);
        let mut next_slack = self.cols;
        let mut next_art = self.cols + num_slack;

        for (coeffs, cmp, rhs) in &dense {
            let mut row = vec![0.0; total + 1];
            row[..self.cols].copy_from_slice(coeffs);
            row[total] = *rhs;
            match cmp {
                Cmp::Le => {
                    row[next_slack] = 1.0;
                    basis.push(next_slack);
                    next_slack += 1;
                }
                Cmp::Ge => {
                    row[next_slack] = -1.0;
                    next_slack += 1;
                    row[next_art] = 1.0;
                    basis.push(next_art);
                    next_art += 1;
                }
                Cmp::Eq => {
                    row[next_art] = 1.0;
                    basis.push(next_art);
                    next_art += 1;
                }
            }
            tableau.push(row);
        }

        debug!(
            "simplex: {} rows, {} structural + {} slack + {} artificial columns",
            m, self.cols, num_slack, num_art
        );

        let art_start = self.cols + num_slack;
        let mut blocked = vec![false; total];

        // Phase 1: drive the artificial variables to zero.
        if num_art > 0 {
            let mut cost = vec![0.0; total];
            for c in cost.iter_mut().skip(art_start) {
                *c = 1.0;
            }
            match optimize(&mut tableau, &mut basis, &cost, &blocked)? {
                PivotResult::Optimal => {}
                PivotResult::Unbounded => {
                    return Err(Error::Solver {
                        reason: "phase-1 objective unbounded".to_string(),
                    });
                }
            }

            let infeasibility: f64 = basis
                .iter()
                .enumerate()
                .filter(|(_, &b)| b >= art_start)
                .map(|(i, _)| tableau[i][total])
                .sum();
            if infeasibility > FEAS_TOL {
                debug!("simplex: infeasible, residual {}", infeasibility);
                return Ok(LpStatus::Infeasible);
            }

            for b in blocked.iter_mut().skip(art_start) {
                *b = true;
            }

            // Pivot remaining (zero-valued) artificials out of the
            // basis; rows with no eligible pivot are redundant.
            let mut drop_rows = Vec::new();
            for i in 0..tableau.len() {
                if basis[i] < art_start {
                    continue;
                }
                let col = (0..art_start).find(|&j| tableau[i][j].abs() > EPS);
                match col {
                    Some(j) => pivot(&mut tableau, &mut basis, i, j),
                    None => drop_rows.push(i),
                }
            }
            for &i in drop_rows.iter().rev() {
                tableau.remove(i);
                basis.remove(i);
            }
        }

        // Phase 2: the real objective (internally always minimized).
        let mut cost = vec![0.0; total];
        for j in 0..self.cols {
            cost[j] = if self.maximize {
                -self.objective[j]
            } else {
                self.objective[j]
            };
        }
        match optimize(&mut tableau, &mut basis, &cost, &blocked)? {
            PivotResult::Unbounded => return Ok(LpStatus::Unbounded),
            PivotResult::Optimal => {}
        }

        let mut solution = vec![0.0; self.cols];
        for (i, &b) in basis.iter().enumerate() {
            if b < self.cols {
                solution[b] = tableau[i][total].max(0.0);
            }
        }
        self.objective_value = solution
            .iter()
            .zip(&self.objective)
            .map(|(x, c)| x * c)
            .sum();
        self.solution = solution;

        Ok(LpStatus::Optimal)
    }

    fn values(&self) -> &[f64] {
        &self.solution
    }

    fn objective_value(&self) -> f64 {
        self.objective_value
    }
}
