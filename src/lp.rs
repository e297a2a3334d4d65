//! Solver proxy: the contract between the encoder and an LP backend.
//!
//! All declared columns are continuous with lower bound 0; upper bounds
//! are set per column (the encoder bounds occupation measures by 1 and
//! pins forbidden choices to 0). Backends are resolved through an
//! explicit, statically-typed registry: an unknown backend name yields a
//! typed [`Error::BackendUnavailable`] instead of a reflection failure,
//! and is recoverable, unlike an infeasible LP.

use crate::error::Error;
use crate::simplex::Simplex;

/// Row comparator.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Cmp {
    Le,
    Eq,
    Ge,
}

/// One linear constraint row over solver columns.
///
/// Coefficients are sparse `(column, coefficient)` pairs with unique,
/// strictly increasing columns.
#[derive(Debug, Clone)]
pub struct Row {
    pub coeffs: Vec<(usize, f64)>,
    pub cmp: Cmp,
    pub rhs: f64,
    /// Human-readable label, used in logs only.
    pub label: String,
}

impl Row {
    pub fn new(coeffs: Vec<(usize, f64)>, cmp: Cmp, rhs: f64, label: impl Into<String>) -> Self {
        debug_assert!(
            coeffs.windows(2).all(|w| w[0].0 < w[1].0),
            "Row coefficients must be sorted by column"
        );
        Self {
            coeffs,
            cmp,
            rhs,
            label: label.into(),
        }
    }
}

/// Outcome of a solve call.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LpStatus {
    Optimal,
    Infeasible,
    Unbounded,
}

/// The LP backend contract.
///
/// A solver instance is single-use: rows and the objective are
/// accumulated, `solve` is called once, then results are read.
pub trait LpSolver {
    /// Number of declared columns.
    fn num_cols(&self) -> usize;

    /// Sets an upper bound on a column (lower bound is always 0).
    fn set_upper_bound(&mut self, col: usize, bound: f64);

    /// Adds a constraint row.
    fn add_row(&mut self, row: Row);

    /// Sets the objective; `maximize = false` minimizes.
    fn set_objective(&mut self, coeffs: Vec<(usize, f64)>, maximize: bool);

    /// Runs the solver. Infeasibility is a status, not an error.
    fn solve(&mut self) -> Result<LpStatus, Error>;

    /// Per-column values of the solved vector.
    ///
    /// Only meaningful after `solve` returned [`LpStatus::Optimal`].
    fn values(&self) -> &[f64];

    /// Objective value of the optimal solution.
    fn objective_value(&self) -> f64;
}

impl std::fmt::Debug for dyn LpSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LpSolver")
            .field("num_cols", &self.num_cols())
            .finish()
    }
}

/// Name of the built-in backend.
pub const DEFAULT_BACKEND: &str = "simplex";

/// Resolves a backend by name.
///
/// The registry is resolved at configuration time; adding an external
/// backend means adding an arm here and nothing else.
pub fn backend(name: &str, num_cols: usize) -> Result<Box<dyn LpSolver>, Error> {
    match name {
        "simplex" => Ok(Box::new(Simplex::new(num_cols))),
        _ => Err(Error::BackendUnavailable {
            name: name.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_default() {
        let solver = backend(DEFAULT_BACKEND, 3).unwrap();
        assert_eq!(solver.num_cols(), 3);
    }

    #[test]
    fn test_registry_unknown() {
        let err = backend("cplex", 3).unwrap_err();
        assert_eq!(
            err,
            Error::BackendUnavailable {
                name: "cplex".to_string()
            }
        );
    }
}
