//! LP encoder: turns a query over a model into constraint rows.
//!
//! The rows follow the multi-gain LP encoding for long-run properties:
//!
//! 1. switching normalization: all z mass sums to 1;
//! 2. expectation bounds over aggregate occupation measures;
//! 3. per-(MEC, pattern) linkage between x mass and z mass;
//! 4. transient flow conservation for y, with MEC states sinking flow
//!    into z, a flow-network formulation of "expected visits before
//!    absorption into recurrence" that stays robust where a direct
//!    hitting-probability solve would face a near-singular matrix;
//! 5. stationary flow conservation for x inside each MEC, with choices
//!    leading outside the MEC pinned to zero;
//! 6. commitment rows: a regime claiming constraint `i` must meet the
//!    bound of `i` on average;
//! 7. aggregate z mass over claiming patterns must reach each required
//!    satisfaction probability;
//! 8. optional objective row over occupation measures.

use std::collections::BTreeMap;

use log::debug;

use crate::index::VarIndex;
use crate::lp::{Cmp, LpSolver, Row};
use crate::mec::MecDecomposition;
use crate::model::{Mdp, Rewards, StateMap};
use crate::query::{Constraint, Direction, Query, Relation};
use crate::types::BitPattern;

/// Builds LP rows for one query over one model.
///
/// The encoder is stateless: it reads the immutable [`VarIndex`] and
/// emits rows; it never mutates the index.
pub struct Encoder<'a, M: Mdp> {
    model: &'a M,
    mecs: &'a MecDecomposition,
    index: &'a VarIndex,
    query: &'a Query,
    projection: &'a dyn StateMap,
}

/// Sparse coefficient accumulator; keeps columns sorted and merged.
#[derive(Default)]
struct RowBuilder {
    coeffs: BTreeMap<usize, f64>,
}

impl RowBuilder {
    fn add(&mut self, col: usize, w: f64) {
        if w != 0.0 {
            *self.coeffs.entry(col).or_insert(0.0) += w;
        }
    }

    fn into_row(self, cmp: Cmp, rhs: f64, label: impl Into<String>) -> Row {
        let coeffs = self
            .coeffs
            .into_iter()
            .filter(|(_, w)| w.abs() > 0.0)
            .collect();
        Row::new(coeffs, cmp, rhs, label)
    }
}

impl<'a, M: Mdp> Encoder<'a, M> {
    pub fn new(
        model: &'a M,
        mecs: &'a MecDecomposition,
        index: &'a VarIndex,
        query: &'a Query,
        projection: &'a dyn StateMap,
    ) -> Self {
        Self {
            model,
            mecs,
            index,
            query,
            projection,
        }
    }

    /// Checks whether the action's entire support stays inside the
    /// state's own MEC.
    fn stays_in_mec(&self, state: usize, action: usize) -> bool {
        let mec = self.mecs.mec_of(state);
        debug_assert!(mec.is_some());
        self.model
            .transitions(state, action)
            .iter()
            .all(|&(t, _)| self.mecs.mec_of(t) == mec)
    }

    /// Per-step reward of `(state, action)` under a constraint's reward
    /// structure, with the state projected back to the space the
    /// rewards are defined on.
    fn reward(&self, rewards: &impl Rewards, state: usize, action: usize) -> f64 {
        rewards.reward(self.projection.project(state), action)
    }

    /// All constraint rows (1–7), in the order listed in the module
    /// docs.
    pub fn rows(&self) -> Vec<Row> {
        let space = self.query.pattern_space();
        let n = self.model.num_states();
        let mut rows = Vec::new();

        // (1) switching normalization.
        let mut norm = RowBuilder::default();
        for s in 0..n {
            if self.mecs.contains(s) {
                for pattern in space.patterns() {
                    norm.add(self.index.var_z(s, pattern).index(), 1.0);
                }
            }
        }
        rows.push(norm.into_row(Cmp::Eq, 1.0, "z-normalization"));

        // (2) plain expectation bounds over x summed across patterns.
        for (k, c) in self.query.expectation_bounds().enumerate() {
            let mut row = RowBuilder::default();
            self.for_each_recurrent_x(|s, a, pattern| {
                row.add(
                    self.index.var_x(s, a, pattern).index(),
                    self.reward(&c.rewards, s, a),
                );
            });
            let cmp = match c.relation {
                Relation::Geq => Cmp::Ge,
                Relation::Leq => Cmp::Le,
                _ => unreachable!("extremal constraints are lifted by Query::new"),
            };
            rows.push(row.into_row(cmp, c.bound, format!("expectation-{}", k)));
        }

        // (3) per-(MEC, pattern) linkage: x mass equals z mass.
        for (m, mec) in self.mecs.mecs().iter().enumerate() {
            for pattern in space.patterns() {
                let mut row = RowBuilder::default();
                for &s in mec {
                    for a in 0..self.model.num_choices(s) {
                        if self.stays_in_mec(s, a) {
                            row.add(self.index.var_x(s, a, pattern).index(), 1.0);
                        }
                    }
                    row.add(self.index.var_z(s, pattern).index(), -1.0);
                }
                rows.push(row.into_row(Cmp::Eq, 0.0, format!("link-{}-{}", m, pattern)));
            }
        }

        // Reverse incidence, shared by rows (4) and (5).
        let mut incoming: Vec<Vec<(usize, usize, f64)>> = vec![Vec::new(); n];
        for t in 0..n {
            for b in 0..self.model.num_choices(t) {
                for &(s, p) in self.model.transitions(t, b) {
                    incoming[s].push((t, b, p));
                }
            }
        }

        // (4) transient flow conservation:
        //     Σ_a y(s,a) + Σ_N z(s,N) - Σ_{t,b} P(t,b,s)·y(t,b) = [s = init].
        let initial = self.model.initial_state();
        for s in 0..n {
            let mut row = RowBuilder::default();
            for a in 0..self.model.num_choices(s) {
                row.add(self.index.var_y(s, a).index(), 1.0);
            }
            if self.mecs.contains(s) {
                for pattern in space.patterns() {
                    row.add(self.index.var_z(s, pattern).index(), 1.0);
                }
            }
            for &(t, b, p) in &incoming[s] {
                row.add(self.index.var_y(t, b).index(), -p);
            }
            let rhs = if s == initial { 1.0 } else { 0.0 };
            rows.push(row.into_row(Cmp::Eq, rhs, format!("transient-{}", s)));
        }

        // (5) stationary flow conservation for x inside each MEC.
        for mec in self.mecs.mecs() {
            for &s in mec {
                for pattern in space.patterns() {
                    let mut row = RowBuilder::default();
                    for a in 0..self.model.num_choices(s) {
                        if self.stays_in_mec(s, a) {
                            row.add(self.index.var_x(s, a, pattern).index(), 1.0);
                        }
                    }
                    for &(t, b, p) in &incoming[s] {
                        if self.mecs.mec_of(t) == self.mecs.mec_of(s) && self.stays_in_mec(t, b) {
                            row.add(self.index.var_x(t, b, pattern).index(), -p);
                        }
                    }
                    rows.push(row.into_row(Cmp::Eq, 0.0, format!("recurrent-{}-{}", s, pattern)));
                }
            }
        }

        // (6) commitment rows: a regime claiming constraint i meets the
        //     bound of i on average inside the MEC.
        for (m, mec) in self.mecs.mecs().iter().enumerate() {
            for pattern in space.patterns() {
                for (bit, c) in self.query.probabilistic() {
                    if !space.claims(pattern, bit) {
                        continue;
                    }
                    let mut row = RowBuilder::default();
                    for &s in mec {
                        for a in 0..self.model.num_choices(s) {
                            if self.stays_in_mec(s, a) {
                                row.add(
                                    self.index.var_x(s, a, pattern).index(),
                                    self.reward(&c.rewards, s, a) - c.bound,
                                );
                            }
                        }
                    }
                    let cmp = commitment_cmp(c);
                    rows.push(row.into_row(cmp, 0.0, format!("commit-{}-{}-{}", m, pattern, bit)));
                }
            }
        }

        // (7) aggregate z mass over claiming patterns per constraint.
        for (bit, c) in self.query.probabilistic() {
            let mut row = RowBuilder::default();
            for s in 0..n {
                if !self.mecs.contains(s) {
                    continue;
                }
                for pattern in space.patterns() {
                    if space.claims(pattern, bit) {
                        row.add(self.index.var_z(s, pattern).index(), 1.0);
                    }
                }
            }
            let prob = c.probability().expect("probabilistic constraint");
            rows.push(row.into_row(Cmp::Ge, prob, format!("probability-{}", bit)));
        }

        debug!("encoder: built {} rows", rows.len());
        rows
    }

    /// The objective row (8), if the query optimizes anything.
    pub fn objective(&self) -> Option<(Vec<(usize, f64)>, bool)> {
        let objective = self.query.objective()?;
        let mut row = RowBuilder::default();
        self.for_each_recurrent_x(|s, a, pattern| {
            row.add(
                self.index.var_x(s, a, pattern).index(),
                self.reward(&objective.rewards, s, a),
            );
        });
        let coeffs = row.coeffs.into_iter().collect();
        Some((coeffs, objective.direction == Direction::Maximize))
    }

    /// Column bounds: x is bounded by 1, and x of choices leaving the
    /// MEC is pinned to 0 (y and z stay unbounded above).
    pub fn bounds(&self) -> Vec<(usize, f64)> {
        let space = self.query.pattern_space();
        let mut bounds = Vec::new();
        for s in 0..self.model.num_states() {
            if !self.mecs.contains(s) {
                continue;
            }
            for a in 0..self.model.num_choices(s) {
                let hi = if self.stays_in_mec(s, a) { 1.0 } else { 0.0 };
                for pattern in space.patterns() {
                    bounds.push((self.index.var_x(s, a, pattern).index(), hi));
                }
            }
        }
        bounds
    }

    /// Feeds bounds, rows and the objective into a solver.
    pub fn encode_into(&self, solver: &mut dyn LpSolver) {
        for (col, hi) in self.bounds() {
            solver.set_upper_bound(col, hi);
        }
        for row in self.rows() {
            solver.add_row(row);
        }
        if let Some((coeffs, maximize)) = self.objective() {
            solver.set_objective(coeffs, maximize);
        }
    }

    /// Visits every defined `x(s, a, N)` with the choice staying in the
    /// MEC.
    fn for_each_recurrent_x(&self, mut f: impl FnMut(usize, usize, BitPattern)) {
        let space = self.query.pattern_space();
        for s in 0..self.model.num_states() {
            if !self.mecs.contains(s) {
                continue;
            }
            for a in 0..self.model.num_choices(s) {
                if !self.stays_in_mec(s, a) {
                    continue;
                }
                for pattern in space.patterns() {
                    f(s, a, pattern);
                }
            }
        }
    }
}

fn commitment_cmp(c: &Constraint) -> Cmp {
    match c.relation {
        Relation::Geq => Cmp::Ge,
        Relation::Leq => Cmp::Le,
        _ => unreachable!("extremal constraints are lifted by Query::new"),
    }
}
