//! The synthesis pipeline.
//!
//! [`Synthesizer`] wires the stages together: MEC decomposition,
//! column indexing, LP encoding, the backend solve, and strategy
//! extraction. It owns nothing heavyweight; the model and query are
//! borrowed, and each call to [`solve`](Synthesizer::solve) builds a
//! fresh single-use solver instance.
//!
//! Infeasibility is an answer, not a failure: `solve` returns
//! `Ok(None)` when no strategy satisfies the query, and reserves
//! `Err` for misuse (unknown backend, degenerate model, an unbounded
//! objective).

use log::{debug, info};

use crate::encoder::Encoder;
use crate::error::Error;
use crate::index::VarIndex;
use crate::lp::{self, LpStatus, DEFAULT_BACKEND};
use crate::mec::compute_mecs;
use crate::model::{IdentityMap, Mdp, StateMap};
use crate::query::Query;
use crate::strategy::Strategy;

static IDENTITY: IdentityMap = IdentityMap;

/// Drives one synthesis query against one model.
pub struct Synthesizer<'a, M: Mdp> {
    model: &'a M,
    query: Query,
    backend: String,
    projection: &'a dyn StateMap,
}

impl<'a, M: Mdp> Synthesizer<'a, M> {
    pub fn new(model: &'a M, query: Query) -> Self {
        Self {
            model,
            query,
            backend: DEFAULT_BACKEND.to_string(),
            projection: &IDENTITY,
        }
    }

    /// Selects the LP backend by name. Unknown names surface as
    /// [`Error::BackendUnavailable`] from [`solve`](Self::solve).
    pub fn with_backend(mut self, name: impl Into<String>) -> Self {
        self.backend = name.into();
        self
    }

    /// Sets the state projection used to evaluate rewards, for models
    /// whose states are compounds over the space the rewards live on.
    pub fn with_projection(mut self, projection: &'a dyn StateMap) -> Self {
        self.projection = projection;
        self
    }

    /// Runs the full pipeline.
    ///
    /// Returns `Ok(Some(strategy))` for a satisfiable query,
    /// `Ok(None)` when the LP is infeasible, and an error for an
    /// unavailable backend or an unbounded objective.
    pub fn solve(&self) -> Result<Option<Strategy>, Error> {
        let mecs = compute_mecs(self.model);
        let space = self.query.pattern_space();
        info!(
            "synth: {} states, {} MECs, {} patterns",
            self.model.num_states(),
            mecs.len(),
            space.len()
        );

        let index = VarIndex::build(self.model, &mecs, &space);
        let mut solver = lp::backend(&self.backend, index.num_cols())?;

        let encoder = Encoder::new(self.model, &mecs, &index, &self.query, self.projection);
        encoder.encode_into(solver.as_mut());

        match solver.solve()? {
            LpStatus::Infeasible => {
                debug!("synth: query is infeasible");
                Ok(None)
            }
            LpStatus::Unbounded => Err(Error::Solver {
                reason: "objective is unbounded".to_string(),
            }),
            LpStatus::Optimal => {
                let objective_value = self.query.objective().map(|_| solver.objective_value());
                if let Some(v) = objective_value {
                    debug!("synth: optimal objective value {}", v);
                }
                let strategy = Strategy::extract(
                    self.model,
                    &mecs,
                    &index,
                    &space,
                    solver.values(),
                    objective_value,
                );
                Ok(Some(strategy))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RewardModel, SparseMdp};
    use crate::query::{Constraint, Relation, Semantics};
    use crate::strategy::Memory;

    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use test_log::test;

    /// Two single-state MECs: 0 can stay or move on, 1 only stays.
    fn two_mec_model() -> SparseMdp {
        let mut mdp = SparseMdp::new(2, 0);
        mdp.add_choice(0, vec![(0, 1.0)]).unwrap();
        mdp.add_choice(0, vec![(1, 1.0)]).unwrap();
        mdp.add_choice(1, vec![(1, 1.0)]).unwrap();
        mdp
    }

    #[test]
    fn test_end_to_end_switch_and_commit() {
        let mdp = two_mec_model();

        // Long-run reward 1 is only earned at state 1, so any strategy
        // meeting the bound must leave the MEC around state 0.
        let mut rewards = RewardModel::new(2);
        rewards.set_state_reward(1, 1.0);
        let constraint =
            Constraint::expectation(rewards, Relation::Geq, 0.5).with_probability(1.0);
        let query = Query::new(vec![constraint], None, Semantics::Conjunctive).unwrap();

        let mut strategy = Synthesizer::new(&mdp, query)
            .solve()
            .unwrap()
            .expect("query is satisfiable");
        assert_eq!(strategy.objective_value(), None);
        assert_eq!(strategy.memory_size(), 3);

        // All switching mass sits at state 1 in the committing pattern.
        assert!(strategy.switching_distribution(0).is_none() || {
            strategy.switching_distribution(0).unwrap()[1] == 0.0
        });
        assert_eq!(strategy.switching_distribution(1).unwrap(), &[0.0, 1.0]);

        // The transient policy moves on with certainty.
        let transient = strategy.transient_distribution(0).unwrap();
        assert!((transient[1] - 1.0).abs() < 1e-9);

        // Once committed, the leaving choice at state 0 has literal
        // probability zero at every phase.
        let committed = strategy.recurrent_distribution(1, 0).unwrap();
        assert_eq!(committed[1], 0.0);
        assert!(committed[0] > 0.0);

        // Drive the controller along a run.
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        strategy.init(0, &mut rng);
        let first = strategy.next_move(0).unwrap().to_vec();
        assert!((first[1] - 1.0).abs() < 1e-9);
        strategy.update_memory(1, 1, &mut rng);
        assert_eq!(strategy.memory(), Memory::Recurrent(1));
        assert_eq!(strategy.next_move(1).unwrap(), &[1.0]);
    }

    #[test]
    fn test_infeasible_yields_none() {
        let mdp = two_mec_model();

        // Zero reward everywhere can never meet a positive bound.
        let constraint = Constraint::expectation(RewardModel::new(2), Relation::Geq, 0.5)
            .with_probability(0.5);
        let query = Query::new(vec![constraint], None, Semantics::Conjunctive).unwrap();

        let result = Synthesizer::new(&mdp, query).solve().unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_unknown_backend() {
        let mdp = two_mec_model();
        let query = Query::new(vec![], None, Semantics::Conjunctive).unwrap();

        let err = Synthesizer::new(&mdp, query)
            .with_backend("gurobi")
            .solve()
            .unwrap_err();
        assert_eq!(
            err,
            Error::BackendUnavailable {
                name: "gurobi".to_string()
            }
        );
    }

    /// Two probabilistic bounds plus an optimization objective with a
    /// unique optimum, checked against hand-computed values.
    ///
    /// States: 0 branches to 1 (p 0.6) / 2 (p 0.4) or detours via 3;
    /// MECs are {1} (one self-loop) and {2} (two self-loops a, b).
    /// Per-step rewards:
    ///   A: 1 at state 1, 1 under b        (bound >= 0.75, prob 0.8)
    ///   B: 1 under b                       (bound >= 0.5,  prob 0.8)
    ///   E: 2 at state 1, 1 under a         (maximize)
    fn regression_model() -> (SparseMdp, Query) {
        let mut mdp = SparseMdp::new(4, 0);
        mdp.add_choice(0, vec![(1, 0.6), (2, 0.4)]).unwrap();
        mdp.add_choice(0, vec![(3, 1.0)]).unwrap();
        mdp.add_choice(1, vec![(1, 1.0)]).unwrap();
        mdp.add_choice(2, vec![(2, 1.0)]).unwrap(); // a
        mdp.add_choice(2, vec![(2, 1.0)]).unwrap(); // b
        mdp.add_choice(3, vec![(2, 1.0)]).unwrap();

        let mut a = RewardModel::new(4);
        a.set_state_reward(1, 1.0).set_transition_reward(2, 1, 1.0);
        let mut b = RewardModel::new(4);
        b.set_transition_reward(2, 1, 1.0);
        let mut e = RewardModel::new(4);
        e.set_state_reward(1, 2.0).set_transition_reward(2, 0, 1.0);

        let query = Query::new(
            vec![
                Constraint::expectation(a, Relation::Geq, 0.75).with_probability(0.8),
                Constraint::expectation(b, Relation::Geq, 0.5).with_probability(0.8),
                Constraint::extremal(e, Relation::Max),
            ],
            None,
            Semantics::Conjunctive,
        )
        .unwrap();
        (mdp, query)
    }

    #[test]
    fn test_regression_optimum() {
        let (mdp, query) = regression_model();
        let strategy = Synthesizer::new(&mdp, query)
            .solve()
            .unwrap()
            .expect("query is satisfiable");
        let tol = 1e-6;

        // Optimal value: 2 * 0.2 + 1 * 0.1 + 1 * 0.15.
        let value = strategy.objective_value().unwrap();
        assert!((value - 0.65).abs() < tol, "objective value {}", value);

        // Transient split at the initial state is 1/3 direct, 2/3 via
        // the detour: only 0.6 * 1/3 = 0.2 of the mass may end at
        // state 1.
        let transient = strategy.transient_distribution(0).unwrap();
        assert!((transient[0] - 1.0 / 3.0).abs() < tol);
        assert!((transient[1] - 2.0 / 3.0).abs() < tol);

        // Switching mass: state 1 carries 0.2 in pattern 1; state 2
        // carries 0.2 in pattern 2 and 0.6 in pattern 3, normalized to
        // its total of 0.8.
        let sw1 = strategy.switching_distribution(1).unwrap();
        assert!((sw1[1] - 1.0).abs() < tol);
        let sw2 = strategy.switching_distribution(2).unwrap();
        assert!(sw2[0].abs() < tol && sw2[1].abs() < tol);
        assert!((sw2[2] - 0.25).abs() < tol);
        assert!((sw2[3] - 0.75).abs() < tol);

        // Recurrent frequencies at state 2: pattern 3 binds both
        // commitment rows at (0.25, 0.75), pattern 2 only the weaker
        // one at (0.5, 0.5). The frozen approximation is within its
        // own tolerance of these.
        let r3 = strategy.recurrent_distribution(3, 2).unwrap();
        assert!((r3[0] - 0.25).abs() < 1e-4);
        assert!((r3[1] - 0.75).abs() < 1e-4);
        let r2 = strategy.recurrent_distribution(2, 2).unwrap();
        assert!((r2[0] - 0.5).abs() < 1e-4);
        assert!((r2[1] - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_joint_semantics_collapses_patterns() {
        let (mdp, _) = regression_model();

        let mut a = RewardModel::new(4);
        a.set_state_reward(1, 1.0).set_transition_reward(2, 1, 1.0);
        let mut b = RewardModel::new(4);
        b.set_transition_reward(2, 1, 1.0);

        // Under joint semantics both bounds must hold on the same runs,
        // so there are only two regimes regardless of constraint count.
        let query = Query::new(
            vec![
                Constraint::expectation(a, Relation::Geq, 0.75).with_probability(0.8),
                Constraint::expectation(b, Relation::Geq, 0.5).with_probability(0.8),
            ],
            None,
            Semantics::Joint,
        )
        .unwrap();

        let strategy = Synthesizer::new(&mdp, query)
            .solve()
            .unwrap()
            .expect("query is satisfiable");
        assert_eq!(strategy.memory_size(), 3);
    }
}
