//! Implicit product of the model with a synthesized controller.
//!
//! The product is the Markov chain obtained by letting the controller
//! resolve every choice. It is never materialized: compound states are
//! flat indices `state * (R + 1) + tag`, where `R` is the number of
//! recurrent regimes, tag 0 means transient memory and tag `k + 1`
//! means regime `k`. Successor distributions are computed on demand
//! from the controller's tables, so the product costs nothing beyond
//! the queries actually made against it.
//!
//! Memory updates are folded into the transition relation: a successor
//! reached while transient is immediately convolved with its switching
//! lottery, so no compound state of the form "transient at a MEC state
//! with a lottery" is ever observed by a downstream analysis.

use std::collections::BTreeMap;

use crate::error::Error;
use crate::model::Mdp;
use crate::strategy::{Memory, Strategy};

/// Read-only view of the controller-induced Markov chain.
pub struct StrategyProduct<'a, M: Mdp> {
    model: &'a M,
    strategy: &'a Strategy,
    /// Compound states per underlying state: regimes plus one.
    width: usize,
}

impl<'a, M: Mdp> StrategyProduct<'a, M> {
    pub fn new(model: &'a M, strategy: &'a Strategy) -> Self {
        Self {
            model,
            strategy,
            width: strategy.memory_size(),
        }
    }

    /// Number of compound states.
    pub fn num_states(&self) -> usize {
        self.model.num_states() * self.width
    }

    /// Flat index of `(state, memory)`.
    pub fn compound(&self, state: usize, memory: Memory) -> usize {
        let tag = match memory {
            Memory::Transient => 0,
            Memory::Recurrent(k) => k + 1,
        };
        state * self.width + tag
    }

    /// Inverse of [`compound`](Self::compound).
    pub fn decompose(&self, compound: usize) -> (usize, Memory) {
        let state = compound / self.width;
        let memory = match compound % self.width {
            0 => Memory::Transient,
            tag => Memory::Recurrent(tag - 1),
        };
        (state, memory)
    }

    /// Projects a compound state to its underlying model state.
    ///
    /// Rewards of the original model are evaluated through this map.
    pub fn underlying(&self, compound: usize) -> usize {
        compound / self.width
    }

    /// Distribution over compound states entered for an underlying
    /// successor reached with the given memory.
    fn arrivals(&self, target: usize, memory: Memory, mass: f64, acc: &mut BTreeMap<usize, f64>) {
        match memory {
            Memory::Recurrent(k) => {
                *acc.entry(self.compound(target, Memory::Recurrent(k))).or_insert(0.0) += mass;
            }
            Memory::Transient => match self.strategy.switching_distribution(target) {
                Some(lottery) => {
                    for (k, &p) in lottery.iter().enumerate() {
                        if p > 0.0 {
                            *acc.entry(self.compound(target, Memory::Recurrent(k))).or_insert(0.0) +=
                                mass * p;
                        }
                    }
                }
                None => {
                    *acc.entry(self.compound(target, Memory::Transient)).or_insert(0.0) += mass;
                }
            },
        }
    }

    /// Successor distribution of a compound state, sorted by compound
    /// index with zero-probability entries omitted.
    ///
    /// Fails with [`Error::UndefinedMove`] when the controller defines
    /// no move for the underlying state in this memory.
    pub fn successors(&self, compound: usize) -> Result<Vec<(usize, f64)>, Error> {
        let (state, memory) = self.decompose(compound);
        let dist = match memory {
            Memory::Transient => self.strategy.transient_distribution(state),
            Memory::Recurrent(k) => self.strategy.recurrent_distribution(k, state),
        }
        .ok_or_else(|| Error::UndefinedMove {
            state,
            memory: memory.to_string(),
        })?;

        let mut acc = BTreeMap::new();
        for (action, &p) in dist.iter().enumerate() {
            if p <= 0.0 {
                continue;
            }
            for &(target, q) in self.model.transitions(state, action) {
                self.arrivals(target, memory, p * q, &mut acc);
            }
        }
        Ok(acc.into_iter().collect())
    }

    /// Distribution over compound states at time zero: the model's
    /// initial state, convolved with its switching lottery if it has
    /// one.
    pub fn initial_distribution(&self) -> Vec<(usize, f64)> {
        let mut acc = BTreeMap::new();
        self.arrivals(self.model.initial_state(), Memory::Transient, 1.0, &mut acc);
        acc.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::VarIndex;
    use crate::mec::compute_mecs;
    use crate::model::SparseMdp;
    use crate::query::{PatternSpace, Semantics};
    use crate::types::BitPattern;

    use test_log::test;

    /// 0 branches to MEC states 1, 2 and transient state 3, which
    /// forwards to 2. State 2 additionally has a choice leaving its
    /// MEC for the other one.
    fn fixture() -> (SparseMdp, Strategy) {
        let mut mdp = SparseMdp::new(4, 0);
        mdp.add_choice(0, vec![(1, 1.0)]).unwrap();
        mdp.add_choice(0, vec![(2, 1.0)]).unwrap();
        mdp.add_choice(0, vec![(3, 1.0)]).unwrap();
        mdp.add_choice(1, vec![(1, 1.0)]).unwrap();
        mdp.add_choice(2, vec![(2, 1.0)]).unwrap();
        mdp.add_choice(2, vec![(1, 1.0)]).unwrap();
        mdp.add_choice(3, vec![(2, 1.0)]).unwrap();

        let mecs = compute_mecs(&mdp);
        let space = PatternSpace::new(1, Semantics::Conjunctive).unwrap();
        let index = VarIndex::build(&mdp, &mecs, &space);

        let mut values = vec![0.0; index.num_cols()];
        let n1 = BitPattern::new(1);
        values[index.var_y(0, 0).index()] = 0.2;
        values[index.var_y(0, 1).index()] = 0.2;
        values[index.var_y(0, 2).index()] = 0.6;
        values[index.var_y(3, 0).index()] = 0.6;
        values[index.var_x(1, 0, n1).index()] = 0.3;
        values[index.var_x(2, 0, n1).index()] = 0.7;

        let strategy = Strategy::extract(&mdp, &mecs, &index, &space, &values, None);
        (mdp, strategy)
    }

    #[test]
    fn test_compound_roundtrip() {
        let (mdp, strategy) = fixture();
        let product = StrategyProduct::new(&mdp, &strategy);

        assert_eq!(product.num_states(), 4 * 3);
        for s in 0..4 {
            for memory in [Memory::Transient, Memory::Recurrent(0), Memory::Recurrent(1)] {
                let c = product.compound(s, memory);
                assert_eq!(product.decompose(c), (s, memory));
                assert_eq!(product.underlying(c), s);
            }
        }
    }

    #[test]
    fn test_transient_successors_convolve_lottery() {
        let (mdp, strategy) = fixture();
        let product = StrategyProduct::new(&mdp, &strategy);

        // From (0, transient): successors 1 and 2 carry a switching
        // lottery fully concentrated on regime 1 and switch on arrival;
        // successor 3 is outside every MEC and stays transient.
        let from = product.compound(0, Memory::Transient);
        let succ = product.successors(from).unwrap();
        assert_eq!(
            succ,
            vec![
                (product.compound(1, Memory::Recurrent(1)), 0.2),
                (product.compound(2, Memory::Recurrent(1)), 0.2),
                (product.compound(3, Memory::Transient), 0.6),
            ]
        );
        let total: f64 = succ.iter().map(|&(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_recurrent_successors_stay_committed() {
        let (mdp, strategy) = fixture();
        let product = StrategyProduct::new(&mdp, &strategy);

        // Committed at state 2: the leaving choice has probability 0,
        // so the only successor is the self-loop under the same regime.
        let from = product.compound(2, Memory::Recurrent(1));
        let succ = product.successors(from).unwrap();
        assert_eq!(succ, vec![(from, 1.0)]);
    }

    #[test]
    fn test_initial_distribution() {
        let (mdp, strategy) = fixture();
        let product = StrategyProduct::new(&mdp, &strategy);

        // State 0 has no switching lottery, so time zero is transient.
        assert_eq!(
            product.initial_distribution(),
            vec![(product.compound(0, Memory::Transient), 1.0)]
        );
    }

    #[test]
    fn test_undefined_move_propagates() {
        let (mdp, strategy) = fixture();
        let product = StrategyProduct::new(&mdp, &strategy);

        // State 1 has no transient distribution.
        let from = product.compound(1, Memory::Transient);
        let err = product.successors(from).unwrap_err();
        assert_eq!(
            err,
            Error::UndefinedMove {
                state: 1,
                memory: "transient".to_string()
            }
        );
    }
}
