//! Model-side interfaces consumed by the synthesis core.
//!
//! Two model kinds share the encoder: a plain MDP, and a DTMC formed as
//! the product of an MDP and a strategy. Rather than inheriting from a
//! common base, both are expressed through the small capability traits
//! below and injected where needed. Reward lookups are routed through a
//! [`StateMap`] so that product states can be projected back to the
//! underlying MDP before the lookup.

use crate::error::Error;

/// Read-only view of a Markov Decision Process.
///
/// States and actions are dense `usize` indices. The model is never
/// mutated by the synthesis core.
pub trait Mdp {
    /// Number of states.
    fn num_states(&self) -> usize;

    /// Number of action choices available in `state`.
    fn num_choices(&self, state: usize) -> usize;

    /// Successor distribution of `(state, action)` as `(successor, probability)` pairs.
    fn transitions(&self, state: usize, action: usize) -> &[(usize, f64)];

    /// The designated initial state.
    fn initial_state(&self) -> usize;
}

/// Read-only view of a reward structure over an MDP.
pub trait Rewards {
    /// Reward collected in `state` per time step.
    fn state_reward(&self, state: usize) -> f64;

    /// Reward collected when taking `action` in `state`.
    fn transition_reward(&self, state: usize, action: usize) -> f64;

    /// Combined per-step reward of `(state, action)`.
    fn reward(&self, state: usize, action: usize) -> f64 {
        self.state_reward(state) + self.transition_reward(state, action)
    }
}

/// Projection from the state space being solved to the state space the
/// rewards are defined on.
///
/// For a plain MDP this is the identity. For a DTMC-as-product model the
/// compound state is projected back to the underlying MDP state.
pub trait StateMap {
    fn project(&self, state: usize) -> usize;
}

/// The identity projection, used for plain MDPs.
#[derive(Debug, Default, Copy, Clone)]
pub struct IdentityMap;

impl StateMap for IdentityMap {
    fn project(&self, state: usize) -> usize {
        state
    }
}

impl<F> StateMap for F
where
    F: Fn(usize) -> usize,
{
    fn project(&self, state: usize) -> usize {
        self(state)
    }
}

/// An owned sparse MDP, built choice by choice.
///
/// # Examples
///
/// ```
/// use longrun_rs::model::{Mdp, SparseMdp};
///
/// let mut mdp = SparseMdp::new(2, 0);
/// mdp.add_choice(0, vec![(1, 1.0)]).unwrap();
/// mdp.add_choice(1, vec![(1, 1.0)]).unwrap();
/// assert_eq!(mdp.num_states(), 2);
/// assert_eq!(mdp.num_choices(0), 1);
/// assert_eq!(mdp.transitions(1, 0), &[(1, 1.0)]);
/// ```
#[derive(Debug, Clone)]
pub struct SparseMdp {
    initial: usize,
    choices: Vec<Vec<Vec<(usize, f64)>>>,
}

/// Tolerance for validating that a distribution sums to one.
const DIST_EPS: f64 = 1e-9;

impl SparseMdp {
    /// Creates an MDP with `num_states` states and no choices yet.
    ///
    /// # Panics
    ///
    /// Panics if `initial >= num_states`.
    pub fn new(num_states: usize, initial: usize) -> Self {
        assert!(initial < num_states, "Initial state out of range");
        Self {
            initial,
            choices: vec![Vec::new(); num_states],
        }
    }

    /// Adds an action to `state` with the given successor distribution.
    ///
    /// Returns the index of the new action. The distribution must have
    /// strictly positive probabilities summing to 1, and all successors
    /// must be in range. Duplicate successors are merged.
    pub fn add_choice(
        &mut self,
        state: usize,
        distribution: Vec<(usize, f64)>,
    ) -> Result<usize, Error> {
        if state >= self.choices.len() {
            return Err(Error::InvalidModel {
                reason: format!("state {} out of range", state),
            });
        }
        if distribution.is_empty() {
            return Err(Error::InvalidModel {
                reason: format!("empty distribution at state {}", state),
            });
        }

        let mut merged: Vec<(usize, f64)> = Vec::with_capacity(distribution.len());
        let mut total = 0.0;
        for (successor, p) in distribution {
            if successor >= self.choices.len() {
                return Err(Error::InvalidModel {
                    reason: format!("successor {} out of range", successor),
                });
            }
            if !(p > 0.0) || !p.is_finite() {
                return Err(Error::InvalidModel {
                    reason: format!("non-positive probability {} at state {}", p, state),
                });
            }
            total += p;
            match merged.iter_mut().find(|(t, _)| *t == successor) {
                Some((_, q)) => *q += p,
                None => merged.push((successor, p)),
            }
        }
        if (total - 1.0).abs() > DIST_EPS {
            return Err(Error::InvalidModel {
                reason: format!("distribution at state {} sums to {}", state, total),
            });
        }

        self.choices[state].push(merged);
        Ok(self.choices[state].len() - 1)
    }

    /// Checks that every state has at least one action.
    ///
    /// The synthesis core assumes a total MDP; call this after building.
    pub fn validate(&self) -> Result<(), Error> {
        for (state, actions) in self.choices.iter().enumerate() {
            if actions.is_empty() {
                return Err(Error::InvalidModel {
                    reason: format!("state {} has no actions", state),
                });
            }
        }
        Ok(())
    }
}

impl Mdp for SparseMdp {
    fn num_states(&self) -> usize {
        self.choices.len()
    }

    fn num_choices(&self, state: usize) -> usize {
        self.choices[state].len()
    }

    fn transitions(&self, state: usize, action: usize) -> &[(usize, f64)] {
        &self.choices[state][action]
    }

    fn initial_state(&self) -> usize {
        self.initial
    }
}

/// An owned table-backed reward structure.
#[derive(Debug, Clone, Default)]
pub struct RewardModel {
    state: Vec<f64>,
    transition: Vec<Vec<f64>>,
}

impl RewardModel {
    /// Creates a zero reward structure for `num_states` states.
    pub fn new(num_states: usize) -> Self {
        Self {
            state: vec![0.0; num_states],
            transition: vec![Vec::new(); num_states],
        }
    }

    /// Sets the state reward of `state`.
    pub fn set_state_reward(&mut self, state: usize, reward: f64) -> &mut Self {
        self.state[state] = reward;
        self
    }

    /// Sets the transition reward of `(state, action)`.
    ///
    /// Actions not set default to zero.
    pub fn set_transition_reward(&mut self, state: usize, action: usize, reward: f64) -> &mut Self {
        let row = &mut self.transition[state];
        if row.len() <= action {
            row.resize(action + 1, 0.0);
        }
        row[action] = reward;
        self
    }
}

impl Rewards for RewardModel {
    fn state_reward(&self, state: usize) -> f64 {
        self.state.get(state).copied().unwrap_or(0.0)
    }

    fn transition_reward(&self, state: usize, action: usize) -> f64 {
        self.transition
            .get(state)
            .and_then(|row| row.get(action))
            .copied()
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_mdp() {
        let mut mdp = SparseMdp::new(3, 0);
        let a = mdp.add_choice(0, vec![(1, 0.5), (2, 0.5)]).unwrap();
        let b = mdp.add_choice(0, vec![(2, 1.0)]).unwrap();
        mdp.add_choice(1, vec![(1, 1.0)]).unwrap();
        mdp.add_choice(2, vec![(2, 1.0)]).unwrap();

        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(mdp.num_choices(0), 2);
        assert_eq!(mdp.transitions(0, 0), &[(1, 0.5), (2, 0.5)]);
        assert_eq!(mdp.initial_state(), 0);
        mdp.validate().unwrap();
    }

    #[test]
    fn test_merges_duplicate_successors() {
        let mut mdp = SparseMdp::new(2, 0);
        mdp.add_choice(0, vec![(1, 0.25), (1, 0.75)]).unwrap();
        assert_eq!(mdp.transitions(0, 0), &[(1, 1.0)]);
    }

    #[test]
    fn test_rejects_bad_distribution() {
        let mut mdp = SparseMdp::new(2, 0);
        assert!(mdp.add_choice(0, vec![(1, 0.5)]).is_err());
        assert!(mdp.add_choice(0, vec![(1, 0.0), (0, 1.0)]).is_err());
        assert!(mdp.add_choice(0, vec![(5, 1.0)]).is_err());
        assert!(mdp.add_choice(0, vec![]).is_err());
        assert!(mdp.add_choice(7, vec![(1, 1.0)]).is_err());
    }

    #[test]
    fn test_validate_total() {
        let mut mdp = SparseMdp::new(2, 0);
        mdp.add_choice(0, vec![(1, 1.0)]).unwrap();
        assert!(mdp.validate().is_err());
        mdp.add_choice(1, vec![(0, 1.0)]).unwrap();
        assert!(mdp.validate().is_ok());
    }

    #[test]
    fn test_reward_model() {
        let mut rew = RewardModel::new(2);
        rew.set_state_reward(1, 2.0);
        rew.set_transition_reward(1, 1, 0.5);

        assert_eq!(rew.state_reward(0), 0.0);
        assert_eq!(rew.state_reward(1), 2.0);
        assert_eq!(rew.transition_reward(1, 0), 0.0);
        assert_eq!(rew.transition_reward(1, 1), 0.5);
        assert_eq!(rew.reward(1, 1), 2.5);
    }

    #[test]
    fn test_state_map() {
        let id = IdentityMap;
        assert_eq!(id.project(7), 7);

        let halve = |s: usize| s / 2;
        assert_eq!(halve.project(7), 3);
    }
}
