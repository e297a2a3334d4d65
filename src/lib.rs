//! # longrun-rs: Multi-Objective Long-Run Synthesis for MDPs
//!
//! **`longrun-rs`** synthesizes randomized finite-memory strategies for **Markov decision processes (MDPs)**
//! under multiple long-run average (mean-payoff) constraints and an optional optimization objective.
//! It is designed for controller synthesis, quantitative verification, and performance/reliability trade-off analysis.
//!
//! ## What does it compute?
//!
//! Given an MDP, a set of reward structures with expectation or probability bounds, and optionally one
//! reward to optimize, the synthesizer answers: *is there a strategy meeting every bound, and if so,
//! which one optimizes the objective?*
//! The answer is **constructive** --- a two-memory randomized controller that plays a transient policy,
//! switches once into a recurrent regime drawn by lottery, and then plays a memoryless randomized
//! policy inside a maximal end component forever.
//!
//! ## Key Features
//!
//! - **Manager-Centric Pipeline**: All stages go through the [`Synthesizer`][crate::synth::Synthesizer]:
//!   MEC decomposition, LP encoding, the backend solve, and strategy extraction.
//! - **Exact Reductions**: Satisfiability is decided by a single linear program over occupation
//!   measures; no value iteration, no discounting approximation.
//! - **Pluggable Backends**: The LP is fed through the [`LpSolver`][crate::lp::LpSolver] proxy;
//!   a dense two-phase simplex backend is built in.
//! - **Executable Strategies**: The extracted [`Strategy`][crate::strategy::Strategy] is a runnable
//!   controller with an injected RNG, and the induced chain is available as an implicit
//!   [`StrategyProduct`][crate::product::StrategyProduct] without materializing the product space.
//!
//! ## Basic Usage
//!
//! ```rust
//! use longrun_rs::model::{RewardModel, SparseMdp};
//! use longrun_rs::query::{Constraint, Query, Relation, Semantics};
//! use longrun_rs::synth::Synthesizer;
//!
//! // 1. Build the model: state 0 can stay or move to the absorbing state 1.
//! let mut mdp = SparseMdp::new(2, 0);
//! mdp.add_choice(0, vec![(0, 1.0)]).unwrap();
//! mdp.add_choice(0, vec![(1, 1.0)]).unwrap();
//! mdp.add_choice(1, vec![(1, 1.0)]).unwrap();
//!
//! // 2. Ask for a long-run average reward of at least 0.5.
//! let mut rewards = RewardModel::new(2);
//! rewards.set_state_reward(1, 1.0);
//! let constraint = Constraint::expectation(rewards, Relation::Geq, 0.5);
//! let query = Query::new(vec![constraint], None, Semantics::Conjunctive).unwrap();
//!
//! // 3. Solve; `None` would mean no strategy exists.
//! let strategy = Synthesizer::new(&mdp, query).solve().unwrap().expect("satisfiable");
//!
//! // 4. The transient policy moves to state 1, where the reward is earned.
//! let dist = strategy.transient_distribution(0).unwrap();
//! assert!(dist[1] > 0.99);
//! ```
//!
//! ## Core Components
//!
//! - **[`synth`]**: The pipeline driver tying everything together.
//! - **[`model`]**: MDP, reward and projection traits plus sparse implementations.
//! - **[`query`]**: Constraints, objectives, semantics and the regime pattern space.
//! - **[`strategy`]**: The extracted controller and its phase-indexed recurrent policies.
//!
//! For the LP formulation itself, check the [`encoder`] module documentation.

pub mod encoder;
pub mod error;
pub mod index;
pub mod lp;
pub mod mec;
pub mod model;
pub mod product;
pub mod query;
pub mod simplex;
pub mod strategy;
pub mod synth;
pub mod types;
