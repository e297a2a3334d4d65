//! Column index for the three LP variable families.
//!
//! Every abstract LP variable gets a dedicated solver column:
//!
//! - `x(state, action, N)`: recurrent occupation measure, defined only
//!   for MEC states;
//! - `y(state, action)`: transient flow, defined for all states;
//! - `z(state, N)`: switching weight, defined only for MEC states.
//!
//! The index is built once per query via [`VarIndex::build`] and is
//! immutable afterward, so no row can ever be constructed against a
//! half-initialized offset table. Undefined combinations map to
//! [`Col::UNDEFINED`] rather than failing, so callers can test
//! membership.
//!
//! The ordering (all x blocks, then y, then z) is a design choice, not
//! arbitrary: it keeps every MEC's occupation-measure block contiguous,
//! which matters for builders that iterate per-MEC.

use log::debug;

use crate::mec::MecDecomposition;
use crate::model::Mdp;
use crate::query::PatternSpace;
use crate::types::{BitPattern, Col};

/// Immutable column assignment for one synthesis query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarIndex {
    /// Start of the x block per state; `usize::MAX` for non-MEC states.
    x_off: Vec<usize>,
    /// Start of the y block per state.
    y_off: Vec<usize>,
    /// Start of the z block per state; `usize::MAX` for non-MEC states.
    z_off: Vec<usize>,
    /// Choice count per state, cached for bounds checks.
    choices: Vec<usize>,
    /// Number of patterns, `2^bits`.
    patterns: usize,
    num_cols: usize,
}

impl VarIndex {
    /// Computes all offsets in one pass over the states in canonical
    /// order: first the x blocks of MEC states, then the y blocks of
    /// every state, then the z blocks of MEC states.
    pub fn build(model: &impl Mdp, mecs: &MecDecomposition, space: &PatternSpace) -> Self {
        let n = model.num_states();
        let patterns = space.len();

        let choices: Vec<usize> = (0..n).map(|s| model.num_choices(s)).collect();

        let mut next = 0usize;

        let mut x_off = vec![usize::MAX; n];
        for s in 0..n {
            if mecs.contains(s) {
                x_off[s] = next;
                next += choices[s] * patterns;
            }
        }

        let mut y_off = vec![usize::MAX; n];
        for s in 0..n {
            y_off[s] = next;
            next += choices[s];
        }

        let mut z_off = vec![usize::MAX; n];
        for s in 0..n {
            if mecs.contains(s) {
                z_off[s] = next;
                next += patterns;
            }
        }

        debug!(
            "VarIndex::build: {} states, {} patterns, {} columns",
            n, patterns, next
        );

        Self {
            x_off,
            y_off,
            z_off,
            choices,
            patterns,
            num_cols: next,
        }
    }

    /// Total number of assigned columns.
    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    /// Number of patterns the index was built for.
    pub fn num_patterns(&self) -> usize {
        self.patterns
    }

    /// Column of `x(state, action, pattern)`, or the sentinel if the
    /// state is in no MEC or the action/pattern is out of range.
    pub fn var_x(&self, state: usize, action: usize, pattern: BitPattern) -> Col {
        let off = self.x_off[state];
        if off == usize::MAX || action >= self.choices[state] || pattern.raw() as usize >= self.patterns {
            return Col::UNDEFINED;
        }
        Col::new(off + action * self.patterns + pattern.raw() as usize)
    }

    /// Column of `y(state, action)`, or the sentinel if the action is
    /// out of range.
    pub fn var_y(&self, state: usize, action: usize) -> Col {
        if action >= self.choices[state] {
            return Col::UNDEFINED;
        }
        Col::new(self.y_off[state] + action)
    }

    /// Column of `z(state, pattern)`, or the sentinel if the state is in
    /// no MEC or the pattern is out of range.
    pub fn var_z(&self, state: usize, pattern: BitPattern) -> Col {
        let off = self.z_off[state];
        if off == usize::MAX || pattern.raw() as usize >= self.patterns {
            return Col::UNDEFINED;
        }
        Col::new(off + pattern.raw() as usize)
    }
}
