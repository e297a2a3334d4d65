//! Error taxonomy for the synthesis pipeline.
//!
//! Infeasibility is deliberately *not* an error: an infeasible LP means
//! "no satisfying controller exists" and is surfaced as `Ok(None)` by
//! [`Synthesizer::solve`][crate::synth::Synthesizer::solve].

use thiserror::Error;

/// Errors that can occur during synthesis or controller execution.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    /// The bit-pattern space would need `2^constraints` combinations,
    /// which exceeds the construction limit of `2^30`.
    #[error("{constraints} probabilistic constraints would require 2^{constraints} bit-patterns (limit is 2^30)")]
    PatternSpaceTooLarge { constraints: usize },

    /// The requested LP backend is not registered.
    #[error("LP backend '{name}' is not available")]
    BackendUnavailable { name: String },

    /// The LP backend failed for a reason other than infeasibility.
    #[error("LP solver failure: {reason}")]
    Solver { reason: String },

    /// The controller has no move for this state under its current memory.
    #[error("no move defined for state {state} in memory '{memory}'")]
    UndefinedMove { state: usize, memory: String },

    /// The input model or query is malformed.
    #[error("invalid model: {reason}")]
    InvalidModel { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = Error::PatternSpaceTooLarge { constraints: 31 };
        assert!(e.to_string().contains("2^31"));

        let e = Error::BackendUnavailable {
            name: "gurobi".to_string(),
        };
        assert!(e.to_string().contains("gurobi"));

        let e = Error::UndefinedMove {
            state: 3,
            memory: "transient".to_string(),
        };
        assert!(e.to_string().contains("state 3"));
    }
}
