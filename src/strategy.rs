//! Strategy extraction and the two-memory controller.
//!
//! The solved LP vector is turned into a controller with two memory
//! modes: `Transient` until the first visit to a MEC state with a
//! switching distribution, then irreversibly `Recurrent(k)` for the
//! drawn regime `k`.
//!
//! The recurrent policy for a regime is not a fixed distribution but a
//! phase-indexed sequence: at phase `p` every action staying inside the
//! MEC receives an extra `1/M(p)` of unnormalized weight, keeping its
//! probability strictly positive so the induced chain stays ergodic on
//! the MEC, while `M(p) = 2^p` grows until the sequence converges to
//! the LP-optimal frequencies. Actions leaving the MEC get literal
//! probability zero at every phase. A finite snapshot (the first phase
//! within tolerance of the limit) is frozen for execution and export.

use std::fmt;

use log::debug;
use rand::Rng;

use crate::error::Error;
use crate::index::VarIndex;
use crate::mec::MecDecomposition;
use crate::model::Mdp;
use crate::query::PatternSpace;

/// Tolerance below which a normalization denominator counts as zero.
const ZERO_EPS: f64 = 1e-9;

/// Default tolerance for the frozen recurrent-policy approximation.
pub const APPROX_TOL: f64 = 1e-6;

/// Normalizes a non-negative weight vector into a distribution.
///
/// Returns `None` when the total mass is (numerically) zero or any
/// entry is not finite, so that degenerate solver output short-circuits
/// to "undefined" instead of propagating a division artifact.
pub(crate) fn normalize(weights: &[f64]) -> Option<Vec<f64>> {
    if weights.iter().any(|w| !w.is_finite()) {
        return None;
    }
    let total: f64 = weights.iter().map(|w| w.max(0.0)).sum();
    if total <= ZERO_EPS {
        return None;
    }
    Some(weights.iter().map(|w| w.max(0.0) / total).collect())
}

/// Per-state data of one recurrent regime.
#[derive(Debug, Clone)]
struct RecurrentEntry {
    /// Occupation weight per action; 0 for choices leaving the MEC.
    weights: Vec<f64>,
    /// Which actions stay inside the MEC (regularizer support).
    stays: Vec<bool>,
}

impl RecurrentEntry {
    fn num_staying(&self) -> usize {
        self.stays.iter().filter(|&&s| s).count()
    }

    /// Distribution at a finite phase: `(w_a + 1/M) / (Σw + m/M)` for
    /// staying actions, 0 otherwise, with `M = 2^phase`.
    fn dist_at_phase(&self, phase: u32) -> Vec<f64> {
        let m = self.num_staying() as f64;
        let inv = 1.0 / (1u64 << phase.min(63)) as f64;
        let total: f64 = self.weights.iter().sum();
        let denom = total + m * inv;
        self.weights
            .iter()
            .zip(&self.stays)
            .map(|(w, &stays)| if stays { (w + inv) / denom } else { 0.0 })
            .collect()
    }

    /// The limiting distribution as phase → ∞: the LP frequencies, or
    /// uniform over staying actions when the regime puts no mass here.
    fn limit(&self) -> Vec<f64> {
        match normalize(&self.weights) {
            Some(dist) => dist,
            None => {
                let m = self.num_staying() as f64;
                self.stays
                    .iter()
                    .map(|&s| if s { 1.0 / m } else { 0.0 })
                    .collect()
            }
        }
    }
}

/// A phase-indexed recurrent policy for one regime bit-pattern.
#[derive(Debug, Clone)]
pub struct RecurrentPolicy {
    entries: Vec<Option<RecurrentEntry>>,
}

impl RecurrentPolicy {
    /// Distribution over actions at `state` for the given phase, or
    /// `None` if the state is outside every MEC.
    pub fn dist_at_phase(&self, state: usize, phase: u32) -> Option<Vec<f64>> {
        self.entries[state].as_ref().map(|e| e.dist_at_phase(phase))
    }

    /// Smallest phase at which every state's distribution is within
    /// `tol` (L∞) of the limiting distribution.
    fn converged_phase(&self, tol: f64) -> u32 {
        for phase in 0..63 {
            let ok = self.entries.iter().flatten().all(|e| {
                let dist = e.dist_at_phase(phase);
                let limit = e.limit();
                dist.iter()
                    .zip(&limit)
                    .all(|(a, b)| (a - b).abs() <= tol)
            });
            if ok {
                return phase;
            }
        }
        63
    }
}

/// Controller memory: transient, or committed to one recurrent regime.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Memory {
    Transient,
    Recurrent(usize),
}

impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Memory::Transient => write!(f, "transient"),
            Memory::Recurrent(k) => write!(f, "recurrent[{}]", k),
        }
    }
}

/// A synthesized randomized controller.
///
/// The strategy is decoupled from the solver: it owns plain
/// distribution tables and is the artifact that outlives the synthesis
/// instance.
#[derive(Debug, Clone)]
pub struct Strategy {
    /// Transient action distribution per state; `None` where the state
    /// is never transiently visited.
    transient: Vec<Option<Vec<f64>>>,
    /// Regime lottery per MEC state; `None` exactly for non-MEC states
    /// (and for MECs that receive no mass).
    switching: Vec<Option<Vec<f64>>>,
    /// Phase-indexed recurrent policy per regime.
    recurrent: Vec<RecurrentPolicy>,
    /// Frozen approximation: `frozen[k][state]`.
    frozen: Vec<Vec<Option<Vec<f64>>>>,
    memory: Memory,
    objective_value: Option<f64>,
}

impl Strategy {
    /// Builds the controller from a solved LP vector.
    ///
    /// `values` is the solver's per-column result over `index`'s
    /// columns; it is only read, never mutated.
    pub fn extract(
        model: &impl Mdp,
        mecs: &MecDecomposition,
        index: &VarIndex,
        space: &PatternSpace,
        values: &[f64],
        objective_value: Option<f64>,
    ) -> Self {
        assert_eq!(values.len(), index.num_cols(), "Solved vector size mismatch");
        let n = model.num_states();

        let stays_in_mec = |s: usize, a: usize| {
            model
                .transitions(s, a)
                .iter()
                .all(|&(t, _)| mecs.mec_of(t) == mecs.mec_of(s))
        };

        // Transient table: y(s, ·) normalized where any mass flows.
        let transient: Vec<Option<Vec<f64>>> = (0..n)
            .map(|s| {
                let weights: Vec<f64> = (0..model.num_choices(s))
                    .map(|a| values[index.var_y(s, a).index()])
                    .collect();
                normalize(&weights)
            })
            .collect();

        // Switching lottery: x mass aggregated per pattern over the MEC.
        let mut switching: Vec<Option<Vec<f64>>> = vec![None; n];
        for mec in mecs.mecs() {
            let mut weights = vec![0.0; space.len()];
            for &s in mec {
                for a in 0..model.num_choices(s) {
                    if !stays_in_mec(s, a) {
                        continue;
                    }
                    for pattern in space.patterns() {
                        weights[pattern.raw() as usize] +=
                            values[index.var_x(s, a, pattern).index()];
                    }
                }
            }
            let dist = normalize(&weights);
            for &s in mec {
                switching[s] = dist.clone();
            }
        }

        // Phase-indexed recurrent policies, one per pattern.
        let mut recurrent = Vec::with_capacity(space.len());
        for pattern in space.patterns() {
            let entries: Vec<Option<RecurrentEntry>> = (0..n)
                .map(|s| {
                    if !mecs.contains(s) {
                        return None;
                    }
                    let stays: Vec<bool> =
                        (0..model.num_choices(s)).map(|a| stays_in_mec(s, a)).collect();
                    assert!(
                        stays.iter().any(|&b| b),
                        "MEC state without a staying action"
                    );
                    let weights: Vec<f64> = (0..model.num_choices(s))
                        .map(|a| {
                            if stays[a] {
                                values[index.var_x(s, a, pattern).index()].max(0.0)
                            } else {
                                0.0
                            }
                        })
                        .collect();
                    Some(RecurrentEntry { weights, stays })
                })
                .collect();
            recurrent.push(RecurrentPolicy { entries });
        }

        let mut strategy = Self {
            transient,
            switching,
            recurrent,
            frozen: Vec::new(),
            memory: Memory::Transient,
            objective_value,
        };
        strategy.compute_approximation(APPROX_TOL);
        strategy
    }

    /// Advances the phase until the regularization error drops below
    /// `tol`, then freezes one concrete distribution table per regime.
    ///
    /// The frozen snapshot is the only form used by [`next_move`] and
    /// the only form intended for persistence.
    ///
    /// [`next_move`]: Strategy::next_move
    pub fn compute_approximation(&mut self, tol: f64) {
        self.frozen = self
            .recurrent
            .iter()
            .map(|policy| {
                let phase = policy.converged_phase(tol);
                debug!("compute_approximation: frozen at phase {}", phase);
                policy
                    .entries
                    .iter()
                    .map(|e| e.as_ref().map(|e| e.dist_at_phase(phase)))
                    .collect()
            })
            .collect();
    }

    /// Resets the memory to `Transient` and performs the switching
    /// lottery for the initial state.
    pub fn init<R: Rng>(&mut self, state: usize, rng: &mut R) {
        self.memory = Memory::Transient;
        self.update_memory(0, state, rng);
    }

    /// Advances the memory after the environment moved to `state`.
    ///
    /// The transition is one-shot and absorbing: on the first visit to
    /// a state with a switching distribution while transient, a regime
    /// is drawn; once recurrent, the memory never changes again.
    pub fn update_memory<R: Rng>(&mut self, _action: usize, state: usize, rng: &mut R) {
        if self.memory != Memory::Transient {
            return;
        }
        let lottery = match &self.switching[state] {
            Some(lottery) => lottery,
            None => return, // outside every MEC: stay transient
        };

        let draw: f64 = rng.gen();
        let mut acc = 0.0;
        let mut chosen = None;
        for (k, &p) in lottery.iter().enumerate() {
            if p <= 0.0 {
                continue;
            }
            acc += p;
            chosen = Some(k);
            if draw < acc {
                break;
            }
        }
        if let Some(k) = chosen {
            debug!("update_memory: committing to regime {} at state {}", k, state);
            self.memory = Memory::Recurrent(k);
        }
    }

    /// The move distribution for `state` under the current memory.
    ///
    /// Fails with [`Error::UndefinedMove`] when no distribution is
    /// defined; the controller's memory is left untouched.
    pub fn next_move(&self, state: usize) -> Result<&[f64], Error> {
        let undefined = || Error::UndefinedMove {
            state,
            memory: self.memory.to_string(),
        };
        match self.memory {
            Memory::Transient => self.transient[state]
                .as_deref()
                .ok_or_else(undefined),
            Memory::Recurrent(k) => self.frozen[k][state]
                .as_deref()
                .ok_or_else(undefined),
        }
    }

    /// Current memory state.
    pub fn memory(&self) -> Memory {
        self.memory
    }

    /// Number of memory states: one transient plus one per regime.
    pub fn memory_size(&self) -> usize {
        self.recurrent.len() + 1
    }

    /// Number of recurrent regimes.
    pub fn num_recurrent(&self) -> usize {
        self.recurrent.len()
    }

    /// Transient distribution at `state`, if defined.
    pub fn transient_distribution(&self, state: usize) -> Option<&[f64]> {
        self.transient[state].as_deref()
    }

    /// Switching distribution at `state`, if defined.
    pub fn switching_distribution(&self, state: usize) -> Option<&[f64]> {
        self.switching[state].as_deref()
    }

    /// Frozen recurrent distribution of regime `k` at `state`.
    pub fn recurrent_distribution(&self, k: usize, state: usize) -> Option<&[f64]> {
        self.frozen[k][state].as_deref()
    }

    /// Phase-indexed policy of regime `k`, for inspection.
    pub fn recurrent_policy(&self, k: usize) -> &RecurrentPolicy {
        &self.recurrent[k]
    }

    /// Objective value of the solved LP, if an objective was present.
    pub fn objective_value(&self) -> Option<f64> {
        self.objective_value
    }
}
