//! Maximal end component (MEC) decomposition.
//!
//! A MEC is a maximal set of states such that every state in the set has
//! at least one action whose entire successor support stays inside the
//! set, and the set is strongly connected under such actions. The
//! decomposition is computed by the usual pruning fixpoint: restrict to
//! candidate states, decompose into SCCs, drop every state without an
//! action closed in its own SCC, repeat until stable.
//!
//! Controller-synthesis callers sometimes need MECs relative to a subset
//! of states or with a designated set of transitions excluded; both
//! variants are provided and can be intersected by the caller.

use std::cmp::min;
use std::collections::HashSet;

use log::debug;

use crate::model::Mdp;

/// The set of MECs of a model, with a per-state membership index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MecDecomposition {
    mecs: Vec<Vec<usize>>,
    mec_of: Vec<Option<usize>>,
}

impl MecDecomposition {
    /// Wraps externally computed MECs.
    ///
    /// This is the entry point for callers that obtain end components
    /// from a different engine (e.g. one filtered by automaton
    /// acceptance).
    ///
    /// # Panics
    ///
    /// Panics if the sets overlap or contain out-of-range states.
    pub fn from_sets(num_states: usize, sets: Vec<Vec<usize>>) -> Self {
        let mut mec_of = vec![None; num_states];
        for (k, set) in sets.iter().enumerate() {
            for &s in set {
                assert!(s < num_states, "MEC state out of range");
                assert!(mec_of[s].is_none(), "MECs must be disjoint");
                mec_of[s] = Some(k);
            }
        }
        Self { mecs: sets, mec_of }
    }

    /// All MECs, each as a sorted list of states.
    pub fn mecs(&self) -> &[Vec<usize>] {
        &self.mecs
    }

    /// Number of MECs.
    pub fn len(&self) -> usize {
        self.mecs.len()
    }

    /// Checks whether there are no MECs.
    pub fn is_empty(&self) -> bool {
        self.mecs.is_empty()
    }

    /// The MEC containing `state`, if any.
    pub fn mec_of(&self, state: usize) -> Option<usize> {
        self.mec_of[state]
    }

    /// Checks whether `state` belongs to some MEC.
    pub fn contains(&self, state: usize) -> bool {
        self.mec_of[state].is_some()
    }
}

/// Computes the maximal end components of `model`.
pub fn compute_mecs(model: &impl Mdp) -> MecDecomposition {
    let candidate = vec![true; model.num_states()];
    compute(model, candidate, None)
}

/// Computes the MECs of the sub-MDP induced by `restrict`.
///
/// Only states in `restrict` participate; actions whose support leaves
/// the restriction are ignored.
pub fn compute_mecs_restricted(model: &impl Mdp, restrict: &[usize]) -> MecDecomposition {
    let mut candidate = vec![false; model.num_states()];
    for &s in restrict {
        assert!(s < model.num_states(), "Restricted state out of range");
        candidate[s] = true;
    }
    compute(model, candidate, None)
}

/// Computes the MECs of `model` with the given `(state, action)` pairs
/// removed from consideration.
pub fn compute_mecs_excluding(
    model: &impl Mdp,
    excluded: &HashSet<(usize, usize)>,
) -> MecDecomposition {
    let candidate = vec![true; model.num_states()];
    compute(model, candidate, Some(excluded))
}

fn is_allowed(
    model: &impl Mdp,
    candidate: &[bool],
    excluded: Option<&HashSet<(usize, usize)>>,
    state: usize,
    action: usize,
) -> bool {
    if let Some(excluded) = excluded {
        if excluded.contains(&(state, action)) {
            return false;
        }
    }
    model
        .transitions(state, action)
        .iter()
        .all(|&(t, _)| candidate[t])
}

fn compute(
    model: &impl Mdp,
    mut candidate: Vec<bool>,
    excluded: Option<&HashSet<(usize, usize)>>,
) -> MecDecomposition {
    let n = model.num_states();

    loop {
        let comp = sccs(model, &candidate, excluded);

        let mut changed = false;
        for s in 0..n {
            if !candidate[s] {
                continue;
            }
            // A state survives if some allowed action keeps the whole
            // support inside its own SCC.
            let keeps = (0..model.num_choices(s)).any(|a| {
                is_allowed(model, &candidate, excluded, s, a)
                    && model
                        .transitions(s, a)
                        .iter()
                        .all(|&(t, _)| comp[t] == comp[s])
            });
            if !keeps {
                candidate[s] = false;
                changed = true;
            }
        }

        if !changed {
            let mut groups: Vec<Vec<usize>> = Vec::new();
            let mut group_of = vec![usize::MAX; n];
            for s in 0..n {
                if !candidate[s] {
                    continue;
                }
                let c = comp[s];
                // First surviving state of a component opens a new group.
                let g = (0..s)
                    .find(|&t| candidate[t] && comp[t] == c)
                    .map(|t| group_of[t])
                    .unwrap_or_else(|| {
                        groups.push(Vec::new());
                        groups.len() - 1
                    });
                group_of[s] = g;
                groups[g].push(s);
            }
            debug!("compute_mecs: {} MEC(s): {:?}", groups.len(), groups);
            return MecDecomposition::from_sets(n, groups);
        }
    }
}

/// Strongly connected components of the sub-graph induced by `candidate`
/// and allowed actions (iterative Tarjan). Returns a component id per
/// state, `usize::MAX` for states outside the candidate set.
fn sccs(model: &impl Mdp, candidate: &[bool], excluded: Option<&HashSet<(usize, usize)>>) -> Vec<usize> {
    let n = model.num_states();

    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];
    for s in 0..n {
        if !candidate[s] {
            continue;
        }
        let mut seen = HashSet::new();
        for a in 0..model.num_choices(s) {
            if !is_allowed(model, candidate, excluded, s, a) {
                continue;
            }
            for &(t, _) in model.transitions(s, a) {
                if seen.insert(t) {
                    adj[s].push(t);
                }
            }
        }
    }

    let mut comp = vec![usize::MAX; n];
    let mut index = vec![usize::MAX; n];
    let mut lowlink = vec![usize::MAX; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0;
    let mut num_comps = 0;

    for root in 0..n {
        if !candidate[root] || index[root] != usize::MAX {
            continue;
        }

        let mut work: Vec<(usize, usize)> = vec![(root, 0)];
        while let Some(&(v, child)) = work.last() {
            if child == 0 {
                index[v] = next_index;
                lowlink[v] = next_index;
                next_index += 1;
                stack.push(v);
                on_stack[v] = true;
            }

            if child < adj[v].len() {
                work.last_mut().unwrap().1 += 1;
                let w = adj[v][child];
                if index[w] == usize::MAX {
                    work.push((w, 0));
                } else if on_stack[w] {
                    lowlink[v] = min(lowlink[v], index[w]);
                }
            } else {
                work.pop();
                if let Some(&(u, _)) = work.last() {
                    lowlink[u] = min(lowlink[u], lowlink[v]);
                }
                if lowlink[v] == index[v] {
                    loop {
                        let w = stack.pop().unwrap();
                        on_stack[w] = false;
                        comp[w] = num_comps;
                        if w == v {
                            break;
                        }
                    }
                    num_comps += 1;
                }
            }
        }
    }

    comp
}
