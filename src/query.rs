//! Constraints, objectives and the recurrent-regime pattern space.
//!
//! A [`Query`] is the declarative input of one synthesis run: a list of
//! long-run reward constraints, an optional optimization objective, and
//! the satisfaction semantics. Probabilistic constraints span the
//! bit-pattern space of recurrent regimes; its width is guarded at
//! construction time, long before any solver interaction.

use crate::error::Error;
use crate::model::RewardModel;
use crate::types::BitPattern;

/// Comparison operator of a constraint.
///
/// `Geq`/`Leq` bound the long-run average reward; `Max`/`Min` are
/// extremal and are lifted into the objective row.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Relation {
    Geq,
    Leq,
    Max,
    Min,
}

/// Optimization direction of an objective.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Direction {
    Maximize,
    Minimize,
}

/// Satisfaction accounting across probabilistic constraints.
///
/// Under `Conjunctive` semantics every constraint is accounted for
/// independently and the pattern space has one bit per probabilistic
/// constraint. Under `Joint` semantics only the global AND of all
/// constraints is tracked, collapsing the pattern space to at most one
/// bit. The collapse is a deliberate simplification: when independence
/// between constraints is not required, tracking each subset would be a
/// combinatorial blow-up with no payoff.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Semantics {
    Conjunctive,
    Joint,
}

/// A long-run average reward constraint.
#[derive(Debug, Clone)]
pub struct Constraint {
    /// Reward structure the constraint ranges over.
    pub rewards: RewardModel,
    /// Comparison operator.
    pub relation: Relation,
    /// Numeric bound (ignored for extremal relations).
    pub bound: f64,
    /// Required satisfaction probability; `None` for a plain
    /// expectation bound.
    prob: Option<f64>,
}

impl Constraint {
    /// Creates a plain expectation bound: `long-run reward <relation> bound`.
    pub fn expectation(rewards: RewardModel, relation: Relation, bound: f64) -> Self {
        Self {
            rewards,
            relation,
            bound,
            prob: None,
        }
    }

    /// Creates an extremal constraint, lifted into the objective by
    /// [`Query::new`].
    pub fn extremal(rewards: RewardModel, relation: Relation) -> Self {
        assert!(
            matches!(relation, Relation::Max | Relation::Min),
            "Extremal constraint requires Max or Min"
        );
        Self {
            rewards,
            relation,
            bound: 0.0,
            prob: None,
        }
    }

    /// Upgrades the constraint to a probability-threshold constraint:
    /// the bound must hold with probability at least `prob`.
    ///
    /// # Panics
    ///
    /// Panics if `prob` is outside `(0, 1]` or the relation is extremal.
    pub fn with_probability(mut self, prob: f64) -> Self {
        assert!(
            prob > 0.0 && prob <= 1.0,
            "Satisfaction probability must be in (0, 1]"
        );
        assert!(
            matches!(self.relation, Relation::Geq | Relation::Leq),
            "Extremal constraints cannot carry a probability threshold"
        );
        self.prob = Some(prob);
        self
    }

    /// A constraint is probabilistic iff it carries a required
    /// satisfaction probability (≤ 1.0 by construction).
    pub fn is_probabilistic(&self) -> bool {
        self.prob.is_some()
    }

    /// The required satisfaction probability, if probabilistic.
    pub fn probability(&self) -> Option<f64> {
        self.prob
    }

    fn is_extremal(&self) -> bool {
        matches!(self.relation, Relation::Max | Relation::Min)
    }
}

/// An optimization objective over a reward structure.
#[derive(Debug, Clone)]
pub struct Objective {
    pub rewards: RewardModel,
    pub direction: Direction,
}

/// Hard limit on the pattern-space width: `2^30` combinations.
const MAX_PATTERN_BITS: u32 = 30;

/// The bit-pattern space of recurrent regimes.
///
/// Built once per query and immutable afterward. Which patterns "claim"
/// a given probabilistic constraint depends on the semantics:
///
/// - conjunctive: pattern `N` claims constraint `i` iff bit `i` of `N`
///   is set;
/// - joint: only the single all-bits pattern claims anything, and it
///   claims every probabilistic constraint at once.
///
/// Pattern 0 never claims a constraint under either semantics.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PatternSpace {
    bits: u32,
    semantics: Semantics,
}

impl PatternSpace {
    /// Creates the pattern space for `num_probabilistic` constraints.
    ///
    /// Fails with [`Error::PatternSpaceTooLarge`] if the width would
    /// require `2^30` or more combinations.
    pub fn new(num_probabilistic: usize, semantics: Semantics) -> Result<Self, Error> {
        let bits = match semantics {
            Semantics::Conjunctive => num_probabilistic,
            Semantics::Joint => num_probabilistic.min(1),
        };
        if bits >= MAX_PATTERN_BITS as usize {
            return Err(Error::PatternSpaceTooLarge {
                constraints: num_probabilistic,
            });
        }
        Ok(Self {
            bits: bits as u32,
            semantics,
        })
    }

    /// Effective bit-width.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Number of patterns, `2^bits`.
    pub fn len(&self) -> usize {
        1usize << self.bits
    }

    /// Checks whether the space is the trivial single pattern.
    pub fn is_trivial(&self) -> bool {
        self.bits == 0
    }

    /// Iterates all patterns in increasing raw order.
    pub fn patterns(&self) -> impl Iterator<Item = BitPattern> {
        (0..self.len() as u32).map(BitPattern::new)
    }

    /// Checks whether `pattern` claims satisfaction of probabilistic
    /// constraint `i` (index into the probabilistic constraints, in
    /// declaration order).
    pub fn claims(&self, pattern: BitPattern, i: usize) -> bool {
        match self.semantics {
            Semantics::Conjunctive => pattern.bit(i),
            Semantics::Joint => self.bits == 1 && pattern == BitPattern::full(1),
        }
    }
}

/// One synthesis query: constraints, optional objective, semantics.
#[derive(Debug, Clone)]
pub struct Query {
    constraints: Vec<Constraint>,
    objective: Option<Objective>,
    semantics: Semantics,
    space: PatternSpace,
    /// Indices into `constraints` of the probabilistic ones, in
    /// declaration order; position here is the pattern bit.
    probabilistic: Vec<usize>,
    /// Indices of plain expectation bounds.
    expectation: Vec<usize>,
}

impl Query {
    /// Validates and assembles a query.
    ///
    /// Extremal constraints (`Max`/`Min`) are lifted into the objective;
    /// supplying both an extremal constraint and an explicit objective,
    /// or more than one extremal constraint, is rejected.
    pub fn new(
        constraints: Vec<Constraint>,
        objective: Option<Objective>,
        semantics: Semantics,
    ) -> Result<Self, Error> {
        let mut objective = objective;
        let mut bounded = Vec::with_capacity(constraints.len());

        for c in constraints.into_iter() {
            if c.is_extremal() {
                if objective.is_some() {
                    return Err(Error::InvalidModel {
                        reason: "more than one optimization direction in query".to_string(),
                    });
                }
                let direction = match c.relation {
                    Relation::Max => Direction::Maximize,
                    Relation::Min => Direction::Minimize,
                    _ => unreachable!(),
                };
                objective = Some(Objective {
                    rewards: c.rewards,
                    direction,
                });
            } else {
                bounded.push(c);
            }
        }

        let probabilistic: Vec<usize> = bounded
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_probabilistic())
            .map(|(i, _)| i)
            .collect();
        let expectation: Vec<usize> = bounded
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_probabilistic())
            .map(|(i, _)| i)
            .collect();

        let space = PatternSpace::new(probabilistic.len(), semantics)?;

        Ok(Self {
            constraints: bounded,
            objective,
            semantics,
            space,
            probabilistic,
            expectation,
        })
    }

    /// All bounded (non-extremal) constraints.
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// The objective, if any.
    pub fn objective(&self) -> Option<&Objective> {
        self.objective.as_ref()
    }

    /// The satisfaction semantics.
    pub fn semantics(&self) -> Semantics {
        self.semantics
    }

    /// The pattern space implied by the probabilistic constraints.
    pub fn pattern_space(&self) -> PatternSpace {
        self.space
    }

    /// Probabilistic constraints in bit order: `(bit, constraint)`.
    pub fn probabilistic(&self) -> impl Iterator<Item = (usize, &Constraint)> {
        self.probabilistic
            .iter()
            .enumerate()
            .map(move |(bit, &i)| (bit, &self.constraints[i]))
    }

    /// Plain expectation-bound constraints.
    pub fn expectation_bounds(&self) -> impl Iterator<Item = &Constraint> {
        self.expectation.iter().map(move |&i| &self.constraints[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewards() -> RewardModel {
        RewardModel::new(2)
    }

    #[test]
    fn test_pattern_space_conjunctive_width() {
        for k in 0..5 {
            let space = PatternSpace::new(k, Semantics::Conjunctive).unwrap();
            assert_eq!(space.bits(), k as u32);
            assert_eq!(space.len(), 1 << k);
        }
    }

    #[test]
    fn test_pattern_space_joint_collapses() {
        for k in 0..20 {
            let space = PatternSpace::new(k, Semantics::Joint).unwrap();
            assert!(space.bits() <= 1);
            assert_eq!(space.bits(), if k == 0 { 0 } else { 1 });
        }
    }

    #[test]
    fn test_pattern_space_limit() {
        assert_eq!(
            PatternSpace::new(30, Semantics::Conjunctive),
            Err(Error::PatternSpaceTooLarge { constraints: 30 })
        );
        assert_eq!(
            PatternSpace::new(64, Semantics::Conjunctive),
            Err(Error::PatternSpaceTooLarge { constraints: 64 })
        );
        // Joint semantics never blows up.
        assert!(PatternSpace::new(64, Semantics::Joint).is_ok());
    }

    #[test]
    fn test_claims_conjunctive() {
        let space = PatternSpace::new(2, Semantics::Conjunctive).unwrap();
        let n = BitPattern::new(0b10);
        assert!(!space.claims(n, 0));
        assert!(space.claims(n, 1));
        assert!(!space.claims(BitPattern::EMPTY, 0));
        assert!(!space.claims(BitPattern::EMPTY, 1));
    }

    #[test]
    fn test_claims_joint() {
        let space = PatternSpace::new(3, Semantics::Joint).unwrap();
        let all = BitPattern::full(1);
        // The single all-bits pattern claims every constraint.
        assert!(space.claims(all, 0));
        assert!(space.claims(all, 1));
        assert!(space.claims(all, 2));
        assert!(!space.claims(BitPattern::EMPTY, 0));
    }

    #[test]
    fn test_probabilistic_flag() {
        let plain = Constraint::expectation(rewards(), Relation::Geq, 1.0);
        assert!(!plain.is_probabilistic());

        let prob = Constraint::expectation(rewards(), Relation::Geq, 1.0).with_probability(0.9);
        assert!(prob.is_probabilistic());
        assert_eq!(prob.probability(), Some(0.9));
    }

    #[test]
    #[should_panic(expected = "Satisfaction probability must be in (0, 1]")]
    fn test_probability_range_panics() {
        Constraint::expectation(rewards(), Relation::Geq, 1.0).with_probability(1.5);
    }

    #[test]
    fn test_query_lifts_extremal() {
        let query = Query::new(
            vec![
                Constraint::expectation(rewards(), Relation::Geq, 0.5).with_probability(1.0),
                Constraint::extremal(rewards(), Relation::Min),
            ],
            None,
            Semantics::Conjunctive,
        )
        .unwrap();

        assert_eq!(query.constraints().len(), 1);
        assert_eq!(query.objective().unwrap().direction, Direction::Minimize);
        assert_eq!(query.pattern_space().bits(), 1);
    }

    #[test]
    fn test_query_rejects_two_directions() {
        let result = Query::new(
            vec![Constraint::extremal(rewards(), Relation::Max)],
            Some(Objective {
                rewards: rewards(),
                direction: Direction::Maximize,
            }),
            Semantics::Conjunctive,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_query_zero_probabilistic() {
        let query = Query::new(
            vec![Constraint::expectation(rewards(), Relation::Leq, 2.0)],
            None,
            Semantics::Conjunctive,
        )
        .unwrap();
        assert!(query.pattern_space().is_trivial());
        assert_eq!(query.pattern_space().len(), 1);
    }
}
