//! The predicate domain.
//!
//! The engine is polymorphic over anything that can evaluate itself at a
//! recorded state, print itself, and order itself against its peers. The
//! built-in domain wraps per-site state tests plus the two sentinels that
//! are true exactly on failing (resp. passing) runs.

use std::cmp::Ordering;

use serde::Serialize;
use thiserror::Error;

use graft_trace::{RunLabel, SiteId, SiteKind};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("predicate '{predicate}' cannot be evaluated at a state of arity {arity}")]
    UnknownPredicate { predicate: String, arity: usize },
}

/// Capabilities every predicate domain provides: evaluate, print, compare.
pub trait PredicateOps {
    /// Evaluate at one recorded state on a run with the given outcome.
    fn evaluate(&self, state: &[i64], label: RunLabel) -> Result<bool, EngineError>;

    /// Printable form, also the deterministic tie-break key.
    fn text(&self) -> String;

    fn compare(&self, other: &Self) -> Ordering {
        self.text().cmp(&other.text())
    }
}

/// Sign of an observed return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sign {
    Negative,
    Zero,
    Positive,
}

/// Relation between the two scalars of a scalar-pair observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Rel {
    Lt,
    Eq,
    Gt,
}

/// A boolean test over the state vector recorded at one site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StateTest {
    /// The branch was (or was not) taken.
    BranchTaken(bool),
    /// The returned value had the given sign.
    ReturnSign(Sign),
    /// The first scalar relates to the second as given.
    PairRel(Rel),
    /// The user predicate held (or did not).
    UserHolds(bool),
}

impl StateTest {
    /// The candidate family for a site of the given kind.
    pub fn family(kind: SiteKind) -> &'static [StateTest] {
        match kind {
            SiteKind::Branch => &[StateTest::BranchTaken(true), StateTest::BranchTaken(false)],
            SiteKind::Return => &[
                StateTest::ReturnSign(Sign::Negative),
                StateTest::ReturnSign(Sign::Zero),
                StateTest::ReturnSign(Sign::Positive),
            ],
            SiteKind::ScalarPair => &[
                StateTest::PairRel(Rel::Lt),
                StateTest::PairRel(Rel::Eq),
                StateTest::PairRel(Rel::Gt),
            ],
            SiteKind::Predicate => &[StateTest::UserHolds(true), StateTest::UserHolds(false)],
        }
    }

    fn arity(self) -> usize {
        match self {
            StateTest::PairRel(_) => 2,
            _ => 1,
        }
    }
}

/// A candidate predicate anchored at a site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SitePredicate {
    pub site: SiteId,
    pub test: StateTest,
}

impl PredicateOps for SitePredicate {
    fn evaluate(&self, state: &[i64], _label: RunLabel) -> Result<bool, EngineError> {
        if state.len() < self.test.arity() {
            return Err(EngineError::UnknownPredicate {
                predicate: self.text(),
                arity: state.len(),
            });
        }
        Ok(match self.test {
            StateTest::BranchTaken(taken) => (state[0] != 0) == taken,
            StateTest::ReturnSign(sign) => {
                let observed = match state[0].cmp(&0) {
                    Ordering::Less => Sign::Negative,
                    Ordering::Equal => Sign::Zero,
                    Ordering::Greater => Sign::Positive,
                };
                observed == sign
            }
            StateTest::PairRel(rel) => {
                let observed = match state[0].cmp(&state[1]) {
                    Ordering::Less => Rel::Lt,
                    Ordering::Equal => Rel::Eq,
                    Ordering::Greater => Rel::Gt,
                };
                observed == rel
            }
            StateTest::UserHolds(holds) => (state[0] != 0) == holds,
        })
    }

    fn text(&self) -> String {
        let site = self.site;
        match self.test {
            StateTest::BranchTaken(true) => format!("site {site}: branch taken"),
            StateTest::BranchTaken(false) => format!("site {site}: branch not taken"),
            StateTest::ReturnSign(Sign::Negative) => format!("site {site}: return < 0"),
            StateTest::ReturnSign(Sign::Zero) => format!("site {site}: return == 0"),
            StateTest::ReturnSign(Sign::Positive) => format!("site {site}: return > 0"),
            StateTest::PairRel(Rel::Lt) => format!("site {site}: lhs < rhs"),
            StateTest::PairRel(Rel::Eq) => format!("site {site}: lhs == rhs"),
            StateTest::PairRel(Rel::Gt) => format!("site {site}: lhs > rhs"),
            StateTest::UserHolds(true) => format!("site {site}: predicate holds"),
            StateTest::UserHolds(false) => format!("site {site}: predicate fails"),
        }
    }
}

/// The built-in predicate domain: site predicates plus the run sentinels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Predicate {
    Site(SitePredicate),
    /// True exactly on failing runs.
    RunFailed,
    /// True exactly on passing runs.
    RunSucceeded,
}

impl PredicateOps for Predicate {
    fn evaluate(&self, state: &[i64], label: RunLabel) -> Result<bool, EngineError> {
        match self {
            Predicate::Site(p) => p.evaluate(state, label),
            Predicate::RunFailed => Ok(label.is_failed()),
            Predicate::RunSucceeded => Ok(!label.is_failed()),
        }
    }

    fn text(&self) -> String {
        match self {
            Predicate::Site(p) => p.text(),
            Predicate::RunFailed => "run failed".to_string(),
            Predicate::RunSucceeded => "run succeeded".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_tests_read_the_first_value() {
        let taken = SitePredicate {
            site: 1,
            test: StateTest::BranchTaken(true),
        };
        assert!(taken.evaluate(&[1], RunLabel::Passed).expect("eval"));
        assert!(!taken.evaluate(&[0], RunLabel::Passed).expect("eval"));
    }

    #[test]
    fn pair_relation_needs_two_values() {
        let lt = SitePredicate {
            site: 4,
            test: StateTest::PairRel(Rel::Lt),
        };
        assert!(lt.evaluate(&[3, 9], RunLabel::Failed).expect("eval"));
        assert!(!lt.evaluate(&[9, 3], RunLabel::Failed).expect("eval"));
        match lt.evaluate(&[3], RunLabel::Failed) {
            Err(EngineError::UnknownPredicate { arity: 1, .. }) => {}
            other => panic!("expected arity error, got {other:?}"),
        }
    }

    #[test]
    fn sentinels_follow_the_run_label() {
        assert!(Predicate::RunFailed
            .evaluate(&[], RunLabel::Failed)
            .expect("eval"));
        assert!(!Predicate::RunFailed
            .evaluate(&[], RunLabel::Passed)
            .expect("eval"));
        assert!(Predicate::RunSucceeded
            .evaluate(&[], RunLabel::Passed)
            .expect("eval"));
    }

    #[test]
    fn comparison_is_lexicographic_on_text() {
        let a = SitePredicate {
            site: 1,
            test: StateTest::BranchTaken(false),
        };
        let b = SitePredicate {
            site: 1,
            test: StateTest::BranchTaken(true),
        };
        // "branch not taken" < "branch taken"
        assert_eq!(a.compare(&b), Ordering::Less);
    }

    #[test]
    fn families_match_site_kinds() {
        assert_eq!(StateTest::family(SiteKind::Branch).len(), 2);
        assert_eq!(StateTest::family(SiteKind::Return).len(), 3);
        assert_eq!(StateTest::family(SiteKind::ScalarPair).len(), 3);
        assert_eq!(StateTest::family(SiteKind::Predicate).len(), 2);
    }
}
