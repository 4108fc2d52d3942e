//! Predicate propagation.
//!
//! Propagating a predictor marks every state-node where it evaluates true
//! and re-ranks all candidates treating "failure" as "the predictor was true
//! on this run". Marking is additive: propagating further predictors only
//! ever extends the marked set and the derived failing runs.

use indexmap::IndexSet;
use tracing::warn;

use graft_trace::{ExecutionGraph, NodeKey, RunLabel, RunSet, SiteCatalog};

use crate::predicate::{PredicateOps, SitePredicate};
use crate::rank::{enumerate_candidates, rank_against, RankingRecord};

/// Accumulated propagation marks across rounds.
#[derive(Debug, Clone, Default)]
pub struct PropagationState {
    /// State-nodes where some propagated predictor held.
    pub marked: IndexSet<NodeKey>,
    /// Runs on which some propagated predictor held.
    pub derived_failing: RunSet,
}

impl PropagationState {
    pub fn new() -> Self {
        PropagationState::default()
    }

    /// Mark every state-node satisfying `predictor` and absorb its runs.
    pub fn propagate(&mut self, graph: &ExecutionGraph, predictor: &SitePredicate) {
        for (key, data) in graph.states_of(predictor.site) {
            match predictor.evaluate(&key.state, RunLabel::Passed) {
                Ok(true) => {
                    self.marked.insert(key.clone());
                    self.derived_failing.union_with(&data.runs);
                }
                Ok(false) => {}
                Err(err) => warn!(%err, "state skipped during propagation"),
            }
        }
    }

    /// Secondary ranking seeded by the propagated predictors.
    pub fn rank(&self, graph: &ExecutionGraph, catalog: &SiteCatalog) -> Vec<RankingRecord> {
        let candidates = enumerate_candidates(graph, catalog);
        rank_against(graph, &candidates, &self.derived_failing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::{Predicate, StateTest};
    use crate::rank::rank;
    use graft_trace::{build_graph, process_run};

    fn graph_of(runs: &[(&str, RunLabel)]) -> ExecutionGraph {
        let catalog = SiteCatalog::new();
        let processed: Vec<_> = runs
            .iter()
            .map(|(raw, label)| process_run(raw, *label, &catalog))
            .collect();
        build_graph(&processed)
    }

    #[test]
    fn propagation_marks_satisfying_nodes() {
        let graph = graph_of(&[
            ("1,1\n2,1\n", RunLabel::Failed),
            ("1,0\n2,1\n", RunLabel::Passed),
        ]);
        let predictor = SitePredicate {
            site: 1,
            test: StateTest::BranchTaken(true),
        };
        let mut state = PropagationState::new();
        state.propagate(&graph, &predictor);
        assert_eq!(state.marked.len(), 1);
        assert!(state.derived_failing.contains(0));
        assert!(!state.derived_failing.contains(1));
    }

    #[test]
    fn propagation_is_monotone() {
        let graph = graph_of(&[
            ("1,1\n2,1\n", RunLabel::Failed),
            ("1,0\n2,1\n", RunLabel::Passed),
        ]);
        let mut state = PropagationState::new();
        state.propagate(
            &graph,
            &SitePredicate {
                site: 1,
                test: StateTest::BranchTaken(true),
            },
        );
        let marked_before = state.marked.len();
        let failing_before = state.derived_failing.count();
        state.propagate(
            &graph,
            &SitePredicate {
                site: 2,
                test: StateTest::BranchTaken(true),
            },
        );
        assert!(state.marked.len() >= marked_before);
        assert!(state.derived_failing.count() >= failing_before);
    }

    #[test]
    fn secondary_ranking_follows_the_predictor() {
        // Site 1 taken on runs 0 and 2; site 3 taken exactly on the same
        // runs, site 2 on all runs.
        let graph = graph_of(&[
            ("1,1\n2,1\n3,1\n", RunLabel::Passed),
            ("1,0\n2,1\n3,0\n", RunLabel::Passed),
            ("1,1\n2,1\n3,1\n", RunLabel::Passed),
        ]);
        // Primary ranking against RunFailed finds nothing: no failing runs.
        let primary = rank(&graph, &SiteCatalog::new(), &Predicate::RunFailed);
        assert!(primary.iter().all(|r| r.importance == 0.0));

        let mut state = PropagationState::new();
        state.propagate(
            &graph,
            &SitePredicate {
                site: 1,
                test: StateTest::BranchTaken(true),
            },
        );
        let secondary = state.rank(&graph, &SiteCatalog::new());
        let best = &secondary[0];
        // A perfect co-predictor of the propagated predicate surfaces.
        assert!(best.importance > 0.0);
        assert!(
            (best.predicate.site == 3 && best.predicate.test == StateTest::BranchTaken(true))
                || (best.predicate.site == 1
                    && best.predicate.test == StateTest::BranchTaken(true))
        );
    }
}
