//! CBI ranking statistics.
//!
//! For every `(predicate, site)` pair the engine counts the runs on which
//! the predicate was ever observed true and the runs on which the site was
//! reached at all, then combines them into the importance score. All the
//! rare-event conventions live here: `0/0 := 0`, `ln(0+1) = 0`, and a
//! non-positive component zeroes the whole importance.

use serde::Serialize;
use tracing::warn;

use graft_trace::{ExecutionGraph, RunSet, SiteCatalog};

use crate::predicate::{Predicate, PredicateOps, SitePredicate, StateTest};

/// The ranking record for one candidate predicate at its site.
#[derive(Debug, Clone, Serialize)]
pub struct RankingRecord {
    pub predicate: SitePredicate,
    /// Printable predicate text (the deterministic tie-break key).
    pub text: String,
    /// Failing / passing runs on which the predicate was ever true.
    pub f_p: u64,
    pub s_p: u64,
    /// Failing / passing runs on which the site was reached at all.
    pub f_p_obs: u64,
    pub s_p_obs: u64,
    pub failure: f64,
    pub context: f64,
    pub increase: f64,
    pub importance: f64,
}

/// `a / (a + b)` with the `0/0 := 0` convention.
fn ratio(a: u64, b: u64) -> f64 {
    if a + b == 0 {
        0.0
    } else {
        a as f64 / (a + b) as f64
    }
}

/// Candidate predicates drawn from the states attached to each site, in
/// site-observation order.
pub fn enumerate_candidates(graph: &ExecutionGraph, catalog: &SiteCatalog) -> Vec<SitePredicate> {
    let mut out = Vec::new();
    for site in graph.site_observers.keys() {
        for test in StateTest::family(catalog.kind_of(*site)) {
            out.push(SitePredicate {
                site: *site,
                test: *test,
            });
        }
    }
    out
}

/// Runs on which `predicate` was observed true at any state-node.
///
/// States too short for the predicate's arity are skipped with a warning;
/// they cannot satisfy it. Site predicates do not consult the run outcome,
/// so each state is evaluated once.
pub fn true_runs(graph: &ExecutionGraph, predicate: &SitePredicate) -> RunSet {
    let mut runs = RunSet::new();
    for (key, data) in graph.states_of(predicate.site) {
        match predicate.evaluate(&key.state, graft_trace::RunLabel::Passed) {
            Ok(true) => runs.union_with(&data.runs),
            Ok(false) => {}
            Err(err) => {
                warn!(%err, "state skipped during predicate evaluation");
            }
        }
    }
    runs
}

/// Rank all candidates against the run set considered "failing".
///
/// `failing` is the set of runs on which the target predicate holds; every
/// other run counts as passing.
pub fn rank_against(
    graph: &ExecutionGraph,
    candidates: &[SitePredicate],
    failing: &RunSet,
) -> Vec<RankingRecord> {
    let big_f = failing.count();
    let mut records: Vec<RankingRecord> = candidates
        .iter()
        .map(|candidate| {
            let truthy = true_runs(graph, candidate);
            let f_p = truthy.intersection_count(failing);
            let s_p = truthy.count() - f_p;

            let observers = &graph.site_observers[&candidate.site];
            let f_p_obs = observers.intersection_count(failing);
            let s_p_obs = observers.count() - f_p_obs;

            let failure = ratio(f_p, s_p);
            let context = ratio(f_p_obs, s_p_obs);
            let increase = failure - context;
            let evidence = ((f_p + 1) as f64).ln() * ((big_f + 1) as f64).ln();
            let importance = if increase <= 0.0 || evidence <= 0.0 {
                0.0
            } else {
                2.0 / (1.0 / increase + 1.0 / evidence)
            };

            RankingRecord {
                text: candidate.text(),
                predicate: candidate.clone(),
                f_p,
                s_p,
                f_p_obs,
                s_p_obs,
                failure,
                context,
                increase,
                importance,
            }
        })
        .collect();

    records.sort_by(|a, b| {
        b.importance
            .total_cmp(&a.importance)
            .then(b.increase.total_cmp(&a.increase))
            .then_with(|| a.text.cmp(&b.text))
    });
    records
}

/// Runs on which the target predicate holds.
pub fn target_runs(graph: &ExecutionGraph, target: &Predicate) -> RunSet {
    match target {
        Predicate::RunFailed => graph.failing_runs.clone(),
        Predicate::RunSucceeded => graph.passing_runs.clone(),
        Predicate::Site(p) => true_runs(graph, p),
    }
}

/// Rank every candidate predicate against the target.
pub fn rank(
    graph: &ExecutionGraph,
    catalog: &SiteCatalog,
    target: &Predicate,
) -> Vec<RankingRecord> {
    let candidates = enumerate_candidates(graph, catalog);
    let failing = target_runs(graph, target);
    rank_against(graph, &candidates, &failing)
}
