//! The dynamic execution graph.
//!
//! Nodes are `(site, observed state)` tuples discovered from processed
//! traces; each carries visit counters split by run outcome and the set of
//! runs that observed it. Edges are observed site transitions carrying the
//! runs on which they fired. Construction order is first-observation order,
//! so a fixed set of processed runs always yields a structurally identical
//! graph.

use std::io::{self, Write};

use indexmap::IndexMap;

use crate::ingest::{parse_record, ProcessedRun};
use crate::runs::{RunLabel, RunSet};
use crate::sites::{SiteCatalog, SiteId};

/// A graph node key: the site and the recorded state vector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeKey {
    pub site: SiteId,
    pub state: Vec<i64>,
}

/// Per-node observation counters.
#[derive(Debug, Clone, Default)]
pub struct NodeData {
    pub visits_failed: u64,
    pub visits_passed: u64,
    /// Runs on which this (site, state) was observed at least once.
    pub runs: RunSet,
}

/// The assembled graph.
#[derive(Debug, Clone, Default)]
pub struct ExecutionGraph {
    pub nodes: IndexMap<NodeKey, NodeData>,
    /// `(from, to)` site transitions and the runs they fired on.
    pub edges: IndexMap<(SiteId, SiteId), RunSet>,
    /// Runs on which each site was reached at all.
    pub site_observers: IndexMap<SiteId, RunSet>,
    /// Outcome of every run, indexed by run id.
    pub run_labels: Vec<RunLabel>,
    pub failing_runs: RunSet,
    pub passing_runs: RunSet,
}

impl ExecutionGraph {
    pub fn total_failing(&self) -> u64 {
        self.failing_runs.count()
    }

    pub fn total_passing(&self) -> u64 {
        self.passing_runs.count()
    }

    /// All states observed at `site`, in first-observation order.
    pub fn states_of(&self, site: SiteId) -> impl Iterator<Item = (&NodeKey, &NodeData)> {
        self.nodes.iter().filter(move |(key, _)| key.site == site)
    }
}

/// Fold processed runs into a graph. Run ids are positions in `runs`.
pub fn build_graph(runs: &[ProcessedRun]) -> ExecutionGraph {
    let mut graph = ExecutionGraph::default();
    for (run_id, run) in runs.iter().enumerate() {
        graph.run_labels.push(run.label);
        if run.label.is_failed() {
            graph.failing_runs.insert(run_id);
        } else {
            graph.passing_runs.insert(run_id);
        }

        let mut visit = |record: &str, count: u64| {
            let Some((site, state)) = parse_record(record) else {
                return;
            };
            let node = graph
                .nodes
                .entry(NodeKey { site, state })
                .or_default();
            if run.label.is_failed() {
                node.visits_failed += count;
            } else {
                node.visits_passed += count;
            }
            node.runs.insert(run_id);
            graph
                .site_observers
                .entry(site)
                .or_default()
                .insert(run_id);
        };

        for line in &run.scalar_section {
            if !line.starts_with('*') {
                visit(line, 1);
            }
        }
        for (record, count) in &run.aggregated {
            visit(record, *count);
        }
        for &(from, to) in &run.transitions {
            graph.edges.entry((from, to)).or_default().insert(run_id);
        }
    }
    graph
}

/// Dump the graph adjacency for debugging.
pub fn print_graph(graph: &ExecutionGraph, out: &mut dyn Write) -> io::Result<()> {
    writeln!(
        out,
        "execution graph: {} nodes, {} edges, {} failing / {} passing runs",
        graph.nodes.len(),
        graph.edges.len(),
        graph.total_failing(),
        graph.total_passing()
    )?;
    for (key, data) in &graph.nodes {
        let state = key
            .state
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");
        writeln!(
            out,
            "node site={} state=[{}] failed={} passed={}",
            key.site, state, data.visits_failed, data.visits_passed
        )?;
    }
    for ((from, to), runs) in &graph.edges {
        let runs = runs
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(",");
        writeln!(out, "edge {from} -> {to} on runs [{runs}]")?;
    }
    Ok(())
}

/// Per-atom fault weights derived from site observations.
///
/// A statement observed only on failing runs weighs 1.0, on both 0.1, and on
/// passing runs only 0.0. The site catalog supplies the site-to-statement
/// mapping; sites without one report under their site number.
pub fn fault_weights(graph: &ExecutionGraph, catalog: &SiteCatalog) -> IndexMap<u32, f64> {
    let mut weights = IndexMap::new();
    for (site, observers) in &graph.site_observers {
        let atom = catalog.sid_of(*site).unwrap_or(*site);
        let on_failing = observers.intersection_count(&graph.failing_runs) > 0;
        let on_passing = observers.intersection_count(&graph.passing_runs) > 0;
        let weight = match (on_failing, on_passing) {
            (true, false) => 1.0,
            (true, true) => 0.1,
            _ => 0.0,
        };
        weights.insert(atom, weight);
    }
    weights
}

/// Print one line per atom with its fault weight and, when good-path weights
/// are supplied, the intersection-baseline weight alongside.
pub fn print_fault_localization(
    graph: &ExecutionGraph,
    catalog: &SiteCatalog,
    good_path_weights: Option<&IndexMap<u32, f64>>,
    out: &mut dyn Write,
) -> io::Result<()> {
    for (atom, weight) in fault_weights(graph, catalog) {
        match good_path_weights.and_then(|g| g.get(&atom)) {
            Some(baseline) => writeln!(out, "{atom} {weight} {baseline}")?,
            None => writeln!(out, "{atom} {weight}")?,
        }
    }
    Ok(())
}
