//! The `analyze` subcommand.

use std::path::Path;

use miette::{miette, IntoDiagnostic};

use graft_cbi::{rank, Predicate, PropagationState, RankingRecord};
use graft_trace::{
    build_graph, parse_runs_listing, print_graph, process_file, ProcessedRun, SiteCatalog,
};

#[allow(clippy::too_many_arguments)]
pub(crate) fn run(
    runs: &Path,
    sites: Option<&Path>,
    target: &str,
    propagate: bool,
    top: usize,
    format: &str,
    dump_graph: bool,
) -> miette::Result<()> {
    let catalog = match sites {
        Some(path) => SiteCatalog::load(path).into_diagnostic()?,
        None => SiteCatalog::new(),
    };
    let target = match target {
        "failed" => Predicate::RunFailed,
        "succeeded" => Predicate::RunSucceeded,
        other => return Err(miette!("unknown target predicate '{other}'")),
    };

    let entries = parse_runs_listing(runs).into_diagnostic()?;
    let processed: Vec<ProcessedRun> = entries
        .iter()
        .map(|entry| process_file(&entry.path, entry.label, &catalog).into_diagnostic())
        .collect::<miette::Result<_>>()?;
    let graph = build_graph(&processed);

    if dump_graph {
        let mut out = std::io::stdout().lock();
        print_graph(&graph, &mut out).into_diagnostic()?;
    }

    let primary = rank(&graph, &catalog, &target);
    let secondary = if propagate {
        primary
            .first()
            .filter(|best| best.importance > 0.0)
            .map(|best| {
                let mut state = PropagationState::new();
                state.propagate(&graph, &best.predicate);
                state.rank(&graph, &catalog)
            })
    } else {
        None
    };

    match format {
        "json" => {
            let report = serde_json::json!({
                "runs": entries.len(),
                "failing": graph.total_failing(),
                "passing": graph.total_passing(),
                "ranking": &primary[..primary.len().min(top)],
                "propagated": secondary.as_ref().map(|s| &s[..s.len().min(top)]),
            });
            println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
        }
        "text" => {
            println!(
                "{} runs ({} failing, {} passing), {} candidate predicates",
                entries.len(),
                graph.total_failing(),
                graph.total_passing(),
                primary.len()
            );
            print_ranking("ranking", &primary, top);
            if let Some(secondary) = &secondary {
                print_ranking("after propagation", secondary, top);
            }
        }
        other => return Err(miette!("unknown output format '{other}'")),
    }
    Ok(())
}

fn print_ranking(title: &str, records: &[RankingRecord], top: usize) {
    println!("{title}:");
    for record in records.iter().take(top) {
        println!(
            "  imp={:.4} inc={:+.4} f(P)={}/{} obs={}/{}  {}",
            record.importance,
            record.increase,
            record.f_p,
            record.f_p + record.s_p,
            record.f_p_obs,
            record.f_p_obs + record.s_p_obs,
            record.text
        );
    }
}
