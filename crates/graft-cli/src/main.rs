//! The `graft` binary.

mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("GRAFT_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Instrument {
            file,
            calls,
            call_fns,
            loc,
        } => commands::instrument::run(&file, calls, call_fns, loc),
        Commands::Process {
            runs,
            sites,
            out_dir,
        } => commands::process::run(&runs, sites.as_deref(), &out_dir),
        Commands::Analyze {
            runs,
            sites,
            target,
            propagate,
            top,
            format,
            dump_graph,
        } => commands::analyze::run(
            &runs,
            sites.as_deref(),
            &target,
            propagate,
            top,
            &format,
            dump_graph,
        ),
        Commands::Localize {
            ast,
            fault_scheme,
            fix_scheme,
            flatten,
            fault_file,
            fix_file,
            neg_coverage,
            pos_coverage,
            pos_tests,
            neg_tests,
            out,
        } => commands::localize::run(commands::localize::LocalizeArgs {
            ast,
            fault_scheme,
            fix_scheme,
            flatten,
            fault_file,
            fix_file,
            neg_coverage,
            pos_coverage,
            pos_tests,
            neg_tests,
            out,
        }),
    }
}
