//! CLI argument definitions: top-level `Cli` struct and `Commands` enum.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub(crate) const CLI_LONG_ABOUT: &str =
    "Automated program repair toolkit for C: coverage instrumentation, \
    dynamic-predicate fault localization, and program-variant evaluation.\n\n\
    Typical flow:\n  \
    1. graft instrument demo.c > demo.instr.c\n  \
    2. run the instrumented program under its test suite\n  \
    3. graft analyze runs.txt --propagate\n  \
    4. graft localize demo.ast --out demo.rep";

#[derive(Parser)]
#[command(name = "graft")]
#[command(about = "Automated program repair and fault localization for C")]
#[command(long_about = CLI_LONG_ABOUT)]
#[command(version)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Instrument a C program for statement coverage
    #[command(display_order = 10)]
    Instrument {
        /// Input C file (its frontend AST artifact is read from `<file>.json`)
        file: PathBuf,

        /// Split designated calls into their own basic block first
        #[arg(long)]
        calls: bool,

        /// A designated function for call splitting (repeatable)
        #[arg(long = "call-fn", requires = "calls")]
        call_fns: Vec<String>,

        /// Emit the location map and location-tagged trace records
        #[arg(long)]
        loc: bool,
    },

    /// Preprocess raw run traces into the analyzer's processed form
    #[command(display_order = 20)]
    Process {
        /// Runs-listing file: one `<path> <passed|failed>` per line
        runs: PathBuf,

        /// Site catalog mapping site numbers to kinds
        #[arg(long)]
        sites: Option<PathBuf>,

        /// Directory the processed traces are written to
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Build the execution graph and rank predicates by failure association
    #[command(display_order = 30)]
    Analyze {
        /// Runs-listing file: one `<path> <passed|failed>` per line
        runs: PathBuf,

        /// Site catalog mapping site numbers to kinds
        #[arg(long)]
        sites: Option<PathBuf>,

        /// Target predicate: failed | succeeded
        #[arg(long, default_value = "failed")]
        target: String,

        /// Propagate the top predictor and print the secondary ranking
        #[arg(long)]
        propagate: bool,

        /// Only print the strongest N predicates
        #[arg(long, default_value_t = 20)]
        top: usize,

        /// Output format: text | json
        #[arg(long, default_value = "text")]
        format: String,

        /// Dump the execution graph adjacency before the ranking
        #[arg(long)]
        dump_graph: bool,
    },

    /// Compute weighted fault/fix localizations and write the representation
    #[command(display_order = 40)]
    Localize {
        /// Numbered-unit artifact produced by `instrument` (`<src>.ast`)
        ast: PathBuf,

        /// Fault scheme: path | uniform | line | weight | oracle | default
        #[arg(long, default_value = "default")]
        fault_scheme: String,

        /// Fix scheme: path | uniform | line | weight | oracle | default
        #[arg(long, default_value = "default")]
        fix_scheme: String,

        /// Duplicate-sid flattening policy: sum | min | max
        #[arg(long, default_value = "sum")]
        flatten: String,

        /// Input records for the fault line/weight schemes
        #[arg(long)]
        fault_file: Option<PathBuf>,

        /// Input records for the fix line/weight schemes
        #[arg(long)]
        fix_file: Option<PathBuf>,

        /// Negative-run coverage trace (produced on demand when absent)
        #[arg(long, default_value = "coverage.neg.path")]
        neg_coverage: PathBuf,

        /// Positive-run coverage trace (produced on demand when absent)
        #[arg(long, default_value = "coverage.pos.path")]
        pos_coverage: PathBuf,

        /// Number of positive tests used when coverage must be rebuilt
        #[arg(long, default_value_t = 0)]
        pos_tests: usize,

        /// Number of negative tests used when coverage must be rebuilt
        #[arg(long, default_value_t = 0)]
        neg_tests: usize,

        /// Where the versioned representation file is written
        #[arg(long, default_value = "variant.rep")]
        out: PathBuf,
    },
}
