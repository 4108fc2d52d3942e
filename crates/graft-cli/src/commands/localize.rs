//! The `localize` subcommand.

use std::path::PathBuf;

use miette::IntoDiagnostic;
use tracing::info;

use graft_variant::{CVariant, EvalContext, Variant, VariantConfig};

pub(crate) struct LocalizeArgs {
    pub ast: PathBuf,
    pub fault_scheme: String,
    pub fix_scheme: String,
    pub flatten: String,
    pub fault_file: Option<PathBuf>,
    pub fix_file: Option<PathBuf>,
    pub neg_coverage: PathBuf,
    pub pos_coverage: PathBuf,
    pub pos_tests: usize,
    pub neg_tests: usize,
    pub out: PathBuf,
}

pub(crate) fn run(args: LocalizeArgs) -> miette::Result<()> {
    let config = VariantConfig {
        fault_scheme: args.fault_scheme.parse().into_diagnostic()?,
        fix_scheme: args.fix_scheme.parse().into_diagnostic()?,
        flatten: args.flatten.parse().into_diagnostic()?,
        fault_file: args.fault_file,
        fix_file: args.fix_file,
        neg_coverage: args.neg_coverage,
        pos_coverage: args.pos_coverage,
        pos_tests: args.pos_tests,
        neg_tests: args.neg_tests,
        ..VariantConfig::default()
    };
    let mut ctx = EvalContext::new(config);

    let mut variant = CVariant::new();
    variant.from_source(&args.ast).into_diagnostic()?;
    variant.compute_localization(&mut ctx).into_diagnostic()?;
    variant.save_binary(&args.out).into_diagnostic()?;

    info!(out = %args.out.display(), "localization written");
    println!(
        "fault path: {} entries, fix path: {} entries -> {}",
        variant.get_fault_localization().len(),
        variant.get_fix_localization().len(),
        args.out.display()
    );
    Ok(())
}
