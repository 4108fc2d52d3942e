//! The `process` subcommand.

use std::path::Path;

use miette::{miette, Context, IntoDiagnostic};
use tracing::info;

use graft_trace::{parse_runs_listing, process_file, write_processed, SiteCatalog};

pub(crate) fn run(
    runs: &Path,
    sites: Option<&Path>,
    out_dir: &Path,
) -> miette::Result<()> {
    let catalog = match sites {
        Some(path) => SiteCatalog::load(path).into_diagnostic()?,
        None => SiteCatalog::new(),
    };
    let entries = parse_runs_listing(runs).into_diagnostic()?;
    std::fs::create_dir_all(out_dir).into_diagnostic()?;

    for entry in &entries {
        let processed = process_file(&entry.path, entry.label, &catalog)
            .into_diagnostic()
            .wrap_err_with(|| format!("processing '{}'", entry.path.display()))?;
        let name = entry
            .path
            .file_name()
            .ok_or_else(|| miette!("trace path '{}' has no file name", entry.path.display()))?;
        let mut out_name = name.to_os_string();
        out_name.push(".processed");
        let out_path = out_dir.join(out_name);
        write_processed(&out_path, &processed).into_diagnostic()?;
        info!(
            from = %entry.path.display(),
            to = %out_path.display(),
            "processed trace"
        );
    }
    println!("processed {} trace file(s)", entries.len());
    Ok(())
}
