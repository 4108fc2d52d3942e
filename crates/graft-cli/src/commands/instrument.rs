//! The `instrument` subcommand.

use std::io::Write;
use std::path::{Path, PathBuf};

use miette::{Context, IntoDiagnostic};
use tracing::info;

use graft_ast::{pretty, TranslationUnit};
use graft_instrument::{
    artifacts, ArtifactPaths, InstrumentOptions, LocationMapArtifact, Numbering,
    StatementMapArtifact,
};

/// Where the frontend leaves the AST artifact for an input C file.
fn frontend_artifact(file: &Path) -> PathBuf {
    if file.extension().is_some_and(|e| e == "json") {
        file.to_path_buf()
    } else {
        let mut name = file.as_os_str().to_os_string();
        name.push(".json");
        PathBuf::from(name)
    }
}

/// The `<src>.c` path the artifact stems derive from.
fn source_path(file: &Path) -> PathBuf {
    if file.extension().is_some_and(|e| e == "json") {
        file.with_extension("")
    } else {
        file.to_path_buf()
    }
}

pub(crate) fn run(
    file: &Path,
    calls: bool,
    call_fns: Vec<String>,
    loc: bool,
) -> miette::Result<()> {
    let artifact = frontend_artifact(file);
    let unit = TranslationUnit::load(&artifact)
        .into_diagnostic()
        .wrap_err_with(|| format!("loading frontend artifact '{}'", artifact.display()))?;

    let source = source_path(file);
    let paths = ArtifactPaths::for_source(&source);
    let options = InstrumentOptions {
        split_calls: calls,
        call_targets: call_fns,
        with_locations: loc,
    };

    let mut numbering = Numbering::new();
    let output = graft_instrument::instrument_unit(
        unit,
        &paths.trace.display().to_string(),
        &mut numbering,
        &options,
    );
    info!(
        statements = output.map.len(),
        ast = %paths.ast.display(),
        "instrumented"
    );

    artifacts::save_numbered_unit(&paths.ast, &output.numbered).into_diagnostic()?;
    StatementMapArtifact::new(output.next_sid, output.map)
        .save(&paths.map)
        .into_diagnostic()?;
    if let Some(locs) = output.locs {
        LocationMapArtifact::new(locs)
            .save(&paths.locs)
            .into_diagnostic()?;
    }

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(pretty::unit_to_string(&output.instrumented).as_bytes())
        .into_diagnostic()?;
    Ok(())
}
