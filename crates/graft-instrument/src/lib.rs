#![doc = include_str!("../README.md")]

//! Coverage instrumentation.
//!
//! Four passes run in order: optional call splitting, statement numbering,
//! artifact serialization of the pristine numbered tree, and the splice of
//! trace-emitting probes. The reserved label prefix marks synthetic
//! statements so instrumentation never traces its own probes.

pub mod artifacts;
pub mod coverage;
pub mod number;
pub mod split;

use std::path::{Path, PathBuf};

use tracing::debug;

use graft_ast::TranslationUnit;

pub use artifacts::{
    ArtifactError, LocationMapArtifact, StatementMapArtifact, MAP_SCHEMA_VERSION,
};
pub use coverage::{instrument_numbered, COVERAGE_STREAM};
pub use number::{number_unit, LocationMap, Numbered, Numbering, StatementMap};
pub use split::split_calls;

/// Labels beginning with this token mark user-synthetic statements; they are
/// excluded from numbering and stripped from the output.
pub const RESERVED_PREFIX: &str = "claire";

/// Options for a full instrumentation run.
#[derive(Debug, Clone, Default)]
pub struct InstrumentOptions {
    /// Split designated calls into their own basic block first.
    pub split_calls: bool,
    /// The designated call set for splitting.
    pub call_targets: Vec<String>,
    /// Emit the location map and location-tagged trace records.
    pub with_locations: bool,
}

/// Everything a full instrumentation run produces.
pub struct InstrumentOutput {
    /// The instrumented unit (what goes to stdout as C source).
    pub instrumented: TranslationUnit,
    /// The numbered, uninstrumented unit (the `<src>.ast` artifact).
    pub numbered: TranslationUnit,
    pub map: StatementMap,
    pub locs: Option<LocationMap>,
    pub next_sid: u32,
}

/// Derived artifact paths for an input source file.
///
/// For `dir/demo.c` the artifacts are `dir/demo.ast`, `dir/demo.ht`,
/// `dir/demo_loc.ht`, and the instrumented program writes `dir/demo.path`.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub ast: PathBuf,
    pub map: PathBuf,
    pub locs: PathBuf,
    pub trace: PathBuf,
}

impl ArtifactPaths {
    pub fn for_source(source: &Path) -> Self {
        let stem = source.with_extension("");
        let loc_name = format!(
            "{}_loc.ht",
            stem.file_name().map(|s| s.to_string_lossy()).unwrap_or_default()
        );
        ArtifactPaths {
            ast: stem.with_extension("ast"),
            map: stem.with_extension("ht"),
            locs: stem.with_file_name(loc_name),
            trace: stem.with_extension("path"),
        }
    }
}

/// Run the instrumentation passes over `unit`.
///
/// The caller persists the artifacts from the returned output; pass
/// boundaries are kept out of this function so the variant representation
/// can reuse it without touching the filesystem.
pub fn instrument_unit(
    unit: TranslationUnit,
    trace_path: &str,
    numbering: &mut Numbering,
    options: &InstrumentOptions,
) -> InstrumentOutput {
    let unit = if options.split_calls {
        debug!(targets = ?options.call_targets, "splitting designated calls");
        split_calls(unit, &options.call_targets)
    } else {
        unit
    };

    let numbered = number_unit(unit, numbering, options.with_locations);
    debug!(
        statements = numbered.map.len(),
        "numbered traceable statements"
    );

    let pristine = numbered.unit.clone();
    let instrumented =
        instrument_numbered(numbered.unit, trace_path, numbered.locs.as_ref());

    InstrumentOutput {
        instrumented,
        numbered: pristine,
        map: numbered.map,
        locs: numbered.locs,
        next_sid: numbering.next_sid(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_paths_follow_the_source_stem() {
        let paths = ArtifactPaths::for_source(Path::new("dir/demo.c"));
        assert_eq!(paths.ast, Path::new("dir/demo.ast"));
        assert_eq!(paths.map, Path::new("dir/demo.ht"));
        assert_eq!(paths.locs, Path::new("dir/demo_loc.ht"));
        assert_eq!(paths.trace, Path::new("dir/demo.path"));
    }
}
