//! On-disk artifacts of an instrumentation run.
//!
//! Three files are written next to the input source: the numbered (but not
//! yet instrumented) translation unit, the statement map, and optionally the
//! location map. All three are schema-versioned; a version mismatch on load
//! is an error, never a silent reinterpretation.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use graft_ast::{AstError, Location, StmtKind, TranslationUnit};

use crate::number::{LocationMap, StatementMap};

/// Schema version of the statement-map and location-map artifacts.
pub const MAP_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to read '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to write '{path}': {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed artifact '{path}': {source}")]
    Malformed {
        path: String,
        source: serde_json::Error,
    },
    #[error("artifact '{path}' has schema version {found}, expected {expected}")]
    SchemaMismatch {
        path: String,
        found: u32,
        expected: u32,
    },
    #[error(transparent)]
    Ast(#[from] AstError),
}

/// The serialized `(next_sid, sid -> statement kind)` tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementMapArtifact {
    pub schema_version: u32,
    pub next_sid: u32,
    pub map: IndexMap<u32, StmtKind>,
}

impl StatementMapArtifact {
    pub fn new(next_sid: u32, map: StatementMap) -> Self {
        StatementMapArtifact {
            schema_version: MAP_SCHEMA_VERSION,
            next_sid,
            map,
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ArtifactError> {
        write_json(path, self)
    }

    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let artifact: StatementMapArtifact = read_json(path)?;
        check_version(path, artifact.schema_version)?;
        Ok(artifact)
    }
}

/// The serialized `sid -> (file, line, byte)` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationMapArtifact {
    pub schema_version: u32,
    pub map: IndexMap<u32, Location>,
}

impl LocationMapArtifact {
    pub fn new(map: LocationMap) -> Self {
        LocationMapArtifact {
            schema_version: MAP_SCHEMA_VERSION,
            map,
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ArtifactError> {
        write_json(path, self)
    }

    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let artifact: LocationMapArtifact = read_json(path)?;
        check_version(path, artifact.schema_version)?;
        Ok(artifact)
    }
}

/// Write the numbered, uninstrumented unit (the `<src>.ast` artifact).
pub fn save_numbered_unit(path: &Path, unit: &TranslationUnit) -> Result<(), ArtifactError> {
    Ok(unit.save(path)?)
}

/// Read a previously numbered unit back.
pub fn load_numbered_unit(path: &Path) -> Result<TranslationUnit, ArtifactError> {
    Ok(TranslationUnit::load(path)?)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    let text = serde_json::to_string_pretty(value).map_err(|source| ArtifactError::Malformed {
        path: path.display().to_string(),
        source,
    })?;
    std::fs::write(path, text).map_err(|source| ArtifactError::Write {
        path: path.display().to_string(),
        source,
    })
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ArtifactError> {
    let text = std::fs::read_to_string(path).map_err(|source| ArtifactError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ArtifactError::Malformed {
        path: path.display().to_string(),
        source,
    })
}

fn check_version(path: &Path, found: u32) -> Result<(), ArtifactError> {
    if found != MAP_SCHEMA_VERSION {
        return Err(ArtifactError::SchemaMismatch {
            path: path.display().to_string(),
            found,
            expected: MAP_SCHEMA_VERSION,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_ast::{Exp, Instr, Lval};

    #[test]
    fn statement_map_round_trips() {
        let mut map = StatementMap::new();
        map.insert(
            1,
            StmtKind::Instr(vec![Instr::Set(
                Lval::Var("x".into()),
                Exp::IntLit(1),
                Location::unknown(),
            )]),
        );
        map.insert(2, StmtKind::Return(Some(Exp::IntLit(0)), Location::unknown()));

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("demo.ht");
        let artifact = StatementMapArtifact::new(3, map);
        artifact.save(&path).expect("save");
        let back = StatementMapArtifact::load(&path).expect("load");
        assert_eq!(artifact, back);
        // IndexMap keeps insertion order across the round trip.
        assert_eq!(back.map.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn version_mismatch_fails_loudly() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("demo.ht");
        let mut artifact = StatementMapArtifact::new(1, StatementMap::new());
        artifact.schema_version = 9;
        write_json(&path, &artifact).expect("write");
        match StatementMapArtifact::load(&path) {
            Err(ArtifactError::SchemaMismatch { found: 9, .. }) => {}
            other => panic!("expected SchemaMismatch, got {other:?}"),
        }
    }
}
