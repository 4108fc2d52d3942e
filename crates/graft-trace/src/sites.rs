//! Instrumentation sites and the site catalog.
//!
//! A site is a logical observation point, distinct from a statement
//! identifier: one statement may host several sites. The catalog maps site
//! numbers to their kind so ingestion can segregate scalar-pair records and
//! the predicate engine can pick the right candidate family per site.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Site number as emitted in trace records.
pub type SiteId = u32;

/// What a site observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteKind {
    /// Branch outcome: one value, nonzero when the branch was taken.
    Branch,
    /// Sign of a returned value.
    Return,
    /// Comparison of two scalars.
    ScalarPair,
    /// A user-supplied predicate: one value, nonzero when it held.
    Predicate,
}

/// Schema version of the site-catalog artifact.
pub const SITES_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SitesError {
    #[error("failed to read site catalog '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed site catalog '{path}': {source}")]
    Malformed {
        path: String,
        source: serde_json::Error,
    },
    #[error("site catalog '{path}' has schema version {found}, expected {expected}")]
    SchemaMismatch {
        path: String,
        found: u32,
        expected: u32,
    },
}

/// The supplied site family: `site -> kind`, with an optional statement
/// identifier per site for localization back to atoms.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteCatalog {
    #[serde(default)]
    pub schema_version: u32,
    pub sites: IndexMap<SiteId, SiteEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteEntry {
    pub kind: SiteKind,
    /// Statement hosting the site, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<u32>,
    /// Printable description (e.g. the guarding C expression).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl SiteCatalog {
    pub fn new() -> Self {
        SiteCatalog {
            schema_version: SITES_SCHEMA_VERSION,
            sites: IndexMap::new(),
        }
    }

    /// Kind of a site; sites missing from the catalog observe branches.
    pub fn kind_of(&self, site: SiteId) -> SiteKind {
        self.sites
            .get(&site)
            .map(|e| e.kind)
            .unwrap_or(SiteKind::Branch)
    }

    pub fn sid_of(&self, site: SiteId) -> Option<u32> {
        self.sites.get(&site).and_then(|e| e.sid)
    }

    pub fn load(path: &Path) -> Result<Self, SitesError> {
        let text = std::fs::read_to_string(path).map_err(|source| SitesError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let catalog: SiteCatalog =
            serde_json::from_str(&text).map_err(|source| SitesError::Malformed {
                path: path.display().to_string(),
                source,
            })?;
        if catalog.schema_version != SITES_SCHEMA_VERSION {
            return Err(SitesError::SchemaMismatch {
                path: path.display().to_string(),
                found: catalog.schema_version,
                expected: SITES_SCHEMA_VERSION,
            });
        }
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_sites_default_to_branch() {
        let catalog = SiteCatalog::new();
        assert_eq!(catalog.kind_of(17), SiteKind::Branch);
    }

    #[test]
    fn catalog_round_trips_through_json() {
        let mut catalog = SiteCatalog::new();
        catalog.sites.insert(
            3,
            SiteEntry {
                kind: SiteKind::ScalarPair,
                sid: Some(11),
                text: Some("x < y".into()),
            },
        );
        let text = serde_json::to_string(&catalog).expect("serialize");
        let back: SiteCatalog = serde_json::from_str(&text).expect("deserialize");
        assert_eq!(catalog, back);
        assert_eq!(back.kind_of(3), SiteKind::ScalarPair);
        assert_eq!(back.sid_of(3), Some(11));
    }
}
