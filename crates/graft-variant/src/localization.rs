//! Weighted fault and fix paths.
//!
//! A weighted path is an ordered sequence of `(sid, weight)` pairs biasing
//! the search toward suspect statements. Several interchangeable schemes
//! produce them; duplicate identifiers can be flattened under a policy
//! before the path is handed to the search driver.

use std::path::Path;
use std::str::FromStr;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::warn;

/// Ordered `(sid, weight)` pairs, weights non-negative.
pub type WeightedPath = Vec<(u32, f64)>;

#[derive(Debug, Error)]
pub enum LocalizationError {
    #[error("failed to read localization input '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("unknown localization scheme '{0}'")]
    UnknownScheme(String),
    #[error("unknown flatten policy '{0}'")]
    UnknownPolicy(String),
}

/// How fault or fix weights are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Derived from coverage traces of positive and negative runs.
    Path,
    /// Every atom weighs 1.0.
    Uniform,
    /// `file,line,weight` records resolved to atoms via source lines.
    Line,
    /// `file,sid,weight` records.
    Weight,
    /// Reserved hook; a no-op unless a representation overrides it.
    Oracle,
    /// Fault and fix both fall back to [`Scheme::Path`].
    Default,
}

impl FromStr for Scheme {
    type Err = LocalizationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "path" => Ok(Scheme::Path),
            "uniform" => Ok(Scheme::Uniform),
            "line" => Ok(Scheme::Line),
            "weight" => Ok(Scheme::Weight),
            "oracle" => Ok(Scheme::Oracle),
            "default" => Ok(Scheme::Default),
            other => Err(LocalizationError::UnknownScheme(other.to_string())),
        }
    }
}

/// How duplicate identifiers combine during flattening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlattenPolicy {
    #[default]
    Sum,
    Min,
    Max,
}

impl FromStr for FlattenPolicy {
    type Err = LocalizationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sum" => Ok(FlattenPolicy::Sum),
            "min" => Ok(FlattenPolicy::Min),
            "max" => Ok(FlattenPolicy::Max),
            other => Err(LocalizationError::UnknownPolicy(other.to_string())),
        }
    }
}

/// Put a weighted path into source order: ascending statement identifier.
///
/// Accumulation order is observation order; this is the final step before
/// the path is handed to the search driver.
pub fn source_order(mut path: WeightedPath) -> WeightedPath {
    path.sort_by_key(|&(sid, _)| sid);
    path
}

/// Combine duplicate identifiers under `policy`, keeping first-occurrence
/// order.
pub fn flatten(path: &WeightedPath, policy: FlattenPolicy) -> WeightedPath {
    let mut combined: IndexMap<u32, f64> = IndexMap::new();
    for &(sid, weight) in path {
        match combined.entry(sid) {
            indexmap::map::Entry::Occupied(mut slot) => {
                let current = *slot.get();
                *slot.get_mut() = match policy {
                    FlattenPolicy::Sum => current + weight,
                    FlattenPolicy::Min => current.min(weight),
                    FlattenPolicy::Max => current.max(weight),
                };
            }
            indexmap::map::Entry::Vacant(slot) => {
                slot.insert(weight);
            }
        }
    }
    combined.into_iter().collect()
}

/// Read a coverage trace: one statement identifier per line.
///
/// Unparsable lines are skipped with a warning.
pub fn read_path_sids(path: &Path) -> Result<Vec<u32>, LocalizationError> {
    let text = std::fs::read_to_string(path).map_err(|source| LocalizationError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let mut sids = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        // Location-tagged records carry `sid,file,line,byte`.
        let head = line.split(',').next().unwrap_or(line);
        match head.parse() {
            Ok(sid) => sids.push(sid),
            Err(_) => warn!(line, "skipping unparsable coverage record"),
        }
    }
    Ok(sids)
}

/// The path scheme: weights from negative vs. positive coverage.
///
/// A statement visited only on negative runs weighs 1.0 and one visited on
/// both weighs 0.1; statements on the positive path only appear with fault
/// weight 0. Every statement on the positive path receives fix weight 0.5.
pub fn path_scheme(neg: &[u32], pos: &[u32]) -> (WeightedPath, WeightedPath) {
    let pos_set: std::collections::HashSet<u32> = pos.iter().copied().collect();

    let mut fault: WeightedPath = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for &sid in neg {
        if seen.insert(sid) {
            let weight = if pos_set.contains(&sid) { 0.1 } else { 1.0 };
            fault.push((sid, weight));
        }
    }
    for &sid in pos {
        if seen.insert(sid) {
            fault.push((sid, 0.0));
        }
    }

    let mut fix: WeightedPath = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for &sid in pos {
        if seen.insert(sid) {
            fix.push((sid, 0.5));
        }
    }

    (fault, fix)
}

/// A `file,int,weight` record from a line- or weight-scheme input.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightRecord {
    /// Source file; may be empty.
    pub file: String,
    pub value: i64,
    pub weight: f64,
}

/// Read `file,int,weight` records. The weight defaults to 1.0 and the file
/// may be empty; unparsable lines are skipped with a warning.
pub fn read_weight_records(path: &Path) -> Result<Vec<WeightRecord>, LocalizationError> {
    let text = std::fs::read_to_string(path).map_err(|source| LocalizationError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let mut records = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split(',');
        let file = parts.next().unwrap_or_default().trim().to_string();
        let Some(value) = parts.next().and_then(|v| v.trim().parse().ok()) else {
            warn!(line, "skipping unparsable weight record");
            continue;
        };
        let weight = parts
            .next()
            .and_then(|w| w.trim().parse().ok())
            .unwrap_or(1.0);
        records.push(WeightRecord {
            file,
            value,
            weight,
        });
    }
    Ok(records)
}

/// Every atom in `1..=max_atom` with weight 1.0.
pub fn uniform_scheme(max_atom: u32) -> WeightedPath {
    (1..=max_atom).map(|sid| (sid, 1.0)).collect()
}
