//! Run identities, outcomes, and compact per-run observation sets.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of a run within one analysis session: its index in the
/// runs-listing file.
pub type RunId = usize;

/// Outcome label of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunLabel {
    Passed,
    Failed,
}

impl RunLabel {
    pub fn is_failed(self) -> bool {
        matches!(self, RunLabel::Failed)
    }
}

#[derive(Debug, Error)]
pub enum RunsError {
    #[error("failed to read runs listing '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("runs listing '{path}' line {line}: expected '<path> <passed|failed>', got '{text}'")]
    Malformed {
        path: String,
        line: usize,
        text: String,
    },
}

/// One entry of the runs-listing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunEntry {
    pub path: PathBuf,
    pub label: RunLabel,
}

/// Parse a runs-listing file: one `<path> <passed|failed>` per line, blank
/// lines ignored.
pub fn parse_runs_listing(path: &Path) -> Result<Vec<RunEntry>, RunsError> {
    let text = std::fs::read_to_string(path).map_err(|source| RunsError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let mut entries = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let malformed = || RunsError::Malformed {
            path: path.display().to_string(),
            line: idx + 1,
            text: line.to_string(),
        };
        let (file, label) = line.rsplit_once(char::is_whitespace).ok_or_else(malformed)?;
        let label = match label {
            "passed" => RunLabel::Passed,
            "failed" => RunLabel::Failed,
            _ => return Err(malformed()),
        };
        entries.push(RunEntry {
            path: PathBuf::from(file.trim_end()),
            label,
        });
    }
    Ok(entries)
}

/// A compact bitset over run identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSet {
    blocks: Vec<u64>,
}

impl RunSet {
    pub fn new() -> Self {
        RunSet::default()
    }

    pub fn insert(&mut self, run: RunId) {
        let block = run / 64;
        if block >= self.blocks.len() {
            self.blocks.resize(block + 1, 0);
        }
        self.blocks[block] |= 1 << (run % 64);
    }

    pub fn contains(&self, run: RunId) -> bool {
        self.blocks
            .get(run / 64)
            .is_some_and(|b| b & (1 << (run % 64)) != 0)
    }

    /// Number of runs in the set.
    pub fn count(&self) -> u64 {
        self.blocks.iter().map(|b| b.count_ones() as u64).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|b| *b == 0)
    }

    pub fn union_with(&mut self, other: &RunSet) {
        if other.blocks.len() > self.blocks.len() {
            self.blocks.resize(other.blocks.len(), 0);
        }
        for (dst, src) in self.blocks.iter_mut().zip(&other.blocks) {
            *dst |= src;
        }
    }

    /// Number of runs present in both sets.
    pub fn intersection_count(&self, other: &RunSet) -> u64 {
        self.blocks
            .iter()
            .zip(&other.blocks)
            .map(|(a, b)| (a & b).count_ones() as u64)
            .sum()
    }

    /// Iterate the run ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = RunId> + '_ {
        self.blocks.iter().enumerate().flat_map(|(block, bits)| {
            (0..64).filter_map(move |bit| {
                if bits & (1u64 << bit) != 0 {
                    Some(block * 64 + bit)
                } else {
                    None
                }
            })
        })
    }
}

impl FromIterator<RunId> for RunSet {
    fn from_iter<I: IntoIterator<Item = RunId>>(iter: I) -> Self {
        let mut set = RunSet::new();
        for run in iter {
            set.insert(run);
        }
        set
    }
}
