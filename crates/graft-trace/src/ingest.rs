//! Raw trace preprocessing.
//!
//! A raw trace is line oriented: state headers (lines beginning with `*`)
//! and site-visit records `site,info_1,info_2,…`. Preprocessing passes state
//! headers and scalar-pair records through verbatim, collapses runs of
//! byte-identical other records into `(record, count)` aggregations, and
//! tabulates each distinct consecutive-site transition once per run.
//! Malformed records are skipped with a warning; counters are unaffected.

use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;
use tracing::warn;

use crate::runs::RunLabel;
use crate::sites::{SiteCatalog, SiteId, SiteKind};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read trace '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to write processed trace '{path}': {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("processed trace '{path}' is missing the '{section}' section")]
    MissingSection { path: String, section: &'static str },
}

/// A preprocessed run, ready for graph construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedRun {
    pub label: RunLabel,
    /// State headers and scalar-pair records, in original order.
    pub scalar_section: Vec<String>,
    /// `(record, count)` aggregations of the remaining records, one entry
    /// per streak of identical lines.
    pub aggregated: Vec<(String, u64)>,
    /// Distinct `(from, to)` site transitions in first-observation order.
    pub transitions: Vec<(SiteId, SiteId)>,
}

/// Parse one site-visit record: `site,info_1,…`.
pub fn parse_record(line: &str) -> Option<(SiteId, Vec<i64>)> {
    let mut parts = line.split(',');
    let site = parts.next()?.trim().parse().ok()?;
    let mut info = Vec::new();
    for part in parts {
        info.push(part.trim().parse().ok()?);
    }
    Some((site, info))
}

/// Preprocess one raw trace.
pub fn process_run(raw: &str, label: RunLabel, catalog: &SiteCatalog) -> ProcessedRun {
    let mut scalar_section = Vec::new();
    let mut aggregated: Vec<(String, u64)> = Vec::new();
    let mut transitions = Vec::new();
    let mut seen_transitions: HashSet<(SiteId, SiteId)> = HashSet::new();
    let mut prev_site: Option<SiteId> = None;

    for line in raw.lines() {
        if line.is_empty() {
            continue;
        }
        if line.starts_with('*') {
            scalar_section.push(line.to_string());
            continue;
        }
        let Some((site, _info)) = parse_record(line) else {
            warn!(record = line, "skipping malformed trace record");
            continue;
        };

        if let Some(prev) = prev_site {
            if prev != site && seen_transitions.insert((prev, site)) {
                transitions.push((prev, site));
            }
        }
        prev_site = Some(site);

        if catalog.kind_of(site) == SiteKind::ScalarPair {
            scalar_section.push(line.to_string());
        } else {
            match aggregated.last_mut() {
                Some((last, count)) if last == line => *count += 1,
                _ => aggregated.push((line.to_string(), 1)),
            }
        }
    }

    ProcessedRun {
        label,
        scalar_section,
        aggregated,
        transitions,
    }
}

/// Read and preprocess a raw trace file.
pub fn process_file(
    path: &Path,
    label: RunLabel,
    catalog: &SiteCatalog,
) -> Result<ProcessedRun, IngestError> {
    let raw = std::fs::read_to_string(path).map_err(|source| IngestError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Ok(process_run(&raw, label, catalog))
}

const SCALAR_HEADER: &str = "SCALAR PAIRS INFO:";
const OTHER_HEADER: &str = "OTHER SITES INFO:";
const TRANSITION_HEADER: &str = "TRANSITION TABLE:";

/// Render a processed run in its on-disk layout.
pub fn render_processed(run: &ProcessedRun) -> String {
    let mut out = String::new();
    out.push_str(SCALAR_HEADER);
    out.push('\n');
    for line in &run.scalar_section {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(OTHER_HEADER);
    out.push('\n');
    for (record, count) in &run.aggregated {
        out.push_str(record);
        out.push(',');
        out.push_str(&count.to_string());
        out.push('\n');
    }
    out.push_str(TRANSITION_HEADER);
    out.push('\n');
    for (from, to) in &run.transitions {
        out.push_str(&format!("{from},{to}\n"));
    }
    out
}

/// Write a processed run next to the analyzer inputs.
pub fn write_processed(path: &Path, run: &ProcessedRun) -> Result<(), IngestError> {
    std::fs::write(path, render_processed(run)).map_err(|source| IngestError::Write {
        path: path.display().to_string(),
        source,
    })
}

/// Parse a processed-trace file back into a [`ProcessedRun`].
pub fn read_processed(path: &Path, label: RunLabel) -> Result<ProcessedRun, IngestError> {
    let text = std::fs::read_to_string(path).map_err(|source| IngestError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_processed(&text, label).ok_or_else(|| IngestError::MissingSection {
        path: path.display().to_string(),
        section: "SCALAR PAIRS INFO / OTHER SITES INFO / TRANSITION TABLE",
    })
}

fn parse_processed(text: &str, label: RunLabel) -> Option<ProcessedRun> {
    #[derive(PartialEq)]
    enum Section {
        Preamble,
        Scalar,
        Other,
        Transition,
    }

    let mut section = Section::Preamble;
    let mut run = ProcessedRun {
        label,
        scalar_section: Vec::new(),
        aggregated: Vec::new(),
        transitions: Vec::new(),
    };
    for line in text.lines() {
        match line {
            SCALAR_HEADER => section = Section::Scalar,
            OTHER_HEADER => section = Section::Other,
            TRANSITION_HEADER => section = Section::Transition,
            _ => match section {
                Section::Preamble => return None,
                Section::Scalar => run.scalar_section.push(line.to_string()),
                Section::Other => {
                    let (record, count) = line.rsplit_once(',')?;
                    run.aggregated.push((record.to_string(), count.parse().ok()?));
                }
                Section::Transition => {
                    let (from, to) = line.split_once(',')?;
                    run.transitions
                        .push((from.parse().ok()?, to.parse().ok()?));
                }
            },
        }
    }
    if section == Section::Transition {
        Some(run)
    } else {
        None
    }
}
