#![doc = include_str!("../README.md")]

//! Trace ingestion and the dynamic execution graph.

pub mod graph;
pub mod ingest;
pub mod runs;
pub mod sites;

pub use graph::{build_graph, print_fault_localization, print_graph, ExecutionGraph, NodeData,
    NodeKey};
pub use ingest::{
    process_file, process_run, read_processed, render_processed, write_processed, IngestError,
    ProcessedRun,
};
pub use runs::{parse_runs_listing, RunEntry, RunId, RunLabel, RunSet, RunsError};
pub use sites::{SiteCatalog, SiteEntry, SiteId, SiteKind, SitesError, SITES_SCHEMA_VERSION};
