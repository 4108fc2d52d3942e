//! Compile and test caching.
//!
//! Each variant carries two cache slots: the source snapshot (file name plus
//! content digest) and the compile result. A process-wide persistent cache
//! maps `digest -> test -> outcome` and survives across sessions in a file
//! with a fixed magic header, a version line, and length-prefixed JSON
//! entries. A version mismatch or corrupt entry discards the whole file;
//! the cache never reinterprets foreign layouts.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

/// Lowercase hex SHA-256 of the given source text.
pub fn digest_of(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// The written-out source of a variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSnapshot {
    pub path: PathBuf,
    pub digest: String,
}

/// Compile status of a variant's snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CompileState {
    #[default]
    NotCompiled,
    Failed,
    Compiled(PathBuf),
}

/// The per-variant cache slots. Any mutation of the underlying program
/// resets both.
#[derive(Debug, Clone, Default)]
pub struct CompileCache {
    pub snapshot: Option<SourceSnapshot>,
    pub state: CompileState,
}

impl CompileCache {
    pub fn invalidate(&mut self) {
        self.snapshot = None;
        self.state = CompileState::NotCompiled;
    }
}

/// Result of one test-case evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub passed: bool,
    pub fitness: Vec<f64>,
}

const CACHE_MAGIC: &str = "GRAFTCACHE";
/// Bumped by hand on incompatible layout changes.
pub const CACHE_VERSION: u32 = 3;
/// Entries recorded between automatic flushes.
const FLUSH_INTERVAL: usize = 10;

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    digest: String,
    test: String,
    outcome: TestOutcome,
}

/// The process-wide persistent test cache.
#[derive(Debug, Default)]
pub struct TestCache {
    entries: IndexMap<(String, String), TestOutcome>,
    /// Unique `(digest, test)` evaluations this process performed (cache
    /// hits excluded).
    unique_evaluations: u64,
    pending: usize,
}

impl TestCache {
    pub fn new() -> Self {
        TestCache::default()
    }

    pub fn lookup(&self, digest: &str, test: &str) -> Option<&TestOutcome> {
        self.entries.get(&(digest.to_string(), test.to_string()))
    }

    /// Record a fresh evaluation and bump the unique-evaluation counter.
    pub fn record(&mut self, digest: String, test: String, outcome: TestOutcome) {
        self.unique_evaluations += 1;
        self.pending += 1;
        self.entries.insert((digest, test), outcome);
    }

    pub fn unique_evaluations(&self) -> u64 {
        self.unique_evaluations
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flush to disk when enough fresh entries accumulated.
    pub fn maybe_save(&mut self, path: &Path) {
        if self.pending >= FLUSH_INTERVAL {
            if let Err(err) = self.save(path) {
                warn!(%err, path = %path.display(), "test cache flush failed");
            }
        }
    }

    /// Write the cache: magic line, version line, then one length-prefixed
    /// JSON entry per record.
    pub fn save(&mut self, path: &Path) -> std::io::Result<()> {
        let mut out = format!("{CACHE_MAGIC}\n{CACHE_VERSION}\n");
        for ((digest, test), outcome) in &self.entries {
            let entry = CacheEntry {
                digest: digest.clone(),
                test: test.clone(),
                outcome: outcome.clone(),
            };
            let json = serde_json::to_string(&entry)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            out.push_str(&format!("{}\n{}\n", json.len(), json));
        }
        std::fs::write(path, out)?;
        self.pending = 0;
        Ok(())
    }

    /// Load a cache file; a missing file, a foreign layout, or a corrupt
    /// entry yields an empty cache (with a warning for the latter two).
    pub fn load(path: &Path) -> Self {
        let Ok(text) = std::fs::read_to_string(path) else {
            return TestCache::new();
        };
        let mut lines = text.lines();
        if lines.next() != Some(CACHE_MAGIC) {
            warn!(path = %path.display(), "test cache has foreign magic; discarding");
            return TestCache::new();
        }
        match lines.next().and_then(|v| v.parse::<u32>().ok()) {
            Some(CACHE_VERSION) => {}
            other => {
                warn!(
                    path = %path.display(),
                    found = ?other,
                    expected = CACHE_VERSION,
                    "test cache version mismatch; discarding"
                );
                return TestCache::new();
            }
        }

        let mut cache = TestCache::new();
        loop {
            let Some(len_line) = lines.next() else {
                break;
            };
            let parsed = len_line.parse::<usize>().ok().and_then(|len| {
                let json = lines.next()?;
                if json.len() != len {
                    return None;
                }
                serde_json::from_str::<CacheEntry>(json).ok()
            });
            let Some(entry) = parsed else {
                warn!(path = %path.display(), "corrupt test cache entry; discarding cache");
                return TestCache::new();
            };
            cache
                .entries
                .insert((entry.digest, entry.test), entry.outcome);
        }
        cache
    }
}
