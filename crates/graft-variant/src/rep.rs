//! The program-variant representation.
//!
//! [`CVariant`] owns a translation unit whose numbered statements are the
//! atoms, plus the read-only code bank the mutations draw from. The public
//! contract is the [`Variant`] trait; caching behavior lives in
//! [`crate::cache`] and the localization schemes in
//! [`crate::localization`].

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use graft_ast::{pretty, Block, Exp, Instr, Stmt, StmtKind, TranslationUnit, VisitAction, Visitor};
use graft_instrument::{
    instrument_unit, ArtifactError, InstrumentOptions, Numbering, StatementMap,
    StatementMapArtifact,
};

use crate::cache::{
    digest_of, CompileCache, CompileState, SourceSnapshot, TestCache, TestOutcome,
};
use crate::harness::{
    placeholder, run_shell, substitute, take_fitness, PortAllocator, DEFAULT_COMPILE_TEMPLATE,
    DEFAULT_TEST_TEMPLATE,
};
use crate::localization::{
    flatten, path_scheme, read_path_sids, read_weight_records, source_order, uniform_scheme,
    FlattenPolicy, LocalizationError, Scheme, WeightedPath,
};

/// Version tag of the serialized fault/fix weighting.
pub const REPRESENTATION_VERSION: &str = "2";

#[derive(Debug, Error)]
pub enum VariantError {
    #[error("atom {atom} out of range (this variant has {max} atoms)")]
    AtomOutOfRange { atom: u32, max: u32 },
    #[error("atom {atom} has no subatom {sub} ({available} available)")]
    NoSubatom {
        atom: u32,
        sub: usize,
        available: usize,
    },
    #[error("representation file '{path}' has version '{found}', expected '{expected}'")]
    VersionMismatch {
        path: String,
        found: String,
        expected: &'static str,
    },
    #[error("sanity check failed on test '{test}'")]
    SanityFailure { test: String },
    #[error("coverage paths unavailable: {0}")]
    CoverageUnavailable(String),
    #[error("I/O failure on '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Ast(#[from] graft_ast::AstError),
    #[error(transparent)]
    Localization(#[from] LocalizationError),
    #[error("malformed representation file '{path}': {source}")]
    Malformed {
        path: String,
        source: serde_json::Error,
    },
}

fn io_err(path: &Path, source: std::io::Error) -> VariantError {
    VariantError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// A recorded mutation. The rendered history doubles as the variant's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutation {
    Delete(u32),
    Append { after: u32, what: u32 },
    Swap(u32, u32),
    ReplaceSubatom { atom: u32, sub: usize, source: u32 },
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::Delete(a) => write!(f, "d({a})"),
            Mutation::Append { after, what } => write!(f, "a({after},{what})"),
            Mutation::Swap(a, b) => write!(f, "s({a},{b})"),
            Mutation::ReplaceSubatom { atom, sub, source } => {
                write!(f, "e({atom},{sub},{source})")
            }
        }
    }
}

/// A positive (must pass) or negative (currently failing) test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestCase {
    Positive(usize),
    Negative(usize),
}

impl TestCase {
    /// The name handed to the harness: `p<n>` or `n<n>`.
    pub fn name(self) -> String {
        match self {
            TestCase::Positive(n) => format!("p{n}"),
            TestCase::Negative(n) => format!("n{n}"),
        }
    }
}

/// Knobs governing compilation, testing and localization.
#[derive(Debug, Clone)]
pub struct VariantConfig {
    pub compiler_name: String,
    pub compiler_options: String,
    pub compile_template: String,
    pub test_template: String,
    pub test_script: String,
    /// File name the variant source is written under.
    pub source_name: String,
    pub fitness_file: String,
    pub cache_path: PathBuf,
    pub pos_tests: usize,
    pub neg_tests: usize,
    pub allow_sanity_fail: bool,
    /// Partition artifacts per variant under a fresh subdirectory.
    pub use_subdirs: bool,
    /// Subdirectory label; a zero-padded counter when absent.
    pub label: Option<String>,
    pub keep_source: bool,
    pub always_keep_source: bool,
    pub fault_scheme: Scheme,
    pub fix_scheme: Scheme,
    pub flatten: FlattenPolicy,
    /// Input for the line/weight schemes.
    pub fault_file: Option<PathBuf>,
    pub fix_file: Option<PathBuf>,
    /// Coverage traces consumed (or produced) by the path scheme.
    pub neg_coverage: PathBuf,
    pub pos_coverage: PathBuf,
}

impl Default for VariantConfig {
    fn default() -> Self {
        VariantConfig {
            compiler_name: "gcc".into(),
            compiler_options: String::new(),
            compile_template: DEFAULT_COMPILE_TEMPLATE.into(),
            test_template: DEFAULT_TEST_TEMPLATE.into(),
            test_script: "./test.sh".into(),
            source_name: "variant.c".into(),
            fitness_file: "fitness.out".into(),
            cache_path: PathBuf::from("graft.testcache"),
            pos_tests: 0,
            neg_tests: 0,
            allow_sanity_fail: false,
            use_subdirs: false,
            label: None,
            keep_source: false,
            always_keep_source: false,
            fault_scheme: Scheme::Default,
            fix_scheme: Scheme::Default,
            flatten: FlattenPolicy::Sum,
            fault_file: None,
            fix_file: None,
            neg_coverage: PathBuf::from("coverage.neg.path"),
            pos_coverage: PathBuf::from("coverage.pos.path"),
        }
    }
}

/// The mutable state shared by every variant evaluation in this process:
/// the persistent test cache, the port counter, and the subdirectory
/// counter. Threaded explicitly; nothing here is global.
#[derive(Debug)]
pub struct EvalContext {
    pub config: VariantConfig,
    pub cache: TestCache,
    pub ports: PortAllocator,
    pub subdir_counter: usize,
}

impl EvalContext {
    /// Build a context, resuming the persistent cache when one exists.
    pub fn new(config: VariantConfig) -> Self {
        let cache = TestCache::load(&config.cache_path);
        if !cache.is_empty() {
            info!(entries = cache.len(), "resumed persistent test cache");
        }
        EvalContext {
            config,
            cache,
            ports: PortAllocator::new(),
            subdir_counter: 0,
        }
    }
}

/// The public contract of a program variant.
pub trait Variant: Clone {
    /// Structural copy sharing no mutable state with the original.
    fn copy(&self) -> Self {
        self.clone()
    }

    fn from_source(&mut self, path: &Path) -> Result<(), VariantError>;

    /// Write the program and return its content digest, filling the
    /// snapshot slot.
    fn output_source(&mut self, path: &Path) -> Result<String, VariantError>;

    fn save_binary(&self, path: &Path) -> Result<(), VariantError>;
    fn load_binary(&mut self, path: &Path) -> Result<(), VariantError>;

    /// Compile and run the whole suite: positives must pass, negatives must
    /// fail. Fatal unless `allow_sanity_fail` is set.
    fn sanity_check(&mut self, ctx: &mut EvalContext) -> Result<(), VariantError>;

    fn test_case(&mut self, ctx: &mut EvalContext, test: TestCase)
        -> Result<TestOutcome, VariantError>;

    /// Number of atoms, 1-indexed inclusive.
    fn max_atom(&self) -> u32;

    fn delete(&mut self, atom: u32) -> Result<(), VariantError>;
    fn append(&mut self, after: u32, what: u32) -> Result<(), VariantError>;
    fn swap(&mut self, a: u32, b: u32) -> Result<(), VariantError>;
    fn replace_subatom(
        &mut self,
        atom: u32,
        sub: usize,
        source_atom: u32,
    ) -> Result<(), VariantError>;

    fn compute_localization(&mut self, ctx: &mut EvalContext) -> Result<(), VariantError>;
    fn get_fault_localization(&self) -> &WeightedPath;
    fn get_fix_localization(&self) -> &WeightedPath;

    fn history(&self) -> &[Mutation];

    /// The rendered mutation history (`"original"` for a pristine variant).
    fn name(&self) -> String {
        let history = self.history();
        if history.is_empty() {
            "original".to_string()
        } else {
            history
                .iter()
                .map(|m| m.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        }
    }
}

/// Edits the kind of the statement carrying the target identifier.
struct EditPass<F: FnOnce(&mut Stmt)> {
    target: u32,
    edit: Option<F>,
}

impl<F: FnOnce(&mut Stmt)> Visitor for EditPass<F> {
    fn visit_stmt(&mut self, stmt: &Stmt) -> VisitAction<Vec<Stmt>> {
        if stmt.sid == self.target {
            if let Some(edit) = self.edit.take() {
                let mut replacement = stmt.clone();
                edit(&mut replacement);
                return VisitAction::Replace(vec![replacement]);
            }
            VisitAction::Skip
        } else {
            VisitAction::Descend
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RepresentationFile {
    version: String,
    fault: WeightedPath,
    fix: WeightedPath,
}

/// A C program variant: one numbered statement per atom.
#[derive(Debug, Clone, Default)]
pub struct CVariant {
    unit: Option<TranslationUnit>,
    /// Originally numbered statements; append/swap sources come from here,
    /// never from the mutated program.
    bank: StatementMap,
    history: Vec<Mutation>,
    cache: CompileCache,
    fault: WeightedPath,
    fix: WeightedPath,
}

impl CVariant {
    pub fn new() -> Self {
        CVariant::default()
    }

    /// Build a variant directly from a numbered unit and its code bank.
    pub fn from_parts(unit: TranslationUnit, bank: StatementMap) -> Self {
        CVariant {
            unit: Some(unit),
            bank,
            ..CVariant::default()
        }
    }

    pub fn unit(&self) -> Option<&TranslationUnit> {
        self.unit.as_ref()
    }

    fn unit_mut(&mut self) -> &mut TranslationUnit {
        self.unit.get_or_insert_with(|| TranslationUnit::new("variant.c"))
    }

    fn check_atom(&self, atom: u32) -> Result<(), VariantError> {
        if atom == 0 || atom > self.max_atom() {
            return Err(VariantError::AtomOutOfRange {
                atom,
                max: self.max_atom(),
            });
        }
        Ok(())
    }

    fn bank_kind(&self, atom: u32) -> Result<StmtKind, VariantError> {
        self.check_atom(atom)?;
        Ok(self.bank[&atom].clone())
    }

    /// Apply an edit to the statement with the given identifier. Returns
    /// false when the statement no longer exists in the tree (e.g. erased
    /// by an earlier mutation of an enclosing atom).
    fn edit_stmt<F: FnOnce(&mut Stmt)>(&mut self, target: u32, edit: F) -> bool {
        let unit = std::mem::replace(self.unit_mut(), TranslationUnit::new(""));
        let mut pass = EditPass {
            target,
            edit: Some(edit),
        };
        let rebuilt = graft_ast::walk_unit(&mut pass, unit);
        *self.unit_mut() = rebuilt;
        pass.edit.is_none()
    }

    fn record(&mut self, mutation: Mutation) {
        self.history.push(mutation);
        self.cache.invalidate();
    }

    /// The expressions of one atom, in source order. Nested statements are
    /// separate atoms and contribute nothing here.
    pub fn subatoms(&self, atom: u32) -> Result<Vec<Exp>, VariantError> {
        self.check_atom(atom)?;
        let mut found = None;
        if let Some(unit) = &self.unit {
            let mut pass = FindPass {
                target: atom,
                found: &mut found,
            };
            // walk_unit consumes; a clone keeps the search read-only.
            graft_ast::walk_unit(&mut pass, unit.clone());
        }
        let kind = found.unwrap_or_else(|| self.bank[&atom].clone());
        Ok(kind_subatoms(&kind))
    }

    fn ensure_snapshot(&mut self, ctx: &mut EvalContext) -> Result<SourceSnapshot, VariantError> {
        if let Some(snapshot) = &self.cache.snapshot {
            return Ok(snapshot.clone());
        }
        let dir = if ctx.config.use_subdirs {
            let name = match &ctx.config.label {
                Some(label) => label.clone(),
                None => {
                    ctx.subdir_counter += 1;
                    format!("{:06}", ctx.subdir_counter)
                }
            };
            std::fs::create_dir_all(&name).map_err(|e| io_err(Path::new(&name), e))?;
            PathBuf::from(name)
        } else {
            PathBuf::new()
        };
        let source = dir.join(&ctx.config.source_name);
        self.output_source(&source)?;
        Ok(self
            .cache
            .snapshot
            .clone()
            .expect("output_source fills the snapshot slot"))
    }

    fn ensure_compile(&mut self, ctx: &EvalContext) -> Result<CompileState, VariantError> {
        if self.cache.state != CompileState::NotCompiled {
            return Ok(self.cache.state.clone());
        }
        let snapshot = self
            .cache
            .snapshot
            .clone()
            .expect("snapshot precedes compilation");
        let exe = snapshot.path.with_extension("");
        let command = substitute(
            &ctx.config.compile_template,
            &[
                (placeholder::COMPILER_NAME, ctx.config.compiler_name.as_str()),
                (placeholder::EXE_NAME, &exe.display().to_string()),
                (
                    placeholder::SOURCE_NAME,
                    &snapshot.path.display().to_string(),
                ),
                (
                    placeholder::COMPILER_OPTIONS,
                    ctx.config.compiler_options.as_str(),
                ),
            ],
        );
        let compiled = run_shell(&command).map_err(|e| io_err(&snapshot.path, e))?;
        self.cache.state = if compiled {
            CompileState::Compiled(exe)
        } else {
            warn!(variant = %self.name(), "compile failed");
            CompileState::Failed
        };
        if !ctx.config.keep_source && !ctx.config.always_keep_source {
            let _ = std::fs::remove_file(&snapshot.path);
        }
        Ok(self.cache.state.clone())
    }

    /// Coverage sid sequences for the path scheme, producing them by
    /// self-instrumentation when the trace files are absent.
    fn coverage_paths(
        &mut self,
        ctx: &mut EvalContext,
    ) -> Result<(Vec<u32>, Vec<u32>), VariantError> {
        if !ctx.config.neg_coverage.exists() || !ctx.config.pos_coverage.exists() {
            self.build_coverage(ctx)?;
        }
        let neg = read_path_sids(&ctx.config.neg_coverage)?;
        let pos = read_path_sids(&ctx.config.pos_coverage)?;
        Ok((neg, pos))
    }

    /// Instrument our own source, compile it, and run the whole suite to
    /// produce the positive and negative coverage traces.
    fn build_coverage(&mut self, ctx: &mut EvalContext) -> Result<(), VariantError> {
        let unit = self
            .unit
            .clone()
            .ok_or_else(|| VariantError::CoverageUnavailable("variant has no program".into()))?;
        info!("building coverage traces by self-instrumentation");

        let dir = PathBuf::from("coverage");
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        let trace = dir.join("coverage.path");
        let source = dir.join(&ctx.config.source_name);
        let exe = source.with_extension("");

        let mut numbering = Numbering::new();
        let output = instrument_unit(
            unit,
            &trace.display().to_string(),
            &mut numbering,
            &InstrumentOptions::default(),
        );
        std::fs::write(&source, pretty::unit_to_string(&output.instrumented))
            .map_err(|e| io_err(&source, e))?;

        let compile = substitute(
            &ctx.config.compile_template,
            &[
                (placeholder::COMPILER_NAME, ctx.config.compiler_name.as_str()),
                (placeholder::EXE_NAME, &exe.display().to_string()),
                (placeholder::SOURCE_NAME, &source.display().to_string()),
                (
                    placeholder::COMPILER_OPTIONS,
                    ctx.config.compiler_options.as_str(),
                ),
            ],
        );
        if !run_shell(&compile).map_err(|e| io_err(&source, e))? {
            return Err(VariantError::CoverageUnavailable(
                "instrumented source failed to compile".into(),
            ));
        }

        let mut neg_trace = String::new();
        let mut pos_trace = String::new();
        let tests: Vec<TestCase> = (1..=ctx.config.pos_tests)
            .map(TestCase::Positive)
            .chain((1..=ctx.config.neg_tests).map(TestCase::Negative))
            .collect();
        for test in tests {
            let _ = std::fs::remove_file(&trace);
            let port = ctx.ports.allocate();
            let fitness = dir.join(&ctx.config.fitness_file);
            let command = substitute(
                &ctx.config.test_template,
                &[
                    (placeholder::TEST_SCRIPT, ctx.config.test_script.as_str()),
                    (placeholder::EXE_NAME, &exe.display().to_string()),
                    (placeholder::TEST_NAME, &test.name()),
                    (placeholder::PORT, &port.to_string()),
                    (placeholder::SOURCE_NAME, &source.display().to_string()),
                    (placeholder::FITNESS_FILE, &fitness.display().to_string()),
                ],
            );
            let _ = run_shell(&command).map_err(|e| io_err(&trace, e))?;
            let records = std::fs::read_to_string(&trace).unwrap_or_default();
            match test {
                TestCase::Positive(_) => pos_trace.push_str(&records),
                TestCase::Negative(_) => neg_trace.push_str(&records),
            }
        }
        std::fs::write(&ctx.config.neg_coverage, neg_trace)
            .map_err(|e| io_err(&ctx.config.neg_coverage, e))?;
        std::fs::write(&ctx.config.pos_coverage, pos_trace)
            .map_err(|e| io_err(&ctx.config.pos_coverage, e))?;
        Ok(())
    }

    /// Resolve one scheme into a weighted path.
    fn weights_for(
        &self,
        scheme: Scheme,
        fault_side: bool,
        path_data: Option<&(WeightedPath, WeightedPath)>,
        input: Option<&PathBuf>,
    ) -> Result<WeightedPath, VariantError> {
        Ok(match scheme {
            Scheme::Path | Scheme::Default => {
                let (fault, fix) = path_data.expect("path data prepared for path scheme");
                if fault_side {
                    fault.clone()
                } else {
                    fix.clone()
                }
            }
            Scheme::Uniform => uniform_scheme(self.max_atom()),
            Scheme::Weight | Scheme::Line => {
                let Some(input) = input else {
                    return Err(VariantError::CoverageUnavailable(
                        "line/weight scheme requires an input file".into(),
                    ));
                };
                let mut out = WeightedPath::new();
                for record in read_weight_records(input)? {
                    let sid = if scheme == Scheme::Weight {
                        Some(record.value as u32)
                    } else {
                        self.atom_id_of_source_line(&record.file, record.value)
                    };
                    match sid {
                        Some(sid) => out.push((sid, record.weight)),
                        None => warn!(
                            file = record.file,
                            line = record.value,
                            "no atom at source line; record dropped"
                        ),
                    }
                }
                out
            }
            Scheme::Oracle => WeightedPath::new(),
        })
    }

    /// The atom whose statement starts at the given source line.
    pub fn atom_id_of_source_line(&self, file: &str, line: i64) -> Option<u32> {
        let unit = self.unit.as_ref()?;
        let mut found = None;
        for f in unit.functions() {
            find_in_block(&f.body, file, line, &mut found);
        }
        fn find_in_block(block: &Block, file: &str, line: i64, found: &mut Option<u32>) {
            for stmt in &block.stmts {
                if found.is_some() {
                    return;
                }
                let loc = stmt.loc();
                if stmt.sid != 0 && loc.line == line && (file.is_empty() || loc.file == file) {
                    *found = Some(stmt.sid);
                    return;
                }
                match &stmt.kind {
                    StmtKind::If {
                        then_block,
                        else_block,
                        ..
                    } => {
                        find_in_block(then_block, file, line, found);
                        find_in_block(else_block, file, line, found);
                    }
                    StmtKind::Loop(b, _) | StmtKind::Block(b) | StmtKind::Switch { body: b, .. } => {
                        find_in_block(b, file, line, found)
                    }
                    _ => {}
                }
            }
        }
        found
    }
}

/// Searches for the statement kind carrying the target identifier.
struct FindPass<'a> {
    target: u32,
    found: &'a mut Option<StmtKind>,
}

impl Visitor for FindPass<'_> {
    fn visit_stmt(&mut self, stmt: &Stmt) -> VisitAction<Vec<Stmt>> {
        if stmt.sid == self.target {
            *self.found = Some(stmt.kind.clone());
            VisitAction::Skip
        } else {
            VisitAction::Descend
        }
    }
}

/// The expressions directly owned by a statement kind, in source order.
fn kind_subatoms(kind: &StmtKind) -> Vec<Exp> {
    let mut out = Vec::new();
    match kind {
        StmtKind::Instr(instrs) => {
            for instr in instrs {
                match instr {
                    Instr::Set(_, e, _) => out.push(e.clone()),
                    Instr::Call(_, _, args, _) => out.extend(args.iter().cloned()),
                    Instr::Asm(..) => {}
                }
            }
        }
        StmtKind::Return(Some(e), _) => out.push(e.clone()),
        StmtKind::If { cond, .. } => out.push(cond.clone()),
        StmtKind::Switch { scrut, .. } => out.push(scrut.clone()),
        StmtKind::TryExcept(_, e, _, _) => out.push(e.clone()),
        _ => {}
    }
    out
}

/// Replace the `sub`-th owned expression of a statement kind.
fn replace_kind_subatom(kind: &mut StmtKind, sub: usize, replacement: Exp) -> bool {
    let mut index = 0;
    let mut hit = |slot: &mut Exp| {
        let matched = index == sub;
        if matched {
            *slot = replacement.clone();
        }
        index += 1;
        matched
    };
    match kind {
        StmtKind::Instr(instrs) => {
            for instr in instrs {
                match instr {
                    Instr::Set(_, e, _) => {
                        if hit(e) {
                            return true;
                        }
                    }
                    Instr::Call(_, _, args, _) => {
                        for arg in args {
                            if hit(arg) {
                                return true;
                            }
                        }
                    }
                    Instr::Asm(..) => {}
                }
            }
        }
        StmtKind::Return(Some(e), _) => {
            if hit(e) {
                return true;
            }
        }
        StmtKind::If { cond, .. } => {
            if hit(cond) {
                return true;
            }
        }
        StmtKind::Switch { scrut, .. } => {
            if hit(scrut) {
                return true;
            }
        }
        StmtKind::TryExcept(_, e, _, _) => {
            if hit(e) {
                return true;
            }
        }
        _ => {}
    }
    false
}

impl Variant for CVariant {
    /// `path` points at the numbered-unit artifact; the statement map is
    /// loaded from the `.ht` file beside it.
    fn from_source(&mut self, path: &Path) -> Result<(), VariantError> {
        let unit = TranslationUnit::load(path)?;
        let map_path = path.with_extension("ht");
        let artifact = StatementMapArtifact::load(&map_path)?;
        self.unit = Some(unit);
        self.bank = artifact.map;
        self.history.clear();
        self.cache.invalidate();
        Ok(())
    }

    fn output_source(&mut self, path: &Path) -> Result<String, VariantError> {
        let unit = self
            .unit
            .as_ref()
            .ok_or_else(|| VariantError::CoverageUnavailable("variant has no program".into()))?;
        let text = pretty::unit_to_string(unit);
        std::fs::write(path, &text).map_err(|e| io_err(path, e))?;
        let digest = digest_of(&text);
        self.cache.snapshot = Some(SourceSnapshot {
            path: path.to_path_buf(),
            digest: digest.clone(),
        });
        Ok(digest)
    }

    fn save_binary(&self, path: &Path) -> Result<(), VariantError> {
        let file = RepresentationFile {
            version: REPRESENTATION_VERSION.to_string(),
            fault: self.fault.clone(),
            fix: self.fix.clone(),
        };
        let text = serde_json::to_string_pretty(&file).map_err(|source| {
            VariantError::Malformed {
                path: path.display().to_string(),
                source,
            }
        })?;
        std::fs::write(path, text).map_err(|e| io_err(path, e))
    }

    fn load_binary(&mut self, path: &Path) -> Result<(), VariantError> {
        let text = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        let file: RepresentationFile =
            serde_json::from_str(&text).map_err(|source| VariantError::Malformed {
                path: path.display().to_string(),
                source,
            })?;
        if file.version != REPRESENTATION_VERSION {
            return Err(VariantError::VersionMismatch {
                path: path.display().to_string(),
                found: file.version,
                expected: REPRESENTATION_VERSION,
            });
        }
        self.fault = file.fault;
        self.fix = file.fix;
        Ok(())
    }

    fn sanity_check(&mut self, ctx: &mut EvalContext) -> Result<(), VariantError> {
        let tests: Vec<(TestCase, bool)> = (1..=ctx.config.pos_tests)
            .map(|n| (TestCase::Positive(n), true))
            .chain((1..=ctx.config.neg_tests).map(|n| (TestCase::Negative(n), false)))
            .collect();
        for (test, expect_pass) in tests {
            let outcome = self.test_case(ctx, test)?;
            if outcome.passed != expect_pass {
                if ctx.config.allow_sanity_fail {
                    warn!(test = test.name(), "sanity violation ignored");
                } else {
                    return Err(VariantError::SanityFailure { test: test.name() });
                }
            }
        }
        Ok(())
    }

    fn test_case(
        &mut self,
        ctx: &mut EvalContext,
        test: TestCase,
    ) -> Result<TestOutcome, VariantError> {
        let test_name = test.name();
        if let Some(snapshot) = &self.cache.snapshot {
            if let Some(hit) = ctx.cache.lookup(&snapshot.digest, &test_name) {
                return Ok(hit.clone());
            }
        }

        let snapshot = self.ensure_snapshot(ctx)?;
        if let Some(hit) = ctx.cache.lookup(&snapshot.digest, &test_name) {
            return Ok(hit.clone());
        }

        let outcome = match self.ensure_compile(ctx)? {
            CompileState::Failed => TestOutcome {
                passed: false,
                fitness: vec![0.0],
            },
            CompileState::Compiled(exe) => {
                let port = ctx.ports.allocate();
                let fitness_path = snapshot
                    .path
                    .parent()
                    .unwrap_or_else(|| Path::new(""))
                    .join(&ctx.config.fitness_file);
                let command = substitute(
                    &ctx.config.test_template,
                    &[
                        (placeholder::TEST_SCRIPT, ctx.config.test_script.as_str()),
                        (placeholder::EXE_NAME, &exe.display().to_string()),
                        (placeholder::TEST_NAME, &test_name),
                        (placeholder::PORT, &port.to_string()),
                        (
                            placeholder::SOURCE_NAME,
                            &snapshot.path.display().to_string(),
                        ),
                        (
                            placeholder::FITNESS_FILE,
                            &fitness_path.display().to_string(),
                        ),
                    ],
                );
                let passed = run_shell(&command).map_err(|e| io_err(&snapshot.path, e))?;
                let fitness = take_fitness(&fitness_path, passed);
                TestOutcome { passed, fitness }
            }
            CompileState::NotCompiled => unreachable!("ensure_compile resolves the state"),
        };

        ctx.cache
            .record(snapshot.digest.clone(), test_name, outcome.clone());
        let cache_path = ctx.config.cache_path.clone();
        ctx.cache.maybe_save(&cache_path);
        Ok(outcome)
    }

    fn max_atom(&self) -> u32 {
        self.bank.keys().copied().max().unwrap_or(0)
    }

    fn delete(&mut self, atom: u32) -> Result<(), VariantError> {
        self.check_atom(atom)?;
        self.edit_stmt(atom, |stmt| {
            stmt.kind = StmtKind::Block(Block::default());
        });
        self.record(Mutation::Delete(atom));
        Ok(())
    }

    /// Append the bank's copy of `what` after atom `after`, wrapping both in
    /// a block that keeps the target's identifier and labels.
    fn append(&mut self, after: u32, what: u32) -> Result<(), VariantError> {
        self.check_atom(after)?;
        let appended = self.bank_kind(what)?;
        self.edit_stmt(after, move |stmt| {
            let original = std::mem::replace(&mut stmt.kind, StmtKind::Block(Block::default()));
            stmt.kind = StmtKind::Block(Block::new(vec![
                Stmt::new(original),
                Stmt::new(appended),
            ]));
        });
        self.record(Mutation::Append { after, what });
        Ok(())
    }

    /// Swap installs the bank's copy of each atom at the other's position.
    fn swap(&mut self, a: u32, b: u32) -> Result<(), VariantError> {
        let kind_for_a = self.bank_kind(b)?;
        let kind_for_b = self.bank_kind(a)?;
        self.edit_stmt(a, move |stmt| stmt.kind = kind_for_a);
        self.edit_stmt(b, move |stmt| stmt.kind = kind_for_b);
        self.record(Mutation::Swap(a, b));
        Ok(())
    }

    /// Replace the `sub`-th expression of `atom` with the first expression
    /// of the bank's copy of `source_atom`.
    fn replace_subatom(
        &mut self,
        atom: u32,
        sub: usize,
        source_atom: u32,
    ) -> Result<(), VariantError> {
        self.check_atom(atom)?;
        let source_kind = self.bank_kind(source_atom)?;
        let replacement =
            kind_subatoms(&source_kind)
                .into_iter()
                .next()
                .ok_or(VariantError::NoSubatom {
                    atom: source_atom,
                    sub: 0,
                    available: 0,
                })?;
        let available = self.subatoms(atom)?.len();
        if sub >= available {
            return Err(VariantError::NoSubatom {
                atom,
                sub,
                available,
            });
        }
        self.edit_stmt(atom, move |stmt| {
            replace_kind_subatom(&mut stmt.kind, sub, replacement);
        });
        self.record(Mutation::ReplaceSubatom {
            atom,
            sub,
            source: source_atom,
        });
        Ok(())
    }

    fn compute_localization(&mut self, ctx: &mut EvalContext) -> Result<(), VariantError> {
        let fault_scheme = ctx.config.fault_scheme;
        let fix_scheme = ctx.config.fix_scheme;
        let needs_path = matches!(fault_scheme, Scheme::Path | Scheme::Default)
            || matches!(fix_scheme, Scheme::Path | Scheme::Default);
        let path_data = if needs_path {
            let (neg, pos) = self.coverage_paths(ctx)?;
            Some(path_scheme(&neg, &pos))
        } else {
            None
        };

        let fault_file = ctx.config.fault_file.clone();
        let fix_file = ctx.config.fix_file.clone();
        let fault = self.weights_for(fault_scheme, true, path_data.as_ref(), fault_file.as_ref())?;
        let fix = self.weights_for(fix_scheme, false, path_data.as_ref(), fix_file.as_ref())?;

        // Flatten duplicates, then put the paths into source order.
        self.fault = source_order(flatten(&fault, ctx.config.flatten));
        self.fix = source_order(flatten(&fix, ctx.config.flatten));
        Ok(())
    }

    fn get_fault_localization(&self) -> &WeightedPath {
        &self.fault
    }

    fn get_fix_localization(&self) -> &WeightedPath {
        &self.fix
    }

    fn history(&self) -> &[Mutation] {
        &self.history
    }
}
