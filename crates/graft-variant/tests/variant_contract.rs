//! Contract tests for the variant representation: mutations, caching, and
//! the serialized weighting format.
//!
//! Compile and test commands are stubbed with `true`/`false` so no real
//! compiler is needed; what matters here is the caching discipline around
//! them.

use std::path::PathBuf;

use graft_ast::{
    Block, Exp, FunDecl, Global, Instr, Location, Lval, Stmt, StmtKind, TranslationUnit, Ty,
    VarInfo,
};
use graft_instrument::{number_unit, Numbering};
use graft_variant::{
    CVariant, EvalContext, FlattenPolicy, Scheme, TestCase, Variant, VariantConfig,
};

fn assign(var: &str, value: i64) -> Stmt {
    Stmt::new(StmtKind::Instr(vec![Instr::Set(
        Lval::Var(var.into()),
        Exp::IntLit(value),
        Location::unknown(),
    )]))
}

/// A five-atom program: four assignments and a return.
fn numbered_variant() -> CVariant {
    let mut unit = TranslationUnit::new("demo.c");
    unit.globals.push(Global::Fun(FunDecl {
        name: "main".into(),
        return_type: Ty::Int,
        formals: Vec::new(),
        locals: vec![VarInfo::new("x", Ty::Int)],
        body: Block::new(vec![
            assign("x", 1),
            assign("x", 2),
            assign("x", 3),
            assign("x", 4),
            Stmt::new(StmtKind::Return(Some(Exp::var("x")), Location::unknown())),
        ]),
        loc: Location::unknown(),
    }));
    let numbered = number_unit(unit, &mut Numbering::new(), false);
    CVariant::from_parts(numbered.unit, numbered.map)
}

fn stub_context(dir: &std::path::Path) -> EvalContext {
    let config = VariantConfig {
        compile_template: "true".into(),
        test_template: "true".into(),
        source_name: dir.join("variant.c").display().to_string(),
        cache_path: dir.join("graft.testcache"),
        neg_coverage: dir.join("coverage.neg.path"),
        pos_coverage: dir.join("coverage.pos.path"),
        pos_tests: 1,
        neg_tests: 1,
        ..VariantConfig::default()
    };
    EvalContext::new(config)
}

#[test]
fn max_atom_counts_the_bank() {
    let variant = numbered_variant();
    assert_eq!(variant.max_atom(), 5);
}

#[test]
fn mutations_record_history_and_name() {
    let mut variant = numbered_variant();
    assert_eq!(variant.name(), "original");
    variant.delete(2).expect("delete");
    variant.append(3, 1).expect("append");
    variant.swap(1, 4).expect("swap");
    assert_eq!(variant.name(), "d(2) a(3,1) s(1,4)");
}

#[test]
fn out_of_range_atoms_are_rejected() {
    let mut variant = numbered_variant();
    assert!(variant.delete(0).is_err());
    assert!(variant.delete(6).is_err());
    assert!(variant.append(1, 99).is_err());
    assert!(variant.swap(99, 1).is_err());
}

#[test]
fn copy_shares_no_mutable_state() {
    let mut original = numbered_variant();
    let copy = original.copy();
    original.delete(1).expect("delete");
    assert_eq!(original.history().len(), 1);
    assert!(copy.history().is_empty());
    assert_eq!(copy.name(), "original");
}

#[test]
fn subatom_replacement_changes_the_expression() {
    let mut variant = numbered_variant();
    // Atom 1 is `x = 1`; atom 4 is `x = 4`. Replacing subatom 0 of atom 1
    // with atom 4's first expression turns it into `x = 4`.
    let before = variant.subatoms(1).expect("subatoms");
    assert_eq!(before, vec![Exp::IntLit(1)]);
    variant.replace_subatom(1, 0, 4).expect("replace");
    let after = variant.subatoms(1).expect("subatoms");
    assert_eq!(after, vec![Exp::IntLit(4)]);
    assert_eq!(variant.name(), "e(1,0,4)");
}

#[test]
fn missing_subatom_is_rejected() {
    let mut variant = numbered_variant();
    match variant.replace_subatom(1, 7, 2) {
        Err(graft_variant::VariantError::NoSubatom { sub: 7, .. }) => {}
        other => panic!("expected NoSubatom, got {other:?}"),
    }
}

#[test]
fn test_cache_hits_until_mutation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ctx = stub_context(dir.path());
    let mut variant = numbered_variant();

    let first = variant
        .test_case(&mut ctx, TestCase::Positive(1))
        .expect("test");
    assert!(first.passed);
    assert_eq!(ctx.cache.unique_evaluations(), 1);

    // Unchanged variant: the snapshot digest hits the cache.
    let second = variant
        .test_case(&mut ctx, TestCase::Positive(1))
        .expect("test");
    assert_eq!(first, second);
    assert_eq!(ctx.cache.unique_evaluations(), 1);

    // A different test on the same digest is a fresh evaluation.
    variant
        .test_case(&mut ctx, TestCase::Negative(1))
        .expect("test");
    assert_eq!(ctx.cache.unique_evaluations(), 2);

    // Mutation invalidates the snapshot; the changed text means a changed
    // digest and a fresh evaluation.
    variant.delete(2).expect("delete");
    variant
        .test_case(&mut ctx, TestCase::Positive(1))
        .expect("test");
    assert_eq!(ctx.cache.unique_evaluations(), 3);
}

#[test]
fn compile_failure_yields_failed_outcome_without_harness() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ctx = stub_context(dir.path());
    ctx.config.compile_template = "false".into();
    let mut variant = numbered_variant();

    let outcome = variant
        .test_case(&mut ctx, TestCase::Positive(1))
        .expect("test");
    assert!(!outcome.passed);
    assert_eq!(outcome.fitness, vec![0.0]);
}

#[test]
fn sanity_check_requires_negatives_to_fail() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ctx = stub_context(dir.path());
    let mut variant = numbered_variant();

    // Harness passes everything, so the negative test violates sanity.
    match variant.sanity_check(&mut ctx) {
        Err(graft_variant::VariantError::SanityFailure { test }) => assert_eq!(test, "n1"),
        other => panic!("expected SanityFailure, got {other:?}"),
    }

    ctx.config.allow_sanity_fail = true;
    let mut tolerant = numbered_variant();
    tolerant.sanity_check(&mut ctx).expect("tolerated");
}

#[test]
fn representation_binary_round_trips_and_checks_version() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("demo.rep");
    let mut ctx = stub_context(dir.path());
    ctx.config.fault_scheme = Scheme::Uniform;
    ctx.config.fix_scheme = Scheme::Uniform;

    let mut variant = numbered_variant();
    variant.compute_localization(&mut ctx).expect("localize");
    variant.save_binary(&path).expect("save");

    let mut other = numbered_variant();
    other.load_binary(&path).expect("load");
    assert_eq!(other.get_fault_localization().len(), 5);
    assert_eq!(other.get_fix_localization().len(), 5);

    // Corrupt the version tag: the load must fail loudly.
    let text = std::fs::read_to_string(&path).expect("read");
    std::fs::write(&path, text.replace("\"2\"", "\"1\"")).expect("write");
    match other.load_binary(&path) {
        Err(graft_variant::VariantError::VersionMismatch { found, .. }) => {
            assert_eq!(found, "1");
        }
        other => panic!("expected VersionMismatch, got {other:?}"),
    }
}

#[test]
fn path_scheme_reads_existing_coverage_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ctx = stub_context(dir.path());
    std::fs::write(&ctx.config.neg_coverage, "1\n2\n3\n1\n2\n3\n").expect("write");
    std::fs::write(&ctx.config.pos_coverage, "1\n4\n").expect("write");

    let mut variant = numbered_variant();
    variant.compute_localization(&mut ctx).expect("localize");

    let fault: std::collections::HashMap<u32, f64> =
        variant.get_fault_localization().iter().copied().collect();
    assert_eq!(fault[&1], 0.1);
    assert_eq!(fault[&2], 1.0);
    assert_eq!(fault[&3], 1.0);
    assert_eq!(fault[&4], 0.0);
    assert_eq!(
        variant.get_fix_localization(),
        &vec![(1, 0.5), (4, 0.5)]
    );
}

#[test]
fn localizations_come_back_in_source_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ctx = stub_context(dir.path());
    // Coverage visits statements out of source order; the computed paths
    // must still come back sorted by sid.
    std::fs::write(&ctx.config.neg_coverage, "3\n1\n2\n").expect("write");
    std::fs::write(&ctx.config.pos_coverage, "4\n1\n").expect("write");

    let mut variant = numbered_variant();
    variant.compute_localization(&mut ctx).expect("localize");

    let fault_sids: Vec<u32> = variant
        .get_fault_localization()
        .iter()
        .map(|&(sid, _)| sid)
        .collect();
    assert_eq!(fault_sids, vec![1, 2, 3, 4]);
    assert_eq!(variant.get_fix_localization(), &vec![(1, 0.5), (4, 0.5)]);
}

#[test]
fn flatten_policy_applies_to_weight_scheme() {
    let dir = tempfile::tempdir().expect("tempdir");
    let weight_file = dir.path().join("weights");
    std::fs::write(&weight_file, "demo.c,2,0.5\ndemo.c,2,0.25\ndemo.c,3,1.0\n").expect("write");

    let mut ctx = stub_context(dir.path());
    ctx.config.fault_scheme = Scheme::Weight;
    ctx.config.fix_scheme = Scheme::Uniform;
    ctx.config.fault_file = Some(weight_file);
    ctx.config.flatten = FlattenPolicy::Max;

    let mut variant = numbered_variant();
    variant.compute_localization(&mut ctx).expect("localize");
    assert_eq!(
        variant.get_fault_localization(),
        &vec![(2, 0.5), (3, 1.0)]
    );
}

#[test]
fn from_source_loads_unit_and_bank() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut source = numbered_variant();
    let ast_path = dir.path().join("demo.ast");

    // Persist the numbered unit and map the way the instrumenter does.
    let unit = source.unit().expect("unit").clone();
    unit.save(&ast_path).expect("save unit");
    let renumbered = number_unit(unit, &mut Numbering::new(), false);
    graft_instrument::StatementMapArtifact::new(6, renumbered.map)
        .save(&dir.path().join("demo.ht"))
        .expect("save map");

    let mut loaded = CVariant::new();
    loaded.from_source(&ast_path).expect("from_source");
    assert_eq!(loaded.max_atom(), 5);
}

#[test]
fn subdirectories_partition_variant_artifacts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ctx = stub_context(dir.path());
    ctx.config.use_subdirs = true;
    ctx.config.label = Some(dir.path().join("v-alpha").display().to_string());
    ctx.config.source_name = "variant.c".into();

    let mut variant = numbered_variant();
    variant
        .test_case(&mut ctx, TestCase::Positive(1))
        .expect("test");
    // keep_source is off, so the source is gone, but the subdir exists.
    assert!(dir.path().join("v-alpha").is_dir());
}
