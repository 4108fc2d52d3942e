//! The instrumentation pass proper.
//!
//! Splices a record-and-flush instruction pair before every numbered
//! statement, prepends the declaration of the trace output stream, and
//! extends the unit's global initializer with the `fopen` of the trace file.
//! Statements with `sid == 0` are untouched, and the spliced statements
//! carry reserved-prefix labels so a later instrumentation run never numbers
//! them.

use graft_ast::{
    Exp, Global, Instr, Label, Location, Lval, Stmt, StmtKind, TranslationUnit, Ty, VarInfo,
    VisitAction, Visitor,
};

use crate::number::LocationMap;
use crate::RESERVED_PREFIX;

/// Name of the global trace stream handle.
pub const COVERAGE_STREAM: &str = "_coverage_fout";

struct CoveragePass<'a> {
    locs: Option<&'a LocationMap>,
}

impl CoveragePass<'_> {
    /// The `sid\n` (or `sid,file,line,byte\n`) record for one statement.
    /// The newline is a real character here; C emission escapes it.
    fn record_text(&self, sid: u32) -> String {
        match self.locs.and_then(|m| m.get(&sid)) {
            Some(loc) => format!("{sid},{},{},{}\n", loc.file, loc.line, loc.byte),
            None => format!("{sid}\n"),
        }
    }

    fn emit_stmt(&self, sid: u32) -> Stmt {
        let stream = || Exp::var(COVERAGE_STREAM);
        let record = Instr::Call(
            None,
            Exp::var("fprintf"),
            vec![stream(), Exp::StrLit(self.record_text(sid))],
            Location::unknown(),
        );
        let flush = Instr::Call(
            None,
            Exp::var("fflush"),
            vec![stream()],
            Location::unknown(),
        );
        Stmt::with_labels(
            StmtKind::Instr(vec![record, flush]),
            vec![Label::Named(
                format!("{RESERVED_PREFIX}{sid}"),
                Location::unknown(),
            )],
        )
    }
}

impl Visitor for CoveragePass<'_> {
    fn visit_stmt(&mut self, stmt: &Stmt) -> VisitAction<Vec<Stmt>> {
        if stmt.sid == 0 {
            return VisitAction::Descend;
        }
        // The emit statement precedes the traced statement; labels must stay
        // on the emit so jumps to the original statement also hit the probe.
        let mut emit = self.emit_stmt(stmt.sid);
        let mut original = stmt.clone();
        emit.labels.extend(std::mem::take(&mut original.labels));
        VisitAction::DescendThen(vec![emit, original], Box::new(|stmts| stmts))
    }
}

/// Instrument a numbered translation unit in place.
///
/// `trace_path` is the file the instrumented program opens for its records
/// (conventionally `<src>.path`). When `locs` is given, records carry the
/// statement's source location.
pub fn instrument_numbered(
    unit: TranslationUnit,
    trace_path: &str,
    locs: Option<&LocationMap>,
) -> TranslationUnit {
    let mut pass = CoveragePass { locs };
    let mut unit = graft_ast::walk_unit(&mut pass, unit);

    // fopen at the head of the global initializer, before any traced code runs.
    let fopen = Stmt::with_labels(
        StmtKind::Instr(vec![Instr::Call(
            Some(Lval::Var(COVERAGE_STREAM.into())),
            Exp::var("fopen"),
            vec![
                Exp::StrLit(trace_path.to_string()),
                Exp::StrLit("wb".to_string()),
            ],
            Location::unknown(),
        )]),
        vec![Label::Named(
            format!("{RESERVED_PREFIX}_init"),
            Location::unknown(),
        )],
    );
    let init = unit.ensure_global_init();
    init.body.stmts.insert(0, fopen);

    // Stream declaration (and the header it needs) ahead of everything else.
    let mut globals = vec![
        Global::Text("#include <stdio.h>".to_string()),
        Global::VarDecl(VarInfo::new(
            COVERAGE_STREAM,
            Ty::Ptr(Box::new(Ty::Named("FILE".into()))),
        )),
    ];
    globals.append(&mut unit.globals);
    unit.globals = globals;
    unit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::number::{number_unit, Numbering};
    use graft_ast::{pretty, Block, FunDecl};

    fn unit_of(stmts: Vec<Stmt>) -> TranslationUnit {
        let mut unit = TranslationUnit::new("demo.c");
        unit.globals.push(Global::Fun(FunDecl {
            name: "main".into(),
            return_type: Ty::Int,
            formals: Vec::new(),
            locals: Vec::new(),
            body: Block::new(stmts),
            loc: Location::unknown(),
        }));
        unit
    }

    fn instrumented_minimal() -> TranslationUnit {
        let unit = unit_of(vec![Stmt::new(StmtKind::Return(
            Some(Exp::IntLit(0)),
            Location::unknown(),
        ))]);
        let numbered = number_unit(unit, &mut Numbering::new(), false);
        instrument_numbered(numbered.unit, "demo.path", None)
    }

    #[test]
    fn minimal_program_gets_one_probe() {
        let out = instrumented_minimal();
        let text = pretty::unit_to_string(&out);
        assert!(text.contains("FILE *_coverage_fout;"));
        assert!(text.contains("fprintf(_coverage_fout, \"1\\n\")"));
        assert!(text.contains("fflush(_coverage_fout)"));
        assert!(text.contains("fopen(\"demo.path\", \"wb\")"));
        // Exactly one probe for the single return.
        assert_eq!(text.matches("fprintf").count(), 1);
    }

    #[test]
    fn probes_carry_reserved_labels() {
        let out = instrumented_minimal();
        let main = out.functions().find(|f| f.name == "main").expect("main");
        // First statement is the spliced globinit call, then the probe.
        let probe = &main.body.stmts[1];
        assert!(probe.has_reserved_label(RESERVED_PREFIX));
        assert_eq!(probe.sid, 0);
    }

    #[test]
    fn reinstrumentation_only_numbers_new_statements() {
        let first = instrumented_minimal();
        let renumbered = number_unit(first, &mut Numbering::new(), false);
        // The probe and globinit call are reserved or synthetic; only the
        // original return and the fopen instruction run are traceable, and
        // the fopen run carries a reserved label too.
        let sids: Vec<u32> = renumbered.map.keys().copied().collect();
        assert_eq!(sids.len(), 2, "globinit call + original return");
    }

    #[test]
    fn location_records_use_the_location_map() {
        let unit = unit_of(vec![Stmt::new(StmtKind::Return(
            Some(Exp::IntLit(0)),
            Location::unknown(),
        ))]);
        let numbered = number_unit(unit, &mut Numbering::new(), true);
        let mut locs = numbered.locs.expect("locs");
        locs.insert(
            1,
            Location {
                file: "demo.c".into(),
                line: 3,
                byte: 41,
            },
        );
        let out = instrument_numbered(numbered.unit, "demo.path", Some(&locs));
        let text = pretty::unit_to_string(&out);
        assert!(text.contains("\"1,demo.c,3,41\\n\""));
    }
}
