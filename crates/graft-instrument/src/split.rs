//! Optional call splitting.
//!
//! When requested, every straight-line instruction run containing a call to
//! one of the designated functions is split into three statements: the
//! instructions before the call, the isolated call, and the instructions
//! after it. The original statement's labels attach to the first and last
//! segments; the isolated call carries only a reserved-prefix marker so the
//! numbering pass treats it as a non-tracing anchor (the marker is stripped
//! there).

use std::collections::HashSet;

use graft_ast::{Instr, Label, Location, Stmt, StmtKind, TranslationUnit, VisitAction, Visitor};

use crate::RESERVED_PREFIX;

/// Label placed on isolated call segments so numbering skips them.
fn call_anchor_label() -> Label {
    Label::Named(format!("{RESERVED_PREFIX}_call"), Location::unknown())
}

struct CallSplitPass {
    targets: HashSet<String>,
}

impl CallSplitPass {
    fn is_designated(&self, instr: &Instr) -> bool {
        instr
            .callee_name()
            .is_some_and(|name| self.targets.contains(name))
    }
}

impl Visitor for CallSplitPass {
    fn visit_stmt(&mut self, stmt: &Stmt) -> VisitAction<Vec<Stmt>> {
        let StmtKind::Instr(instrs) = &stmt.kind else {
            return VisitAction::Descend;
        };
        if !instrs.iter().any(|i| self.is_designated(i)) {
            return VisitAction::Skip;
        }

        // Segment the run at every designated call. Each isolated call gets
        // the anchor label; the original labels stay on the first segment.
        let mut out: Vec<Stmt> = Vec::new();
        let mut pending: Vec<Instr> = Vec::new();
        for instr in instrs {
            if self.is_designated(instr) {
                if !pending.is_empty() || (out.is_empty() && !stmt.labels.is_empty()) {
                    out.push(Stmt::new(StmtKind::Instr(std::mem::take(&mut pending))));
                }
                out.push(Stmt::with_labels(
                    StmtKind::Instr(vec![instr.clone()]),
                    vec![call_anchor_label()],
                ));
            } else {
                pending.push(instr.clone());
            }
        }
        if !pending.is_empty() {
            out.push(Stmt::new(StmtKind::Instr(pending)));
        }
        // Labels attach to the first and last segments; the isolated calls
        // in between carry only their anchor.
        if let Some(first) = out.first_mut() {
            if !first.has_reserved_label(RESERVED_PREFIX) {
                first.labels = stmt.labels.clone();
            }
        }
        if out.len() > 1 {
            if let Some(last) = out.last_mut() {
                if !last.has_reserved_label(RESERVED_PREFIX) {
                    last.labels = stmt.labels.clone();
                }
            }
        }
        VisitAction::Replace(out)
    }
}

/// Split every instruction run containing a call to one of `targets`.
pub fn split_calls(unit: TranslationUnit, targets: &[String]) -> TranslationUnit {
    let mut pass = CallSplitPass {
        targets: targets.iter().cloned().collect(),
    };
    graft_ast::walk_unit(&mut pass, unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_ast::{Block, Exp, FunDecl, Global, Lval, Ty};

    fn set(var: &str, value: i64) -> Instr {
        Instr::Set(Lval::Var(var.into()), Exp::IntLit(value), Location::unknown())
    }

    fn call(name: &str) -> Instr {
        Instr::Call(None, Exp::var(name), Vec::new(), Location::unknown())
    }

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

    fn body(unit: &TranslationUnit) -> &[Stmt] {
        &unit.functions().next().expect("main").body.stmts
    }

    #[test]
    fn call_in_the_middle_yields_three_segments() {
        let stmt = Stmt::with_labels(
            StmtKind::Instr(vec![set("a", 1), call("lock"), set("b", 2)]),
            vec![Label::Named("entry".into(), Location::unknown())],
        );
        let out = split_calls(unit_of(vec![stmt]), &["lock".into()]);
        let stmts = body(&out);
        assert_eq!(stmts.len(), 3);
        // Labels attach to the first and last segments; the anchor in the
        // middle is reserved-prefixed and carries nothing else.
        assert!(matches!(&stmts[0].labels[0], Label::Named(n, _) if n == "entry"));
        assert!(stmts[1].has_reserved_label(RESERVED_PREFIX));
        assert!(matches!(&stmts[2].labels[0], Label::Named(n, _) if n == "entry"));
        match (&stmts[0].kind, &stmts[1].kind, &stmts[2].kind) {
            (StmtKind::Instr(pre), StmtKind::Instr(mid), StmtKind::Instr(post)) => {
                assert_eq!(pre.len(), 1);
                assert_eq!(mid[0].callee_name(), Some("lock"));
                assert_eq!(post.len(), 1);
            }
            other => panic!("expected three instruction runs, got {other:?}"),
        }
    }

    #[test]
    fn leading_call_without_labels_emits_two_segments() {
        let stmt = Stmt::new(StmtKind::Instr(vec![call("lock"), set("b", 2)]));
        let out = split_calls(unit_of(vec![stmt]), &["lock".into()]);
        let stmts = body(&out);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].has_reserved_label(RESERVED_PREFIX));
    }

    #[test]
    fn undesignated_calls_are_untouched() {
        let stmt = Stmt::new(StmtKind::Instr(vec![set("a", 1), call("printf")]));
        let input = unit_of(vec![stmt]);
        let out = split_calls(input.clone(), &["lock".into()]);
        assert_eq!(input, out);
    }
}
