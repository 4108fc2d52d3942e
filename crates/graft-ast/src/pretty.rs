//! C source emission.
//!
//! Renders a [`TranslationUnit`] back into compilable C text. Expressions
//! are parenthesized on emission, so no precedence table is needed; output
//! is deterministic for a given tree.

use std::fmt::Write;

use crate::ast::{
    BinOp, Block, Exp, FunDecl, Global, Instr, Label, Lval, Stmt, StmtKind, TranslationUnit, Ty,
    UnOp, VarInfo,
};

const INDENT: &str = "    ";

/// Render a whole translation unit to C source.
pub fn unit_to_string(unit: &TranslationUnit) -> String {
    let mut p = Printer::new();
    for global in &unit.globals {
        p.global(global);
    }
    p.out
}

/// Render a single statement (used by debug dumps and map round-trips).
pub fn stmt_to_string(stmt: &Stmt) -> String {
    let mut p = Printer::new();
    p.stmt(stmt);
    p.out
}

/// Render a single expression.
pub fn exp_to_string(exp: &Exp) -> String {
    let mut p = Printer::new();
    p.exp(exp);
    p.out
}

struct Printer {
    out: String,
    depth: usize,
}

impl Printer {
    fn new() -> Self {
        Printer {
            out: String::new(),
            depth: 0,
        }
    }

    fn line_start(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
    }

    fn global(&mut self, global: &Global) {
        match global {
            Global::Fun(f) => self.fun(f),
            Global::VarDecl(info) => {
                self.decl(info);
                self.out.push_str(";\n");
            }
            Global::Var(info, init) => {
                self.decl(info);
                if let Some(e) = init {
                    self.out.push_str(" = ");
                    self.exp(e);
                }
                self.out.push_str(";\n");
            }
            Global::Text(text) => {
                self.out.push_str(text);
                self.out.push('\n');
            }
        }
    }

    fn fun(&mut self, f: &FunDecl) {
        self.ty(&f.return_type);
        let _ = write!(self.out, " {}(", f.name);
        if f.formals.is_empty() {
            self.out.push_str("void");
        } else {
            for (i, formal) in f.formals.iter().enumerate() {
                if i > 0 {
                    self.out.push_str(", ");
                }
                self.decl(formal);
            }
        }
        self.out.push_str(")\n{\n");
        self.depth += 1;
        for local in &f.locals {
            self.line_start();
            self.decl(local);
            self.out.push_str(";\n");
        }
        for stmt in &f.body.stmts {
            self.stmt(stmt);
        }
        self.depth -= 1;
        self.out.push_str("}\n");
    }

    /// A declaration: type then declarator, handling pointer and array
    /// syntax around the name.
    fn decl(&mut self, info: &VarInfo) {
        match &info.ty {
            Ty::Ptr(inner) => {
                self.ty(inner);
                let _ = write!(self.out, " *{}", info.name);
            }
            Ty::Array(inner, len) => {
                self.ty(inner);
                let _ = write!(self.out, " {}[", info.name);
                if let Some(n) = len {
                    let _ = write!(self.out, "{n}");
                }
                self.out.push(']');
            }
            other => {
                self.ty(other);
                let _ = write!(self.out, " {}", info.name);
            }
        }
    }

    fn ty(&mut self, ty: &Ty) {
        match ty {
            Ty::Void => self.out.push_str("void"),
            Ty::Char => self.out.push_str("char"),
            Ty::Int => self.out.push_str("int"),
            Ty::Long => self.out.push_str("long"),
            Ty::Float => self.out.push_str("float"),
            Ty::Double => self.out.push_str("double"),
            Ty::Named(name) => self.out.push_str(name),
            Ty::Ptr(inner) => {
                self.ty(inner);
                self.out.push_str(" *");
            }
            Ty::Array(inner, _) => {
                self.ty(inner);
                self.out.push_str(" []");
            }
        }
    }

    fn labels(&mut self, labels: &[Label]) {
        for label in labels {
            self.line_start();
            match label {
                Label::Named(name, _) => {
                    let _ = write!(self.out, "{name}:");
                }
                Label::Case(e, _) => {
                    self.out.push_str("case ");
                    self.exp(e);
                    self.out.push(':');
                }
                Label::Default(_) => self.out.push_str("default:"),
            }
            self.out.push('\n');
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        self.labels(&stmt.labels);
        match &stmt.kind {
            StmtKind::Instr(instrs) => {
                if instrs.is_empty() {
                    self.line_start();
                    self.out.push_str(";\n");
                }
                for instr in instrs {
                    self.line_start();
                    self.instr(instr);
                    self.out.push_str(";\n");
                }
            }
            StmtKind::Return(e, _) => {
                self.line_start();
                self.out.push_str("return");
                if let Some(e) = e {
                    self.out.push(' ');
                    self.exp(e);
                }
                self.out.push_str(";\n");
            }
            StmtKind::Goto(target, _) => {
                self.line_start();
                let _ = writeln!(self.out, "goto {target};");
            }
            StmtKind::Break(_) => {
                self.line_start();
                self.out.push_str("break;\n");
            }
            StmtKind::Continue(_) => {
                self.line_start();
                self.out.push_str("continue;\n");
            }
            StmtKind::If {
                cond,
                then_block,
                else_block,
                ..
            } => {
                self.line_start();
                self.out.push_str("if (");
                self.exp(cond);
                self.out.push_str(") ");
                self.braced(then_block);
                if !else_block.stmts.is_empty() {
                    self.line_start();
                    self.out.push_str("else ");
                    self.braced(else_block);
                }
            }
            StmtKind::Switch { scrut, body, .. } => {
                self.line_start();
                self.out.push_str("switch (");
                self.exp(scrut);
                self.out.push_str(") ");
                self.braced(body);
            }
            StmtKind::Loop(body, _) => {
                self.line_start();
                self.out.push_str("while (1) ");
                self.braced(body);
            }
            StmtKind::Block(body) => {
                self.line_start();
                self.braced(body);
            }
            StmtKind::TryFinally(body, handler, _) => {
                self.line_start();
                self.out.push_str("__try ");
                self.braced(body);
                self.line_start();
                self.out.push_str("__finally ");
                self.braced(handler);
            }
            StmtKind::TryExcept(body, filter, handler, _) => {
                self.line_start();
                self.out.push_str("__try ");
                self.braced(body);
                self.line_start();
                self.out.push_str("__except (");
                self.exp(filter);
                self.out.push_str(") ");
                self.braced(handler);
            }
        }
    }

    fn braced(&mut self, block: &Block) {
        self.out.push_str("{\n");
        self.depth += 1;
        for stmt in &block.stmts {
            self.stmt(stmt);
        }
        self.depth -= 1;
        self.line_start();
        self.out.push_str("}\n");
    }

    fn instr(&mut self, instr: &Instr) {
        match instr {
            Instr::Set(lv, e, _) => {
                self.lval(lv);
                self.out.push_str(" = ");
                self.exp(e);
            }
            Instr::Call(ret, callee, args, _) => {
                if let Some(lv) = ret {
                    self.lval(lv);
                    self.out.push_str(" = ");
                }
                self.exp(callee);
                self.out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.exp(arg);
                }
                self.out.push(')');
            }
            Instr::Asm(text, _) => {
                let _ = write!(self.out, "__asm__({text})");
            }
        }
    }

    fn exp(&mut self, exp: &Exp) {
        match exp {
            Exp::IntLit(n) => {
                let _ = write!(self.out, "{n}");
            }
            Exp::StrLit(s) => {
                let _ = write!(self.out, "\"{}\"", escape(s));
            }
            Exp::CharLit(c) => {
                let _ = write!(self.out, "'{c}'");
            }
            Exp::Lval(lv) => self.lval(lv),
            Exp::UnOp(op, e) => {
                self.out.push_str(match op {
                    UnOp::Neg => "-",
                    UnOp::BNot => "~",
                    UnOp::LNot => "!",
                });
                self.out.push('(');
                self.exp(e);
                self.out.push(')');
            }
            Exp::BinOp(op, l, r) => {
                self.out.push('(');
                self.exp(l);
                let _ = write!(self.out, " {} ", binop(*op));
                self.exp(r);
                self.out.push(')');
            }
            Exp::Cast(ty, e) => {
                self.out.push('(');
                self.ty(ty);
                self.out.push(')');
                self.out.push('(');
                self.exp(e);
                self.out.push(')');
            }
            Exp::AddrOf(lv) => {
                self.out.push_str("&(");
                self.lval(lv);
                self.out.push(')');
            }
            Exp::SizeOfTy(ty) => {
                self.out.push_str("sizeof(");
                self.ty(ty);
                self.out.push(')');
            }
            Exp::SizeOfExp(e) => {
                self.out.push_str("sizeof(");
                self.exp(e);
                self.out.push(')');
            }
        }
    }

    fn lval(&mut self, lval: &Lval) {
        match lval {
            Lval::Var(name) => self.out.push_str(name),
            Lval::Mem(e) => {
                self.out.push_str("*(");
                self.exp(e);
                self.out.push(')');
            }
            Lval::Field(base, field) => {
                self.lval(base);
                let _ = write!(self.out, ".{field}");
            }
            Lval::Index(base, idx) => {
                self.lval(base);
                self.out.push('[');
                self.exp(idx);
                self.out.push(']');
            }
        }
    }
}

fn binop(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
        BinOp::Shl => "<<",
        BinOp::Shr => ">>",
        BinOp::Lt => "<",
        BinOp::Gt => ">",
        BinOp::Le => "<=",
        BinOp::Ge => ">=",
        BinOp::Eq => "==",
        BinOp::Ne => "!=",
        BinOp::BAnd => "&",
        BinOp::BXor => "^",
        BinOp::BOr => "|",
        BinOp::LAnd => "&&",
        BinOp::LOr => "||",
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Location;

    #[test]
    fn return_statement() {
        let s = Stmt::new(StmtKind::Return(Some(Exp::IntLit(0)), Location::unknown()));
        assert_eq!(stmt_to_string(&s), "return 0;\n");
    }

    #[test]
    fn labeled_assignment() {
        let s = Stmt::with_labels(
            StmtKind::Instr(vec![Instr::Set(
                Lval::Var("x".into()),
                Exp::IntLit(1),
                Location::unknown(),
            )]),
            vec![Label::Named("retry".into(), Location::unknown())],
        );
        assert_eq!(stmt_to_string(&s), "retry:\nx = 1;\n");
    }

    #[test]
    fn string_literals_are_escaped() {
        let e = Exp::StrLit("a\nb\"c".into());
        assert_eq!(exp_to_string(&e), "\"a\\nb\\\"c\"");
    }

    #[test]
    fn nested_binops_parenthesize() {
        let e = Exp::BinOp(
            BinOp::Mul,
            Box::new(Exp::BinOp(
                BinOp::Add,
                Box::new(Exp::var("a")),
                Box::new(Exp::var("b")),
            )),
            Box::new(Exp::IntLit(2)),
        );
        assert_eq!(exp_to_string(&e), "((a + b) * 2)");
    }

    #[test]
    fn function_with_pointer_formal() {
        let f = FunDecl {
            name: "emit".into(),
            return_type: Ty::Void,
            formals: vec![VarInfo::new("out", Ty::Ptr(Box::new(Ty::Named("FILE".into()))))],
            locals: vec![VarInfo::new("n", Ty::Int)],
            body: Block::new(vec![Stmt::new(StmtKind::Return(None, Location::unknown()))]),
            loc: Location::unknown(),
        };
        let mut unit = TranslationUnit::new("demo.c");
        unit.globals.push(Global::Fun(f));
        let text = unit_to_string(&unit);
        assert!(text.contains("void emit(FILE *out)"));
        assert!(text.contains("    int n;"));
        assert!(text.contains("    return;"));
    }
}
