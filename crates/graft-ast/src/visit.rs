//! Generic rewriting traversal over the C AST.
//!
//! Client visitors inspect a borrowed node and answer with a [`VisitAction`]:
//! keep it ([`VisitAction::Skip`]), substitute it ([`VisitAction::Replace`]),
//! descend into its children ([`VisitAction::Descend`]), or substitute, then
//! descend, then post-process ([`VisitAction::DescendThen`]). Statement and
//! global hooks are list-returning so a single node can expand to zero or
//! more replacements, which the parent splices in.
//!
//! The drivers consume nodes by value and move unchanged nodes straight back
//! into the rebuilt tree, so the no-change case performs no allocation.
//! Replacement nodes produced by [`VisitAction::Replace`] are not
//! re-dispatched; [`VisitAction::DescendThen`] descends into the children of
//! the substituted nodes before the post function runs.

use crate::ast::{Block, Exp, FunDecl, Global, Instr, Lval, Stmt, StmtKind, TranslationUnit};

/// Post-processing hook applied by [`VisitAction::DescendThen`] after the
/// substituted node's children have been rebuilt.
pub type PostFn<T> = Box<dyn FnOnce(T) -> T>;

/// What the traversal should do at a node.
pub enum VisitAction<T> {
    /// Keep the node unchanged and do not descend.
    Skip,
    /// Use the given replacement and do not descend.
    Replace(T),
    /// Visit the node's children and rebuild it around the results.
    Descend,
    /// Substitute the node, descend into the substitute's children, then
    /// apply the post function to the rebuilt result.
    DescendThen(T, PostFn<T>),
}

/// A rewriting visitor. Every hook defaults to [`VisitAction::Descend`];
/// scope hooks default to no-ops.
pub trait Visitor {
    /// Called per top-level definition; replacements are spliced into the
    /// unit's global list.
    fn visit_global(&mut self, _global: &Global) -> VisitAction<Vec<Global>> {
        VisitAction::Descend
    }

    fn visit_fun(&mut self, _fun: &FunDecl) -> VisitAction<FunDecl> {
        VisitAction::Descend
    }

    fn visit_block(&mut self, _block: &Block) -> VisitAction<Block> {
        VisitAction::Descend
    }

    /// Called per statement; replacements are spliced into the enclosing
    /// block's statement list.
    fn visit_stmt(&mut self, _stmt: &Stmt) -> VisitAction<Vec<Stmt>> {
        VisitAction::Descend
    }

    /// Called per instruction; replacements are spliced into the enclosing
    /// instruction run.
    fn visit_instr(&mut self, _instr: &Instr) -> VisitAction<Vec<Instr>> {
        VisitAction::Descend
    }

    fn visit_exp(&mut self, _exp: &Exp) -> VisitAction<Exp> {
        VisitAction::Descend
    }

    /// Entering a symbol scope: a function's parameter scope, a block, or a
    /// loop body.
    fn enter_scope(&mut self) {}

    /// Leaving the scope opened by the matching [`Visitor::enter_scope`].
    fn exit_scope(&mut self) {}
}

/// Rewrite a whole translation unit.
pub fn walk_unit(v: &mut dyn Visitor, unit: TranslationUnit) -> TranslationUnit {
    let TranslationUnit {
        schema_version,
        file_name,
        globals,
        global_init,
    } = unit;
    let mut out = Vec::with_capacity(globals.len());
    for global in globals {
        out.extend(walk_global(v, global));
    }
    TranslationUnit {
        schema_version,
        file_name,
        globals: out,
        global_init,
    }
}

pub fn walk_global(v: &mut dyn Visitor, global: Global) -> Vec<Global> {
    match v.visit_global(&global) {
        VisitAction::Skip => vec![global],
        VisitAction::Replace(list) => list,
        VisitAction::Descend => vec![walk_global_children(v, global)],
        VisitAction::DescendThen(list, post) => {
            let rebuilt = list
                .into_iter()
                .map(|g| walk_global_children(v, g))
                .collect();
            post(rebuilt)
        }
    }
}

fn walk_global_children(v: &mut dyn Visitor, global: Global) -> Global {
    match global {
        Global::Fun(f) => Global::Fun(walk_fun(v, f)),
        Global::Var(info, Some(init)) => Global::Var(info, Some(walk_exp(v, init))),
        other => other,
    }
}

pub fn walk_fun(v: &mut dyn Visitor, fun: FunDecl) -> FunDecl {
    match v.visit_fun(&fun) {
        VisitAction::Skip => fun,
        VisitAction::Replace(f) => f,
        VisitAction::Descend => walk_fun_children(v, fun),
        VisitAction::DescendThen(f, post) => post(walk_fun_children(v, f)),
    }
}

fn walk_fun_children(v: &mut dyn Visitor, mut fun: FunDecl) -> FunDecl {
    v.enter_scope();
    fun.body = walk_block(v, fun.body);
    v.exit_scope();
    fun
}

pub fn walk_block(v: &mut dyn Visitor, block: Block) -> Block {
    match v.visit_block(&block) {
        VisitAction::Skip => block,
        VisitAction::Replace(b) => b,
        VisitAction::Descend => walk_block_children(v, block),
        VisitAction::DescendThen(b, post) => post(walk_block_children(v, b)),
    }
}

fn walk_block_children(v: &mut dyn Visitor, block: Block) -> Block {
    v.enter_scope();
    let mut out = Vec::with_capacity(block.stmts.len());
    for stmt in block.stmts {
        out.extend(walk_stmt(v, stmt));
    }
    v.exit_scope();
    Block { stmts: out }
}

pub fn walk_stmt(v: &mut dyn Visitor, stmt: Stmt) -> Vec<Stmt> {
    match v.visit_stmt(&stmt) {
        VisitAction::Skip => vec![stmt],
        VisitAction::Replace(list) => list,
        VisitAction::Descend => vec![walk_stmt_children(v, stmt)],
        VisitAction::DescendThen(list, post) => {
            let rebuilt = list.into_iter().map(|s| walk_stmt_children(v, s)).collect();
            post(rebuilt)
        }
    }
}

fn walk_stmt_children(v: &mut dyn Visitor, mut stmt: Stmt) -> Stmt {
    stmt.kind = match stmt.kind {
        StmtKind::Instr(instrs) => StmtKind::Instr(walk_instrs(v, instrs)),
        StmtKind::Return(e, loc) => StmtKind::Return(e.map(|e| walk_exp(v, e)), loc),
        StmtKind::If {
            cond,
            then_block,
            else_block,
            loc,
        } => StmtKind::If {
            cond: walk_exp(v, cond),
            then_block: walk_block(v, then_block),
            else_block: walk_block(v, else_block),
            loc,
        },
        StmtKind::Switch { scrut, body, loc } => StmtKind::Switch {
            scrut: walk_exp(v, scrut),
            body: walk_block(v, body),
            loc,
        },
        StmtKind::Loop(body, loc) => StmtKind::Loop(walk_block(v, body), loc),
        StmtKind::Block(body) => StmtKind::Block(walk_block(v, body)),
        StmtKind::TryFinally(a, b, loc) => {
            StmtKind::TryFinally(walk_block(v, a), walk_block(v, b), loc)
        }
        StmtKind::TryExcept(a, e, b, loc) => {
            StmtKind::TryExcept(walk_block(v, a), walk_exp(v, e), walk_block(v, b), loc)
        }
        passthrough @ (StmtKind::Goto(..) | StmtKind::Break(_) | StmtKind::Continue(_)) => {
            passthrough
        }
    };
    stmt
}

pub fn walk_instrs(v: &mut dyn Visitor, instrs: Vec<Instr>) -> Vec<Instr> {
    let mut out = Vec::with_capacity(instrs.len());
    for instr in instrs {
        match v.visit_instr(&instr) {
            VisitAction::Skip => out.push(instr),
            VisitAction::Replace(list) => out.extend(list),
            VisitAction::Descend => out.push(walk_instr_children(v, instr)),
            VisitAction::DescendThen(list, post) => {
                let rebuilt = list
                    .into_iter()
                    .map(|i| walk_instr_children(v, i))
                    .collect();
                out.extend(post(rebuilt));
            }
        }
    }
    out
}

fn walk_instr_children(v: &mut dyn Visitor, instr: Instr) -> Instr {
    match instr {
        Instr::Set(lv, e, loc) => Instr::Set(walk_lval(v, lv), walk_exp(v, e), loc),
        Instr::Call(ret, callee, args, loc) => Instr::Call(
            ret.map(|lv| walk_lval(v, lv)),
            walk_exp(v, callee),
            args.into_iter().map(|a| walk_exp(v, a)).collect(),
            loc,
        ),
        asm @ Instr::Asm(..) => asm,
    }
}

pub fn walk_exp(v: &mut dyn Visitor, exp: Exp) -> Exp {
    match v.visit_exp(&exp) {
        VisitAction::Skip => exp,
        VisitAction::Replace(e) => e,
        VisitAction::Descend => walk_exp_children(v, exp),
        VisitAction::DescendThen(e, post) => post(walk_exp_children(v, e)),
    }
}

fn walk_exp_children(v: &mut dyn Visitor, exp: Exp) -> Exp {
    match exp {
        Exp::Lval(lv) => Exp::Lval(walk_lval(v, lv)),
        Exp::UnOp(op, e) => Exp::UnOp(op, Box::new(walk_exp(v, *e))),
        Exp::BinOp(op, l, r) => {
            Exp::BinOp(op, Box::new(walk_exp(v, *l)), Box::new(walk_exp(v, *r)))
        }
        Exp::Cast(ty, e) => Exp::Cast(ty, Box::new(walk_exp(v, *e))),
        Exp::AddrOf(lv) => Exp::AddrOf(walk_lval(v, lv)),
        Exp::SizeOfExp(e) => Exp::SizeOfExp(Box::new(walk_exp(v, *e))),
        leaf @ (Exp::IntLit(_) | Exp::StrLit(_) | Exp::CharLit(_) | Exp::SizeOfTy(_)) => leaf,
    }
}

fn walk_lval(v: &mut dyn Visitor, lval: Lval) -> Lval {
    match lval {
        Lval::Var(name) => Lval::Var(name),
        Lval::Mem(e) => Lval::Mem(Box::new(walk_exp(v, *e))),
        Lval::Field(base, field) => Lval::Field(Box::new(walk_lval(v, *base)), field),
        Lval::Index(base, idx) => Lval::Index(
            Box::new(walk_lval(v, *base)),
            Box::new(walk_exp(v, *idx)),
        ),
    }
}
