#![doc = include_str!("../README.md")]

//! AST model, visitor framework, and C emission.
//!
//! This crate is the common currency of the toolkit: the instrumenter
//! rewrites these trees, the variant representation mutates them, and the
//! statement identifiers assigned here tie traces, rankings and
//! localizations back to source statements.

pub mod ast;
pub mod pretty;
#[cfg(any(test, feature = "proptest"))]
pub mod proptest_generators;
pub mod visit;

pub use ast::{
    AstError, BinOp, Block, Exp, FunDecl, Global, Instr, Label, Location, Lval, Stmt, StmtKind,
    TranslationUnit, Ty, UnOp, VarInfo, AST_SCHEMA_VERSION,
};
pub use visit::{walk_block, walk_exp, walk_fun, walk_global, walk_stmt, walk_unit, VisitAction,
    Visitor};
