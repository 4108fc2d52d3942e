//! Proptest strategies for AST nodes, used by invariant tests across the
//! workspace.

use proptest::prelude::*;

use crate::ast::{
    BinOp, Block, Exp, FunDecl, Global, Instr, Location, Lval, Stmt, StmtKind, TranslationUnit, Ty,
    VarInfo,
};

pub fn arb_ident() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,6}"
}

pub fn arb_exp() -> impl Strategy<Value = Exp> {
    let leaf = prop_oneof![
        (-100i64..100).prop_map(Exp::IntLit),
        arb_ident().prop_map(Exp::var),
    ];
    leaf.prop_recursive(3, 16, 2, |inner| {
        prop_oneof![
            (any::<bool>(), inner.clone(), inner.clone()).prop_map(|(add, l, r)| {
                let op = if add { BinOp::Add } else { BinOp::Lt };
                Exp::BinOp(op, Box::new(l), Box::new(r))
            }),
            inner.prop_map(|e| Exp::SizeOfExp(Box::new(e))),
        ]
    })
}

fn arb_instr() -> impl Strategy<Value = Instr> {
    prop_oneof![
        (arb_ident(), arb_exp())
            .prop_map(|(name, e)| Instr::Set(Lval::Var(name), e, Location::unknown())),
        (arb_ident(), proptest::collection::vec(arb_exp(), 0..3)).prop_map(|(name, args)| {
            Instr::Call(None, Exp::var(name), args, Location::unknown())
        }),
    ]
}

pub fn arb_stmt() -> impl Strategy<Value = Stmt> {
    let leaf = prop_oneof![
        proptest::collection::vec(arb_instr(), 1..3)
            .prop_map(|instrs| Stmt::new(StmtKind::Instr(instrs))),
        proptest::option::of(arb_exp())
            .prop_map(|e| Stmt::new(StmtKind::Return(e, Location::unknown()))),
        Just(Stmt::new(StmtKind::Break(Location::unknown()))),
        Just(Stmt::new(StmtKind::Continue(Location::unknown()))),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            (arb_exp(), proptest::collection::vec(inner.clone(), 0..3)).prop_map(
                |(cond, stmts)| {
                    Stmt::new(StmtKind::If {
                        cond,
                        then_block: Block::new(stmts),
                        else_block: Block::default(),
                        loc: Location::unknown(),
                    })
                }
            ),
            proptest::collection::vec(inner, 0..3)
                .prop_map(|stmts| Stmt::new(StmtKind::Loop(Block::new(stmts), Location::unknown()))),
        ]
    })
}

pub fn arb_unit() -> impl Strategy<Value = TranslationUnit> {
    (arb_ident(), proptest::collection::vec(arb_stmt(), 1..6)).prop_map(|(name, stmts)| {
        let mut unit = TranslationUnit::new(format!("{name}.c"));
        unit.globals.push(Global::Fun(FunDecl {
            name: "main".into(),
            return_type: Ty::Int,
            formals: Vec::new(),
            locals: vec![VarInfo::new("x", Ty::Int)],
            body: Block::new(stmts),
            loc: Location::unknown(),
        }));
        unit
    })
}
