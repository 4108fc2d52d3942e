//! The C abstract syntax tree consumed and produced by the toolkit.
//!
//! The shape mirrors what the external C frontend emits: a translation unit
//! of globals, function bodies as blocks of labeled statements, and a small
//! expression language. Statements carry a `sid` slot (0 = not traced) that
//! the coverage instrumenter fills in; everything else is plain data.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Schema version of the serialized translation-unit artifact.
pub const AST_SCHEMA_VERSION: u32 = 1;

/// Errors reading or writing serialized translation units.
#[derive(Debug, Error)]
pub enum AstError {
    #[error("failed to read '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to write '{path}': {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed AST artifact: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("AST artifact schema version {found} does not match expected {expected}")]
    SchemaMismatch { found: u32, expected: u32 },
}

/// A source location as reported by the frontend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: i64,
    pub byte: i64,
}

impl Location {
    pub const UNKNOWN_LINE: i64 = -1;

    /// The location used for synthesized nodes.
    pub fn unknown() -> Self {
        Location {
            file: String::new(),
            line: Self::UNKNOWN_LINE,
            byte: -1,
        }
    }
}

impl Default for Location {
    fn default() -> Self {
        Location::unknown()
    }
}

/// A whole translation unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationUnit {
    pub schema_version: u32,
    /// Name of the `.c` file this unit came from.
    pub file_name: String,
    pub globals: Vec<Global>,
    /// Name of the synthesized global initializer, once one exists.
    pub global_init: Option<String>,
}

impl TranslationUnit {
    pub fn new(file_name: impl Into<String>) -> Self {
        TranslationUnit {
            schema_version: AST_SCHEMA_VERSION,
            file_name: file_name.into(),
            globals: Vec::new(),
            global_init: None,
        }
    }

    pub fn to_json(&self) -> Result<String, AstError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, AstError> {
        let unit: TranslationUnit = serde_json::from_str(text)?;
        if unit.schema_version != AST_SCHEMA_VERSION {
            return Err(AstError::SchemaMismatch {
                found: unit.schema_version,
                expected: AST_SCHEMA_VERSION,
            });
        }
        Ok(unit)
    }

    pub fn save(&self, path: &std::path::Path) -> Result<(), AstError> {
        let text = self.to_json()?;
        std::fs::write(path, text).map_err(|source| AstError::Write {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn load(path: &std::path::Path) -> Result<Self, AstError> {
        let text = std::fs::read_to_string(path).map_err(|source| AstError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Iterate over all function definitions.
    pub fn functions(&self) -> impl Iterator<Item = &FunDecl> {
        self.globals.iter().filter_map(|g| match g {
            Global::Fun(f) => Some(f),
            _ => None,
        })
    }

    /// Find or create the global initializer function.
    ///
    /// On first call this synthesizes an empty `void __graft_globinit(void)`
    /// definition, appends it to the unit, and splices a call to it at the
    /// head of `main` when a `main` definition exists.
    pub fn ensure_global_init(&mut self) -> &mut FunDecl {
        if self.global_init.is_none() {
            let name = "__graft_globinit".to_string();
            // The initializer may already exist even when the metadata was
            // lost (e.g. the unit came back through the frontend); reuse it.
            if !self.functions().any(|f| f.name == name) {
                let init = FunDecl {
                    name: name.clone(),
                    return_type: Ty::Void,
                    formals: Vec::new(),
                    locals: Vec::new(),
                    body: Block { stmts: Vec::new() },
                    loc: Location::unknown(),
                };
                self.globals.push(Global::Fun(init));
                if let Some(main) = self.find_fun_mut("main") {
                    let call = Stmt::new(StmtKind::Instr(vec![Instr::Call(
                        None,
                        Exp::Lval(Lval::Var(name.clone())),
                        Vec::new(),
                        Location::unknown(),
                    )]));
                    main.body.stmts.insert(0, call);
                }
            }
            self.global_init = Some(name);
        }
        // The initializer was just pushed (or already present); look it up by
        // its recorded name.
        let name = self.global_init.clone().unwrap_or_default();
        self.globals
            .iter_mut()
            .find_map(|g| match g {
                Global::Fun(f) if f.name == name => Some(f),
                _ => None,
            })
            .expect("global initializer exists after ensure_global_init")
    }

    pub fn find_fun_mut(&mut self, name: &str) -> Option<&mut FunDecl> {
        self.globals.iter_mut().find_map(|g| match g {
            Global::Fun(f) if f.name == name => Some(f),
            _ => None,
        })
    }
}

/// A top-level definition or declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Global {
    Fun(FunDecl),
    VarDecl(VarInfo),
    Var(VarInfo, Option<Exp>),
    /// Verbatim text passed through to the output (e.g. preprocessor lines).
    Text(String),
}

/// A function definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunDecl {
    pub name: String,
    pub return_type: Ty,
    pub formals: Vec<VarInfo>,
    pub locals: Vec<VarInfo>,
    pub body: Block,
    pub loc: Location,
}

/// A declared variable (global, formal, or local).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarInfo {
    pub name: String,
    pub ty: Ty,
    pub loc: Location,
}

impl VarInfo {
    pub fn new(name: impl Into<String>, ty: Ty) -> Self {
        VarInfo {
            name: name.into(),
            ty,
            loc: Location::unknown(),
        }
    }
}

/// The subset of C types the toolkit needs to print declarations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Ty {
    Void,
    Char,
    Int,
    Long,
    Float,
    Double,
    Named(String),
    Ptr(Box<Ty>),
    Array(Box<Ty>, Option<i64>),
}

/// A sequence of statements.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Block { stmts }
    }
}

/// A labeled statement with its traced-statement identifier.
///
/// `sid == 0` means the statement is not traced. Identifiers are assigned
/// once, in traversal order, by the coverage instrumenter's numbering pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub labels: Vec<Label>,
    pub kind: StmtKind,
    pub sid: u32,
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Stmt {
            labels: Vec::new(),
            kind,
            sid: 0,
        }
    }

    pub fn with_labels(kind: StmtKind, labels: Vec<Label>) -> Self {
        Stmt {
            labels,
            kind,
            sid: 0,
        }
    }

    /// Whether this statement is eligible for a statement identifier.
    ///
    /// Traceable kinds are straight-line instruction lists, returns,
    /// conditionals and loops; a statement carrying any label with the
    /// reserved prefix is synthetic instrumentation and never traced.
    pub fn is_traceable(&self, reserved_prefix: &str) -> bool {
        let kind_ok = matches!(
            self.kind,
            StmtKind::Instr(_) | StmtKind::Return(..) | StmtKind::If { .. } | StmtKind::Loop(..)
        );
        kind_ok && !self.has_reserved_label(reserved_prefix)
    }

    pub fn has_reserved_label(&self, reserved_prefix: &str) -> bool {
        self.labels.iter().any(|l| match l {
            Label::Named(name, _) => name.starts_with(reserved_prefix),
            _ => false,
        })
    }

    /// Drop labels whose name starts with the reserved prefix.
    pub fn strip_reserved_labels(&mut self, reserved_prefix: &str) {
        self.labels.retain(|l| match l {
            Label::Named(name, _) => !name.starts_with(reserved_prefix),
            _ => true,
        });
    }

    /// Zero the `sid` of this statement and every statement beneath it.
    pub fn strip_ids(&mut self) {
        self.sid = 0;
        self.kind.strip_ids();
    }

    /// Best-effort source location of this statement.
    pub fn loc(&self) -> Location {
        match &self.kind {
            StmtKind::Instr(instrs) => instrs
                .first()
                .map(|i| i.loc().clone())
                .unwrap_or_else(Location::unknown),
            StmtKind::Return(_, loc)
            | StmtKind::Goto(_, loc)
            | StmtKind::Break(loc)
            | StmtKind::Continue(loc)
            | StmtKind::If { loc, .. }
            | StmtKind::Switch { loc, .. }
            | StmtKind::Loop(_, loc)
            | StmtKind::TryFinally(_, _, loc)
            | StmtKind::TryExcept(_, _, _, loc) => loc.clone(),
            StmtKind::Block(_) => Location::unknown(),
        }
    }
}

/// The statement kinds of the frontend's AST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    /// A run of straight-line instructions.
    Instr(Vec<Instr>),
    Return(Option<Exp>, Location),
    Goto(String, Location),
    Break(Location),
    Continue(Location),
    If {
        cond: Exp,
        then_block: Block,
        else_block: Block,
        loc: Location,
    },
    Switch {
        scrut: Exp,
        body: Block,
        loc: Location,
    },
    Loop(Block, Location),
    Block(Block),
    TryFinally(Block, Block, Location),
    TryExcept(Block, Exp, Block, Location),
}

impl StmtKind {
    /// Zero the `sid` of every statement nested inside this kind.
    pub fn strip_ids(&mut self) {
        fn strip_block(b: &mut Block) {
            for s in &mut b.stmts {
                s.strip_ids();
            }
        }
        match self {
            StmtKind::If {
                then_block,
                else_block,
                ..
            } => {
                strip_block(then_block);
                strip_block(else_block);
            }
            StmtKind::Switch { body, .. } => strip_block(body),
            StmtKind::Loop(body, _) => strip_block(body),
            StmtKind::Block(body) => strip_block(body),
            StmtKind::TryFinally(a, b, _) => {
                strip_block(a);
                strip_block(b);
            }
            StmtKind::TryExcept(a, _, b, _) => {
                strip_block(a);
                strip_block(b);
            }
            StmtKind::Instr(_)
            | StmtKind::Return(..)
            | StmtKind::Goto(..)
            | StmtKind::Break(_)
            | StmtKind::Continue(_) => {}
        }
    }
}

/// A statement label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Label {
    Named(String, Location),
    Case(Exp, Location),
    Default(Location),
}

/// A side-effecting instruction within a straight-line run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instr {
    /// `lval = exp;`
    Set(Lval, Exp, Location),
    /// `lval = f(args);` or `f(args);`
    Call(Option<Lval>, Exp, Vec<Exp>, Location),
    /// Verbatim inline assembly.
    Asm(String, Location),
}

impl Instr {
    pub fn loc(&self) -> &Location {
        match self {
            Instr::Set(_, _, loc) | Instr::Call(_, _, _, loc) | Instr::Asm(_, loc) => loc,
        }
    }

    /// The name of the called function, for direct calls.
    pub fn callee_name(&self) -> Option<&str> {
        match self {
            Instr::Call(_, Exp::Lval(Lval::Var(name)), _, _) => Some(name.as_str()),
            _ => None,
        }
    }
}

/// An expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Exp {
    IntLit(i64),
    StrLit(String),
    CharLit(char),
    Lval(Lval),
    UnOp(UnOp, Box<Exp>),
    BinOp(BinOp, Box<Exp>, Box<Exp>),
    Cast(Ty, Box<Exp>),
    AddrOf(Lval),
    SizeOfTy(Ty),
    SizeOfExp(Box<Exp>),
}

impl Exp {
    pub fn var(name: impl Into<String>) -> Self {
        Exp::Lval(Lval::Var(name.into()))
    }
}

/// An assignable location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Lval {
    Var(String),
    /// `*exp`
    Mem(Box<Exp>),
    /// `lval.field`
    Field(Box<Lval>, String),
    /// `lval[exp]`
    Index(Box<Lval>, Box<Exp>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    BNot,
    LNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BAnd,
    BXor,
    BOr,
    LAnd,
    LOr,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assign(var: &str, value: i64) -> Stmt {
        Stmt::new(StmtKind::Instr(vec![Instr::Set(
            Lval::Var(var.to_string()),
            Exp::IntLit(value),
            Location::unknown(),
        )]))
    }

    #[test]
    fn traceable_kinds() {
        assert!(assign("x", 1).is_traceable("claire"));
        assert!(Stmt::new(StmtKind::Return(None, Location::unknown())).is_traceable("claire"));
        assert!(Stmt::new(StmtKind::Loop(Block::default(), Location::unknown()))
            .is_traceable("claire"));
        assert!(!Stmt::new(StmtKind::Goto("l".into(), Location::unknown())).is_traceable("claire"));
        assert!(!Stmt::new(StmtKind::Break(Location::unknown())).is_traceable("claire"));
        assert!(!Stmt::new(StmtKind::Block(Block::default())).is_traceable("claire"));
    }

    #[test]
    fn reserved_label_blocks_tracing() {
        let mut s = assign("x", 1);
        s.labels
            .push(Label::Named("claire42".into(), Location::unknown()));
        assert!(!s.is_traceable("claire"));
        s.strip_reserved_labels("claire");
        assert!(s.labels.is_empty());
        assert!(s.is_traceable("claire"));
    }

    #[test]
    fn strip_ids_reaches_nested_statements() {
        let mut inner = assign("x", 1);
        inner.sid = 7;
        let mut outer = Stmt::new(StmtKind::If {
            cond: Exp::IntLit(1),
            then_block: Block::new(vec![inner]),
            else_block: Block::default(),
            loc: Location::unknown(),
        });
        outer.sid = 3;
        outer.strip_ids();
        assert_eq!(outer.sid, 0);
        match &outer.kind {
            StmtKind::If { then_block, .. } => assert_eq!(then_block.stmts[0].sid, 0),
            _ => unreachable!(),
        }
    }

    #[test]
    fn json_round_trip_preserves_structure() {
        let mut unit = TranslationUnit::new("demo.c");
        unit.globals.push(Global::Fun(FunDecl {
            name: "main".into(),
            return_type: Ty::Int,
            formals: Vec::new(),
            locals: vec![VarInfo::new("x", Ty::Int)],
            body: Block::new(vec![assign("x", 1)]),
            loc: Location::unknown(),
        }));
        let text = unit.to_json().expect("serialize");
        let back = TranslationUnit::from_json(&text).expect("deserialize");
        assert_eq!(unit, back);
    }

    #[test]
    fn schema_mismatch_is_rejected() {
        let mut unit = TranslationUnit::new("demo.c");
        unit.schema_version = 99;
        let text = serde_json::to_string(&unit).expect("serialize");
        match TranslationUnit::from_json(&text) {
            Err(AstError::SchemaMismatch { found: 99, .. }) => {}
            other => panic!("expected SchemaMismatch, got: {other:?}"),
        }
    }

    #[test]
    fn ensure_global_init_splices_call_into_main() {
        let mut unit = TranslationUnit::new("demo.c");
        unit.globals.push(Global::Fun(FunDecl {
            name: "main".into(),
            return_type: Ty::Int,
            formals: Vec::new(),
            locals: Vec::new(),
            body: Block::new(vec![Stmt::new(StmtKind::Return(
                Some(Exp::IntLit(0)),
                Location::unknown(),
            ))]),
            loc: Location::unknown(),
        }));
        unit.ensure_global_init();
        assert_eq!(unit.global_init.as_deref(), Some("__graft_globinit"));

        let main = unit.functions().find(|f| f.name == "main").expect("main");
        match &main.body.stmts[0].kind {
            StmtKind::Instr(instrs) => {
                assert_eq!(instrs[0].callee_name(), Some("__graft_globinit"));
            }
            other => panic!("expected init call at head of main, got {other:?}"),
        }

        // Idempotent: a second call does not add another initializer.
        unit.ensure_global_init();
        let inits = unit
            .functions()
            .filter(|f| f.name == "__graft_globinit")
            .count();
        assert_eq!(inits, 1);
    }
}
