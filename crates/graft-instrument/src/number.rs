//! Statement numbering.
//!
//! Walks a translation unit in source order, assigns the next identifier to
//! every traceable statement, and installs a deep, id-stripped copy of the
//! statement's kind in the statement map. Statements that are not traceable
//! lose any reserved-prefix labels and keep `sid == 0`.
//!
//! Numbering happens before instrumentation so that emitted trace records
//! reference identifiers actually present in the map, and the copies are
//! stripped of identifiers so later passes can never observe stale ones.

use graft_ast::{Location, Stmt, StmtKind, TranslationUnit, VisitAction, Visitor};
use indexmap::IndexMap;

use crate::RESERVED_PREFIX;

/// The monotonically increasing statement-identifier counter.
///
/// Identifiers are dense, start at 1, and are never reused within a
/// numbering context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Numbering {
    next: u32,
}

impl Numbering {
    pub fn new() -> Self {
        Numbering { next: 1 }
    }

    pub fn allocate(&mut self) -> u32 {
        let sid = self.next;
        self.next += 1;
        sid
    }

    /// The next identifier that would be allocated.
    pub fn next_sid(&self) -> u32 {
        self.next
    }
}

impl Default for Numbering {
    fn default() -> Self {
        Numbering::new()
    }
}

/// `sid -> id-stripped statement kind`, frozen at the end of numbering.
pub type StatementMap = IndexMap<u32, StmtKind>;

/// `sid -> source location`, produced only on request.
pub type LocationMap = IndexMap<u32, Location>;

struct NumberPass<'a> {
    numbering: &'a mut Numbering,
    map: &'a mut StatementMap,
    locs: Option<&'a mut LocationMap>,
}

impl Visitor for NumberPass<'_> {
    fn visit_stmt(&mut self, stmt: &Stmt) -> VisitAction<Vec<Stmt>> {
        if stmt.is_traceable(RESERVED_PREFIX) {
            let sid = self.numbering.allocate();
            let mut copy = stmt.kind.clone();
            copy.strip_ids();
            self.map.insert(sid, copy);
            if let Some(locs) = self.locs.as_deref_mut() {
                locs.insert(sid, stmt.loc());
            }
            let mut replacement = stmt.clone();
            replacement.sid = sid;
            VisitAction::DescendThen(vec![replacement], Box::new(|stmts| stmts))
        } else if stmt.has_reserved_label(RESERVED_PREFIX) || stmt.sid != 0 {
            let mut replacement = stmt.clone();
            replacement.strip_reserved_labels(RESERVED_PREFIX);
            replacement.sid = 0;
            VisitAction::DescendThen(vec![replacement], Box::new(|stmts| stmts))
        } else {
            VisitAction::Descend
        }
    }
}

/// Output of [`number_unit`].
pub struct Numbered {
    pub unit: TranslationUnit,
    pub map: StatementMap,
    pub locs: Option<LocationMap>,
}

/// Number every traceable statement of `unit` in traversal order.
///
/// `with_locations` additionally records each numbered statement's source
/// location for the `_loc` artifact.
pub fn number_unit(
    unit: TranslationUnit,
    numbering: &mut Numbering,
    with_locations: bool,
) -> Numbered {
    let mut map = StatementMap::new();
    let mut locs = if with_locations {
        Some(LocationMap::new())
    } else {
        None
    };
    let unit = {
        let mut pass = NumberPass {
            numbering,
            map: &mut map,
            locs: locs.as_mut(),
        };
        graft_ast::walk_unit(&mut pass, unit)
    };
    Numbered { unit, map, locs }
}
