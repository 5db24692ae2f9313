//! Runtime expression tree.
//!
//! Produced by lowering the parser's AST: names are interned symbols and
//! source spans are [`PosIdx`] handles. Shared with thunks through `Rc`.

use crate::position::PosIdx;
use crate::symbol::Symbol;
use std::rc::Rc;

#[derive(Debug)]
pub struct Expr {
    pub pos: PosIdx,
    pub kind: ExprKind,
}

#[derive(Debug)]
pub enum ExprKind {
    Int(i64),
    Float(f64),
    String(Rc<str>),
    Var(Symbol),
    Select {
        base: Rc<Expr>,
        path: Vec<AttrName>,
    },
    Attrs(Vec<AttrDef>),
    List(Vec<Rc<Expr>>),
    /// Recursive: every binding sees all the others.
    Let {
        bindings: Vec<AttrDef>,
        body: Rc<Expr>,
    },
    Apply {
        function: Rc<Expr>,
        argument: Rc<Expr>,
    },
    BinOp {
        op: BinOp,
        lhs: Rc<Expr>,
        rhs: Rc<Expr>,
    },
    /// `"a${b}c"`: every part must evaluate to a string.
    Interpolate(Vec<Rc<Expr>>),
}

#[derive(Debug, Clone, Copy)]
pub struct AttrName {
    pub name: Symbol,
    pub pos: PosIdx,
}

#[derive(Debug)]
pub struct AttrDef {
    pub name: Symbol,
    pub pos: PosIdx,
    pub value: Rc<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    /// `++`
    Concat,
    /// `//`
    Update,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Concat => "++",
            BinOp::Update => "//",
        }
    }
}

impl Expr {
    pub fn new(pos: PosIdx, kind: ExprKind) -> Rc<Self> {
        Rc::new(Self { pos, kind })
    }

    /// Literals evaluate to themselves and never need a thunk.
    pub fn is_constant(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Int(_) | ExprKind::Float(_) | ExprKind::String(_)
        )
    }
}
