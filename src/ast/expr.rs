//! Expression nodes and the column-selector shapes used by `$col`/`%col`
//! references and column-assignment statements.

use super::{Identifier, SourceInfo};
use std::fmt;

/// A literal scalar as written in script text.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Numeric { digits: String, scale: u32 },
    Str(String),
    Bool(bool),
    Null,
}

/// How a [`ColumnRef`] selects a column: by 1-based ordinal or by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnSelector {
    Number(u32),
    Name(Identifier),
}

impl fmt::Display for ColumnSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnSelector::Number(n) => write!(f, "{n}"),
            ColumnSelector::Name(n) => write!(f, "{n}"),
        }
    }
}

/// Which side of an object pair a column reference addresses: the
/// "current row" (`$col`) or the "result row" (`%col`) produced by the
/// last `execute()` (e.g. an INSERT's generated key).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Value,
    Result,
}

/// `$col`, `$3`, `%col`, `%3` — a reference to a column of the object
/// context's main or result object.
#[derive(Debug, Clone)]
pub struct ColumnRef {
    pub kind: ColumnKind,
    pub selector: ColumnSelector,
    pub info: SourceInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// An expression. Evaluation rules are in [`crate::eval`].
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Literal, SourceInfo),
    Id(Identifier, SourceInfo),
    Column(ColumnRef),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        info: SourceInfo,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        info: SourceInfo,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
        info: SourceInfo,
    },
    FuncCall {
        name: Identifier,
        args: Vec<Expr>,
        info: SourceInfo,
    },
    /// A column-assignment inside a task phase: `$col := expr`.
    ColumnAssign {
        target: ColumnRef,
        value: Box<Expr>,
        info: SourceInfo,
    },
    Lambda {
        args: Vec<Identifier>,
        body: Box<Expr>,
        info: SourceInfo,
    },
}

impl Expr {
    pub fn source_info(&self) -> &SourceInfo {
        match self {
            Expr::Literal(_, info) => info,
            Expr::Id(_, info) => info,
            Expr::Column(c) => &c.info,
            Expr::Binary { info, .. } => info,
            Expr::Unary { info, .. } => info,
            Expr::Assign { info, .. } => info,
            Expr::FuncCall { info, .. } => info,
            Expr::ColumnAssign { info, .. } => info,
            Expr::Lambda { info, .. } => info,
        }
    }

    /// True for the node shapes the column-collection visitors
    /// (`ColumnVisitor`/`ResColumnVisitor` in the original) must split into
    /// left-hand (write) vs. right-hand (read) references.
    pub fn is_column_assign(&self) -> bool {
        matches!(self, Expr::ColumnAssign { .. })
    }
}
