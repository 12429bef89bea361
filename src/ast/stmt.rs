//! Statement nodes shared by task phases and function/lambda bodies.

use super::{Expr, Identifier, SourceInfo, VarDecl};

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr(Expr, SourceInfo),
    Var(VarDecl),
    Compound(Vec<Stmt>, SourceInfo),
    IfElse {
        cond: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Vec<Stmt>,
        info: SourceInfo,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
        info: SourceInfo,
    },
    Repeat {
        body: Vec<Stmt>,
        cond: Expr,
        info: SourceInfo,
    },
    For {
        var: Identifier,
        iterable: Expr,
        body: Vec<Stmt>,
        info: SourceInfo,
    },
    Continue(SourceInfo),
    Break(SourceInfo),
    Return(Option<Expr>, SourceInfo),
    Assert(Expr, Option<String>, SourceInfo),
    /// `LOG expr;` — routed through the embedder's registered logger.
    Log(Expr, SourceInfo),
    /// Invokes another declared task by name with evaluated arguments.
    TaskExec {
        name: Identifier,
        args: Vec<Expr>,
        info: SourceInfo,
    },
    /// Executes a raw SQL statement against a named connection, discarding
    /// or binding its resultset per `sql.exec`/`sql.scalar` semantics.
    SqlExec {
        connection: Identifier,
        sql: Expr,
        binds: Vec<Expr>,
        info: SourceInfo,
    },
    /// A `TRY { ... } CATCH (matcher) { ... }` style block-scoped exception
    /// handler.
    TryCatch {
        body: Vec<Stmt>,
        handlers: Vec<CatchClause>,
        info: SourceInfo,
    },
    Rethrow(SourceInfo),
    /// `throw Name(expr);` — raises the declared `EXCEPTION Name`, carrying
    /// `expr`'s value as the custom exception's message. Unwinds as
    /// `Unwind::Custom` to the nearest matching handler: a block-scoped
    /// `TryCatch` if one is active, otherwise the enclosing task's `AFTER
    /// ON EXCEPTION`/`ON SQLSTATE`/catch-all clauses.
    Throw {
        name: Identifier,
        arg: Option<Expr>,
        info: SourceInfo,
    },
}

#[derive(Debug, Clone)]
pub struct CatchClause {
    pub matcher: CatchMatcher,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum CatchMatcher {
    SqlState(String),
    ExceptionName(Identifier),
    Any,
}

impl Stmt {
    pub fn source_info(&self) -> &SourceInfo {
        match self {
            Stmt::Expr(_, info) => info,
            Stmt::Var(d) => &d.info,
            Stmt::Compound(_, info) => info,
            Stmt::IfElse { info, .. } => info,
            Stmt::While { info, .. } => info,
            Stmt::Repeat { info, .. } => info,
            Stmt::For { info, .. } => info,
            Stmt::Continue(info) => info,
            Stmt::Break(info) => info,
            Stmt::Return(_, info) => info,
            Stmt::Assert(_, _, info) => info,
            Stmt::Log(_, info) => info,
            Stmt::TaskExec { info, .. } => info,
            Stmt::SqlExec { info, .. } => info,
            Stmt::TryCatch { info, .. } => info,
            Stmt::Rethrow(info) => info,
            Stmt::Throw { info, .. } => info,
        }
    }

    /// Every `ColumnAssign` expression reachable directly at this
    /// statement's top level (not descending into nested task bodies);
    /// used by the task-shape invariant checks in [`crate::tasks`].
    pub fn column_assigns<'a>(&'a self, out: &mut Vec<&'a Expr>) {
        match self {
            Stmt::Expr(e, _) => collect_column_assigns(e, out),
            Stmt::Compound(body, _) => body.iter().for_each(|s| s.column_assigns(out)),
            Stmt::IfElse { then_branch, else_branch, .. } => {
                then_branch.iter().for_each(|s| s.column_assigns(out));
                else_branch.iter().for_each(|s| s.column_assigns(out));
            }
            Stmt::While { body, .. } | Stmt::Repeat { body, .. } | Stmt::For { body, .. } => {
                body.iter().for_each(|s| s.column_assigns(out))
            }
            Stmt::TryCatch { body, handlers, .. } => {
                body.iter().for_each(|s| s.column_assigns(out));
                handlers
                    .iter()
                    .for_each(|h| h.body.iter().for_each(|s| s.column_assigns(out)));
            }
            _ => {}
        }
    }
}

fn collect_column_assigns<'a>(expr: &'a Expr, out: &mut Vec<&'a Expr>) {
    if expr.is_column_assign() {
        out.push(expr);
    }
    if let Expr::Binary { lhs, rhs, .. } = expr {
        collect_column_assigns(lhs, out);
        collect_column_assigns(rhs, out);
    }
}
