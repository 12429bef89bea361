//! Task declarations: the four shapes (`VOID`/`FETCH`/`STORE`/`TRANSFER`)
//! and their five ordered phases.

use super::{ArgSpec, CatchClause, Expr, Identifier, SourceInfo, Stmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskShape {
    Void,
    Fetch,
    Store,
    Transfer,
}

/// A template reference naming the object (table/sql) a FETCH/STORE/
/// TRANSFER task binds as its source or destination, with the evaluated
/// template arguments forwarded to `Type::new_instance`.
#[derive(Debug, Clone)]
pub struct TemplateRef {
    pub name: Identifier,
    pub args: Vec<Expr>,
    pub info: SourceInfo,
}

/// The five ordered phases of a task body. Each is a plain statement list;
/// which phases may legally contain column references/assignments is
/// enforced per-shape in [`crate::tasks`], matching the original's
/// constructor-time assertions.
#[derive(Debug, Clone, Default)]
pub struct TaskPhases {
    pub init: Vec<Stmt>,
    pub before: Vec<Stmt>,
    pub rules: Vec<Stmt>,
    pub after: Vec<Stmt>,
    pub r#final: Vec<Stmt>,
    /// `AFTER ON SQLSTATE '...' => ...` / `AFTER ON EXCEPTION Name => ...`
    /// / catch-all clauses declared alongside the `after` phase's plain
    /// statements — the task-level handler index `spec.md` §4.5 describes
    /// (SQLSTATE map, exception-id map, one catch-all block).
    pub after_handlers: Vec<CatchClause>,
}

#[derive(Debug, Clone)]
pub struct TaskDecl {
    pub name: Identifier,
    pub shape: TaskShape,
    pub args: Vec<ArgSpec>,
    /// `STORE`/`TRANSFER` destination template.
    pub dest: Option<TemplateRef>,
    /// `FETCH`/`TRANSFER` source template.
    pub source: Option<TemplateRef>,
    pub phases: TaskPhases,
    pub info: SourceInfo,
}
