//! Top-level declaration nodes: connections, variables, functions, types,
//! exceptions.

use super::{Expr, Identifier, SourceInfo, Stmt};

/// `CONN name(dsn [, key = value]*);`
#[derive(Debug, Clone)]
pub struct ConnDecl {
    pub name: Identifier,
    pub dsn: Expr,
    pub options: Vec<KeyValue>,
    pub info: SourceInfo,
}

/// A `key = value` pair used in declaration option lists.
#[derive(Debug, Clone)]
pub struct KeyValue {
    pub key: Identifier,
    pub value: Expr,
}

/// `VAR name [= init];` at global or local scope.
#[derive(Debug, Clone)]
pub struct VarDecl {
    pub name: Identifier,
    pub init: Option<Expr>,
    pub info: SourceInfo,
}

/// A formal parameter of a task, object or function.
#[derive(Debug, Clone)]
pub struct ArgSpec {
    pub name: Identifier,
    pub info: SourceInfo,
}

/// A user-declared function (eager) or lambda body shape.
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: Identifier,
    pub args: Vec<ArgSpec>,
    pub body: Vec<Stmt>,
    pub info: SourceInfo,
}

/// A custom type declared with `TYPE name AS kind(...)`.
#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub name: Identifier,
    pub kind: TypeKind,
    pub info: SourceInfo,
}

/// The declared shape of a [`TypeDecl`], matching the five runtime
/// `Type` kinds the type table resolves against.
#[derive(Debug, Clone)]
pub enum TypeKind {
    Connection,
    Table { connection: Identifier, table: String, columns: Vec<Identifier> },
    Sql { connection: Identifier, sql: String },
    Task,
    Function,
}

/// `EXCEPTION name(sqlstate | id);` — names a handleable condition.
#[derive(Debug, Clone)]
pub struct ExceptionDecl {
    pub name: Identifier,
    pub matcher: ExceptionMatcher,
    pub info: SourceInfo,
}

#[derive(Debug, Clone)]
pub enum ExceptionMatcher {
    SqlState(String),
    ExceptionId(String),
}
