//! Registry of declared kinds: connections, tables, raw SQL templates,
//! tasks and functions. Unlike the teacher crate's `TypeTable` (which
//! infers *expression* types — out of scope here, since every DTS value is
//! a dynamically-typed [`crate::value::Variant`]), this table tracks
//! *declared* kinds so `FETCH`/`STORE`/`TRANSFER` templates and task/
//! function calls can be resolved by name at compile time.

use crate::ast::{ExceptionMatcher, FunctionDecl, Identifier, TaskDecl};
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceMode {
    /// Used for plain variable/global instantiation.
    Default,
    /// A `FETCH`/`TRANSFER` source object: cursor opened for reading.
    Read,
    /// A `STORE`/`TRANSFER` destination object: opened for INSERT.
    Insert,
}

/// A declared kind, as registered by Pass 1 of [`crate::processor::Processor::compile`].
#[derive(Debug, Clone)]
pub enum Type {
    Connection {
        name: Identifier,
    },
    Table {
        name: Identifier,
        connection: Identifier,
        table: String,
        columns: Vec<Identifier>,
    },
    Sql {
        name: Identifier,
        connection: Identifier,
        sql: String,
    },
    Task {
        decl: Rc<TaskDecl>,
    },
    Function {
        decl: Rc<FunctionDecl>,
    },
    /// A declared handleable condition (`EXCEPTION name(...)`); resolved by
    /// `throw` and by a task's `AFTER ON EXCEPTION` handlers.
    Exception {
        name: Identifier,
        matcher: ExceptionMatcher,
    },
}

impl Type {
    pub fn name(&self) -> &Identifier {
        match self {
            Type::Connection { name } => name,
            Type::Table { name, .. } => name,
            Type::Sql { name, .. } => name,
            Type::Task { decl } => &decl.name,
            Type::Function { decl } => &decl.name,
            Type::Exception { name, .. } => name,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Type::Connection { .. } => "connection",
            Type::Table { .. } => "table",
            Type::Sql { .. } => "sql",
            Type::Task { .. } => "task",
            Type::Function { .. } => "function",
            Type::Exception { .. } => "exception",
        }
    }
}

/// Flat `Identifier -> Type` registry. Declared names are looked up
/// case-insensitively via [`crate::ast::Identifier`]'s `Hash`/`Eq`.
#[derive(Default)]
pub struct TypeTable {
    types: HashMap<Identifier, Type>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, ty: Type) -> Result<(), crate::errors::RuntimeError> {
        let name = ty.name().clone();
        if self.types.contains_key(&name) {
            return Err(crate::errors::RuntimeError::internal(format!(
                "type `{name}` already declared"
            )));
        }
        self.types.insert(name, ty);
        Ok(())
    }

    pub fn find(&self, name: &Identifier) -> Option<&Type> {
        self.types.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Type> {
        self.types.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_find_is_case_insensitive() {
        let mut tt = TypeTable::new();
        tt.add(Type::Connection {
            name: Identifier::new("MyConn"),
        })
        .unwrap();
        assert!(tt.find(&Identifier::new("myconn")).is_some());
    }

    #[test]
    fn duplicate_declaration_is_rejected() {
        let mut tt = TypeTable::new();
        tt.add(Type::Connection {
            name: Identifier::new("c"),
        })
        .unwrap();
        assert!(tt
            .add(Type::Connection {
                name: Identifier::new("c"),
            })
            .is_err());
    }
}
