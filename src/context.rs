//! The context hierarchy: every callable/cursor (global scope, function,
//! lambda, task, object) owns one [`Context`], which in turn owns a child
//! [`SymbolTable`] and the element's argument list.
//!
//! The original's `Context::resolve<T>()` template performs a late-bound,
//! indirect lookup: a symbol holding a `ValueElement` string is followed
//! to the named declaration. C++ template member functions do not have a
//! direct Rust equivalent without trait-object gymnastics that would buy
//! nothing here, so this is split into the handful of concrete
//! `resolve_*` accessors callers actually need — an explicit, idiomatic
//! stand-in recorded in `DESIGN.md`.

use crate::ast::Identifier;
use crate::elements::{ConnectionHandle, Element};
use crate::errors::RuntimeError;
use crate::ir::symbol_table::{Ref, SymbolTable};
use crate::value::Variant;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Shared state every callable/cursor context owns.
pub struct Context {
    pub symbols: SymbolTable,
    pub args: Vec<Variant>,
    pub current_exception: Option<Ref>,
}

impl Context {
    pub fn new(parent: Option<Rc<RefCell<SymbolTable>>>) -> Self {
        Self {
            symbols: SymbolTable::new(parent),
            args: Vec::new(),
            current_exception: None,
        }
    }

    /// Follows a symbol holding a `ValueElement` string to the named
    /// connection, e.g. `CONN c2(...) USES c1;` or a task argument that
    /// forwards a connection name. Returns `NotDeclared` if the indirect
    /// name (or the symbol itself) is missing.
    pub fn resolve_connection(
        &self,
        name: &Identifier,
    ) -> Result<Rc<RefCell<ConnectionHandle>>, RuntimeError> {
        match self.symbols.find(name) {
            Some(r) => r
                .with(|e| match e {
                    Element::Connection(c) => Some(c.clone()),
                    _ => None,
                })
                .flatten()
                .ok_or_else(|| RuntimeError::not_declared(name.to_string())),
            None => Err(RuntimeError::not_declared(name.to_string())),
        }
    }

    pub fn find(&self, name: &Identifier) -> Option<Ref> {
        self.symbols.find(name)
    }

    pub fn bind_args(&mut self, names: &[Identifier], values: Vec<Variant>) -> Result<(), RuntimeError> {
        if names.len() != values.len() {
            return Err(RuntimeError::internal(format!(
                "argument count mismatch: expected {}, got {}",
                names.len(),
                values.len()
            )));
        }
        for (name, value) in names.iter().zip(values.iter()) {
            self.symbols.add(name.clone(), Element::Value(value.clone()));
        }
        self.args = values;
        Ok(())
    }
}

/// The root context: global variables, registered connections, and the
/// mutable global key-value map the `sys`/embedder surface can read and
/// write. Not thread-safe, matching the single-threaded cooperative model.
///
/// Its symbol table is kept behind an `Rc<RefCell<_>>` (unlike every other
/// context's) because it is the lexical parent every top-level function
/// and task context resolves against.
pub struct GlobalContext {
    pub symbols: Rc<RefCell<SymbolTable>>,
    pub args: Vec<Variant>,
    pub current_exception: Option<Ref>,
    pub connections: HashMap<Identifier, Rc<RefCell<ConnectionHandle>>>,
    pub globals: HashMap<String, Variant>,
}

impl GlobalContext {
    pub fn new() -> Self {
        Self {
            symbols: Rc::new(RefCell::new(SymbolTable::new(None))),
            args: Vec::new(),
            current_exception: None,
            connections: HashMap::new(),
            globals: HashMap::new(),
        }
    }

    /// A new child context (for a top-level function or task) whose
    /// lookups fall back to the global symbol table.
    pub fn child_context(&self) -> Context {
        Context::new(Some(self.symbols.clone()))
    }
}

impl Default for GlobalContext {
    fn default() -> Self {
        Self::new()
    }
}
