//! Scoped symbol table: a stack of name-to-[`Ref`] maps with an optional
//! lexical parent, replacing the original's pointer-owning submap list
//! with an arena-free, generation-checked handle scheme (`SPEC_FULL.md`
//! §5's redesign note).

use crate::ast::Identifier;
use crate::elements::Element;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

struct Slot {
    generation: u64,
    value: Option<Element>,
}

/// A non-owning handle to an [`Element`] living in some [`SymbolTable`]
/// scope. Cloning is cheap (an `Rc` bump). Dereferencing after the owning
/// scope was popped, or after an explicit [`Ref::release`], returns `None`
/// instead of dangling.
#[derive(Clone)]
pub struct Ref {
    slot: Rc<RefCell<Slot>>,
    generation: u64,
}

impl Ref {
    fn new(value: Element) -> Self {
        let slot = Rc::new(RefCell::new(Slot {
            generation: 0,
            value: Some(value),
        }));
        Ref { slot, generation: 0 }
    }

    pub fn is_alive(&self) -> bool {
        let s = self.slot.borrow();
        s.generation == self.generation && s.value.is_some()
    }

    pub fn with<R>(&self, f: impl FnOnce(&Element) -> R) -> Option<R> {
        let s = self.slot.borrow();
        if s.generation != self.generation {
            return None;
        }
        s.value.as_ref().map(f)
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut Element) -> R) -> Option<R> {
        let mut s = self.slot.borrow_mut();
        if s.generation != self.generation {
            return None;
        }
        s.value.as_mut().map(f)
    }

    /// Invalidates this handle (and every clone of it) immediately,
    /// regardless of whether the owning scope is still on the stack. Used
    /// by the scoped exception-release guard to drop a caught exception's
    /// payload as soon as its handler exits.
    pub fn release(&self) {
        let mut s = self.slot.borrow_mut();
        s.value = None;
        s.generation = s.generation.wrapping_add(1);
    }
}

impl std::fmt::Debug for Ref {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ref(alive={})", self.is_alive())
    }
}

/// One level of the symbol-table stack, introduced by `create_sub` and
/// removed by `delete_sub` in LIFO order.
#[derive(Default)]
pub struct SubSymbols {
    names: HashMap<Identifier, Ref>,
}

impl SubSymbols {
    fn release_all(&mut self) {
        for r in self.names.values() {
            r.release();
        }
        self.names.clear();
    }
}

/// A stack of [`SubSymbols`] scopes plus an optional lexical parent table
/// consulted when a lookup misses every local scope (used by task/object
/// contexts to fall back to the enclosing function, and by the function to
/// fall back to the global context).
pub struct SymbolTable {
    stack: Vec<SubSymbols>,
    parent: Option<Rc<RefCell<SymbolTable>>>,
}

impl SymbolTable {
    pub fn new(parent: Option<Rc<RefCell<SymbolTable>>>) -> Self {
        Self {
            stack: vec![SubSymbols::default()],
            parent,
        }
    }

    pub fn create_sub(&mut self) {
        self.stack.push(SubSymbols::default());
    }

    pub fn delete_sub(&mut self) {
        if self.stack.len() > 1 {
            if let Some(mut sub) = self.stack.pop() {
                sub.release_all();
            }
        }
    }

    /// Adds `name` to the innermost scope, shadowing any outer binding of
    /// the same name, and returns a handle to it.
    pub fn add(&mut self, name: Identifier, value: Element) -> Ref {
        let r = Ref::new(value);
        self.stack
            .last_mut()
            .expect("symbol table always has at least one scope")
            .names
            .insert(name, r.clone());
        r
    }

    /// Looks up `name`, walking scopes newest-first, then the lexical
    /// parent if present.
    pub fn find(&self, name: &Identifier) -> Option<Ref> {
        for scope in self.stack.iter().rev() {
            if let Some(r) = scope.names.get(name) {
                return Some(r.clone());
            }
        }
        self.parent.as_ref().and_then(|p| p.borrow().find(name))
    }

    /// True if `name` is bound in the innermost scope only (used to reject
    /// redeclaration within the same block without shadowing an outer
    /// name, matching `NotDeclared`/duplicate-declaration checks).
    pub fn is_declared_locally(&self, name: &Identifier) -> bool {
        self.stack
            .last()
            .map(|s| s.names.contains_key(name))
            .unwrap_or(false)
    }

    /// Snapshots every currently-visible binding (innermost shadow wins)
    /// as handle clones, used to seed a lambda's own symbol table so it
    /// closes over its defining scope by reference rather than by dynamic
    /// parent lookup.
    pub fn clone_symbols(&self) -> SubSymbols {
        let mut merged = HashMap::new();
        for scope in self.stack.iter() {
            for (name, r) in scope.names.iter() {
                merged.insert(name.clone(), r.clone());
            }
        }
        if let Some(parent) = &self.parent {
            for (name, r) in parent.borrow().clone_symbols().names {
                merged.entry(name).or_insert(r);
            }
        }
        SubSymbols { names: merged }
    }

    /// Replaces the table's contents with a previously captured closure
    /// snapshot (used when constructing a `Lambdafunction`'s own table).
    pub fn seed_with(&mut self, sub: SubSymbols) {
        self.stack = vec![sub];
    }

    /// Drops every scope but the base one, releasing their bindings; used
    /// when a task or object is re-run via `reset()`.
    pub fn reset(&mut self) {
        while self.stack.len() > 1 {
            self.delete_sub();
        }
        if let Some(base) = self.stack.first_mut() {
            base.release_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::Element;

    fn ident(s: &str) -> Identifier {
        Identifier::new(s)
    }

    #[test]
    fn add_and_find_in_same_scope() {
        let mut st = SymbolTable::new(None);
        st.add(ident("x"), Element::int(1));
        assert!(st.find(&ident("x")).is_some());
        assert!(st.find(&ident("y")).is_none());
    }

    #[test]
    fn shadowing_in_nested_scope() {
        let mut st = SymbolTable::new(None);
        st.add(ident("x"), Element::int(1));
        st.create_sub();
        st.add(ident("x"), Element::int(2));
        let found = st.find(&ident("x")).unwrap();
        assert_eq!(found.with(|e| e.as_int()).flatten(), Some(2));
        st.delete_sub();
        let found = st.find(&ident("x")).unwrap();
        assert_eq!(found.with(|e| e.as_int()).flatten(), Some(1));
    }

    #[test]
    fn delete_sub_releases_inner_bindings() {
        let mut st = SymbolTable::new(None);
        st.create_sub();
        let r = st.add(ident("y"), Element::int(7));
        st.delete_sub();
        assert!(!r.is_alive());
    }

    #[test]
    fn parent_lookup_falls_back() {
        let parent = Rc::new(RefCell::new(SymbolTable::new(None)));
        parent.borrow_mut().add(ident("g"), Element::int(42));
        let child = SymbolTable::new(Some(parent));
        assert!(child.find(&ident("g")).is_some());
    }
}
