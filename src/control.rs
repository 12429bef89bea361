//! Control flow modeled as typed unwinding, plus the scope guards that
//! guarantee cleanup on every exit path including an unwind.
//!
//! Rust's `Result`/`?` already gives us the "typed sum, not a panic"
//! property the original's C++ exception hierarchy was emulating by hand;
//! [`Unwind`] is kept entirely separate from [`crate::errors::RuntimeError`]
//! so a `?` can never accidentally turn a `break` into an error or vice
//! versa (`SPEC_FULL.md` §4.12).

use crate::ast::{Identifier, SourceInfo};
use crate::errors::RuntimeError;
use crate::ir::symbol_table::{Ref, SymbolTable};
use crate::value::Variant;

/// The payload carried by a caught exception while its handler runs.
#[derive(Debug, Clone)]
pub struct ExceptionPayload {
    pub sqlstate: Option<String>,
    pub exception_id: Option<String>,
    pub message: String,
    pub info: SourceInfo,
}

/// A non-local jump raised while walking statements or expressions.
/// Never implements [`std::error::Error`] — see module docs.
#[derive(Debug, Clone)]
pub enum Unwind {
    Return(Variant),
    Continue,
    Break,
    /// Internal signal used by `IfElse`/`While`/`Repeat` condition
    /// evaluation failures that must still unwind as a runtime error; kept
    /// as a distinct variant so callers can tell "the condition itself
    /// misbehaved" from "the body returned/broke".
    Condition(RuntimeError),
    /// A `RETHROW` outside any active handler becomes a `RuntimeError`
    /// per the Open Question decision in `SPEC_FULL.md` §9; inside a
    /// handler it re-raises `payload` to the next enclosing handler.
    Rethrow(ExceptionPayload),
    Terminate(i32),
    Assert(String, SourceInfo),
    Custom(ExceptionPayload),
    Error(RuntimeError),
}

impl From<RuntimeError> for Unwind {
    fn from(e: RuntimeError) -> Self {
        Unwind::Error(e)
    }
}

impl ExceptionPayload {
    /// Converts a raised [`RuntimeError`] into the payload a `TRY`/`CATCH`
    /// handler matches against. Only [`RuntimeError::ConnectionErr`]
    /// carries anything resembling a SQLSTATE; everything else is only
    /// reachable through a `CatchMatcher::Any` handler.
    pub fn from_runtime_error(err: &RuntimeError) -> Self {
        let sqlstate = match err {
            RuntimeError::ConnectionErr { message, .. } => Some(message.clone()),
            _ => None,
        };
        Self {
            sqlstate,
            exception_id: None,
            message: err.to_string(),
            info: err.trace().last().map(|f| f.info.clone()).unwrap_or_default(),
        }
    }
}

pub type ControlResult<T> = Result<T, Unwind>;

/// Pushes a call-stack frame on construction, pops it on drop — including
/// on an unwind through `?`, since `Drop::drop` always runs.
pub struct ScopedStackPush<'a> {
    stack: &'a mut Vec<crate::errors::FrameInfo>,
}

impl<'a> ScopedStackPush<'a> {
    pub fn new(stack: &'a mut Vec<crate::errors::FrameInfo>, kind: &'static str, name: Identifier, info: SourceInfo) -> Self {
        stack.push(crate::errors::FrameInfo { kind, name, info });
        Self { stack }
    }
}

impl<'a> Drop for ScopedStackPush<'a> {
    fn drop(&mut self) {
        self.stack.pop();
    }
}

/// Pushes a new symbol-table scope on construction, pops (and releases)
/// it on drop.
pub struct ScopedSubSymbols<'a> {
    table: &'a mut SymbolTable,
}

impl<'a> ScopedSubSymbols<'a> {
    pub fn new(table: &'a mut SymbolTable) -> Self {
        table.create_sub();
        Self { table }
    }

    pub fn table(&mut self) -> &mut SymbolTable {
        self.table
    }
}

impl<'a> Drop for ScopedSubSymbols<'a> {
    fn drop(&mut self) {
        self.table.delete_sub();
    }
}

/// Combines [`ScopedStackPush`] and [`ScopedSubSymbols`]: the unit a
/// function/task/lambda call pushes on entry.
pub struct ScopedStackFrame<'a> {
    _stack: ScopedStackPush<'a>,
    pub symbols: ScopedSubSymbols<'a>,
}

impl<'a> ScopedStackFrame<'a> {
    pub fn new(
        call_stack: &'a mut Vec<crate::errors::FrameInfo>,
        table: &'a mut SymbolTable,
        kind: &'static str,
        name: Identifier,
        info: SourceInfo,
    ) -> Self {
        Self {
            _stack: ScopedStackPush::new(call_stack, kind, name, info),
            symbols: ScopedSubSymbols::new(table),
        }
    }
}

/// Releases an exception [`Ref`] the instant the guard drops, so a caught
/// exception's payload does not outlive its handler block even if the
/// handler stashed a clone of the `Ref` somewhere.
pub struct ScopedReleaseException {
    exception_ref: Ref,
}

impl ScopedReleaseException {
    pub fn new(exception_ref: Ref) -> Self {
        Self { exception_ref }
    }
}

impl Drop for ScopedReleaseException {
    fn drop(&mut self) {
        self.exception_ref.release();
    }
}
