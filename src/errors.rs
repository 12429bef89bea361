//! Compile-time and runtime error taxonomy.
//!
//! Three classes, matching `SPEC_FULL.md` §4.12: [`CompileError`] (raised
//! during `compile()`, carries a list of diagnostics so a script can be
//! checked for more than one problem at a time), [`RuntimeError`] (raised
//! while executing, carries a captured call-stack trace), and
//! [`crate::control::Unwind`] (never an `Error`: a typed non-local jump,
//! kept out of this module entirely).

use crate::ast::{Identifier, SourceInfo};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

/// One finding from the semantic checker.
#[derive(Debug, Clone)]
pub struct DiagEntry {
    pub severity: Severity,
    pub message: String,
    pub info: SourceInfo,
}

/// Raised by [`crate::processor::Processor::compile`] when Pass 1/Pass 2
/// collect one or more errors. Warnings do not stop compilation; they ride
/// along in `diagnostics` for the embedder to surface.
#[derive(Debug, Error, Diagnostic)]
#[error("compilation failed with {} error(s)", self.error_count())]
pub struct CompileError {
    pub diagnostics: Vec<DiagEntry>,
}

impl CompileError {
    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }
}

/// One call-stack frame, captured when a [`RuntimeError`] is raised, for
/// `RuntimeError::render_trace`.
#[derive(Debug, Clone)]
pub struct FrameInfo {
    pub kind: &'static str,
    pub name: Identifier,
    pub info: SourceInfo,
}

/// A runtime failure. All specialisations carry the `SourceInfo` of the
/// node that raised them plus a snapshot of the processor's call stack at
/// that point.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("field not found: {field}")]
    FieldNotFound { field: String, trace: Vec<FrameInfo> },

    #[error("connection error ({dsn}): {message}")]
    ConnectionErr {
        dsn: String,
        message: String,
        trace: Vec<FrameInfo>,
    },

    #[error("not declared: {name}")]
    NotDeclared { name: String, trace: Vec<FrameInfo> },

    #[error("internal error: {message}")]
    InternalError { message: String, trace: Vec<FrameInfo> },
}

impl RuntimeError {
    pub fn field_not_found(field: impl Into<String>) -> Self {
        RuntimeError::FieldNotFound {
            field: field.into(),
            trace: Vec::new(),
        }
    }

    pub fn connection(dsn: impl Into<String>, message: impl Into<String>) -> Self {
        RuntimeError::ConnectionErr {
            dsn: dsn.into(),
            message: message.into(),
            trace: Vec::new(),
        }
    }

    pub fn not_declared(name: impl Into<String>) -> Self {
        RuntimeError::NotDeclared {
            name: name.into(),
            trace: Vec::new(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        RuntimeError::InternalError {
            message: message.into(),
            trace: Vec::new(),
        }
    }

    pub fn trace_mut(&mut self) -> &mut Vec<FrameInfo> {
        match self {
            RuntimeError::FieldNotFound { trace, .. }
            | RuntimeError::ConnectionErr { trace, .. }
            | RuntimeError::NotDeclared { trace, .. }
            | RuntimeError::InternalError { trace, .. } => trace,
        }
    }

    pub fn trace(&self) -> &Vec<FrameInfo> {
        match self {
            RuntimeError::FieldNotFound { trace, .. }
            | RuntimeError::ConnectionErr { trace, .. }
            | RuntimeError::NotDeclared { trace, .. }
            | RuntimeError::InternalError { trace, .. } => trace,
        }
    }

    /// `with_trace` attaches the processor's call stack, innermost frame
    /// first, the moment the error crosses a call boundary that still has
    /// stack information (mirrors `LastError::str`'s one-line-per-frame
    /// rendering in the original processor).
    pub fn with_trace(mut self, frames: Vec<FrameInfo>) -> Self {
        *self.trace_mut() = frames;
        self
    }

    pub fn render_trace(&self) -> String {
        let frames = match self {
            RuntimeError::FieldNotFound { trace, .. }
            | RuntimeError::ConnectionErr { trace, .. }
            | RuntimeError::NotDeclared { trace, .. }
            | RuntimeError::InternalError { trace, .. } => trace,
        };
        frames
            .iter()
            .map(|f| format!("{} {} ({})", f.kind, f.name, f.info))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
