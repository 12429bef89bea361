//! The embedder-facing API: `Engine` wraps a [`Processor`] with the
//! connection-registration/logger-registration/load/exec surface described
//! in `SPEC_FULL.md` §4.10/§6.

use crate::ast::{Identifier, Program};
use crate::control::Unwind;
use crate::db::Environment;
use crate::errors::CompileError;
use crate::processor::{Logger, Processor};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_COMPILE_ERROR: i32 = 1;
pub const EXIT_ASSERT: i32 = 2;

/// Locale/numeric-formatting and NULL-arithmetic knobs. The interpreter has
/// no file-based configuration of its own — everything else is declared by
/// the script — so this is the entire tunable surface an embedder sets up
/// front, mirroring the shape of the teacher crate's validator config.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// BCP-47-ish locale tag used by `numeric.format`/`date.format` when no
    /// explicit format string is given.
    pub locale: String,
    /// When true, `+`/`-`/`*`/`/` raise `RuntimeError::InternalError` on a
    /// NULL operand instead of propagating NULL; off by default since NULL
    /// propagation is the documented, spec-recommended behaviour.
    pub strict_null_arithmetic: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            locale: "en-US".to_string(),
            strict_null_arithmetic: false,
        }
    }
}

/// The embedder's entry point: register connections and a logger, load a
/// program, run it.
pub struct Engine {
    processor: Processor,
    options: EngineOptions,
    program: Option<Program>,
}

impl Engine {
    pub fn new(options: EngineOptions) -> Self {
        let mut processor = Processor::new();
        processor.locale = options.locale.clone();
        Self {
            processor,
            options,
            program: None,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Registers the database backend connections are opened through. Must
    /// be called before `load_ast` if the program declares any `CONN`.
    pub fn add_connection(&mut self, environment: Box<dyn Environment>) {
        self.processor.set_environment(environment);
    }

    /// Registers the callback `LOG` statements are routed through. Without
    /// one, log output goes to `tracing::info!(target = "argon::script")`.
    pub fn register_logger(&mut self, logger: Logger) {
        self.processor.set_logger(logger);
    }

    /// Compiles `program` (Pass 1/Pass 2 plus per-task invariant checks).
    /// There is no `load(path)`: the lexer/parser that would produce an
    /// `ast::Program` from script text is an external collaborator.
    pub fn load_ast(&mut self, program: Program) -> Result<(), CompileError> {
        self.processor.compile(&program)?;
        self.program = Some(program);
        Ok(())
    }

    /// Runs `main` to completion, translating its outcome into the exit
    /// code described in `spec.md` §6: `0` success, `2` on an unhandled
    /// assertion failure, otherwise the explicit argument of `sys.terminate`.
    /// A `load_ast` `CompileError` is the caller's responsibility to map to
    /// `1` (`EXIT_COMPILE_ERROR`); `exec` only runs already-compiled programs.
    pub fn exec(&mut self) -> i32 {
        match self.processor.run() {
            Ok(()) => EXIT_SUCCESS,
            Err(Unwind::Terminate(code)) => code,
            Err(Unwind::Assert(message, info)) => {
                tracing::error!(target: "argon::proc", %message, at = %info, "assertion failed");
                EXIT_ASSERT
            }
            Err(Unwind::Error(e)) => {
                tracing::error!(target: "argon::proc", error = %e, trace = %e.render_trace(), "unhandled runtime error");
                EXIT_ASSERT
            }
            Err(other) => {
                tracing::error!(target: "argon::proc", unwind = ?other, "unexpected top-level control flow");
                EXIT_ASSERT
            }
        }
    }

    /// Calls a declared task by name with the given arguments, bypassing
    /// `main` — used by tests that exercise one task in isolation.
    pub fn call_task(&mut self, name: &str, args: Vec<crate::value::Variant>) -> crate::control::ControlResult<crate::value::Variant> {
        self.processor.call_task_by_name(&Identifier::new(name), args)
    }
}
