//! `argon-dts`: the AST-walking interpreter core for the Argon data
//! transformation script (DTS) language.
//!
//! This crate does not parse source text. It defines the [`ast`] node
//! shapes a lexer/parser would build, and implements everything downstream
//! of that tree: type and symbol resolution ([`ir`]), the value model
//! ([`value`], [`elements`]), task execution ([`tasks`], [`objects`]), the
//! expression/statement evaluator ([`eval`]), the built-in function
//! catalogue ([`functions`]), the external database client boundary
//! ([`db`]), and the embedder-facing [`engine::Engine`].
//!
//! ```ignore
//! let mut engine = argon_dts::engine::Engine::new(Default::default());
//! engine.add_connection(Box::new(argon_dts::db::sqlite::SqliteEnvironment));
//! engine.load_ast(program)?;
//! let exit_code = engine.exec();
//! ```

pub mod ast;
pub mod context;
pub mod control;
pub mod db;
pub mod elements;
pub mod engine;
pub mod errors;
pub mod eval;
pub mod functions;
pub mod ir;
pub mod objects;
pub mod processor;
pub mod semantic;
pub mod tasks;
pub mod value;

pub use engine::{Engine, EngineOptions};
pub use errors::{CompileError, RuntimeError};
pub use value::Variant;
