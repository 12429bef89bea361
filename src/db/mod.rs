//! The external database client interface.
//!
//! `Environment`/`Connection`/`Statement`/`Resultset` mirror the
//! collaborator traits a real driver (ODBC, libpq, sqlite3, ...) would
//! implement; this crate only consumes them. [`sqlite`] provides one
//! concrete, fully-working backend over `rusqlite` so the interpreter is
//! exercisable end-to-end without a network database.

pub mod sqlite;

use crate::errors::RuntimeError;
use crate::value::Variant;
use std::fmt;

/// A database connection's current transaction/savepoint control surface,
/// driven by the `trx.*` builtins.
pub trait Connection: fmt::Debug {
    fn prepare(&mut self, sql: &str) -> Result<Box<dyn Statement + '_>, RuntimeError>;
    fn start_transaction(&mut self) -> Result<(), RuntimeError>;
    fn commit(&mut self) -> Result<(), RuntimeError>;
    fn rollback(&mut self, savepoint: Option<&str>) -> Result<(), RuntimeError>;
    fn savepoint(&mut self, name: &str) -> Result<(), RuntimeError>;
    /// Value produced by `seq.next(seq_name)`, or a driver error if the
    /// backend has no sequence/autoincrement concept for that name.
    fn next_sequence_value(&mut self, sequence: &str) -> Result<Variant, RuntimeError>;
}

/// A prepared statement, bound positionally, executed 0+ times.
pub trait Statement {
    fn bind(&mut self, index: usize, value: &Variant) -> Result<(), RuntimeError>;
    fn execute(&mut self) -> Result<Box<dyn Resultset + '_>, RuntimeError>;
}

/// The cursor produced by executing a [`Statement`].
pub trait Resultset {
    fn column_count(&self) -> usize;
    fn column_name(&self, index: usize) -> Option<&str>;
    fn first(&mut self) -> Result<bool, RuntimeError>;
    fn next(&mut self) -> Result<bool, RuntimeError>;
    fn eof(&self) -> bool;
    fn get(&self, index: usize) -> Result<Variant, RuntimeError>;
    fn get_by_name(&self, name: &str) -> Result<Variant, RuntimeError>;
    /// Row identifier of the last INSERT, used to emulate `RETURNING` on
    /// backends (like SQLite) that lack it natively.
    fn last_insert_id(&self) -> Option<i64> {
        None
    }
}

/// Named, registered database environments an [`crate::engine::Engine`]
/// dispenses [`Connection`]s from.
pub trait Environment: fmt::Debug {
    fn connect(&self, dsn: &str, options: &[(String, String)]) -> Result<Box<dyn Connection>, RuntimeError>;
}
