//! Runtime cursors ([`Object`]): table/sql readers and writers, plus the
//! three generator/transform kinds (`GenRange`, `Expand`, `Compact`).
//!
//! Every kind shares the same lifecycle: construct → [`Object::run`] (bind
//! call args, resolve its connection) → [`Object::execute`] (0 or more
//! times) → [`Object::first`]/[`Object::next`]/[`Object::eof`] iteration.

use crate::ast::{ColumnSelector, Identifier};
use crate::context::Context;
use crate::elements::ConnectionHandle;
use crate::errors::RuntimeError;
use crate::ir::type_table::InstanceMode;
use crate::value::Variant;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// The five concrete object kinds.
pub enum ObjectKind {
    /// A declared `TABLE` template: `SELECT`/`INSERT` against one named
    /// table, column list taken from the declaration.
    Table {
        connection: Rc<RefCell<ConnectionHandle>>,
        table: String,
        columns: Vec<Identifier>,
    },
    /// A declared `SQL` template: a raw statement string, `$n`-style
    /// positional binds filled from the object's staged column writes.
    Sql {
        connection: Rc<RefCell<ConnectionHandle>>,
        sql: String,
    },
    /// `gen_range(start, stop[, step=1])`: a synthetic, inclusive integer
    /// sequence object usable as a `FETCH` source with no backing
    /// connection.
    GenRange { start: i64, stop: i64, step: i64 },
    /// `expand(value, sep)`: splits `value` on `sep`, yielding one row per
    /// piece in a single `value` column.
    Expand { value: String, sep: String },
    /// `compact(ref, sep)`: the inverse of `Expand` — a store-only object
    /// whose `execute()` appends the staged `$1` write to an accumulator
    /// and republishes the separator-joined text so far as `%value`. Has
    /// no source rows of its own (`first`/`next`/`eof` are unsupported on
    /// it, matching the original's store-only object).
    Compact { sep: String, parts: Vec<String> },
}

/// A runtime cursor: one instantiation of a declared object type, bound to
/// call arguments and driven by a task's phases.
pub struct Object {
    pub name: Identifier,
    pub context: Context,
    pub mode: InstanceMode,
    pub kind: ObjectKind,
    rows: Vec<Vec<Variant>>,
    column_names: Vec<String>,
    pos: isize,
    /// Staged `$col := expr` writes, applied on the next `execute()`.
    pending_writes: HashMap<ColumnSelector, Variant>,
    /// The result row produced by the last `execute()` (e.g. generated
    /// keys), readable via `%col`.
    result_row: Option<Vec<Variant>>,
    result_columns: Vec<String>,
}

impl Object {
    pub fn new(name: Identifier, kind: ObjectKind, mode: InstanceMode, parent_args: Vec<Variant>) -> Self {
        let mut context = Context::new(None);
        context.args = parent_args;
        Self {
            name,
            context,
            mode,
            kind,
            rows: Vec::new(),
            column_names: Vec::new(),
            pos: -1,
            pending_writes: HashMap::new(),
            result_row: None,
            result_columns: Vec::new(),
        }
    }

    pub fn run(&mut self, arg_names: &[Identifier], args: Vec<Variant>) -> Result<(), RuntimeError> {
        self.context.bind_args(arg_names, args)
    }

    /// Stage a `$col := expr` write for the next `execute()`.
    pub fn set_column(&mut self, selector: ColumnSelector, value: Variant) {
        self.pending_writes.insert(selector, value);
    }

    pub fn get_column(&self, selector: &ColumnSelector) -> Result<Variant, RuntimeError> {
        if self.eof() {
            return Err(RuntimeError::field_not_found(selector.to_string()));
        }
        let row = &self.rows[self.pos as usize];
        match selector {
            ColumnSelector::Number(n) => row
                .get((*n as usize).saturating_sub(1))
                .cloned()
                .ok_or_else(|| RuntimeError::field_not_found(selector.to_string())),
            ColumnSelector::Name(name) => self
                .column_names
                .iter()
                .position(|c| c.eq_ignore_ascii_case(name.as_str()))
                .and_then(|idx| row.get(idx))
                .cloned()
                .ok_or_else(|| RuntimeError::field_not_found(selector.to_string())),
        }
    }

    /// `%col` — NULL if the last `execute()` produced no result row, per
    /// the Open Question decision in `SPEC_FULL.md` §9.
    pub fn get_result_column(&self, selector: &ColumnSelector) -> Result<Variant, RuntimeError> {
        let Some(row) = &self.result_row else {
            return Ok(Variant::Null);
        };
        match selector {
            ColumnSelector::Number(n) => Ok(row.get((*n as usize).saturating_sub(1)).cloned().unwrap_or(Variant::Null)),
            ColumnSelector::Name(name) => Ok(self
                .result_columns
                .iter()
                .position(|c| c.eq_ignore_ascii_case(name.as_str()))
                .and_then(|idx| row.get(idx))
                .cloned()
                .unwrap_or(Variant::Null)),
        }
    }

    /// Executes the object's underlying statement. For `Insert` mode
    /// objects this performs exactly one INSERT using the staged column
    /// writes; for `Read` mode it (re-)runs the SELECT and loads every row
    /// into memory for subsequent `first`/`next` iteration.
    pub fn execute(&mut self) -> Result<(), RuntimeError> {
        match &self.kind {
            ObjectKind::Table { connection, table, columns } => {
                self.execute_table(connection.clone(), table.clone(), columns.clone())
            }
            ObjectKind::Sql { connection, sql } => self.execute_sql(connection.clone(), sql.clone()),
            ObjectKind::GenRange { start, stop, step } => {
                let (start, stop, step) = (*start, *stop, *step);
                self.rows = gen_range_rows(start, stop, step);
                self.column_names = vec!["value".to_string()];
                self.pos = -1;
                Ok(())
            }
            ObjectKind::Expand { value, sep } => {
                self.rows = value
                    .split(sep.as_str())
                    .map(|piece| vec![Variant::Str(piece.to_string())])
                    .collect();
                self.column_names = vec!["value".to_string()];
                self.pos = -1;
                Ok(())
            }
            ObjectKind::Compact { .. } => {
                // Per `SPEC_FULL.md`'s `Compact` invariant, NULL inputs are
                // skipped rather than rendered as a marker.
                let piece = self.pending_writes.get(&ColumnSelector::Number(1)).cloned();
                self.pending_writes.clear();
                let ObjectKind::Compact { sep, parts } = &mut self.kind else {
                    unreachable!("matched Compact above")
                };
                if let Some(value) = piece {
                    if !matches!(value, Variant::Null) {
                        parts.push(value.display_or_null_marker());
                    }
                }
                let joined = parts.join(sep.as_str());
                self.result_row = Some(vec![Variant::Str(joined)]);
                self.result_columns = vec!["value".to_string()];
                Ok(())
            }
        }
    }

    fn execute_table(
        &mut self,
        connection: Rc<RefCell<ConnectionHandle>>,
        table: String,
        columns: Vec<Identifier>,
    ) -> Result<(), RuntimeError> {
        let mut conn = connection.borrow_mut();
        match self.mode {
            InstanceMode::Insert => {
                let cols: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
                let placeholders: Vec<&str> = cols.iter().map(|_| "?").collect();
                let sql = format!(
                    "INSERT INTO {table} ({}) VALUES ({})",
                    cols.join(", "),
                    placeholders.join(", ")
                );
                let mut stmt = conn.conn.prepare(&sql)?;
                for (i, col) in columns.iter().enumerate() {
                    let value = self.resolve_write_value(i, col);
                    stmt.bind(i, &value)?;
                }
                let rs = stmt.execute()?;
                self.result_row = rs.last_insert_id().map(|id| vec![Variant::Int(id)]);
                self.result_columns = vec!["id".to_string()];
                self.pending_writes.clear();
                Ok(())
            }
            _ => {
                let sql = format!("SELECT * FROM {table}");
                let mut stmt = conn.conn.prepare(&sql)?;
                let mut rs = stmt.execute()?;
                self.load_resultset(rs.as_mut())
            }
        }
    }

    fn execute_sql(&mut self, connection: Rc<RefCell<ConnectionHandle>>, sql: String) -> Result<(), RuntimeError> {
        let mut conn = connection.borrow_mut();
        let mut stmt = conn.conn.prepare(&sql)?;
        let mut i = 0;
        let mut sorted: Vec<_> = self.pending_writes.iter().collect();
        sorted.sort_by_key(|(sel, _)| sel.to_string());
        for (_, value) in sorted {
            stmt.bind(i, value)?;
            i += 1;
        }
        let mut rs = stmt.execute()?;
        if self.mode == InstanceMode::Insert {
            self.result_row = rs.last_insert_id().map(|id| vec![Variant::Int(id)]);
            self.pending_writes.clear();
            Ok(())
        } else {
            self.load_resultset(rs.as_mut())
        }
    }

    fn load_resultset(&mut self, rs: &mut (dyn crate::db::Resultset + '_)) -> Result<(), RuntimeError> {
        self.column_names = (0..rs.column_count())
            .map(|i| rs.column_name(i).unwrap_or("").to_string())
            .collect();
        self.rows.clear();
        if rs.first()? {
            loop {
                let row: Result<Vec<Variant>, RuntimeError> =
                    (0..rs.column_count()).map(|i| rs.get(i)).collect();
                self.rows.push(row?);
                if !rs.next()? {
                    break;
                }
            }
        }
        self.pos = -1;
        Ok(())
    }

    fn resolve_write_value(&self, index: usize, col: &Identifier) -> Variant {
        for (selector, value) in &self.pending_writes {
            let matches = match selector {
                ColumnSelector::Number(n) => *n as usize == index + 1,
                ColumnSelector::Name(name) => name == col,
            };
            if matches {
                return value.clone();
            }
        }
        Variant::Null
    }

    pub fn first(&mut self) -> bool {
        self.pos = 0;
        !self.rows.is_empty()
    }

    pub fn next(&mut self) -> bool {
        self.pos += 1;
        (self.pos as usize) < self.rows.len()
    }

    pub fn eof(&self) -> bool {
        self.pos < 0 || self.pos as usize >= self.rows.len()
    }
}

/// `gen_range(start, stop[, step])`'s row set, inclusive of `stop` —
/// matching `GenRange::next`/`GenRange::eof`'s `<=` bound in
/// `examples/original_source/src/genrange.cc`.
fn gen_range_rows(start: i64, stop: i64, step: i64) -> Vec<Vec<Variant>> {
    if step == 0 {
        return Vec::new();
    }
    let mut rows = Vec::new();
    let mut v = start;
    if step > 0 {
        while v <= stop {
            rows.push(vec![Variant::Int(v)]);
            v += step;
        }
    } else {
        while v >= stop {
            rows.push(vec![Variant::Int(v)]);
            v += step;
        }
    }
    rows
}
