//! A concrete [`Connection`]/[`Statement`]/[`Resultset`] backend over
//! `rusqlite`, used in tests and by embedders that want a zero-setup
//! database.
//!
//! Rows are materialized eagerly on `execute()` rather than streamed from
//! a live `rusqlite::Rows` cursor: `rusqlite::Statement` borrows its
//! parent `Connection`, which does not compose with this crate's
//! non-lifetime-parameterised `Statement`/`Resultset` traits. Argon scripts
//! operate on result sets that comfortably fit in memory (ETL row batches,
//! not data-warehouse scans), so the tradeoff is acceptable.

use super::{Connection, Environment, Resultset, Statement};
use crate::errors::RuntimeError;
use crate::value::Variant;
use rusqlite::types::ValueRef;
use rusqlite::Connection as RawConnection;
use std::collections::HashMap;

#[derive(Debug)]
pub struct SqliteEnvironment;

impl Environment for SqliteEnvironment {
    fn connect(&self, dsn: &str, _options: &[(String, String)]) -> Result<Box<dyn Connection>, RuntimeError> {
        let raw = if dsn == ":memory:" || dsn.is_empty() {
            RawConnection::open_in_memory()
        } else {
            RawConnection::open(dsn)
        }
        .map_err(|e| RuntimeError::connection(dsn, e.to_string()))?;
        Ok(Box::new(SqliteConnection {
            raw,
            sequences: HashMap::new(),
        }))
    }
}

#[derive(Debug)]
pub struct SqliteConnection {
    raw: RawConnection,
    /// SQLite has no native sequence object; `seq.next` is emulated with
    /// an in-memory counter per sequence name, seeded from a
    /// `_argon_sequences` table if present.
    sequences: HashMap<String, i64>,
}

impl Connection for SqliteConnection {
    fn prepare(&mut self, sql: &str) -> Result<Box<dyn Statement + '_>, RuntimeError> {
        Ok(Box::new(SqliteStatement {
            conn: self,
            sql: sql.to_string(),
            binds: Vec::new(),
        }))
    }

    fn start_transaction(&mut self) -> Result<(), RuntimeError> {
        self.raw
            .execute_batch("BEGIN")
            .map_err(|e| RuntimeError::connection("sqlite", e.to_string()))
    }

    fn commit(&mut self) -> Result<(), RuntimeError> {
        self.raw
            .execute_batch("COMMIT")
            .map_err(|e| RuntimeError::connection("sqlite", e.to_string()))
    }

    fn rollback(&mut self, savepoint: Option<&str>) -> Result<(), RuntimeError> {
        let sql = match savepoint {
            Some(name) => format!("ROLLBACK TO SAVEPOINT {name}"),
            None => "ROLLBACK".to_string(),
        };
        self.raw
            .execute_batch(&sql)
            .map_err(|e| RuntimeError::connection("sqlite", e.to_string()))
    }

    fn savepoint(&mut self, name: &str) -> Result<(), RuntimeError> {
        self.raw
            .execute_batch(&format!("SAVEPOINT {name}"))
            .map_err(|e| RuntimeError::connection("sqlite", e.to_string()))
    }

    fn next_sequence_value(&mut self, sequence: &str) -> Result<Variant, RuntimeError> {
        let counter = self.sequences.entry(sequence.to_string()).or_insert(0);
        *counter += 1;
        Ok(Variant::Int(*counter))
    }
}

struct SqliteStatement<'c> {
    conn: &'c mut SqliteConnection,
    sql: String,
    binds: Vec<Option<Variant>>,
}

impl<'c> Statement for SqliteStatement<'c> {
    fn bind(&mut self, index: usize, value: &Variant) -> Result<(), RuntimeError> {
        if self.binds.len() <= index {
            self.binds.resize(index + 1, None);
        }
        self.binds[index] = Some(value.clone());
        Ok(())
    }

    fn execute(&mut self) -> Result<Box<dyn Resultset + '_>, RuntimeError> {
        let mut stmt = self
            .conn
            .raw
            .prepare(&self.sql)
            .map_err(|e| RuntimeError::connection("sqlite", e.to_string()))?;

        let params: Vec<rusqlite::types::Value> = self
            .binds
            .iter()
            .map(|b| to_sql_value(b.as_ref().unwrap_or(&Variant::Null)))
            .collect();
        let param_refs: Vec<&dyn rusqlite::ToSql> =
            params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();

        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let is_query = !columns.is_empty();

        if is_query {
            let mut rows_cursor = stmt
                .query(param_refs.as_slice())
                .map_err(|e| RuntimeError::connection("sqlite", e.to_string()))?;
            let mut rows = Vec::new();
            while let Some(row) = rows_cursor
                .next()
                .map_err(|e| RuntimeError::connection("sqlite", e.to_string()))?
            {
                let mut values = Vec::with_capacity(columns.len());
                for i in 0..columns.len() {
                    let v: ValueRef = row
                        .get_ref(i)
                        .map_err(|e| RuntimeError::connection("sqlite", e.to_string()))?;
                    values.push(from_sql_value(v));
                }
                rows.push(values);
            }
            Ok(Box::new(SqliteResultset {
                columns,
                rows,
                pos: -1,
                last_insert_id: None,
            }))
        } else {
            stmt.execute(param_refs.as_slice())
                .map_err(|e| RuntimeError::connection("sqlite", e.to_string()))?;
            let last_id = self.conn.raw.last_insert_rowid();
            Ok(Box::new(SqliteResultset {
                columns: Vec::new(),
                rows: Vec::new(),
                pos: -1,
                last_insert_id: Some(last_id),
            }))
        }
    }
}

struct SqliteResultset {
    columns: Vec<String>,
    rows: Vec<Vec<Variant>>,
    pos: isize,
    last_insert_id: Option<i64>,
}

impl Resultset for SqliteResultset {
    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(|s| s.as_str())
    }

    fn first(&mut self) -> Result<bool, RuntimeError> {
        self.pos = 0;
        Ok(!self.rows.is_empty())
    }

    fn next(&mut self) -> Result<bool, RuntimeError> {
        self.pos += 1;
        Ok((self.pos as usize) < self.rows.len())
    }

    fn eof(&self) -> bool {
        self.pos < 0 || self.pos as usize >= self.rows.len()
    }

    fn get(&self, index: usize) -> Result<Variant, RuntimeError> {
        if self.eof() {
            return Err(RuntimeError::field_not_found(format!("#{index}")));
        }
        self.rows[self.pos as usize]
            .get(index)
            .cloned()
            .ok_or_else(|| RuntimeError::field_not_found(format!("#{index}")))
    }

    fn get_by_name(&self, name: &str) -> Result<Variant, RuntimeError> {
        let idx = self
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .ok_or_else(|| RuntimeError::field_not_found(name))?;
        self.get(idx)
    }

    fn last_insert_id(&self) -> Option<i64> {
        self.last_insert_id
    }
}

fn to_sql_value(v: &Variant) -> rusqlite::types::Value {
    use rusqlite::types::Value as SqlValue;
    match v {
        Variant::Int(i) => SqlValue::Integer(*i),
        Variant::Numeric(d) => SqlValue::Text(d.to_string()),
        Variant::Str(s) => SqlValue::Text(s.clone()),
        Variant::Date(d) => SqlValue::Text(d.format("%Y-%m-%d").to_string()),
        Variant::VarBinary(b) => SqlValue::Blob(b.clone()),
        Variant::Bool(b) => SqlValue::Integer(*b as i64),
        Variant::Null => SqlValue::Null,
    }
}

fn from_sql_value(v: ValueRef<'_>) -> Variant {
    match v {
        ValueRef::Null => Variant::Null,
        ValueRef::Integer(i) => Variant::Int(i),
        ValueRef::Real(f) => Variant::Numeric(rust_decimal::Decimal::try_from(f).unwrap_or_default()),
        ValueRef::Text(t) => Variant::Str(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Variant::VarBinary(b.to_vec()),
    }
}
