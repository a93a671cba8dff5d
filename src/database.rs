//! Database connection.
//!
//! One SQLite connection behind a mutex, constructed explicitly at startup and
//! shared (usually through an `Arc`) with the handlers that need it. Queries
//! from concurrent handlers are serialised on the mutex.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parking_lot::Mutex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, params_from_iter};
use serde_json::{Map, Number, Value};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::Error;
use crate::query::QueryBuilder;

/// One result row: column name → value.
pub type Row = Map<String, Value>;

/// What [`Database::raw`] hands back, depending on the statement.
#[derive(Debug, PartialEq)]
pub enum RawOutcome {
    Rows(Vec<Row>),
    InsertId(i64),
    Affected(usize),
}

pub(crate) struct Execution {
    pub(crate) affected: usize,
    pub(crate) last_insert_id: i64,
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Opens (or creates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        info!(path = %path.display(), "database opened");
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Opens the database named by `DB_PATH`.
    pub fn connect(config: &Config) -> Result<Self, Error> {
        Self::open(&config.database_path)
    }

    /// Starts a query chain against `name`.
    pub fn table(&self, name: &str) -> QueryBuilder<'_> {
        QueryBuilder::new(self, name)
    }

    /// Runs one or more statements without parameters (schema setup).
    pub fn execute_batch(&self, sql: &str) -> Result<(), Error> {
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }

    /// Runs a hand-written parameterised statement.
    ///
    /// `SELECT` returns its rows, `INSERT` the new row id, anything else the
    /// number of affected rows.
    pub fn raw(&self, sql: &str, params: &[Value]) -> Result<RawOutcome, Error> {
        let verb = sql.split_whitespace().next().unwrap_or_default();
        if verb.eq_ignore_ascii_case("select") {
            return self.fetch_all(sql, params).map(RawOutcome::Rows);
        }

        let execution = self.execute(sql, params)?;
        if verb.eq_ignore_ascii_case("insert") {
            Ok(RawOutcome::InsertId(execution.last_insert_id))
        } else {
            Ok(RawOutcome::Affected(execution.affected))
        }
    }

    pub(crate) fn fetch_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, Error> {
        debug!(%sql, params = params.len(), "query");
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(str::to_owned).collect();

        let mut rows = stmt.query(params_from_iter(params.iter().map(to_sql)))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (i, name) in names.iter().enumerate() {
                record.insert(name.clone(), from_sql(row.get_ref(i)?));
            }
            out.push(record);
        }
        Ok(out)
    }

    pub(crate) fn execute(&self, sql: &str, params: &[Value]) -> Result<Execution, Error> {
        debug!(%sql, params = params.len(), "execute");
        let conn = self.conn.lock();
        let affected = conn.execute(sql, params_from_iter(params.iter().map(to_sql)))?;
        Ok(Execution { affected, last_insert_id: conn.last_insert_rowid() })
    }
}

/// JSON → SQLite. Booleans become 0/1; arrays and objects are stored as JSON text.
fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => n.as_i64()
            .map(SqlValue::Integer)
            .or_else(|| n.as_f64().map(SqlValue::Real))
            .unwrap_or(SqlValue::Null),
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// SQLite → JSON. Blobs come back base64-encoded.
fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(STANDARD.encode(b)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, score REAL, data BLOB)")
            .unwrap();
        db
    }

    #[test]
    fn raw_dispatches_on_the_leading_verb() {
        let db = db();
        let id = db.raw("INSERT INTO t (name) VALUES (?)", &[json!("a")]).unwrap();
        assert_eq!(id, RawOutcome::InsertId(1));

        let changed = db.raw("  update t SET name = ?", &[json!("b")]).unwrap();
        assert_eq!(changed, RawOutcome::Affected(1));

        let RawOutcome::Rows(rows) = db.raw("select name from t", &[]).unwrap() else {
            panic!("expected rows");
        };
        assert_eq!(rows[0]["name"], "b");
    }

    #[test]
    fn values_convert_both_ways() {
        let db = db();
        db.raw(
            "INSERT INTO t (name, score, data) VALUES (?, ?, X'0102')",
            &[json!(true), json!(1.5)],
        )
        .unwrap();

        let RawOutcome::Rows(rows) = db.raw("SELECT * FROM t", &[]).unwrap() else {
            panic!("expected rows");
        };
        assert_eq!(rows[0]["id"], 1);
        // `name` is TEXT affinity, so the integer 1 bound for `true` is stored as text.
        assert_eq!(rows[0]["name"], "1");
        assert_eq!(rows[0]["score"], 1.5);
        assert_eq!(rows[0]["data"], "AQI=");
    }

    #[test]
    fn database_errors_become_query_failed() {
        let err = db().raw("SELECT * FROM missing", &[]).unwrap_err();
        assert!(matches!(err, Error::QueryFailed(_)));
        assert!(err.to_string().starts_with("Query Failed: "));
    }
}
