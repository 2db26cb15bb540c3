//! SQLite-backed connection pool.

use crate::error::{DbError, DbResult};
use crate::pool::{ConnectionPool, Row, SqlValue, Statement};
use crate::schema::SCHEMA;
use async_trait::async_trait;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            SqlValue::Integer(n) => ToSqlOutput::from(*n),
            SqlValue::Real(f) => ToSqlOutput::from(*f),
            SqlValue::Text(text) => ToSqlOutput::from(text.as_str()),
        })
    }
}

fn read_value(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(n) => SqlValue::Integer(n),
        ValueRef::Real(f) => SqlValue::Real(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            SqlValue::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// A pool over a single SQLite connection.
///
/// Calls run on tokio's blocking threads. The connection mutex serializes
/// them, which is what SQLite does internally anyway.
#[derive(Clone)]
pub struct SqlitePool {
    conn: Arc<Mutex<Connection>>,
}

impl SqlitePool {
    /// Opens (or creates) a database file and applies the schema.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            DbError::Connectivity(format!("failed to open {}: {e}", path.display()))
        })?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        debug!("opened database at {}", path.display());
        Self::with_connection(conn)
    }

    /// Opens an in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DbError::Connectivity(format!("failed to open in-memory database: {e}")))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> DbResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, f: F) -> DbResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> DbResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| DbError::Connectivity("connection lock poisoned".into()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| DbError::Query(format!("database task failed: {e}")))?
    }
}

#[async_trait]
impl ConnectionPool for SqlitePool {
    async fn execute(&self, statement: &Statement) -> DbResult<u64> {
        let statement = statement.clone();
        self.run(move |conn| {
            let changed = conn.execute(&statement.sql, params_from_iter(statement.args.iter()))?;
            Ok(changed as u64)
        })
        .await
    }

    async fn submit_group(&self, statements: &[Statement]) -> DbResult<()> {
        let statements = statements.to_vec();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            for statement in &statements {
                tx.execute(&statement.sql, params_from_iter(statement.args.iter()))?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn query(&self, statement: &Statement) -> DbResult<Vec<Row>> {
        let statement = statement.clone();
        self.run(move |conn| {
            let mut stmt = conn.prepare(&statement.sql)?;
            let columns = stmt.column_count();
            let rows = stmt
                .query_map(params_from_iter(statement.args.iter()), |row| {
                    let mut values = Vec::with_capacity(columns);
                    for idx in 0..columns {
                        values.push(read_value(row.get_ref(idx)?));
                    }
                    Ok(Row::new(values))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }
}
