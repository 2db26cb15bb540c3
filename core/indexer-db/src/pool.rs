//! Connection pool abstraction.
//!
//! The sync engine never talks to a database driver directly. It submits
//! parameterized [`Statement`]s through a [`ConnectionPool`], which reports a
//! single outcome for each grouped submission.

use crate::error::{DbError, DbResult};
use async_trait::async_trait;

/// A bound parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for SqlValue {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

/// A parameterized statement. Arguments bind to `?1`, `?2`, ... in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, args: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }

    /// Returns true if any text argument equals `value`.
    pub fn has_text_arg(&self, value: &str) -> bool {
        self.args
            .iter()
            .any(|arg| matches!(arg, SqlValue::Text(text) if text == value))
    }
}

/// One result row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(values: Vec<SqlValue>) -> Self {
        Self { values }
    }

    pub fn get(&self, idx: usize) -> Option<&SqlValue> {
        self.values.get(idx)
    }

    /// Reads column `idx` as text. NULL reads as an empty string.
    pub fn get_str(&self, idx: usize) -> DbResult<&str> {
        match self.values.get(idx) {
            Some(SqlValue::Text(text)) => Ok(text),
            Some(SqlValue::Null) => Ok(""),
            other => Err(DbError::Query(format!(
                "column {idx} is not text: {other:?}"
            ))),
        }
    }

    /// Reads column `idx` as an integer.
    pub fn get_i64(&self, idx: usize) -> DbResult<i64> {
        match self.values.get(idx) {
            Some(SqlValue::Integer(n)) => Ok(*n),
            other => Err(DbError::Query(format!(
                "column {idx} is not an integer: {other:?}"
            ))),
        }
    }
}

/// Parameterized access to the relational store.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// Executes one statement and returns the number of rows it changed.
    async fn execute(&self, statement: &Statement) -> DbResult<u64>;

    /// Executes statements as one atomic unit. Either every statement takes
    /// effect or none does.
    async fn submit_group(&self, statements: &[Statement]) -> DbResult<()>;

    /// Runs a query and returns every row.
    async fn query(&self, statement: &Statement) -> DbResult<Vec<Row>>;
}

/// Mock pool for testing.
pub mod mock {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::{Mutex, MutexGuard, PoisonError};

    #[derive(Debug, Default)]
    struct MockState {
        poisoned: HashSet<String>,
        fail_all: bool,
        offline: bool,
        fail_queries: bool,
        rows: HashMap<String, Vec<Row>>,
        groups: Vec<Vec<Statement>>,
        committed: Vec<Vec<Statement>>,
        executed: Vec<Statement>,
        queries: Vec<Statement>,
    }

    /// A pool that records what it is asked to run.
    ///
    /// A statement fails if one of its text arguments is poisoned, either
    /// directly or as an element of a JSON array argument. A group fails if
    /// any of its statements fails.
    #[derive(Debug, Default)]
    pub struct MockPool {
        state: Mutex<MockState>,
    }

    impl MockPool {
        pub fn new() -> Self {
            Self::default()
        }

        fn state(&self) -> MutexGuard<'_, MockState> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Makes every statement bound to `value` fail.
        pub fn poison(&self, value: impl Into<String>) {
            self.state().poisoned.insert(value.into());
        }

        /// Makes every statement fail with a query error.
        pub fn fail_all(&self, fail: bool) {
            self.state().fail_all = fail;
        }

        /// Makes every call fail with a connectivity error.
        pub fn set_offline(&self, offline: bool) {
            self.state().offline = offline;
        }

        /// Makes every query fail with a query error.
        pub fn fail_queries(&self, fail: bool) {
            self.state().fail_queries = fail;
        }

        /// Rows returned for queries whose SQL equals `sql`.
        pub fn set_rows(&self, sql: impl Into<String>, rows: Vec<Row>) {
            self.state().rows.insert(sql.into(), rows);
        }

        /// Every group submitted, in submission order.
        pub fn groups(&self) -> Vec<Vec<Statement>> {
            self.state().groups.clone()
        }

        /// Groups that succeeded.
        pub fn committed(&self) -> Vec<Vec<Statement>> {
            self.state().committed.clone()
        }

        /// Statements that succeeded through `execute`.
        pub fn executed(&self) -> Vec<Statement> {
            self.state().executed.clone()
        }

        /// Every statement passed to `query`.
        pub fn queries(&self) -> Vec<Statement> {
            self.state().queries.clone()
        }

        fn check(state: &MockState, statement: &Statement) -> DbResult<()> {
            if state.offline {
                return Err(DbError::Connectivity("connection refused".into()));
            }
            if state.fail_all {
                return Err(DbError::Query(format!("rejected: {}", statement.sql)));
            }
            let poisoned = statement.args.iter().any(|arg| match arg {
                SqlValue::Text(text) => {
                    state.poisoned.contains(text)
                        || serde_json::from_str::<Vec<String>>(text)
                            .map(|items| items.iter().any(|i| state.poisoned.contains(i)))
                            .unwrap_or(false)
                }
                _ => false,
            });
            if poisoned {
                return Err(DbError::Query(format!("constraint violated: {}", statement.sql)));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ConnectionPool for MockPool {
        async fn execute(&self, statement: &Statement) -> DbResult<u64> {
            let mut state = self.state();
            Self::check(&state, statement)?;
            state.executed.push(statement.clone());
            Ok(1)
        }

        async fn submit_group(&self, statements: &[Statement]) -> DbResult<()> {
            let mut state = self.state();
            state.groups.push(statements.to_vec());
            for statement in statements {
                Self::check(&state, statement)?;
            }
            state.committed.push(statements.to_vec());
            Ok(())
        }

        async fn query(&self, statement: &Statement) -> DbResult<Vec<Row>> {
            let mut state = self.state();
            state.queries.push(statement.clone());
            if state.offline {
                return Err(DbError::Connectivity("connection refused".into()));
            }
            if state.fail_queries {
                return Err(DbError::Query(format!("rejected: {}", statement.sql)));
            }
            Ok(state.rows.get(&statement.sql).cloned().unwrap_or_default())
        }
    }
}
