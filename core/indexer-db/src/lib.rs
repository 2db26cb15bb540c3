//! Database layer for the search indexer.
//!
//! - [`ConnectionPool`]: parameterized execute, grouped submit and query
//! - [`SqlitePool`]: the SQLite implementation used by the server
//! - [`query`]: builders for every statement the indexer issues
//! - [`ClusterStore`] / [`ClusterCache`]: cluster pseudo-nodes, totals and
//!   deletion

mod cluster;
mod error;
mod pool;
pub mod query;
mod schema;
mod sqlite;

pub use cluster::{ClusterCache, ClusterStore, UpsertOutcome};
pub use error::{DbError, DbResult};
pub use pool::{mock, ConnectionPool, Row, SqlValue, Statement};
pub use schema::SCHEMA;
pub use sqlite::SqlitePool;
