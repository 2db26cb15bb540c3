//! Error types for the database layer.

use rusqlite::ErrorCode;
use thiserror::Error;

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur talking to the store.
///
/// Connectivity failures mean nothing further can be delivered for the
/// current request. Query failures are confined to the statement or group
/// that raised them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DbError {
    /// The store is unreachable or unusable.
    #[error("database connection error: {0}")]
    Connectivity(String),

    /// A statement failed to execute.
    #[error("query error: {0}")]
    Query(String),
}

impl DbError {
    /// Returns true for failures of the store itself rather than of a
    /// statement.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
                ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::SystemIoFailure
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::PermissionDenied => Self::Connectivity(err.to_string()),
                _ => Self::Query(err.to_string()),
            },
            rusqlite::Error::InvalidPath(_) => Self::Connectivity(err.to_string()),
            _ => Self::Query(err.to_string()),
        }
    }
}
