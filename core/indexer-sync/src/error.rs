//! Error types for the sync layer.

use indexer_db::DbError;
use thiserror::Error;

/// Result type for sync operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that abort a whole sync request.
///
/// Failures of individual resources or edges are not errors here; they are
/// reported in the response.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Database error, either connectivity or a failed bookkeeping query.
    #[error("database error: {0}")]
    Database(#[from] DbError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
