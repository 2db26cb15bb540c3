//! Core type definitions for the search indexer.
//!
//! This crate defines the resource graph pushed by managed clusters and the
//! messages exchanged with the collector that pushes it:
//! - Resources (graph nodes) with a JSON property document
//! - Edges between resources, keyed by (source, destination, type)
//! - Sync events (delta or full resync) and their responses
//!
//! The JSON shape matches what collectors already send: camelCase request
//! keys, PascalCase response keys.

mod event;
mod resource;
mod response;

pub use event::{DeleteResourceEvent, SyncEvent};
pub use resource::{cluster_uid, Edge, EdgeKey, Properties, Resource, CLUSTER_UID_PREFIX};
pub use response::{SyncAction, SyncError, SyncResponse, COMPONENT_VERSION, ITEM_ERROR_MESSAGE};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
