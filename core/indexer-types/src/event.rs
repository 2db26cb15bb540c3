//! Sync events sent by collectors.
//!
//! A collector sends one of two kinds of request:
//! - a delta (`clearAll = false`) listing what changed since its last request
//! - a full resync (`clearAll = true`) carrying its complete current state
//!
//! The collector guarantees a UID never appears in both `addResources` and
//! `updateResources` of the same event, and it never sends edge updates.

use crate::{Edge, Resource};
use serde::{Deserialize, Serialize};

/// A resource marked for removal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResourceEvent {
    #[serde(default, alias = "UID")]
    pub uid: String,
}

impl DeleteResourceEvent {
    pub fn new(uid: impl Into<String>) -> Self {
        Self { uid: uid.into() }
    }
}

/// One update from a managed cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncEvent {
    /// Full resync: the event carries the complete state of the cluster.
    #[serde(alias = "ClearAll")]
    pub clear_all: bool,

    #[serde(alias = "AddResources")]
    pub add_resources: Vec<Resource>,
    #[serde(alias = "UpdateResources")]
    pub update_resources: Vec<Resource>,
    #[serde(alias = "DeleteResources")]
    pub delete_resources: Vec<DeleteResourceEvent>,

    #[serde(alias = "AddEdges")]
    pub add_edges: Vec<Edge>,
    #[serde(alias = "DeleteEdges")]
    pub delete_edges: Vec<Edge>,

    /// Echoed back in the response.
    #[serde(alias = "RequestId")]
    pub request_id: i64,
}

impl SyncEvent {
    /// Decodes an event from a request body.
    pub fn from_json(body: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Number of resource operations carried by the event.
    pub fn resource_count(&self) -> usize {
        self.add_resources.len() + self.update_resources.len() + self.delete_resources.len()
    }

    /// UIDs of the resources to delete, in request order.
    pub fn delete_uids(&self) -> Vec<String> {
        self.delete_resources.iter().map(|d| d.uid.clone()).collect()
    }
}
