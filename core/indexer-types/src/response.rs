//! Responses returned to collectors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version string reported in every response.
pub const COMPONENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Message recorded for an item isolated as the cause of a failed write.
pub const ITEM_ERROR_MESSAGE: &str = "Resource generated an error while updating the database.";

/// The operation an item was queued for. Decides which error list a failure
/// lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncAction {
    AddResource,
    UpdateResource,
    DeleteResource,
    AddEdge,
    DeleteEdge,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddResource => "addResource",
            Self::UpdateResource => "updateResource",
            Self::DeleteResource => "deleteResource",
            Self::AddEdge => "addEdge",
            Self::DeleteEdge => "deleteEdge",
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure attributed to one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncError {
    #[serde(rename = "ResourceUID")]
    pub resource_uid: String,

    #[serde(rename = "Message")]
    pub message: String,
}

impl SyncError {
    pub fn new(resource_uid: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            resource_uid: resource_uid.into(),
            message: message.into(),
        }
    }
}

/// Result of one sync request.
///
/// Totals count attempted operations minus failures and never go below zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SyncResponse {
    pub total_added: usize,
    pub total_updated: usize,
    pub total_deleted: usize,
    /// Resources stored for the cluster after the request.
    pub total_resources: usize,
    pub total_edges_added: usize,
    pub total_edges_deleted: usize,
    /// Intra-cluster edges stored for the cluster after the request.
    pub total_edges: usize,

    pub add_errors: Vec<SyncError>,
    pub update_errors: Vec<SyncError>,
    pub delete_errors: Vec<SyncError>,
    pub add_edge_errors: Vec<SyncError>,
    pub delete_edge_errors: Vec<SyncError>,

    pub version: String,
    pub request_id: i64,
}

impl SyncResponse {
    /// Empty response echoing `request_id`.
    pub fn new(request_id: i64) -> Self {
        Self {
            version: COMPONENT_VERSION.to_string(),
            request_id,
            ..Default::default()
        }
    }

    /// The error list for an action.
    pub fn errors_mut(&mut self, action: SyncAction) -> &mut Vec<SyncError> {
        match action {
            SyncAction::AddResource => &mut self.add_errors,
            SyncAction::UpdateResource => &mut self.update_errors,
            SyncAction::DeleteResource => &mut self.delete_errors,
            SyncAction::AddEdge => &mut self.add_edge_errors,
            SyncAction::DeleteEdge => &mut self.delete_edge_errors,
        }
    }

    /// The error list for an action.
    pub fn errors(&self, action: SyncAction) -> &[SyncError] {
        match action {
            SyncAction::AddResource => &self.add_errors,
            SyncAction::UpdateResource => &self.update_errors,
            SyncAction::DeleteResource => &self.delete_errors,
            SyncAction::AddEdge => &self.add_edge_errors,
            SyncAction::DeleteEdge => &self.delete_edge_errors,
        }
    }

    /// Total number of errors across all lists.
    pub fn error_count(&self) -> usize {
        self.add_errors.len()
            + self.update_errors.len()
            + self.delete_errors.len()
            + self.add_edge_errors.len()
            + self.delete_edge_errors.len()
    }

    /// Sets the five per-operation totals as attempted minus failed.
    pub fn set_operation_totals(
        &mut self,
        added: usize,
        updated: usize,
        deleted: usize,
        edges_added: usize,
        edges_deleted: usize,
    ) {
        self.total_added = added.saturating_sub(self.add_errors.len());
        self.total_updated = updated.saturating_sub(self.update_errors.len());
        self.total_deleted = deleted.saturating_sub(self.delete_errors.len());
        self.total_edges_added = edges_added.saturating_sub(self.add_edge_errors.len());
        self.total_edges_deleted = edges_deleted.saturating_sub(self.delete_edge_errors.len());
    }
}
