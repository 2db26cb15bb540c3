//! Graph nodes and edges.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Property document of a resource.
///
/// Values are the closed set of JSON variants (null, bool, number, string,
/// list, nested map), so equality between two documents is total. The map is
/// ordered by key, which makes the serialized form deterministic.
pub type Properties = serde_json::Map<String, Value>;

/// Prefix of the UID given to a cluster's pseudo-node.
pub const CLUSTER_UID_PREFIX: &str = "cluster__";

/// Returns the pseudo-node UID for a cluster name.
#[must_use]
pub fn cluster_uid(cluster: &str) -> String {
    format!("{CLUSTER_UID_PREFIX}{cluster}")
}

/// A graph node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Kind tag, e.g. `Pod`.
    #[serde(default)]
    pub kind: String,

    /// Globally unique identifier.
    #[serde(default)]
    pub uid: String,

    /// Plural kind used downstream for authorization mapping.
    #[serde(default)]
    pub resource_string: String,

    /// The document persisted for this resource.
    #[serde(default, alias = "Properties")]
    pub properties: Properties,
}

impl Resource {
    /// Creates a resource with an empty property document.
    pub fn new(kind: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            uid: uid.into(),
            ..Default::default()
        }
    }

    /// Adds a property, builder style.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// The minimal pseudo-node written for a cluster the first time it
    /// reports.
    #[must_use]
    pub fn cluster_node(cluster: &str) -> Self {
        Self {
            kind: "Cluster".to_string(),
            uid: cluster_uid(cluster),
            resource_string: "clusters".to_string(),
            properties: Properties::new(),
        }
        .with_property("kind", "Cluster")
        .with_property("name", cluster)
    }

    /// Serializes the property document to the text stored in the database.
    pub fn properties_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(&self.properties)?)
    }

    /// Returns true if the resource carries `key`, whatever its value.
    pub fn has_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }
}

/// A directed relationship between two resources.
///
/// Collectors send these keys in Go's default casing; camelCase is accepted
/// as well.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    #[serde(rename = "SourceUID", alias = "sourceUID", alias = "sourceUid", default)]
    pub source_uid: String,

    #[serde(rename = "DestUID", alias = "destUID", alias = "destUid", default)]
    pub dest_uid: String,

    #[serde(rename = "EdgeType", alias = "edgeType", default)]
    pub edge_type: String,

    #[serde(rename = "SourceKind", alias = "sourceKind", default)]
    pub source_kind: String,

    #[serde(rename = "DestKind", alias = "destKind", default)]
    pub dest_kind: String,
}

impl Edge {
    /// Creates an edge.
    pub fn new(
        source_uid: impl Into<String>,
        source_kind: impl Into<String>,
        edge_type: impl Into<String>,
        dest_uid: impl Into<String>,
        dest_kind: impl Into<String>,
    ) -> Self {
        Self {
            source_uid: source_uid.into(),
            dest_uid: dest_uid.into(),
            edge_type: edge_type.into(),
            source_kind: source_kind.into(),
            dest_kind: dest_kind.into(),
        }
    }

    /// The identity of the edge in the store.
    #[must_use]
    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            source_uid: self.source_uid.clone(),
            dest_uid: self.dest_uid.clone(),
            edge_type: self.edge_type.clone(),
        }
    }
}

/// (source, destination, type) triple that identifies an edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    pub source_uid: String,
    pub dest_uid: String,
    pub edge_type: String,
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -[{}]-> {}", self.source_uid, self.edge_type, self.dest_uid)
    }
}
