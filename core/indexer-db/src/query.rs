//! Statement builders for every write and read the indexer issues.
//!
//! Set arguments (lists of UIDs) are bound as a single JSON array and
//! expanded with `json_each`, so a statement's parameter count does not grow
//! with the size of the set.

use crate::pool::{SqlValue, Statement};
use indexer_types::{cluster_uid, Edge};
use serde_json::Value;

/// Property marking a resource as belonging to the hub cluster.
pub const HUB_CLUSTER_PROPERTY: &str = "_hubClusterResource";

fn uid_set(uids: &[String]) -> SqlValue {
    SqlValue::Text(Value::from(uids.to_vec()).to_string())
}

// ── Resources ────────────────────────────────────────────────────

/// Inserts a resource. On conflict the data is replaced only if it changed.
pub fn insert_resource(uid: &str, cluster: &str, data: &str) -> Statement {
    Statement::new(
        "INSERT INTO resources (uid, cluster, data) VALUES (?1, ?2, ?3) \
         ON CONFLICT (uid) DO UPDATE SET data = excluded.data \
         WHERE resources.data IS NOT excluded.data",
        vec![uid.into(), cluster.into(), data.into()],
    )
}

/// Replaces the data of an existing resource. UID and cluster never change.
pub fn update_resource(uid: &str, data: &str) -> Statement {
    Statement::new(
        "UPDATE resources SET data = ?2 WHERE uid = ?1",
        vec![uid.into(), data.into()],
    )
}

/// Deletes every resource whose UID is in `uids`.
pub fn delete_resources(uids: &[String]) -> Statement {
    Statement::new(
        "DELETE FROM resources WHERE uid IN (SELECT value FROM json_each(?1))",
        vec![uid_set(uids)],
    )
}

/// Deletes one resource.
pub fn delete_resource(uid: &str) -> Statement {
    Statement::new("DELETE FROM resources WHERE uid = ?1", vec![uid.into()])
}

/// Deletes resources of `cluster` whose UID is not in `keep`.
pub fn delete_stale_resources(cluster: &str, keep: &[String]) -> Statement {
    Statement::new(
        "DELETE FROM resources WHERE cluster = ?1 \
         AND uid NOT IN (SELECT value FROM json_each(?2))",
        vec![cluster.into(), uid_set(keep)],
    )
}

/// Reads one resource by UID.
pub fn select_resource(uid: &str) -> Statement {
    Statement::new(
        "SELECT uid, data FROM resources WHERE uid = ?1",
        vec![uid.into()],
    )
}

// ── Edges ────────────────────────────────────────────────────────

/// Inserts an edge. A duplicate (source, destination, type) is a no-op.
pub fn insert_edge(edge: &Edge, cluster: &str) -> Statement {
    Statement::new(
        "INSERT INTO edges (sourceid, sourcekind, destid, destkind, edgetype, cluster) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
         ON CONFLICT (sourceid, destid, edgetype) DO NOTHING",
        vec![
            (&edge.source_uid).into(),
            (&edge.source_kind).into(),
            (&edge.dest_uid).into(),
            (&edge.dest_kind).into(),
            (&edge.edge_type).into(),
            cluster.into(),
        ],
    )
}

/// Deletes the edge with exactly this (source, destination, type).
pub fn delete_edge(source_uid: &str, dest_uid: &str, edge_type: &str) -> Statement {
    Statement::new(
        "DELETE FROM edges WHERE sourceid = ?1 AND destid = ?2 AND edgetype = ?3",
        vec![source_uid.into(), dest_uid.into(), edge_type.into()],
    )
}

/// Deletes every edge with either endpoint in `uids`.
pub fn delete_edges_touching(uids: &[String]) -> Statement {
    Statement::new(
        "DELETE FROM edges WHERE sourceid IN (SELECT value FROM json_each(?1)) \
         OR destid IN (SELECT value FROM json_each(?1))",
        vec![uid_set(uids)],
    )
}

/// Deletes edges of `cluster` with an endpoint outside `keep`.
pub fn delete_stale_edges(cluster: &str, keep: &[String]) -> Statement {
    Statement::new(
        "DELETE FROM edges WHERE cluster = ?1 \
         AND (sourceid NOT IN (SELECT value FROM json_each(?2)) \
         OR destid NOT IN (SELECT value FROM json_each(?2)))",
        vec![cluster.into(), uid_set(keep)],
    )
}

/// Reads (source, type, destination) of the cluster's intra-cluster edges.
pub fn existing_edges(cluster: &str) -> Statement {
    Statement::new(
        "SELECT sourceid, edgetype, destid FROM edges \
         WHERE edgetype != 'interCluster' AND cluster = ?1",
        vec![cluster.into()],
    )
}

// ── Clusters ─────────────────────────────────────────────────────

/// Counts the resources owned by `cluster`.
pub fn count_resources(cluster: &str) -> Statement {
    Statement::new(
        "SELECT count(*) FROM resources WHERE cluster = ?1",
        vec![cluster.into()],
    )
}

/// Counts the intra-cluster edges owned by `cluster`.
pub fn count_edges(cluster: &str) -> Statement {
    Statement::new(
        "SELECT count(*) FROM edges WHERE cluster = ?1 AND edgetype != 'interCluster'",
        vec![cluster.into()],
    )
}

/// Deletes the resources of `cluster`, keeping its pseudo-node.
pub fn delete_cluster_resources(cluster: &str) -> Statement {
    Statement::new(
        "DELETE FROM resources WHERE cluster = ?1 AND uid != ?2",
        vec![cluster.into(), cluster_uid(cluster).into()],
    )
}

/// Deletes every resource of `cluster`, pseudo-node included.
pub fn delete_all_cluster_resources(cluster: &str) -> Statement {
    Statement::new("DELETE FROM resources WHERE cluster = ?1", vec![cluster.into()])
}

/// Deletes the edges of `cluster`.
pub fn delete_cluster_edges(cluster: &str) -> Statement {
    Statement::new("DELETE FROM edges WHERE cluster = ?1", vec![cluster.into()])
}

/// Lists clusters holding hub resources, pseudo-nodes aside.
pub fn hub_clusters() -> Statement {
    Statement::new(
        "SELECT DISTINCT cluster FROM resources \
         WHERE json_type(data, '$._hubClusterResource') IS NOT NULL \
         AND coalesce(json_extract(data, '$.kind'), '') != 'Cluster'",
        Vec::new(),
    )
}
