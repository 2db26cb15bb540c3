//! Cluster pseudo-nodes and the process-wide cluster identity cache.
//!
//! Every managed cluster owns one resource with UID `cluster__<name>` that
//! carries the cluster's own properties. The cache remembers the last
//! properties persisted for each pseudo-node so repeated updates with the same
//! properties never reach the database.

use crate::error::DbResult;
use crate::pool::{ConnectionPool, Statement};
use crate::query;
use indexer_types::{cluster_uid, Properties, Resource, CLUSTER_UID_PREFIX};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const SLOW_DELETE: Duration = Duration::from_millis(100);

/// Pseudo-node UID to last persisted properties. Entries never expire.
#[derive(Debug, Default)]
pub struct ClusterCache {
    entries: RwLock<HashMap<String, Properties>>,
}

impl ClusterCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uid: &str) -> Option<Properties> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uid)
            .cloned()
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(uid)
    }

    pub fn insert(&self, uid: impl Into<String>, properties: Properties) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uid.into(), properties);
    }

    pub fn remove(&self, uid: &str) -> Option<Properties> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(uid)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Cached properties already matched; no write issued.
    Unchanged,
    /// The write failed. The cache is untouched so the next update retries.
    Failed,
}

/// Reads and writes cluster-level records.
#[derive(Clone)]
pub struct ClusterStore {
    pool: Arc<dyn ConnectionPool>,
    cache: Arc<ClusterCache>,
}

impl ClusterStore {
    pub fn new(pool: Arc<dyn ConnectionPool>, cache: Arc<ClusterCache>) -> Self {
        Self { pool, cache }
    }

    pub fn cache(&self) -> &Arc<ClusterCache> {
        &self.cache
    }

    /// Returns true if the cluster's pseudo-node is persisted. Reads through
    /// to the database on a cache miss and caches what it finds. A failed
    /// lookup counts as absent.
    pub async fn cluster_in_db(&self, cluster: &str) -> bool {
        match self.lookup_cluster(cluster).await {
            Ok(found) => found,
            Err(e) => {
                warn!("failed to read cluster {cluster} from the database: {e}");
                false
            }
        }
    }

    async fn lookup_cluster(&self, cluster: &str) -> DbResult<bool> {
        let uid = cluster_uid(cluster);
        if self.cache.contains(&uid) {
            return Ok(true);
        }
        debug!("cluster {uid} not cached, reading it from the database");

        let rows = self.pool.query(&query::select_resource(&uid)).await?;
        for row in rows {
            let (found, data) = match (row.get_str(0), row.get_str(1)) {
                (Ok(found), Ok(data)) => (found, data),
                _ => {
                    warn!("unreadable row for cluster {uid}");
                    continue;
                }
            };
            match serde_json::from_str::<Properties>(data) {
                Ok(properties) => self.cache.insert(found, properties),
                Err(e) => warn!("stored properties for {found} are not a JSON object: {e}"),
            }
        }
        Ok(self.cache.contains(&uid))
    }

    /// True only if the cached properties have the same keys and values as
    /// `properties`.
    pub fn cluster_props_up_to_date(&self, cluster: &str, properties: &Properties) -> bool {
        let Some(existing) = self.cache.get(&cluster_uid(cluster)) else {
            return false;
        };
        existing.len() == properties.len()
            && properties
                .iter()
                .all(|(key, value)| existing.get(key) == Some(value))
    }

    /// Inserts the pseudo-node if absent, updates it if its properties
    /// changed, otherwise does nothing.
    pub async fn upsert_cluster(&self, resource: &Resource) -> UpsertOutcome {
        let Some(cluster) = cluster_name(resource) else {
            warn!("cluster resource {} has no name", resource.uid);
            return UpsertOutcome::Failed;
        };

        if !self.cluster_in_db(&cluster).await {
            info!("cluster {cluster} is not in the database, inserting it");
            return self.write_node(resource, &cluster, UpsertOutcome::Inserted).await;
        }
        if !self.cluster_props_up_to_date(&cluster, &resource.properties) {
            debug!("cluster {cluster} properties changed, updating");
            return self.write_node(resource, &cluster, UpsertOutcome::Updated).await;
        }
        debug!("cluster {cluster} is up to date");
        UpsertOutcome::Unchanged
    }

    /// Makes sure the cluster has a pseudo-node, writing a minimal one if
    /// none is persisted.
    ///
    /// Nothing is written when the lookup itself fails.
    pub async fn ensure_cluster_node(&self, cluster: &str) -> UpsertOutcome {
        match self.lookup_cluster(cluster).await {
            Ok(true) => return UpsertOutcome::Unchanged,
            Ok(false) => {}
            Err(e) => {
                warn!("failed to read cluster {cluster}, skipping node write: {e}");
                return UpsertOutcome::Failed;
            }
        }
        let node = Resource::cluster_node(cluster);
        self.write_node(&node, cluster, UpsertOutcome::Inserted).await
    }

    async fn write_node(
        &self,
        resource: &Resource,
        cluster: &str,
        outcome: UpsertOutcome,
    ) -> UpsertOutcome {
        let data = match resource.properties_json() {
            Ok(data) => data,
            Err(e) => {
                warn!("failed to serialize cluster {cluster}: {e}");
                return UpsertOutcome::Failed;
            }
        };
        let statement: Statement = match outcome {
            UpsertOutcome::Updated => query::update_resource(&resource.uid, &data),
            _ => query::insert_resource(&resource.uid, cluster, &data),
        };
        match self.pool.execute(&statement).await {
            Ok(_) => {
                self.cache.insert(&resource.uid, resource.properties.clone());
                outcome
            }
            Err(e) => {
                warn!("failed to write cluster {cluster}: {e}");
                UpsertOutcome::Failed
            }
        }
    }

    /// Deletes every resource and edge of the cluster in one atomic group.
    /// With `delete_node`, the pseudo-node goes too and leaves the cache.
    pub async fn delete_cluster_and_resources(
        &self,
        cluster: &str,
        delete_node: bool,
    ) -> DbResult<()> {
        let start = Instant::now();
        self.pool
            .submit_group(&[
                query::delete_cluster_resources(cluster),
                query::delete_cluster_edges(cluster),
            ])
            .await?;
        let elapsed = start.elapsed();
        if elapsed > SLOW_DELETE {
            warn!("delete of cluster {cluster} took {elapsed:?}");
        } else {
            debug!("deleted resources and edges of cluster {cluster} in {elapsed:?}");
        }

        if delete_node {
            let uid = cluster_uid(cluster);
            self.pool.execute(&query::delete_resource(&uid)).await?;
            self.cache.remove(&uid);
            debug!("deleted cluster node {uid}");
        }
        Ok(())
    }

    /// Resources and intra-cluster edges currently stored for the cluster.
    pub async fn cluster_totals(&self, cluster: &str) -> DbResult<(usize, usize)> {
        let resources = self.count(&query::count_resources(cluster)).await?;
        let edges = self.count(&query::count_edges(cluster)).await?;
        Ok((resources, edges))
    }

    async fn count(&self, statement: &Statement) -> DbResult<usize> {
        let rows = self.pool.query(statement).await?;
        match rows.first() {
            Some(row) => Ok(usize::try_from(row.get_i64(0)?).unwrap_or(0)),
            None => Ok(0),
        }
    }

    /// Deletes data left behind under previous names of the hub cluster.
    /// Returns the names removed.
    pub async fn remove_stale_hub_clusters(&self, current: &str) -> DbResult<Vec<String>> {
        let rows = self.pool.query(&query::hub_clusters()).await?;
        let mut stale = Vec::new();
        for row in &rows {
            let name = row.get_str(0)?;
            if !name.is_empty() && name != current {
                stale.push(name.to_string());
            }
        }

        for cluster in &stale {
            self.pool
                .submit_group(&[
                    query::delete_all_cluster_resources(cluster),
                    query::delete_cluster_edges(cluster),
                ])
                .await?;
            self.cache.remove(&cluster_uid(cluster));
            info!("deleted data of renamed hub cluster {cluster}");
        }
        Ok(stale)
    }
}

fn cluster_name(resource: &Resource) -> Option<String> {
    resource
        .properties
        .get("name")
        .and_then(Value::as_str)
        .or_else(|| resource.uid.strip_prefix(CLUSTER_UID_PREFIX))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}
