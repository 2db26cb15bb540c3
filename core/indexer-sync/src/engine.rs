//! Sync engine: turns one sync event into batched writes and a response.

use crate::batch::{BatchItem, BatchWriter};
use crate::error::{EngineError, EngineResult};
use crate::resync;
use indexer_db::{query, ClusterCache, ClusterStore, ConnectionPool, DbResult};
use indexer_types::{SyncAction, SyncEvent, SyncResponse};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Configuration for the sync engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Items per unit sent to the database.
    pub batch_size: usize,
    /// Requests slower than this are logged as warnings (ms).
    pub slow_log_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 2500,
            slow_log_ms: 1000,
        }
    }
}

/// Applies sync events from managed clusters to the store.
#[derive(Clone)]
pub struct SyncEngine {
    pub(crate) pool: Arc<dyn ConnectionPool>,
    pub(crate) clusters: ClusterStore,
    pub(crate) config: EngineConfig,
}

impl SyncEngine {
    /// Creates an engine with its own cluster cache.
    pub fn new(pool: Arc<dyn ConnectionPool>, config: EngineConfig) -> Self {
        Self::with_cluster_cache(pool, Arc::new(ClusterCache::new()), config)
    }

    /// Creates an engine sharing an existing cluster cache.
    pub fn with_cluster_cache(
        pool: Arc<dyn ConnectionPool>,
        cache: Arc<ClusterCache>,
        config: EngineConfig,
    ) -> Self {
        let clusters = ClusterStore::new(Arc::clone(&pool), cache);
        Self {
            pool,
            clusters,
            config,
        }
    }

    pub fn clusters(&self) -> &ClusterStore {
        &self.clusters
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn writer(&self) -> BatchWriter {
        BatchWriter::new(Arc::clone(&self.pool), self.config.batch_size)
    }

    /// Processes one event from `cluster`.
    ///
    /// Item failures are listed in the response. Only connectivity failures
    /// and failures of the bookkeeping queries return an error.
    pub async fn sync(&self, cluster: &str, event: SyncEvent) -> EngineResult<SyncResponse> {
        let start = Instant::now();
        let mut response = SyncResponse::new(event.request_id);

        self.clusters.ensure_cluster_node(cluster).await;

        if event.clear_all {
            resync::resync(self, cluster, &event, &mut response).await?;
        } else {
            self.apply_delta(cluster, &event, &mut response).await?;
        }

        let (resources, edges) = self.clusters.cluster_totals(cluster).await?;
        response.total_resources = resources;
        response.total_edges = edges;

        let elapsed = start.elapsed();
        if elapsed > Duration::from_millis(self.config.slow_log_ms) {
            warn!(
                cluster,
                request_id = event.request_id,
                clear_all = event.clear_all,
                resources = event.resource_count(),
                "slow sync took {elapsed:?}"
            );
        } else {
            debug!(cluster, request_id = event.request_id, "sync took {elapsed:?}");
        }
        Ok(response)
    }

    /// Applies a delta event: adds, updates and deletes as listed.
    pub async fn apply_delta(
        &self,
        cluster: &str,
        event: &SyncEvent,
        response: &mut SyncResponse,
    ) -> EngineResult<()> {
        let mut writer = self.writer();
        let queued = queue_delta(&mut writer, cluster, event);
        let report = writer.finish().await;
        report.errors.merge_into(response);

        queued?;
        if let Some(err) = report.conn_error {
            info!("completed sync of cluster {cluster} with errors");
            return Err(EngineError::Database(err));
        }

        response.set_operation_totals(
            event.add_resources.len(),
            event.update_resources.len(),
            event.delete_resources.len(),
            event.add_edges.len(),
            event.delete_edges.len(),
        );
        info!(
            cluster,
            errors = response.error_count(),
            "completed sync of cluster {cluster}"
        );
        Ok(())
    }
}

fn queue_delta(writer: &mut BatchWriter, cluster: &str, event: &SyncEvent) -> EngineResult<()> {
    for resource in &event.add_resources {
        let data = serde_json::to_string(&resource.properties)?;
        writer.queue(BatchItem::new(
            query::insert_resource(&resource.uid, cluster, &data),
            SyncAction::AddResource,
            &resource.uid,
        ))?;
    }

    for resource in &event.update_resources {
        let data = serde_json::to_string(&resource.properties)?;
        writer.queue(BatchItem::new(
            query::update_resource(&resource.uid, &data),
            SyncAction::UpdateResource,
            &resource.uid,
        ))?;
    }

    queue_deletes(writer, &event.delete_uids())?;

    for edge in &event.add_edges {
        writer.queue(BatchItem::new(
            query::insert_edge(edge, cluster),
            SyncAction::AddEdge,
            &edge.source_uid,
        ))?;
    }

    for edge in &event.delete_edges {
        writer.queue(BatchItem::new(
            query::delete_edge(&edge.source_uid, &edge.dest_uid, &edge.edge_type),
            SyncAction::DeleteEdge,
            &edge.source_uid,
        ))?;
    }
    Ok(())
}

/// Both coalesced deletes are attributed to every UID of the set.
fn queue_deletes(writer: &mut BatchWriter, uids: &[String]) -> DbResult<()> {
    if uids.is_empty() {
        return Ok(());
    }
    writer.queue(BatchItem::with_uids(
        query::delete_resources(uids),
        SyncAction::DeleteResource,
        uids.to_vec(),
    ))?;
    writer.queue(BatchItem::with_uids(
        query::delete_edges_touching(uids),
        SyncAction::DeleteResource,
        uids.to_vec(),
    ))
}
