//! Full resync: replace everything stored for a cluster with the incoming
//! state.
//!
//! 1. Upsert every incoming resource, then delete resources and edges of the
//!    cluster that reference anything not in the request.
//! 2. Insert incoming edges that are not stored yet and delete stored edges
//!    that are not in the request.

use crate::batch::{BatchItem, BatchWriter};
use crate::engine::SyncEngine;
use crate::error::{EngineError, EngineResult};
use indexer_db::query::{self, HUB_CLUSTER_PROPERTY};
use indexer_types::{cluster_uid, EdgeKey, SyncAction, SyncEvent, SyncResponse};
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub(crate) async fn resync(
    engine: &SyncEngine,
    cluster: &str,
    event: &SyncEvent,
    response: &mut SyncResponse,
) -> EngineResult<()> {
    info!("starting resync from {cluster}. This is normal, but it could be a problem if it happens often");

    reset_resources(engine, cluster, event, response).await?;
    let (edges_added, edges_deleted) = reset_edges(engine, cluster, event, response).await?;

    response.set_operation_totals(event.add_resources.len(), 0, 0, edges_added, edges_deleted);

    if event
        .add_resources
        .iter()
        .any(|r| r.has_property(HUB_CLUSTER_PROPERTY))
    {
        match engine.clusters.remove_stale_hub_clusters(cluster).await {
            Ok(removed) if !removed.is_empty() => {
                info!("removed data of previous hub cluster names: {removed:?}");
            }
            Ok(_) => debug!("no previous hub cluster names found"),
            Err(e) => error!("failed to clean up previous hub cluster names: {e}"),
        }
    }

    info!(
        cluster,
        added = response.total_added,
        edges_added = response.total_edges_added,
        edges_deleted = response.total_edges_deleted,
        "completed resync of cluster {cluster}"
    );
    Ok(())
}

async fn reset_resources(
    engine: &SyncEngine,
    cluster: &str,
    event: &SyncEvent,
    response: &mut SyncResponse,
) -> EngineResult<()> {
    let start = Instant::now();
    let mut writer = engine.writer();
    let queued = queue_resources(&mut writer, cluster, event);
    let report = writer.finish().await;
    report.errors.merge_into(response);

    queued?;
    if let Some(err) = report.conn_error {
        warn!("error resyncing resources for cluster {cluster}: {err}");
        return Err(EngineError::Database(err));
    }
    debug!("reset resources of {cluster} in {:?}", start.elapsed());
    Ok(())
}

fn queue_resources(writer: &mut BatchWriter, cluster: &str, event: &SyncEvent) -> EngineResult<()> {
    let mut keep = Vec::with_capacity(event.add_resources.len() + 1);
    for resource in &event.add_resources {
        let data = serde_json::to_string(&resource.properties)?;
        writer.queue(BatchItem::new(
            query::insert_resource(&resource.uid, cluster, &data),
            SyncAction::AddResource,
            &resource.uid,
        ))?;
        keep.push(resource.uid.clone());
    }

    // The pseudo-node is written by the indexer, not sent by the collector.
    let node_uid = cluster_uid(cluster);
    keep.push(node_uid.clone());

    writer.queue(BatchItem::new(
        query::delete_stale_resources(cluster, &keep),
        SyncAction::DeleteResource,
        &node_uid,
    ))?;
    writer.queue(BatchItem::new(
        query::delete_stale_edges(cluster, &keep),
        SyncAction::DeleteEdge,
        &node_uid,
    ))?;
    Ok(())
}

async fn reset_edges(
    engine: &SyncEngine,
    cluster: &str,
    event: &SyncEvent,
    response: &mut SyncResponse,
) -> EngineResult<(usize, usize)> {
    let start = Instant::now();
    let mut existing = BTreeSet::new();
    match engine.pool.query(&query::existing_edges(cluster)).await {
        Ok(rows) => {
            for row in &rows {
                match (row.get_str(0), row.get_str(1), row.get_str(2)) {
                    (Ok(source), Ok(edge_type), Ok(dest)) => {
                        existing.insert(EdgeKey {
                            source_uid: source.to_string(),
                            dest_uid: dest.to_string(),
                            edge_type: edge_type.to_string(),
                        });
                    }
                    _ => warn!("unreadable edge row for cluster {cluster}"),
                }
            }
        }
        Err(e) if e.is_connectivity() => return Err(e.into()),
        Err(e) => warn!("error reading existing edges of cluster {cluster}: {e}"),
    }
    debug!("read {} existing edges of {cluster} in {:?}", existing.len(), start.elapsed());

    let mut writer = engine.writer();
    let queued = queue_edges(&mut writer, cluster, event, existing);
    let report = writer.finish().await;
    report.errors.merge_into(response);

    let counts = queued?;
    if let Some(err) = report.conn_error {
        warn!("error resyncing edges for cluster {cluster}: {err}");
        return Err(EngineError::Database(err));
    }
    debug!(
        "reset edges of {cluster}: insert {} delete {} in {:?}",
        counts.0,
        counts.1,
        start.elapsed()
    );
    Ok(counts)
}

fn queue_edges(
    writer: &mut BatchWriter,
    cluster: &str,
    event: &SyncEvent,
    mut existing: BTreeSet<EdgeKey>,
) -> EngineResult<(usize, usize)> {
    let mut added = 0;
    let mut inserted = BTreeSet::new();
    for edge in &event.add_edges {
        let key = edge.key();
        if existing.remove(&key) || !inserted.insert(key) {
            continue;
        }
        writer.queue(BatchItem::new(
            query::insert_edge(edge, cluster),
            SyncAction::AddEdge,
            &edge.source_uid,
        ))?;
        added += 1;
    }

    let mut deleted = 0;
    for key in &existing {
        writer.queue(BatchItem::new(
            query::delete_edge(&key.source_uid, &key.dest_uid, &key.edge_type),
            SyncAction::DeleteEdge,
            &key.source_uid,
        ))?;
        deleted += 1;
    }
    Ok((added, deleted))
}
