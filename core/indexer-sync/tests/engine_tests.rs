use indexer_db::mock::MockPool;
use indexer_db::{query, ConnectionPool, SqlitePool, Statement};
use indexer_sync::{EngineConfig, EngineError, SyncEngine};
use indexer_types::{DeleteResourceEvent, Edge, Resource, SyncEvent};
use pretty_assertions::assert_eq;
use std::sync::Arc;

const CLUSTER: &str = "managed-1";

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn pod(uid: &str) -> Resource {
    Resource::new("Pod", uid)
        .with_property("kind", "Pod")
        .with_property("name", uid)
}

fn config(batch_size: usize) -> EngineConfig {
    EngineConfig {
        batch_size,
        ..Default::default()
    }
}

/// 2 adds, 1 update, 1 delete, 1 edge add, 1 edge delete.
fn mixed_event() -> SyncEvent {
    SyncEvent {
        add_resources: vec![pod("a1"), pod("a2")],
        update_resources: vec![pod("u1").with_property("restarts", 3)],
        delete_resources: vec![DeleteResourceEvent::new("d1")],
        add_edges: vec![Edge::new("a1", "Pod", "to", "a2", "Pod")],
        delete_edges: vec![Edge::new("u1", "Pod", "to", "x", "Pod")],
        request_id: 17,
        ..Default::default()
    }
}

async fn seeded_sqlite() -> Arc<SqlitePool> {
    let pool = Arc::new(SqlitePool::open_in_memory().unwrap());
    for uid in ["u1", "d1", "x"] {
        pool.execute(&query::insert_resource(uid, CLUSTER, r#"{"kind":"Pod"}"#))
            .await
            .unwrap();
    }
    for (s, d) in [("u1", "x"), ("d1", "x")] {
        pool.execute(&query::insert_edge(&Edge::new(s, "Pod", "to", d, "Pod"), CLUSTER))
            .await
            .unwrap();
    }
    pool
}

async fn count(pool: &SqlitePool, sql: &str) -> i64 {
    let rows = pool.query(&Statement::new(sql, Vec::new())).await.unwrap();
    rows[0].get_i64(0).unwrap()
}

// ── Delta ────────────────────────────────────────────────────────

#[tokio::test]
async fn delta_all_succeeding() {
    init_tracing();
    let pool = seeded_sqlite().await;
    let engine = SyncEngine::new(pool.clone(), EngineConfig::default());

    let response = engine.sync(CLUSTER, mixed_event()).await.unwrap();

    assert_eq!(response.request_id, 17);
    assert_eq!(response.total_added, 2);
    assert_eq!(response.total_updated, 1);
    assert_eq!(response.total_deleted, 1);
    assert_eq!(response.total_edges_added, 1);
    assert_eq!(response.total_edges_deleted, 1);
    assert_eq!(response.error_count(), 0);

    // pseudo-node, a1, a2, u1, x
    assert_eq!(response.total_resources, 5);
    // d1 -> x went with d1, u1 -> x was deleted
    assert_eq!(response.total_edges, 1);

    let rows = pool.query(&query::select_resource("u1")).await.unwrap();
    assert_eq!(
        rows[0].get_str(1).unwrap(),
        r#"{"kind":"Pod","name":"u1","restarts":3}"#
    );
    assert_eq!(count(&pool, "SELECT count(*) FROM resources WHERE uid = 'd1'").await, 0);
}

#[tokio::test]
async fn delta_all_failing() {
    let pool = Arc::new(MockPool::new());
    pool.fail_all(true);
    let engine = SyncEngine::new(pool.clone(), config(10));

    let response = engine.sync(CLUSTER, mixed_event()).await.unwrap();

    assert_eq!(response.add_errors.len(), 2);
    assert_eq!(response.update_errors.len(), 1);
    assert_eq!(response.delete_errors.len(), 1);
    assert_eq!(response.delete_errors[0].resource_uid, "d1");
    assert_eq!(response.add_edge_errors.len(), 1);
    assert_eq!(response.add_edge_errors[0].resource_uid, "a1");
    assert_eq!(response.delete_edge_errors.len(), 1);
    assert_eq!(response.delete_edge_errors[0].resource_uid, "u1");

    assert_eq!(response.total_added, 0);
    assert_eq!(response.total_updated, 0);
    assert_eq!(response.total_deleted, 0);
    assert_eq!(response.total_edges_added, 0);
    assert_eq!(response.total_edges_deleted, 0);
}

#[tokio::test]
async fn one_bad_resource_only_affects_its_category() {
    let pool = Arc::new(MockPool::new());
    pool.poison("a2");
    let engine = SyncEngine::new(pool.clone(), config(4));

    let response = engine.sync(CLUSTER, mixed_event()).await.unwrap();

    assert_eq!(response.add_errors.len(), 1);
    assert_eq!(response.add_errors[0].resource_uid, "a2");
    assert_eq!(response.total_added, 1);
    assert_eq!(response.total_updated, 1);
    assert_eq!(response.total_deleted, 1);
    assert_eq!(response.total_edges_added, 0);
    assert_eq!(response.add_edge_errors.len(), 1);
}

#[tokio::test]
async fn duplicate_edge_add_is_not_an_error() {
    let pool = seeded_sqlite().await;
    let engine = SyncEngine::new(pool.clone(), EngineConfig::default());
    let event = SyncEvent {
        add_edges: vec![Edge::new("u1", "Pod", "to", "x", "Pod")],
        ..Default::default()
    };

    let response = engine.sync(CLUSTER, event).await.unwrap();

    assert_eq!(response.total_edges_added, 1);
    assert!(response.add_edge_errors.is_empty());
    assert_eq!(count(&pool, "SELECT count(*) FROM edges WHERE sourceid = 'u1'").await, 1);
}

#[tokio::test]
async fn delete_set_cascades_to_edges() {
    let pool = seeded_sqlite().await;
    let engine = SyncEngine::new(pool.clone(), EngineConfig::default());
    let event = SyncEvent {
        delete_resources: vec![DeleteResourceEvent::new("x"), DeleteResourceEvent::new("d1")],
        ..Default::default()
    };

    let response = engine.sync(CLUSTER, event).await.unwrap();

    assert_eq!(response.total_deleted, 2);
    assert_eq!(count(&pool, "SELECT count(*) FROM edges").await, 0);
    assert_eq!(response.total_edges, 0);
}

#[tokio::test]
async fn store_offline_fails_the_request() {
    let pool = Arc::new(MockPool::new());
    pool.set_offline(true);
    let engine = SyncEngine::new(pool.clone(), config(1));

    let err = engine.sync(CLUSTER, mixed_event()).await.unwrap_err();

    match err {
        EngineError::Database(db) => assert!(db.is_connectivity()),
        other => panic!("unexpected error: {other}"),
    }
    // The first unit saw the outage; nothing else was sent.
    assert_eq!(pool.groups().len(), 1);
}

// ── Pseudo-node ──────────────────────────────────────────────────

#[tokio::test]
async fn first_update_creates_cluster_node() {
    let pool = Arc::new(SqlitePool::open_in_memory().unwrap());
    let engine = SyncEngine::new(pool.clone(), EngineConfig::default());

    let response = engine.sync(CLUSTER, SyncEvent::default()).await.unwrap();

    assert_eq!(response.total_resources, 1);
    let rows = pool.query(&query::select_resource("cluster__managed-1")).await.unwrap();
    assert_eq!(
        rows[0].get_str(1).unwrap(),
        r#"{"kind":"Cluster","name":"managed-1"}"#
    );
    assert!(engine.clusters().cache().contains("cluster__managed-1"));
}

#[tokio::test]
async fn cluster_node_lookup_is_cached() {
    let pool = Arc::new(MockPool::new());
    let engine = SyncEngine::new(pool.clone(), EngineConfig::default());

    engine.sync(CLUSTER, SyncEvent::default()).await.unwrap();
    engine.sync(CLUSTER, SyncEvent::default()).await.unwrap();

    let lookups = pool
        .queries()
        .iter()
        .filter(|q| q.sql == query::select_resource("cluster__managed-1").sql)
        .count();
    assert_eq!(lookups, 1);
    assert_eq!(pool.executed().len(), 1);
}
