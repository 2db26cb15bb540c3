use indexer_db::mock::MockPool;
use indexer_db::{DbError, Statement};
use indexer_sync::{BatchItem, BatchWriter};
use indexer_types::{SyncAction, SyncResponse, ITEM_ERROR_MESSAGE};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

fn item(uid: &str) -> BatchItem {
    BatchItem::new(
        Statement::new("INSERT INTO t (uid) VALUES (?1)", vec![uid.into()]),
        SyncAction::AddResource,
        uid,
    )
}

fn uids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("item-{i}")).collect()
}

/// UIDs of committed items, in commit order.
fn committed_uids(pool: &MockPool) -> Vec<String> {
    let mut out = Vec::new();
    for group in pool.committed() {
        for statement in group {
            if let Some(indexer_db::SqlValue::Text(uid)) = statement.args.first() {
                out.push(uid.clone());
            }
        }
    }
    out
}

async fn write_all(pool: &Arc<MockPool>, batch_size: usize, items: &[String]) -> SyncResponse {
    let mut writer = BatchWriter::new(pool.clone(), batch_size);
    for uid in items {
        writer.queue(item(uid)).unwrap();
    }
    let report = writer.finish().await;
    assert!(report.conn_error.is_none());
    let mut response = SyncResponse::new(0);
    report.errors.merge_into(&mut response);
    response
}

// ── Dispatch ─────────────────────────────────────────────────────

#[tokio::test]
async fn units_are_cut_at_batch_size() {
    let pool = Arc::new(MockPool::new());
    let response = write_all(&pool, 2, &uids(5)).await;

    let mut sizes: Vec<usize> = pool.groups().iter().map(Vec::len).collect();
    sizes.sort();
    assert_eq!(sizes, vec![1, 2, 2]);
    assert_eq!(response.error_count(), 0);
}

#[tokio::test]
async fn queue_dispatches_full_units_before_flush() {
    let pool = Arc::new(MockPool::new());
    let mut writer = BatchWriter::new(pool.clone(), 3);
    for uid in uids(4) {
        writer.queue(item(&uid)).unwrap();
    }
    assert_eq!(writer.pending(), 1);

    writer.join().await;
    assert_eq!(pool.groups().len(), 1);

    let report = writer.finish().await;
    assert!(report.errors.is_empty());
    assert_eq!(pool.groups().len(), 2);
}

#[tokio::test]
async fn finish_without_items_sends_nothing() {
    let pool = Arc::new(MockPool::new());
    let report = BatchWriter::new(pool.clone(), 10).finish().await;
    assert!(report.errors.is_empty());
    assert!(pool.groups().is_empty());
}

// ── Isolation ────────────────────────────────────────────────────

#[tokio::test]
async fn single_failing_item_is_recorded_once() {
    let pool = Arc::new(MockPool::new());
    pool.poison("item-0");

    let response = write_all(&pool, 1, &uids(1)).await;

    assert_eq!(response.add_errors.len(), 1);
    assert_eq!(response.add_errors[0].resource_uid, "item-0");
    assert_eq!(response.add_errors[0].message, ITEM_ERROR_MESSAGE);
    assert_eq!(response.error_count(), 1);
    assert_eq!(pool.groups().len(), 1);
}

#[tokio::test]
async fn bisection_isolates_one_bad_item() {
    let pool = Arc::new(MockPool::new());
    pool.poison("item-5");
    let items = uids(8);

    let response = write_all(&pool, 8, &items).await;

    assert_eq!(response.add_errors.len(), 1);
    assert_eq!(response.add_errors[0].resource_uid, "item-5");

    let expected: Vec<String> = items.into_iter().filter(|u| u != "item-5").collect();
    assert_eq!(committed_uids(&pool), expected);

    // 8 -> [0..4] ok, [4..8] -> [4,5] -> [4] ok, [5] fails; then [6,7] ok
    let sizes: Vec<usize> = pool.groups().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![8, 4, 4, 2, 1, 1, 2]);
}

#[tokio::test]
async fn left_half_commits_before_right_half() {
    let pool = Arc::new(MockPool::new());
    pool.poison("item-0");

    write_all(&pool, 4, &uids(4)).await;

    assert_eq!(committed_uids(&pool), vec!["item-1", "item-2", "item-3"]);
    let sizes: Vec<usize> = pool.groups().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![4, 2, 1, 1, 2]);
}

#[tokio::test]
async fn merge_skips_uids_already_listed_as_delete_errors() {
    let pool = Arc::new(MockPool::new());
    pool.poison("x");
    let mut response = SyncResponse::new(0);

    for _ in 0..2 {
        let mut writer = BatchWriter::new(pool.clone(), 10);
        writer
            .queue(BatchItem::new(
                Statement::new("DELETE FROM resources WHERE uid = ?1", vec!["x".into()]),
                SyncAction::DeleteResource,
                "x",
            ))
            .unwrap();
        writer.finish().await.errors.merge_into(&mut response);
    }

    assert_eq!(response.delete_errors.len(), 1);
    assert_eq!(response.delete_errors[0].resource_uid, "x");
}

#[tokio::test]
async fn errors_land_in_the_item_category() {
    let pool = Arc::new(MockPool::new());
    pool.poison("bad");
    let mut writer = BatchWriter::new(pool.clone(), 10);
    writer.queue(item("ok")).unwrap();
    writer
        .queue(BatchItem::new(
            Statement::new("DELETE FROM edges WHERE sourceid = ?1", vec!["bad".into()]),
            SyncAction::DeleteEdge,
            "bad",
        ))
        .unwrap();

    let mut response = SyncResponse::new(0);
    writer.finish().await.errors.merge_into(&mut response);

    assert!(response.add_errors.is_empty());
    assert_eq!(response.delete_edge_errors.len(), 1);
    assert_eq!(response.delete_edge_errors[0].resource_uid, "bad");
}

#[tokio::test]
async fn multi_uid_items_blame_each_uid_once() {
    let pool = Arc::new(MockPool::new());
    pool.poison("b");
    let set = vec!["a".to_string(), "b".to_string()];
    let mut writer = BatchWriter::new(pool.clone(), 10);
    for sql in ["DELETE FROM resources", "DELETE FROM edges"] {
        writer
            .queue(BatchItem::with_uids(
                Statement::new(sql, vec![serde_json::json!(set).to_string().into()]),
                SyncAction::DeleteResource,
                set.clone(),
            ))
            .unwrap();
    }

    let mut response = SyncResponse::new(0);
    writer.finish().await.errors.merge_into(&mut response);

    let blamed: Vec<&str> = response
        .delete_errors
        .iter()
        .map(|e| e.resource_uid.as_str())
        .collect();
    assert_eq!(blamed, vec!["a", "b"]);
}

// ── Connectivity ─────────────────────────────────────────────────

#[tokio::test]
async fn connectivity_failure_fails_later_queueing() {
    let pool = Arc::new(MockPool::new());
    pool.set_offline(true);
    let mut writer = BatchWriter::new(pool.clone(), 1);

    writer.queue(item("item-0")).unwrap();
    writer.join().await;

    let err = writer.queue(item("item-1")).unwrap_err();
    assert!(matches!(err, DbError::Connectivity(_)));
    assert_eq!(writer.pending(), 0);

    let report = writer.finish().await;
    assert!(report.conn_error.unwrap().is_connectivity());
    // No bisection and no item errors for an unreachable store.
    assert!(report.errors.is_empty());
    assert_eq!(pool.groups().len(), 1);
}

// ── Property ─────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn bisection_isolates_exactly_the_bad_items(
        n in 1usize..40,
        batch_size in 1usize..16,
        bad in proptest::collection::btree_set(0usize..40, 0..5),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let items = uids(n);
        let bad: BTreeSet<String> = bad.into_iter().filter(|i| *i < n).map(|i| format!("item-{i}")).collect();

        let pool = Arc::new(MockPool::new());
        for uid in &bad {
            pool.poison(uid.clone());
        }
        let response = rt.block_on(write_all(&pool, batch_size, &items));

        let failed: BTreeSet<String> = response.add_errors.iter().map(|e| e.resource_uid.clone()).collect();
        prop_assert_eq!(response.add_errors.len(), bad.len());
        prop_assert_eq!(&failed, &bad);

        // Units run concurrently, so only the set of committed items is fixed.
        let committed = committed_uids(&pool);
        let good: BTreeSet<String> = items.into_iter().filter(|u| !bad.contains(u)).collect();
        prop_assert_eq!(committed.len(), good.len());
        prop_assert_eq!(committed.into_iter().collect::<BTreeSet<_>>(), good);
    }
}
