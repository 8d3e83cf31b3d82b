//! Isolation level tests for reads outside a transaction.

use txkv_core::{IsolationLevel, TxError};
use txkv_storage::{
    BatchGetItemRequest, Condition, KeysAndAttributes, QueryRequest, ScanRequest,
};
use txkv_testkit::prelude::*;

/// Items `a` (committed), `b` (overwritten by the pending transaction),
/// `c` (read-locked, never existed), `d` (deleted by it) and `e` (inserted
/// by it).
async fn mixed_table(env: &TestEnv) -> txkv_core::Transaction {
    env.seed(ITEMS, [("Id", "a"), ("v", "1")]).await;
    env.seed(ITEMS, [("Id", "b"), ("v", "1")]).await;
    env.seed(ITEMS, [("Id", "d"), ("v", "1")]).await;

    let tx = env.manager.new_transaction().await.unwrap();
    tx.put_item(put(ITEMS, [("Id", "b"), ("v", "2")]))
        .await
        .unwrap();
    tx.get_item(get(ITEMS, key("c"))).await.unwrap();
    tx.delete_item(delete(ITEMS, key("d"))).await.unwrap();
    tx.put_item(put(ITEMS, [("Id", "e"), ("v", "2")]))
        .await
        .unwrap();
    tx
}

fn ids(items: &[Item]) -> Vec<&str> {
    items
        .iter()
        .filter_map(|i| i.get("Id").and_then(AttributeValue::as_s))
        .collect()
}

#[tokio::test]
async fn uncommitted_sees_applied_writes() {
    let env = TestEnv::new();
    let _tx = mixed_table(&env).await;
    let reader = env.manager.isolated_reader(IsolationLevel::ReadUncommitted);

    assert_eq!(
        reader.get_item(get(ITEMS, key("b"))).await.unwrap(),
        Some(item([("Id", "b"), ("v", "2")]))
    );
    assert_eq!(reader.get_item(get(ITEMS, key("c"))).await.unwrap(), None);
    assert_eq!(
        reader.get_item(get(ITEMS, key("d"))).await.unwrap(),
        Some(item([("Id", "d"), ("v", "1")]))
    );
    assert_eq!(
        reader.get_item(get(ITEMS, key("e"))).await.unwrap(),
        Some(item([("Id", "e"), ("v", "2")]))
    );

    let scanned = reader.scan(ScanRequest::new(ITEMS)).await.unwrap();
    assert_eq!(ids(&scanned.items), vec!["a", "b", "d", "e"]);
}

#[tokio::test]
async fn committed_sees_old_images_until_commit() {
    let env = TestEnv::new();
    let tx = mixed_table(&env).await;
    let reader = env.manager.isolated_reader(IsolationLevel::ReadCommitted);

    let scanned = reader.scan(ScanRequest::new(ITEMS)).await.unwrap();
    assert_eq!(
        scanned.items,
        vec![
            item([("Id", "a"), ("v", "1")]),
            item([("Id", "b"), ("v", "1")]),
            item([("Id", "d"), ("v", "1")]),
        ]
    );

    tx.commit().await.unwrap();
    let scanned = reader.scan(ScanRequest::new(ITEMS)).await.unwrap();
    assert_eq!(
        scanned.items,
        vec![
            item([("Id", "a"), ("v", "1")]),
            item([("Id", "b"), ("v", "2")]),
            item([("Id", "e"), ("v", "2")]),
        ]
    );
}

#[tokio::test]
async fn projections_are_honoured_and_shadow_attributes_hidden() {
    let env = TestEnv::new();
    let _tx = mixed_table(&env).await;
    let reader = env.manager.isolated_reader(IsolationLevel::ReadCommitted);

    let read = reader
        .get_item(get(ITEMS, key("b")).with_attributes_to_get(["v"]))
        .await
        .unwrap();
    assert_eq!(read, Some(item([("v", "1")])));

    let mut scan = ScanRequest::new(ITEMS);
    scan.attributes_to_get = Some(vec!["Id".to_string()]);
    let scanned = reader.scan(scan).await.unwrap();
    assert!(scanned.items.iter().all(|i| i.len() == 1 && i.contains_key("Id")));
}

#[tokio::test]
async fn batch_get_and_query_filter_per_item() {
    let env = TestEnv::new();
    let _tx = mixed_table(&env).await;
    env.seed(RANGE_ITEMS, [("Id", "p"), ("Sort", "1")]).await;
    let writer = env.manager.new_transaction().await.unwrap();
    writer
        .put_item(put(RANGE_ITEMS, [("Id", "p"), ("Sort", "2")]))
        .await
        .unwrap();

    let reader = env.manager.isolated_reader(IsolationLevel::ReadCommitted);
    let mut batch = BatchGetItemRequest::default();
    batch.request_items.insert(
        ITEMS.to_string(),
        KeysAndAttributes {
            keys: vec![key("a"), key("b"), key("c"), key("missing")],
            ..Default::default()
        },
    );
    let out = reader.batch_get_item(batch).await.unwrap();
    let mut found = out.responses[ITEMS].clone();
    found.sort();
    assert_eq!(
        found,
        vec![item([("Id", "a"), ("v", "1")]), item([("Id", "b"), ("v", "1")])]
    );

    let query = QueryRequest::new(RANGE_ITEMS).with_condition("Id", Condition::eq("p"));
    let out = reader.query(query.clone()).await.unwrap();
    assert_eq!(out.items, vec![item([("Id", "p"), ("Sort", "1")])]);

    let dirty = env.manager.isolated_reader(IsolationLevel::ReadUncommitted);
    assert_eq!(dirty.query(query).await.unwrap().items.len(), 2);
}

#[tokio::test]
async fn committed_read_follows_a_transaction_that_finishes() {
    let env = TestEnv::new();
    env.seed(ITEMS, [("Id", "a"), ("v", "1")]).await;
    let tx = env.manager.new_transaction().await.unwrap();
    tx.put_item(put(ITEMS, [("Id", "a"), ("v", "2")]))
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    assert_eq!(
        env.manager
            .get_item(get(ITEMS, key("a")), IsolationLevel::ReadCommitted)
            .await
            .unwrap(),
        Some(item([("Id", "a"), ("v", "1")]))
    );
}

#[tokio::test]
async fn committed_read_without_image_gives_up() {
    let env = TestEnv::with_config(txkv_core::TransactionConfig::default().read_committed_retries(0));
    env.seed(ITEMS, [("Id", "a"), ("v", "1")]).await;
    let tx = env.manager.new_transaction().await.unwrap();
    tx.put_item(put(ITEMS, [("Id", "a"), ("v", "2")]))
        .await
        .unwrap();

    // Lose the image behind the pending transaction's back.
    assert_eq!(env.image_count(), 1);
    env.store.delete_table("TransactionImages").unwrap();
    env.store
        .create_table("TransactionImages", txkv_core::item_image_table_schema())
        .unwrap();

    let err = env
        .manager
        .get_item(get(ITEMS, key("a")), IsolationLevel::ReadCommitted)
        .await
        .unwrap_err();
    assert!(matches!(err, TxError::Transaction { .. }), "{err:?}");
}
