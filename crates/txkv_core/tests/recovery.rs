//! Crash, resume and reclamation tests.
//!
//! Faults are injected between the manager and the store; a second manager
//! over the raw store plays the process that picks up the pieces.

use std::time::Duration;

use txkv_core::{is_applied, lock_owner, TransactionState, TxError};
use txkv_testkit::prelude::*;

const HOUR: Duration = Duration::from_secs(3_600);

fn counter(n: i64) -> Item {
    item([("Id", AttributeValue::s("c")), ("n", AttributeValue::n(n))])
}

#[tokio::test]
async fn lost_apply_response_is_not_applied_twice() {
    init_tracing();
    let env = TestEnv::with_faults();
    env.seed(ITEMS, [("Id", AttributeValue::s("c")), ("n", AttributeValue::n(10))])
        .await;

    // Update #0 on the item is the lock, #1 is the apply.
    env.faults()
        .arm(Fault::new(StoreOp::Update, ITEMS, FaultPoint::AfterApply).after(1));
    let tx = env.manager.new_transaction().await.unwrap();
    let err = tx.update_item(add(ITEMS, key("c"), "n", 1)).await.unwrap_err();
    assert!(matches!(err, TxError::Store(_)), "{err:?}");
    assert_eq!(env.faults().fired(), 1);

    let raw = env.raw(ITEMS, key("c")).await.unwrap();
    assert!(is_applied(&raw));

    // The same object redrives the request during commit.
    tx.commit().await.unwrap();
    assert_eq!(env.raw(ITEMS, key("c")).await, Some(counter(11)));
}

#[tokio::test]
async fn resumed_transaction_commits_without_reapplying() {
    let env = TestEnv::with_faults();
    env.seed(ITEMS, [("Id", AttributeValue::s("c")), ("n", AttributeValue::n(10))])
        .await;

    let tx = env.manager.new_transaction().await.unwrap();
    tx.update_item(add(ITEMS, key("c"), "n", 1)).await.unwrap();
    // Crash before the record moves to committed.
    env.faults()
        .arm(Fault::new(StoreOp::Update, "Transactions", FaultPoint::BeforeApply));
    assert!(tx.commit().await.is_err());

    let other = env.clean_manager();
    let resumed = other.resume_transaction(tx.id()).await.unwrap();
    assert_eq!(resumed.record().await.state(), TransactionState::Pending);
    resumed.commit().await.unwrap();
    resumed.commit().await.unwrap();

    assert_eq!(env.raw(ITEMS, key("c")).await, Some(counter(11)));
    assert_eq!(env.image_count(), 0);
}

#[tokio::test]
async fn crash_after_commit_point_is_finished_by_resume() {
    let env = TestEnv::with_faults();
    env.seed(ITEMS, [("Id", "a"), ("v", "old")]).await;

    let tx = env.manager.new_transaction().await.unwrap();
    tx.put_item(put(ITEMS, [("Id", "a"), ("v", "new")]))
        .await
        .unwrap();
    // The record flips to committed; unlocking the item then fails.
    env.faults()
        .arm(Fault::new(StoreOp::Update, ITEMS, FaultPoint::BeforeApply));
    assert!(tx.commit().await.is_err());

    let raw = env.raw(ITEMS, key("a")).await.unwrap();
    assert_eq!(lock_owner(&raw), Some(tx.id()));

    // Readers already see the committed value.
    let read = env
        .clean_manager()
        .get_item(get(ITEMS, key("a")), txkv_core::IsolationLevel::ReadCommitted)
        .await
        .unwrap();
    assert_eq!(read, Some(item([("Id", "a"), ("v", "new")])));

    let resumed = env.clean_manager().resume_transaction(tx.id()).await.unwrap();
    let err = resumed.rollback().await.unwrap_err();
    assert!(matches!(err, TxError::TransactionCommitted { .. }), "{err:?}");
    assert_eq!(
        env.raw(ITEMS, key("a")).await,
        Some(item([("Id", "a"), ("v", "new")]))
    );
    assert!(resumed.record().await.is_finalized());
}

#[tokio::test]
async fn crash_after_lock_is_rolled_back_by_other_process() {
    let env = TestEnv::with_faults();
    env.seed(ITEMS, [("Id", "a"), ("v", "old")]).await;

    // Locked and imaged, the apply never happens.
    env.faults()
        .arm(Fault::new(StoreOp::Put, ITEMS, FaultPoint::BeforeApply));
    let tx = env.manager.new_transaction().await.unwrap();
    assert!(tx
        .put_item(put(ITEMS, [("Id", "a"), ("v", "new")]))
        .await
        .is_err());
    let raw = env.raw(ITEMS, key("a")).await.unwrap();
    assert_eq!(lock_owner(&raw), Some(tx.id()));
    assert!(!is_applied(&raw));

    let resumed = env.clean_manager().resume_transaction(tx.id()).await.unwrap();
    resumed.rollback().await.unwrap();
    assert_eq!(
        env.raw(ITEMS, key("a")).await,
        Some(item([("Id", "a"), ("v", "old")]))
    );

    let err = tx.commit().await.unwrap_err();
    assert!(matches!(err, TxError::TransactionRolledBack { .. }), "{err:?}");
}

#[tokio::test]
async fn vanished_record_releases_lock_and_image() {
    let env = TestEnv::with_faults();
    env.seed(ITEMS, [("Id", "a"), ("v", "old")]).await;
    let tx = env.manager.new_transaction().await.unwrap();

    // The re-read after locking and imaging finds no record.
    env.faults()
        .arm(Fault::new(StoreOp::Get, "Transactions", FaultPoint::Missing));
    let err = tx
        .put_item(put(ITEMS, [("Id", "a"), ("v", "new")]))
        .await
        .unwrap_err();
    assert!(matches!(err, TxError::TransactionNotFound { .. }), "{err:?}");
    assert_eq!(env.faults().fired(), 1);

    assert_eq!(
        env.raw(ITEMS, key("a")).await,
        Some(item([("Id", "a"), ("v", "old")]))
    );
    assert_eq!(env.image_count(), 0);
}

#[tokio::test]
async fn abandoned_lock_is_broken_by_next_writer() {
    let env = TestEnv::new();
    env.seed(ITEMS, [("Id", "a"), ("v", "old")]).await;

    let abandoned = env.manager.new_transaction().await.unwrap();
    abandoned
        .put_item(put(ITEMS, [("Id", "a"), ("v", "never")]))
        .await
        .unwrap();

    let tx = env.clean_manager().new_transaction().await.unwrap();
    let old = tx
        .update_item(
            set(ITEMS, key("a"), "v", "next")
                .with_return_values(txkv_storage::ReturnValue::AllOld),
        )
        .await
        .unwrap();
    assert_eq!(old, Some(item([("Id", "a"), ("v", "old")])));
    tx.commit().await.unwrap();

    assert_eq!(
        env.raw(ITEMS, key("a")).await,
        Some(item([("Id", "a"), ("v", "next")]))
    );
    assert_eq!(
        abandoned.record().await.state(),
        TransactionState::Pending,
        "the local copy is stale until reloaded"
    );
    let err = abandoned.commit().await.unwrap_err();
    assert!(matches!(err, TxError::TransactionRolledBack { .. }), "{err:?}");
}

#[tokio::test]
async fn sweep_rolls_back_then_deletes_stale_transactions() {
    let env = TestEnv::new();
    env.seed(ITEMS, [("Id", "a"), ("v", "old")]).await;
    let tx = env.manager.new_transaction().await.unwrap();
    tx.put_item(put(ITEMS, [("Id", "a"), ("v", "new")]))
        .await
        .unwrap();

    // Not stale yet.
    assert!(!env.manager.sweep_transaction(tx.id(), HOUR, HOUR).await.unwrap());
    assert_eq!(tx.record().await.state(), TransactionState::Pending);

    assert!(!env
        .manager
        .sweep_transaction(tx.id(), Duration::ZERO, HOUR)
        .await
        .unwrap());
    assert_eq!(
        env.raw(ITEMS, key("a")).await,
        Some(item([("Id", "a"), ("v", "old")]))
    );
    assert_eq!(env.record_count(), 1);

    assert!(env
        .manager
        .sweep_transaction(tx.id(), Duration::ZERO, Duration::ZERO)
        .await
        .unwrap());
    assert_eq!(env.record_count(), 0);
    assert!(env
        .manager
        .sweep_transaction(tx.id(), Duration::ZERO, Duration::ZERO)
        .await
        .unwrap());
}

#[tokio::test]
async fn sweep_completes_a_committed_transaction() {
    let env = TestEnv::with_faults();
    let tx = env.manager.new_transaction().await.unwrap();
    tx.put_item(put(ITEMS, [("Id", "a")])).await.unwrap();
    env.faults()
        .arm(Fault::new(StoreOp::Update, ITEMS, FaultPoint::BeforeApply));
    assert!(tx.commit().await.is_err());

    let other = env.clean_manager();
    assert!(!other.sweep_transaction(tx.id(), HOUR, HOUR).await.unwrap());
    assert_eq!(env.raw(ITEMS, key("a")).await, Some(key("a")));
    let record = other.resume_transaction(tx.id()).await.unwrap().record().await;
    assert_eq!(record.state(), TransactionState::Committed);
    assert!(record.is_finalized());
}

#[tokio::test]
async fn sweep_finishes_and_deletes_in_one_pass() {
    let env = TestEnv::with_faults();
    let tx = env.manager.new_transaction().await.unwrap();
    tx.put_item(put(ITEMS, [("Id", "a")])).await.unwrap();
    env.faults()
        .arm(Fault::new(StoreOp::Update, ITEMS, FaultPoint::BeforeApply));
    assert!(tx.commit().await.is_err());

    let other = env.clean_manager();
    assert!(other
        .sweep_transaction(tx.id(), Duration::ZERO, Duration::ZERO)
        .await
        .unwrap());
    assert_eq!(env.raw(ITEMS, key("a")).await, Some(key("a")));
    assert_eq!(env.record_count(), 0);
    assert_eq!(env.image_count(), 0);
}

#[tokio::test]
async fn delete_requires_a_finished_transaction() {
    let env = TestEnv::new();
    let tx = env.manager.new_transaction().await.unwrap();
    tx.put_item(put(ITEMS, [("Id", "a")])).await.unwrap();

    let err = tx.delete(None).await.unwrap_err();
    assert!(matches!(err, TxError::Transaction { .. }), "{err:?}");

    tx.commit().await.unwrap();
    assert!(!tx.delete(Some(HOUR)).await.unwrap());
    assert_eq!(env.record_count(), 1);
    assert!(tx.delete(None).await.unwrap());
    assert_eq!(env.record_count(), 0);
    assert!(tx.delete(None).await.unwrap());

    let err = env.manager.resume_transaction(tx.id()).await.unwrap_err();
    assert!(matches!(err, TxError::TransactionNotFound { .. }), "{err:?}");
}
