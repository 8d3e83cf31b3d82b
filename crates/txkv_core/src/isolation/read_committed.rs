//! Read-committed isolation.

use async_trait::async_trait;
use tracing::debug;
use txkv_codec::Item;
use txkv_storage::GetItemRequest;

use super::ReadIsolationHandler;
use crate::attributes::{
    filter_attributes, is_applied, is_transient, lock_owner, ImmutableKey, TransactionState,
};
use crate::error::{TxError, TxResult};
use crate::manager::TransactionManager;
use crate::transaction::TransactionRecord;

/// Returns the last committed value of an item.
///
/// An applied but uncommitted write is replaced by the old item image the
/// writer saved. If the image has vanished, the writer finished in the
/// meantime, so the item is read again and re-judged, a bounded number of
/// times.
#[derive(Debug, Clone)]
pub struct ReadCommittedHandler {
    manager: TransactionManager,
}

impl ReadCommittedHandler {
    /// Creates a handler reading through `manager`.
    pub fn new(manager: TransactionManager) -> Self {
        Self { manager }
    }

    async fn committed_view(&self, item: Item, table_name: &str) -> TxResult<Option<Item>> {
        let Some(owner) = lock_owner(&item).map(str::to_string) else {
            return Ok(Some(item));
        };
        if is_transient(&item) {
            return Ok(None);
        }
        if !is_applied(&item) {
            return Ok(Some(item));
        }

        let record = TransactionRecord::load(&self.manager, &owner).await?;
        if record.state() == TransactionState::Committed {
            return Ok(Some(item));
        }

        let key = self.manager.key_from_item(table_name, &item).await?;
        let ikey = ImmutableKey::new(table_name, key);
        let rid = record
            .request_for(&ikey)
            .and_then(|request| request.rid())
            .ok_or_else(|| {
                TxError::assertion(
                    &owner,
                    format!("item {:?} is applied but its transaction has no request for it", ikey.key),
                )
            })?;
        record
            .load_item_image(&self.manager, rid)
            .await?
            .map(Some)
            .ok_or_else(|| TxError::unknown_completed(&owner, "old item image is gone"))
    }

    async fn reread(&self, item: &Item, table_name: &str) -> TxResult<Option<Item>> {
        let key = self.manager.key_from_item(table_name, item).await?;
        let get = GetItemRequest::new(table_name, key).with_consistent_read(true);
        Ok(self.manager.store().get_item(get).await?)
    }
}

#[async_trait]
impl ReadIsolationHandler for ReadCommittedHandler {
    async fn handle_item(
        &self,
        item: Option<Item>,
        attributes_to_get: Option<&[String]>,
        table_name: &str,
    ) -> TxResult<Option<Item>> {
        let retries = self.manager.config().read_committed_retries;
        let mut current = item;
        let mut owner = String::new();
        for attempt in 0..=retries {
            let Some(item) = current.take() else {
                return Ok(None);
            };
            owner = lock_owner(&item).unwrap_or_default().to_string();
            match self.committed_view(item.clone(), table_name).await {
                Ok(visible) => {
                    return Ok(visible.map(|item| filter_attributes(item, attributes_to_get)))
                }
                Err(
                    TxError::UnknownCompletedTransaction { .. }
                    | TxError::TransactionNotFound { .. },
                ) => {
                    debug!(tx_id = %owner, attempt, "locking transaction completed during read, re-reading item");
                    if attempt < retries {
                        current = self.reread(&item, table_name).await?;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(TxError::transaction(
            owner,
            "ran out of attempts to read a committed version of the item",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransactionConfig;
    use std::sync::Arc;
    use txkv_codec::item;
    use txkv_storage::{InMemoryStore, KeySchema};

    fn handler() -> ReadCommittedHandler {
        let store = InMemoryStore::new();
        store
            .create_table("Transactions", TransactionManager::transaction_table_schema())
            .unwrap();
        store
            .create_table("TransactionImages", TransactionManager::item_image_table_schema())
            .unwrap();
        store.create_table("T", KeySchema::hash("Id")).unwrap();
        ReadCommittedHandler::new(TransactionManager::new(
            Arc::new(store),
            TransactionConfig::default(),
        ))
    }

    #[tokio::test]
    async fn unlocked_item_passes_through() {
        let it = item([("Id", "a"), ("v", "1")]);
        let out = handler().handle_item(Some(it.clone()), None, "T").await.unwrap();
        assert_eq!(out, Some(it));
    }

    #[tokio::test]
    async fn transient_item_is_hidden() {
        let it = item([("Id", "a"), ("_TxId", "t"), ("_TxT", "1"), ("_TxA", "1")]);
        let out = handler().handle_item(Some(it), None, "T").await.unwrap();
        assert_eq!(out, None);
    }

    #[tokio::test]
    async fn locked_but_unapplied_item_is_committed_value() {
        let it = item([("Id", "a"), ("v", "1"), ("_TxId", "t")]);
        let names = vec!["v".to_string()];
        let out = handler()
            .handle_item(Some(it), Some(&names), "T")
            .await
            .unwrap();
        assert_eq!(out, Some(item([("v", "1")])));
    }

    #[tokio::test]
    async fn orphaned_applied_item_is_read_again() {
        // The locking record is gone, so the item is read again; the store
        // has no such item.
        let it = item([("Id", "a"), ("v", "1"), ("_TxId", "ghost"), ("_TxA", "1")]);
        let out = handler().handle_item(Some(it), None, "T").await.unwrap();
        assert_eq!(out, None);
    }
}
