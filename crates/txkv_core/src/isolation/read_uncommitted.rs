//! Read-uncommitted isolation.

use async_trait::async_trait;
use txkv_codec::Item;

use super::ReadIsolationHandler;
use crate::attributes::{filter_attributes, is_applied, is_transient};
use crate::error::TxResult;

/// Returns the latest applied value, including uncommitted writes.
///
/// An item inserted only to hold a lock does not exist yet and is hidden.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadUncommittedHandler;

#[async_trait]
impl ReadIsolationHandler for ReadUncommittedHandler {
    async fn handle_item(
        &self,
        item: Option<Item>,
        attributes_to_get: Option<&[String]>,
        _table_name: &str,
    ) -> TxResult<Option<Item>> {
        Ok(item
            .filter(|item| !(is_transient(item) && !is_applied(item)))
            .map(|item| filter_attributes(item, attributes_to_get)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txkv_codec::item;

    #[tokio::test]
    async fn unlocked_item_passes_through() {
        let it = item([("Id", "a"), ("v", "1")]);
        let out = ReadUncommittedHandler
            .handle_item(Some(it.clone()), None, "T")
            .await
            .unwrap();
        assert_eq!(out, Some(it));
    }

    #[tokio::test]
    async fn transient_unapplied_is_hidden() {
        let it = item([("Id", "a"), ("_TxId", "t"), ("_TxT", "1")]);
        let out = ReadUncommittedHandler
            .handle_item(Some(it), None, "T")
            .await
            .unwrap();
        assert_eq!(out, None);
    }

    #[tokio::test]
    async fn applied_write_is_visible_and_filtered() {
        let it = item([("Id", "a"), ("v", "new"), ("_TxId", "t"), ("_TxT", "1"), ("_TxA", "1")]);
        let names = vec!["v".to_string()];
        let out = ReadUncommittedHandler
            .handle_item(Some(it), Some(&names), "T")
            .await
            .unwrap();
        assert_eq!(out, Some(item([("v", "new")])));
    }

    #[tokio::test]
    async fn missing_item_stays_missing() {
        let out = ReadUncommittedHandler.handle_item(None, None, "T").await.unwrap();
        assert_eq!(out, None);
    }
}
