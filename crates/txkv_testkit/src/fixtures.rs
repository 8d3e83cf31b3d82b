//! Test fixtures and store helpers.
//!
//! Provides a provisioned in-memory store, a manager over it, and short
//! constructors for the requests tests issue most.

use std::sync::Arc;

use txkv_codec::{item, AttributeValue, Item};
use txkv_core::{TransactionConfig, TransactionManager};
use txkv_storage::{
    AttributeValueUpdate, DeleteItemRequest, GetItemRequest, InMemoryStore, KeySchema, KvStore,
    PutItemRequest, UpdateItemRequest,
};

use crate::faults::FaultInjectingStore;

/// Application table keyed by `Id`.
pub const ITEMS: &str = "Items";

/// Application table keyed by `Id` and `Sort`.
pub const RANGE_ITEMS: &str = "RangeItems";

/// A provisioned store and a manager over it.
pub struct TestEnv {
    /// The raw store, bypassing the transaction layer.
    pub store: Arc<InMemoryStore>,
    /// Manager used by the test.
    pub manager: TransactionManager,
    /// Fault wrapper between `manager` and `store`, if any.
    pub faults: Option<Arc<FaultInjectingStore>>,
}

impl TestEnv {
    /// A fresh environment with default configuration.
    pub fn new() -> Self {
        Self::build(InMemoryStore::new(), TransactionConfig::default(), false)
    }

    /// A fresh environment with custom configuration.
    pub fn with_config(config: TransactionConfig) -> Self {
        Self::build(InMemoryStore::new(), config, false)
    }

    /// A fresh environment whose store rejects items over `bytes`.
    pub fn with_max_item_size(bytes: usize) -> Self {
        Self::build(
            InMemoryStore::new().with_max_item_size(bytes),
            TransactionConfig::default(),
            false,
        )
    }

    /// A fresh environment whose manager goes through a fault injector.
    ///
    /// Arm faults through [`TestEnv::faults`]; [`TestEnv::clean_manager`]
    /// plays a second process that sees no faults.
    pub fn with_faults() -> Self {
        Self::build(InMemoryStore::new(), TransactionConfig::default(), true)
    }

    fn build(store: InMemoryStore, config: TransactionConfig, faulty: bool) -> Self {
        let store = Arc::new(store);
        store
            .create_table(&config.transaction_table, TransactionManager::transaction_table_schema())
            .expect("create transaction table");
        store
            .create_table(&config.item_image_table, TransactionManager::item_image_table_schema())
            .expect("create image table");
        store
            .create_table(ITEMS, KeySchema::hash("Id"))
            .expect("create items table");
        store
            .create_table(RANGE_ITEMS, KeySchema::hash_range("Id", "Sort"))
            .expect("create range items table");

        let faults = faulty.then(|| Arc::new(FaultInjectingStore::new(store.clone())));
        let backend: Arc<dyn KvStore> = match &faults {
            Some(faults) => faults.clone(),
            None => store.clone(),
        };
        Self {
            manager: TransactionManager::new(backend, config),
            store,
            faults,
        }
    }

    /// The fault injector.
    ///
    /// # Panics
    ///
    /// Panics unless built with [`TestEnv::with_faults`].
    pub fn faults(&self) -> &FaultInjectingStore {
        self.faults.as_deref().expect("environment built without faults")
    }

    /// A second manager over the raw store, sharing no state with `manager`.
    pub fn clean_manager(&self) -> TransactionManager {
        TransactionManager::new(self.store.clone(), self.manager.config().clone())
    }

    /// Consistent raw read, shadow attributes included.
    pub async fn raw(&self, table_name: &str, key: Item) -> Option<Item> {
        self.store
            .get_item(GetItemRequest::new(table_name, key).with_consistent_read(true))
            .await
            .expect("raw get")
    }

    /// Raw write, bypassing transactions.
    pub async fn seed<K, V, I>(&self, table_name: &str, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<AttributeValue>,
    {
        self.store
            .put_item(PutItemRequest::new(table_name, item(pairs)))
            .await
            .expect("seed put");
    }

    /// Every item of a table, raw.
    pub fn items(&self, table_name: &str) -> Vec<Item> {
        self.store.table_items(table_name).expect("table exists")
    }

    /// Number of stored transaction records.
    pub fn record_count(&self) -> usize {
        self.items(&self.manager.config().transaction_table).len()
    }

    /// Number of stored old item images.
    pub fn image_count(&self) -> usize {
        self.items(&self.manager.config().item_image_table).len()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Key `{Id: id}` of the [`ITEMS`] table.
pub fn key(id: &str) -> Item {
    item([("Id", id)])
}

/// Get of `key` from `table_name`.
pub fn get(table_name: &str, key: Item) -> GetItemRequest {
    GetItemRequest::new(table_name, key)
}

/// Put of an item built from `pairs`.
pub fn put<K, V, I>(table_name: &str, pairs: I) -> PutItemRequest
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<AttributeValue>,
{
    PutItemRequest::new(table_name, item(pairs))
}

/// Update setting one attribute.
pub fn set(
    table_name: &str,
    key: Item,
    name: &str,
    value: impl Into<AttributeValue>,
) -> UpdateItemRequest {
    UpdateItemRequest::new(table_name, key).with_put(name, value)
}

/// Update adding `amount` to a numeric attribute.
pub fn add(table_name: &str, key: Item, name: &str, amount: i64) -> UpdateItemRequest {
    UpdateItemRequest::new(table_name, key)
        .with_update(name, AttributeValueUpdate::Add(AttributeValue::n(amount)))
}

/// Delete of `key` from `table_name`.
pub fn delete(table_name: &str, key: Item) -> DeleteItemRequest {
    DeleteItemRequest::new(table_name, key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn env_provisions_tables() {
        let env = TestEnv::new();
        env.seed(ITEMS, [("Id", "a")]).await;
        assert_eq!(env.raw(ITEMS, key("a")).await, Some(key("a")));
        assert_eq!(env.record_count(), 0);
        assert_eq!(env.image_count(), 0);
        assert!(env.items(RANGE_ITEMS).is_empty());
    }

    #[tokio::test]
    async fn faulty_env_exposes_injector() {
        let env = TestEnv::with_faults();
        assert_eq!(env.faults().pending(), 0);
        let tx = env.manager.new_transaction().await.unwrap();
        assert_eq!(env.record_count(), 1);
        assert!(env.clean_manager().resume_transaction(tx.id()).await.is_ok());
    }
}
