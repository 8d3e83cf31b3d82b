//! Transaction manager.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info};
use txkv_codec::Item;
use txkv_storage::{GetItemRequest, KeySchema, KvStore};
use uuid::Uuid;

use crate::attributes::{strip_shadow_attributes, SHADOW_ATTRIBUTES};
use crate::config::TransactionConfig;
use crate::error::{TxError, TxResult};
use crate::facade::IsolatedReader;
use crate::isolation::{IsolationLevel, ReadIsolationHandler};
use crate::request::Request;
use crate::transaction::{
    item_image_table_schema, transaction_table_schema, Transaction, TransactionRecord,
};

struct ManagerInner {
    store: Arc<dyn KvStore>,
    config: TransactionConfig,
    /// Table name to key schema.
    schemas: RwLock<HashMap<String, KeySchema>>,
}

/// Entry point for transactions and isolated reads against one store.
///
/// Cloning is cheap; clones share the store handle and the schema cache.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use txkv_codec::item;
/// use txkv_core::{IsolationLevel, TransactionConfig, TransactionManager};
/// use txkv_storage::{GetItemRequest, InMemoryStore, KeySchema, PutItemRequest};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let store = InMemoryStore::new();
/// store.create_table("Transactions", TransactionManager::transaction_table_schema()).unwrap();
/// store.create_table("TransactionImages", TransactionManager::item_image_table_schema()).unwrap();
/// store.create_table("Items", KeySchema::hash("Id")).unwrap();
///
/// let manager = TransactionManager::new(Arc::new(store), TransactionConfig::default());
/// let tx = manager.new_transaction().await.unwrap();
/// tx.put_item(PutItemRequest::new("Items", item([("Id", "k1"), ("attr", "a")])))
///     .await
///     .unwrap();
/// tx.commit().await.unwrap();
///
/// let read = manager
///     .get_item(GetItemRequest::new("Items", item([("Id", "k1")])), IsolationLevel::ReadCommitted)
///     .await
///     .unwrap();
/// assert_eq!(read, Some(item([("Id", "k1"), ("attr", "a")])));
/// # });
/// ```
#[derive(Clone)]
pub struct TransactionManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl TransactionManager {
    /// Creates a manager over `store`.
    ///
    /// The record and image tables must already exist with the schemas from
    /// [`Self::transaction_table_schema`] and [`Self::item_image_table_schema`].
    pub fn new(store: Arc<dyn KvStore>, config: TransactionConfig) -> Self {
        let mut schemas = HashMap::new();
        schemas.insert(config.transaction_table.clone(), transaction_table_schema());
        schemas.insert(config.item_image_table.clone(), item_image_table_schema());
        Self {
            inner: Arc::new(ManagerInner {
                store,
                config,
                schemas: RwLock::new(schemas),
            }),
        }
    }

    /// Key schema the transaction record table must have.
    pub fn transaction_table_schema() -> KeySchema {
        transaction_table_schema()
    }

    /// Key schema the old item image table must have.
    pub fn item_image_table_schema() -> KeySchema {
        item_image_table_schema()
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.inner.store
    }

    /// The configuration.
    pub fn config(&self) -> &TransactionConfig {
        &self.inner.config
    }

    /// Starts a transaction with a fresh random id.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be created.
    pub async fn new_transaction(&self) -> TxResult<Transaction> {
        let tx_id = Uuid::new_v4().to_string();
        let record = TransactionRecord::insert(self, &tx_id).await?;
        info!(tx_id = %tx_id, "started transaction");
        Ok(Transaction::from_record(self.clone(), record))
    }

    /// Resumes an existing transaction by id.
    ///
    /// The returned object races safely with any other object for the same
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns `TxError::TransactionNotFound` if there is no record.
    pub async fn resume_transaction(&self, tx_id: &str) -> TxResult<Transaction> {
        let record = TransactionRecord::load(self, tx_id).await?;
        debug!(tx_id = %tx_id, state = ?record.state(), "resumed transaction");
        Ok(Transaction::from_record(self.clone(), record))
    }

    /// Resumes and sweeps a transaction by id.
    ///
    /// Returns `true` if the record is gone afterwards.
    ///
    /// # Errors
    ///
    /// Returns any error from the sweep.
    pub async fn sweep_transaction(
        &self,
        tx_id: &str,
        rollback_after: Duration,
        delete_after: Duration,
    ) -> TxResult<bool> {
        match self.resume_transaction(tx_id).await {
            Ok(tx) => tx.sweep(rollback_after, delete_after).await,
            Err(TxError::TransactionNotFound { .. }) => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Reads an item outside any transaction at the given isolation level.
    ///
    /// Returns `None` if the item does not exist at that level. Shadow
    /// attributes are never returned.
    ///
    /// # Errors
    ///
    /// Returns store errors, or `TxError::Transaction` if a read-committed
    /// view could not be settled within the retry budget.
    pub async fn get_item(
        &self,
        mut request: GetItemRequest,
        level: IsolationLevel,
    ) -> TxResult<Option<Item>> {
        let attributes_to_get = request.attributes_to_get.clone();
        request.attributes_to_get = self
            .augment_attributes(&request.table_name, attributes_to_get.as_deref())
            .await?;
        let table_name = request.table_name.clone();
        let item = self.store().get_item(request).await?;
        self.resolve(
            self.isolation_handler(level).as_ref(),
            item,
            attributes_to_get.as_deref(),
            &table_name,
        )
        .await
    }

    /// A reader applying `level` to gets, batch gets, queries and scans.
    pub fn isolated_reader(&self, level: IsolationLevel) -> IsolatedReader {
        IsolatedReader::new(self.clone(), level)
    }

    /// The handler implementing `level`.
    pub fn isolation_handler(&self, level: IsolationLevel) -> Box<dyn ReadIsolationHandler> {
        level.handler(self.clone())
    }

    /// Key schema of a table, described once and cached.
    ///
    /// # Errors
    ///
    /// Returns store errors from the describe call.
    pub async fn key_schema(&self, table_name: &str) -> TxResult<KeySchema> {
        let cached = self.inner.schemas.read().get(table_name).cloned();
        if let Some(schema) = cached {
            return Ok(schema);
        }
        let description = self.store().describe_table(table_name).await?;
        self.inner
            .schemas
            .write()
            .insert(table_name.to_string(), description.key_schema.clone());
        Ok(description.key_schema)
    }

    /// Primary key of an item of `table_name`.
    ///
    /// # Errors
    ///
    /// Returns `TxError::InvalidRequest` if a key attribute is missing.
    pub async fn key_from_item(&self, table_name: &str, item: &Item) -> TxResult<Item> {
        let schema = self.key_schema(table_name).await?;
        schema.extract_key(item).ok_or_else(|| {
            TxError::invalid_request(
                "",
                table_name,
                None,
                "item does not contain the table's key attributes",
            )
        })
    }

    /// Primary key targeted by a request.
    ///
    /// # Errors
    ///
    /// Returns `TxError::InvalidRequest` if the key does not fit the table's
    /// key schema or an update touches a key attribute.
    pub async fn request_key(&self, tx_id: &str, request: &Request) -> TxResult<Item> {
        let schema = self.key_schema(request.table_name()).await?;
        request.validate_key(tx_id, &schema)
    }

    /// Attributes to fetch so the handler can judge the item: the caller's
    /// list plus shadow and key attributes.
    pub(crate) async fn augment_attributes(
        &self,
        table_name: &str,
        attributes_to_get: Option<&[String]>,
    ) -> TxResult<Option<Vec<String>>> {
        let Some(names) = attributes_to_get else {
            return Ok(None);
        };
        let schema = self.key_schema(table_name).await?;
        let mut augmented = names.to_vec();
        let extra = SHADOW_ATTRIBUTES
            .iter()
            .map(|name| name.as_str())
            .chain(schema.attribute_names());
        for name in extra {
            if !augmented.iter().any(|n| n == name) {
                augmented.push(name.to_string());
            }
        }
        Ok(Some(augmented))
    }

    /// Run one raw item through a handler and strip shadow attributes.
    pub(crate) async fn resolve(
        &self,
        handler: &dyn ReadIsolationHandler,
        item: Option<Item>,
        attributes_to_get: Option<&[String]>,
        table_name: &str,
    ) -> TxResult<Option<Item>> {
        let visible = handler
            .handle_item(item, attributes_to_get, table_name)
            .await?;
        Ok(visible.map(|mut item| {
            strip_shadow_attributes(&mut item);
            item
        }))
    }
}
