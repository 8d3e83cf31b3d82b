//! Isolation-filtered reads over whole result sets.

use std::collections::BTreeMap;

use txkv_codec::Item;
use txkv_storage::{
    BatchGetItemOutput, BatchGetItemRequest, GetItemRequest, QueryOutput, QueryRequest,
    ScanOutput, ScanRequest,
};

use crate::error::TxResult;
use crate::isolation::{IsolationLevel, ReadIsolationHandler};
use crate::manager::TransactionManager;

/// Reads through the store at a fixed isolation level.
///
/// Every item of a result passes through the level's handler. Items that
/// are not visible are dropped from result lists; pagination keys are passed
/// through untouched, so a page may hold fewer items than its limit.
pub struct IsolatedReader {
    manager: TransactionManager,
    level: IsolationLevel,
    handler: Box<dyn ReadIsolationHandler>,
}

impl std::fmt::Debug for IsolatedReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolatedReader")
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

impl IsolatedReader {
    /// Create a reader for `level`.
    pub fn new(manager: TransactionManager, level: IsolationLevel) -> Self {
        let handler = manager.isolation_handler(level);
        Self {
            manager,
            level,
            handler,
        }
    }

    /// The isolation level applied.
    pub fn level(&self) -> IsolationLevel {
        self.level
    }

    /// Read one item.
    ///
    /// # Errors
    ///
    /// Returns store errors or a handler failure.
    pub async fn get_item(&self, request: GetItemRequest) -> TxResult<Option<Item>> {
        self.manager.get_item(request, self.level).await
    }

    /// Read many items across tables.
    ///
    /// # Errors
    ///
    /// Returns store errors or a handler failure.
    pub async fn batch_get_item(
        &self,
        mut request: BatchGetItemRequest,
    ) -> TxResult<BatchGetItemOutput> {
        let mut projections = BTreeMap::new();
        for (table_name, keys) in &mut request.request_items {
            let requested = keys.attributes_to_get.clone();
            keys.attributes_to_get = self
                .manager
                .augment_attributes(table_name, requested.as_deref())
                .await?;
            projections.insert(table_name.clone(), requested);
        }

        let raw = self.manager.store().batch_get_item(request).await?;
        let mut responses = BTreeMap::new();
        for (table_name, items) in raw.responses {
            let projection = projections.get(&table_name).cloned().flatten();
            let visible = self
                .resolve_all(items, projection.as_deref(), &table_name)
                .await?;
            responses.insert(table_name, visible);
        }
        Ok(BatchGetItemOutput {
            responses,
            unprocessed_keys: raw.unprocessed_keys,
        })
    }

    /// Query one table.
    ///
    /// # Errors
    ///
    /// Returns store errors or a handler failure.
    pub async fn query(&self, mut request: QueryRequest) -> TxResult<QueryOutput> {
        let requested = request.attributes_to_get.clone();
        request.attributes_to_get = self
            .manager
            .augment_attributes(&request.table_name, requested.as_deref())
            .await?;
        let table_name = request.table_name.clone();
        let raw = self.manager.store().query(request).await?;
        Ok(QueryOutput {
            items: self
                .resolve_all(raw.items, requested.as_deref(), &table_name)
                .await?,
            last_evaluated_key: raw.last_evaluated_key,
        })
    }

    /// Scan one table.
    ///
    /// # Errors
    ///
    /// Returns store errors or a handler failure.
    pub async fn scan(&self, mut request: ScanRequest) -> TxResult<ScanOutput> {
        let requested = request.attributes_to_get.clone();
        request.attributes_to_get = self
            .manager
            .augment_attributes(&request.table_name, requested.as_deref())
            .await?;
        let table_name = request.table_name.clone();
        let raw = self.manager.store().scan(request).await?;
        Ok(ScanOutput {
            items: self
                .resolve_all(raw.items, requested.as_deref(), &table_name)
                .await?,
            last_evaluated_key: raw.last_evaluated_key,
        })
    }

    async fn resolve_all(
        &self,
        items: Vec<Item>,
        attributes_to_get: Option<&[String]>,
        table_name: &str,
    ) -> TxResult<Vec<Item>> {
        let mut visible = Vec::with_capacity(items.len());
        for item in items {
            let resolved = self
                .manager
                .resolve(self.handler.as_ref(), Some(item), attributes_to_get, table_name)
                .await?;
            visible.extend(resolved);
        }
        Ok(visible)
    }
}
