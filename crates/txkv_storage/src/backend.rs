//! Key-value store trait definition.

use async_trait::async_trait;
use txkv_codec::Item;

use crate::error::StoreResult;
use crate::request::{
    BatchGetItemOutput, BatchGetItemRequest, DeleteItemRequest, GetItemRequest, PutItemRequest,
    QueryOutput, QueryRequest, ScanOutput, ScanRequest, TableDescription, UpdateItemRequest,
};

/// A keyed item store with single-item atomic conditional writes.
///
/// This is the only primitive the transaction layer builds on. A store never
/// offers atomicity across items; it must offer the following per item:
///
/// # Invariants
///
/// - Every write evaluates its `expected` preconditions and applies its change
///   as one atomic step, or fails with `StoreError::ConditionalCheckFailed`
///   and changes nothing
/// - A consistent `get_item` observes every write that completed before it
/// - `update_item` creates the item when it does not exist
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing and local use
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Reads one item.
    ///
    /// Returns `None` if no item has the key.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist or the key does not
    /// match the table's key schema.
    async fn get_item(&self, request: GetItemRequest) -> StoreResult<Option<Item>>;

    /// Creates or replaces an item.
    ///
    /// Returns the previous item when `ALL_OLD` is requested.
    ///
    /// # Errors
    ///
    /// Returns `ConditionalCheckFailed` if a precondition does not hold, or
    /// a validation error if the item is malformed or too large.
    async fn put_item(&self, request: PutItemRequest) -> StoreResult<Option<Item>>;

    /// Applies attribute actions to an item, creating it if absent.
    ///
    /// Returns attributes according to the request's return values.
    ///
    /// # Errors
    ///
    /// Returns `ConditionalCheckFailed` if a precondition does not hold, or
    /// a validation error if an action is invalid or the result too large.
    async fn update_item(&self, request: UpdateItemRequest) -> StoreResult<Option<Item>>;

    /// Deletes an item.
    ///
    /// Returns the deleted item when `ALL_OLD` is requested.
    ///
    /// # Errors
    ///
    /// Returns `ConditionalCheckFailed` if a precondition does not hold.
    async fn delete_item(&self, request: DeleteItemRequest) -> StoreResult<Option<Item>>;

    /// Reads one page of a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist.
    async fn scan(&self, request: ScanRequest) -> StoreResult<ScanOutput>;

    /// Reads one page of items sharing a hash key.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the conditions do not pin the hash key.
    async fn query(&self, request: QueryRequest) -> StoreResult<QueryOutput>;

    /// Reads many items across tables.
    ///
    /// # Errors
    ///
    /// Returns an error if any table does not exist.
    async fn batch_get_item(&self, request: BatchGetItemRequest) -> StoreResult<BatchGetItemOutput>;

    /// Describes a table, including its key schema.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if the table does not exist.
    async fn describe_table(&self, table_name: &str) -> StoreResult<TableDescription>;
}
