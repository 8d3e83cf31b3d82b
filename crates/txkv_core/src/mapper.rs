//! Typed access to items through a transaction.
//!
//! Routing is explicit: every helper takes the [`Transaction`] (or the
//! manager, for isolated reads) it should go through.

use txkv_codec::Item;
use txkv_storage::{DeleteItemRequest, GetItemRequest, PutItemRequest};

use crate::error::TxResult;
use crate::isolation::IsolationLevel;
use crate::manager::TransactionManager;
use crate::transaction::Transaction;

/// Trait for application types stored as items of one table.
///
/// # Example
///
/// ```rust
/// use txkv_codec::{AttributeValue, Item};
/// use txkv_core::{ItemMapper, TxError, TxResult};
///
/// struct Account {
///     id: String,
///     balance: i64,
/// }
///
/// impl ItemMapper for Account {
///     fn table_name() -> &'static str {
///         "Accounts"
///     }
///
///     fn to_item(&self) -> Item {
///         txkv_codec::item([
///             ("Id", AttributeValue::s(&self.id)),
///             ("Balance", AttributeValue::n(self.balance)),
///         ])
///     }
///
///     fn from_item(item: Item) -> TxResult<Self> {
///         let id = item.get("Id").and_then(AttributeValue::as_s);
///         let balance = item.get("Balance").and_then(AttributeValue::as_i64);
///         match (id, balance) {
///             (Some(id), Some(balance)) => Ok(Self { id: id.to_string(), balance }),
///             _ => Err(TxError::mapping(Self::table_name(), "missing Id or Balance")),
///         }
///     }
/// }
/// ```
pub trait ItemMapper: Sized {
    /// Table holding items of this type.
    fn table_name() -> &'static str;

    /// Converts the value to a full item, key attributes included.
    fn to_item(&self) -> Item;

    /// Converts an item back to the value.
    ///
    /// # Errors
    ///
    /// Returns `TxError::Mapping` if the item does not describe a value.
    fn from_item(item: Item) -> TxResult<Self>;
}

/// Load a value under a read lock.
///
/// # Errors
///
/// Returns transaction or mapping errors.
pub async fn load<T: ItemMapper>(tx: &Transaction, key: Item) -> TxResult<Option<T>> {
    tx.get_item(GetItemRequest::new(T::table_name(), key))
        .await?
        .map(T::from_item)
        .transpose()
}

/// Write a value within the transaction.
///
/// # Errors
///
/// Returns transaction errors.
pub async fn save<T: ItemMapper>(tx: &Transaction, value: &T) -> TxResult<()> {
    tx.put_item(PutItemRequest::new(T::table_name(), value.to_item()))
        .await?;
    Ok(())
}

/// Delete a value when the transaction commits.
///
/// # Errors
///
/// Returns transaction errors.
pub async fn delete<T: ItemMapper>(tx: &Transaction, key: Item) -> TxResult<()> {
    tx.delete_item(DeleteItemRequest::new(T::table_name(), key))
        .await?;
    Ok(())
}

/// Load a value outside any transaction at `level`.
///
/// # Errors
///
/// Returns store, isolation or mapping errors.
pub async fn load_isolated<T: ItemMapper>(
    manager: &TransactionManager,
    key: Item,
    level: IsolationLevel,
) -> TxResult<Option<T>> {
    manager
        .get_item(GetItemRequest::new(T::table_name(), key), level)
        .await?
        .map(T::from_item)
        .transpose()
}
