//! Read isolation for items that may be mid-transaction.
//!
//! A raw item read from the store can carry another transaction's lock and
//! even its uncommitted write. A handler turns such an item into what a
//! reader at a given isolation level should see. Reading under a lock is
//! not a handler; it is [`crate::Transaction::get_item`].

mod read_committed;
mod read_uncommitted;

use async_trait::async_trait;
use txkv_codec::Item;

use crate::error::TxResult;
use crate::manager::TransactionManager;

pub use read_committed::ReadCommittedHandler;
pub use read_uncommitted::ReadUncommittedHandler;

/// Isolation level for reads outside a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    /// See the latest applied value, committed or not.
    ReadUncommitted,
    /// See only values whose transaction has committed.
    ReadCommitted,
}

impl IsolationLevel {
    pub(crate) fn handler(self, manager: TransactionManager) -> Box<dyn ReadIsolationHandler> {
        match self {
            Self::ReadUncommitted => Box::new(ReadUncommittedHandler),
            Self::ReadCommitted => Box::new(ReadCommittedHandler::new(manager)),
        }
    }
}

/// Turns a raw item into the view for one isolation level.
#[async_trait]
pub trait ReadIsolationHandler: Send + Sync {
    /// Resolve the visible version of `item`, read from `table_name`.
    ///
    /// Returns `None` when nothing should be visible. The result is limited
    /// to `attributes_to_get` when given; shadow attributes may remain and
    /// are the caller's to strip.
    ///
    /// # Errors
    ///
    /// Returns store errors, or a transaction error when a consistent view
    /// cannot be settled.
    async fn handle_item(
        &self,
        item: Option<Item>,
        attributes_to_get: Option<&[String]>,
        table_name: &str,
    ) -> TxResult<Option<Item>>;
}
