//! Error types for the transaction layer.

use thiserror::Error;
use tracing::error;
use txkv_codec::Item;

use crate::request::Request;

/// Result type for transaction operations.
pub type TxResult<T> = Result<T, TxError>;

/// Errors surfaced by transactions, the manager and the isolation handlers.
///
/// A store `ConditionalCheckFailed` never escapes the protocol as-is; it is
/// either the expected signal that another actor already did the work, or it
/// is reinterpreted into one of the variants below after a follow-up read.
#[derive(Debug, Error)]
pub enum TxError {
    /// The request breaks a structural rule and was not attempted.
    #[error("invalid request for transaction {tx_id} on table {table_name}: {message}")]
    InvalidRequest {
        /// Transaction the request was made in.
        tx_id: String,
        /// Target table.
        table_name: String,
        /// Target key, when it could be resolved.
        key: Option<Item>,
        /// What was wrong.
        message: String,
        /// The offending request.
        request: Option<Box<Request>>,
    },

    /// The item already has a write in this transaction.
    #[error("transaction {tx_id} already has a write for {key:?} in table {table_name}")]
    DuplicateRequest {
        /// Transaction the request was made in.
        tx_id: String,
        /// Target table.
        table_name: String,
        /// Target key.
        key: Item,
    },

    /// Another live transaction holds the item.
    #[error("item {key:?} in table {table_name} is locked by {lock_owner}, not {tx_id}")]
    ItemNotLocked {
        /// Transaction that wanted the lock.
        tx_id: String,
        /// Transaction holding the lock.
        lock_owner: String,
        /// Table of the item.
        table_name: String,
        /// Key of the item.
        key: Item,
    },

    /// No record exists for the transaction.
    #[error("transaction not found: {tx_id}")]
    TransactionNotFound {
        /// The missing transaction.
        tx_id: String,
    },

    /// The transaction has already committed.
    #[error("transaction {tx_id} has already committed")]
    TransactionCommitted {
        /// The committed transaction.
        tx_id: String,
    },

    /// The transaction has already rolled back.
    #[error("transaction {tx_id} has already rolled back")]
    TransactionRolledBack {
        /// The rolled-back transaction.
        tx_id: String,
    },

    /// The transaction finished, but the evidence needed to answer is gone.
    #[error("transaction {tx_id} completed and the outcome cannot be reconstructed: {message}")]
    UnknownCompletedTransaction {
        /// The completed transaction.
        tx_id: String,
        /// What could not be reconstructed.
        message: String,
    },

    /// Contention was not resolved within the attempt budget.
    #[error("transaction {tx_id}: {message}")]
    Transaction {
        /// The transaction involved.
        tx_id: String,
        /// Description of the failure.
        message: String,
    },

    /// Stored state contradicts a protocol invariant.
    #[error("transaction {tx_id} assertion failed: {message}")]
    Assertion {
        /// The transaction involved.
        tx_id: String,
        /// The violated invariant.
        message: String,
    },

    /// An item could not be mapped to or from an application type.
    #[error("cannot map item of table {table_name}: {message}")]
    Mapping {
        /// Table of the item.
        table_name: String,
        /// What did not fit.
        message: String,
    },

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] txkv_storage::StoreError),

    /// CBOR codec error.
    #[error("codec error: {0}")]
    Codec(#[from] txkv_codec::CodecError),
}

impl TxError {
    /// Create an invalid request error.
    pub fn invalid_request(
        tx_id: impl Into<String>,
        table_name: impl Into<String>,
        key: Option<Item>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidRequest {
            tx_id: tx_id.into(),
            table_name: table_name.into(),
            key,
            message: message.into(),
            request: None,
        }
    }

    /// Attach the offending request to an invalid request error.
    #[must_use]
    pub fn with_request(self, offending: Request) -> Self {
        match self {
            Self::InvalidRequest {
                tx_id,
                table_name,
                key,
                message,
                ..
            } => Self::InvalidRequest {
                tx_id,
                table_name,
                key,
                message,
                request: Some(Box::new(offending)),
            },
            other => other,
        }
    }

    /// Create a generic transaction error.
    pub fn transaction(tx_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transaction {
            tx_id: tx_id.into(),
            message: message.into(),
        }
    }

    /// Create an unknown-completed error.
    pub fn unknown_completed(tx_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnknownCompletedTransaction {
            tx_id: tx_id.into(),
            message: message.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(tx_id: impl Into<String>) -> Self {
        Self::TransactionNotFound {
            tx_id: tx_id.into(),
        }
    }

    /// Create a mapping error.
    pub fn mapping(table_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Mapping {
            table_name: table_name.into(),
            message: message.into(),
        }
    }

    /// Create an assertion error, logging it at error level.
    pub fn assertion(tx_id: impl Into<String>, message: impl Into<String>) -> Self {
        let tx_id = tx_id.into();
        let message = message.into();
        error!(tx_id = %tx_id, "transaction assertion failed: {message}");
        Self::Assertion { tx_id, message }
    }

    /// Returns true if the error reports that the transaction already finished.
    pub fn is_completed(&self) -> bool {
        matches!(
            self,
            Self::TransactionCommitted { .. }
                | Self::TransactionRolledBack { .. }
                | Self::UnknownCompletedTransaction { .. }
        )
    }

    /// Returns true if the error is a store conditional check failure.
    pub fn is_conditional_check_failed(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_conditional_check_failed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txkv_storage::StoreError;

    #[test]
    fn completed_kinds() {
        assert!(TxError::TransactionCommitted { tx_id: "t".into() }.is_completed());
        assert!(TxError::TransactionRolledBack { tx_id: "t".into() }.is_completed());
        assert!(TxError::unknown_completed("t", "gone").is_completed());
        assert!(!TxError::not_found("t").is_completed());
        assert!(!TxError::transaction("t", "busy").is_completed());
    }

    #[test]
    fn store_errors_convert() {
        let err: TxError = StoreError::ConditionalCheckFailed.into();
        assert!(err.is_conditional_check_failed());
        let err: TxError = StoreError::service("down").into();
        assert!(!err.is_conditional_check_failed());
    }

    #[test]
    fn display_includes_context() {
        let err = TxError::invalid_request("tx1", "Items", None, "table name is empty");
        let text = err.to_string();
        assert!(text.contains("tx1"));
        assert!(text.contains("table name is empty"));
    }
}
