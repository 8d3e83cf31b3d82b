//! Error types for store operations.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by a key-value store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// An `expected` precondition on a write did not hold.
    ///
    /// The write was not applied.
    #[error("the conditional request failed")]
    ConditionalCheckFailed,

    /// The named table does not exist.
    #[error("requested resource not found: table {table}")]
    ResourceNotFound {
        /// The missing table.
        table: String,
    },

    /// The request was malformed or would exceed a store limit.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the problem.
        message: String,
    },

    /// Any other failure reported by the store.
    #[error("service error: {message}")]
    Service {
        /// Description of the failure.
        message: String,
    },
}

impl StoreError {
    /// Create a resource-not-found error.
    pub fn resource_not_found(table: impl Into<String>) -> Self {
        Self::ResourceNotFound {
            table: table.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a service error.
    pub fn service(message: impl Into<String>) -> Self {
        Self::Service {
            message: message.into(),
        }
    }

    /// Returns true if this is a conditional check failure.
    pub fn is_conditional_check_failed(&self) -> bool {
        matches!(self, Self::ConditionalCheckFailed)
    }
}
