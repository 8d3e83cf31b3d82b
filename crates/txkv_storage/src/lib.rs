//! # txkv Storage
//!
//! The backing-store interface for txkv transactions and an in-memory
//! implementation of it.
//!
//! A store is a set of tables of items. It offers single-item atomic writes
//! guarded by per-attribute preconditions, and nothing more: every multi-item
//! guarantee is built on top by `txkv_core`.
//!
//! ## Design Principles
//!
//! - Stores know nothing about transactions or shadow attributes
//! - Every write may carry `expected` preconditions, evaluated atomically
//! - A failed precondition is always `StoreError::ConditionalCheckFailed`
//! - Stores must be `Send + Sync` and are shared as `Arc<dyn KvStore>`
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral use

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod memory;
mod request;

pub use backend::KvStore;
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use request::{
    AttributeValueUpdate, BatchGetItemOutput, BatchGetItemRequest, ComparisonOperator, Condition,
    DeleteItemRequest, ExpectedAttributeValue, GetItemRequest, KeySchema, KeysAndAttributes,
    PutItemRequest, QueryOutput, QueryRequest, ReturnConsumedCapacity,
    ReturnItemCollectionMetrics, ReturnValue, ScanOutput, ScanRequest, TableDescription,
    UpdateItemRequest,
};
