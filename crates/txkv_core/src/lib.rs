//! # txkv Core
//!
//! Multi-item ACID transactions on top of a store that only offers
//! single-item conditional writes.
//!
//! This crate provides:
//! - [`Transaction`]: locks, applies and commits or rolls back a set of
//!   item-level requests, recoverable by any process through
//!   [`TransactionManager::resume_transaction`]
//! - [`TransactionManager`]: transaction factory, key schema cache and
//!   isolated reads
//! - Read isolation handlers for reads outside a transaction
//! - [`IsolatedReader`]: isolation-filtered batch gets, queries and scans
//! - [`ItemMapper`]: typed items routed through an explicit transaction
//!
//! ## Storage layout
//!
//! Besides the application's tables, the protocol uses a transaction record
//! table and an old item image table. Locks and write markers live on the
//! items themselves as attributes with the reserved `_Tx` prefix; readers
//! never see them.
//!
//! ## Guarantees
//!
//! - Atomicity: either every write of a committed transaction survives or,
//!   after rollback, every touched item is restored
//! - Isolation: items are exclusively locked from first touch to completion
//! - Idempotence: every protocol step is safe to repeat, from any process
//! - Deadlock freedom: the transaction that observes a conflict rolls the
//!   lock owner back

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod attributes;
mod config;
mod error;
mod facade;
mod isolation;
mod manager;
pub mod mapper;
mod request;
mod transaction;

pub use attributes::{
    current_time, is_applied, is_locked, is_reserved, is_transient, lock_owner, parse_time,
    strip_shadow_attributes, truthy, AttributeName, ImmutableKey, TransactionState,
    RESERVED_PREFIX, SHADOW_ATTRIBUTES,
};
pub use config::TransactionConfig;
pub use error::{TxError, TxResult};
pub use facade::IsolatedReader;
pub use isolation::{
    IsolationLevel, ReadCommittedHandler, ReadIsolationHandler, ReadUncommittedHandler,
};
pub use manager::TransactionManager;
pub use mapper::ItemMapper;
pub use request::{Operation, Request};
pub use transaction::{
    image_id, item_image_table_schema, transaction_table_schema, AddOutcome, RequestMap,
    Transaction, TransactionRecord,
};
