//! Transactions and their durable record.
//!
//! A [`TransactionRecord`] is the commit point: its state flips from
//! pending to committed or rolled back in one conditional write, and every
//! item-level step is redone idempotently from it. A [`Transaction`] drives
//! the protocol on top.

mod engine;
mod record;

pub use engine::Transaction;
pub use record::{
    image_id, item_image_table_schema, transaction_table_schema, AddOutcome, RequestMap,
    TransactionRecord,
};
