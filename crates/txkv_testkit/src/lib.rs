//! # txkv Testkit
//!
//! Test utilities for txkv.
//!
//! This crate provides:
//! - [`TestEnv`]: an in-memory store with the transaction tables and two
//!   application tables provisioned, plus a manager over it
//! - Property-based test generators using proptest
//! - [`FaultInjectingStore`]: a store wrapper that fails chosen calls
//!   before or after they reach the store, to simulate crashes
//! - [`init_tracing`]: a test subscriber honouring `RUST_LOG`
//!
//! ## Usage
//!
//! ```rust
//! use txkv_testkit::prelude::*;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let env = TestEnv::new();
//! let tx = env.manager.new_transaction().await.unwrap();
//! tx.put_item(put(ITEMS, [("Id", "a"), ("v", "1")])).await.unwrap();
//! tx.commit().await.unwrap();
//! assert_eq!(env.raw(ITEMS, key("a")).await, Some(item([("Id", "a"), ("v", "1")])));
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;

use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
    pub use txkv_codec::{item, AttributeValue, Item};
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;

/// Installs a fmt subscriber filtered by `RUST_LOG`, once per process.
///
/// Output goes through the test writer so it is captured per test.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
