//! Transaction manager configuration.

/// Configuration for a [`crate::TransactionManager`].
///
/// The attempt counts bound every optimistic retry loop in the protocol.
/// Exhausting one surfaces a typed error instead of retrying forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionConfig {
    /// Table holding transaction records, keyed by `_TxId`.
    pub transaction_table: String,

    /// Table holding old item images, keyed by `_TxI`.
    pub item_image_table: String,

    /// Attempts to place the lock marker on an item.
    pub lock_acquire_attempts: u32,

    /// Times a request is retried after rolling back a conflicting owner.
    pub contention_resolution_attempts: u32,

    /// Attempts to append a request to the record under concurrent version bumps.
    pub add_request_attempts: u32,

    /// Extra attempts for commit when the record version moves underneath it.
    pub commit_attempts: u32,

    /// Attempts for rollback when the record version moves underneath it.
    pub rollback_attempts: u32,

    /// Times a read-committed read re-reads an item whose image vanished.
    pub read_committed_retries: u32,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            transaction_table: "Transactions".to_string(),
            item_image_table: "TransactionImages".to_string(),
            lock_acquire_attempts: 3,
            contention_resolution_attempts: 3,
            add_request_attempts: 3,
            commit_attempts: 2,
            rollback_attempts: 10,
            read_committed_retries: 2,
        }
    }
}

impl TransactionConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the transaction record table name.
    #[must_use]
    pub fn transaction_table(mut self, name: impl Into<String>) -> Self {
        self.transaction_table = name.into();
        self
    }

    /// Sets the old item image table name.
    #[must_use]
    pub fn item_image_table(mut self, name: impl Into<String>) -> Self {
        self.item_image_table = name.into();
        self
    }

    /// Sets the lock acquisition attempts.
    #[must_use]
    pub const fn lock_acquire_attempts(mut self, attempts: u32) -> Self {
        self.lock_acquire_attempts = attempts;
        self
    }

    /// Sets the contention resolution attempts.
    #[must_use]
    pub const fn contention_resolution_attempts(mut self, attempts: u32) -> Self {
        self.contention_resolution_attempts = attempts;
        self
    }

    /// Sets the add-request attempts.
    #[must_use]
    pub const fn add_request_attempts(mut self, attempts: u32) -> Self {
        self.add_request_attempts = attempts;
        self
    }

    /// Sets the extra commit attempts.
    #[must_use]
    pub const fn commit_attempts(mut self, attempts: u32) -> Self {
        self.commit_attempts = attempts;
        self
    }

    /// Sets the rollback attempts.
    #[must_use]
    pub const fn rollback_attempts(mut self, attempts: u32) -> Self {
        self.rollback_attempts = attempts;
        self
    }

    /// Sets the read-committed retries.
    #[must_use]
    pub const fn read_committed_retries(mut self, retries: u32) -> Self {
        self.read_committed_retries = retries;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = TransactionConfig::default();
        assert_eq!(config.transaction_table, "Transactions");
        assert_eq!(config.item_image_table, "TransactionImages");
        assert_eq!(config.lock_acquire_attempts, 3);
        assert_eq!(config.rollback_attempts, 10);
    }

    #[test]
    fn builder_pattern() {
        let config = TransactionConfig::new()
            .transaction_table("Tx")
            .item_image_table("Img")
            .contention_resolution_attempts(5)
            .read_committed_retries(0);
        assert_eq!(config.transaction_table, "Tx");
        assert_eq!(config.item_image_table, "Img");
        assert_eq!(config.contention_resolution_attempts, 5);
        assert_eq!(config.read_committed_retries, 0);
    }
}
