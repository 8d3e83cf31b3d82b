//! Reserved attributes and item helpers.
//!
//! While an item takes part in a transaction it carries a few "shadow"
//! attributes next to its own data. Transaction records and item images use
//! the same reserved prefix for their bookkeeping fields.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use txkv_codec::{AttributeValue, Item};

/// Prefix reserved for transaction bookkeeping attributes.
pub const RESERVED_PREFIX: &str = "_Tx";

/// Every attribute name the protocol owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeName {
    /// Lock owner on items; primary key of transaction records.
    TxId,
    /// Item was inserted only to hold a lock.
    Transient,
    /// The owning transaction's write has been applied.
    Applied,
    /// Last time the lock or record was touched.
    Date,
    /// Primary key of an old item image.
    ImageId,
    /// Record state.
    State,
    /// Record version.
    Version,
    /// Record's serialized requests.
    Requests,
    /// Record's finalized marker.
    Finalized,
}

impl AttributeName {
    /// The attribute name as stored.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TxId => "_TxId",
            Self::Transient => "_TxT",
            Self::Applied => "_TxA",
            Self::Date => "_TxD",
            Self::ImageId => "_TxI",
            Self::State => "_TxS",
            Self::Version => "_TxV",
            Self::Requests => "_TxR",
            Self::Finalized => "_TxF",
        }
    }
}

impl fmt::Display for AttributeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The attributes that may appear on a business item or its image.
pub const SHADOW_ATTRIBUTES: [AttributeName; 5] = [
    AttributeName::TxId,
    AttributeName::Transient,
    AttributeName::Applied,
    AttributeName::Date,
    AttributeName::ImageId,
];

/// Value stored for boolean markers.
pub fn truthy() -> AttributeValue {
    AttributeValue::s("1")
}

/// Returns true if `name` uses the reserved prefix.
pub fn is_reserved(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIX)
}

/// Id of the transaction holding the item's lock.
pub fn lock_owner(item: &Item) -> Option<&str> {
    item.get(AttributeName::TxId.as_str())
        .and_then(AttributeValue::as_s)
}

/// Returns true if some transaction holds the item's lock.
pub fn is_locked(item: &Item) -> bool {
    item.contains_key(AttributeName::TxId.as_str())
}

/// Returns true if the item exists only to hold a lock.
pub fn is_transient(item: &Item) -> bool {
    item.contains_key(AttributeName::Transient.as_str())
}

/// Returns true if the lock owner's write has reached the item.
pub fn is_applied(item: &Item) -> bool {
    item.contains_key(AttributeName::Applied.as_str())
}

/// Remove every shadow attribute from an item.
pub fn strip_shadow_attributes(item: &mut Item) {
    for name in SHADOW_ATTRIBUTES {
        item.remove(name.as_str());
    }
}

/// Keep only `attributes_to_get`, or everything when unset.
pub(crate) fn filter_attributes(item: Item, attributes_to_get: Option<&[String]>) -> Item {
    match attributes_to_get {
        None => item,
        Some(names) => item
            .into_iter()
            .filter(|(name, _)| names.contains(name))
            .collect(),
    }
}

/// State of a transaction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Accepting requests.
    Pending,
    /// Committed; items may still await unlocking.
    Committed,
    /// Rolled back; items may still await restoring.
    RolledBack,
}

impl TransactionState {
    /// Stored representation.
    pub const fn code(self) -> &'static str {
        match self {
            Self::Pending => "P",
            Self::Committed => "C",
            Self::RolledBack => "R",
        }
    }

    /// Stored representation as an attribute value.
    pub fn to_value(self) -> AttributeValue {
        AttributeValue::s(self.code())
    }

    /// Parse the stored representation.
    pub fn from_value(value: &AttributeValue) -> Option<Self> {
        match value.as_s()? {
            "P" => Some(Self::Pending),
            "C" => Some(Self::Committed),
            "R" => Some(Self::RolledBack),
            _ => None,
        }
    }
}

/// A table name and primary key, compared by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImmutableKey {
    /// Table of the item.
    pub table_name: String,
    /// Primary key attributes of the item.
    pub key: Item,
}

impl ImmutableKey {
    /// Create a key for `table_name`.
    pub fn new(table_name: impl Into<String>, key: Item) -> Self {
        Self {
            table_name: table_name.into(),
            key,
        }
    }
}

/// Seconds since the epoch with millisecond precision, as a number value.
///
/// Only a staleness hint for sweeping; clocks across processes are not
/// assumed to agree.
pub fn current_time() -> AttributeValue {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    let millis = now.as_millis();
    AttributeValue::N(format!("{}.{:03}", millis / 1_000, millis % 1_000))
}

/// Parse a value written by [`current_time`].
pub fn parse_time(value: &AttributeValue) -> Option<f64> {
    value.as_n()?.parse().ok()
}

/// Returns true if `stamp` is more than `age` in the past.
pub(crate) fn is_older_than(stamp: Option<&AttributeValue>, age: Duration) -> bool {
    let Some(then) = stamp.and_then(parse_time) else {
        return true;
    };
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs_f64();
    now - then >= age.as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use txkv_codec::item;

    #[test]
    fn shadow_names_are_reserved() {
        for name in SHADOW_ATTRIBUTES {
            assert!(is_reserved(name.as_str()));
        }
        assert!(is_reserved(AttributeName::Requests.as_str()));
        assert!(!is_reserved("Tx"));
    }

    #[test]
    fn lock_helpers() {
        let mut it = item([("Id", "a"), ("_TxId", "tx1"), ("_TxA", "1")]);
        assert!(is_locked(&it));
        assert_eq!(lock_owner(&it), Some("tx1"));
        assert!(is_applied(&it));
        assert!(!is_transient(&it));

        strip_shadow_attributes(&mut it);
        assert_eq!(it, item([("Id", "a")]));
        assert!(!is_locked(&it));
    }

    #[test]
    fn filter_keeps_requested() {
        let it = item([("a", "1"), ("b", "2")]);
        let names = vec!["b".to_string(), "missing".to_string()];
        assert_eq!(filter_attributes(it.clone(), Some(&names)), item([("b", "2")]));
        assert_eq!(filter_attributes(it.clone(), None), it);
    }

    #[test]
    fn state_codes() {
        for state in [
            TransactionState::Pending,
            TransactionState::Committed,
            TransactionState::RolledBack,
        ] {
            assert_eq!(TransactionState::from_value(&state.to_value()), Some(state));
        }
        assert_eq!(TransactionState::from_value(&AttributeValue::s("X")), None);
    }

    #[test]
    fn immutable_key_is_value_based() {
        let a = ImmutableKey::new("T", item([("Id", "k")]));
        let b = ImmutableKey::new("T".to_string(), item([("Id", "k")]));
        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
        assert!(!set.contains(&ImmutableKey::new("U", item([("Id", "k")]))));
    }

    #[test]
    fn time_helpers() {
        let now = current_time();
        assert!(parse_time(&now).is_some());
        assert!(!is_older_than(Some(&now), Duration::from_secs(60)));
        assert!(is_older_than(Some(&now), Duration::ZERO));
        assert!(is_older_than(None, Duration::from_secs(60)));
    }
}
