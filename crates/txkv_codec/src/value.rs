//! Attribute value model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single item: attribute name to value.
///
/// A `BTreeMap` keeps attribute order stable, so an encoded item is the same
/// bytes no matter how it was built.
pub type Item = BTreeMap<String, AttributeValue>;

/// A typed attribute value as stored by the backing key-value store.
///
/// Numbers are carried as their decimal string representation and are not
/// interpreted except where the store performs arithmetic (`ADD`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttributeValue {
    /// String value.
    S(String),
    /// Number value, kept as a decimal string.
    N(String),
    /// Binary value.
    B(Vec<u8>),
    /// Boolean value.
    Bool(bool),
    /// Null value.
    Null,
    /// Ordered list of values.
    L(Vec<AttributeValue>),
    /// Nested map of values.
    M(BTreeMap<String, AttributeValue>),
    /// Set of strings.
    SS(Vec<String>),
    /// Set of numbers.
    NS(Vec<String>),
    /// Set of binary values.
    BS(Vec<Vec<u8>>),
}

impl AttributeValue {
    /// Create a string value.
    pub fn s(value: impl Into<String>) -> Self {
        Self::S(value.into())
    }

    /// Create a number value from anything with a decimal representation.
    pub fn n(value: impl ToString) -> Self {
        Self::N(value.to_string())
    }

    /// Create a string set. Members are sorted and deduplicated.
    pub fn string_set<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut members: Vec<String> = members.into_iter().map(Into::into).collect();
        members.sort();
        members.dedup();
        Self::SS(members)
    }

    /// Create a number set. Members are sorted and deduplicated.
    pub fn number_set<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        let mut members: Vec<String> = members.into_iter().map(|m| m.to_string()).collect();
        members.sort();
        members.dedup();
        Self::NS(members)
    }

    /// Create a binary set. Members are sorted and deduplicated.
    pub fn binary_set<I>(members: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let mut members: Vec<Vec<u8>> = members.into_iter().collect();
        members.sort();
        members.dedup();
        Self::BS(members)
    }

    /// Get the string payload, if this is a string.
    pub fn as_s(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            _ => None,
        }
    }

    /// Get the raw number text, if this is a number.
    pub fn as_n(&self) -> Option<&str> {
        match self {
            Self::N(n) => Some(n),
            _ => None,
        }
    }

    /// Parse a number value as an integer.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_n().and_then(|n| n.parse().ok())
    }

    /// Get the binary payload, if this is binary.
    pub fn as_b(&self) -> Option<&[u8]> {
        match self {
            Self::B(b) => Some(b),
            _ => None,
        }
    }

    /// Get the members of a binary set.
    pub fn as_bs(&self) -> Option<&[Vec<u8>]> {
        match self {
            Self::BS(members) => Some(members),
            _ => None,
        }
    }

    /// Returns true if this is the null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns true if this is one of the set types.
    pub fn is_set(&self) -> bool {
        matches!(self, Self::SS(_) | Self::NS(_) | Self::BS(_))
    }

    /// Rough stored size in bytes, used for item size limits.
    pub fn estimated_size(&self) -> usize {
        match self {
            Self::S(s) | Self::N(s) => s.len(),
            Self::B(b) => b.len(),
            Self::Bool(_) | Self::Null => 1,
            Self::L(values) => 3 + values.iter().map(|v| 1 + v.estimated_size()).sum::<usize>(),
            Self::M(map) => 3 + item_size(map),
            Self::SS(members) | Self::NS(members) => members.iter().map(String::len).sum(),
            Self::BS(members) => members.iter().map(Vec::len).sum(),
        }
    }
}

/// Rough stored size of an item: attribute names plus values.
pub fn item_size(item: &Item) -> usize {
    item.iter()
        .map(|(name, value)| name.len() + value.estimated_size())
        .sum()
}

/// Build an item from `(name, value)` pairs.
pub fn item<K, V, I>(pairs: I) -> Item
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<AttributeValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        Self::S(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        Self::S(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(n: i64) -> Self {
        Self::N(n.to_string())
    }
}

impl From<u64> for AttributeValue {
    fn from(n: u64) -> Self {
        Self::N(n.to_string())
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(b: Vec<u8>) -> Self {
        Self::B(b)
    }
}

impl From<Item> for AttributeValue {
    fn from(m: Item) -> Self {
        Self::M(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sets_are_sorted_and_deduplicated() {
        let set = AttributeValue::string_set(["b", "a", "b"]);
        assert_eq!(set, AttributeValue::SS(vec!["a".into(), "b".into()]));

        let set = AttributeValue::binary_set(vec![vec![2], vec![1], vec![2]]);
        assert_eq!(set.as_bs().unwrap(), &[vec![1], vec![2]]);
    }

    #[test]
    fn number_accessors() {
        let n = AttributeValue::n(42);
        assert_eq!(n.as_n(), Some("42"));
        assert_eq!(n.as_i64(), Some(42));
        assert_eq!(AttributeValue::n("1.5").as_i64(), None);
        assert_eq!(AttributeValue::s("42").as_i64(), None);
    }

    #[test]
    fn item_builder_and_size() {
        let it = item([("Id", "k1"), ("attr", "abc")]);
        assert_eq!(it.len(), 2);
        assert_eq!(item_size(&it), "Id".len() + 2 + "attr".len() + 3);
    }

    #[test]
    fn nested_size_counts_children() {
        let inner = item([("x", "yy")]);
        let value = AttributeValue::L(vec![AttributeValue::M(inner), AttributeValue::Null]);
        assert!(value.estimated_size() > 3);
    }

    #[test]
    fn from_impls() {
        assert_eq!(AttributeValue::from("x"), AttributeValue::S("x".into()));
        assert_eq!(AttributeValue::from(7_i64), AttributeValue::N("7".into()));
        assert_eq!(AttributeValue::from(true), AttributeValue::Bool(true));
        assert_eq!(AttributeValue::from(vec![1_u8]), AttributeValue::B(vec![1]));
    }
}
