//! Request and response types for the store API.
//!
//! Every optional field is skipped when unset, and every map is a
//! `BTreeMap`, so a request encodes to the same bytes after a decode.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use txkv_codec::{AttributeValue, Item};

/// Primary key schema of a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeySchema {
    /// Name of the hash (partition) key attribute.
    pub hash_key: String,
    /// Name of the range (sort) key attribute, if the table has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_key: Option<String>,
}

impl KeySchema {
    /// Schema with only a hash key.
    pub fn hash(hash_key: impl Into<String>) -> Self {
        Self {
            hash_key: hash_key.into(),
            range_key: None,
        }
    }

    /// Schema with a hash key and a range key.
    pub fn hash_range(hash_key: impl Into<String>, range_key: impl Into<String>) -> Self {
        Self {
            hash_key: hash_key.into(),
            range_key: Some(range_key.into()),
        }
    }

    /// Names of the key attributes, hash key first.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.hash_key.as_str()).chain(self.range_key.as_deref())
    }

    /// Returns true if `name` is one of the key attributes.
    pub fn is_key_attribute(&self, name: &str) -> bool {
        self.attribute_names().any(|k| k == name)
    }

    /// Returns true if `key` holds exactly the key attributes.
    pub fn matches_key(&self, key: &Item) -> bool {
        key.len() == self.attribute_names().count()
            && self.attribute_names().all(|name| key.contains_key(name))
    }

    /// Extract the primary key from an item.
    ///
    /// Returns `None` if any key attribute is missing.
    pub fn extract_key(&self, item: &Item) -> Option<Item> {
        self.attribute_names()
            .map(|name| item.get(name).map(|v| (name.to_string(), v.clone())))
            .collect()
    }
}

/// A precondition on one attribute of the item being written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpectedAttributeValue {
    /// The attribute must be present, with any value.
    Exists,
    /// The attribute must be absent (or the item must not exist).
    NotExists,
    /// The attribute must be present and equal to the value.
    Equals(AttributeValue),
}

impl ExpectedAttributeValue {
    /// Evaluate against the current value of the attribute.
    pub fn matches(&self, current: Option<&AttributeValue>) -> bool {
        match (self, current) {
            (Self::Exists, Some(_)) => true,
            (Self::NotExists, None) => true,
            (Self::Equals(expected), Some(actual)) => expected == actual,
            _ => false,
        }
    }
}

/// One attribute action of an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValueUpdate {
    /// Replace the attribute.
    Put(AttributeValue),
    /// Remove the attribute, or remove members from a set when a set is given.
    Delete(Option<AttributeValue>),
    /// Add to a number, or union into a set. Creates the attribute if absent.
    Add(AttributeValue),
}

/// Which attribute values a write returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReturnValue {
    /// Return nothing.
    #[default]
    None,
    /// The whole item as it was before the write.
    AllOld,
    /// The updated attributes as they were before the write.
    UpdatedOld,
    /// The whole item as it is after the write.
    AllNew,
    /// The updated attributes as they are after the write.
    UpdatedNew,
}

impl ReturnValue {
    /// Wire name of the value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::AllOld => "ALL_OLD",
            Self::UpdatedOld => "UPDATED_OLD",
            Self::AllNew => "ALL_NEW",
            Self::UpdatedNew => "UPDATED_NEW",
        }
    }
}

/// Consumed-capacity reporting level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReturnConsumedCapacity {
    /// No reporting.
    #[default]
    None,
    /// Aggregate capacity.
    Total,
    /// Capacity per table and index.
    Indexes,
}

/// Item collection metrics reporting level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReturnItemCollectionMetrics {
    /// No reporting.
    #[default]
    None,
    /// Report collection sizes.
    Size,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Read a single item by key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetItemRequest {
    /// Table to read.
    pub table_name: String,
    /// Primary key of the item.
    pub key: Item,
    /// Use a strongly consistent read.
    #[serde(default, skip_serializing_if = "is_false")]
    pub consistent_read: bool,
    /// Attributes to return. All attributes when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes_to_get: Option<Vec<String>>,
    /// Projection expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection_expression: Option<String>,
    /// Substitution tokens for expression attribute names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression_attribute_names: Option<BTreeMap<String, String>>,
    /// Consumed capacity reporting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_consumed_capacity: Option<ReturnConsumedCapacity>,
}

impl GetItemRequest {
    /// Create a request for the item with `key`.
    pub fn new(table_name: impl Into<String>, key: Item) -> Self {
        Self {
            table_name: table_name.into(),
            key,
            consistent_read: false,
            attributes_to_get: None,
            projection_expression: None,
            expression_attribute_names: None,
            return_consumed_capacity: None,
        }
    }

    /// Set strongly consistent reads.
    #[must_use]
    pub fn with_consistent_read(mut self, consistent: bool) -> Self {
        self.consistent_read = consistent;
        self
    }

    /// Limit the returned attributes.
    #[must_use]
    pub fn with_attributes_to_get<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes_to_get = Some(names.into_iter().map(Into::into).collect());
        self
    }
}

/// Create or replace a whole item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutItemRequest {
    /// Table to write.
    pub table_name: String,
    /// The item, including its key attributes.
    pub item: Item,
    /// Per-attribute preconditions.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub expected: BTreeMap<String, ExpectedAttributeValue>,
    /// Condition expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_expression: Option<String>,
    /// Substitution tokens for expression attribute names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression_attribute_names: Option<BTreeMap<String, String>>,
    /// Substitution tokens for expression attribute values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression_attribute_values: Option<BTreeMap<String, AttributeValue>>,
    /// Values to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_values: Option<ReturnValue>,
    /// Consumed capacity reporting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_consumed_capacity: Option<ReturnConsumedCapacity>,
    /// Item collection metrics reporting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_item_collection_metrics: Option<ReturnItemCollectionMetrics>,
}

impl PutItemRequest {
    /// Create a request writing `item`.
    pub fn new(table_name: impl Into<String>, item: Item) -> Self {
        Self {
            table_name: table_name.into(),
            item,
            expected: BTreeMap::new(),
            condition_expression: None,
            expression_attribute_names: None,
            expression_attribute_values: None,
            return_values: None,
            return_consumed_capacity: None,
            return_item_collection_metrics: None,
        }
    }

    /// Add a precondition.
    #[must_use]
    pub fn with_expected(mut self, name: impl Into<String>, expected: ExpectedAttributeValue) -> Self {
        self.expected.insert(name.into(), expected);
        self
    }

    /// Set the return values.
    #[must_use]
    pub fn with_return_values(mut self, return_values: ReturnValue) -> Self {
        self.return_values = Some(return_values);
        self
    }
}

/// Modify attributes of an item, creating it if absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateItemRequest {
    /// Table to write.
    pub table_name: String,
    /// Primary key of the item.
    pub key: Item,
    /// Attribute actions.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attribute_updates: BTreeMap<String, AttributeValueUpdate>,
    /// Per-attribute preconditions.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub expected: BTreeMap<String, ExpectedAttributeValue>,
    /// Condition expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_expression: Option<String>,
    /// Update expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_expression: Option<String>,
    /// Substitution tokens for expression attribute names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression_attribute_names: Option<BTreeMap<String, String>>,
    /// Substitution tokens for expression attribute values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression_attribute_values: Option<BTreeMap<String, AttributeValue>>,
    /// Values to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_values: Option<ReturnValue>,
    /// Consumed capacity reporting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_consumed_capacity: Option<ReturnConsumedCapacity>,
    /// Item collection metrics reporting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_item_collection_metrics: Option<ReturnItemCollectionMetrics>,
}

impl UpdateItemRequest {
    /// Create an update of the item with `key`.
    pub fn new(table_name: impl Into<String>, key: Item) -> Self {
        Self {
            table_name: table_name.into(),
            key,
            attribute_updates: BTreeMap::new(),
            expected: BTreeMap::new(),
            condition_expression: None,
            update_expression: None,
            expression_attribute_names: None,
            expression_attribute_values: None,
            return_values: None,
            return_consumed_capacity: None,
            return_item_collection_metrics: None,
        }
    }

    /// Add an attribute action.
    #[must_use]
    pub fn with_update(mut self, name: impl Into<String>, update: AttributeValueUpdate) -> Self {
        self.attribute_updates.insert(name.into(), update);
        self
    }

    /// Shorthand for a `Put` action.
    #[must_use]
    pub fn with_put(self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.with_update(name, AttributeValueUpdate::Put(value.into()))
    }

    /// Add a precondition.
    #[must_use]
    pub fn with_expected(mut self, name: impl Into<String>, expected: ExpectedAttributeValue) -> Self {
        self.expected.insert(name.into(), expected);
        self
    }

    /// Set the return values.
    #[must_use]
    pub fn with_return_values(mut self, return_values: ReturnValue) -> Self {
        self.return_values = Some(return_values);
        self
    }
}

/// Delete an item by key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteItemRequest {
    /// Table to write.
    pub table_name: String,
    /// Primary key of the item.
    pub key: Item,
    /// Per-attribute preconditions.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub expected: BTreeMap<String, ExpectedAttributeValue>,
    /// Condition expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_expression: Option<String>,
    /// Substitution tokens for expression attribute names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression_attribute_names: Option<BTreeMap<String, String>>,
    /// Substitution tokens for expression attribute values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression_attribute_values: Option<BTreeMap<String, AttributeValue>>,
    /// Values to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_values: Option<ReturnValue>,
    /// Consumed capacity reporting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_consumed_capacity: Option<ReturnConsumedCapacity>,
    /// Item collection metrics reporting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_item_collection_metrics: Option<ReturnItemCollectionMetrics>,
}

impl DeleteItemRequest {
    /// Create a delete of the item with `key`.
    pub fn new(table_name: impl Into<String>, key: Item) -> Self {
        Self {
            table_name: table_name.into(),
            key,
            expected: BTreeMap::new(),
            condition_expression: None,
            expression_attribute_names: None,
            expression_attribute_values: None,
            return_values: None,
            return_consumed_capacity: None,
            return_item_collection_metrics: None,
        }
    }

    /// Add a precondition.
    #[must_use]
    pub fn with_expected(mut self, name: impl Into<String>, expected: ExpectedAttributeValue) -> Self {
        self.expected.insert(name.into(), expected);
        self
    }

    /// Set the return values.
    #[must_use]
    pub fn with_return_values(mut self, return_values: ReturnValue) -> Self {
        self.return_values = Some(return_values);
        self
    }
}

/// Comparison used in query key conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    /// Equal.
    Eq,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// String or binary prefix.
    BeginsWith,
    /// Inclusive range, two operands.
    Between,
}

/// A key condition: operator plus operands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// The comparison.
    pub operator: ComparisonOperator,
    /// Operands; `Between` takes two, everything else one.
    pub values: Vec<AttributeValue>,
}

impl Condition {
    /// Equality condition.
    pub fn eq(value: impl Into<AttributeValue>) -> Self {
        Self {
            operator: ComparisonOperator::Eq,
            values: vec![value.into()],
        }
    }

    /// Condition with an arbitrary operator.
    pub fn new(operator: ComparisonOperator, values: Vec<AttributeValue>) -> Self {
        Self { operator, values }
    }
}

/// Read every item in a table, page by page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanRequest {
    /// Table to scan.
    pub table_name: String,
    /// Attributes to return. All attributes when unset.
    pub attributes_to_get: Option<Vec<String>>,
    /// Maximum number of items in one page.
    pub limit: Option<usize>,
    /// Resume after this key.
    pub exclusive_start_key: Option<Item>,
    /// Use strongly consistent reads.
    pub consistent_read: bool,
}

impl ScanRequest {
    /// Scan all of `table_name`.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Self::default()
        }
    }

    /// Set the page size.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One page of scan results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutput {
    /// Items in key order.
    pub items: Vec<Item>,
    /// Key to resume from, if more items remain.
    pub last_evaluated_key: Option<Item>,
}

/// Read the items that share a hash key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    /// Table to query.
    pub table_name: String,
    /// Conditions on key attributes; the hash key must use `Eq`.
    pub key_conditions: BTreeMap<String, Condition>,
    /// Attributes to return. All attributes when unset.
    pub attributes_to_get: Option<Vec<String>>,
    /// Maximum number of items in one page.
    pub limit: Option<usize>,
    /// Resume after this key.
    pub exclusive_start_key: Option<Item>,
    /// Use strongly consistent reads.
    pub consistent_read: bool,
    /// Ascending range key order when true.
    pub scan_index_forward: bool,
}

impl QueryRequest {
    /// Query `table_name` with no conditions yet.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            key_conditions: BTreeMap::new(),
            attributes_to_get: None,
            limit: None,
            exclusive_start_key: None,
            consistent_read: false,
            scan_index_forward: true,
        }
    }

    /// Add a key condition.
    #[must_use]
    pub fn with_condition(mut self, name: impl Into<String>, condition: Condition) -> Self {
        self.key_conditions.insert(name.into(), condition);
        self
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOutput {
    /// Matching items in range key order.
    pub items: Vec<Item>,
    /// Key to resume from, if more items remain.
    pub last_evaluated_key: Option<Item>,
}

/// Keys to read from one table in a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeysAndAttributes {
    /// Primary keys to read.
    pub keys: Vec<Item>,
    /// Attributes to return. All attributes when unset.
    pub attributes_to_get: Option<Vec<String>>,
    /// Use strongly consistent reads.
    pub consistent_read: bool,
}

/// Read many items across tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchGetItemRequest {
    /// Table name to keys.
    pub request_items: BTreeMap<String, KeysAndAttributes>,
}

/// Result of a batch read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchGetItemOutput {
    /// Table name to the items that exist.
    pub responses: BTreeMap<String, Vec<Item>>,
    /// Keys the store did not get to; retry them.
    pub unprocessed_keys: BTreeMap<String, KeysAndAttributes>,
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescription {
    /// Table name.
    pub table_name: String,
    /// Primary key schema.
    pub key_schema: KeySchema,
    /// Number of items currently stored.
    pub item_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use txkv_codec::item;

    #[test]
    fn matches_key_wants_exactly_the_key_attributes() {
        let schema = KeySchema::hash_range("Id", "Sort");
        assert!(schema.matches_key(&item([("Id", "a"), ("Sort", "1")])));
        assert!(!schema.matches_key(&item([("Id", "a")])));
        assert!(!schema.matches_key(&item([("Id", "a"), ("Sort", "1"), ("x", "y")])));
        assert!(!KeySchema::hash("Id").matches_key(&item([("Other", "a")])));
    }

    #[test]
    fn extract_key_requires_all_attributes() {
        let schema = KeySchema::hash_range("Id", "Sort");
        let full = item([("Id", "a"), ("Sort", "1"), ("x", "y")]);
        assert_eq!(
            schema.extract_key(&full),
            Some(item([("Id", "a"), ("Sort", "1")]))
        );
        assert_eq!(schema.extract_key(&item([("Id", "a")])), None);
    }

    #[test]
    fn key_attribute_names() {
        let schema = KeySchema::hash("Id");
        assert!(schema.is_key_attribute("Id"));
        assert!(!schema.is_key_attribute("Sort"));
        assert_eq!(schema.attribute_names().count(), 1);
    }

    #[test]
    fn expected_matches() {
        let v = AttributeValue::s("x");
        assert!(ExpectedAttributeValue::Exists.matches(Some(&v)));
        assert!(!ExpectedAttributeValue::Exists.matches(None));
        assert!(ExpectedAttributeValue::NotExists.matches(None));
        assert!(!ExpectedAttributeValue::NotExists.matches(Some(&v)));
        assert!(ExpectedAttributeValue::Equals(v.clone()).matches(Some(&v)));
        assert!(!ExpectedAttributeValue::Equals(v).matches(Some(&AttributeValue::s("y"))));
    }

    #[test]
    fn return_value_names() {
        assert_eq!(ReturnValue::AllOld.as_str(), "ALL_OLD");
        assert_eq!(ReturnValue::default(), ReturnValue::None);
    }
}
