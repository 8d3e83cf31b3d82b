//! Transactional requests.
//!
//! A [`Request`] wraps one store request and is persisted inside the
//! transaction record as CBOR. The encoding is deterministic, so a stored
//! request decodes and re-encodes to the bytes it was read from.

use serde::{Deserialize, Serialize};
use txkv_codec::{from_cbor, to_cbor, Item};
use txkv_storage::{
    DeleteItemRequest, GetItemRequest, KeySchema, PutItemRequest, ReturnConsumedCapacity,
    ReturnItemCollectionMetrics, ReturnValue, UpdateItemRequest,
};

use crate::attributes::is_reserved;
use crate::error::{TxError, TxResult};

/// The store operation a request performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Read the item and hold a read lock on it.
    Get(GetItemRequest),
    /// Replace the item.
    Put(PutItemRequest),
    /// Modify attributes of the item.
    Update(UpdateItemRequest),
    /// Delete the item at commit.
    Delete(DeleteItemRequest),
}

/// One item-level operation belonging to a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Record version at the time the request was added.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rid: Option<u64>,
    /// The wrapped operation.
    op: Operation,
}

impl Request {
    /// Create a request that has not been added to a record yet.
    pub fn new(op: Operation) -> Self {
        Self { rid: None, op }
    }

    /// Request id, assigned when the request is added to a record.
    pub fn rid(&self) -> Option<u64> {
        self.rid
    }

    /// Returns the request with `rid` assigned, as decoded from a record.
    #[must_use]
    pub fn with_rid(mut self, rid: u64) -> Self {
        self.rid = Some(rid);
        self
    }

    pub(crate) fn set_rid(&mut self, rid: u64) {
        self.rid = Some(rid);
    }

    /// The wrapped operation.
    pub fn op(&self) -> &Operation {
        &self.op
    }

    /// Target table.
    pub fn table_name(&self) -> &str {
        match &self.op {
            Operation::Get(r) => &r.table_name,
            Operation::Put(r) => &r.table_name,
            Operation::Update(r) => &r.table_name,
            Operation::Delete(r) => &r.table_name,
        }
    }

    /// The primary key of the target item.
    ///
    /// Put requests carry no key of their own, so it is cut out of the item
    /// with the table's schema. Returns `None` if the item lacks a key
    /// attribute.
    pub fn key_with(&self, schema: &KeySchema) -> Option<Item> {
        match &self.op {
            Operation::Get(r) => Some(r.key.clone()),
            Operation::Put(r) => schema.extract_key(&r.item),
            Operation::Update(r) => Some(r.key.clone()),
            Operation::Delete(r) => Some(r.key.clone()),
        }
    }

    /// The key carried by the request itself, if any.
    pub fn explicit_key(&self) -> Option<&Item> {
        match &self.op {
            Operation::Get(r) => Some(&r.key),
            Operation::Put(_) => None,
            Operation::Update(r) => Some(&r.key),
            Operation::Delete(r) => Some(&r.key),
        }
    }

    /// Requested return values.
    pub fn return_values(&self) -> Option<ReturnValue> {
        match &self.op {
            Operation::Get(_) => None,
            Operation::Put(r) => r.return_values,
            Operation::Update(r) => r.return_values,
            Operation::Delete(r) => r.return_values,
        }
    }

    /// Attributes a Get asked for.
    pub fn attributes_to_get(&self) -> Option<&[String]> {
        match &self.op {
            Operation::Get(r) => r.attributes_to_get.as_deref(),
            _ => None,
        }
    }

    /// Returns true for a read-lock request.
    pub fn is_get(&self) -> bool {
        matches!(self.op, Operation::Get(_))
    }

    /// Returns true for a Delete.
    pub fn is_delete(&self) -> bool {
        matches!(self.op, Operation::Delete(_))
    }

    /// Returns true for Put, Update and Delete.
    pub fn is_write(&self) -> bool {
        !self.is_get()
    }

    /// Check the structural rules for requests inside a transaction.
    ///
    /// Key resolution is checked separately because it may need the table
    /// schema.
    ///
    /// # Errors
    ///
    /// Returns `TxError::InvalidRequest` describing the first broken rule.
    pub fn validate(&self, tx_id: &str) -> TxResult<()> {
        let invalid = |message: &str| {
            Err(TxError::invalid_request(
                tx_id,
                self.table_name(),
                self.explicit_key().cloned(),
                message,
            )
            .with_request(self.clone()))
        };

        if self.table_name().is_empty() {
            return invalid("table name must not be empty");
        }
        if let Some(key) = self.explicit_key() {
            if key.is_empty() {
                return invalid("key must not be empty");
            }
        }
        if let Some(rv) = self.return_values() {
            if !matches!(rv, ReturnValue::None | ReturnValue::AllOld | ReturnValue::AllNew) {
                return invalid("return values must be one of NONE, ALL_OLD or ALL_NEW");
            }
        }
        if let Operation::Put(r) = &self.op {
            if r.item.is_empty() {
                return invalid("put item must not be empty");
            }
        }
        if let Some(feature) = self.unsupported_feature() {
            return invalid(&format!("{feature} are not supported in a transaction"));
        }
        if let Some(name) = self.attribute_names().find(|name| is_reserved(name)) {
            return invalid(&format!(
                "attribute name {name} uses the reserved prefix {}",
                crate::attributes::RESERVED_PREFIX
            ));
        }
        Ok(())
    }

    /// Resolve the key against the table's key schema.
    ///
    /// An explicit key must hold exactly the key attributes, and an update
    /// must not touch them.
    ///
    /// # Errors
    ///
    /// Returns `TxError::InvalidRequest` if the key does not fit the schema.
    pub fn validate_key(&self, tx_id: &str, schema: &KeySchema) -> TxResult<Item> {
        let invalid = |message: String| {
            TxError::invalid_request(
                tx_id,
                self.table_name(),
                self.explicit_key().cloned(),
                message,
            )
            .with_request(self.clone())
        };

        if let Some(key) = self.explicit_key() {
            if !schema.matches_key(key) {
                return Err(invalid(format!(
                    "key must hold exactly the key attributes {:?}",
                    schema.attribute_names().collect::<Vec<_>>()
                )));
            }
        }
        if let Operation::Update(r) = &self.op {
            if let Some(name) = r.attribute_updates.keys().find(|n| schema.is_key_attribute(n)) {
                return Err(invalid(format!("cannot update key attribute {name}")));
            }
        }
        self.key_with(schema).ok_or_else(|| {
            invalid("the request does not contain the table's key attributes".to_string())
        })
    }

    fn unsupported_feature(&self) -> Option<&'static str> {
        fn capacity(v: Option<ReturnConsumedCapacity>) -> bool {
            !matches!(v, None | Some(ReturnConsumedCapacity::None))
        }
        fn metrics(v: Option<ReturnItemCollectionMetrics>) -> bool {
            !matches!(v, None | Some(ReturnItemCollectionMetrics::None))
        }

        let (expected, condition, update, names, values, cap, met) = match &self.op {
            Operation::Get(r) => {
                if r.projection_expression.is_some() {
                    return Some("projection expressions");
                }
                (
                    false,
                    false,
                    false,
                    r.expression_attribute_names.is_some(),
                    false,
                    capacity(r.return_consumed_capacity),
                    false,
                )
            }
            Operation::Put(r) => (
                !r.expected.is_empty(),
                r.condition_expression.is_some(),
                false,
                r.expression_attribute_names.is_some(),
                r.expression_attribute_values.is_some(),
                capacity(r.return_consumed_capacity),
                metrics(r.return_item_collection_metrics),
            ),
            Operation::Update(r) => (
                !r.expected.is_empty(),
                r.condition_expression.is_some(),
                r.update_expression.is_some(),
                r.expression_attribute_names.is_some(),
                r.expression_attribute_values.is_some(),
                capacity(r.return_consumed_capacity),
                metrics(r.return_item_collection_metrics),
            ),
            Operation::Delete(r) => (
                !r.expected.is_empty(),
                r.condition_expression.is_some(),
                false,
                r.expression_attribute_names.is_some(),
                r.expression_attribute_values.is_some(),
                capacity(r.return_consumed_capacity),
                metrics(r.return_item_collection_metrics),
            ),
        };

        [
            (expected, "expected values"),
            (condition, "condition expressions"),
            (update, "update expressions"),
            (names, "expression attribute names"),
            (values, "expression attribute values"),
            (cap, "consumed capacity reports"),
            (met, "item collection metrics"),
        ]
        .into_iter()
        .find_map(|(present, feature)| present.then_some(feature))
    }

    fn attribute_names(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        match &self.op {
            Operation::Get(r) => Box::new(
                r.key
                    .keys()
                    .chain(r.attributes_to_get.iter().flatten())
                    .map(String::as_str),
            ),
            Operation::Put(r) => Box::new(r.item.keys().map(String::as_str)),
            Operation::Update(r) => Box::new(
                r.key
                    .keys()
                    .chain(r.attribute_updates.keys())
                    .map(String::as_str),
            ),
            Operation::Delete(r) => Box::new(r.key.keys().map(String::as_str)),
        }
    }

    /// Encode for storage in a transaction record.
    ///
    /// # Errors
    ///
    /// Returns a codec error if encoding fails.
    pub fn to_bytes(&self) -> TxResult<Vec<u8>> {
        Ok(to_cbor(self)?)
    }

    /// Decode a request stored in a transaction record.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the bytes are not an encoded request.
    pub fn from_bytes(bytes: &[u8]) -> TxResult<Self> {
        Ok(from_cbor(bytes)?)
    }
}

impl From<GetItemRequest> for Request {
    fn from(r: GetItemRequest) -> Self {
        Self::new(Operation::Get(r))
    }
}

impl From<PutItemRequest> for Request {
    fn from(r: PutItemRequest) -> Self {
        Self::new(Operation::Put(r))
    }
}

impl From<UpdateItemRequest> for Request {
    fn from(r: UpdateItemRequest) -> Self {
        Self::new(Operation::Update(r))
    }
}

impl From<DeleteItemRequest> for Request {
    fn from(r: DeleteItemRequest) -> Self {
        Self::new(Operation::Delete(r))
    }
}
