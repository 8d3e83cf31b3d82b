//! In-memory key-value store.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Bound;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;
use txkv_codec::{item_size, AttributeValue, Item};

use crate::backend::KvStore;
use crate::error::{StoreError, StoreResult};
use crate::request::{
    AttributeValueUpdate, BatchGetItemOutput, BatchGetItemRequest, ComparisonOperator, Condition,
    DeleteItemRequest, ExpectedAttributeValue, GetItemRequest, KeySchema, PutItemRequest,
    QueryOutput, QueryRequest, ReturnValue, ScanOutput, ScanRequest, TableDescription,
    UpdateItemRequest,
};

#[derive(Debug)]
struct Table {
    schema: KeySchema,
    /// Primary key to full item.
    items: BTreeMap<Item, Item>,
}

/// An in-memory conditional-write key-value store.
///
/// Each operation runs under a single table-set lock, so every conditional
/// write is atomic with respect to all other operations. Reads are always
/// consistent regardless of `consistent_read`.
///
/// Expression-based requests (condition, update and projection expressions)
/// are rejected with a validation error; only the attribute-map forms of the
/// API are implemented.
///
/// # Example
///
/// ```rust
/// use txkv_codec::item;
/// use txkv_storage::{GetItemRequest, InMemoryStore, KeySchema, KvStore, PutItemRequest};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let store = InMemoryStore::new();
/// store.create_table("Items", KeySchema::hash("Id")).unwrap();
/// store
///     .put_item(PutItemRequest::new("Items", item([("Id", "a"), ("v", "1")])))
///     .await
///     .unwrap();
/// let got = store
///     .get_item(GetItemRequest::new("Items", item([("Id", "a")])))
///     .await
///     .unwrap();
/// assert_eq!(got, Some(item([("Id", "a"), ("v", "1")])));
/// # });
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<BTreeMap<String, Table>>,
    max_item_size: Option<usize>,
}

impl InMemoryStore {
    /// Creates an empty store with no tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects writes whose resulting item is larger than `bytes`.
    #[must_use]
    pub fn with_max_item_size(mut self, bytes: usize) -> Self {
        self.max_item_size = Some(bytes);
        self
    }

    /// Creates a table.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the table already exists.
    pub fn create_table(&self, name: impl Into<String>, schema: KeySchema) -> StoreResult<()> {
        let name = name.into();
        let mut tables = self.tables.write();
        if tables.contains_key(&name) {
            return Err(StoreError::validation(format!("table already exists: {name}")));
        }
        debug!(table = %name, hash_key = %schema.hash_key, "created table");
        tables.insert(
            name,
            Table {
                schema,
                items: BTreeMap::new(),
            },
        );
        Ok(())
    }

    /// Drops a table and all its items.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if the table does not exist.
    pub fn delete_table(&self, name: &str) -> StoreResult<()> {
        self.tables
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::resource_not_found(name))
    }

    /// Returns every item of a table in key order.
    ///
    /// Useful for testing and debugging.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if the table does not exist.
    pub fn table_items(&self, name: &str) -> StoreResult<Vec<Item>> {
        let tables = self.tables.read();
        let table = tables
            .get(name)
            .ok_or_else(|| StoreError::resource_not_found(name))?;
        Ok(table.items.values().cloned().collect())
    }

    fn check_size(&self, item: &Item) -> StoreResult<()> {
        match self.max_item_size {
            Some(max) if item_size(item) > max => Err(StoreError::validation(
                "item size has exceeded the maximum allowed size",
            )),
            _ => Ok(()),
        }
    }
}

fn table_mut<'a>(tables: &'a mut BTreeMap<String, Table>, name: &str) -> StoreResult<&'a mut Table> {
    tables
        .get_mut(name)
        .ok_or_else(|| StoreError::resource_not_found(name))
}

fn table_ref<'a>(tables: &'a BTreeMap<String, Table>, name: &str) -> StoreResult<&'a Table> {
    tables
        .get(name)
        .ok_or_else(|| StoreError::resource_not_found(name))
}

fn check_key(schema: &KeySchema, key: &Item) -> StoreResult<()> {
    if !schema.matches_key(key) {
        return Err(StoreError::validation(
            "the provided key element does not match the schema",
        ));
    }
    Ok(())
}

fn reject_expressions(has_expression: bool) -> StoreResult<()> {
    if has_expression {
        return Err(StoreError::validation("expressions are not supported"));
    }
    Ok(())
}

fn check_expected(
    current: Option<&Item>,
    expected: &BTreeMap<String, ExpectedAttributeValue>,
) -> StoreResult<()> {
    let holds = expected
        .iter()
        .all(|(name, exp)| exp.matches(current.and_then(|item| item.get(name))));
    if holds {
        Ok(())
    } else {
        Err(StoreError::ConditionalCheckFailed)
    }
}

fn project(item: &Item, names: Option<&[String]>) -> Item {
    match names {
        None => item.clone(),
        Some(names) => item
            .iter()
            .filter(|(k, _)| names.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    }
}

fn non_empty(item: Item) -> Option<Item> {
    if item.is_empty() {
        None
    } else {
        Some(item)
    }
}

fn add_values(current: &AttributeValue, delta: &AttributeValue) -> StoreResult<AttributeValue> {
    match (current, delta) {
        (AttributeValue::N(a), AttributeValue::N(b)) => {
            if let (Ok(a), Ok(b)) = (a.parse::<i64>(), b.parse::<i64>()) {
                let sum = a
                    .checked_add(b)
                    .ok_or_else(|| StoreError::validation("number overflow"))?;
                return Ok(AttributeValue::n(sum));
            }
            match (a.parse::<f64>(), b.parse::<f64>()) {
                (Ok(a), Ok(b)) => Ok(AttributeValue::n(a + b)),
                _ => Err(StoreError::validation("invalid number")),
            }
        }
        (AttributeValue::SS(a), AttributeValue::SS(b)) => {
            Ok(AttributeValue::string_set(a.iter().chain(b).cloned()))
        }
        (AttributeValue::NS(a), AttributeValue::NS(b)) => {
            Ok(AttributeValue::number_set(a.iter().chain(b)))
        }
        (AttributeValue::BS(a), AttributeValue::BS(b)) => {
            Ok(AttributeValue::binary_set(a.iter().chain(b).cloned()))
        }
        _ => Err(StoreError::validation(
            "ADD is only supported for numbers and matching set types",
        )),
    }
}

fn set_difference(
    current: &AttributeValue,
    remove: &AttributeValue,
) -> StoreResult<Option<AttributeValue>> {
    let remaining = match (current, remove) {
        (AttributeValue::SS(a), AttributeValue::SS(b)) => {
            AttributeValue::SS(a.iter().filter(|m| !b.contains(m)).cloned().collect())
        }
        (AttributeValue::NS(a), AttributeValue::NS(b)) => {
            AttributeValue::NS(a.iter().filter(|m| !b.contains(m)).cloned().collect())
        }
        (AttributeValue::BS(a), AttributeValue::BS(b)) => {
            AttributeValue::BS(a.iter().filter(|m| !b.contains(m)).cloned().collect())
        }
        _ => {
            return Err(StoreError::validation(
                "DELETE with a value is only supported for matching set types",
            ))
        }
    };
    let empty = match &remaining {
        AttributeValue::SS(m) | AttributeValue::NS(m) => m.is_empty(),
        AttributeValue::BS(m) => m.is_empty(),
        _ => false,
    };
    Ok(if empty { None } else { Some(remaining) })
}

fn apply_update(item: &mut Item, name: &str, update: &AttributeValueUpdate) -> StoreResult<()> {
    match update {
        AttributeValueUpdate::Put(value) => {
            item.insert(name.to_string(), value.clone());
        }
        AttributeValueUpdate::Delete(None) => {
            item.remove(name);
        }
        AttributeValueUpdate::Delete(Some(members)) => {
            let remaining = match item.get(name) {
                None => return Ok(()),
                Some(current) => set_difference(current, members)?,
            };
            match remaining {
                Some(value) => item.insert(name.to_string(), value),
                None => item.remove(name),
            };
        }
        AttributeValueUpdate::Add(delta) => {
            let value = match item.get(name) {
                Some(current) => add_values(current, delta)?,
                None if matches!(delta, AttributeValue::N(_)) || delta.is_set() => delta.clone(),
                None => {
                    return Err(StoreError::validation(
                        "ADD is only supported for numbers and sets",
                    ))
                }
            };
            item.insert(name.to_string(), value);
        }
    }
    Ok(())
}

fn compare_values(a: &AttributeValue, b: &AttributeValue) -> Option<Ordering> {
    match (a, b) {
        (AttributeValue::S(a), AttributeValue::S(b)) => Some(a.cmp(b)),
        (AttributeValue::B(a), AttributeValue::B(b)) => Some(a.cmp(b)),
        (AttributeValue::N(a), AttributeValue::N(b)) => {
            let a: f64 = a.parse().ok()?;
            let b: f64 = b.parse().ok()?;
            a.partial_cmp(&b)
        }
        _ => None,
    }
}

fn matches_condition(value: &AttributeValue, condition: &Condition) -> StoreResult<bool> {
    use ComparisonOperator as Op;

    let operand = |i: usize| {
        condition
            .values
            .get(i)
            .ok_or_else(|| StoreError::validation("missing condition operand"))
    };
    let cmp = |i: usize| -> StoreResult<Option<Ordering>> { Ok(compare_values(value, operand(i)?)) };

    Ok(match condition.operator {
        Op::Eq => value == operand(0)?,
        Op::Lt => cmp(0)? == Some(Ordering::Less),
        Op::Le => matches!(cmp(0)?, Some(Ordering::Less | Ordering::Equal)),
        Op::Gt => cmp(0)? == Some(Ordering::Greater),
        Op::Ge => matches!(cmp(0)?, Some(Ordering::Greater | Ordering::Equal)),
        Op::BeginsWith => match (value, operand(0)?) {
            (AttributeValue::S(v), AttributeValue::S(p)) => v.starts_with(p.as_str()),
            (AttributeValue::B(v), AttributeValue::B(p)) => v.starts_with(p),
            _ => false,
        },
        Op::Between => {
            matches!(cmp(0)?, Some(Ordering::Greater | Ordering::Equal))
                && matches!(cmp(1)?, Some(Ordering::Less | Ordering::Equal))
        }
    })
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn get_item(&self, request: GetItemRequest) -> StoreResult<Option<Item>> {
        reject_expressions(request.projection_expression.is_some())?;
        let tables = self.tables.read();
        let table = table_ref(&tables, &request.table_name)?;
        check_key(&table.schema, &request.key)?;
        Ok(table
            .items
            .get(&request.key)
            .map(|item| project(item, request.attributes_to_get.as_deref())))
    }

    async fn put_item(&self, request: PutItemRequest) -> StoreResult<Option<Item>> {
        reject_expressions(
            request.condition_expression.is_some()
                || request.expression_attribute_names.is_some()
                || request.expression_attribute_values.is_some(),
        )?;
        let return_values = request.return_values.unwrap_or_default();
        if !matches!(return_values, ReturnValue::None | ReturnValue::AllOld) {
            return Err(StoreError::validation(format!(
                "return values {} is not valid for put",
                return_values.as_str()
            )));
        }
        self.check_size(&request.item)?;

        let mut tables = self.tables.write();
        let table = table_mut(&mut tables, &request.table_name)?;
        let key = table
            .schema
            .extract_key(&request.item)
            .ok_or_else(|| StoreError::validation("item is missing a key attribute"))?;
        check_expected(table.items.get(&key), &request.expected)?;

        let old = table.items.insert(key, request.item);
        Ok(match return_values {
            ReturnValue::AllOld => old,
            _ => None,
        })
    }

    async fn update_item(&self, request: UpdateItemRequest) -> StoreResult<Option<Item>> {
        reject_expressions(
            request.condition_expression.is_some()
                || request.update_expression.is_some()
                || request.expression_attribute_names.is_some()
                || request.expression_attribute_values.is_some(),
        )?;

        let mut tables = self.tables.write();
        let table = table_mut(&mut tables, &request.table_name)?;
        check_key(&table.schema, &request.key)?;
        if let Some(name) = request
            .attribute_updates
            .keys()
            .find(|name| table.schema.is_key_attribute(name))
        {
            return Err(StoreError::validation(format!(
                "cannot update key attribute {name}"
            )));
        }

        let old = table.items.get(&request.key).cloned();
        check_expected(old.as_ref(), &request.expected)?;

        let mut new = old.clone().unwrap_or_else(|| request.key.clone());
        for (name, update) in &request.attribute_updates {
            apply_update(&mut new, name, update)?;
        }
        self.check_size(&new)?;
        table.items.insert(request.key, new.clone());

        let updated: Vec<String> = request.attribute_updates.into_keys().collect();
        Ok(match request.return_values.unwrap_or_default() {
            ReturnValue::None => None,
            ReturnValue::AllOld => old,
            ReturnValue::UpdatedOld => old.and_then(|o| non_empty(project(&o, Some(&updated)))),
            ReturnValue::AllNew => Some(new),
            ReturnValue::UpdatedNew => non_empty(project(&new, Some(&updated))),
        })
    }

    async fn delete_item(&self, request: DeleteItemRequest) -> StoreResult<Option<Item>> {
        reject_expressions(
            request.condition_expression.is_some()
                || request.expression_attribute_names.is_some()
                || request.expression_attribute_values.is_some(),
        )?;
        let return_values = request.return_values.unwrap_or_default();
        if !matches!(return_values, ReturnValue::None | ReturnValue::AllOld) {
            return Err(StoreError::validation(format!(
                "return values {} is not valid for delete",
                return_values.as_str()
            )));
        }

        let mut tables = self.tables.write();
        let table = table_mut(&mut tables, &request.table_name)?;
        check_key(&table.schema, &request.key)?;
        check_expected(table.items.get(&request.key), &request.expected)?;

        let old = table.items.remove(&request.key);
        Ok(match return_values {
            ReturnValue::AllOld => old,
            _ => None,
        })
    }

    async fn scan(&self, request: ScanRequest) -> StoreResult<ScanOutput> {
        let tables = self.tables.read();
        let table = table_ref(&tables, &request.table_name)?;
        let lower = match &request.exclusive_start_key {
            Some(start) => Bound::Excluded(start),
            None => Bound::Unbounded,
        };
        let limit = request.limit.unwrap_or(usize::MAX);

        let mut remaining = table.items.range::<Item, _>((lower, Bound::Unbounded));
        let mut output = ScanOutput::default();
        for (key, item) in remaining.by_ref().take(limit) {
            output
                .items
                .push(project(item, request.attributes_to_get.as_deref()));
            output.last_evaluated_key = Some(key.clone());
        }
        if remaining.next().is_none() {
            output.last_evaluated_key = None;
        }
        Ok(output)
    }

    async fn query(&self, request: QueryRequest) -> StoreResult<QueryOutput> {
        let tables = self.tables.read();
        let table = table_ref(&tables, &request.table_name)?;
        let schema = &table.schema;

        let hash_value = match request.key_conditions.get(&schema.hash_key) {
            Some(Condition {
                operator: ComparisonOperator::Eq,
                values,
            }) if values.len() == 1 => &values[0],
            _ => {
                return Err(StoreError::validation(
                    "query must specify an EQ condition on the hash key",
                ))
            }
        };
        let mut range_condition = None;
        for (name, condition) in &request.key_conditions {
            if *name == schema.hash_key {
                continue;
            }
            if schema.range_key.as_deref() != Some(name.as_str()) {
                return Err(StoreError::validation(format!(
                    "query condition on non-key attribute {name}"
                )));
            }
            range_condition = Some((name.as_str(), condition));
        }

        let mut matched = Vec::new();
        for (key, item) in &table.items {
            if key.get(&schema.hash_key) != Some(hash_value) {
                continue;
            }
            if let Some((name, condition)) = range_condition {
                let Some(value) = key.get(name) else {
                    continue;
                };
                if !matches_condition(value, condition)? {
                    continue;
                }
            }
            matched.push((key, item));
        }
        if let Some(range_key) = &schema.range_key {
            matched.sort_by(|(a, _), (b, _)| {
                match (a.get(range_key), b.get(range_key)) {
                    (Some(a), Some(b)) => compare_values(a, b).unwrap_or_else(|| a.cmp(b)),
                    _ => Ordering::Equal,
                }
            });
        }
        if !request.scan_index_forward {
            matched.reverse();
        }
        if let Some(start) = &request.exclusive_start_key {
            if let Some(pos) = matched.iter().position(|(key, _)| *key == start) {
                matched.drain(..=pos);
            }
        }

        let limit = request.limit.unwrap_or(usize::MAX);
        let more = matched.len() > limit;
        matched.truncate(limit);
        Ok(QueryOutput {
            last_evaluated_key: if more {
                matched.last().map(|(key, _)| (*key).clone())
            } else {
                None
            },
            items: matched
                .into_iter()
                .map(|(_, item)| project(item, request.attributes_to_get.as_deref()))
                .collect(),
        })
    }

    async fn batch_get_item(&self, request: BatchGetItemRequest) -> StoreResult<BatchGetItemOutput> {
        let tables = self.tables.read();
        let mut output = BatchGetItemOutput::default();
        for (table_name, keys) in request.request_items {
            let table = table_ref(&tables, &table_name)?;
            let mut found = Vec::new();
            for key in &keys.keys {
                check_key(&table.schema, key)?;
                if let Some(item) = table.items.get(key) {
                    found.push(project(item, keys.attributes_to_get.as_deref()));
                }
            }
            output.responses.insert(table_name, found);
        }
        Ok(output)
    }

    async fn describe_table(&self, table_name: &str) -> StoreResult<TableDescription> {
        let tables = self.tables.read();
        let table = table_ref(&tables, table_name)?;
        Ok(TableDescription {
            table_name: table_name.to_string(),
            key_schema: table.schema.clone(),
            item_count: table.items.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::KeysAndAttributes;
    use txkv_codec::item;

    fn store() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.create_table("T", KeySchema::hash("Id")).unwrap();
        store
            .create_table("R", KeySchema::hash_range("Id", "Sort"))
            .unwrap();
        store
    }

    fn key(id: &str) -> Item {
        item([("Id", id)])
    }

    #[tokio::test]
    async fn memory_put_get() {
        let store = store();
        store
            .put_item(PutItemRequest::new("T", item([("Id", "a"), ("v", "1")])))
            .await
            .unwrap();
        let got = store.get_item(GetItemRequest::new("T", key("a"))).await.unwrap();
        assert_eq!(got, Some(item([("Id", "a"), ("v", "1")])));

        let projected = store
            .get_item(GetItemRequest::new("T", key("a")).with_attributes_to_get(["v"]))
            .await
            .unwrap();
        assert_eq!(projected, Some(item([("v", "1")])));
    }

    #[tokio::test]
    async fn memory_missing_table() {
        let store = store();
        let err = store
            .get_item(GetItemRequest::new("Nope", key("a")))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::resource_not_found("Nope"));
    }

    #[tokio::test]
    async fn memory_key_must_match_schema() {
        let store = store();
        let err = store
            .get_item(GetItemRequest::new("T", item([("Other", "a")])))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));
    }

    #[tokio::test]
    async fn memory_put_expected_not_exists() {
        let store = store();
        let put = PutItemRequest::new("T", item([("Id", "a")]))
            .with_expected("Id", ExpectedAttributeValue::NotExists);
        store.put_item(put.clone()).await.unwrap();
        let err = store.put_item(put).await.unwrap_err();
        assert!(err.is_conditional_check_failed());
    }

    #[tokio::test]
    async fn memory_put_returns_old() {
        let store = store();
        store
            .put_item(PutItemRequest::new("T", item([("Id", "a"), ("v", "1")])))
            .await
            .unwrap();
        let old = store
            .put_item(
                PutItemRequest::new("T", item([("Id", "a"), ("v", "2")]))
                    .with_return_values(ReturnValue::AllOld),
            )
            .await
            .unwrap();
        assert_eq!(old, Some(item([("Id", "a"), ("v", "1")])));
    }

    #[tokio::test]
    async fn memory_update_upserts_and_returns_new() {
        let store = store();
        let new = store
            .update_item(
                UpdateItemRequest::new("T", key("a"))
                    .with_put("v", "1")
                    .with_return_values(ReturnValue::AllNew),
            )
            .await
            .unwrap();
        assert_eq!(new, Some(item([("Id", "a"), ("v", "1")])));
    }

    #[tokio::test]
    async fn memory_update_condition_failure_changes_nothing() {
        let store = store();
        store
            .put_item(PutItemRequest::new("T", item([("Id", "a"), ("v", "1")])))
            .await
            .unwrap();
        let err = store
            .update_item(
                UpdateItemRequest::new("T", key("a"))
                    .with_put("v", "2")
                    .with_expected("v", ExpectedAttributeValue::Equals("9".into())),
            )
            .await
            .unwrap_err();
        assert!(err.is_conditional_check_failed());
        assert_eq!(
            store.table_items("T").unwrap(),
            vec![item([("Id", "a"), ("v", "1")])]
        );
    }

    #[tokio::test]
    async fn memory_update_add_and_delete() {
        let store = store();
        let add = |v: AttributeValue| {
            UpdateItemRequest::new("T", key("a"))
                .with_update("n", AttributeValueUpdate::Add(AttributeValue::n(1)))
                .with_update("set", AttributeValueUpdate::Add(v))
                .with_return_values(ReturnValue::UpdatedNew)
        };
        store
            .update_item(add(AttributeValue::binary_set(vec![vec![1]])))
            .await
            .unwrap();
        let new = store
            .update_item(add(AttributeValue::binary_set(vec![vec![2]])))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(new["n"], AttributeValue::n(2));
        assert_eq!(new["set"], AttributeValue::binary_set(vec![vec![1], vec![2]]));

        let old = store
            .update_item(
                UpdateItemRequest::new("T", key("a"))
                    .with_update("n", AttributeValueUpdate::Delete(None))
                    .with_update(
                        "set",
                        AttributeValueUpdate::Delete(Some(AttributeValue::binary_set(vec![
                            vec![1],
                            vec![2],
                        ]))),
                    )
                    .with_return_values(ReturnValue::UpdatedOld),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(old.len(), 2);
        assert_eq!(store.table_items("T").unwrap(), vec![key("a")]);
    }

    #[tokio::test]
    async fn memory_update_rejects_key_attribute() {
        let store = store();
        let err = store
            .update_item(UpdateItemRequest::new("T", key("a")).with_put("Id", "b"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));
    }

    #[tokio::test]
    async fn memory_max_item_size() {
        let store = InMemoryStore::new().with_max_item_size(10);
        store.create_table("T", KeySchema::hash("Id")).unwrap();
        let err = store
            .put_item(PutItemRequest::new(
                "T",
                item([("Id", "a"), ("big", "0123456789")]),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));
    }

    #[tokio::test]
    async fn memory_delete_expected() {
        let store = store();
        store
            .put_item(PutItemRequest::new("T", item([("Id", "a"), ("v", "1")])))
            .await
            .unwrap();
        let err = store
            .delete_item(
                DeleteItemRequest::new("T", key("a"))
                    .with_expected("v", ExpectedAttributeValue::NotExists),
            )
            .await
            .unwrap_err();
        assert!(err.is_conditional_check_failed());

        let old = store
            .delete_item(
                DeleteItemRequest::new("T", key("a")).with_return_values(ReturnValue::AllOld),
            )
            .await
            .unwrap();
        assert_eq!(old, Some(item([("Id", "a"), ("v", "1")])));
        assert!(store.table_items("T").unwrap().is_empty());
    }

    #[tokio::test]
    async fn memory_expressions_rejected() {
        let store = store();
        let mut put = PutItemRequest::new("T", item([("Id", "a")]));
        put.condition_expression = Some("attribute_not_exists(Id)".into());
        let err = store.put_item(put).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));
    }

    #[tokio::test]
    async fn memory_scan_pages() {
        let store = store();
        for id in ["a", "b", "c"] {
            store
                .put_item(PutItemRequest::new("T", key(id)))
                .await
                .unwrap();
        }
        let first = store.scan(ScanRequest::new("T").with_limit(2)).await.unwrap();
        assert_eq!(first.items, vec![key("a"), key("b")]);
        assert_eq!(first.last_evaluated_key, Some(key("b")));

        let mut next = ScanRequest::new("T").with_limit(2);
        next.exclusive_start_key = first.last_evaluated_key;
        let second = store.scan(next).await.unwrap();
        assert_eq!(second.items, vec![key("c")]);
        assert_eq!(second.last_evaluated_key, None);
    }

    #[tokio::test]
    async fn memory_query_range_conditions() {
        let store = store();
        for sort in [1, 2, 10] {
            store
                .put_item(PutItemRequest::new(
                    "R",
                    item([("Id", AttributeValue::s("h")), ("Sort", AttributeValue::n(sort))]),
                ))
                .await
                .unwrap();
        }
        store
            .put_item(PutItemRequest::new(
                "R",
                item([("Id", AttributeValue::s("other")), ("Sort", AttributeValue::n(1))]),
            ))
            .await
            .unwrap();

        let all = store
            .query(QueryRequest::new("R").with_condition("Id", Condition::eq("h")))
            .await
            .unwrap();
        let sorts: Vec<_> = all.items.iter().map(|i| i["Sort"].as_i64().unwrap()).collect();
        assert_eq!(sorts, vec![1, 2, 10]);

        let ge = store
            .query(
                QueryRequest::new("R")
                    .with_condition("Id", Condition::eq("h"))
                    .with_condition(
                        "Sort",
                        Condition::new(ComparisonOperator::Ge, vec![AttributeValue::n(2)]),
                    ),
            )
            .await
            .unwrap();
        assert_eq!(ge.items.len(), 2);

        let err = store
            .query(QueryRequest::new("R").with_condition("Sort", Condition::eq(AttributeValue::n(1))))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));
    }

    #[tokio::test]
    async fn memory_batch_get() {
        let store = store();
        store
            .put_item(PutItemRequest::new("T", key("a")))
            .await
            .unwrap();
        let mut request = BatchGetItemRequest::default();
        request.request_items.insert(
            "T".into(),
            KeysAndAttributes {
                keys: vec![key("a"), key("missing")],
                ..KeysAndAttributes::default()
            },
        );
        let output = store.batch_get_item(request).await.unwrap();
        assert_eq!(output.responses["T"], vec![key("a")]);
    }

    #[tokio::test]
    async fn memory_describe_table() {
        let store = store();
        let description = store.describe_table("R").await.unwrap();
        assert_eq!(description.key_schema, KeySchema::hash_range("Id", "Sort"));
        assert_eq!(description.item_count, 0);
    }
}
