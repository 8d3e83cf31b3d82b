//! Property-based test generators using proptest.
//!
//! Generated names never use the reserved `_Tx` prefix, so every generated
//! request is one a transaction accepts.

use std::collections::BTreeMap;

use proptest::prelude::*;
use txkv_codec::{AttributeValue, Item};
use txkv_core::{Operation, Request};
use txkv_storage::{
    AttributeValueUpdate, DeleteItemRequest, GetItemRequest, PutItemRequest, ReturnValue,
    UpdateItemRequest,
};

use crate::fixtures::ITEMS;

/// Strategy for attribute names outside the reserved prefix.
pub fn attribute_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-zA-Z0-9]{0,11}").expect("Invalid regex")
}

/// Strategy for numbers in the store's decimal string form.
pub fn number_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        any::<i64>().prop_map(|n| n.to_string()),
        (any::<i32>(), 1u32..1000).prop_map(|(i, f)| format!("{i}.{f}")),
    ]
}

/// Strategy for scalar attribute values.
pub fn scalar_value_strategy() -> impl Strategy<Value = AttributeValue> {
    prop_oneof![
        ".{0,24}".prop_map(AttributeValue::S),
        number_strategy().prop_map(AttributeValue::N),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(AttributeValue::B),
        any::<bool>().prop_map(AttributeValue::Bool),
        Just(AttributeValue::Null),
        prop::collection::vec("[a-z]{1,6}", 1..4).prop_map(AttributeValue::string_set),
        prop::collection::vec(number_strategy(), 1..4).prop_map(AttributeValue::number_set),
        prop::collection::vec(prop::collection::vec(any::<u8>(), 1..8), 1..4)
            .prop_map(AttributeValue::binary_set),
    ]
}

/// Strategy for attribute values, nesting lists and maps up to two levels.
pub fn attribute_value_strategy() -> impl Strategy<Value = AttributeValue> {
    scalar_value_strategy().prop_recursive(2, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(AttributeValue::L),
            prop::collection::btree_map(attribute_name_strategy(), inner, 0..4)
                .prop_map(AttributeValue::M),
        ]
    })
}

/// Strategy for an `ITEMS` key.
pub fn key_strategy() -> impl Strategy<Value = Item> {
    "[a-z0-9]{1,8}".prop_map(|id| Item::from([("Id".to_string(), AttributeValue::S(id))]))
}

/// Strategy for a full `ITEMS` item: a key plus up to six attributes.
pub fn item_strategy() -> impl Strategy<Value = Item> {
    (
        key_strategy(),
        prop::collection::btree_map(
            attribute_name_strategy().prop_filter("not the key", |n| n != "Id"),
            attribute_value_strategy(),
            0..6,
        ),
    )
        .prop_map(|(mut key, attributes)| {
            key.extend(attributes);
            key
        })
}

fn return_value_strategy() -> impl Strategy<Value = Option<ReturnValue>> {
    prop_oneof![
        Just(None),
        Just(Some(ReturnValue::None)),
        Just(Some(ReturnValue::AllOld)),
        Just(Some(ReturnValue::AllNew)),
    ]
}

fn attribute_update_strategy() -> impl Strategy<Value = AttributeValueUpdate> {
    prop_oneof![
        attribute_value_strategy().prop_map(AttributeValueUpdate::Put),
        Just(AttributeValueUpdate::Delete(None)),
        number_strategy().prop_map(|n| AttributeValueUpdate::Add(AttributeValue::N(n))),
    ]
}

/// Strategy for valid transactional requests against `ITEMS`, with or
/// without a request id.
pub fn request_strategy() -> impl Strategy<Value = Request> {
    let op = prop_oneof![
        (key_strategy(), any::<bool>(), prop::option::of(prop::collection::vec(attribute_name_strategy(), 1..3)))
            .prop_map(|(key, consistent, names)| {
                let mut get = GetItemRequest::new(ITEMS, key).with_consistent_read(consistent);
                get.attributes_to_get = names;
                Operation::Get(get)
            }),
        (item_strategy(), return_value_strategy()).prop_map(|(item, rv)| {
            let mut put = PutItemRequest::new(ITEMS, item);
            put.return_values = rv;
            Operation::Put(put)
        }),
        (
            key_strategy(),
            prop::collection::btree_map(
                attribute_name_strategy().prop_filter("not the key", |n| n != "Id"),
                attribute_update_strategy(),
                0..4,
            ),
            return_value_strategy(),
        )
            .prop_map(|(key, updates, rv): (Item, BTreeMap<String, AttributeValueUpdate>, _)| {
                let mut update = UpdateItemRequest::new(ITEMS, key);
                update.attribute_updates = updates;
                update.return_values = rv;
                Operation::Update(update)
            }),
        (key_strategy(), return_value_strategy()).prop_map(|(key, rv)| {
            let mut delete = DeleteItemRequest::new(ITEMS, key);
            delete.return_values = rv;
            Operation::Delete(delete)
        }),
    ];
    (op, prop::option::of(0u64..1_000)).prop_map(|(op, rid)| {
        let request = Request::new(op);
        match rid {
            Some(rid) => request.with_rid(rid),
            None => request,
        }
    })
}
