//! Durable transaction record and old item images.

use std::collections::HashMap;

use tracing::debug;
use txkv_codec::{item, AttributeValue, Item};
use txkv_storage::{
    AttributeValueUpdate, DeleteItemRequest, ExpectedAttributeValue, GetItemRequest, KeySchema,
    PutItemRequest, StoreError, UpdateItemRequest,
};

use crate::attributes::{
    current_time, is_applied, is_transient, strip_shadow_attributes, truthy, AttributeName,
    ImmutableKey, TransactionState,
};
use crate::error::{TxError, TxResult};
use crate::manager::TransactionManager;
use crate::request::Request;

/// Result of appending a request to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The request was written to the record.
    Added,
    /// A read was requested for an item the transaction already tracks.
    AlreadyTracked,
    /// The stored record moved on; reload and retry.
    VersionConflict,
}

/// The record's requests indexed by target item.
///
/// Holds the request that currently governs each item: a write that
/// upgraded a read replaces it.
#[derive(Debug, Clone, Default)]
pub struct RequestMap {
    by_key: HashMap<ImmutableKey, Request>,
}

impl RequestMap {
    /// The governing request for an item.
    pub fn get(&self, key: &ImmutableKey) -> Option<&Request> {
        self.by_key.get(key)
    }

    /// Governing requests in the order they were added.
    pub fn in_rid_order(&self) -> Vec<(&ImmutableKey, &Request)> {
        let mut entries: Vec<_> = self.by_key.iter().collect();
        entries.sort_by_key(|(_, r)| r.rid());
        entries
    }

    /// Number of tracked items.
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Returns true if no item is tracked.
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    fn insert(&mut self, key: ImmutableKey, request: Request) {
        self.by_key.insert(key, request);
    }
}

/// In-memory copy of a transaction record.
///
/// Every mutation is a conditional write on the stored record, gated on the
/// record's state and version, so copies held by different processes
/// arbitrate through the store.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    tx_id: String,
    state: TransactionState,
    version: u64,
    finalized: bool,
    date: Option<AttributeValue>,
    requests: RequestMap,
}

fn tx_key(tx_id: &str) -> Item {
    item([(AttributeName::TxId.as_str(), AttributeValue::s(tx_id))])
}

fn image_key(image_id: String) -> Item {
    item([(AttributeName::ImageId.as_str(), AttributeValue::S(image_id))])
}

/// Key schema of the transaction record table.
pub fn transaction_table_schema() -> KeySchema {
    KeySchema::hash(AttributeName::TxId.as_str())
}

/// Key schema of the old item image table.
pub fn item_image_table_schema() -> KeySchema {
    KeySchema::hash(AttributeName::ImageId.as_str())
}

/// Image id for request `rid` of `tx_id`.
pub fn image_id(tx_id: &str, rid: u64) -> String {
    format!("{tx_id}#{rid}")
}

impl TransactionRecord {
    /// Create the stored record for a new transaction.
    ///
    /// # Errors
    ///
    /// Returns `TxError::Transaction` if a record with this id already exists.
    pub async fn insert(manager: &TransactionManager, tx_id: &str) -> TxResult<Self> {
        let date = current_time();
        let record = item([
            (AttributeName::TxId.as_str(), AttributeValue::s(tx_id)),
            (AttributeName::State.as_str(), TransactionState::Pending.to_value()),
            (AttributeName::Version.as_str(), AttributeValue::n(1)),
            (AttributeName::Date.as_str(), date.clone()),
        ]);
        let put = PutItemRequest::new(&manager.config().transaction_table, record)
            .with_expected(AttributeName::TxId.as_str(), ExpectedAttributeValue::NotExists);
        match manager.store().put_item(put).await {
            Ok(_) => {}
            Err(StoreError::ConditionalCheckFailed) => {
                return Err(TxError::transaction(
                    tx_id,
                    "a transaction record with this id already exists",
                ))
            }
            Err(e) => return Err(e.into()),
        }
        Ok(Self {
            tx_id: tx_id.to_string(),
            state: TransactionState::Pending,
            version: 1,
            finalized: false,
            date: Some(date),
            requests: RequestMap::default(),
        })
    }

    /// Read the stored record.
    ///
    /// # Errors
    ///
    /// Returns `TxError::TransactionNotFound` if there is no record.
    pub async fn load(manager: &TransactionManager, tx_id: &str) -> TxResult<Self> {
        let get = GetItemRequest::new(&manager.config().transaction_table, tx_key(tx_id))
            .with_consistent_read(true);
        match manager.store().get_item(get).await? {
            Some(stored) => Self::from_item(manager, tx_id, stored).await,
            None => Err(TxError::not_found(tx_id)),
        }
    }

    async fn from_item(manager: &TransactionManager, tx_id: &str, stored: Item) -> TxResult<Self> {
        let state = stored
            .get(AttributeName::State.as_str())
            .and_then(TransactionState::from_value)
            .ok_or_else(|| TxError::assertion(tx_id, "transaction record has no valid state"))?;
        let version = stored
            .get(AttributeName::Version.as_str())
            .and_then(AttributeValue::as_i64)
            .and_then(|v| u64::try_from(v).ok())
            .ok_or_else(|| TxError::assertion(tx_id, "transaction record has no valid version"))?;
        let finalized = stored.get(AttributeName::Finalized.as_str()) == Some(&truthy());

        let mut decoded = Vec::new();
        if let Some(blobs) = stored.get(AttributeName::Requests.as_str()) {
            let blobs = blobs.as_bs().ok_or_else(|| {
                TxError::assertion(tx_id, "transaction record requests are not a binary set")
            })?;
            for blob in blobs {
                decoded.push(Request::from_bytes(blob)?);
            }
        }
        decoded.sort_by_key(Request::rid);

        let mut requests = RequestMap::default();
        for request in decoded {
            let key = manager.request_key(tx_id, &request).await?;
            requests.insert(ImmutableKey::new(request.table_name(), key), request);
        }

        Ok(Self {
            tx_id: tx_id.to_string(),
            state,
            version,
            finalized,
            date: stored.get(AttributeName::Date.as_str()).cloned(),
            requests,
        })
    }

    /// Transaction id.
    pub fn tx_id(&self) -> &str {
        &self.tx_id
    }

    /// Current state.
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Current version; the next request added gets this as its rid.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns true once terminal cleanup is done.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Returns true if committed or rolled back.
    pub fn is_completed(&self) -> bool {
        self.state != TransactionState::Pending
    }

    /// Last update time of the record.
    pub fn date(&self) -> Option<&AttributeValue> {
        self.date.as_ref()
    }

    /// The request map.
    pub fn requests(&self) -> &RequestMap {
        &self.requests
    }

    /// The governing request for an item.
    pub fn request_for(&self, key: &ImmutableKey) -> Option<&Request> {
        self.requests.get(key)
    }

    /// Append a request, bumping the version.
    ///
    /// On success the request carries its rid. A read of an item that is
    /// already tracked is not written. The local copy changes only when the
    /// stored record does.
    ///
    /// # Errors
    ///
    /// Returns `TxError::DuplicateRequest` if the item already has a write,
    /// or `TxError::InvalidRequest` if the record would exceed the store's
    /// item size limit.
    pub async fn add_request(
        &mut self,
        manager: &TransactionManager,
        request: &mut Request,
        key: &Item,
    ) -> TxResult<AddOutcome> {
        let ikey = ImmutableKey::new(request.table_name(), key.clone());
        if let Some(existing) = self.requests.get(&ikey) {
            if request.is_get() {
                return Ok(AddOutcome::AlreadyTracked);
            }
            if existing.is_write() {
                return Err(TxError::DuplicateRequest {
                    tx_id: self.tx_id.clone(),
                    table_name: ikey.table_name,
                    key: ikey.key,
                });
            }
        }

        request.set_rid(self.version);
        let blob = request.to_bytes()?;
        let date = current_time();
        let update = UpdateItemRequest::new(&manager.config().transaction_table, tx_key(&self.tx_id))
            .with_update(
                AttributeName::Requests.as_str(),
                AttributeValueUpdate::Add(AttributeValue::binary_set([blob])),
            )
            .with_update(
                AttributeName::Version.as_str(),
                AttributeValueUpdate::Add(AttributeValue::n(1)),
            )
            .with_put(AttributeName::Date.as_str(), date.clone())
            .with_expected(
                AttributeName::State.as_str(),
                ExpectedAttributeValue::Equals(TransactionState::Pending.to_value()),
            )
            .with_expected(
                AttributeName::Version.as_str(),
                ExpectedAttributeValue::Equals(AttributeValue::n(self.version)),
            );

        match manager.store().update_item(update).await {
            Ok(_) => {
                self.version += 1;
                self.date = Some(date);
                self.requests.insert(ikey, request.clone());
                Ok(AddOutcome::Added)
            }
            Err(StoreError::ConditionalCheckFailed) => Ok(AddOutcome::VersionConflict),
            Err(StoreError::Validation { message }) => Err(TxError::invalid_request(
                &self.tx_id,
                ikey.table_name,
                Some(ikey.key),
                format!("transaction data exceeds the item size limit: {message}"),
            )
            .with_request(request.clone())),
            Err(e) => Err(e.into()),
        }
    }

    /// Move a pending record to `target`.
    ///
    /// Returns `false` if the stored record is no longer pending at
    /// `expected_version`; the caller reloads and branches on what it finds.
    ///
    /// # Errors
    ///
    /// Returns any store error other than a failed condition.
    pub async fn finish(
        &mut self,
        manager: &TransactionManager,
        target: TransactionState,
        expected_version: u64,
    ) -> TxResult<bool> {
        let date = current_time();
        let update = UpdateItemRequest::new(&manager.config().transaction_table, tx_key(&self.tx_id))
            .with_put(AttributeName::State.as_str(), target.to_value())
            .with_put(AttributeName::Date.as_str(), date.clone())
            .with_expected(
                AttributeName::State.as_str(),
                ExpectedAttributeValue::Equals(TransactionState::Pending.to_value()),
            )
            .with_expected(AttributeName::Finalized.as_str(), ExpectedAttributeValue::NotExists)
            .with_expected(
                AttributeName::Version.as_str(),
                ExpectedAttributeValue::Equals(AttributeValue::n(expected_version)),
            );
        match manager.store().update_item(update).await {
            Ok(_) => {
                self.state = target;
                self.date = Some(date);
                Ok(true)
            }
            Err(StoreError::ConditionalCheckFailed) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Mark a terminal record finalized.
    ///
    /// # Errors
    ///
    /// Returns `TxError::Assertion` if the stored record is in a different
    /// terminal state and not finalized.
    pub async fn complete(
        &mut self,
        manager: &TransactionManager,
        expected_state: TransactionState,
    ) -> TxResult<()> {
        let update = UpdateItemRequest::new(&manager.config().transaction_table, tx_key(&self.tx_id))
            .with_put(AttributeName::Finalized.as_str(), truthy())
            .with_put(AttributeName::Date.as_str(), current_time())
            .with_expected(
                AttributeName::State.as_str(),
                ExpectedAttributeValue::Equals(expected_state.to_value()),
            );
        match manager.store().update_item(update).await {
            Ok(_) => {
                self.finalized = true;
                Ok(())
            }
            Err(StoreError::ConditionalCheckFailed) => {
                match Self::load(manager, &self.tx_id).await {
                    Err(TxError::TransactionNotFound { .. }) => {
                        self.finalized = true;
                        Ok(())
                    }
                    Err(e) => Err(e),
                    Ok(current) if current.state == expected_state && current.finalized => {
                        *self = current;
                        Ok(())
                    }
                    Ok(current) => Err(TxError::assertion(
                        &self.tx_id,
                        format!(
                            "expected a {:?} record to finalize, found {:?}",
                            expected_state, current.state
                        ),
                    )),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a finalized record.
    ///
    /// Returns `false` if the stored record is not finalized or is gone.
    ///
    /// # Errors
    ///
    /// Returns any store error other than a failed condition.
    pub async fn delete(&self, manager: &TransactionManager) -> TxResult<bool> {
        let delete = DeleteItemRequest::new(&manager.config().transaction_table, tx_key(&self.tx_id))
            .with_expected(
                AttributeName::Finalized.as_str(),
                ExpectedAttributeValue::Equals(truthy()),
            );
        match manager.store().delete_item(delete).await {
            Ok(_) => {
                debug!(tx_id = %self.tx_id, "deleted transaction record");
                Ok(true)
            }
            Err(StoreError::ConditionalCheckFailed) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Save the pre-write image of a locked item for request `rid`.
    ///
    /// Transient items have nothing to restore and applied items were
    /// imaged before the apply, so both are skipped. An existing image is
    /// never overwritten.
    ///
    /// # Errors
    ///
    /// Returns any store error other than a failed condition.
    pub async fn save_item_image(
        &self,
        manager: &TransactionManager,
        locked: &Item,
        rid: u64,
    ) -> TxResult<()> {
        if is_transient(locked) || is_applied(locked) {
            return Ok(());
        }
        let mut image = locked.clone();
        image.insert(
            AttributeName::ImageId.as_str().to_string(),
            AttributeValue::S(image_id(&self.tx_id, rid)),
        );
        image.insert(
            AttributeName::TxId.as_str().to_string(),
            AttributeValue::s(&self.tx_id),
        );
        let put = PutItemRequest::new(&manager.config().item_image_table, image)
            .with_expected(AttributeName::ImageId.as_str(), ExpectedAttributeValue::NotExists);
        match manager.store().put_item(put).await {
            Ok(_) | Err(StoreError::ConditionalCheckFailed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Load the image saved for request `rid`, without shadow attributes.
    ///
    /// # Errors
    ///
    /// Returns any store error.
    pub async fn load_item_image(
        &self,
        manager: &TransactionManager,
        rid: u64,
    ) -> TxResult<Option<Item>> {
        let get = GetItemRequest::new(
            &manager.config().item_image_table,
            image_key(image_id(&self.tx_id, rid)),
        )
        .with_consistent_read(true);
        Ok(manager.store().get_item(get).await?.map(|mut image| {
            strip_shadow_attributes(&mut image);
            image
        }))
    }

    /// Delete the image saved for request `rid`, if any.
    ///
    /// # Errors
    ///
    /// Returns any store error.
    pub async fn delete_item_image(&self, manager: &TransactionManager, rid: u64) -> TxResult<()> {
        let delete = DeleteItemRequest::new(
            &manager.config().item_image_table,
            image_key(image_id(&self.tx_id, rid)),
        );
        manager.store().delete_item(delete).await?;
        Ok(())
    }
}
