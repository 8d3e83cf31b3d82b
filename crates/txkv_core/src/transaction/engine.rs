//! The transaction protocol engine.

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use txkv_codec::{AttributeValue, Item};
use txkv_storage::{
    AttributeValueUpdate, DeleteItemRequest, ExpectedAttributeValue, GetItemRequest,
    PutItemRequest, ReturnValue, StoreError, UpdateItemRequest,
};

use super::record::{AddOutcome, TransactionRecord};
use crate::attributes::{
    current_time, filter_attributes, is_applied, is_older_than, is_transient, lock_owner,
    strip_shadow_attributes, truthy, AttributeName, ImmutableKey, TransactionState,
};
use crate::error::{TxError, TxResult};
use crate::manager::TransactionManager;
use crate::request::{Operation, Request};

#[derive(Debug)]
struct TxInner {
    record: TransactionRecord,
    /// Requests this object has driven all the way through apply.
    fully_applied: HashSet<u64>,
}

/// A multi-item transaction.
///
/// Writes take effect on the items immediately but stay locked, with the
/// previous value saved aside, until [`commit`](Self::commit) or
/// [`rollback`](Self::rollback). Several `Transaction` objects may exist
/// for one transaction id, in this or other processes; they coordinate
/// through conditional writes only. Calls on one object are serialized.
#[derive(Debug)]
pub struct Transaction {
    tx_id: String,
    manager: TransactionManager,
    inner: Mutex<TxInner>,
}

fn is_ccf(result: &Result<Option<Item>, StoreError>) -> bool {
    matches!(result, Err(StoreError::ConditionalCheckFailed))
}

impl Transaction {
    pub(crate) fn from_record(manager: TransactionManager, record: TransactionRecord) -> Self {
        Self {
            tx_id: record.tx_id().to_string(),
            manager,
            inner: Mutex::new(TxInner {
                record,
                fully_applied: HashSet::new(),
            }),
        }
    }

    /// Transaction id.
    pub fn id(&self) -> &str {
        &self.tx_id
    }

    /// Snapshot of this object's copy of the record.
    pub async fn record(&self) -> TransactionRecord {
        self.inner.lock().await.record.clone()
    }

    /// Reads an item and holds a read lock on it until the transaction ends.
    ///
    /// Reads this transaction's own writes. Returns `None` if the item does
    /// not exist or this transaction deletes it.
    ///
    /// # Errors
    ///
    /// Returns `TxError::InvalidRequest` for unsupported requests,
    /// `TxError::ItemNotLocked` if contention could not be resolved, or a
    /// completed error if the transaction has finished.
    pub async fn get_item(&self, request: GetItemRequest) -> TxResult<Option<Item>> {
        self.drive(request.into()).await
    }

    /// Replaces an item within the transaction.
    ///
    /// Returns the old or new item per the request's return values.
    ///
    /// # Errors
    ///
    /// Returns `TxError::DuplicateRequest` if the item already has a write in
    /// this transaction, plus the errors of [`get_item`](Self::get_item).
    pub async fn put_item(&self, request: PutItemRequest) -> TxResult<Option<Item>> {
        self.drive(request.into()).await
    }

    /// Updates an item within the transaction.
    ///
    /// # Errors
    ///
    /// Same as [`put_item`](Self::put_item).
    pub async fn update_item(&self, request: UpdateItemRequest) -> TxResult<Option<Item>> {
        self.drive(request.into()).await
    }

    /// Deletes an item when the transaction commits.
    ///
    /// # Errors
    ///
    /// Same as [`put_item`](Self::put_item).
    pub async fn delete_item(&self, request: DeleteItemRequest) -> TxResult<Option<Item>> {
        self.drive(request.into()).await
    }

    async fn drive(&self, mut request: Request) -> TxResult<Option<Item>> {
        request.validate(&self.tx_id)?;
        let key = self.manager.request_key(&self.tx_id, &request).await?;
        let ikey = ImmutableKey::new(request.table_name(), key.clone());

        let mut inner = self.inner.lock().await;
        let attempts = self.manager.config().contention_resolution_attempts;
        let mut attempt = 0;
        loop {
            let recorded = attempt > 0 && inner.record.request_for(&ikey).is_some();
            let result = if recorded {
                self.lock_and_apply(&mut inner, &request, &key).await
            } else {
                match self.record_request(&mut inner, &mut request, &key).await {
                    Ok(()) => self.lock_and_apply(&mut inner, &request, &key).await,
                    Err(e) => Err(e),
                }
            };
            match result {
                Ok(item) => {
                    return Ok(item.map(|mut item| {
                        strip_shadow_attributes(&mut item);
                        item
                    }))
                }
                Err(TxError::ItemNotLocked {
                    lock_owner,
                    table_name,
                    key,
                    ..
                }) if attempt < attempts => {
                    self.break_lock(&lock_owner, &table_name, &key).await?;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Verify existing locks, then append `request` to the record.
    async fn record_request(
        &self,
        inner: &mut TxInner,
        request: &mut Request,
        key: &Item,
    ) -> TxResult<()> {
        self.verify_locks(inner).await?;

        for _ in 0..self.manager.config().add_request_attempts {
            match inner.record.add_request(&self.manager, request, key).await? {
                AddOutcome::Added | AddOutcome::AlreadyTracked => return Ok(()),
                AddOutcome::VersionConflict => {
                    inner.record = self.reload().await?;
                    match inner.record.state() {
                        TransactionState::Pending => {}
                        TransactionState::Committed => return Err(self.committed()),
                        TransactionState::RolledBack => return Err(self.rolled_back()),
                    }
                }
            }
        }
        Err(TxError::transaction(
            &self.tx_id,
            "unable to add request to the transaction record: too much contention",
        ))
    }

    /// Lock, image, re-check and apply a request already in the record.
    async fn lock_and_apply(
        &self,
        inner: &mut TxInner,
        request: &Request,
        key: &Item,
    ) -> TxResult<Option<Item>> {
        let attempts = self.manager.config().lock_acquire_attempts;
        let locked = self.lock_item(request, key, true, attempts).await?;

        if request.is_write() {
            let rid = self.rid_of(request)?;
            inner
                .record
                .save_item_image(&self.manager, &locked, rid)
                .await?;
        }

        match TransactionRecord::load(&self.manager, &self.tx_id).await {
            Err(TxError::TransactionNotFound { .. }) => {
                self.release_read_lock(request.table_name(), key).await?;
                if let (true, Some(rid)) = (request.is_write(), request.rid()) {
                    inner.record.delete_item_image(&self.manager, rid).await?;
                }
                return Err(TxError::not_found(&self.tx_id));
            }
            Err(e) => return Err(e),
            Ok(record) => inner.record = record,
        }
        match inner.record.state() {
            TransactionState::Pending => {}
            TransactionState::Committed => {
                self.do_commit(inner).await?;
                return Err(self.committed());
            }
            TransactionState::RolledBack => {
                self.do_rollback(inner).await?;
                return Err(self.rolled_back());
            }
        }

        let returned = self.apply_and_keep_lock(inner, request, key, locked).await?;
        if let Some(rid) = request.rid() {
            inner.fully_applied.insert(rid);
        }
        Ok(returned)
    }

    /// Redrive every recorded request this object has not seen applied.
    async fn verify_locks(&self, inner: &mut TxInner) -> TxResult<()> {
        let pending: Vec<(ImmutableKey, Request)> = inner
            .record
            .requests()
            .in_rid_order()
            .into_iter()
            .filter(|(_, r)| r.rid().map_or(true, |rid| !inner.fully_applied.contains(&rid)))
            .map(|(k, r)| (k.clone(), r.clone()))
            .collect();
        for (ikey, request) in pending {
            self.lock_and_apply(inner, &request, &ikey.key).await?;
        }
        Ok(())
    }

    /// Place this transaction's lock marker on an item.
    ///
    /// Returns the locked item. A missing item is created as a transient
    /// placeholder. A live foreign owner is rolled back while attempts
    /// remain.
    async fn lock_item(
        &self,
        request: &Request,
        key: &Item,
        mut expect_exists: bool,
        attempts: u32,
    ) -> TxResult<Item> {
        let table_name = request.table_name();
        for attempt in 0..attempts {
            let mut update = UpdateItemRequest::new(table_name, key.clone())
                .with_put(AttributeName::TxId.as_str(), AttributeValue::s(&self.tx_id))
                .with_put(AttributeName::Date.as_str(), current_time())
                .with_expected(AttributeName::TxId.as_str(), ExpectedAttributeValue::NotExists)
                .with_return_values(ReturnValue::AllNew);
            if !expect_exists {
                update = update.with_put(AttributeName::Transient.as_str(), truthy());
            }
            for (name, value) in key {
                let expected = if expect_exists {
                    ExpectedAttributeValue::Equals(value.clone())
                } else {
                    ExpectedAttributeValue::NotExists
                };
                update = update.with_expected(name.clone(), expected);
            }

            match self.manager.store().update_item(update).await {
                Ok(Some(item)) => return Ok(item),
                Ok(None) => {
                    return Err(TxError::assertion(
                        &self.tx_id,
                        "lock update returned no item",
                    ))
                }
                Err(StoreError::ConditionalCheckFailed) => {}
                Err(e) => return Err(e.into()),
            }

            let get = GetItemRequest::new(table_name, key.clone()).with_consistent_read(true);
            let Some(current) = self.manager.store().get_item(get).await? else {
                expect_exists = false;
                continue;
            };
            match lock_owner(&current) {
                None => expect_exists = true,
                Some(owner) if owner == self.tx_id => return Ok(current),
                Some(owner) if attempt + 1 < attempts => {
                    let owner = owner.to_string();
                    self.break_lock(&owner, table_name, key).await?;
                }
                Some(owner) => {
                    return Err(TxError::ItemNotLocked {
                        tx_id: self.tx_id.clone(),
                        lock_owner: owner.to_string(),
                        table_name: table_name.to_string(),
                        key: key.clone(),
                    })
                }
            }
        }
        Err(TxError::transaction(
            &self.tx_id,
            format!("unable to acquire a lock on {key:?} in {table_name}: too much contention"),
        ))
    }

    /// Roll back (or finish) the transaction holding a conflicting lock.
    ///
    /// If the owner's record is gone, the marker it left on the item is
    /// released instead.
    async fn break_lock(&self, owner: &str, table_name: &str, key: &Item) -> TxResult<()> {
        info!(tx_id = %self.tx_id, owner = %owner, "rolling back transaction holding a conflicting lock");
        let other = match self.manager.resume_transaction(owner).await {
            Ok(other) => other,
            Err(TxError::TransactionNotFound { .. }) => {
                return self.release_orphaned_lock(owner, table_name, key).await
            }
            Err(e) => return Err(e),
        };
        match other.rollback().await {
            Ok(()) | Err(TxError::TransactionCommitted { .. } | TxError::TransactionRolledBack { .. }) => {
                Ok(())
            }
            Err(TxError::UnknownCompletedTransaction { .. } | TxError::TransactionNotFound { .. }) => {
                self.release_orphaned_lock(owner, table_name, key).await
            }
            Err(e) => Err(e),
        }
    }

    /// Drop a lock whose owner no longer has a record.
    ///
    /// Only an unapplied marker is released; an owner is deleted only after
    /// every item it applied was committed or restored.
    async fn release_orphaned_lock(&self, owner: &str, table_name: &str, key: &Item) -> TxResult<()> {
        warn!(tx_id = %self.tx_id, owner = %owner, table_name = %table_name, "releasing lock of a vanished transaction");
        Self::release_lock(&self.manager, owner, table_name, key).await
    }

    /// Apply the write to a locked item at most once and compute the
    /// caller's return value.
    async fn apply_and_keep_lock(
        &self,
        inner: &TxInner,
        request: &Request,
        key: &Item,
        locked: Item,
    ) -> TxResult<Option<Item>> {
        let mut applied_now = false;
        let mut returned = None;
        let mut written = None;

        if !is_applied(&locked) {
            let own_lock = ExpectedAttributeValue::Equals(AttributeValue::s(&self.tx_id));
            match request.op() {
                Operation::Put(r) => {
                    let mut item = r.item.clone();
                    item.insert(AttributeName::TxId.as_str().into(), AttributeValue::s(&self.tx_id));
                    if is_transient(&locked) {
                        item.insert(AttributeName::Transient.as_str().into(), truthy());
                    }
                    item.insert(AttributeName::Applied.as_str().into(), truthy());
                    item.insert(AttributeName::Date.as_str().into(), current_time());

                    let mut put = PutItemRequest::new(&r.table_name, item.clone())
                        .with_expected(AttributeName::TxId.as_str(), own_lock)
                        .with_expected(AttributeName::Applied.as_str(), ExpectedAttributeValue::NotExists);
                    if r.return_values == Some(ReturnValue::AllOld) {
                        put = put.with_return_values(ReturnValue::AllOld);
                    }
                    let result = self.manager.store().put_item(put).await;
                    if !is_ccf(&result) {
                        returned = result?;
                        written = Some(item);
                        applied_now = true;
                    }
                }
                Operation::Update(r) => {
                    let mut update = r.clone();
                    update.attribute_updates.insert(
                        AttributeName::Applied.as_str().into(),
                        AttributeValueUpdate::Put(truthy()),
                    );
                    update.expected.insert(AttributeName::TxId.as_str().into(), own_lock);
                    update.expected.insert(
                        AttributeName::Applied.as_str().into(),
                        ExpectedAttributeValue::NotExists,
                    );
                    let result = self.manager.store().update_item(update).await;
                    if !is_ccf(&result) {
                        returned = result?;
                        written = returned.clone();
                        applied_now = true;
                    }
                }
                Operation::Get(_) | Operation::Delete(_) => {}
            }
        }

        if let Operation::Get(r) = request.op() {
            let ikey = ImmutableKey::new(&r.table_name, key.clone());
            let visible = match inner.record.request_for(&ikey) {
                Some(locking) if locking.is_delete() => false,
                Some(locking) if locking.is_get() => !is_transient(&locked),
                _ => true,
            };
            return Ok(visible.then(|| filter_attributes(locked, r.attributes_to_get.as_deref())));
        }

        match request.return_values().unwrap_or_default() {
            ReturnValue::AllOld => {
                if is_transient(&locked) {
                    Ok(None)
                } else if request.is_delete() {
                    Ok(Some(locked))
                } else if applied_now {
                    Ok(returned)
                } else {
                    let rid = self.rid_of(request)?;
                    match inner.record.load_item_image(&self.manager, rid).await? {
                        Some(image) => Ok(Some(image)),
                        None => Err(TxError::unknown_completed(
                            &self.tx_id,
                            "the old item image needed for ALL_OLD is gone",
                        )),
                    }
                }
            }
            ReturnValue::AllNew if !request.is_delete() => {
                if applied_now {
                    return Ok(written);
                }
                let get = GetItemRequest::new(request.table_name(), key.clone())
                    .with_consistent_read(true);
                let current = self.manager.store().get_item(get).await?.ok_or_else(|| {
                    TxError::unknown_completed(&self.tx_id, "the item needed for ALL_NEW is gone")
                })?;
                match lock_owner(&current) {
                    Some(owner) if owner == self.tx_id => Ok(Some(current)),
                    Some(owner) => Err(TxError::ItemNotLocked {
                        tx_id: self.tx_id.clone(),
                        lock_owner: owner.to_string(),
                        table_name: request.table_name().to_string(),
                        key: key.clone(),
                    }),
                    None => Err(TxError::unknown_completed(
                        &self.tx_id,
                        "the item needed for ALL_NEW is no longer locked",
                    )),
                }
            }
            _ => Ok(None),
        }
    }

    /// Commits the transaction.
    ///
    /// Safe to call again, from this or any resumed object: a committed
    /// transaction reports success and nothing is applied twice.
    ///
    /// # Errors
    ///
    /// Returns `TxError::TransactionRolledBack` if the transaction was rolled
    /// back, `TxError::UnknownCompletedTransaction` if its record is gone, or
    /// `TxError::Transaction` if the record kept changing underneath.
    pub async fn commit(&self) -> TxResult<()> {
        let mut inner = self.inner.lock().await;
        for _ in 0..=self.manager.config().commit_attempts {
            inner.record = self.reload().await?;
            match inner.record.state() {
                TransactionState::Committed => {
                    if !inner.record.is_finalized() {
                        self.do_commit(&mut inner).await?;
                    }
                    return Ok(());
                }
                TransactionState::RolledBack => {
                    if !inner.record.is_finalized() {
                        self.do_rollback(&mut inner).await?;
                    }
                    return Err(self.rolled_back());
                }
                TransactionState::Pending => {}
            }

            match self.verify_locks(&mut inner).await {
                Ok(()) => {}
                Err(TxError::TransactionCommitted { .. }) => return Ok(()),
                Err(e) => return Err(e),
            }

            let version = inner.record.version();
            if inner
                .record
                .finish(&self.manager, TransactionState::Committed, version)
                .await?
            {
                self.do_commit(&mut inner).await?;
                info!(tx_id = %self.tx_id, "committed transaction");
                return Ok(());
            }
            debug!(tx_id = %self.tx_id, version, "record changed during commit, retrying");
        }
        warn!(tx_id = %self.tx_id, "gave up committing under contention");
        Err(TxError::transaction(
            &self.tx_id,
            "unable to commit: the transaction record kept changing",
        ))
    }

    /// Rolls back the transaction, restoring every item it touched.
    ///
    /// Safe to call again; a rolled-back transaction reports success.
    ///
    /// # Errors
    ///
    /// Returns `TxError::TransactionCommitted` if the transaction committed
    /// first (its commit is completed before returning), or
    /// `TxError::UnknownCompletedTransaction` if its record is gone.
    pub async fn rollback(&self) -> TxResult<()> {
        let mut inner = self.inner.lock().await;
        self.rollback_locked(&mut inner).await
    }

    async fn rollback_locked(&self, inner: &mut TxInner) -> TxResult<()> {
        for _ in 0..self.manager.config().rollback_attempts {
            let version = inner.record.version();
            let finished = inner.record.state() == TransactionState::Pending
                && inner
                    .record
                    .finish(&self.manager, TransactionState::RolledBack, version)
                    .await?;
            if finished {
                self.do_rollback(inner).await?;
                info!(tx_id = %self.tx_id, "rolled back transaction");
                return Ok(());
            }

            inner.record = self.reload().await?;
            match inner.record.state() {
                TransactionState::Committed => {
                    if !inner.record.is_finalized() {
                        self.do_commit(inner).await?;
                    }
                    return Err(self.committed());
                }
                TransactionState::RolledBack => {
                    if !inner.record.is_finalized() {
                        self.do_rollback(inner).await?;
                    }
                    return Ok(());
                }
                TransactionState::Pending => {
                    debug!(tx_id = %self.tx_id, "record changed during rollback, retrying");
                }
            }
        }
        warn!(tx_id = %self.tx_id, "gave up rolling back under contention");
        Err(TxError::transaction(
            &self.tx_id,
            "unable to roll back: the transaction record kept changing",
        ))
    }

    /// Unlock every item, drop the images and finalize a committed record.
    async fn do_commit(&self, inner: &mut TxInner) -> TxResult<()> {
        let requests = Self::governing_requests(inner);
        let own_lock = || ExpectedAttributeValue::Equals(AttributeValue::s(&self.tx_id));

        for (ikey, request) in &requests {
            let table_name = ikey.table_name.as_str();
            match request.op() {
                Operation::Put(_) | Operation::Update(_) => {
                    let mut unlock = UpdateItemRequest::new(table_name, ikey.key.clone())
                        .with_expected(AttributeName::TxId.as_str(), own_lock());
                    for name in [
                        AttributeName::TxId,
                        AttributeName::Transient,
                        AttributeName::Applied,
                        AttributeName::Date,
                    ] {
                        unlock = unlock.with_update(name.as_str(), AttributeValueUpdate::Delete(None));
                    }
                    let result = self.manager.store().update_item(unlock).await;
                    if !is_ccf(&result) {
                        result?;
                    }
                }
                Operation::Delete(_) => {
                    let delete = DeleteItemRequest::new(table_name, ikey.key.clone())
                        .with_expected(AttributeName::TxId.as_str(), own_lock());
                    let result = self.manager.store().delete_item(delete).await;
                    if !is_ccf(&result) {
                        result?;
                    }
                }
                Operation::Get(_) => self.release_read_lock(table_name, &ikey.key).await?,
            }
        }

        self.delete_item_images(inner, &requests).await?;
        inner
            .record
            .complete(&self.manager, TransactionState::Committed)
            .await
    }

    /// Restore every item, drop the images and finalize a rolled-back record.
    async fn do_rollback(&self, inner: &mut TxInner) -> TxResult<()> {
        let requests = Self::governing_requests(inner);
        for (ikey, request) in &requests {
            self.rollback_item_and_release_lock(inner, ikey, request)
                .await?;
        }
        self.delete_item_images(inner, &requests).await?;
        inner
            .record
            .complete(&self.manager, TransactionState::RolledBack)
            .await
    }

    async fn rollback_item_and_release_lock(
        &self,
        inner: &TxInner,
        ikey: &ImmutableKey,
        request: &Request,
    ) -> TxResult<()> {
        let table_name = ikey.table_name.as_str();
        if request.is_get() {
            return self.release_read_lock(table_name, &ikey.key).await;
        }
        let own_lock = || ExpectedAttributeValue::Equals(AttributeValue::s(&self.tx_id));

        let rid = self.rid_of(request)?;
        if let Some(image) = inner.record.load_item_image(&self.manager, rid).await? {
            let restore = PutItemRequest::new(table_name, image)
                .with_expected(AttributeName::TxId.as_str(), own_lock());
            let result = self.manager.store().put_item(restore).await;
            if !is_ccf(&result) {
                result?;
            }
            return Ok(());
        }

        let delete = DeleteItemRequest::new(table_name, ikey.key.clone())
            .with_expected(AttributeName::TxId.as_str(), own_lock())
            .with_expected(
                AttributeName::Transient.as_str(),
                ExpectedAttributeValue::Equals(truthy()),
            );
        let result = self.manager.store().delete_item(delete).await;
        if !is_ccf(&result) {
            result?;
            return Ok(());
        }

        let get = GetItemRequest::new(table_name, ikey.key.clone()).with_consistent_read(true);
        let Some(current) = self.manager.store().get_item(get).await? else {
            return Ok(());
        };
        if lock_owner(&current) != Some(self.tx_id.as_str()) {
            return Ok(());
        }
        if is_applied(&current) {
            return Err(TxError::assertion(
                &self.tx_id,
                format!(
                    "item {:?} in {table_name} is applied but has no old item image",
                    ikey.key
                ),
            ));
        }

        let release = UpdateItemRequest::new(table_name, ikey.key.clone())
            .with_update(AttributeName::TxId.as_str(), AttributeValueUpdate::Delete(None))
            .with_update(AttributeName::Date.as_str(), AttributeValueUpdate::Delete(None))
            .with_expected(AttributeName::TxId.as_str(), own_lock())
            .with_expected(AttributeName::Applied.as_str(), ExpectedAttributeValue::NotExists);
        let result = self.manager.store().update_item(release).await;
        if !is_ccf(&result) {
            result?;
        }
        Ok(())
    }

    /// Drop a lock that guarded no write.
    async fn release_read_lock(&self, table_name: &str, key: &Item) -> TxResult<()> {
        Self::release_lock(&self.manager, &self.tx_id, table_name, key).await
    }

    /// Remove `owner`'s unapplied marker from an item.
    ///
    /// An existing item just loses the marker; a transient placeholder is
    /// deleted.
    async fn release_lock(
        manager: &TransactionManager,
        owner: &str,
        table_name: &str,
        key: &Item,
    ) -> TxResult<()> {
        let owned = || ExpectedAttributeValue::Equals(AttributeValue::s(owner));

        let release = UpdateItemRequest::new(table_name, key.clone())
            .with_update(AttributeName::TxId.as_str(), AttributeValueUpdate::Delete(None))
            .with_update(AttributeName::Date.as_str(), AttributeValueUpdate::Delete(None))
            .with_expected(AttributeName::TxId.as_str(), owned())
            .with_expected(AttributeName::Transient.as_str(), ExpectedAttributeValue::NotExists)
            .with_expected(AttributeName::Applied.as_str(), ExpectedAttributeValue::NotExists);
        let result = manager.store().update_item(release).await;
        if !is_ccf(&result) {
            result?;
            return Ok(());
        }

        let delete = DeleteItemRequest::new(table_name, key.clone())
            .with_expected(AttributeName::TxId.as_str(), owned())
            .with_expected(
                AttributeName::Transient.as_str(),
                ExpectedAttributeValue::Equals(truthy()),
            )
            .with_expected(AttributeName::Applied.as_str(), ExpectedAttributeValue::NotExists);
        let result = manager.store().delete_item(delete).await;
        if !is_ccf(&result) {
            result?;
        }
        Ok(())
    }

    async fn delete_item_images(
        &self,
        inner: &TxInner,
        requests: &[(ImmutableKey, Request)],
    ) -> TxResult<()> {
        for (_, request) in requests {
            if let (true, Some(rid)) = (request.is_write(), request.rid()) {
                inner
                    .record
                    .delete_item_image(&self.manager, rid)
                    .await?;
            }
        }
        Ok(())
    }

    /// Deletes the transaction record once it is finalized.
    ///
    /// With `min_age`, only a record untouched for at least that long is
    /// deleted. Returns `true` if the record is gone, `false` if it was too
    /// young.
    ///
    /// # Errors
    ///
    /// Returns `TxError::Transaction` if the transaction has not finished.
    pub async fn delete(&self, min_age: Option<Duration>) -> TxResult<bool> {
        let mut inner = self.inner.lock().await;
        self.delete_locked(&mut inner, min_age).await
    }

    async fn delete_locked(&self, inner: &mut TxInner, min_age: Option<Duration>) -> TxResult<bool> {
        if !inner.record.is_finalized() {
            match TransactionRecord::load(&self.manager, &self.tx_id).await {
                Ok(record) => inner.record = record,
                Err(TxError::TransactionNotFound { .. }) => return Ok(true),
                Err(e) => return Err(e),
            }
            if !inner.record.is_finalized() {
                return Err(TxError::transaction(
                    &self.tx_id,
                    "only a finished transaction can be deleted",
                ));
            }
        }
        if let Some(age) = min_age {
            if !is_older_than(inner.record.date(), age) {
                return Ok(false);
            }
        }
        if inner.record.delete(&self.manager).await? {
            return Ok(true);
        }
        match TransactionRecord::load(&self.manager, &self.tx_id).await {
            Err(TxError::TransactionNotFound { .. }) => Ok(true),
            Err(e) => Err(e),
            Ok(_) => Err(TxError::transaction(
                &self.tx_id,
                "the transaction record could not be deleted",
            )),
        }
    }

    /// Reclaims an idle or abandoned transaction.
    ///
    /// A pending transaction untouched for `rollback_after` is rolled back.
    /// A finished one has its cleanup completed, and once finalized and
    /// untouched for `delete_after` its record is deleted. Returns `true` if
    /// the record is gone.
    ///
    /// # Errors
    ///
    /// Returns store errors or cleanup failures.
    pub async fn sweep(&self, rollback_after: Duration, delete_after: Duration) -> TxResult<bool> {
        let mut inner = self.inner.lock().await;
        match TransactionRecord::load(&self.manager, &self.tx_id).await {
            Ok(record) => inner.record = record,
            Err(TxError::TransactionNotFound { .. }) => return Ok(true),
            Err(e) => return Err(e),
        }

        if inner.record.is_finalized() {
            return self.delete_locked(&mut inner, Some(delete_after)).await;
        }
        match inner.record.state() {
            TransactionState::Pending => {
                if is_older_than(inner.record.date(), rollback_after) {
                    info!(tx_id = %self.tx_id, "sweeping stale pending transaction");
                    match self.rollback_locked(&mut inner).await {
                        Ok(()) => {}
                        Err(e) if e.is_completed() => {}
                        Err(e) => return Err(e),
                    }
                }
            }
            TransactionState::Committed => {
                self.do_commit(&mut inner).await?;
                return self.delete_locked(&mut inner, Some(delete_after)).await;
            }
            TransactionState::RolledBack => {
                self.do_rollback(&mut inner).await?;
                return self.delete_locked(&mut inner, Some(delete_after)).await;
            }
        }
        Ok(false)
    }

    fn governing_requests(inner: &TxInner) -> Vec<(ImmutableKey, Request)> {
        inner
            .record
            .requests()
            .in_rid_order()
            .into_iter()
            .map(|(k, r)| (k.clone(), r.clone()))
            .collect()
    }

    fn rid_of(&self, request: &Request) -> TxResult<u64> {
        request
            .rid()
            .ok_or_else(|| TxError::assertion(&self.tx_id, "write request has no request id"))
    }

    async fn reload(&self) -> TxResult<TransactionRecord> {
        match TransactionRecord::load(&self.manager, &self.tx_id).await {
            Err(TxError::TransactionNotFound { .. }) => Err(TxError::unknown_completed(
                &self.tx_id,
                "the transaction record no longer exists",
            )),
            other => other,
        }
    }

    fn committed(&self) -> TxError {
        TxError::TransactionCommitted {
            tx_id: self.tx_id.clone(),
        }
    }

    fn rolled_back(&self) -> TxError {
        TxError::TransactionRolledBack {
            tx_id: self.tx_id.clone(),
        }
    }
}
