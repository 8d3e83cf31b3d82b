//! Fault injection for crash and recovery tests.
//!
//! A [`FaultInjectingStore`] forwards to an inner store and fails chosen
//! calls with a service error. A fault placed before the call leaves the
//! store untouched; a fault placed after it lets the write land and then
//! loses the response, which is what a crash between the write and its
//! acknowledgement looks like to the caller. A missing fault answers as if
//! the item were gone, which is how a concurrent delete looks.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use txkv_codec::Item;
use txkv_storage::{
    BatchGetItemOutput, BatchGetItemRequest, DeleteItemRequest, GetItemRequest, KvStore,
    PutItemRequest, QueryOutput, QueryRequest, ScanOutput, ScanRequest, StoreError, StoreResult,
    TableDescription, UpdateItemRequest,
};

/// Store operations a fault can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// `get_item`.
    Get,
    /// `put_item`.
    Put,
    /// `update_item`.
    Update,
    /// `delete_item`.
    Delete,
}

/// When an injected fault fires relative to the real call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    /// Fail without calling the store.
    BeforeApply,
    /// Call the store, drop its result and fail.
    AfterApply,
    /// Skip the store and report no item.
    Missing,
}

/// One armed fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    /// Operation to match.
    pub op: StoreOp,
    /// Table to match.
    pub table_name: String,
    /// Matching calls to let through before firing.
    pub skip: usize,
    /// When to fire.
    pub point: FaultPoint,
}

impl Fault {
    /// Fail the first matching call.
    pub fn new(op: StoreOp, table_name: impl Into<String>, point: FaultPoint) -> Self {
        Self {
            op,
            table_name: table_name.into(),
            skip: 0,
            point,
        }
    }

    /// Let `skip` matching calls through first.
    #[must_use]
    pub fn after(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }
}

/// A store wrapper that fails armed calls.
///
/// Each fault fires once and is then disarmed.
pub struct FaultInjectingStore {
    inner: Arc<dyn KvStore>,
    faults: Mutex<Vec<Fault>>,
    fired: Mutex<usize>,
}

impl std::fmt::Debug for FaultInjectingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultInjectingStore")
            .field("faults", &*self.faults.lock())
            .field("fired", &*self.fired.lock())
            .finish_non_exhaustive()
    }
}

impl FaultInjectingStore {
    /// Wrap `inner` with no faults armed.
    pub fn new(inner: Arc<dyn KvStore>) -> Self {
        Self {
            inner,
            faults: Mutex::new(Vec::new()),
            fired: Mutex::new(0),
        }
    }

    /// Arm a fault.
    pub fn arm(&self, fault: Fault) {
        self.faults.lock().push(fault);
    }

    /// Disarm every pending fault.
    pub fn disarm_all(&self) {
        self.faults.lock().clear();
    }

    /// Number of faults that have fired.
    pub fn fired(&self) -> usize {
        *self.fired.lock()
    }

    /// Number of armed faults still waiting.
    pub fn pending(&self) -> usize {
        self.faults.lock().len()
    }

    /// Consume a matching armed fault, if one is due for this call.
    fn take(&self, op: StoreOp, table_name: &str) -> Option<FaultPoint> {
        let mut faults = self.faults.lock();
        let index = faults
            .iter()
            .position(|f| f.op == op && f.table_name == table_name)?;
        if faults[index].skip > 0 {
            faults[index].skip -= 1;
            return None;
        }
        let fault = faults.remove(index);
        *self.fired.lock() += 1;
        debug!(?op, table = %table_name, point = ?fault.point, "injecting store fault");
        Some(fault.point)
    }

    async fn guarded<F>(&self, op: StoreOp, table_name: &str, call: F) -> StoreResult<Option<Item>>
    where
        F: std::future::Future<Output = StoreResult<Option<Item>>> + Send,
    {
        match self.take(op, table_name) {
            None => call.await,
            Some(FaultPoint::BeforeApply) => Err(injected(op, table_name)),
            Some(FaultPoint::AfterApply) => {
                let _ = call.await;
                Err(injected(op, table_name))
            }
            Some(FaultPoint::Missing) => Ok(None),
        }
    }
}

fn injected(op: StoreOp, table_name: &str) -> StoreError {
    StoreError::service(format!("injected {op:?} fault on {table_name}"))
}

#[async_trait]
impl KvStore for FaultInjectingStore {
    async fn get_item(&self, request: GetItemRequest) -> StoreResult<Option<Item>> {
        let table_name = request.table_name.clone();
        self.guarded(StoreOp::Get, &table_name, self.inner.get_item(request))
            .await
    }

    async fn put_item(&self, request: PutItemRequest) -> StoreResult<Option<Item>> {
        let table_name = request.table_name.clone();
        self.guarded(StoreOp::Put, &table_name, self.inner.put_item(request))
            .await
    }

    async fn update_item(&self, request: UpdateItemRequest) -> StoreResult<Option<Item>> {
        let table_name = request.table_name.clone();
        self.guarded(StoreOp::Update, &table_name, self.inner.update_item(request))
            .await
    }

    async fn delete_item(&self, request: DeleteItemRequest) -> StoreResult<Option<Item>> {
        let table_name = request.table_name.clone();
        self.guarded(StoreOp::Delete, &table_name, self.inner.delete_item(request))
            .await
    }

    async fn scan(&self, request: ScanRequest) -> StoreResult<ScanOutput> {
        self.inner.scan(request).await
    }

    async fn query(&self, request: QueryRequest) -> StoreResult<QueryOutput> {
        self.inner.query(request).await
    }

    async fn batch_get_item(&self, request: BatchGetItemRequest) -> StoreResult<BatchGetItemOutput> {
        self.inner.batch_get_item(request).await
    }

    async fn describe_table(&self, table_name: &str) -> StoreResult<TableDescription> {
        self.inner.describe_table(table_name).await
    }
}
