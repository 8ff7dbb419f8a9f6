//! TESSERA Test Utilities
//!
//! Shared test infrastructure for the TESSERA workspace:
//! - Fixture entities (`Payment`, `Invoice`)
//! - Proptest generators
//! - Recording metrics/audit sinks
//! - Cache and store doubles that fail or stall on demand
//! - Custom assertions on repository results

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub use tessera_core::{
    entity_fields, impl_entity, EntityId, ErrorKind, FilterValue, RepoError, RepoResult,
    TenantId, Timestamp, Version,
};

use tessera_core::{
    CacheError, CacheResult, Entity, FieldMap, Predicate, Sort, StoreError, StoreResult,
};
use tessera_storage::{
    AuditAction, AuditSink, CachePort, CacheStats, InMemoryCache, InMemoryStore, MetricsSink,
    PersistencePort, StoreTx, TxFuture,
};

// ============================================================================
// FIXTURE ENTITIES
// ============================================================================

/// Payment lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl From<PaymentStatus> for FilterValue {
    fn from(status: PaymentStatus) -> Self {
        FilterValue::Text(status.as_str().to_string())
    }
}

impl From<PaymentStatus> for JsonValue {
    fn from(status: PaymentStatus) -> Self {
        JsonValue::String(status.as_str().to_string())
    }
}

entity_fields! {
    pub enum PaymentField {
        TenantId => "tenant_id",
        Reference => "reference",
        Status => "status",
        AmountCents => "amount_cents",
        Currency => "currency",
        PaidAt => "paid_at",
    }
}

/// Tenant-scoped payment, the workhorse fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: EntityId,
    pub version: Version,
    pub tenant_id: TenantId,
    pub reference: Option<String>,
    pub status: PaymentStatus,
    pub amount_cents: i64,
    pub currency: String,
    pub paid_at: Option<Timestamp>,
}

impl_entity!(Payment, PaymentField, tenant_id);

impl Payment {
    /// New pending payment at version 1.
    pub fn pending(tenant_id: TenantId, amount_cents: i64) -> Self {
        Self {
            id: tessera_core::new_entity_id(),
            version: 1,
            tenant_id,
            reference: None,
            status: PaymentStatus::Pending,
            amount_cents,
            currency: "USD".to_string(),
            paid_at: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_status(mut self, status: PaymentStatus) -> Self {
        self.status = status;
        self
    }
}

entity_fields! {
    pub enum InvoiceField {
        TenantId => "tenant_id",
        Number => "number",
        TotalCents => "total_cents",
        Settled => "settled",
    }
}

/// Invoice stored under an explicit collection name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: EntityId,
    pub version: Version,
    pub tenant_id: TenantId,
    pub number: String,
    pub total_cents: i64,
    pub settled: bool,
}

impl_entity!(Invoice, InvoiceField, tenant_id, collection = "billing_invoices");

impl Invoice {
    pub fn new(tenant_id: TenantId, number: impl Into<String>, total_cents: i64) -> Self {
        Self {
            id: tessera_core::new_entity_id(),
            version: 1,
            tenant_id,
            number: number.into(),
            total_cents,
            settled: false,
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;
    use tessera_core::PageRequest;
    use uuid::Uuid;

    /// Generate a random non-nil UUID.
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<u128>()
            .prop_filter("nil uuid", |n| *n != 0)
            .prop_map(Uuid::from_u128)
    }

    pub fn arb_payment_status() -> impl Strategy<Value = PaymentStatus> {
        prop_oneof![
            Just(PaymentStatus::Pending),
            Just(PaymentStatus::Paid),
            Just(PaymentStatus::Failed),
            Just(PaymentStatus::Refunded),
        ]
    }

    /// Generate a Payment for the given tenant.
    pub fn arb_payment(tenant_id: TenantId) -> impl Strategy<Value = Payment> {
        (
            arb_uuid(),
            1i64..50,
            proptest::option::of("[A-Z]{3}-[0-9]{1,6}"),
            arb_payment_status(),
            0i64..10_000_000,
        )
            .prop_map(move |(id, version, reference, status, amount_cents)| Payment {
                id,
                version,
                tenant_id,
                reference,
                status,
                amount_cents,
                currency: "USD".to_string(),
                paid_at: None,
            })
    }

    /// Generate a filter value of any variant except timestamps.
    pub fn arb_filter_value() -> impl Strategy<Value = FilterValue> {
        prop_oneof![
            any::<bool>().prop_map(FilterValue::Bool),
            any::<i64>().prop_map(FilterValue::Int),
            "[a-z0-9:,=%* ]{0,12}".prop_map(FilterValue::Text),
            arb_uuid().prop_map(FilterValue::Uuid),
        ]
    }

    /// Generate distinct field/value pairs for a filter set.
    pub fn arb_filter_entries() -> impl Strategy<Value = Vec<(String, FilterValue)>> {
        proptest::collection::btree_map("[a-z_]{1,10}", arb_filter_value(), 0..6)
            .prop_map(|m| m.into_iter().collect())
    }

    /// Generate page requests including out-of-range values.
    pub fn arb_page_request() -> impl Strategy<Value = PageRequest> {
        (-5i64..500, -5i64..500).prop_map(|(page, size)| PageRequest::new(page, size))
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;

    /// Fixed tenant used by single-tenant scenarios.
    pub fn tenant_default() -> TenantId {
        uuid::Uuid::from_u128(0x0190_0000_0000_7000_8000_0000_0000_0001)
    }

    /// `count` pending payments for one tenant with amounts 1..=count.
    pub fn payments(tenant_id: TenantId, count: usize) -> Vec<Payment> {
        (1..=count)
            .map(|n| Payment::pending(tenant_id, n as i64))
            .collect()
    }
}

// ============================================================================
// RECORDING SINKS
// ============================================================================

/// One `record_operation` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRecord {
    pub operation: String,
    pub collection: String,
    pub error: Option<ErrorKind>,
}

/// Metrics sink that keeps every call for inspection.
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    operations: Mutex<Vec<OperationRecord>>,
    query_counts: Mutex<Vec<usize>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operations(&self) -> Vec<OperationRecord> {
        self.operations
            .lock()
            .map(|ops| ops.clone())
            .unwrap_or_default()
    }

    /// Error kinds recorded for `operation`, in call order.
    pub fn failures_of(&self, operation: &str) -> Vec<ErrorKind> {
        self.operations()
            .into_iter()
            .filter(|r| r.operation == operation)
            .filter_map(|r| r.error)
            .collect()
    }

    pub fn query_counts(&self) -> Vec<usize> {
        self.query_counts
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::SeqCst)
    }
}

impl MetricsSink for RecordingMetrics {
    fn record_operation(
        &self,
        operation: &str,
        collection: &str,
        _duration: Duration,
        error: Option<&RepoError>,
    ) {
        if let Ok(mut ops) = self.operations.lock() {
            ops.push(OperationRecord {
                operation: operation.to_string(),
                collection: collection.to_string(),
                error: error.map(|e| e.kind),
            });
        }
    }

    fn record_cache_hit(&self, _collection: &str) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }

    fn record_cache_miss(&self, _collection: &str) {
        self.misses.fetch_add(1, Ordering::SeqCst);
    }

    fn record_query_count(&self, _collection: &str, count: usize) {
        if let Ok(mut counts) = self.query_counts.lock() {
            counts.push(count);
        }
    }
}

/// One audit event.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub collection: String,
    pub id: EntityId,
    pub payload: JsonValue,
}

/// Audit sink that keeps every event for inspection.
#[derive(Debug, Default)]
pub struct RecordingAudit {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn events_of(&self, action: AuditAction) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.action == action)
            .collect()
    }

    fn push(&self, action: AuditAction, collection: &str, id: EntityId, payload: &JsonValue) {
        if let Ok(mut events) = self.events.lock() {
            events.push(AuditEvent {
                action,
                collection: collection.to_string(),
                id,
                payload: payload.clone(),
            });
        }
    }
}

#[async_trait]
impl AuditSink for RecordingAudit {
    async fn log_create(&self, collection: &str, id: EntityId, payload: &JsonValue) {
        self.push(AuditAction::Create, collection, id, payload);
    }

    async fn log_update(&self, collection: &str, id: EntityId, payload: &JsonValue) {
        self.push(AuditAction::Update, collection, id, payload);
    }

    async fn log_delete(&self, collection: &str, id: EntityId, payload: &JsonValue) {
        self.push(AuditAction::Delete, collection, id, payload);
    }
}

// ============================================================================
// FAULT-INJECTING DOUBLES
// ============================================================================

/// Switchable failure and latency shared by the doubles below.
#[derive(Debug, Default)]
struct Faults {
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl Faults {
    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn set_delay(&self, delay: Option<Duration>) {
        if let Ok(mut d) = self.delay.lock() {
            *d = delay;
        }
    }

    /// Sleep for the configured delay, then report whether to fail.
    async fn gate(&self) -> bool {
        let delay = self.delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.failing.load(Ordering::SeqCst)
    }
}

/// In-memory cache that can be told to fail or stall every call.
#[derive(Debug, Default)]
pub struct FlakyCache {
    inner: InMemoryCache,
    faults: Faults,
}

impl FlakyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The healthy cache underneath, for inspecting what got stored.
    pub fn inner(&self) -> &InMemoryCache {
        &self.inner
    }

    pub fn set_failing(&self, failing: bool) {
        self.faults.set_failing(failing);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        self.faults.set_delay(delay);
    }

    async fn check(&self) -> CacheResult<()> {
        if self.faults.gate().await {
            return Err(CacheError::Backend {
                reason: "injected cache failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CachePort for FlakyCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.check().await?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        self.check().await?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        self.check().await?;
        self.inner.delete(keys).await
    }

    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64> {
        self.check().await?;
        self.inner.delete_pattern(pattern).await
    }

    async fn exists(&self, keys: &[String]) -> CacheResult<u64> {
        self.check().await?;
        self.inner.exists(keys).await
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        self.inner.stats().await
    }
}

/// In-memory store that can be told to fail or stall every call.
pub struct FailingStore<E> {
    inner: InMemoryStore<E>,
    faults: std::sync::Arc<Faults>,
}

impl<E> Clone for FailingStore<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            faults: std::sync::Arc::clone(&self.faults),
        }
    }
}

impl<E: Entity> Default for FailingStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> FailingStore<E> {
    pub fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            faults: std::sync::Arc::new(Faults::default()),
        }
    }

    /// The healthy store underneath; shares rows with this double.
    pub fn inner(&self) -> &InMemoryStore<E> {
        &self.inner
    }

    pub fn set_failing(&self, failing: bool) {
        self.faults.set_failing(failing);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        self.faults.set_delay(delay);
    }

    async fn check(&self) -> StoreResult<()> {
        if self.faults.gate().await {
            return Err(StoreError::backend("injected store failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl<E: Entity> PersistencePort<E> for FailingStore<E> {
    async fn insert(&self, entity: &E) -> StoreResult<()> {
        self.check().await?;
        self.inner.insert(entity).await
    }

    async fn insert_batch(&self, entities: &[E], chunk_size: usize) -> StoreResult<u64> {
        self.check().await?;
        self.inner.insert_batch(entities, chunk_size).await
    }

    async fn find_one(&self, predicate: &Predicate) -> StoreResult<Option<E>> {
        self.check().await?;
        self.inner.find_one(predicate).await
    }

    async fn find_many(
        &self,
        predicate: &Predicate,
        sort: &Sort,
        offset: i64,
        limit: Option<i64>,
    ) -> StoreResult<Vec<E>> {
        self.check().await?;
        self.inner.find_many(predicate, sort, offset, limit).await
    }

    async fn count(&self, predicate: &Predicate) -> StoreResult<i64> {
        self.check().await?;
        self.inner.count(predicate).await
    }

    async fn conditional_update(&self, predicate: &Predicate, entity: &E) -> StoreResult<u64> {
        self.check().await?;
        self.inner.conditional_update(predicate, entity).await
    }

    async fn update_fields(&self, predicate: &Predicate, patch: &FieldMap) -> StoreResult<u64> {
        self.check().await?;
        self.inner.update_fields(predicate, patch).await
    }

    async fn delete(&self, predicate: &Predicate) -> StoreResult<u64> {
        self.check().await?;
        self.inner.delete(predicate).await
    }

    async fn soft_delete(&self, predicate: &Predicate) -> StoreResult<u64> {
        self.check().await?;
        self.inner.soft_delete(predicate).await
    }

    async fn restore(&self, predicate: &Predicate) -> StoreResult<u64> {
        self.check().await?;
        self.inner.restore(predicate).await
    }

    async fn run_in_transaction<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: for<'t> FnOnce(&'t mut dyn StoreTx<E>) -> TxFuture<'t, T> + Send + 'static,
    {
        self.check().await?;
        self.inner.run_in_transaction(f).await
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    use super::*;

    /// Assert that a result failed with `kind`.
    pub fn assert_kind<T: std::fmt::Debug>(result: &RepoResult<T>, kind: ErrorKind) {
        match result {
            Err(e) => assert_eq!(e.kind, kind, "unexpected error: {e}"),
            Ok(v) => panic!("expected {kind}, got Ok({v:?})"),
        }
    }

    /// Assert that a result failed with `kind` and kept a store timeout as its cause.
    pub fn assert_timed_out<T: std::fmt::Debug>(result: &RepoResult<T>, kind: ErrorKind) {
        assert_kind(result, kind);
        if let Err(e) = result {
            assert!(e.is_timeout(), "expected timeout cause, got {:?}", e.cause);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
