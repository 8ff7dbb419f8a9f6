//! Generic repository engine.
//!
//! One [`Repository`] per entity type. Reads go cache-first and populate the
//! cache on a miss; writes go to the store, then evict what they may have made
//! stale, then notify the audit sink.
//!
//! # Optimistic Concurrency
//!
//! `update` re-reads the stored version (bypassing the cache), refuses a
//! caller holding an older one, and writes with `WHERE id = ? AND version = ?`
//! carrying `version + 1`. If another writer got there first the conditional
//! write matches no row and the update fails with `CONFLICT`. No locks are
//! held by the engine.
//!
//! # Invalidation
//!
//! Any single-entity write evicts every `list` and `count` key of the
//! collection plus the written id's `id` and `exists` keys. Bulk updates, whose
//! affected ids are unknown, evict the whole collection.

mod cache_layer;
mod deps;

pub use deps::RepositoryDeps;

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use serde_json::Value as JsonValue;
use tessera_core::{
    diff_fields, is_nil_id, paginate, CacheKeyBuilder, CacheOp, Entity, EntityId, ErrorKind,
    Filter, FilterSet, Page, PageRequest, Patch, Predicate, RepoError, RepoResult,
    RepositoryConfig, Scope, Sort, StoreError, StoreResult, TenantId,
};

use crate::observability::{AuditSink, MetricsSink};
use crate::store::PersistencePort;
use cache_layer::CacheLayer;

/// Cache-aside repository for entities of type `E` stored in `S`.
pub struct Repository<E, S> {
    store: S,
    cache: CacheLayer,
    metrics: Arc<dyn MetricsSink>,
    audit: Arc<dyn AuditSink>,
    keys: CacheKeyBuilder,
    config: RepositoryConfig,
    collection: String,
    _entity: PhantomData<fn() -> E>,
}

impl<E, S> Repository<E, S>
where
    E: Entity,
    S: PersistencePort<E>,
{
    /// Build a repository. Absent collaborators become no-ops here, once.
    pub fn new(store: S, deps: RepositoryDeps, config: RepositoryConfig) -> Self {
        let deps = deps.resolve();
        let collection = E::collection();
        let keys = CacheKeyBuilder::new(config.key_namespace.clone(), collection.clone())
            .with_tenant_field(E::TENANT_FIELD);

        Self {
            store,
            cache: CacheLayer::new(deps.cache, config.cache_ttl, config.cache_timeout),
            metrics: deps.metrics,
            audit: deps.audit,
            keys,
            config,
            collection,
            _entity: PhantomData,
        }
    }

    /// Repository with no cache, metrics or audit and default configuration.
    pub fn with_store(store: S) -> Self {
        Self::new(store, RepositoryDeps::default(), RepositoryConfig::default())
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn keys(&self) -> &CacheKeyBuilder {
        &self.keys
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ========================================================================
    // PLUMBING
    // ========================================================================

    /// Time an operation and report it to the metrics sink.
    async fn observe<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = RepoResult<T>>,
    ) -> RepoResult<T> {
        let started = Instant::now();
        let result = fut.await;
        self.metrics.record_operation(
            operation,
            &self.collection,
            started.elapsed(),
            result.as_ref().err(),
        );
        result
    }

    /// Bound a store call by the operation deadline.
    async fn bounded<T>(&self, fut: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
        match tokio::time::timeout(self.config.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                timeout_ms: u64::try_from(self.config.operation_timeout.as_millis())
                    .unwrap_or(u64::MAX),
            }),
        }
    }

    fn store_failure(&self, kind: ErrorKind, cause: StoreError) -> RepoError {
        match &cause {
            StoreError::UniqueViolation { .. } => {
                tracing::info!(collection = %self.collection, kind = %kind, error = %cause, "Unique violation");
            }
            _ => {
                tracing::error!(collection = %self.collection, kind = %kind, error = %cause, "Store operation failed");
            }
        }
        RepoError::store_failure(kind, cause)
    }

    fn require_id(&self, id: EntityId) -> RepoResult<()> {
        if is_nil_id(&id) {
            return Err(RepoError::nil_id(&self.collection));
        }
        Ok(())
    }

    fn snapshot(&self, entity: &E) -> JsonValue {
        serde_json::to_value(entity).unwrap_or_else(|e| {
            tracing::warn!(collection = %self.collection, error = %e, "Failed to serialize audit snapshot");
            JsonValue::Null
        })
    }

    fn record_lookup(&self, hit: bool) {
        if !self.cache.is_enabled() {
            return;
        }
        if hit {
            self.metrics.record_cache_hit(&self.collection);
        } else {
            self.metrics.record_cache_miss(&self.collection);
        }
    }

    async fn evict_id_keys(&self, id: EntityId) {
        self.cache.evict_pattern(&self.keys.id_pattern(id)).await;
        self.cache.evict(&[self.keys.exists_key(id)]).await;
    }

    async fn evict_queries(&self) {
        self.cache.evict_pattern(&self.keys.op_pattern(CacheOp::List)).await;
        self.cache.evict_pattern(&self.keys.op_pattern(CacheOp::Count)).await;
    }

    async fn invalidate_after_write(&self, id: EntityId) {
        self.evict_queries().await;
        self.evict_id_keys(id).await;
    }

    // ========================================================================
    // CREATE
    // ========================================================================

    /// Persist a new entity.
    ///
    /// A version below 1 is stored as 1.
    pub async fn create(&self, entity: E) -> RepoResult<E> {
        self.observe("create", self.create_inner(entity)).await
    }

    async fn create_inner(&self, mut entity: E) -> RepoResult<E> {
        let id = entity.id();
        self.require_id(id)?;
        if entity.version() < 1 {
            entity.set_version(1);
        }

        self.bounded(self.store.insert(&entity))
            .await
            .map_err(|e| self.store_failure(ErrorKind::CreateFailed, e))?;

        self.invalidate_after_write(id).await;
        if self.audit.is_enabled() {
            self.audit
                .log_create(&self.collection, id, &self.snapshot(&entity))
                .await;
        }
        Ok(entity)
    }

    /// Persist many entities in one transaction; all or nothing.
    ///
    /// Returns the number of rows inserted. Empty input is a no-op.
    pub async fn create_batch(&self, entities: Vec<E>) -> RepoResult<u64> {
        self.observe("create_batch", self.create_batch_inner(entities))
            .await
    }

    async fn create_batch_inner(&self, mut entities: Vec<E>) -> RepoResult<u64> {
        if entities.is_empty() {
            return Ok(0);
        }
        for entity in entities.iter_mut() {
            if is_nil_id(&entity.id()) {
                return Err(RepoError::invalid_input(format!(
                    "{}: batch contains a nil id",
                    self.collection
                )));
            }
            if entity.version() < 1 {
                entity.set_version(1);
            }
        }

        let batch = entities.clone();
        let chunk_size = self.config.batch_chunk_size;
        let inserted = self
            .bounded(self.store.run_in_transaction(move |tx| {
                async move { tx.insert_batch(&batch, chunk_size).await }.boxed()
            }))
            .await
            .map_err(|e| self.store_failure(ErrorKind::CreateBatchFailed, e))?;

        self.evict_queries().await;
        for entity in &entities {
            self.evict_id_keys(entity.id()).await;
        }
        if self.audit.is_enabled() {
            for entity in &entities {
                self.audit
                    .log_create(&self.collection, entity.id(), &self.snapshot(entity))
                    .await;
            }
        }

        tracing::debug!(collection = %self.collection, inserted, "Batch created");
        Ok(inserted)
    }

    // ========================================================================
    // READ
    // ========================================================================

    /// Fetch by id, cache first.
    pub async fn get_by_id(&self, id: EntityId) -> RepoResult<E> {
        self.observe("get_by_id", self.get_inner(id, None)).await
    }

    /// Fetch by id, optionally scoped to a tenant. The cache key is tenant-scoped too.
    pub async fn get_by_id_with_tenant(
        &self,
        id: EntityId,
        tenant: Option<TenantId>,
    ) -> RepoResult<E> {
        self.observe("get_by_id", self.get_inner(id, tenant)).await
    }

    async fn get_inner(&self, id: EntityId, tenant: Option<TenantId>) -> RepoResult<E> {
        self.require_id(id)?;

        let key = self.keys.id_key(id, tenant);
        if let Some(entity) = self.cache.read::<E>(&key).await {
            self.record_lookup(true);
            return Ok(entity);
        }
        self.record_lookup(false);

        let mut predicate = Predicate::by_id(id);
        if let Some(tenant) = tenant {
            predicate = predicate.with_tenant(E::TENANT_FIELD, tenant);
        }

        let entity = self
            .bounded(self.store.find_one(&predicate))
            .await
            .map_err(|e| self.store_failure(ErrorKind::FindFailed, e))?
            .ok_or_else(|| RepoError::not_found(&self.collection, id))?;

        self.cache.write(&key, &entity).await;
        Ok(entity)
    }

    /// First entity matching `filter` in id order. Not cached.
    pub async fn find_one(&self, filter: &Filter<E>) -> RepoResult<E> {
        self.observe("find_one", async {
            let predicate = Predicate::matching(filter.as_set().clone());
            self.bounded(self.store.find_one(&predicate))
                .await
                .map_err(|e| self.store_failure(ErrorKind::FindFailed, e))?
                .ok_or_else(|| {
                    RepoError::new(
                        ErrorKind::NotFound,
                        format!(
                            "no {} matches {}",
                            self.collection,
                            filter.as_set().canonical_string()
                        ),
                    )
                })
        })
        .await
    }

    /// Every entity matching `filter`, id ascending.
    pub async fn find(&self, filter: &Filter<E>) -> RepoResult<Vec<E>> {
        self.observe("find", self.find_inner(filter.as_set())).await
    }

    async fn find_inner(&self, filters: &FilterSet) -> RepoResult<Vec<E>> {
        let key = self.keys.key(CacheOp::List, filters);
        if let Some(items) = self.cache.read::<Vec<E>>(&key).await {
            self.record_lookup(true);
            self.metrics.record_query_count(&self.collection, items.len());
            return Ok(items);
        }
        self.record_lookup(false);

        let predicate = Predicate::matching(filters.clone());
        let items = self
            .bounded(self.store.find_many(&predicate, &Sort::default(), 0, None))
            .await
            .map_err(|e| self.store_failure(ErrorKind::FindFailed, e))?;

        self.cache.write(&key, &items).await;
        self.metrics.record_query_count(&self.collection, items.len());
        Ok(items)
    }

    /// One page of the entities matching `filter`, id ascending.
    ///
    /// Out-of-range page numbers and sizes are clamped.
    pub async fn find_with_pagination(
        &self,
        filter: &Filter<E>,
        request: PageRequest,
    ) -> RepoResult<Page<E>> {
        self.observe(
            "find_with_pagination",
            self.paginate_inner(filter.as_set(), request.normalized()),
        )
        .await
    }

    async fn paginate_inner(&self, filters: &FilterSet, request: PageRequest) -> RepoResult<Page<E>> {
        let key = self.keys.page_key(filters, request);
        if let Some(page) = self.cache.read::<Page<E>>(&key).await {
            self.record_lookup(true);
            self.metrics.record_query_count(&self.collection, page.items.len());
            return Ok(page);
        }
        self.record_lookup(false);

        let predicate = Predicate::matching(filters.clone());
        let total = self
            .bounded(self.store.count(&predicate))
            .await
            .map_err(|e| self.store_failure(ErrorKind::FindFailed, e))?;
        let pagination = paginate(request, total);

        let items = self
            .bounded(self.store.find_many(
                &predicate,
                &Sort::default(),
                request.offset(),
                Some(request.limit()),
            ))
            .await
            .map_err(|e| self.store_failure(ErrorKind::FindFailed, e))?;

        let page = Page { items, pagination };
        self.cache.write(&key, &page).await;
        self.metrics.record_query_count(&self.collection, page.items.len());
        Ok(page)
    }

    /// Number of entities matching `filter`.
    pub async fn count(&self, filter: &Filter<E>) -> RepoResult<i64> {
        self.observe("count", async {
            let key = self.keys.key(CacheOp::Count, filter.as_set());
            if let Some(n) = self.cache.read::<i64>(&key).await {
                self.record_lookup(true);
                return Ok(n);
            }
            self.record_lookup(false);

            let predicate = Predicate::matching(filter.as_set().clone());
            let n = self
                .bounded(self.store.count(&predicate))
                .await
                .map_err(|e| self.store_failure(ErrorKind::CountFailed, e))?;

            self.cache.write(&key, &n).await;
            Ok(n)
        })
        .await
    }

    /// Whether an active entity with `id` exists.
    pub async fn exists(&self, id: EntityId) -> RepoResult<bool> {
        self.observe("exists", async {
            self.require_id(id)?;

            let key = self.keys.exists_key(id);
            if let Some(found) = self.cache.read::<bool>(&key).await {
                self.record_lookup(true);
                return Ok(found);
            }
            self.record_lookup(false);

            let found = self
                .bounded(self.store.count(&Predicate::by_id(id)))
                .await
                .map_err(|e| self.store_failure(ErrorKind::ExistsCheckFailed, e))?
                > 0;

            self.cache.write(&key, &found).await;
            Ok(found)
        })
        .await
    }

    // ========================================================================
    // UPDATE
    // ========================================================================

    /// Write `entity` if its version is still the stored one.
    ///
    /// Returns the entity as stored, carrying the advanced version. A stale
    /// version fails with `CONFLICT` and changes nothing.
    pub async fn update(&self, entity: E) -> RepoResult<E> {
        self.observe("update", self.update_inner(entity)).await
    }

    async fn update_inner(&self, entity: E) -> RepoResult<E> {
        let id = entity.id();
        self.require_id(id)?;

        let current = self
            .bounded(self.store.find_one(&Predicate::by_id(id)))
            .await
            .map_err(|e| self.store_failure(ErrorKind::UpdateFailed, e))?
            .ok_or_else(|| RepoError::not_found(&self.collection, id))?;

        let stored_version = current.version();
        if entity.version() != stored_version {
            tracing::info!(
                collection = %self.collection,
                entity_id = %id,
                expected = entity.version(),
                stored = stored_version,
                "Version conflict"
            );
            return Err(RepoError::conflict(
                &self.collection,
                id,
                entity.version(),
                stored_version,
            ));
        }

        let mut next = entity;
        next.set_version(stored_version + 1);

        let predicate = Predicate::by_id(id).with_version(stored_version);
        let rows = self
            .bounded(self.store.conditional_update(&predicate, &next))
            .await
            .map_err(|e| self.store_failure(ErrorKind::UpdateFailed, e))?;

        if rows == 0 {
            tracing::info!(
                collection = %self.collection,
                entity_id = %id,
                version = stored_version,
                "Concurrent update won the race"
            );
            return Err(RepoError::conflict(
                &self.collection,
                id,
                stored_version,
                stored_version + 1,
            ));
        }

        self.invalidate_after_write(id).await;
        if self.audit.is_enabled() {
            let payload = serde_json::json!({
                "before": self.snapshot(&current),
                "after": self.snapshot(&next),
                "changes": diff_fields(&current.field_map(), &next.field_map()),
            });
            self.audit.log_update(&self.collection, id, &payload).await;
        }
        Ok(next)
    }

    /// Assign `patch` to every entity matching `filter`, bumping each version.
    ///
    /// An empty filter is refused rather than rewriting the whole collection.
    pub async fn update_where(&self, filter: &Filter<E>, patch: &Patch<E>) -> RepoResult<u64> {
        self.observe("update_where", async {
            if filter.is_empty() {
                return Err(RepoError::invalid_input(format!(
                    "{}: bulk update requires a non-empty filter",
                    self.collection
                )));
            }
            if patch.is_empty() {
                return Err(RepoError::invalid_input(format!(
                    "{}: bulk update requires at least one field",
                    self.collection
                )));
            }

            let predicate = Predicate::matching(filter.as_set().clone());
            let rows = self
                .bounded(self.store.update_fields(&predicate, patch.fields()))
                .await
                .map_err(|e| self.store_failure(ErrorKind::UpdateFailed, e))?;

            if rows > 0 {
                self.cache.evict_pattern(&self.keys.collection_pattern()).await;
            }
            Ok(rows)
        })
        .await
    }

    // ========================================================================
    // DELETE
    // ========================================================================

    /// Remove the row for good.
    pub async fn delete(&self, id: EntityId) -> RepoResult<()> {
        self.observe("delete", async {
            self.require_id(id)?;
            let rows = self
                .bounded(self.store.delete(&Predicate::by_id(id)))
                .await
                .map_err(|e| self.store_failure(ErrorKind::DeleteFailed, e))?;
            if rows == 0 {
                return Err(RepoError::not_found(&self.collection, id));
            }

            self.invalidate_after_write(id).await;
            if self.audit.is_enabled() {
                let payload = serde_json::json!({ "mode": "hard" });
                self.audit.log_delete(&self.collection, id, &payload).await;
            }
            Ok(())
        })
        .await
    }

    /// Stamp a deletion time; the entity disappears from default reads.
    pub async fn soft_delete(&self, id: EntityId) -> RepoResult<()> {
        self.observe("soft_delete", async {
            self.require_id(id)?;
            let rows = self
                .bounded(self.store.soft_delete(&Predicate::by_id(id)))
                .await
                .map_err(|e| self.store_failure(ErrorKind::SoftDeleteFailed, e))?;
            if rows == 0 {
                return Err(RepoError::not_found(&self.collection, id));
            }

            self.invalidate_after_write(id).await;
            if self.audit.is_enabled() {
                let payload = serde_json::json!({ "mode": "soft" });
                self.audit.log_delete(&self.collection, id, &payload).await;
            }
            Ok(())
        })
        .await
    }

    /// Clear the deletion time of a soft-deleted entity. Not audited.
    pub async fn restore(&self, id: EntityId) -> RepoResult<()> {
        self.observe("restore", async {
            self.require_id(id)?;
            let predicate = Predicate::by_id(id).with_scope(Scope::OnlyDeleted);
            let rows = self
                .bounded(self.store.restore(&predicate))
                .await
                .map_err(|e| self.store_failure(ErrorKind::RestoreFailed, e))?;
            if rows == 0 {
                return Err(RepoError::not_found(&self.collection, id));
            }

            self.invalidate_after_write(id).await;
            Ok(())
        })
        .await
    }

    // ========================================================================
    // INVALIDATION
    // ========================================================================

    /// Evict every cached entry keyed by `id`.
    pub async fn invalidate_cache(&self, id: EntityId) {
        self.evict_id_keys(id).await;
    }

    /// Evict every key matching a glob (trailing `*` required).
    ///
    /// For callers that mutate the collection outside this repository.
    pub async fn invalidate_cache_pattern(&self, pattern: &str) {
        self.cache.evict_pattern(pattern).await;
    }

    /// Evict every cached entry of this collection.
    pub async fn invalidate_all(&self) {
        self.cache.evict_pattern(&self.keys.collection_pattern()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::store::InMemoryStore;
    use std::sync::Mutex;
    use std::time::Duration;
    use tessera_test_utils::{Payment, PaymentField, PaymentStatus};
    use uuid::Uuid;

    #[derive(Default)]
    struct CountingMetrics {
        hits: Mutex<u32>,
        misses: Mutex<u32>,
        failures: Mutex<Vec<String>>,
    }

    impl MetricsSink for CountingMetrics {
        fn record_operation(&self, op: &str, _: &str, _: Duration, error: Option<&RepoError>) {
            if let Some(e) = error {
                self.failures
                    .lock()
                    .unwrap()
                    .push(format!("{op}:{}", e.kind));
            }
        }
        fn record_cache_hit(&self, _: &str) {
            *self.hits.lock().unwrap() += 1;
        }
        fn record_cache_miss(&self, _: &str) {
            *self.misses.lock().unwrap() += 1;
        }
        fn record_query_count(&self, _: &str, _: usize) {}
    }

    type PaymentRepo = Repository<Payment, InMemoryStore<Payment>>;

    fn repo() -> (PaymentRepo, Arc<InMemoryCache>, Arc<CountingMetrics>) {
        let cache = Arc::new(InMemoryCache::new());
        let metrics = Arc::new(CountingMetrics::default());
        let deps = RepositoryDeps::new()
            .with_cache(cache.clone())
            .with_metrics(metrics.clone());
        let repo = Repository::new(InMemoryStore::new(), deps, RepositoryConfig::default());
        (repo, cache, metrics)
    }

    #[tokio::test]
    async fn test_create_then_get_populates_cache() {
        let (repo, cache, metrics) = repo();
        let p = Payment::pending(Uuid::new_v4(), 1200);

        let created = repo.create(p.clone()).await.expect("create should succeed");
        assert_eq!(created, p);

        let first = repo.get_by_id(p.id).await.expect("get should succeed");
        assert_eq!(first, p);
        assert!(cache.keys().contains(&repo.keys().id_key(p.id, None)));

        let second = repo.get_by_id(p.id).await.expect("get should succeed");
        assert_eq!(second, p);
        assert_eq!(*metrics.hits.lock().unwrap(), 1);
        assert_eq!(*metrics.misses.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_create_normalizes_version() {
        let (repo, _, _) = repo();
        let mut p = Payment::pending(Uuid::new_v4(), 10);
        p.version = 0;
        let created = repo.create(p).await.expect("create should succeed");
        assert_eq!(created.version, 1);
    }

    #[tokio::test]
    async fn test_nil_id_is_invalid_input() {
        let (repo, _, metrics) = repo();
        let err = repo.get_by_id(Uuid::nil()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
        assert_eq!(
            metrics.failures.lock().unwrap().as_slice(),
            ["get_by_id:INVALID_INPUT"]
        );

        let mut p = Payment::pending(Uuid::new_v4(), 1);
        p.id = Uuid::nil();
        assert_eq!(repo.create(p).await.unwrap_err().kind, ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_duplicate_create() {
        let (repo, _, _) = repo();
        let p = Payment::pending(Uuid::new_v4(), 1);
        repo.create(p.clone()).await.expect("create should succeed");
        let err = repo.create(p).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Duplicate);
        assert!(err.cause.is_some());
    }

    #[tokio::test]
    async fn test_update_advances_version_and_detects_staleness() {
        let (repo, _, _) = repo();
        let p = repo
            .create(Payment::pending(Uuid::new_v4(), 1))
            .await
            .expect("create should succeed");

        let mut a = p.clone();
        a.status = PaymentStatus::Paid;
        let updated = repo.update(a).await.expect("update should succeed");
        assert_eq!(updated.version, 2);

        let mut b = p.clone();
        b.amount_cents = 99;
        let err = repo.update(b).await.unwrap_err();
        assert!(err.is_conflict());

        let stored = repo.get_by_id(p.id).await.expect("get should succeed");
        assert_eq!(stored.status, PaymentStatus::Paid);
        assert_eq!(stored.amount_cents, 1);
    }

    #[tokio::test]
    async fn test_update_evicts_stale_read() {
        let (repo, _, _) = repo();
        let p = repo
            .create(Payment::pending(Uuid::new_v4(), 1))
            .await
            .expect("create should succeed");
        repo.get_by_id(p.id).await.expect("warm cache");

        let mut next = p.clone();
        next.status = PaymentStatus::Paid;
        repo.update(next).await.expect("update should succeed");

        let read = repo.get_by_id(p.id).await.expect("get should succeed");
        assert_eq!(read.status, PaymentStatus::Paid);
        assert_eq!(read.version, 2);
    }

    #[tokio::test]
    async fn test_exists_answer_does_not_survive_create() {
        let (repo, _, _) = repo();
        let p = Payment::pending(Uuid::new_v4(), 1);
        assert!(!repo.exists(p.id).await.expect("exists should succeed"));
        repo.create(p.clone()).await.expect("create should succeed");
        assert!(repo.exists(p.id).await.expect("exists should succeed"));
    }

    #[tokio::test]
    async fn test_find_and_count_follow_writes() {
        let (repo, _, _) = repo();
        let tenant = Uuid::new_v4();
        let filter = Filter::<Payment>::all().for_tenant(tenant);

        assert!(repo.find(&filter).await.expect("find should succeed").is_empty());
        assert_eq!(repo.count(&filter).await.expect("count should succeed"), 0);

        let p = repo
            .create(Payment::pending(tenant, 5))
            .await
            .expect("create should succeed");
        assert_eq!(repo.find(&filter).await.expect("find should succeed"), vec![p.clone()]);
        assert_eq!(repo.count(&filter).await.expect("count should succeed"), 1);

        repo.delete(p.id).await.expect("delete should succeed");
        assert!(repo.find(&filter).await.expect("find should succeed").is_empty());
        assert_eq!(repo.count(&filter).await.expect("count should succeed"), 0);
    }

    #[tokio::test]
    async fn test_find_one() {
        let (repo, _, _) = repo();
        let p = repo
            .create(Payment::pending(Uuid::new_v4(), 5).with_reference("INV-7"))
            .await
            .expect("create should succeed");

        let filter = Filter::<Payment>::all().eq(PaymentField::Reference, "INV-7");
        assert_eq!(repo.find_one(&filter).await.expect("find_one should succeed"), p);

        let missing = Filter::<Payment>::all().eq(PaymentField::Reference, "INV-8");
        assert!(repo.find_one(&missing).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_update_where_refuses_empty_filter() {
        let (repo, _, _) = repo();
        let patch = Patch::<Payment>::new().set(PaymentField::Status, "paid");
        let err = repo
            .update_where(&Filter::all(), &patch)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);

        let filter = Filter::<Payment>::all().for_tenant(Uuid::new_v4());
        let err = repo
            .update_where(&filter, &Patch::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_invalidate_all_clears_collection_keys() {
        let (repo, cache, _) = repo();
        let p = repo
            .create(Payment::pending(Uuid::new_v4(), 5))
            .await
            .expect("create should succeed");
        repo.get_by_id(p.id).await.expect("get should succeed");
        repo.count(&Filter::all()).await.expect("count should succeed");
        assert!(!cache.is_empty());

        repo.invalidate_all().await;
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_works_without_collaborators() {
        let repo = Repository::<Payment, _>::with_store(InMemoryStore::new());
        let p = repo
            .create(Payment::pending(Uuid::new_v4(), 5))
            .await
            .expect("create should succeed");
        assert_eq!(repo.get_by_id(p.id).await.expect("get should succeed"), p);
        repo.invalidate_cache(p.id).await;
        repo.invalidate_cache_pattern("anything*").await;
    }
}
