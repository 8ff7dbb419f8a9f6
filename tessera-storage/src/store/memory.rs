//! In-memory persistence backend.
//!
//! Rows live in a `BTreeMap` keyed by id behind a `tokio::sync::RwLock`.
//! Transactions take the write lock for their whole body and work on a
//! copy of the table, which replaces the original only on success.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use tessera_core::{
    Direction, Entity, EntityId, FieldMap, Predicate, Scope, Sort, SortKey, StoreError,
    StoreResult, Timestamp,
};
use tokio::sync::RwLock;

use super::traits::{PersistencePort, StoreTx, TxFuture};

#[derive(Debug, Clone)]
struct Row<E> {
    entity: E,
    fields: FieldMap,
    deleted_at: Option<Timestamp>,
}

impl<E: Entity> Row<E> {
    fn new(entity: E) -> Self {
        let fields = entity.field_map();
        Self {
            entity,
            fields,
            deleted_at: None,
        }
    }

    fn admits(&self, predicate: &Predicate) -> bool {
        predicate.matches(
            self.entity.id(),
            self.entity.version(),
            &self.fields,
            self.deleted_at.is_some(),
        )
    }
}

#[derive(Debug, Clone)]
struct Table<E> {
    collection: String,
    unique_fields: Vec<String>,
    rows: BTreeMap<EntityId, Row<E>>,
}

impl<E: Entity> Table<E> {
    fn unique_violation(&self, reason: String) -> StoreError {
        StoreError::UniqueViolation {
            collection: self.collection.clone(),
            reason,
        }
    }

    fn check_unique(&self, candidate: &Row<E>) -> StoreResult<()> {
        let id = candidate.entity.id();
        if self.rows.contains_key(&id) {
            return Err(self.unique_violation(format!("id {id} already exists")));
        }
        for field in &self.unique_fields {
            let Some(value) = candidate.fields.get(field).filter(|v| !v.is_null()) else {
                continue;
            };
            if self.rows.values().any(|row| row.fields.get(field) == Some(value)) {
                return Err(self.unique_violation(format!("{field}={value} already exists")));
            }
        }
        Ok(())
    }

    fn insert(&mut self, entity: &E) -> StoreResult<()> {
        let row = Row::new(entity.clone());
        self.check_unique(&row)?;
        self.rows.insert(entity.id(), row);
        Ok(())
    }

    fn select<'a>(&'a self, predicate: &'a Predicate) -> impl Iterator<Item = &'a Row<E>> + 'a {
        let candidates: Box<dyn Iterator<Item = &'a Row<E>> + 'a> = match predicate.id {
            Some(id) => Box::new(self.rows.get(&id).into_iter()),
            None => Box::new(self.rows.values()),
        };
        candidates.filter(move |row| row.admits(predicate))
    }

    fn matching_ids(&self, predicate: &Predicate) -> Vec<EntityId> {
        self.select(predicate).map(|row| row.entity.id()).collect()
    }

    fn find_one(&self, predicate: &Predicate) -> Option<E> {
        self.select(predicate).next().map(|row| row.entity.clone())
    }

    fn find_many(&self, predicate: &Predicate, sort: &Sort, offset: i64, limit: Option<i64>) -> Vec<E> {
        let mut rows: Vec<&Row<E>> = self.select(predicate).collect();
        if let SortKey::Field(field) = &sort.key {
            rows.sort_by(|a, b| {
                compare_json(a.fields.get(field), b.fields.get(field))
                    .then_with(|| a.entity.id().cmp(&b.entity.id()))
            });
        }
        if sort.direction == Direction::Desc {
            rows.reverse();
        }

        let offset = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
        let limit = limit
            .map(|l| usize::try_from(l.max(0)).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        rows.into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| row.entity.clone())
            .collect()
    }

    fn count(&self, predicate: &Predicate) -> i64 {
        self.select(predicate).count() as i64
    }

    fn conditional_update(&mut self, predicate: &Predicate, entity: &E) -> u64 {
        let id = entity.id();
        let matched = self.rows.get(&id).is_some_and(|row| row.admits(predicate));
        if !matched {
            return 0;
        }
        if let Some(row) = self.rows.get_mut(&id) {
            row.fields = entity.field_map();
            row.entity = entity.clone();
        }
        1
    }

    fn update_fields(&mut self, predicate: &Predicate, patch: &FieldMap) -> StoreResult<u64> {
        let ids = self.matching_ids(predicate);

        // Build every new row first so a bad patch leaves the table untouched.
        let mut updated = Vec::with_capacity(ids.len());
        for id in &ids {
            let Some(row) = self.rows.get(id) else { continue };
            let mut doc = serde_json::to_value(&row.entity).map_err(StoreError::serialization)?;
            let JsonValue::Object(map) = &mut doc else {
                return Err(StoreError::serialization("entity is not a JSON object"));
            };
            for (field, value) in patch {
                map.insert(field.clone(), value.clone());
            }
            let mut entity: E = serde_json::from_value(doc).map_err(StoreError::serialization)?;
            entity.set_version(row.entity.version() + 1);
            updated.push((*id, entity));
        }

        let count = updated.len() as u64;
        for (id, entity) in updated {
            if let Some(row) = self.rows.get_mut(&id) {
                row.fields = entity.field_map();
                row.entity = entity;
            }
        }
        Ok(count)
    }

    fn delete(&mut self, predicate: &Predicate) -> u64 {
        let ids = self.matching_ids(predicate);
        ids.iter().filter(|id| self.rows.remove(id).is_some()).count() as u64
    }

    fn set_deleted(&mut self, predicate: &Predicate, deleted_at: Option<Timestamp>) -> u64 {
        let ids = self.matching_ids(predicate);
        for id in &ids {
            if let Some(row) = self.rows.get_mut(id) {
                row.deleted_at = deleted_at;
            }
        }
        ids.len() as u64
    }
}

/// Order two optional JSON scalars: missing/null first, then by type-aware value.
fn compare_json(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(JsonValue::Number(x)), Some(JsonValue::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(JsonValue::String(x)), Some(JsonValue::String(y))) => x.cmp(y),
        (Some(JsonValue::Bool(x)), Some(JsonValue::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Thread-safe in-memory store for one collection.
pub struct InMemoryStore<E> {
    table: Arc<RwLock<Table<E>>>,
}

impl<E> Clone for InMemoryStore<E> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}

impl<E: Entity> Default for InMemoryStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> InMemoryStore<E> {
    /// Empty store for `E::collection()`, unique on id only.
    pub fn new() -> Self {
        Self::with_unique_fields(std::iter::empty::<String>())
    }

    /// Empty store that also rejects duplicate values of `fields` on insert.
    pub fn with_unique_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table: Arc::new(RwLock::new(Table {
                collection: E::collection(),
                unique_fields: fields.into_iter().map(Into::into).collect(),
                rows: BTreeMap::new(),
            })),
        }
    }

    /// Number of stored rows, soft-deleted ones included.
    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Raw row lookup ignoring soft-delete scope.
    pub async fn get_raw(&self, id: EntityId) -> Option<E> {
        self.table
            .read()
            .await
            .rows
            .get(&id)
            .map(|row| row.entity.clone())
    }

    /// Deletion timestamp of a row, if it exists and is soft-deleted.
    pub async fn deleted_at(&self, id: EntityId) -> Option<Timestamp> {
        self.table.read().await.rows.get(&id).and_then(|row| row.deleted_at)
    }
}

fn insert_chunked<E: Entity>(table: &mut Table<E>, entities: &[E], chunk_size: usize) -> StoreResult<u64> {
    let mut inserted = 0u64;
    for chunk in entities.chunks(chunk_size.max(1)) {
        for entity in chunk {
            table.insert(entity)?;
            inserted += 1;
        }
    }
    Ok(inserted)
}

#[async_trait]
impl<E: Entity> PersistencePort<E> for InMemoryStore<E> {
    async fn insert(&self, entity: &E) -> StoreResult<()> {
        self.table.write().await.insert(entity)
    }

    async fn insert_batch(&self, entities: &[E], chunk_size: usize) -> StoreResult<u64> {
        let mut table = self.table.write().await;
        let mut working = table.clone();
        let inserted = insert_chunked(&mut working, entities, chunk_size)?;
        *table = working;
        Ok(inserted)
    }

    async fn find_one(&self, predicate: &Predicate) -> StoreResult<Option<E>> {
        Ok(self.table.read().await.find_one(predicate))
    }

    async fn find_many(
        &self,
        predicate: &Predicate,
        sort: &Sort,
        offset: i64,
        limit: Option<i64>,
    ) -> StoreResult<Vec<E>> {
        Ok(self.table.read().await.find_many(predicate, sort, offset, limit))
    }

    async fn count(&self, predicate: &Predicate) -> StoreResult<i64> {
        Ok(self.table.read().await.count(predicate))
    }

    async fn conditional_update(&self, predicate: &Predicate, entity: &E) -> StoreResult<u64> {
        Ok(self.table.write().await.conditional_update(predicate, entity))
    }

    async fn update_fields(&self, predicate: &Predicate, patch: &FieldMap) -> StoreResult<u64> {
        self.table.write().await.update_fields(predicate, patch)
    }

    async fn delete(&self, predicate: &Predicate) -> StoreResult<u64> {
        Ok(self.table.write().await.delete(predicate))
    }

    async fn soft_delete(&self, predicate: &Predicate) -> StoreResult<u64> {
        let scoped = predicate.clone().with_scope(Scope::Active);
        Ok(self.table.write().await.set_deleted(&scoped, Some(Utc::now())))
    }

    async fn restore(&self, predicate: &Predicate) -> StoreResult<u64> {
        let scoped = predicate.clone().with_scope(Scope::OnlyDeleted);
        Ok(self.table.write().await.set_deleted(&scoped, None))
    }

    async fn run_in_transaction<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: for<'t> FnOnce(&'t mut dyn StoreTx<E>) -> TxFuture<'t, T> + Send + 'static,
    {
        let mut table = self.table.write().await;
        let mut working = table.clone();
        let result = {
            let mut tx = MemoryTx {
                table: &mut working,
            };
            let handle: &mut dyn StoreTx<E> = &mut tx;
            f(handle).await
        };
        if result.is_ok() {
            *table = working;
        }
        result
    }
}

/// Transaction handle over a working copy of the table.
struct MemoryTx<'a, E> {
    table: &'a mut Table<E>,
}

#[async_trait]
impl<'a, E: Entity> StoreTx<E> for MemoryTx<'a, E> {
    async fn insert(&mut self, entity: &E) -> StoreResult<()> {
        self.table.insert(entity)
    }

    async fn insert_batch(&mut self, entities: &[E], chunk_size: usize) -> StoreResult<u64> {
        insert_chunked(self.table, entities, chunk_size)
    }

    async fn find_one(&mut self, predicate: &Predicate) -> StoreResult<Option<E>> {
        Ok(self.table.find_one(predicate))
    }

    async fn count(&mut self, predicate: &Predicate) -> StoreResult<i64> {
        Ok(self.table.count(predicate))
    }

    async fn conditional_update(&mut self, predicate: &Predicate, entity: &E) -> StoreResult<u64> {
        Ok(self.table.conditional_update(predicate, entity))
    }

    async fn update_fields(&mut self, predicate: &Predicate, patch: &FieldMap) -> StoreResult<u64> {
        self.table.update_fields(predicate, patch)
    }

    async fn delete(&mut self, predicate: &Predicate) -> StoreResult<u64> {
        Ok(self.table.delete(predicate))
    }
}
