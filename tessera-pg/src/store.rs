//! PostgreSQL persistence backend.
//!
//! One JSONB document table per collection (see [`crate::sql`]). The `version`
//! and `deleted_at` columns carry the concurrency token and the soft-delete
//! mark; everything else lives in `data`.

use std::marker::PhantomData;

use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use serde_json::Value as JsonValue;
use tessera_core::{Entity, FieldMap, Predicate, Scope, Sort, StoreError, StoreResult};
use tessera_storage::{PersistencePort, StoreTx, TxFuture};
use tokio_postgres::error::SqlState;
use tokio_postgres::{GenericClient, Row};

use crate::sql::{Statement, TableSql};

// ============================================================================
// ERROR AND ROW MAPPING
// ============================================================================

fn pg_error(table: &str, e: tokio_postgres::Error) -> StoreError {
    if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        return StoreError::UniqueViolation {
            collection: table.to_string(),
            reason: e.to_string(),
        };
    }
    StoreError::backend(e)
}

fn encode<E: Entity>(entity: &E) -> StoreResult<JsonValue> {
    serde_json::to_value(entity).map_err(StoreError::serialization)
}

fn decode<E: Entity>(row: &Row) -> StoreResult<E> {
    let data: JsonValue = row.try_get(0).map_err(StoreError::backend)?;
    serde_json::from_value(data).map_err(StoreError::serialization)
}

// ============================================================================
// STATEMENT EXECUTION
// ============================================================================

async fn execute<C>(client: &C, table: &str, stmt: &Statement) -> StoreResult<u64>
where
    C: GenericClient + Sync,
{
    tracing::debug!(table, sql = %stmt.sql, "Executing statement");
    client
        .execute(stmt.sql.as_str(), &stmt.params())
        .await
        .map_err(|e| pg_error(table, e))
}

async fn query<C>(client: &C, table: &str, stmt: &Statement) -> StoreResult<Vec<Row>>
where
    C: GenericClient + Sync,
{
    tracing::debug!(table, sql = %stmt.sql, "Executing query");
    client
        .query(stmt.sql.as_str(), &stmt.params())
        .await
        .map_err(|e| pg_error(table, e))
}

async fn insert_all<E, C>(
    client: &C,
    sql: &TableSql,
    entities: &[E],
    chunk_size: usize,
) -> StoreResult<u64>
where
    E: Entity,
    C: GenericClient + Sync,
{
    let mut inserted = 0u64;
    for chunk in entities.chunks(chunk_size.max(1)) {
        let rows = chunk
            .iter()
            .map(|e| -> StoreResult<_> { Ok((e.id(), e.version(), encode(e)?)) })
            .collect::<StoreResult<Vec<_>>>()?;
        inserted += execute(client, sql.table(), &sql.insert(&rows)).await?;
    }
    Ok(inserted)
}

async fn find_one<E, C>(client: &C, sql: &TableSql, predicate: &Predicate) -> StoreResult<Option<E>>
where
    E: Entity,
    C: GenericClient + Sync,
{
    let rows = query(client, sql.table(), &sql.select_one(predicate)).await?;
    rows.first().map(decode::<E>).transpose()
}

async fn count<C>(client: &C, sql: &TableSql, predicate: &Predicate) -> StoreResult<i64>
where
    C: GenericClient + Sync,
{
    let rows = query(client, sql.table(), &sql.count(predicate)).await?;
    match rows.first() {
        Some(row) => row.try_get(0).map_err(StoreError::backend),
        None => Ok(0),
    }
}

async fn conditional_update<E, C>(
    client: &C,
    sql: &TableSql,
    predicate: &Predicate,
    entity: &E,
) -> StoreResult<u64>
where
    E: Entity,
    C: GenericClient + Sync,
{
    let stmt = sql.conditional_update(predicate, entity.version(), encode(entity)?);
    execute(client, sql.table(), &stmt).await
}

async fn update_fields<C>(
    client: &C,
    sql: &TableSql,
    predicate: &Predicate,
    patch: &FieldMap,
) -> StoreResult<u64>
where
    C: GenericClient + Sync,
{
    let patch = JsonValue::Object(patch.clone().into_iter().collect());
    execute(client, sql.table(), &sql.update_fields(predicate, patch)).await
}

// ============================================================================
// STORE
// ============================================================================

/// PostgreSQL-backed store for one collection.
pub struct PgStore<E> {
    pool: Pool,
    sql: TableSql,
    unique_fields: Vec<String>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for PgStore<E> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            sql: self.sql.clone(),
            unique_fields: self.unique_fields.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> PgStore<E> {
    /// Store over `E::collection()`. Fails if the name is not a valid table name.
    pub fn new(pool: Pool) -> StoreResult<Self> {
        Ok(Self {
            pool,
            sql: TableSql::new(&E::collection())?,
            unique_fields: Vec::new(),
            _entity: PhantomData,
        })
    }

    /// Also enforce uniqueness of these document fields (applied by [`ensure_schema`]).
    ///
    /// [`ensure_schema`]: PgStore::ensure_schema
    pub fn with_unique_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn table(&self) -> &str {
        self.sql.table()
    }

    /// Create the table and unique indexes if missing.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        let conn = self.conn().await?;
        let client: &tokio_postgres::Client = &conn;
        client
            .batch_execute(&self.sql.create_table())
            .await
            .map_err(|e| pg_error(self.table(), e))?;
        for field in &self.unique_fields {
            client
                .batch_execute(&self.sql.unique_index(field)?)
                .await
                .map_err(|e| pg_error(self.table(), e))?;
        }
        tracing::info!(table = self.table(), "Schema ensured");
        Ok(())
    }

    async fn conn(&self) -> StoreResult<Object> {
        self.pool.get().await.map_err(|e| {
            tracing::error!(table = self.table(), error = %e, "Failed to get connection");
            StoreError::backend(e)
        })
    }
}

#[async_trait]
impl<E: Entity> PersistencePort<E> for PgStore<E> {
    async fn insert(&self, entity: &E) -> StoreResult<()> {
        let conn = self.conn().await?;
        let client: &tokio_postgres::Client = &conn;
        insert_all(client, &self.sql, std::slice::from_ref(entity), 1).await?;
        Ok(())
    }

    async fn insert_batch(&self, entities: &[E], chunk_size: usize) -> StoreResult<u64> {
        let mut conn = self.conn().await?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| pg_error(self.table(), e))?;
        let client: &tokio_postgres::Transaction<'_> = &tx;
        let inserted = insert_all(client, &self.sql, entities, chunk_size).await?;
        tx.commit().await.map_err(|e| pg_error(self.table(), e))?;
        Ok(inserted)
    }

    async fn find_one(&self, predicate: &Predicate) -> StoreResult<Option<E>> {
        let conn = self.conn().await?;
        find_one(&**conn, &self.sql, predicate).await
    }

    async fn find_many(
        &self,
        predicate: &Predicate,
        sort: &Sort,
        offset: i64,
        limit: Option<i64>,
    ) -> StoreResult<Vec<E>> {
        let conn = self.conn().await?;
        let stmt = self.sql.select(predicate, sort, offset, limit);
        let rows = query(&**conn, self.table(), &stmt).await?;
        rows.iter().map(decode::<E>).collect()
    }

    async fn count(&self, predicate: &Predicate) -> StoreResult<i64> {
        let conn = self.conn().await?;
        count(&**conn, &self.sql, predicate).await
    }

    async fn conditional_update(&self, predicate: &Predicate, entity: &E) -> StoreResult<u64> {
        let conn = self.conn().await?;
        conditional_update(&**conn, &self.sql, predicate, entity).await
    }

    async fn update_fields(&self, predicate: &Predicate, patch: &FieldMap) -> StoreResult<u64> {
        let conn = self.conn().await?;
        update_fields(&**conn, &self.sql, predicate, patch).await
    }

    async fn delete(&self, predicate: &Predicate) -> StoreResult<u64> {
        let conn = self.conn().await?;
        execute(&**conn, self.table(), &self.sql.delete(predicate)).await
    }

    async fn soft_delete(&self, predicate: &Predicate) -> StoreResult<u64> {
        let conn = self.conn().await?;
        let scoped = predicate.clone().with_scope(Scope::Active);
        execute(&**conn, self.table(), &self.sql.set_deleted(&scoped, true)).await
    }

    async fn restore(&self, predicate: &Predicate) -> StoreResult<u64> {
        let conn = self.conn().await?;
        let scoped = predicate.clone().with_scope(Scope::OnlyDeleted);
        execute(&**conn, self.table(), &self.sql.set_deleted(&scoped, false)).await
    }

    async fn run_in_transaction<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: for<'t> FnOnce(&'t mut dyn StoreTx<E>) -> TxFuture<'t, T> + Send + 'static,
    {
        let mut conn = self.conn().await?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| pg_error(self.table(), e))?;

        let mut handle = PgTx {
            tx,
            sql: &self.sql,
            _entity: PhantomData,
        };
        let result = {
            let dyn_handle: &mut dyn StoreTx<E> = &mut handle;
            f(dyn_handle).await
        };

        match result {
            Ok(value) => {
                handle
                    .tx
                    .commit()
                    .await
                    .map_err(|e| StoreError::Transaction {
                        reason: e.to_string(),
                    })?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = handle.tx.rollback().await {
                    tracing::warn!(table = self.table(), error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }
}

// ============================================================================
// TRANSACTION HANDLE
// ============================================================================

struct PgTx<'a, E> {
    tx: deadpool_postgres::Transaction<'a>,
    sql: &'a TableSql,
    _entity: PhantomData<fn() -> E>,
}

impl<'a, E> PgTx<'a, E> {
    fn client(&self) -> &tokio_postgres::Transaction<'a> {
        &self.tx
    }
}

#[async_trait]
impl<'a, E: Entity> StoreTx<E> for PgTx<'a, E> {
    async fn insert(&mut self, entity: &E) -> StoreResult<()> {
        insert_all(self.client(), self.sql, std::slice::from_ref(entity), 1).await?;
        Ok(())
    }

    async fn insert_batch(&mut self, entities: &[E], chunk_size: usize) -> StoreResult<u64> {
        insert_all(self.client(), self.sql, entities, chunk_size).await
    }

    async fn find_one(&mut self, predicate: &Predicate) -> StoreResult<Option<E>> {
        find_one(self.client(), self.sql, predicate).await
    }

    async fn count(&mut self, predicate: &Predicate) -> StoreResult<i64> {
        count(self.client(), self.sql, predicate).await
    }

    async fn conditional_update(&mut self, predicate: &Predicate, entity: &E) -> StoreResult<u64> {
        conditional_update(self.client(), self.sql, predicate, entity).await
    }

    async fn update_fields(&mut self, predicate: &Predicate, patch: &FieldMap) -> StoreResult<u64> {
        update_fields(self.client(), self.sql, predicate, patch).await
    }

    async fn delete(&mut self, predicate: &Predicate) -> StoreResult<u64> {
        execute(self.client(), self.sql.table(), &self.sql.delete(predicate)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PgConfig;
    use tessera_test_utils::{Invoice, Payment};

    #[tokio::test]
    async fn test_table_follows_collection_name() {
        let pool = PgConfig::default()
            .create_pool()
            .expect("pool creation should not connect");

        let payments = PgStore::<Payment>::new(pool.clone()).expect("valid table");
        assert_eq!(payments.table(), "payments");

        let invoices = PgStore::<Invoice>::new(pool)
            .expect("valid table")
            .with_unique_fields(["number"]);
        assert_eq!(invoices.table(), "billing_invoices");
        assert_eq!(invoices.unique_fields, vec!["number".to_string()]);
    }

    #[test]
    fn test_patch_encodes_as_object() {
        let mut patch = FieldMap::new();
        patch.insert("status".into(), serde_json::json!("paid"));
        let stmt = TableSql::new("payments")
            .expect("valid table")
            .update_fields(&Predicate::all(), JsonValue::Object(patch.into_iter().collect()));
        assert_eq!(
            stmt.params[0],
            crate::sql::SqlParam::Json(serde_json::json!({ "status": "paid" }))
        );
    }
}
