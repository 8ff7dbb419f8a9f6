//! Persistence port.
//!
//! A store holds one collection of entities of type `E` and answers
//! [`Predicate`] queries over it. Every mutating call reports rows affected so
//! the repository can tell "nothing matched" apart from success; optimistic
//! locking relies on [`PersistencePort::conditional_update`] returning 0 when
//! the version moved underneath it.

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tessera_core::{Entity, FieldMap, Predicate, Sort, StoreResult};

/// Future returned by a transaction body.
pub type TxFuture<'t, T> = BoxFuture<'t, StoreResult<T>>;

/// Operations available inside a store transaction.
///
/// Everything done through a `StoreTx` commits together when the body
/// returns `Ok`, and is discarded when it returns `Err`.
#[async_trait]
pub trait StoreTx<E: Entity>: Send {
    async fn insert(&mut self, entity: &E) -> StoreResult<()>;

    /// Insert `entities` in chunks of `chunk_size` rows.
    async fn insert_batch(&mut self, entities: &[E], chunk_size: usize) -> StoreResult<u64>;

    async fn find_one(&mut self, predicate: &Predicate) -> StoreResult<Option<E>>;

    async fn count(&mut self, predicate: &Predicate) -> StoreResult<i64>;

    async fn conditional_update(&mut self, predicate: &Predicate, entity: &E) -> StoreResult<u64>;

    async fn update_fields(&mut self, predicate: &Predicate, patch: &FieldMap) -> StoreResult<u64>;

    async fn delete(&mut self, predicate: &Predicate) -> StoreResult<u64>;
}

/// Relational-style store for one entity collection.
#[async_trait]
pub trait PersistencePort<E: Entity>: Send + Sync {
    /// Insert one row. A duplicate id (or other unique key) fails with
    /// `StoreError::UniqueViolation`.
    async fn insert(&self, entity: &E) -> StoreResult<()>;

    /// Insert all rows atomically, `chunk_size` rows per statement.
    async fn insert_batch(&self, entities: &[E], chunk_size: usize) -> StoreResult<u64>;

    /// First matching row in id order.
    async fn find_one(&self, predicate: &Predicate) -> StoreResult<Option<E>>;

    /// Matching rows, ordered, skipping `offset` and returning at most `limit`.
    async fn find_many(
        &self,
        predicate: &Predicate,
        sort: &Sort,
        offset: i64,
        limit: Option<i64>,
    ) -> StoreResult<Vec<E>>;

    async fn count(&self, predicate: &Predicate) -> StoreResult<i64>;

    /// Replace the matching row with `entity` as given (version included).
    ///
    /// Returns 0 when no row matches, which is how a stale version shows up.
    async fn conditional_update(&self, predicate: &Predicate, entity: &E) -> StoreResult<u64>;

    /// Assign `patch` to every matching row and bump each row's version by one.
    async fn update_fields(&self, predicate: &Predicate, patch: &FieldMap) -> StoreResult<u64>;

    /// Hard delete.
    async fn delete(&self, predicate: &Predicate) -> StoreResult<u64>;

    /// Stamp a deletion timestamp on matching rows.
    async fn soft_delete(&self, predicate: &Predicate) -> StoreResult<u64>;

    /// Clear the deletion timestamp on matching rows.
    async fn restore(&self, predicate: &Predicate) -> StoreResult<u64>;

    /// Run `f` inside one transaction.
    ///
    /// The body must only use the `StoreTx` it is handed; calling back into
    /// the store itself from inside the body may deadlock.
    async fn run_in_transaction<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: for<'t> FnOnce(&'t mut dyn StoreTx<E>) -> TxFuture<'t, T> + Send + 'static;
}
