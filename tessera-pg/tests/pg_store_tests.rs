//! PgStore against a live database.
//!
//! Run with `--features db-tests` and `TESSERA_DB_*` pointing at a scratch
//! database.

#![cfg(feature = "db-tests")]

use futures_util::FutureExt;
use tessera_core::{ErrorKind, Filter, PageRequest, Patch, RepositoryConfig};
use tessera_pg::{PgConfig, PgStore};
use tessera_storage::{PersistencePort, Repository, RepositoryDeps};
use tessera_test_utils::assertions::assert_kind;
use tessera_test_utils::*;
use uuid::Uuid;

async fn store() -> PgStore<Payment> {
    let pool = PgConfig::from_env()
        .create_pool()
        .expect("pool should be created");
    let store = PgStore::<Payment>::new(pool)
        .expect("payments is a valid table")
        .with_unique_fields(["reference"]);
    store.ensure_schema().await.expect("schema should be created");
    store
}

#[tokio::test]
async fn test_repository_roundtrip_on_postgres() {
    let repo = Repository::new(
        store().await,
        RepositoryDeps::default(),
        RepositoryConfig::default(),
    );
    let tenant = Uuid::new_v4();

    let p = repo
        .create(Payment::pending(tenant, 700).with_reference(format!("PG-{}", Uuid::new_v4())))
        .await
        .expect("create should succeed");
    assert_eq!(repo.get_by_id(p.id).await.expect("get should succeed"), p);
    assert_kind(&repo.create(p.clone()).await, ErrorKind::Duplicate);

    let saved = repo
        .update(p.clone().with_status(PaymentStatus::Paid))
        .await
        .expect("update should succeed");
    assert_eq!(saved.version, 2);
    assert_kind(&repo.update(p.clone()).await, ErrorKind::Conflict);

    let filter = Filter::<Payment>::all()
        .for_tenant(tenant)
        .eq(PaymentField::Status, PaymentStatus::Paid);
    assert_eq!(repo.count(&filter).await.expect("count"), 1);

    repo.soft_delete(p.id).await.expect("soft delete should succeed");
    assert_kind(&repo.get_by_id(p.id).await, ErrorKind::NotFound);
    repo.restore(p.id).await.expect("restore should succeed");
    repo.delete(p.id).await.expect("delete should succeed");
}

#[tokio::test]
async fn test_batch_pagination_and_bulk_update_on_postgres() {
    let repo = Repository::new(
        store().await,
        RepositoryDeps::default(),
        RepositoryConfig::default().with_batch_chunk_size(7),
    );
    let tenant = Uuid::new_v4();

    let inserted = repo
        .create_batch(fixtures::payments(tenant, 23))
        .await
        .expect("batch should succeed");
    assert_eq!(inserted, 23);

    let filter = Filter::<Payment>::all().for_tenant(tenant);
    let page = repo
        .find_with_pagination(&filter, PageRequest::new(3, 10))
        .await
        .expect("page should load");
    assert_eq!(page.items.len(), 3);
    assert_eq!(page.pagination.total_pages, 3);

    let rows = repo
        .update_where(
            &filter,
            &Patch::<Payment>::new().set(PaymentField::Status, PaymentStatus::Refunded),
        )
        .await
        .expect("bulk update should succeed");
    assert_eq!(rows, 23);
    let refunded = repo.find(&filter).await.expect("find should succeed");
    assert!(refunded
        .iter()
        .all(|p| p.status == PaymentStatus::Refunded && p.version == 2));
}

#[tokio::test]
async fn test_transaction_rolls_back_on_error() {
    let store = store().await;
    let tenant = Uuid::new_v4();
    let a = Payment::pending(tenant, 1);
    let id = a.id;

    let result: tessera_core::StoreResult<()> = store
        .run_in_transaction(move |tx| {
            async move {
                tx.insert(&a).await?;
                Err(tessera_core::StoreError::backend("abort"))
            }
            .boxed()
        })
        .await;
    assert!(result.is_err());
    assert!(store
        .find_one(&tessera_core::Predicate::by_id(id))
        .await
        .expect("find should succeed")
        .is_none());
}
