//! Property tests for the repository engine over the in-memory backends.

use std::sync::Arc;

use proptest::prelude::*;
use tessera_core::{CacheOp, Filter, FilterSet, RepositoryConfig};
use tessera_storage::{InMemoryCache, InMemoryStore, Repository, RepositoryDeps};
use tessera_test_utils::*;
use tokio::runtime::Runtime;

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

fn fail(e: RepoError) -> TestCaseError {
    TestCaseError::fail(format!("repository call failed: {}", e))
}

struct Fixture {
    repo: Repository<Payment, InMemoryStore<Payment>>,
    cache: Arc<InMemoryCache>,
    metrics: Arc<RecordingMetrics>,
}

fn fixture() -> Fixture {
    let cache = Arc::new(InMemoryCache::new());
    let metrics = Arc::new(RecordingMetrics::new());
    let repo = Repository::new(
        InMemoryStore::new(),
        RepositoryDeps::new()
            .with_cache(cache.clone())
            .with_metrics(metrics.clone()),
        RepositoryConfig::default(),
    );
    Fixture {
        repo,
        cache,
        metrics,
    }
}

fn filter_set(entries: &[(String, FilterValue)]) -> FilterSet {
    let mut set = FilterSet::new();
    for (field, value) in entries {
        set.insert(field.clone(), value.clone());
    }
    set
}

/// Distinct filter entries paired with a shuffled copy of themselves.
fn shuffled_entries(
) -> impl Strategy<Value = (Vec<(String, FilterValue)>, Vec<(String, FilterValue)>)> {
    generators::arb_filter_entries()
        .prop_flat_map(|entries| (Just(entries.clone()), Just(entries).prop_shuffle()))
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// A created entity reads back unchanged, first from the store, then from the cache.
    #[test]
    fn prop_create_then_get_roundtrip(
        payment in generators::arb_payment(fixtures::tenant_default()),
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let f = fixture();
            let created = f.repo.create(payment.clone()).await.map_err(fail)?;
            prop_assert_eq!(&created, &payment);

            let first = f.repo.get_by_id(payment.id).await.map_err(fail)?;
            let second = f.repo.get_by_id(payment.id).await.map_err(fail)?;
            prop_assert_eq!(&first, &payment);
            prop_assert_eq!(&second, &payment);
            prop_assert_eq!(f.metrics.misses(), 1);
            prop_assert_eq!(f.metrics.hits(), 1);
            Ok(())
        })?;
    }

    /// The order filter pairs are added in never changes the derived key.
    #[test]
    fn prop_cache_key_ignores_filter_order(
        (entries, shuffled) in shuffled_entries(),
        request in generators::arb_page_request(),
    ) {
        let f = fixture();
        let keys = f.repo.keys();
        let a = filter_set(&entries);
        let b = filter_set(&shuffled);

        prop_assert_eq!(keys.key(CacheOp::List, &a), keys.key(CacheOp::List, &b));
        prop_assert_eq!(keys.key(CacheOp::Count, &a), keys.key(CacheOp::Count, &b));
        prop_assert_eq!(keys.page_key(&a, request), keys.page_key(&b, request.normalized()));
    }

    /// A status filter returns exactly the rows carrying that status, and count agrees.
    #[test]
    fn prop_find_by_status_matches_rows(
        payments in proptest::collection::vec(
            generators::arb_payment(fixtures::tenant_default()),
            0..12,
        ),
        status in generators::arb_payment_status(),
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let f = fixture();
            for payment in &payments {
                f.repo.create(payment.clone()).await.map_err(fail)?;
            }

            let expected = payments.iter().filter(|p| p.status == status).count();
            let filter = Filter::<Payment>::all().eq(PaymentField::Status, status);
            let found = f.repo.find(&filter).await.map_err(fail)?;
            prop_assert_eq!(found.len(), expected);
            prop_assert!(found.iter().all(|p| p.status == status));
            prop_assert_eq!(f.repo.count(&filter).await.map_err(fail)?, expected as i64);
            Ok(())
        })?;
    }

    /// Any request, in range or not, yields a normalized page that is cached under its key.
    #[test]
    fn prop_pagination_bundle_is_cached(
        request in generators::arb_page_request(),
        total in 0usize..30,
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let f = fixture();
            let tenant = fixtures::tenant_default();
            f.repo
                .create_batch(fixtures::payments(tenant, total))
                .await
                .map_err(fail)?;

            let filter = Filter::<Payment>::all().for_tenant(tenant);
            let page = f
                .repo
                .find_with_pagination(&filter, request)
                .await
                .map_err(fail)?;
            let normalized = request.normalized();

            prop_assert_eq!(page.pagination.page, normalized.page);
            prop_assert_eq!(page.pagination.page_size, normalized.page_size);
            prop_assert_eq!(page.pagination.total_items, total as i64);
            let expected_len = (total as i64 - request.offset()).clamp(0, normalized.page_size);
            prop_assert_eq!(page.items.len() as i64, expected_len);

            let key = f.repo.keys().page_key(filter.as_set(), request);
            prop_assert!(f.cache.keys().contains(&key));
            Ok(())
        })?;
    }
}
