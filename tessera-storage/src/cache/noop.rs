//! Cache that stores nothing.

use std::time::Duration;

use async_trait::async_trait;
use tessera_core::CacheResult;

use super::traits::CachePort;

/// Stand-in used when a repository is built without a cache.
///
/// Every read misses and every write is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

#[async_trait]
impl CachePort for NoopCache {
    async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> CacheResult<()> {
        Ok(())
    }

    async fn delete(&self, _keys: &[String]) -> CacheResult<u64> {
        Ok(0)
    }

    async fn delete_pattern(&self, _pattern: &str) -> CacheResult<u64> {
        Ok(0)
    }

    async fn exists(&self, _keys: &[String]) -> CacheResult<u64> {
        Ok(0)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}
