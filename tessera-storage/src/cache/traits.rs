//! Cache port and statistics.
//!
//! The port moves raw bytes; JSON encoding lives in [`CachePortExt`] so the
//! port itself stays object-safe and backends never see entity types.

use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tessera_core::{CacheError, CacheResult};

/// Key-value cache with TTL, pattern deletion and existence checks.
///
/// Implementations must be safe for concurrent use. None of these calls is
/// allowed to be the source of truth for anything: a backend may drop any
/// entry at any time.
#[async_trait]
pub trait CachePort: Send + Sync {
    /// Read a value. `None` on miss or expiry.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Write a value that expires after `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()>;

    /// Delete keys; returns how many existed.
    async fn delete(&self, keys: &[String]) -> CacheResult<u64>;

    /// Delete every key matching a glob with a trailing `*`.
    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64>;

    /// Count how many of `keys` are present and unexpired.
    async fn exists(&self, keys: &[String]) -> CacheResult<u64>;

    /// Whether this cache stores anything at all.
    fn is_enabled(&self) -> bool {
        true
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        Ok(CacheStats::default())
    }
}

/// JSON helpers over any [`CachePort`].
#[async_trait]
pub trait CachePortExt: CachePort {
    async fn get_json<T>(&self, key: &str) -> CacheResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(key).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| CacheError::Serialization {
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    async fn set_json<T>(&self, key: &str, value: &T, ttl: Duration) -> CacheResult<()>
    where
        T: Serialize + Sync,
    {
        let bytes = serde_json::to_vec(value).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        self.set(key, bytes, ttl).await
    }
}

impl<C: CachePort + ?Sized> CachePortExt for C {}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries currently stored (expired-but-unswept entries included).
    pub entry_count: u64,
    /// Entries dropped by TTL.
    pub expirations: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
