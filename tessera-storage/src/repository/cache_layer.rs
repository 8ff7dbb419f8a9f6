//! Best-effort cache access for the repository.
//!
//! Wraps a [`CachePort`] so that every call is bounded by the cache deadline
//! and every failure is logged and swallowed: a failed read is a miss, a
//! failed write or eviction is skipped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tessera_core::{CacheError, CacheResult};

use crate::cache::{CachePort, CachePortExt};

pub(crate) struct CacheLayer {
    port: Arc<dyn CachePort>,
    ttl: Duration,
    timeout: Duration,
}

impl CacheLayer {
    pub(crate) fn new(port: Arc<dyn CachePort>, ttl: Duration, timeout: Duration) -> Self {
        Self { port, ttl, timeout }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.port.is_enabled()
    }

    async fn bounded<T>(&self, fut: impl Future<Output = CacheResult<T>>) -> CacheResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Cached value at `key`, or `None` on miss, failure or timeout.
    pub(crate) async fn read<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned + Send,
    {
        if !self.is_enabled() {
            return None;
        }
        match self.bounded(self.port.get_json::<T>(key)).await {
            Ok(Some(value)) => {
                tracing::debug!(key, "Cache hit");
                Some(value)
            }
            Ok(None) => {
                tracing::debug!(key, "Cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, key, "Cache read failed, treating as miss");
                None
            }
        }
    }

    pub(crate) async fn write<T>(&self, key: &str, value: &T)
    where
        T: Serialize + Sync,
    {
        if !self.is_enabled() {
            return;
        }
        if let Err(e) = self.bounded(self.port.set_json(key, value, self.ttl)).await {
            tracing::warn!(error = %e, key, "Cache write failed, skipping");
        }
    }

    pub(crate) async fn evict(&self, keys: &[String]) {
        if !self.is_enabled() || keys.is_empty() {
            return;
        }
        if let Err(e) = self.bounded(self.port.delete(keys)).await {
            tracing::warn!(error = %e, keys = ?keys, "Cache eviction failed");
        }
    }

    pub(crate) async fn evict_pattern(&self, pattern: &str) {
        if !self.is_enabled() {
            return;
        }
        match self.bounded(self.port.delete_pattern(pattern)).await {
            Ok(removed) => tracing::debug!(pattern, removed, "Cache pattern evicted"),
            Err(e) => tracing::warn!(error = %e, key = pattern, "Cache pattern eviction failed"),
        }
    }
}
