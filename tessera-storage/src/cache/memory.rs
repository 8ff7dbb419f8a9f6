//! In-process TTL cache.
//!
//! Expiry is lazy: an expired entry is dropped the next time it is read or
//! counted, or by an explicit [`InMemoryCache::purge_expired`]. Time comes from
//! `tokio::time`, so tests can drive expiry with a paused clock.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tessera_core::{CacheError, CacheResult};
use tokio::time::Instant;

use super::pattern::KeyPattern;
use super::traits::{CachePort, CacheStats};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Thread-safe in-memory cache.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    stats: Arc<RwLock<CacheStats>>,
}

fn poisoned() -> CacheError {
    CacheError::Backend {
        reason: "cache lock poisoned".to_string(),
    }
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> CacheResult<u64> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        let removed = (before - entries.len()) as u64;
        drop(entries);

        if let Ok(mut stats) = self.stats.write() {
            stats.expirations += removed;
        }
        Ok(removed)
    }

    /// Number of stored entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored key, sorted. Intended for tests and debugging.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    fn record(&self, hit: bool) {
        if let Ok(mut stats) = self.stats.write() {
            if hit {
                stats.hits += 1;
            } else {
                stats.misses += 1;
            }
        }
    }
}

#[async_trait]
impl CachePort for InMemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let found = {
            let entries = self.entries.read().map_err(|_| poisoned())?;
            entries.get(key).cloned()
        };

        match found {
            Some(entry) if entry.is_live(now) => {
                self.record(true);
                Ok(Some(entry.value))
            }
            Some(_) => {
                let mut entries = self.entries.write().map_err(|_| poisoned())?;
                // Re-check: a concurrent set may have refreshed the entry.
                if entries.get(key).is_some_and(|e| !e.is_live(now)) {
                    entries.remove(key);
                    if let Ok(mut stats) = self.stats.write() {
                        stats.expirations += 1;
                    }
                }
                drop(entries);
                self.record(false);
                Ok(None)
            }
            None => {
                self.record(false);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        Ok(keys.iter().filter(|k| entries.remove(k.as_str()).is_some()).count() as u64)
    }

    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64> {
        let pattern = KeyPattern::parse(pattern)?;
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let before = entries.len();
        entries.retain(|key, _| !pattern.matches(key));
        Ok((before - entries.len()) as u64)
    }

    async fn exists(&self, keys: &[String]) -> CacheResult<u64> {
        let now = Instant::now();
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(keys
            .iter()
            .filter(|k| entries.get(k.as_str()).is_some_and(|e| e.is_live(now)))
            .count() as u64)
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        let mut stats = self.stats.read().map_err(|_| poisoned())?.clone();
        stats.entry_count = self.len() as u64;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePortExt;

    const TTL: Duration = Duration::from_secs(60);

    fn keys(ks: &[&str]) -> Vec<String> {
        ks.iter().map(|k| k.to_string()).collect()
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = InMemoryCache::new();
        cache
            .set("repo:a:id:id=1", b"one".to_vec(), TTL)
            .await
            .expect("set should succeed");

        let got = cache.get("repo:a:id:id=1").await.expect("get should succeed");
        assert_eq!(got.as_deref(), Some(&b"one"[..]));

        let removed = cache
            .delete(&keys(&["repo:a:id:id=1", "repo:a:id:id=2"]))
            .await
            .expect("delete should succeed");
        assert_eq!(removed, 1);
        assert!(cache.get("repo:a:id:id=1").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache = InMemoryCache::new();
        cache
            .set("k", b"v".to_vec(), Duration::from_secs(5))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(cache.get("k").await.unwrap().is_some());
        assert_eq!(cache.exists(&keys(&["k"])).await.unwrap(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.exists(&keys(&["k"])).await.unwrap(), 0);
        assert!(cache.get("k").await.unwrap().is_none());
        assert!(cache.is_empty(), "expired entry is dropped on read");

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = InMemoryCache::new();
        cache.set("short", vec![1], Duration::from_secs(1)).await.unwrap();
        cache.set("long", vec![2], Duration::from_secs(100)).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired().unwrap(), 1);
        assert_eq!(cache.keys(), vec!["long".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_pattern_only_touches_matches() {
        let cache = InMemoryCache::new();
        for key in [
            "repo:payments:list:all",
            "repo:payments:list:status=paid:page=1:size=20",
            "repo:payments:count:all",
            "repo:payments:id:id=1",
            "repo:invoices:list:all",
        ] {
            cache.set(key, vec![0], TTL).await.unwrap();
        }

        let removed = cache
            .delete_pattern("repo:payments:list:*")
            .await
            .expect("delete_pattern should succeed");
        assert_eq!(removed, 2);
        assert_eq!(
            cache.keys(),
            keys(&[
                "repo:invoices:list:all",
                "repo:payments:count:all",
                "repo:payments:id:id=1",
            ])
        );

        assert!(cache.delete_pattern("repo:payments").await.is_err());
    }

    #[tokio::test]
    async fn test_json_helpers_and_stats() {
        let cache = InMemoryCache::new();
        cache
            .set_json("n", &vec![1_i64, 2, 3], TTL)
            .await
            .expect("set_json should succeed");

        let got: Option<Vec<i64>> = cache.get_json("n").await.expect("get_json should succeed");
        assert_eq!(got, Some(vec![1, 2, 3]));

        let missing: Option<Vec<i64>> = cache.get_json("missing").await.unwrap();
        assert!(missing.is_none());

        cache.set("bad", b"not json".to_vec(), TTL).await.unwrap();
        let bad = cache.get_json::<Vec<i64>>("bad").await;
        assert!(matches!(bad, Err(CacheError::Serialization { .. })));

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 2);
    }
}
