//! LMDB-backed persistent cache.
//!
//! Uses the heed crate (Rust bindings for LMDB) so cached query results
//! survive a process restart.
//!
//! # Value Layout
//!
//! `[expires_at: 8 bytes, little-endian unix millis][payload]`. An entry past
//! its expiry reads as a miss and is removed on that read.
//!
//! # Pattern Deletes
//!
//! Keys are stored as UTF-8 bytes in LMDB's lexicographic order. A pattern's
//! literal prefix bounds the scan; only keys under it are tested.

use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use tessera_core::{CacheError, CacheResult};

use super::pattern::KeyPattern;
use super::traits::{CachePort, CacheStats};

const HEADER_LEN: usize = 8;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for CacheError {
    fn from(e: LmdbCacheError) -> Self {
        match e {
            LmdbCacheError::Io(io) => CacheError::Io {
                reason: io.to_string(),
            },
            LmdbCacheError::Corrupt(reason) => CacheError::Serialization { reason },
            other => CacheError::Backend {
                reason: other.to_string(),
            },
        }
    }
}

fn txn_err(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

/// LMDB-backed cache.
///
/// # Example
///
/// ```ignore
/// use tessera_storage::cache::{CachePortExt, LmdbCache};
///
/// let cache = LmdbCache::new("/var/cache/tessera", 256)?;
/// cache.set_json("repo:payments:count:all", &42_i64, ttl).await?;
/// ```
pub struct LmdbCache {
    env: Env,
    db: Database<Bytes, Bytes>,
    stats: Arc<RwLock<CacheStats>>,
}

impl LmdbCache {
    /// Open (or create) a cache under `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_err)?;

        Ok(Self {
            env,
            db,
            stats: Arc::new(RwLock::new(CacheStats::default())),
        })
    }

    fn now_millis() -> i64 {
        Utc::now().timestamp_millis()
    }

    fn encode(value: &[u8], ttl: Duration) -> Vec<u8> {
        let ttl_millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = Self::now_millis().saturating_add(ttl_millis);

        let mut bytes = Vec::with_capacity(HEADER_LEN + value.len());
        bytes.extend_from_slice(&expires_at.to_le_bytes());
        bytes.extend_from_slice(value);
        bytes
    }

    /// Split a stored value into (expires_at, payload).
    fn decode(bytes: &[u8]) -> Result<(i64, &[u8]), LmdbCacheError> {
        if bytes.len() < HEADER_LEN {
            return Err(LmdbCacheError::Corrupt(format!(
                "entry shorter than header ({} bytes)",
                bytes.len()
            )));
        }
        let header: [u8; HEADER_LEN] = bytes[..HEADER_LEN]
            .try_into()
            .map_err(|_| LmdbCacheError::Corrupt("invalid expiry header".into()))?;
        Ok((i64::from_le_bytes(header), &bytes[HEADER_LEN..]))
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

    /// Collect every key under `prefix`. Cursor errors abort the scan.
    fn collect_keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, LmdbCacheError> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let iter = self.db.prefix_iter(&rtxn, prefix).map_err(txn_err)?;

        let mut keys = Vec::new();
        for result in iter {
            let (key, _) = result.map_err(txn_err)?;
            keys.push(key.to_vec());
        }
        Ok(keys)
    }

    fn delete_raw(&self, keys: &[Vec<u8>]) -> Result<u64, LmdbCacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let mut deleted = 0u64;
        for key in keys {
            if self.db.delete(&mut wtxn, key).map_err(txn_err)? {
                deleted += 1;
            }
        }
        wtxn.commit().map_err(txn_err)?;
        Ok(deleted)
    }

    /// Number of stored entries, expired ones included until read.
    pub fn len(&self) -> Result<u64, LmdbCacheError> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        self.db.len(&rtxn).map_err(txn_err)
    }

    pub fn is_empty(&self) -> Result<bool, LmdbCacheError> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl CachePort for LmdbCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let (expires_at, payload) = {
            let rtxn = self.env.read_txn().map_err(txn_err)?;
            match self.db.get(&rtxn, key.as_bytes()).map_err(txn_err)? {
                Some(bytes) => {
                    let (expires_at, payload) = Self::decode(bytes)?;
                    (expires_at, payload.to_vec())
                }
                None => {
                    self.record(false);
                    return Ok(None);
                }
            }
        };

        if expires_at <= Self::now_millis() {
            self.delete_raw(&[key.as_bytes().to_vec()])?;
            if let Ok(mut stats) = self.stats.write() {
                stats.expirations += 1;
            }
            self.record(false);
            return Ok(None);
        }

        self.record(true);
        Ok(Some(payload))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let bytes = Self::encode(&value, ttl);
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.db
            .put(&mut wtxn, key.as_bytes(), &bytes)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        let raw: Vec<Vec<u8>> = keys.iter().map(|k| k.as_bytes().to_vec()).collect();
        Ok(self.delete_raw(&raw)?)
    }

    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64> {
        let pattern = KeyPattern::parse(pattern)?;
        let candidates = self.collect_keys_with_prefix(pattern.prefix().as_bytes())?;

        let matching: Vec<Vec<u8>> = if pattern.is_prefix_only() {
            candidates
        } else {
            candidates
                .into_iter()
                .filter(|k| std::str::from_utf8(k).is_ok_and(|s| pattern.matches(s)))
                .collect()
        };

        Ok(self.delete_raw(&matching)?)
    }

    async fn exists(&self, keys: &[String]) -> CacheResult<u64> {
        let now = Self::now_millis();
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let mut present = 0u64;
        for key in keys {
            if let Some(bytes) = self.db.get(&rtxn, key.as_bytes()).map_err(txn_err)? {
                let (expires_at, _) = Self::decode(bytes)?;
                if expires_at > now {
                    present += 1;
                }
            }
        }
        Ok(present)
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        let mut stats = self
            .stats
            .read()
            .map(|s| s.clone())
            .unwrap_or_default();
        stats.entry_count = self.len()?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePortExt;
    use tempfile::TempDir;

    const TTL: Duration = Duration::from_secs(60);

    fn create_test_cache() -> (LmdbCache, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let cache = LmdbCache::new(temp_dir.path(), 10).expect("cache creation should succeed");
        (cache, temp_dir)
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (cache, _temp_dir) = create_test_cache();

        cache
            .set_json("repo:payments:count:all", &7_i64, TTL)
            .await
            .expect("set_json should succeed");

        let value: Option<i64> = cache
            .get_json("repo:payments:count:all")
            .await
            .expect("get_json should succeed");
        assert_eq!(value, Some(7));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let (cache, _temp_dir) = create_test_cache();
        let value = cache.get("nope").await.expect("get should succeed");
        assert!(value.is_none());

        let stats = cache.stats().await.expect("stats should succeed");
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_reads_as_miss() {
        let (cache, _temp_dir) = create_test_cache();
        cache
            .set("k", b"v".to_vec(), Duration::ZERO)
            .await
            .expect("set should succeed");

        assert_eq!(cache.exists(&["k".to_string()]).await.unwrap(), 0);
        assert!(cache.get("k").await.unwrap().is_none());
        assert!(cache.is_empty().unwrap(), "expired entry removed on read");
    }

    #[tokio::test]
    async fn test_delete_and_exists() {
        let (cache, _temp_dir) = create_test_cache();
        cache.set("a", vec![1], TTL).await.unwrap();
        cache.set("b", vec![2], TTL).await.unwrap();

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(cache.exists(&keys).await.unwrap(), 2);
        assert_eq!(cache.delete(&keys).await.unwrap(), 2);
        assert_eq!(cache.exists(&keys).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_pattern() {
        let (cache, _temp_dir) = create_test_cache();
        for key in [
            "repo:payments:list:all",
            "repo:payments:list:status=paid:page=2:size=10",
            "repo:payments:count:all",
            "repo:invoices:count:all",
        ] {
            cache.set(key, vec![0], TTL).await.unwrap();
        }

        let removed = cache
            .delete_pattern("repo:payments:list:*")
            .await
            .expect("delete_pattern should succeed");
        assert_eq!(removed, 2);

        let removed = cache
            .delete_pattern("repo:*:count:*")
            .await
            .expect("delete_pattern should succeed");
        assert_eq!(removed, 2);
        assert!(cache.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_prefix_scan_stops_at_prefix_boundary() {
        let (cache, _temp_dir) = create_test_cache();
        for key in [
            "repo:pay:list:all",
            "repo:payments:list:all",
            "repo:payments:list:status=paid",
            "repo:paymentz:list:all",
        ] {
            cache.set(key, vec![0], TTL).await.unwrap();
        }

        let keys = cache
            .collect_keys_with_prefix(b"repo:payments:")
            .expect("scan should succeed");
        assert_eq!(
            keys,
            vec![
                b"repo:payments:list:all".to_vec(),
                b"repo:payments:list:status=paid".to_vec(),
            ]
        );

        let removed = cache
            .delete_pattern("repo:payments:*")
            .await
            .expect("delete_pattern should succeed");
        assert_eq!(removed, 2);
        assert_eq!(cache.len().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        {
            let cache = LmdbCache::new(temp_dir.path(), 10).expect("open should succeed");
            cache.set("durable", b"yes".to_vec(), TTL).await.unwrap();
        }
        let cache = LmdbCache::new(temp_dir.path(), 10).expect("reopen should succeed");
        assert_eq!(cache.get("durable").await.unwrap().as_deref(), Some(&b"yes"[..]));
    }
}
