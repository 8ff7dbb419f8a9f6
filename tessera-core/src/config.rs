//! Repository configuration

use std::time::Duration;

use crate::cache_key::DEFAULT_NAMESPACE;

/// Per-repository tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// TTL applied to every cache entry the repository writes.
    pub cache_ttl: Duration,
    /// Rows per insert statement in `create_batch`.
    pub batch_chunk_size: usize,
    /// Deadline for each persistence call.
    pub operation_timeout: Duration,
    /// Deadline for each cache call. Expiry degrades to a miss.
    pub cache_timeout: Duration,
    /// First segment of every cache key.
    pub key_namespace: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300), // 5 minutes
            batch_chunk_size: 100,
            operation_timeout: Duration::from_secs(30),
            cache_timeout: Duration::from_millis(500),
            key_namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl RepositoryConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for money-moving entities: shorter cache TTL.
    pub fn financial() -> Self {
        Self::default().with_cache_ttl(Duration::from_secs(180))
    }

    /// Load overrides from `TESSERA_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_ttl: env_parse::<u64>("TESSERA_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            batch_chunk_size: env_parse::<usize>("TESSERA_BATCH_CHUNK_SIZE")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.batch_chunk_size),
            operation_timeout: env_parse::<u64>("TESSERA_OP_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.operation_timeout),
            cache_timeout: env_parse::<u64>("TESSERA_CACHE_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.cache_timeout),
            key_namespace: defaults.key_namespace,
        }
    }

    /// Set the cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the batch chunk size. Zero is treated as one.
    pub fn with_batch_chunk_size(mut self, size: usize) -> Self {
        self.batch_chunk_size = size.max(1);
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = timeout;
        self
    }

    pub fn with_key_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.key_namespace = namespace.into();
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = RepositoryConfig::default();
        assert_eq!(cfg.cache_ttl, Duration::from_secs(300));
        assert_eq!(cfg.batch_chunk_size, 100);
        assert_eq!(cfg.key_namespace, "repo");
    }

    #[test]
    fn test_financial_preset() {
        let cfg = RepositoryConfig::financial();
        assert_eq!(cfg.cache_ttl, Duration::from_secs(180));
        assert_eq!(cfg.batch_chunk_size, 100);
    }

    #[test]
    fn test_builder_setters() {
        let cfg = RepositoryConfig::new()
            .with_cache_ttl(Duration::from_secs(1))
            .with_batch_chunk_size(0)
            .with_operation_timeout(Duration::from_millis(10))
            .with_cache_timeout(Duration::from_millis(5))
            .with_key_namespace("test");
        assert_eq!(cfg.cache_ttl, Duration::from_secs(1));
        assert_eq!(cfg.batch_chunk_size, 1);
        assert_eq!(cfg.operation_timeout, Duration::from_millis(10));
        assert_eq!(cfg.cache_timeout, Duration::from_millis(5));
        assert_eq!(cfg.key_namespace, "test");
    }

    #[test]
    fn test_from_env_falls_back_to_defaults() {
        // Setting env vars here would race the other tests.
        let cfg = RepositoryConfig::from_env();
        if std::env::var("TESSERA_CACHE_TTL_SECS").is_err() {
            assert_eq!(cfg.cache_ttl, Duration::from_secs(300));
        }
        assert!(cfg.batch_chunk_size >= 1);
    }
}
