//! Connection pool configuration

use std::time::Duration;

use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tessera_core::{StoreError, StoreResult};
use tokio_postgres::NoTls;

/// PostgreSQL connection pool configuration.
#[derive(Debug, Clone)]
pub struct PgConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connect and pool-wait timeout
    pub timeout: Duration,
}

impl Default for PgConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "tessera".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl PgConfig {
    /// Read `TESSERA_DB_*` variables, falling back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("TESSERA_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("TESSERA_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("TESSERA_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("TESSERA_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("TESSERA_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("TESSERA_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_size),
            timeout: std::env::var("TESSERA_DB_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    fn to_deadpool(&self) -> Config {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.connect_timeout = Some(self.timeout);

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool = PoolConfig::new(self.max_size);
        pool.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool);
        cfg
    }

    /// Create a connection pool. Connections are opened lazily.
    pub fn create_pool(&self) -> StoreResult<Pool> {
        self.to_deadpool()
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::backend(format!("Failed to create pool: {}", e)))
    }
}
