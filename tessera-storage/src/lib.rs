//! TESSERA Storage - Cache-Aside Repository Engine
//!
//! The generic [`Repository`] plus the ports it sits on: a byte-oriented
//! [`CachePort`] with in-memory, LMDB and no-op backends, and a
//! [`PersistencePort`] with an in-memory backend. PostgreSQL lives in
//! tessera-pg.

pub mod cache;
pub mod observability;
pub mod repository;
pub mod store;
pub mod telemetry;

pub use cache::{
    CachePort, CachePortExt, CacheStats, InMemoryCache, KeyPattern, LmdbCache, LmdbCacheError,
    NoopCache,
};
pub use observability::{
    encode_text, AuditAction, AuditSink, MetricsSink, NoopAudit, NoopMetrics, PrometheusMetrics,
    TracingAuditSink, AUDIT_TARGET,
};
pub use repository::{Repository, RepositoryDeps};
pub use store::{InMemoryStore, PersistencePort, StoreTx, TxFuture};
pub use telemetry::{init_tracing, TelemetryConfig};

// Re-export the core vocabulary so callers need a single dependency.
pub use tessera_core;
