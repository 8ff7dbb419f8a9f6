//! Cache port and backends.
//!
//! The repository talks to a [`CachePort`]: bytes in, bytes out, TTL on every
//! write, glob deletes for invalidation. Three backends ship in-tree:
//!
//! - [`InMemoryCache`]: process-local, lazy TTL expiry
//! - [`LmdbCache`]: persistent, memory-mapped via heed
//! - [`NoopCache`]: stores nothing; what a repository without a cache uses

pub mod lmdb_backend;
pub mod memory;
pub mod noop;
pub mod pattern;
pub mod traits;

pub use lmdb_backend::{LmdbCache, LmdbCacheError};
pub use memory::InMemoryCache;
pub use noop::NoopCache;
pub use pattern::KeyPattern;
pub use traits::{CachePort, CachePortExt, CacheStats};
