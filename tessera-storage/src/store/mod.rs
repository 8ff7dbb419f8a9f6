//! Persistence port and the in-memory backend.
//!
//! PostgreSQL lives in the `tessera-pg` crate; anything implementing
//! [`PersistencePort`] can sit under a repository.

pub mod memory;
pub mod traits;

pub use memory::InMemoryStore;
pub use traits::{PersistencePort, StoreTx, TxFuture};
