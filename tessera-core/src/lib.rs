//! TESSERA Core - Entity capabilities and query vocabulary
//!
//! Everything the generic repository needs to know about an entity, and the
//! pure pieces of its policy: typed filters, predicates, the pagination
//! calculator, cache-key derivation, the error taxonomy and configuration.
//! No I/O lives here.

mod macros;

pub mod cache_key;
pub mod config;
pub mod entity;
pub mod error;
pub mod filter;
pub mod identity;
pub mod pagination;
pub mod predicate;

pub use cache_key::{CacheKeyBuilder, CacheOp, DEFAULT_NAMESPACE};
pub use config::RepositoryConfig;
pub use entity::{
    derive_collection_name, diff_fields, serialize_fields, Diffable, Entity, FieldMap, FieldName,
    Identifiable, Versioned,
};
pub use error::{
    CacheError, CacheResult, ErrorKind, RepoError, RepoResult, StoreError, StoreResult,
};
pub use filter::{json_as_text, Filter, FilterSet, FilterValue, Patch};
pub use identity::{is_nil_id, new_entity_id, EntityId, TenantId, Timestamp, Version};
pub use pagination::{paginate, Page, PageInfo, PageRequest, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use predicate::{Direction, Predicate, Scope, Sort, SortKey};
