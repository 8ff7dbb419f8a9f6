//! Deterministic cache keys
//!
//! Keys have the shape `<namespace>:<collection>:<op>:<canonical filter>`, for
//! example `repo:payments:list:status=paid,tenant_id=...`. Paginated list keys
//! append `:page=<n>:size=<n>`. Every key of a collection shares the
//! `<namespace>:<collection>:` prefix, so invalidation is a prefix delete.

use std::fmt;

use crate::filter::FilterSet;
use crate::identity::{EntityId, TenantId};
use crate::pagination::PageRequest;

/// Default key namespace.
pub const DEFAULT_NAMESPACE: &str = "repo";

/// Cached operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOp {
    /// Single entity by id.
    Get,
    Exists,
    List,
    Count,
}

impl CacheOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOp::Get => "id",
            CacheOp::Exists => "exists",
            CacheOp::List => "list",
            CacheOp::Count => "count",
        }
    }
}

impl fmt::Display for CacheOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds keys and invalidation patterns for one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeyBuilder {
    namespace: String,
    collection: String,
    tenant_field: String,
}

impl CacheKeyBuilder {
    pub fn new(namespace: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            collection: collection.into(),
            tenant_field: "tenant_id".to_string(),
        }
    }

    pub fn with_tenant_field(mut self, field: impl Into<String>) -> Self {
        self.tenant_field = field.into();
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn prefix(&self, op: CacheOp) -> String {
        format!("{}:{}:{}", self.namespace, self.collection, op.as_str())
    }

    /// Key for an operation over a filter set.
    pub fn key(&self, op: CacheOp, filters: &FilterSet) -> String {
        format!("{}:{}", self.prefix(op), filters.canonical_string())
    }

    /// Key for one page of a filtered list.
    pub fn page_key(&self, filters: &FilterSet, request: PageRequest) -> String {
        let request = request.normalized();
        format!(
            "{}:page={}:size={}",
            self.key(CacheOp::List, filters),
            request.page,
            request.page_size
        )
    }

    /// Key of a single entity, optionally tenant-scoped.
    ///
    /// The id pair always comes first so [`id_pattern`](Self::id_pattern)
    /// covers the tenant-scoped variants as well.
    pub fn id_key(&self, id: EntityId, tenant: Option<TenantId>) -> String {
        match tenant {
            Some(tenant) => format!(
                "{}:id={},{}={}",
                self.prefix(CacheOp::Get),
                id,
                self.tenant_field,
                tenant
            ),
            None => format!("{}:id={}", self.prefix(CacheOp::Get), id),
        }
    }

    pub fn exists_key(&self, id: EntityId) -> String {
        format!("{}:id={}", self.prefix(CacheOp::Exists), id)
    }

    /// Glob matching every id-scoped entity key of `id`.
    pub fn id_pattern(&self, id: EntityId) -> String {
        format!("{}*", self.id_key(id, None))
    }

    /// Glob matching every key of one operation.
    pub fn op_pattern(&self, op: CacheOp) -> String {
        format!("{}:*", self.prefix(op))
    }

    /// Glob matching every key of the collection.
    pub fn collection_pattern(&self) -> String {
        format!("{}:{}:*", self.namespace, self.collection)
    }
}
