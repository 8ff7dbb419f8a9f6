//! Store-level predicates and ordering

use serde::{Deserialize, Serialize};

use crate::entity::FieldMap;
use crate::filter::FilterSet;
use crate::identity::{EntityId, TenantId, Version};

/// Soft-delete visibility of a predicate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Rows without a deletion timestamp (default).
    #[default]
    Active,
    /// Every row.
    WithDeleted,
    /// Only soft-deleted rows.
    OnlyDeleted,
}

impl Scope {
    pub fn admits(&self, deleted: bool) -> bool {
        match self {
            Scope::Active => !deleted,
            Scope::WithDeleted => true,
            Scope::OnlyDeleted => deleted,
        }
    }
}

/// What a persistence call selects: optional id and version plus field equalities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Predicate {
    pub id: Option<EntityId>,
    pub version: Option<Version>,
    pub filters: FilterSet,
    pub scope: Scope,
}

impl Predicate {
    /// Every active row.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: EntityId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn matching(filters: FilterSet) -> Self {
        Self {
            filters,
            ..Self::default()
        }
    }

    /// Additionally require the stored version.
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Additionally require `tenant_field == tenant`.
    pub fn with_tenant(mut self, tenant_field: &str, tenant: TenantId) -> Self {
        self.filters.insert(tenant_field, tenant);
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Evaluate against a stored row.
    pub fn matches(&self, id: EntityId, version: Version, fields: &FieldMap, deleted: bool) -> bool {
        self.scope.admits(deleted)
            && self.id.map_or(true, |want| want == id)
            && self.version.map_or(true, |want| want == version)
            && self.filters.matches(fields)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// Sort key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Id,
    Field(String),
}

/// Ordering for multi-row reads. Defaults to id ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sort {
    pub key: SortKey,
    pub direction: Direction,
}

impl Sort {
    pub fn by_id() -> Self {
        Self::default()
    }

    pub fn by_field(field: impl Into<String>) -> Self {
        Self {
            key: SortKey::Field(field.into()),
            direction: Direction::Asc,
        }
    }

    pub fn descending(mut self) -> Self {
        self.direction = Direction::Desc;
        self
    }
}
