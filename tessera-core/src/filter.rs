//! Typed equality filters and field patches
//!
//! A filter is an equality conjunction over entity fields. Field names come
//! from the entity's `Field` enum; the underlying [`FilterSet`] is a sorted map
//! so that two filters holding the same pairs are indistinguishable no matter
//! the order they were built in.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::entity::{Entity, FieldMap, FieldName};
use crate::identity::{TenantId, Timestamp};

/// Scalar value accepted by an equality filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum FilterValue {
    Bool(bool),
    Int(i64),
    Text(String),
    Uuid(Uuid),
    Timestamp(Timestamp),
}

impl FilterValue {
    /// Text rendering used for cache keys and store comparisons.
    ///
    /// Matches how the value renders once serialized to JSON and read back as
    /// text, so `Int(5)` and `Text("5")` compare equal against a stored field.
    pub fn as_text(&self) -> String {
        match self {
            FilterValue::Bool(b) => b.to_string(),
            FilterValue::Int(i) => i.to_string(),
            FilterValue::Text(s) => s.clone(),
            FilterValue::Uuid(u) => u.to_string(),
            FilterValue::Timestamp(t) => t.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        }
    }

    /// Whether a stored JSON field value equals this filter value.
    pub fn matches_json(&self, stored: &JsonValue) -> bool {
        json_as_text(stored).is_some_and(|text| text == self.as_text())
    }
}

/// Text form of a stored JSON scalar; `None` for null.
pub fn json_as_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        FilterValue::Bool(v)
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Int(v)
    }
}

impl From<i32> for FilterValue {
    fn from(v: i32) -> Self {
        FilterValue::Int(i64::from(v))
    }
}

impl From<u32> for FilterValue {
    fn from(v: u32) -> Self {
        FilterValue::Int(i64::from(v))
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        FilterValue::Text(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::Text(v.to_string())
    }
}

impl From<Uuid> for FilterValue {
    fn from(v: Uuid) -> Self {
        FilterValue::Uuid(v)
    }
}

impl From<Timestamp> for FilterValue {
    fn from(v: Timestamp) -> Self {
        FilterValue::Timestamp(v)
    }
}

// ============================================================================
// FILTER SET
// ============================================================================

/// Canonical field -> value conjunction, untyped.
///
/// This is what crosses into the persistence and cache layers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterSet(BTreeMap<String, FilterValue>);

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an equality pair.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FilterValue>) {
        self.0.insert(field.into(), value.into());
    }

    /// Add a pair only when a value is present.
    pub fn insert_opt<V: Into<FilterValue>>(&mut self, field: impl Into<String>, value: Option<V>) {
        if let Some(value) = value {
            self.insert(field, value);
        }
    }

    pub fn get(&self, field: &str) -> Option<&FilterValue> {
        self.0.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Pairs in canonical (field name) order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Merge another set in; pairs from `other` win on collision.
    pub fn extend(&mut self, other: &FilterSet) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// `field=value` pairs sorted by field, joined with `,`. Empty set is `all`.
    ///
    /// Reserved key characters in values are percent-escaped so a value can
    /// never forge another pair or a glob.
    pub fn canonical_string(&self) -> String {
        if self.0.is_empty() {
            return "all".to_string();
        }
        self.0
            .iter()
            .map(|(field, value)| format!("{}={}", escape_key_part(field), escape_key_part(&value.as_text())))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Whether every pair matches the given field map.
    pub fn matches(&self, fields: &FieldMap) -> bool {
        self.0.iter().all(|(field, expected)| {
            fields
                .get(field)
                .is_some_and(|stored| expected.matches_json(stored))
        })
    }
}

fn escape_key_part(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            ',' => out.push_str("%2C"),
            '=' => out.push_str("%3D"),
            ':' => out.push_str("%3A"),
            '*' => out.push_str("%2A"),
            _ => out.push(c),
        }
    }
    out
}

// ============================================================================
// TYPED FILTER
// ============================================================================

/// Equality filter over the fields of `E`.
pub struct Filter<E: Entity> {
    set: FilterSet,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Filter<E> {
    /// Match everything.
    pub fn all() -> Self {
        Self {
            set: FilterSet::new(),
            _entity: PhantomData,
        }
    }

    /// Require `field == value`.
    pub fn eq(mut self, field: E::Field, value: impl Into<FilterValue>) -> Self {
        self.set.insert(field.as_str(), value);
        self
    }

    /// Require `field == value` when a value is given; `None` adds nothing.
    pub fn eq_opt<V: Into<FilterValue>>(mut self, field: E::Field, value: Option<V>) -> Self {
        self.set.insert_opt(field.as_str(), value);
        self
    }

    /// Scope to one tenant via the entity's tenant field.
    pub fn for_tenant(mut self, tenant: TenantId) -> Self {
        self.set.insert(E::TENANT_FIELD, tenant);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn as_set(&self) -> &FilterSet {
        &self.set
    }

    pub fn into_set(self) -> FilterSet {
        self.set
    }
}

impl<E: Entity> Default for Filter<E> {
    fn default() -> Self {
        Self::all()
    }
}

impl<E: Entity> Clone for Filter<E> {
    fn clone(&self) -> Self {
        Self {
            set: self.set.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> fmt::Debug for Filter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Filter").field(&self.set).finish()
    }
}

// ============================================================================
// PATCH
// ============================================================================

/// Field assignments applied by a bulk update.
pub struct Patch<E: Entity> {
    fields: FieldMap,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Patch<E> {
    pub fn new() -> Self {
        Self {
            fields: FieldMap::new(),
            _entity: PhantomData,
        }
    }

    /// Assign `field = value`.
    pub fn set(mut self, field: E::Field, value: impl Into<JsonValue>) -> Self {
        self.fields.insert(field.as_str().to_string(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }
}

impl<E: Entity> Default for Patch<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Clone for Patch<E> {
    fn clone(&self) -> Self {
        Self {
            fields: self.fields.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> fmt::Debug for Patch<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Patch").field(&self.fields).finish()
    }
}
