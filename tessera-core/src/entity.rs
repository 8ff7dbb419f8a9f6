//! Entity capability traits.
//!
//! The repository engine is generic over any type that exposes these
//! capabilities. Nothing is discovered by field name at runtime: an entity
//! says how to read its id, how to read and bump its version, and how to
//! render itself as a field map.

use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value as JsonValue;

use crate::identity::{EntityId, TenantId, Version};

/// Stable field name -> serialized value mapping of an entity.
pub type FieldMap = BTreeMap<String, JsonValue>;

/// A type with a unique identifier.
pub trait Identifiable {
    /// Get the entity's unique identifier.
    fn id(&self) -> EntityId;
}

/// A type carrying an optimistic-lock version counter.
pub trait Versioned {
    /// Current version token.
    fn version(&self) -> Version;

    /// Overwrite the version token.
    fn set_version(&mut self, version: Version);
}

/// A type that can render itself as a field map (audit diffs, predicate matching).
pub trait Diffable {
    fn field_map(&self) -> FieldMap;
}

/// Typed field names for an entity.
///
/// Implemented by a small per-entity enum (see [`entity_fields!`](crate::entity_fields))
/// so predicates cannot reference a field the entity does not have.
pub trait FieldName: Copy + Send + Sync + 'static {
    /// Name of the field as stored.
    fn as_str(&self) -> &'static str;
}

/// A persistable, cacheable record managed by the generic repository.
///
/// # Implementation Requirements
///
/// - `id()` must be stable for the lifetime of the record
/// - `field_map()` keys must match the names returned by `Self::Field`
/// - the serde representation is what the cache and the document store persist
pub trait Entity:
    Identifiable + Versioned + Diffable + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Field enum accepted by [`Filter`](crate::Filter) for this entity.
    type Field: FieldName;

    /// Name of the field holding the owning tenant.
    const TENANT_FIELD: &'static str = "tenant_id";

    /// Storage collection name. Defaults to the snake_case plural of the type name.
    fn collection() -> String {
        derive_collection_name(std::any::type_name::<Self>())
    }

    /// Owning tenant, if this entity is tenant-scoped.
    fn tenant_id(&self) -> Option<TenantId> {
        None
    }
}

/// Derive a collection name from a Rust type path.
///
/// `billing::PaymentMilestone` -> `payment_milestones`, `HTTPRoute` -> `http_routes`.
pub fn derive_collection_name(type_name: &str) -> String {
    let base = type_name.split('<').next().unwrap_or(type_name);
    let base = base.rsplit("::").next().unwrap_or(base);

    let chars: Vec<char> = base.chars().collect();
    let mut snake = String::with_capacity(base.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };
            if boundary {
                snake.push('_');
            }
            snake.extend(c.to_lowercase());
        } else {
            snake.push(c);
        }
    }

    pluralize(&snake)
}

fn pluralize(word: &str) -> String {
    if word.ends_with('s')
        || word.ends_with('x')
        || word.ends_with('z')
        || word.ends_with("ch")
        || word.ends_with("sh")
    {
        return format!("{word}es");
    }
    if let Some(stem) = word.strip_suffix('y') {
        let consonant_before = stem
            .chars()
            .last()
            .is_some_and(|c| !matches!(c, 'a' | 'e' | 'i' | 'o' | 'u'));
        if consonant_before {
            return format!("{stem}ies");
        }
    }
    format!("{word}s")
}

/// Serialize any struct into a [`FieldMap`].
///
/// Convenience for `Diffable` implementations on plain serde structs.
/// Non-object representations yield an empty map.
pub fn serialize_fields<T: Serialize>(value: &T) -> FieldMap {
    match serde_json::to_value(value) {
        Ok(JsonValue::Object(map)) => map.into_iter().collect(),
        _ => FieldMap::new(),
    }
}

/// Compute the changed fields between two snapshots.
///
/// Output shape: `{ "<field>": { "from": <old>, "to": <new> } }`. Fields
/// present on only one side are reported with `null` on the other.
pub fn diff_fields(before: &FieldMap, after: &FieldMap) -> JsonValue {
    let mut changes = serde_json::Map::new();
    for (field, old) in before {
        let new = after.get(field).cloned().unwrap_or(JsonValue::Null);
        if &new != old {
            changes.insert(
                field.clone(),
                serde_json::json!({ "from": old, "to": new }),
            );
        }
    }
    for (field, new) in after {
        if !before.contains_key(field) {
            changes.insert(
                field.clone(),
                serde_json::json!({ "from": JsonValue::Null, "to": new }),
            );
        }
    }
    JsonValue::Object(changes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_collection_name() {
        assert_eq!(derive_collection_name("Payment"), "payments");
        assert_eq!(
            derive_collection_name("billing::model::PaymentMilestone"),
            "payment_milestones"
        );
        assert_eq!(derive_collection_name("Subscription"), "subscriptions");
        assert_eq!(derive_collection_name("Invoice"), "invoices");
        assert_eq!(derive_collection_name("Status"), "statuses");
        assert_eq!(derive_collection_name("Company"), "companies");
        assert_eq!(derive_collection_name("Day"), "days");
        assert_eq!(derive_collection_name("HTTPRoute"), "http_routes");
        assert_eq!(derive_collection_name("Batch"), "batches");
        assert_eq!(derive_collection_name("Wrapper<u8>"), "wrappers");
    }

    #[test]
    fn test_serialize_fields() {
        #[derive(Serialize)]
        struct Row {
            id: u32,
            name: &'static str,
        }
        let map = serialize_fields(&Row { id: 7, name: "a" });
        assert_eq!(map.len(), 2);
        assert_eq!(map["id"], serde_json::json!(7));
        assert_eq!(map["name"], serde_json::json!("a"));

        assert!(serialize_fields(&42).is_empty());
    }

    #[test]
    fn test_diff_fields_reports_changes_only() {
        let mut before = FieldMap::new();
        before.insert("status".into(), serde_json::json!("pending"));
        before.insert("amount".into(), serde_json::json!(100));
        before.insert("legacy".into(), serde_json::json!(true));

        let mut after = before.clone();
        after.insert("status".into(), serde_json::json!("paid"));
        after.remove("legacy");
        after.insert("paid_at".into(), serde_json::json!("2024-01-01T00:00:00Z"));

        let diff = diff_fields(&before, &after);
        let obj = diff.as_object().expect("diff is an object");
        assert_eq!(obj.len(), 3);
        assert_eq!(obj["status"]["from"], "pending");
        assert_eq!(obj["status"]["to"], "paid");
        assert_eq!(obj["legacy"]["to"], JsonValue::Null);
        assert_eq!(obj["paid_at"]["from"], JsonValue::Null);
        assert!(!obj.contains_key("amount"));
    }
}
