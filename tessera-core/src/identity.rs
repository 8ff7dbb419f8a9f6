//! Identity types for TESSERA entities

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
pub type EntityId = Uuid;

/// Tenant identifier. Tenants partition every collection.
pub type TenantId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Optimistic-lock token carried by every entity.
pub type Version = i64;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// The nil UUID is the "absent id" sentinel; operations reject it.
pub fn is_nil_id(id: &EntityId) -> bool {
    id.is_nil()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entity_ids_are_unique_and_non_nil() {
        let a = new_entity_id();
        let b = new_entity_id();
        assert_ne!(a, b);
        assert!(!is_nil_id(&a));
        assert!(is_nil_id(&Uuid::nil()));
    }
}
