//! Utility macros for reducing entity boilerplate

/// Declare a typed field enum for an entity.
///
/// # Example
/// ```ignore
/// entity_fields! {
///     pub enum PaymentField {
///         TenantId => "tenant_id",
///         Status => "status",
///     }
/// }
/// assert_eq!(PaymentField::Status.as_str(), "status");
/// ```
#[macro_export]
macro_rules! entity_fields {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident => $field:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant),+
        }

        impl $crate::FieldName for $name {
            fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $field),+
                }
            }
        }
    };
}

/// Implement the capability traits for a plain serde struct.
///
/// The struct must have `id: EntityId` and `version: Version` fields. The field
/// map is its serde object representation.
///
/// # Example
/// ```ignore
/// impl_entity!(Payment, PaymentField);
/// impl_entity!(Payment, PaymentField, tenant_id);
/// impl_entity!(Payment, PaymentField, tenant_id, collection = "ledger_payments");
/// ```
#[macro_export]
macro_rules! impl_entity {
    (@caps $type:ty) => {
        impl $crate::Identifiable for $type {
            fn id(&self) -> $crate::EntityId {
                self.id
            }
        }

        impl $crate::Versioned for $type {
            fn version(&self) -> $crate::Version {
                self.version
            }

            fn set_version(&mut self, version: $crate::Version) {
                self.version = version;
            }
        }

        impl $crate::Diffable for $type {
            fn field_map(&self) -> $crate::FieldMap {
                $crate::serialize_fields(self)
            }
        }
    };
    ($type:ty, $fields:ty) => {
        $crate::impl_entity!(@caps $type);

        impl $crate::Entity for $type {
            type Field = $fields;
        }
    };
    ($type:ty, $fields:ty, $tenant_field:ident) => {
        $crate::impl_entity!(@caps $type);

        impl $crate::Entity for $type {
            type Field = $fields;

            const TENANT_FIELD: &'static str = stringify!($tenant_field);

            fn tenant_id(&self) -> Option<$crate::TenantId> {
                Some(self.$tenant_field)
            }
        }
    };
    ($type:ty, $fields:ty, $tenant_field:ident, collection = $collection:literal) => {
        $crate::impl_entity!(@caps $type);

        impl $crate::Entity for $type {
            type Field = $fields;

            const TENANT_FIELD: &'static str = stringify!($tenant_field);

            fn collection() -> String {
                $collection.to_string()
            }

            fn tenant_id(&self) -> Option<$crate::TenantId> {
                Some(self.$tenant_field)
            }
        }
    };
}
