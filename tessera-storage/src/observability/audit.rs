//! Audit trail sinks.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tessera_core::EntityId;

/// Tracing target audit events are written to.
pub const AUDIT_TARGET: &str = "tessera::audit";

/// Kind of audited mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives one event per successful mutation.
///
/// Payloads:
/// - create: the entity snapshot
/// - update: `{ "before", "after", "changes" }`
/// - delete: `{ "mode": "hard" | "soft" }`
///
/// Sinks own their failures; nothing they do can fail the mutation.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log_create(&self, collection: &str, id: EntityId, payload: &JsonValue);

    async fn log_update(&self, collection: &str, id: EntityId, payload: &JsonValue);

    async fn log_delete(&self, collection: &str, id: EntityId, payload: &JsonValue);

    /// Whether payloads should be built at all.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Audit sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAudit;

#[async_trait]
impl AuditSink for NoopAudit {
    async fn log_create(&self, _: &str, _: EntityId, _: &JsonValue) {}
    async fn log_update(&self, _: &str, _: EntityId, _: &JsonValue) {}
    async fn log_delete(&self, _: &str, _: EntityId, _: &JsonValue) {}

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Writes audit events as structured `tracing` events on [`AUDIT_TARGET`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    fn emit(action: AuditAction, collection: &str, id: EntityId, payload: &JsonValue) {
        tracing::info!(
            target: AUDIT_TARGET,
            action = %action,
            collection,
            entity_id = %id,
            payload = %payload,
            "audit"
        );
    }
}

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn log_create(&self, collection: &str, id: EntityId, payload: &JsonValue) {
        Self::emit(AuditAction::Create, collection, id, payload);
    }

    async fn log_update(&self, collection: &str, id: EntityId, payload: &JsonValue) {
        Self::emit(AuditAction::Update, collection, id, payload);
    }

    async fn log_delete(&self, collection: &str, id: EntityId, payload: &JsonValue) {
        Self::emit(AuditAction::Delete, collection, id, payload);
    }
}
