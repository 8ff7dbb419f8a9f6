//! Optional collaborators: metrics and audit sinks.
//!
//! A repository built without one gets the matching no-op, so the engine
//! never branches on presence.

pub mod audit;
pub mod metrics;

pub use audit::{AuditAction, AuditSink, NoopAudit, TracingAuditSink, AUDIT_TARGET};
pub use metrics::{encode_text, MetricsSink, NoopMetrics, PrometheusMetrics};
