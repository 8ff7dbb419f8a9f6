//! Optional repository collaborators.

use std::sync::Arc;

use crate::cache::{CachePort, NoopCache};
use crate::observability::{AuditSink, MetricsSink, NoopAudit, NoopMetrics};

/// Collaborators injected into a repository. Any may be absent.
#[derive(Clone, Default)]
pub struct RepositoryDeps {
    pub cache: Option<Arc<dyn CachePort>>,
    pub metrics: Option<Arc<dyn MetricsSink>>,
    pub audit: Option<Arc<dyn AuditSink>>,
}

impl RepositoryDeps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(mut self, cache: Arc<dyn CachePort>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Replace every absent collaborator with its no-op.
    pub(crate) fn resolve(self) -> ResolvedDeps {
        ResolvedDeps {
            cache: self.cache.unwrap_or_else(|| Arc::new(NoopCache)),
            metrics: self.metrics.unwrap_or_else(|| Arc::new(NoopMetrics)),
            audit: self.audit.unwrap_or_else(|| Arc::new(NoopAudit)),
        }
    }
}

impl std::fmt::Debug for RepositoryDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryDeps")
            .field("cache", &self.cache.is_some())
            .field("metrics", &self.metrics.is_some())
            .field("audit", &self.audit.is_some())
            .finish()
    }
}

pub(crate) struct ResolvedDeps {
    pub(crate) cache: Arc<dyn CachePort>,
    pub(crate) metrics: Arc<dyn MetricsSink>,
    pub(crate) audit: Arc<dyn AuditSink>,
}
