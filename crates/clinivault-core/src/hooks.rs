//! Collaborator traits
//!
//! The pipeline depends on two external collaborators: a store that keeps the
//! per-parent and per-tenant byte totals, and a sink for audit events. Concrete
//! implementations live in `clinivault-db` (PostgreSQL) and `clinivault-ingest`
//! (in-memory, tracing).

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{AuditEvent, QuotaDecision, QuotaLimits, QuotaUsage};

#[derive(Debug, thiserror::Error)]
pub enum QuotaStoreError {
    #[error("Quota backend error: {0}")]
    Backend(String),

    #[error("Quota counter would become negative for parent {parent_id}")]
    Underflow { parent_id: Uuid },
}

/// Storage of cumulative attachment sizes
///
/// `try_reserve` must read, check and add in one atomic step so that two concurrent
/// uploads to the same parent cannot both pass a check that together overflows it.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Current totals for a parent record and its tenant
    async fn usage(&self, tenant_id: Uuid, parent_id: Uuid) -> Result<QuotaUsage, QuotaStoreError>;

    /// Evaluate `limits` against current usage and, when allowed, add `size_bytes`
    /// to both totals.
    async fn try_reserve(
        &self,
        tenant_id: Uuid,
        parent_id: Uuid,
        size_bytes: u64,
        limits: &QuotaLimits,
    ) -> Result<QuotaDecision, QuotaStoreError>;

    /// Give back bytes from a failed upload or a deleted attachment
    async fn release(
        &self,
        tenant_id: Uuid,
        parent_id: Uuid,
        size_bytes: u64,
    ) -> Result<(), QuotaStoreError>;
}

/// Receiver of audit events
///
/// Recording never fails the pipeline; implementations report their own errors.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuditEvent);
}

/// No-op implementation for when auditing is handled elsewhere
pub struct NoOpAuditSink;

#[async_trait]
impl AuditSink for NoOpAuditSink {
    async fn record(&self, _event: &AuditEvent) {}
}
