//! Audit events on the `audit` tracing target
//!
//! Each event is logged as one JSON document so log aggregation can index it
//! without parsing the message text.

use async_trait::async_trait;
use clinivault_core::{AuditEvent, AuditSink};

/// Default sink: structured logging with the `audit` target for easy filtering
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: &AuditEvent) {
        let json = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());

        if event.is_success() {
            tracing::event!(
                target: "audit",
                tracing::Level::INFO,
                audit_entry = %json,
                action = ?event.action,
                tenant_id = %event.tenant_id,
                parent_id = %event.parent_id,
                success = true,
                "Attachment audit log"
            );
        } else {
            tracing::event!(
                target: "audit",
                tracing::Level::WARN,
                audit_entry = %json,
                action = ?event.action,
                tenant_id = %event.tenant_id,
                parent_id = %event.parent_id,
                success = false,
                "Attachment audit log - rejected"
            );
        }
    }
}
