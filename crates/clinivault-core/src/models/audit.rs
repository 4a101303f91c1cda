use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::format::DetectedFormat;
use crate::error::RejectionReason;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    AttachmentIngested,
    AttachmentDeleted,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditOutcome {
    Verified,
    Rejected {
        reason: RejectionReason,
        error_kind: &'static str,
        stage: &'static str,
    },
}

/// One event per terminal pipeline outcome. Carries identifiers and sizes only,
/// never file content, filenames or extracted metadata values.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub tenant_id: Uuid,
    pub parent_id: Uuid,
    pub detected_format: Option<DetectedFormat>,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
    pub outcome: AuditOutcome,
}

impl AuditEvent {
    pub fn new(action: AuditAction, tenant_id: Uuid, parent_id: Uuid, size_bytes: u64) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            tenant_id,
            parent_id,
            detected_format: None,
            size_bytes,
            storage_key: None,
            outcome: AuditOutcome::Verified,
        }
    }

    pub fn with_format(mut self, format: DetectedFormat) -> Self {
        self.detected_format = Some(format);
        self
    }

    pub fn with_storage_key(mut self, key: String) -> Self {
        self.storage_key = Some(key);
        self
    }

    /// Mark as rejected
    pub fn with_rejection(
        mut self,
        reason: RejectionReason,
        error_kind: &'static str,
        stage: &'static str,
    ) -> Self {
        self.outcome = AuditOutcome::Rejected {
            reason,
            error_kind,
            stage,
        };
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, AuditOutcome::Verified)
    }
}
