use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Which cumulative ceiling a denial refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaScope {
    ParentRecord,
    Tenant,
}

impl Display for QuotaScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            QuotaScope::ParentRecord => write!(f, "parent record"),
            QuotaScope::Tenant => write!(f, "tenant"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
    pub max_file_bytes: u64,
    pub max_parent_total_bytes: u64,
    pub max_tenant_total_bytes: Option<u64>,
}

/// Bytes currently held by non-deleted attachments (and live reservations)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub parent_total_bytes: u64,
    pub tenant_total_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDenial {
    FileTooLarge {
        size_bytes: u64,
        max_bytes: u64,
    },
    CumulativeExceeded {
        scope: QuotaScope,
        used_bytes: u64,
        requested_bytes: u64,
        limit_bytes: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Allow,
    Deny(QuotaDenial),
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allow)
    }
}

impl QuotaLimits {
    /// Single source of truth for both the fail-fast pre-check and the atomic reservation.
    pub fn evaluate(&self, usage: &QuotaUsage, size_bytes: u64) -> QuotaDecision {
        if size_bytes > self.max_file_bytes {
            return QuotaDecision::Deny(QuotaDenial::FileTooLarge {
                size_bytes,
                max_bytes: self.max_file_bytes,
            });
        }
        if usage.parent_total_bytes.saturating_add(size_bytes) > self.max_parent_total_bytes {
            return QuotaDecision::Deny(QuotaDenial::CumulativeExceeded {
                scope: QuotaScope::ParentRecord,
                used_bytes: usage.parent_total_bytes,
                requested_bytes: size_bytes,
                limit_bytes: self.max_parent_total_bytes,
            });
        }
        if let Some(limit) = self.max_tenant_total_bytes {
            if usage.tenant_total_bytes.saturating_add(size_bytes) > limit {
                return QuotaDecision::Deny(QuotaDenial::CumulativeExceeded {
                    scope: QuotaScope::Tenant,
                    used_bytes: usage.tenant_total_bytes,
                    requested_bytes: size_bytes,
                    limit_bytes: limit,
                });
            }
        }
        QuotaDecision::Allow
    }
}
