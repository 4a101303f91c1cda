//! Quota accountant and an in-process quota store
//!
//! The accountant applies one set of ceilings twice: as a cheap read-only
//! check before any parsing, and as an atomic reservation right before upload.

use async_trait::async_trait;
use clinivault_core::{
    QuotaDecision, QuotaDenial, QuotaLimits, QuotaStore, QuotaStoreError, QuotaUsage,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Clone)]
pub struct QuotaAccountant {
    store: Arc<dyn QuotaStore>,
    limits: QuotaLimits,
}

impl QuotaAccountant {
    pub fn new(store: Arc<dyn QuotaStore>, limits: QuotaLimits) -> Self {
        Self { store, limits }
    }

    pub fn limits(&self) -> &QuotaLimits {
        &self.limits
    }

    /// Current totals for one parent record and its tenant
    pub async fn usage(
        &self,
        tenant_id: Uuid,
        parent_id: Uuid,
    ) -> Result<QuotaUsage, QuotaStoreError> {
        self.store.usage(tenant_id, parent_id).await
    }

    /// Read-only check against current usage. The per-file ceiling is decided
    /// without touching the store.
    pub async fn check(
        &self,
        tenant_id: Uuid,
        parent_id: Uuid,
        size_bytes: u64,
    ) -> Result<QuotaDecision, QuotaStoreError> {
        if size_bytes > self.limits.max_file_bytes {
            return Ok(QuotaDecision::Deny(QuotaDenial::FileTooLarge {
                size_bytes,
                max_bytes: self.limits.max_file_bytes,
            }));
        }
        let usage = self.store.usage(tenant_id, parent_id).await?;
        Ok(self.limits.evaluate(&usage, size_bytes))
    }

    /// Atomically check and add `size_bytes` to the parent and tenant totals.
    pub async fn reserve(
        &self,
        tenant_id: Uuid,
        parent_id: Uuid,
        size_bytes: u64,
    ) -> Result<QuotaDecision, QuotaStoreError> {
        let decision = self
            .store
            .try_reserve(tenant_id, parent_id, size_bytes, &self.limits)
            .await?;
        if decision.is_allowed() {
            tracing::debug!(%tenant_id, %parent_id, size_bytes, "Quota reserved");
        }
        Ok(decision)
    }

    /// Return reserved bytes. Failures are logged; the bytes then stay counted
    /// until the totals are reconciled.
    pub async fn release(&self, tenant_id: Uuid, parent_id: Uuid, size_bytes: u64) {
        match self.store.release(tenant_id, parent_id, size_bytes).await {
            Ok(()) => tracing::debug!(%tenant_id, %parent_id, size_bytes, "Quota released"),
            Err(e) => tracing::error!(
                %tenant_id,
                %parent_id,
                size_bytes,
                error = %e,
                "Failed to release quota reservation"
            ),
        }
    }
}

/// Quota store held in process memory, keyed by (tenant, parent).
///
/// A single lock covers read, check and add, which makes `try_reserve` atomic.
#[derive(Default)]
pub struct InMemoryQuotaStore {
    totals: Mutex<HashMap<(Uuid, Uuid), u64>>,
}

impl InMemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the stored total for one parent record
    pub async fn set_usage(&self, tenant_id: Uuid, parent_id: Uuid, bytes: u64) {
        self.totals.lock().await.insert((tenant_id, parent_id), bytes);
    }

    fn usage_of(
        totals: &HashMap<(Uuid, Uuid), u64>,
        tenant_id: Uuid,
        parent_id: Uuid,
    ) -> QuotaUsage {
        QuotaUsage {
            parent_total_bytes: totals.get(&(tenant_id, parent_id)).copied().unwrap_or(0),
            tenant_total_bytes: totals
                .iter()
                .filter(|((tenant, _), _)| *tenant == tenant_id)
                .map(|(_, bytes)| *bytes)
                .sum(),
        }
    }
}

#[async_trait]
impl QuotaStore for InMemoryQuotaStore {
    async fn usage(&self, tenant_id: Uuid, parent_id: Uuid) -> Result<QuotaUsage, QuotaStoreError> {
        let totals = self.totals.lock().await;
        Ok(Self::usage_of(&totals, tenant_id, parent_id))
    }

    async fn try_reserve(
        &self,
        tenant_id: Uuid,
        parent_id: Uuid,
        size_bytes: u64,
        limits: &QuotaLimits,
    ) -> Result<QuotaDecision, QuotaStoreError> {
        let mut totals = self.totals.lock().await;
        let decision = limits.evaluate(&Self::usage_of(&totals, tenant_id, parent_id), size_bytes);
        if decision.is_allowed() {
            *totals.entry((tenant_id, parent_id)).or_insert(0) += size_bytes;
        }
        Ok(decision)
    }

    async fn release(
        &self,
        tenant_id: Uuid,
        parent_id: Uuid,
        size_bytes: u64,
    ) -> Result<(), QuotaStoreError> {
        let mut totals = self.totals.lock().await;
        let total = totals
            .get_mut(&(tenant_id, parent_id))
            .filter(|total| **total >= size_bytes)
            .ok_or(QuotaStoreError::Underflow { parent_id })?;
        *total -= size_bytes;
        Ok(())
    }
}
