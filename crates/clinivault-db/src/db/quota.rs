//! Quota store backed by `attachment_quota_usage`.

use async_trait::async_trait;
use clinivault_core::{QuotaDecision, QuotaLimits, QuotaStore, QuotaStoreError, QuotaUsage};
use sqlx::PgPool;
use uuid::Uuid;

use super::{decrement_usage, fetch_usage, lock_tenant, to_db_bytes};

#[derive(Clone)]
pub struct PgQuotaStore {
    pool: PgPool,
}

impl PgQuotaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn backend(err: sqlx::Error) -> QuotaStoreError {
    QuotaStoreError::Backend(err.to_string())
}

#[async_trait]
impl QuotaStore for PgQuotaStore {
    #[tracing::instrument(skip(self), fields(db.table = "attachment_quota_usage"))]
    async fn usage(&self, tenant_id: Uuid, parent_id: Uuid) -> Result<QuotaUsage, QuotaStoreError> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        fetch_usage(&mut conn, tenant_id, parent_id)
            .await
            .map_err(backend)
    }

    #[tracing::instrument(skip(self, limits), fields(db.table = "attachment_quota_usage"))]
    async fn try_reserve(
        &self,
        tenant_id: Uuid,
        parent_id: Uuid,
        size_bytes: u64,
        limits: &QuotaLimits,
    ) -> Result<QuotaDecision, QuotaStoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        lock_tenant(&mut tx, tenant_id).await.map_err(backend)?;

        let usage = fetch_usage(&mut tx, tenant_id, parent_id)
            .await
            .map_err(backend)?;
        let decision = limits.evaluate(&usage, size_bytes);
        if !decision.is_allowed() {
            tx.rollback().await.map_err(backend)?;
            return Ok(decision);
        }

        sqlx::query(
            r#"
            INSERT INTO attachment_quota_usage (tenant_id, parent_id, reserved_bytes)
            VALUES ($1, $2, $3)
            ON CONFLICT (tenant_id, parent_id) DO UPDATE
            SET reserved_bytes = attachment_quota_usage.reserved_bytes + EXCLUDED.reserved_bytes,
                updated_at = NOW()
            "#,
        )
        .bind(tenant_id)
        .bind(parent_id)
        .bind(to_db_bytes(size_bytes))
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(QuotaDecision::Allow)
    }

    #[tracing::instrument(skip(self), fields(db.table = "attachment_quota_usage"))]
    async fn release(
        &self,
        tenant_id: Uuid,
        parent_id: Uuid,
        size_bytes: u64,
    ) -> Result<(), QuotaStoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        lock_tenant(&mut tx, tenant_id).await.map_err(backend)?;

        if !decrement_usage(&mut tx, tenant_id, parent_id, size_bytes)
            .await
            .map_err(backend)?
        {
            return Err(QuotaStoreError::Underflow { parent_id });
        }

        tx.commit().await.map_err(backend)?;
        Ok(())
    }
}
