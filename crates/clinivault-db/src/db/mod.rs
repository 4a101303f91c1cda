//! Database repositories for data access layer
//!
//! Quota bookkeeping and attachment metadata share one rule: every write that
//! touches a tenant's byte totals first takes that tenant's transaction-scoped
//! advisory lock, so concurrent uploads for the same tenant are serialised.

pub mod attachment;
pub mod quota;

pub use attachment::AttachmentRepository;
pub use quota::PgQuotaStore;

use anyhow::{Context, Result};
use clinivault_core::QuotaUsage;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool};
use std::time::Duration;
use uuid::Uuid;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const ACQUIRE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("No quota reservation covers {size_bytes} bytes for parent {parent_id}")]
    MissingReservation { parent_id: Uuid, size_bytes: u64 },

    #[error("Stored row is invalid: {0}")]
    InvalidRow(String),
}

/// Open a connection pool
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(ACQUIRE_TIMEOUT_SECS))
        .connect(database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    tracing::info!(max_connections, "PostgreSQL connection pool created");
    Ok(pool)
}

/// Apply the embedded schema migrations
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("Failed to run database migrations")?;
    Ok(())
}

/// Serialise quota writes for `tenant_id` until the surrounding transaction ends
pub(crate) async fn lock_tenant(conn: &mut PgConnection, tenant_id: Uuid) -> sqlx::Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::text))")
        .bind(tenant_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub(crate) async fn fetch_usage(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    parent_id: Uuid,
) -> sqlx::Result<QuotaUsage> {
    let (parent_total, tenant_total): (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COALESCE(SUM(reserved_bytes) FILTER (WHERE parent_id = $2), 0)::BIGINT,
            COALESCE(SUM(reserved_bytes), 0)::BIGINT
        FROM attachment_quota_usage
        WHERE tenant_id = $1
        "#,
    )
    .bind(tenant_id)
    .bind(parent_id)
    .fetch_one(conn)
    .await?;

    Ok(QuotaUsage {
        parent_total_bytes: parent_total.max(0) as u64,
        tenant_total_bytes: tenant_total.max(0) as u64,
    })
}

/// Subtract `size_bytes` from a parent's total. Returns false when the row is
/// missing or holds fewer bytes.
pub(crate) async fn decrement_usage(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    parent_id: Uuid,
    size_bytes: u64,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE attachment_quota_usage
        SET reserved_bytes = reserved_bytes - $3, updated_at = NOW()
        WHERE tenant_id = $1 AND parent_id = $2 AND reserved_bytes >= $3
        "#,
    )
    .bind(tenant_id)
    .bind(parent_id)
    .bind(to_db_bytes(size_bytes))
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub(crate) fn to_db_bytes(size_bytes: u64) -> i64 {
    i64::try_from(size_bytes).unwrap_or(i64::MAX)
}
