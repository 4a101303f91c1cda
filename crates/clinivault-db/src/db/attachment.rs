//! Attachment metadata repository: CRUD for the attachments table.

use chrono::{DateTime, Utc};
use clinivault_core::{AttachmentMetadataRecord, DetectedFormat, EncryptionProof, StorageKey};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use super::{decrement_usage, fetch_usage, lock_tenant, to_db_bytes, RepositoryError};

const SELECT_COLUMNS: &str = "id, tenant_id, parent_id, storage_key, filename, format, size_bytes, \
     sse_algorithm, sse_kms_key_id, integrity_tag, verified_at, created_at, deleted_at";

/// Row type for attachments table (for FromRow).
#[derive(Debug, sqlx::FromRow)]
pub struct AttachmentRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub parent_id: Uuid,
    pub storage_key: String,
    pub filename: String,
    pub format: String,
    pub size_bytes: i64,
    pub sse_algorithm: String,
    pub sse_kms_key_id: Option<String>,
    pub integrity_tag: String,
    pub verified_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<AttachmentRow> for AttachmentMetadataRecord {
    type Error = RepositoryError;

    fn try_from(row: AttachmentRow) -> Result<Self, Self::Error> {
        let storage_key: StorageKey = row
            .storage_key
            .parse()
            .map_err(|e: clinivault_core::InvalidStorageKey| {
                RepositoryError::InvalidRow(e.to_string())
            })?;
        let format: DetectedFormat = row
            .format
            .parse()
            .map_err(|_| RepositoryError::InvalidRow(format!("unknown format {}", row.format)))?;
        let size_bytes = u64::try_from(row.size_bytes)
            .map_err(|_| RepositoryError::InvalidRow("negative size".to_string()))?;

        Ok(AttachmentMetadataRecord {
            id: row.id,
            tenant_id: row.tenant_id,
            parent_id: row.parent_id,
            storage_key,
            filename: row.filename,
            format,
            size_bytes,
            encryption: EncryptionProof {
                algorithm: row.sse_algorithm,
                kms_key_id: row.sse_kms_key_id,
                verified_at: row.verified_at,
                integrity_tag: row.integrity_tag,
            },
            created_at: row.created_at,
            deleted_at: row.deleted_at,
        })
    }
}

/// Repository for attachments table.
#[derive(Clone)]
pub struct AttachmentRepository {
    pool: PgPool,
}

impl AttachmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert the record for a verified upload.
    ///
    /// Runs under the tenant lock and fails if the parent's running total no
    /// longer covers the record, i.e. the reservation made before upload is gone.
    #[tracing::instrument(
        skip(self, record),
        fields(db.table = "attachments", db.record_id = %record.id, size_bytes = record.size_bytes)
    )]
    pub async fn create(
        &self,
        record: &AttachmentMetadataRecord,
    ) -> Result<AttachmentMetadataRecord, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        lock_tenant(&mut tx, record.tenant_id).await?;

        let usage = fetch_usage(&mut tx, record.tenant_id, record.parent_id).await?;
        let (stored_bytes,): (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(size_bytes), 0)::BIGINT
            FROM attachments
            WHERE tenant_id = $1 AND parent_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(record.tenant_id)
        .bind(record.parent_id)
        .fetch_one(&mut *tx)
        .await?;

        let required = (stored_bytes.max(0) as u64).saturating_add(record.size_bytes);
        if usage.parent_total_bytes < required {
            return Err(RepositoryError::MissingReservation {
                parent_id: record.parent_id,
                size_bytes: record.size_bytes,
            });
        }

        let row: AttachmentRow = sqlx::query_as::<Postgres, AttachmentRow>(&format!(
            r#"
            INSERT INTO attachments (id, tenant_id, parent_id, storage_key, filename, format,
                size_bytes, sse_algorithm, sse_kms_key_id, integrity_tag, verified_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {}
            "#,
            SELECT_COLUMNS
        ))
        .bind(record.id)
        .bind(record.tenant_id)
        .bind(record.parent_id)
        .bind(record.storage_key.to_string())
        .bind(&record.filename)
        .bind(record.format.as_str())
        .bind(to_db_bytes(record.size_bytes))
        .bind(&record.encryption.algorithm)
        .bind(&record.encryption.kms_key_id)
        .bind(&record.encryption.integrity_tag)
        .bind(record.encryption.verified_at)
        .bind(record.created_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    /// Fetch a live attachment by key, scoped to `tenant_id`.
    #[tracing::instrument(skip(self), fields(db.table = "attachments", key = %key))]
    pub async fn find_by_key(
        &self,
        tenant_id: Uuid,
        key: &StorageKey,
    ) -> Result<Option<AttachmentMetadataRecord>, RepositoryError> {
        let row: Option<AttachmentRow> = sqlx::query_as::<Postgres, AttachmentRow>(&format!(
            "SELECT {} FROM attachments \
             WHERE tenant_id = $1 AND storage_key = $2 AND deleted_at IS NULL",
            SELECT_COLUMNS
        ))
        .bind(tenant_id)
        .bind(key.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(AttachmentMetadataRecord::try_from).transpose()
    }

    /// Mark an attachment deleted and give its bytes back to the quota, in one
    /// transaction. Returns the record as it was before deletion, or `None` if
    /// there was no live attachment under `key`.
    #[tracing::instrument(skip(self), fields(db.table = "attachments", key = %key))]
    pub async fn soft_delete(
        &self,
        tenant_id: Uuid,
        key: &StorageKey,
    ) -> Result<Option<AttachmentMetadataRecord>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        lock_tenant(&mut tx, tenant_id).await?;

        let row: Option<AttachmentRow> = sqlx::query_as::<Postgres, AttachmentRow>(&format!(
            "UPDATE attachments SET deleted_at = NOW() \
             WHERE tenant_id = $1 AND storage_key = $2 AND deleted_at IS NULL \
             RETURNING {}",
            SELECT_COLUMNS
        ))
        .bind(tenant_id)
        .bind(key.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let record = AttachmentMetadataRecord::try_from(row)?;

        if !decrement_usage(&mut tx, tenant_id, record.parent_id, record.size_bytes).await? {
            tracing::warn!(
                parent_id = %record.parent_id,
                size_bytes = record.size_bytes,
                "Quota total lower than deleted attachment, leaving it unchanged"
            );
        }

        tx.commit().await?;
        Ok(Some(record))
    }
}
