//! Wiring for the `clinivault` command-line tool.
//!
//! Builds the pipeline from configuration. With `DATABASE_URL` set, quota totals
//! and attachment records live in PostgreSQL; without it, quota is tracked in
//! memory for the lifetime of the process.

use anyhow::{Context, Result};
use clinivault_core::{
    AttachmentConfig, AttachmentMetadataRecord, QuotaStore, StorageKey, UploadCandidate,
};
use clinivault_db::{AttachmentRepository, PgQuotaStore};
use clinivault_ingest::{AttachmentPipeline, DeleteMode, InMemoryQuotaStore, TracingAuditSink};
use clinivault_storage::{create_storage, StorageGateway};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

pub struct Services {
    pub pipeline: AttachmentPipeline,
    pub repository: Option<AttachmentRepository>,
}

#[derive(Debug, Serialize)]
pub struct IngestOutput {
    pub storage_key: String,
    pub filename: String,
    pub format: String,
    pub size_bytes: u64,
    pub encryption: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<uuid::Uuid>,
}

#[derive(Debug, Serialize)]
pub struct DeleteOutput {
    pub storage_key: String,
    pub record_deleted: bool,
}

pub async fn build_services(config: &AttachmentConfig) -> Result<Services> {
    let storage = create_storage(&config.storage)
        .await
        .context("Failed to initialize object storage")?;
    let gateway = StorageGateway::from_config(storage, &config.storage);

    let (quota_store, repository) = match &config.database_url {
        Some(url) => {
            let pool = clinivault_db::connect(url, config.db_max_connections).await?;
            clinivault_db::run_migrations(&pool).await?;
            let store: Arc<dyn QuotaStore> = Arc::new(PgQuotaStore::new(pool.clone()));
            (store, Some(AttachmentRepository::new(pool)))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, quota totals are kept in memory only");
            let store: Arc<dyn QuotaStore> = Arc::new(InMemoryQuotaStore::new());
            (store, None)
        }
    };

    let pipeline = AttachmentPipeline::new(
        config.limits.clone(),
        quota_store,
        gateway,
        Arc::new(TracingAuditSink),
    );

    Ok(Services {
        pipeline,
        repository,
    })
}

/// Run one upload and, when a database is configured, persist its record.
///
/// If the record cannot be written, the object is purged and its reservation
/// released so storage and metadata stay in step.
pub async fn ingest(services: &Services, candidate: UploadCandidate) -> Result<IngestOutput> {
    let stored = services.pipeline.ingest(candidate).await?;

    let mut output = IngestOutput {
        storage_key: stored.storage_key.to_string(),
        filename: stored.filename.clone(),
        format: stored.format.to_string(),
        size_bytes: stored.size_bytes,
        encryption: stored.encryption.algorithm.clone(),
        record_id: None,
    };

    if let Some(repository) = &services.repository {
        let key = stored.storage_key.clone();
        let size_bytes = stored.size_bytes;
        match repository
            .create(&AttachmentMetadataRecord::from_stored(stored))
            .await
        {
            Ok(record) => output.record_id = Some(record.id),
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Failed to persist attachment record");
                if let Err(delete_err) = services
                    .pipeline
                    .delete(&key, size_bytes, DeleteMode::Purge)
                    .await
                {
                    tracing::error!(key = %key, error = %delete_err, "Cleanup delete failed");
                }
                return Err(e).context("Failed to persist attachment record");
            }
        }
    }

    Ok(output)
}

/// Issue a read URL. With a database, only live records of the key's tenant qualify.
pub async fn presign(
    services: &Services,
    key: &StorageKey,
    ttl: Option<Duration>,
) -> Result<String> {
    if let Some(repository) = &services.repository {
        if repository.find_by_key(key.tenant_id(), key).await?.is_none() {
            anyhow::bail!("No attachment stored under {}", key);
        }
    }

    let url = services
        .pipeline
        .gateway()
        .issue_temporary_read_url(key, ttl)
        .await?;
    Ok(url)
}

/// Delete an attachment. Repeating a delete succeeds.
///
/// With a database the record is soft-deleted (releasing its quota) and the
/// object is kept for the retention process. Without one there is no record
/// to keep, so the object is purged.
pub async fn delete(services: &Services, key: &StorageKey) -> Result<DeleteOutput> {
    let Some(repository) = &services.repository else {
        let gateway = services.pipeline.gateway();
        let size_bytes = gateway.object_size(key).await?.unwrap_or(0);
        services
            .pipeline
            .delete(key, size_bytes, DeleteMode::Purge)
            .await?;
        return Ok(DeleteOutput {
            storage_key: key.to_string(),
            record_deleted: false,
        });
    };

    let record = repository.soft_delete(key.tenant_id(), key).await?;
    let size_bytes = record.as_ref().map_or(0, |r| r.size_bytes);
    services
        .pipeline
        .delete(key, size_bytes, DeleteMode::Retain)
        .await?;

    Ok(DeleteOutput {
        storage_key: key.to_string(),
        record_deleted: record.is_some(),
    })
}
