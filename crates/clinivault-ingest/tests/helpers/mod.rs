pub mod fixtures;

use async_trait::async_trait;
use clinivault_core::{AuditEvent, AuditSink, ServerSideEncryption, UploadLimits};
use clinivault_ingest::{AttachmentPipeline, InMemoryQuotaStore};
use clinivault_storage::{MemoryStorage, StorageGateway};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Audit sink that keeps every event for inspection
#[derive(Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, event: &AuditEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Pipeline wired to in-memory collaborators
pub struct TestPipeline {
    pub pipeline: AttachmentPipeline,
    pub storage: Arc<MemoryStorage>,
    pub quota: Arc<InMemoryQuotaStore>,
    pub audit: Arc<RecordingAuditSink>,
    pub tenant_id: Uuid,
    pub parent_id: Uuid,
}

pub fn setup_pipeline() -> TestPipeline {
    setup_pipeline_with(MemoryStorage::new(), UploadLimits::default())
}

pub fn setup_pipeline_with(storage: MemoryStorage, limits: UploadLimits) -> TestPipeline {
    let storage = Arc::new(storage);
    let quota = Arc::new(InMemoryQuotaStore::new());
    let audit = Arc::new(RecordingAuditSink::default());
    let gateway = StorageGateway::new(storage.clone(), ServerSideEncryption::Aes256);

    TestPipeline {
        pipeline: AttachmentPipeline::new(limits, quota.clone(), gateway, audit.clone()),
        storage,
        quota,
        audit,
        tenant_id: Uuid::new_v4(),
        parent_id: Uuid::new_v4(),
    }
}
