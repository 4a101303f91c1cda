//! Pipeline orchestrator
//!
//! One run per upload, moving through
//! `Received → SizeChecked → FormatDetected → ContentValidated → Sanitized →
//! KeyAssigned → Uploaded → Verified`. Any step may end the run in `Rejected`;
//! the rejection records the last state reached. Nothing is retried.
//!
//! Parsing and re-encoding run on the blocking pool. Upload, verification and
//! the quota release on failure run in a spawned task so they complete even if
//! the caller stops waiting.

use clinivault_core::{
    AuditAction, AuditEvent, AuditSink, DetectedFormat, EncryptionProof, ErrorMetadata, LogLevel,
    PipelineError, QuotaDecision, QuotaStore, QuotaStoreError, RejectionReason, SanitizedFile,
    StorageKey, StoredAttachment, UploadCandidate, UploadLimits,
};
use clinivault_processing::{
    check_declared, inspect_image_metadata, inspect_pdf_metadata, sanitize, sniff, validate,
    MetadataReport, ValidatedContent,
};
use clinivault_storage::{build_key, StorageGateway};
use serde::Serialize;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::quota::QuotaAccountant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Received,
    SizeChecked,
    FormatDetected,
    ContentValidated,
    Sanitized,
    KeyAssigned,
    Uploaded,
    Verified,
    Rejected,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Received => "received",
            PipelineState::SizeChecked => "size_checked",
            PipelineState::FormatDetected => "format_detected",
            PipelineState::ContentValidated => "content_validated",
            PipelineState::Sanitized => "sanitized",
            PipelineState::KeyAssigned => "key_assigned",
            PipelineState::Uploaded => "uploaded",
            PipelineState::Verified => "verified",
            PipelineState::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Verified | PipelineState::Rejected)
    }
}

impl Display for PipelineState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of a run
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Upload rejected after {stage}: {error}")]
pub struct PipelineRejection {
    /// Last state reached before the failing step
    pub stage: PipelineState,
    pub error: PipelineError,
    /// Validator error kind (`EmptyDocument`, `ResourceLimitExceeded`, ...) when
    /// the content failed validation. Internal only.
    pub validation_error: Option<&'static str>,
}

impl PipelineRejection {
    pub fn reason(&self) -> RejectionReason {
        self.error.rejection_reason()
    }

    /// Message safe to show the uploader
    pub fn client_message(&self) -> String {
        self.error.client_message()
    }
}

struct Progress {
    tenant_id: Uuid,
    parent_id: Uuid,
    state: PipelineState,
    format: Option<DetectedFormat>,
}

impl Progress {
    fn new(tenant_id: Uuid, parent_id: Uuid) -> Self {
        Self {
            tenant_id,
            parent_id,
            state: PipelineState::Received,
            format: None,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        tracing::debug!(
            tenant_id = %self.tenant_id,
            parent_id = %self.parent_id,
            from = %self.state,
            to = %next,
            "Pipeline state transition"
        );
        self.state = next;
    }

    fn reject(&self, error: PipelineError) -> PipelineRejection {
        PipelineRejection {
            stage: self.state,
            error,
            validation_error: None,
        }
    }
}

/// Failure inside the blocking processing step
struct ProcessFailure {
    reached: PipelineState,
    error: PipelineError,
    validation_error: Option<&'static str>,
}

/// What happens to the stored object when an attachment is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Remove the object and give its bytes back to the quota. For deployments
    /// without a metadata store, and for cleaning up an upload whose record
    /// could not be written.
    Purge,
    /// Keep the object for the retention process. The metadata store has
    /// already soft-deleted the record and released its bytes.
    Retain,
}

#[derive(Clone)]
pub struct AttachmentPipeline {
    limits: UploadLimits,
    quota: QuotaAccountant,
    gateway: StorageGateway,
    audit: Arc<dyn AuditSink>,
}

impl AttachmentPipeline {
    pub fn new(
        limits: UploadLimits,
        quota_store: Arc<dyn QuotaStore>,
        gateway: StorageGateway,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let quota = QuotaAccountant::new(quota_store, limits.quota_limits());
        Self {
            limits,
            quota,
            gateway,
            audit,
        }
    }

    pub fn gateway(&self) -> &StorageGateway {
        &self.gateway
    }

    pub fn quota(&self) -> &QuotaAccountant {
        &self.quota
    }

    /// Run one upload to a verified, encrypted object or a rejection.
    ///
    /// Exactly one audit event is recorded per call.
    pub async fn ingest(
        &self,
        candidate: UploadCandidate,
    ) -> Result<StoredAttachment, PipelineRejection> {
        let start = Instant::now();
        let mut progress = Progress::new(candidate.tenant_id, candidate.parent_id);

        let result = self.run(&candidate, &mut progress).await;

        let mut event = AuditEvent::new(
            AuditAction::AttachmentIngested,
            candidate.tenant_id,
            candidate.parent_id,
            candidate.size_bytes(),
        );
        if let Some(format) = progress.format {
            event = event.with_format(format);
        }

        match &result {
            Ok(stored) => {
                progress.advance(PipelineState::Verified);
                tracing::info!(
                    tenant_id = %candidate.tenant_id,
                    parent_id = %candidate.parent_id,
                    key = %stored.storage_key,
                    format = %stored.format,
                    size_bytes = stored.size_bytes,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Attachment ingested"
                );
                event.size_bytes = stored.size_bytes;
                event = event.with_storage_key(stored.storage_key.to_string());
            }
            Err(rejection) => {
                log_rejection(&progress, rejection, candidate.size_bytes());
                progress.advance(PipelineState::Rejected);
                event = event.with_rejection(
                    rejection.reason(),
                    rejection.error.kind(),
                    rejection.stage.as_str(),
                );
            }
        }

        self.audit.record(&event).await;
        result
    }

    async fn run(
        &self,
        candidate: &UploadCandidate,
        progress: &mut Progress,
    ) -> Result<StoredAttachment, PipelineRejection> {
        let (tenant_id, parent_id) = (candidate.tenant_id, candidate.parent_id);

        // Fail fast before any parsing
        enforce(
            self.quota
                .check(tenant_id, parent_id, candidate.size_bytes())
                .await,
        )
        .map_err(|e| progress.reject(e))?;
        progress.advance(PipelineState::SizeChecked);

        let format = sniff(&candidate.data);
        if format.is_recognized() {
            progress.format = Some(format);
        }
        if !self.limits.is_allowed(format) {
            return Err(progress.reject(PipelineError::UnrecognizedFormat(format.to_string())));
        }
        check_declared(
            format,
            &candidate.declared_filename,
            candidate.declared_content_type.as_deref(),
        )
        .map_err(|e| progress.reject(e.into()))?;
        progress.advance(PipelineState::FormatDetected);

        let data = candidate.data.clone();
        let limits = self.limits.clone();
        let declared_filename = candidate.declared_filename.clone();
        let processed = tokio::task::spawn_blocking(move || {
            process(&data, format, &limits, &declared_filename)
        })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Processing task failed");
            progress.reject(PipelineError::CorruptedContent(
                "processing task aborted".to_string(),
            ))
        })?;

        let (sanitized, stripped) = match processed {
            Ok(output) => output,
            Err(failure) => {
                if failure.reached != progress.state {
                    progress.advance(failure.reached);
                }
                let mut rejection = progress.reject(failure.error);
                rejection.validation_error = failure.validation_error;
                return Err(rejection);
            }
        };
        progress.advance(PipelineState::ContentValidated);
        if !stripped.is_clean() {
            tracing::debug!(
                tenant_id = %tenant_id,
                parent_id = %parent_id,
                categories = ?stripped.categories(),
                other_exif_fields = stripped.other_exif_fields,
                "Metadata stripped"
            );
        }
        progress.advance(PipelineState::Sanitized);

        // Re-encoding can grow a file past the ceiling
        let size_bytes = sanitized.size_bytes();
        if size_bytes > self.limits.max_file_size_bytes {
            return Err(progress.reject(PipelineError::OversizeFile {
                size_bytes,
                max_bytes: self.limits.max_file_size_bytes,
            }));
        }

        let key = build_key(tenant_id, parent_id, format)
            .map_err(|e| progress.reject(PipelineError::StorageUploadFailure(e.to_string())))?;
        progress.advance(PipelineState::KeyAssigned);

        enforce(self.quota.reserve(tenant_id, parent_id, size_bytes).await)
            .map_err(|e| progress.reject(e))?;

        let filename = sanitized.filename.clone();
        let encryption = self
            .upload_detached(sanitized, key.clone())
            .await
            .map_err(|e| {
                // The put landed; verification is what failed
                if matches!(e, PipelineError::EncryptionVerificationFailed(_)) {
                    progress.advance(PipelineState::Uploaded);
                }
                progress.reject(e)
            })?;
        progress.advance(PipelineState::Uploaded);

        Ok(StoredAttachment {
            storage_key: key,
            encryption,
            filename,
            format,
            size_bytes,
        })
    }

    /// Upload and verify in a task of its own. A failed upload gives its quota
    /// reservation back before the task ends.
    async fn upload_detached(
        &self,
        file: SanitizedFile,
        key: StorageKey,
    ) -> Result<EncryptionProof, PipelineError> {
        let gateway = self.gateway.clone();
        let quota = self.quota.clone();
        let (tenant_id, parent_id, size_bytes) =
            (key.tenant_id(), key.parent_id(), file.size_bytes());

        let task = tokio::spawn(async move {
            let result = gateway.upload(&file, &key).await;
            if result.is_err() {
                quota.release(tenant_id, parent_id, size_bytes).await;
            }
            result
        });

        match task.await {
            Ok(result) => result.map_err(PipelineError::from),
            Err(e) => {
                tracing::error!(error = %e, "Upload task failed");
                Err(PipelineError::StorageUploadFailure(
                    "upload task aborted".to_string(),
                ))
            }
        }
    }

    /// Delete a stored attachment. Repeating a delete succeeds.
    ///
    /// `Purge` removes the object and releases its bytes only when an object
    /// was actually there, so a repeated purge never releases twice. `Retain`
    /// leaves both object and quota alone and only records the deletion.
    pub async fn delete(
        &self,
        key: &StorageKey,
        size_bytes: u64,
        mode: DeleteMode,
    ) -> Result<(), PipelineError> {
        let result = match mode {
            DeleteMode::Retain => Ok(()),
            DeleteMode::Purge => match self.gateway.delete(key).await {
                Ok(removed) => {
                    if removed {
                        self.quota
                            .release(key.tenant_id(), key.parent_id(), size_bytes)
                            .await;
                    }
                    Ok(())
                }
                Err(e) => Err(PipelineError::from(e)),
            },
        };

        let mut event = AuditEvent::new(
            AuditAction::AttachmentDeleted,
            key.tenant_id(),
            key.parent_id(),
            size_bytes,
        )
        .with_storage_key(key.to_string());
        if let Some(format) = DetectedFormat::from_extension(key.extension()) {
            event = event.with_format(format);
        }
        match &result {
            Ok(()) => tracing::info!(key = %key, mode = ?mode, size_bytes, "Attachment deleted"),
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Attachment delete failed");
                event = event.with_rejection(e.rejection_reason(), e.kind(), "delete");
            }
        }

        self.audit.record(&event).await;
        result
    }
}

/// Validate, inspect and sanitize. On failure, reports the last state reached.
fn process(
    data: &[u8],
    format: DetectedFormat,
    limits: &UploadLimits,
    declared_filename: &str,
) -> Result<(SanitizedFile, MetadataReport), ProcessFailure> {
    let validated = validate(data, format, limits).map_err(|e| {
        tracing::debug!(
            validation_error = e.kind(),
            format = %format,
            size_bytes = data.len(),
            error = %e,
            "Content failed validation"
        );
        ProcessFailure {
            reached: PipelineState::FormatDetected,
            validation_error: Some(e.kind()),
            error: PipelineError::from(e),
        }
    })?;

    let found = match &validated {
        ValidatedContent::Image { .. } => inspect_image_metadata(data, format),
        ValidatedContent::Pdf { document, .. } => inspect_pdf_metadata(document),
    };

    let sanitized = sanitize(validated, declared_filename, limits.image_quality).map_err(|e| {
        ProcessFailure {
            reached: PipelineState::ContentValidated,
            validation_error: None,
            error: PipelineError::from(e),
        }
    })?;

    Ok((sanitized, found))
}

fn enforce(decision: Result<QuotaDecision, QuotaStoreError>) -> Result<(), PipelineError> {
    match decision {
        Ok(QuotaDecision::Allow) => Ok(()),
        Ok(QuotaDecision::Deny(denial)) => Err(denial.into()),
        Err(e) => Err(PipelineError::QuotaUnavailable(e.to_string())),
    }
}

fn log_rejection(progress: &Progress, rejection: &PipelineRejection, size_bytes: u64) {
    let error = &rejection.error;
    let format = progress.format.map(|f| f.as_str()).unwrap_or("unknown");

    match error.log_level() {
        LogLevel::Debug => tracing::debug!(
            tenant_id = %progress.tenant_id,
            parent_id = %progress.parent_id,
            stage = %rejection.stage,
            error_kind = error.kind(),
            validation_error = rejection.validation_error,
            format,
            size_bytes,
            error = %error,
            "Upload rejected"
        ),
        LogLevel::Warn => tracing::warn!(
            tenant_id = %progress.tenant_id,
            parent_id = %progress.parent_id,
            stage = %rejection.stage,
            error_kind = error.kind(),
            validation_error = rejection.validation_error,
            format,
            size_bytes,
            error = %error,
            "Upload rejected"
        ),
        LogLevel::Error => tracing::error!(
            tenant_id = %progress.tenant_id,
            parent_id = %progress.parent_id,
            stage = %rejection.stage,
            error_kind = error.kind(),
            validation_error = rejection.validation_error,
            format,
            size_bytes,
            error = %error,
            "Upload rejected"
        ),
    }
}
