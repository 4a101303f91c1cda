mod helpers;

use clinivault_core::{
    AuditAction, AuditOutcome, DetectedFormat, PipelineError, QuotaScope, QuotaStore,
    RejectionReason, ServerSideEncryption, UploadCandidate, UploadLimits,
};
use clinivault_ingest::{AttachmentPipeline, DeleteMode, InMemoryQuotaStore, PipelineState};
use clinivault_processing::inspect_image_metadata;
use clinivault_processing::sanitizer::verify_clean;
use clinivault_storage::{MemoryStorage, StorageGateway};
use helpers::fixtures;
use helpers::{setup_pipeline, setup_pipeline_with, RecordingAuditSink, TestPipeline};
use std::sync::Arc;
use uuid::Uuid;

const MB: u64 = 1024 * 1024;

fn candidate(
    app: &TestPipeline,
    data: Vec<u8>,
    name: &str,
    content_type: Option<&str>,
) -> UploadCandidate {
    UploadCandidate::new(
        data,
        name,
        content_type.map(str::to_string),
        app.tenant_id,
        app.parent_id,
    )
}

async fn parent_usage(app: &TestPipeline) -> u64 {
    app.quota
        .usage(app.tenant_id, app.parent_id)
        .await
        .unwrap()
        .parent_total_bytes
}

#[tokio::test]
async fn test_jpeg_upload_strips_exif_and_verifies_encryption() {
    let app = setup_pipeline();
    let original = fixtures::jpeg_with_gps(2000, 1500);
    assert!(inspect_image_metadata(&original, DetectedFormat::Jpeg).gps);

    let stored = app
        .pipeline
        .ingest(candidate(&app, original, "../../IMG_0001.jpg", Some("image/jpeg")))
        .await
        .unwrap();

    assert_eq!(stored.format, DetectedFormat::Jpeg);
    assert_eq!(stored.filename, "IMG_0001.jpg");
    assert_eq!(stored.encryption.algorithm, "AES256");
    assert!(!stored.encryption.integrity_tag.is_empty());

    let key = stored.storage_key.to_string();
    assert!(key.starts_with(&format!("{}/{}/", app.tenant_id, app.parent_id)));
    assert!(key.ends_with(".jpg"));
    assert!(!key.contains("IMG_0001"));

    let object = app.storage.get(&key).await.unwrap();
    assert_eq!(object.len() as u64, stored.size_bytes);
    assert!(inspect_image_metadata(&object, DetectedFormat::Jpeg).is_clean());
    assert!(verify_clean(DetectedFormat::Jpeg, &object).is_ok());
    assert_eq!(app.storage.content_type(&key).await.as_deref(), Some("image/jpeg"));

    let decoded = image::load_from_memory(&object).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (2000, 1500));

    assert_eq!(parent_usage(&app).await, stored.size_bytes);

    let events = app.audit.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, AuditAction::AttachmentIngested);
    assert!(events[0].is_success());
    assert_eq!(events[0].detected_format, Some(DetectedFormat::Jpeg));
    assert_eq!(events[0].storage_key.as_deref(), Some(key.as_str()));
    assert_eq!(events[0].size_bytes, stored.size_bytes);
}

#[tokio::test]
async fn test_png_text_chunks_removed() {
    let app = setup_pipeline();

    let stored = app
        .pipeline
        .ingest(candidate(&app, fixtures::png_with_text(64, 48), "chart.png", None))
        .await
        .unwrap();

    let object = app.storage.get(&stored.storage_key.to_string()).await.unwrap();
    let report = inspect_image_metadata(&object, DetectedFormat::Png);
    assert!(!report.free_text);
    assert!(!report.timestamps);
    assert!(verify_clean(DetectedFormat::Png, &object).is_ok());
}

#[tokio::test]
async fn test_pdf_info_dictionary_removed() {
    let app = setup_pipeline();

    let stored = app
        .pipeline
        .ingest(candidate(
            &app,
            fixtures::pdf_with_info(3),
            "discharge letter.pdf",
            Some("application/pdf"),
        ))
        .await
        .unwrap();

    assert_eq!(stored.filename, "discharge letter.pdf");
    let object = app.storage.get(&stored.storage_key.to_string()).await.unwrap();
    let document = lopdf::Document::load_mem(&object).unwrap();
    assert!(!document.trailer.has(b"Info"));
    assert_eq!(document.get_pages().len(), 3);
    assert!(verify_clean(DetectedFormat::Pdf, &object).is_ok());
}

#[tokio::test]
async fn test_pdf_named_jpg_is_format_mismatch() {
    let app = setup_pipeline();

    let rejection = app
        .pipeline
        .ingest(candidate(&app, fixtures::pdf_with_info(1), "photo.jpg", None))
        .await
        .unwrap_err();

    assert!(matches!(
        rejection.error,
        PipelineError::FormatMismatch {
            detected: DetectedFormat::Pdf,
            ..
        }
    ));
    assert_eq!(rejection.stage, PipelineState::SizeChecked);
    assert_eq!(rejection.reason(), RejectionReason::FileTypeMismatch);
    assert_eq!(app.storage.object_count().await, 0);
    assert_eq!(parent_usage(&app).await, 0);

    let events = app.audit.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].detected_format, Some(DetectedFormat::Pdf));
    assert_eq!(
        events[0].outcome,
        AuditOutcome::Rejected {
            reason: RejectionReason::FileTypeMismatch,
            error_kind: "FormatMismatch",
            stage: "size_checked",
        }
    );
}

#[tokio::test]
async fn test_script_is_unrecognized() {
    let app = setup_pipeline();

    let rejection = app
        .pipeline
        .ingest(candidate(&app, fixtures::php_script(), "avatar.jpg", Some("image/jpeg")))
        .await
        .unwrap_err();

    assert!(matches!(rejection.error, PipelineError::UnrecognizedFormat(_)));
    assert_eq!(rejection.reason(), RejectionReason::UnsupportedFileType);
    assert_eq!(app.audit.events()[0].detected_format, None);
    assert_eq!(app.storage.object_count().await, 0);
}

#[tokio::test]
async fn test_disallowed_format_is_unrecognized() {
    let limits = UploadLimits {
        allowed_formats: vec![DetectedFormat::Pdf],
        ..UploadLimits::default()
    };
    let app = setup_pipeline_with(MemoryStorage::new(), limits);

    let rejection = app
        .pipeline
        .ingest(candidate(&app, fixtures::plain_png(8, 8), "a.png", None))
        .await
        .unwrap_err();

    assert!(matches!(rejection.error, PipelineError::UnrecognizedFormat(_)));
}

#[tokio::test]
async fn test_oversize_file_rejected_before_parsing() {
    let limits = UploadLimits {
        max_file_size_bytes: 1024,
        ..UploadLimits::default()
    };
    let app = setup_pipeline_with(MemoryStorage::new(), limits);

    let rejection = app
        .pipeline
        .ingest(candidate(&app, fixtures::jpeg_with_gps(200, 200), "big.jpg", None))
        .await
        .unwrap_err();

    assert!(matches!(
        rejection.error,
        PipelineError::OversizeFile { max_bytes: 1024, .. }
    ));
    assert_eq!(rejection.stage, PipelineState::Received);
    assert_eq!(rejection.reason(), RejectionReason::FileTooLarge);
    // Nothing was parsed, so no format is known
    assert_eq!(app.audit.events()[0].detected_format, None);
}

#[tokio::test]
async fn test_cumulative_parent_ceiling() {
    let app = setup_pipeline();
    app.quota
        .set_usage(app.tenant_id, app.parent_id, 50 * MB - 64)
        .await;

    let rejection = app
        .pipeline
        .ingest(candidate(&app, fixtures::plain_png(32, 32), "a.png", None))
        .await
        .unwrap_err();

    match rejection.error {
        PipelineError::OversizeCumulative {
            scope,
            used_bytes,
            limit_bytes,
            ..
        } => {
            assert_eq!(scope, QuotaScope::ParentRecord);
            assert_eq!(used_bytes, 50 * MB - 64);
            assert_eq!(limit_bytes, 50 * MB);
        }
        other => panic!("expected OversizeCumulative, got {:?}", other),
    }
    assert_eq!(rejection.reason(), RejectionReason::QuotaExceeded);
    assert_eq!(parent_usage(&app).await, 50 * MB - 64);
}

#[tokio::test]
async fn test_truncated_jpeg_is_corrupted() {
    let app = setup_pipeline();

    let rejection = app
        .pipeline
        .ingest(candidate(&app, fixtures::truncated_jpeg(), "x.jpg", None))
        .await
        .unwrap_err();

    assert!(matches!(rejection.error, PipelineError::CorruptedContent(_)));
    assert_eq!(rejection.stage, PipelineState::FormatDetected);
    assert_eq!(rejection.reason(), RejectionReason::UnprocessableFile);
}

#[tokio::test]
async fn test_pdf_without_pages_is_corrupted() {
    let app = setup_pipeline();

    let rejection = app
        .pipeline
        .ingest(candidate(&app, fixtures::pdf_with_info(0), "empty.pdf", None))
        .await
        .unwrap_err();

    assert!(matches!(rejection.error, PipelineError::CorruptedContent(_)));
    assert_eq!(rejection.validation_error, Some("EmptyDocument"));
    assert_eq!(app.storage.object_count().await, 0);
}

#[tokio::test]
async fn test_pixel_ceiling_is_resource_limit() {
    let limits = UploadLimits {
        max_pixels: 100,
        ..UploadLimits::default()
    };
    let app = setup_pipeline_with(MemoryStorage::new(), limits);

    let rejection = app
        .pipeline
        .ingest(candidate(&app, fixtures::plain_png(16, 16), "scan.png", None))
        .await
        .unwrap_err();

    assert!(matches!(rejection.error, PipelineError::ResourceLimitExceeded(_)));
    assert_eq!(rejection.validation_error, Some("ResourceLimitExceeded"));
    assert_eq!(rejection.stage, PipelineState::FormatDetected);
    assert_eq!(app.storage.object_count().await, 0);
    assert_eq!(parent_usage(&app).await, 0);

    let events = app.audit.events();
    assert_eq!(events.len(), 1);
    assert!(!events[0].is_success());
}

#[tokio::test]
async fn test_page_ceiling_is_resource_limit() {
    let limits = UploadLimits {
        max_pdf_pages: 2,
        ..UploadLimits::default()
    };
    let app = setup_pipeline_with(MemoryStorage::new(), limits);

    let rejection = app
        .pipeline
        .ingest(candidate(&app, fixtures::pdf_with_info(3), "notes.pdf", None))
        .await
        .unwrap_err();

    assert!(matches!(rejection.error, PipelineError::ResourceLimitExceeded(_)));
    assert_eq!(rejection.validation_error, Some("ResourceLimitExceeded"));
    assert_eq!(app.storage.object_count().await, 0);
    assert_eq!(parent_usage(&app).await, 0);
}

#[tokio::test]
async fn test_format_rejection_has_no_validation_kind() {
    let app = setup_pipeline();

    let rejection = app
        .pipeline
        .ingest(candidate(&app, fixtures::php_script(), "a.jpg", None))
        .await
        .unwrap_err();

    assert_eq!(rejection.validation_error, None);
}

#[tokio::test]
async fn test_unencrypted_object_is_deleted_and_quota_released() {
    let app = setup_pipeline_with(
        MemoryStorage::new().ignoring_encryption(),
        UploadLimits::default(),
    );

    let rejection = app
        .pipeline
        .ingest(candidate(&app, fixtures::plain_png(16, 16), "scan.png", None))
        .await
        .unwrap_err();

    assert!(matches!(
        rejection.error,
        PipelineError::EncryptionVerificationFailed(_)
    ));
    assert_eq!(rejection.stage, PipelineState::Uploaded);
    assert_eq!(rejection.reason(), RejectionReason::StorageUnavailable);
    assert_eq!(app.storage.object_count().await, 0);
    assert_eq!(parent_usage(&app).await, 0);

    let events = app.audit.events();
    assert_eq!(events.len(), 1);
    assert!(!events[0].is_success());
    assert_eq!(events[0].storage_key, None);
}

#[tokio::test]
async fn test_kms_key_mismatch_rejected() {
    let storage = Arc::new(
        MemoryStorage::new().reporting_kms_key("arn:aws:kms:eu-west-1:111122223333:key/other"),
    );
    let audit = Arc::new(RecordingAuditSink::default());
    let gateway = StorageGateway::new(
        storage.clone(),
        ServerSideEncryption::AwsKms {
            key_id: Some("clinical-attachments".to_string()),
        },
    );
    let pipeline = AttachmentPipeline::new(
        UploadLimits::default(),
        Arc::new(InMemoryQuotaStore::new()),
        gateway,
        audit.clone(),
    );

    let rejection = pipeline
        .ingest(UploadCandidate::new(
            fixtures::plain_png(16, 16),
            "scan.png",
            None,
            Uuid::new_v4(),
            Uuid::new_v4(),
        ))
        .await
        .unwrap_err();

    assert!(matches!(
        rejection.error,
        PipelineError::EncryptionVerificationFailed(_)
    ));
    assert_eq!(storage.object_count().await, 0);
    assert_eq!(audit.events().len(), 1);
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let app = setup_pipeline();
    let stored = app
        .pipeline
        .ingest(candidate(&app, fixtures::plain_png(16, 16), "scan.png", None))
        .await
        .unwrap();
    let kept = app
        .pipeline
        .ingest(candidate(&app, fixtures::plain_png(24, 24), "other.png", None))
        .await
        .unwrap();
    assert_eq!(parent_usage(&app).await, stored.size_bytes + kept.size_bytes);

    app.pipeline
        .delete(&stored.storage_key, stored.size_bytes, DeleteMode::Purge)
        .await
        .unwrap();
    assert!(!app.storage.contains(&stored.storage_key.to_string()).await);
    assert_eq!(parent_usage(&app).await, kept.size_bytes);

    // A repeated purge finds nothing and must not release the bytes again
    app.pipeline
        .delete(&stored.storage_key, stored.size_bytes, DeleteMode::Purge)
        .await
        .unwrap();
    assert_eq!(parent_usage(&app).await, kept.size_bytes);
    assert!(app.storage.contains(&kept.storage_key.to_string()).await);

    let events = app.audit.events();
    assert_eq!(events.len(), 4);
    assert!(events[2..]
        .iter()
        .all(|e| e.action == AuditAction::AttachmentDeleted && e.is_success()));
    assert_eq!(events[3].detected_format, Some(DetectedFormat::Png));
}

#[tokio::test]
async fn test_retained_delete_keeps_object_and_quota() {
    let app = setup_pipeline();
    let stored = app
        .pipeline
        .ingest(candidate(&app, fixtures::plain_png(16, 16), "scan.png", None))
        .await
        .unwrap();

    app.pipeline
        .delete(&stored.storage_key, stored.size_bytes, DeleteMode::Retain)
        .await
        .unwrap();

    assert!(app.storage.contains(&stored.storage_key.to_string()).await);
    assert!(app.pipeline.gateway().exists(&stored.storage_key).await.unwrap());
    assert_eq!(parent_usage(&app).await, stored.size_bytes);

    let events = app.audit.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].action, AuditAction::AttachmentDeleted);
    assert!(events[1].is_success());
}

#[tokio::test]
async fn test_temporary_read_url_for_stored_object() {
    let app = setup_pipeline();
    let stored = app
        .pipeline
        .ingest(candidate(&app, fixtures::plain_png(16, 16), "scan.png", None))
        .await
        .unwrap();

    let url = app
        .pipeline
        .gateway()
        .issue_temporary_read_url(&stored.storage_key, None)
        .await
        .unwrap();
    assert!(url.contains(&stored.storage_key.to_string()));
}

#[tokio::test]
async fn test_uploads_to_one_parent_do_not_overshoot() {
    // Sanitized PNG output re-sanitizes to itself, so raw and stored sizes agree
    let sizing = setup_pipeline();
    let first = sizing
        .pipeline
        .ingest(candidate(&sizing, fixtures::plain_png(16, 16), "scan.png", None))
        .await
        .unwrap();
    let upload_bytes = sizing
        .storage
        .get(&first.storage_key.to_string())
        .await
        .unwrap()
        .to_vec();
    let size = sizing
        .pipeline
        .ingest(candidate(&sizing, upload_bytes.clone(), "scan.png", None))
        .await
        .unwrap()
        .size_bytes;
    assert!(upload_bytes.len() as u64 <= size);

    // Room for exactly three stored copies
    let limits = UploadLimits {
        max_parent_total_bytes: 3 * size,
        ..UploadLimits::default()
    };
    let app = setup_pipeline_with(MemoryStorage::new(), limits);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pipeline = app.pipeline.clone();
        let upload = candidate(&app, upload_bytes.clone(), "scan.png", None);
        handles.push(tokio::spawn(async move { pipeline.ingest(upload).await }));
    }

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(rejection) => assert!(matches!(
                rejection.error,
                PipelineError::OversizeCumulative { .. }
            )),
        }
    }

    assert_eq!(accepted, 3);
    assert_eq!(parent_usage(&app).await, 3 * size);
    assert_eq!(app.storage.object_count().await, 3);
    assert_eq!(app.audit.events().len(), 8);
}
