//! Clinivault Core Library
//!
//! This crate provides the domain models, error taxonomy, configuration and
//! collaborator traits shared by every stage of the attachment ingestion pipeline.

pub mod config;
pub mod constants;
pub mod error;
pub mod hooks;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{AttachmentConfig, StorageConfig, UploadLimits};
pub use error::{ErrorMetadata, LogLevel, PipelineError, RejectionReason};
pub use hooks::{AuditSink, QuotaStore, QuotaStoreError};
pub use models::{
    AttachmentMetadataRecord, AuditAction, AuditEvent, AuditOutcome, DetectedFormat,
    EncryptionProof, InvalidStorageKey, QuotaDecision, QuotaDenial, QuotaLimits, QuotaScope,
    QuotaUsage, SanitizedFile, StorageKey, StoredAttachment, UploadCandidate,
};
pub use storage_types::{ServerSideEncryption, StorageBackend};
