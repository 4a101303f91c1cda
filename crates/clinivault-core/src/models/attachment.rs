use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::format::DetectedFormat;
use super::storage_key::{EncryptionProof, StorageKey};

/// An upload as handed over by the authenticated API layer. Lives only for the
/// duration of one pipeline run.
#[derive(Clone)]
pub struct UploadCandidate {
    pub data: Bytes,
    pub declared_filename: String,
    pub declared_content_type: Option<String>,
    pub tenant_id: Uuid,
    pub parent_id: Uuid,
}

impl UploadCandidate {
    pub fn new(
        data: impl Into<Bytes>,
        declared_filename: impl Into<String>,
        declared_content_type: Option<String>,
        tenant_id: Uuid,
        parent_id: Uuid,
    ) -> Self {
        Self {
            data: data.into(),
            declared_filename: declared_filename.into(),
            declared_content_type,
            tenant_id,
            parent_id,
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }
}

// Content is never printed.
impl fmt::Debug for UploadCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadCandidate")
            .field("size_bytes", &self.data.len())
            .field("declared_content_type", &self.declared_content_type)
            .field("tenant_id", &self.tenant_id)
            .field("parent_id", &self.parent_id)
            .finish_non_exhaustive()
    }
}

/// Output of the sanitizer: re-encoded content plus a safe filename.
#[derive(Clone)]
pub struct SanitizedFile {
    pub format: DetectedFormat,
    pub filename: String,
    pub data: Bytes,
}

impl SanitizedFile {
    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn content_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

impl fmt::Debug for SanitizedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SanitizedFile")
            .field("format", &self.format)
            .field("filename", &self.filename)
            .field("size_bytes", &self.data.len())
            .finish()
    }
}

/// Successful pipeline result, handed back to the caller for metadata persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAttachment {
    pub storage_key: StorageKey,
    pub encryption: EncryptionProof,
    pub filename: String,
    pub format: DetectedFormat,
    pub size_bytes: u64,
}

/// Persisted attachment metadata row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMetadataRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub parent_id: Uuid,
    pub storage_key: StorageKey,
    pub filename: String,
    pub format: DetectedFormat,
    pub size_bytes: u64,
    pub encryption: EncryptionProof,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl AttachmentMetadataRecord {
    /// Build the record for a verified upload. The proof is required by construction.
    pub fn from_stored(stored: StoredAttachment) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: stored.storage_key.tenant_id(),
            parent_id: stored.storage_key.parent_id(),
            storage_key: stored.storage_key,
            filename: stored.filename,
            format: stored.format,
            size_bytes: stored.size_bytes,
            encryption: stored.encryption,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
