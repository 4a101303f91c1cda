//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use clinivault_core::{PipelineError, ServerSideEncryption};
use std::time::Duration;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Metadata read failed: {0}")]
    HeadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage call timed out: {operation} after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    #[error("Encryption could not be verified: {0}")]
    EncryptionNotVerified(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::EncryptionNotVerified(reason) => {
                PipelineError::EncryptionVerificationFailed(reason)
            }
            other => PipelineError::StorageUploadFailure(other.to_string()),
        }
    }
}

/// Object metadata as returned by a HEAD request. No body is fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectHead {
    /// `x-amz-server-side-encryption` as reported by the store
    pub server_side_encryption: Option<String>,
    pub kms_key_id: Option<String>,
    pub e_tag: Option<String>,
    pub content_length: Option<u64>,
}

/// Storage abstraction trait
///
/// All storage backends (S3, in-memory) must implement this trait. Keys are passed
/// as the object key string produced by `StorageKey::as_object_key`.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store `data` under `key`, requesting `encryption`. Returns the entity tag
    /// when the backend reports one.
    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        encryption: &ServerSideEncryption,
    ) -> StorageResult<Option<String>>;

    /// Read object metadata. Returns `NotFound` for an absent key.
    async fn head_object(&self, key: &str) -> StorageResult<ObjectHead>;

    /// Delete an object. Deleting an absent key succeeds.
    async fn delete_object(&self, key: &str) -> StorageResult<()>;

    /// Generate a time-limited GET URL that carries its own authorization
    async fn presigned_get_url(&self, key: &str, expires_in: Duration) -> StorageResult<String>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
