//! Fail-closed upload gateway
//!
//! An upload is only accepted once a metadata read of the stored object shows the
//! requested server-side encryption, the uploaded length and an entity tag. Any
//! failure after the put, including a timeout, deletes the object before the error
//! is returned.

use crate::traits::{ObjectHead, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use chrono::Utc;
use clinivault_core::constants::{
    DEFAULT_PRESIGNED_URL_TTL_SECS, DEFAULT_STORAGE_TIMEOUT_SECS, MAX_PRESIGNED_URL_TTL_SECS,
};
use clinivault_core::{
    EncryptionProof, SanitizedFile, ServerSideEncryption, StorageConfig, StorageKey,
};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
pub struct StorageGateway {
    storage: Arc<dyn Storage>,
    encryption: ServerSideEncryption,
    timeout: Duration,
    default_url_ttl: Duration,
}

impl StorageGateway {
    pub fn new(storage: Arc<dyn Storage>, encryption: ServerSideEncryption) -> Self {
        Self {
            storage,
            encryption,
            timeout: Duration::from_secs(DEFAULT_STORAGE_TIMEOUT_SECS),
            default_url_ttl: Duration::from_secs(DEFAULT_PRESIGNED_URL_TTL_SECS),
        }
    }

    pub fn from_config(storage: Arc<dyn Storage>, config: &StorageConfig) -> Self {
        Self::new(storage, config.encryption.clone())
            .with_timeout(Duration::from_secs(config.timeout_secs))
            .with_default_url_ttl(Duration::from_secs(config.presigned_url_ttl_secs))
    }

    /// Bound applied to each individual store call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_default_url_ttl(mut self, ttl: Duration) -> Self {
        self.default_url_ttl = ttl;
        self
    }

    pub fn backend_type(&self) -> StorageBackend {
        self.storage.backend_type()
    }

    pub fn encryption(&self) -> &ServerSideEncryption {
        &self.encryption
    }

    /// Put `file` under `key` and prove it was stored encrypted.
    #[tracing::instrument(skip_all, fields(key = %key, size_bytes = file.size_bytes()))]
    pub async fn upload(
        &self,
        file: &SanitizedFile,
        key: &StorageKey,
    ) -> StorageResult<EncryptionProof> {
        let object_key = key.as_object_key();
        let start = Instant::now();

        let put = self
            .bounded(
                "put_object",
                self.storage.put_object(
                    &object_key,
                    file.data.clone(),
                    file.content_type(),
                    &self.encryption,
                ),
            )
            .await;
        if let Err(e) = put {
            // A timed-out or failed put may still have landed
            self.delete_quietly(&object_key).await;
            return Err(e);
        }

        let head = match self.bounded("head_object", self.storage.head_object(&object_key)).await {
            Ok(head) => head,
            Err(e) => {
                self.delete_quietly(&object_key).await;
                return Err(StorageError::EncryptionNotVerified(format!(
                    "metadata read failed: {}",
                    e
                )));
            }
        };

        match verify_head(&head, &self.encryption, file.size_bytes()) {
            Ok(proof) => {
                tracing::info!(
                    key = %object_key,
                    algorithm = %proof.algorithm,
                    size_bytes = file.size_bytes(),
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Upload verified"
                );
                Ok(proof)
            }
            Err(reason) => {
                tracing::error!(
                    key = %object_key,
                    reason = %reason,
                    "Upload failed verification, deleting object"
                );
                self.delete_quietly(&object_key).await;
                Err(StorageError::EncryptionNotVerified(reason))
            }
        }
    }

    /// Stored size of the object under `key`, `None` if there is no object.
    pub async fn object_size(&self, key: &StorageKey) -> StorageResult<Option<u64>> {
        match self
            .bounded("head_object", self.storage.head_object(&key.as_object_key()))
            .await
        {
            Ok(head) => Ok(Some(head.content_length.unwrap_or(0))),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Whether an object is stored under `key`
    pub async fn exists(&self, key: &StorageKey) -> StorageResult<bool> {
        Ok(self.object_size(key).await?.is_some())
    }

    /// Delete the object under `key`. Returns whether an object was removed;
    /// an absent object is not an error.
    pub async fn delete(&self, key: &StorageKey) -> StorageResult<bool> {
        if !self.exists(key).await? {
            tracing::debug!(key = %key, "Delete of absent object");
            return Ok(false);
        }

        match self
            .bounded("delete_object", self.storage.delete_object(&key.as_object_key()))
            .await
        {
            Ok(()) | Err(StorageError::NotFound(_)) => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Time-limited read URL for `key`; `ttl` defaults to the configured value.
    pub async fn issue_temporary_read_url(
        &self,
        key: &StorageKey,
        ttl: Option<Duration>,
    ) -> StorageResult<String> {
        let ttl = ttl.unwrap_or(self.default_url_ttl);
        if ttl.is_zero() || ttl.as_secs() > MAX_PRESIGNED_URL_TTL_SECS {
            return Err(StorageError::InvalidRequest(format!(
                "URL lifetime must be between 1 and {} seconds",
                MAX_PRESIGNED_URL_TTL_SECS
            )));
        }

        let url = self
            .bounded(
                "presigned_get_url",
                self.storage.presigned_get_url(&key.as_object_key(), ttl),
            )
            .await?;

        tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "Issued temporary read URL");
        Ok(url)
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = StorageResult<T>>,
    ) -> StorageResult<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    operation,
                    timeout_secs = self.timeout.as_secs(),
                    "Storage call timed out"
                );
                Err(StorageError::Timeout {
                    operation,
                    secs: self.timeout.as_secs(),
                })
            }
        }
    }

    async fn delete_quietly(&self, object_key: &str) {
        if let Err(e) = self
            .bounded("delete_object", self.storage.delete_object(object_key))
            .await
        {
            tracing::error!(
                key = %object_key,
                error = %e,
                "Cleanup delete failed, object left for the orphan sweep"
            );
        }
    }
}

/// Check a head response against the requested encryption and uploaded length.
fn verify_head(
    head: &ObjectHead,
    requested: &ServerSideEncryption,
    size_bytes: u64,
) -> Result<EncryptionProof, String> {
    let algorithm = head
        .server_side_encryption
        .as_deref()
        .filter(|alg| !alg.is_empty())
        .ok_or_else(|| "no server-side encryption reported".to_string())?;

    let kms_key_id = match requested {
        ServerSideEncryption::Aes256 => {
            if algorithm != "AES256" {
                return Err(format!("expected AES256, store reported {}", algorithm));
            }
            None
        }
        ServerSideEncryption::AwsKms { key_id } => {
            if !algorithm.starts_with("aws:kms") {
                return Err(format!("expected aws:kms, store reported {}", algorithm));
            }
            if let Some(expected) = key_id {
                let reported = head.kms_key_id.as_deref().unwrap_or_default();
                // S3 reports the full key ARN; a bare key id matches its suffix
                if reported != expected && !reported.ends_with(&format!("/{}", expected)) {
                    return Err("store reported a different KMS key".to_string());
                }
            }
            head.kms_key_id.clone()
        }
    };

    if head.content_length != Some(size_bytes) {
        return Err(format!(
            "stored length {:?} does not match uploaded length {}",
            head.content_length, size_bytes
        ));
    }

    let integrity_tag = head
        .e_tag
        .as_deref()
        .map(|tag| tag.trim_matches('"'))
        .filter(|tag| !tag.is_empty())
        .ok_or_else(|| "no entity tag reported".to_string())?;

    Ok(EncryptionProof {
        algorithm: algorithm.to_string(),
        kms_key_id,
        verified_at: Utc::now(),
        integrity_tag: integrity_tag.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build_key, MemoryStorage};
    use bytes::Bytes;
    use clinivault_core::DetectedFormat;
    use uuid::Uuid;

    fn sanitized(len: usize) -> SanitizedFile {
        SanitizedFile {
            format: DetectedFormat::Png,
            filename: "scan.png".to_string(),
            data: Bytes::from(vec![7u8; len]),
        }
    }

    fn key() -> StorageKey {
        build_key(Uuid::new_v4(), Uuid::new_v4(), DetectedFormat::Png).unwrap()
    }

    #[tokio::test]
    async fn test_verified_upload_returns_proof() {
        let storage = Arc::new(MemoryStorage::new());
        let gateway = StorageGateway::new(storage.clone(), ServerSideEncryption::Aes256);
        let key = key();

        let proof = gateway.upload(&sanitized(64), &key).await.unwrap();
        assert_eq!(proof.algorithm, "AES256");
        assert!(proof.kms_key_id.is_none());
        assert!(!proof.integrity_tag.contains('"'));
        assert!(storage.contains(&key.as_object_key()).await);
        assert_eq!(
            storage.content_type(&key.as_object_key()).await.as_deref(),
            Some("image/png")
        );
    }

    #[tokio::test]
    async fn test_unencrypted_object_is_deleted() {
        let storage = Arc::new(MemoryStorage::new().ignoring_encryption());
        let gateway = StorageGateway::new(storage.clone(), ServerSideEncryption::Aes256);
        let key = key();

        let err = gateway.upload(&sanitized(64), &key).await.unwrap_err();
        assert!(matches!(err, StorageError::EncryptionNotVerified(_)));
        assert!(!storage.contains(&key.as_object_key()).await);
        assert_eq!(storage.object_count().await, 0);
    }

    #[tokio::test]
    async fn test_kms_key_mismatch_is_deleted() {
        let storage =
            Arc::new(MemoryStorage::new().reporting_kms_key("arn:aws:kms:eu-west-1:1:key/other"));
        let gateway = StorageGateway::new(
            storage.clone(),
            ServerSideEncryption::AwsKms {
                key_id: Some("expected".to_string()),
            },
        );

        let err = gateway.upload(&sanitized(8), &key()).await.unwrap_err();
        assert!(matches!(err, StorageError::EncryptionNotVerified(_)));
        assert_eq!(storage.object_count().await, 0);
    }

    #[tokio::test]
    async fn test_kms_key_arn_suffix_matches() {
        let storage =
            Arc::new(MemoryStorage::new().reporting_kms_key("arn:aws:kms:eu-west-1:1:key/abc"));
        let gateway = StorageGateway::new(
            storage,
            ServerSideEncryption::AwsKms {
                key_id: Some("abc".to_string()),
            },
        );

        let proof = gateway.upload(&sanitized(8), &key()).await.unwrap();
        assert_eq!(proof.algorithm, "aws:kms");
        assert_eq!(proof.kms_key_id.as_deref(), Some("arn:aws:kms:eu-west-1:1:key/abc"));
    }

    #[tokio::test]
    async fn test_timeout_fails_upload() {
        let storage = Arc::new(MemoryStorage::new().with_latency(Duration::from_millis(200)));
        let gateway = StorageGateway::new(storage, ServerSideEncryption::Aes256)
            .with_timeout(Duration::from_millis(20));

        let err = gateway.upload(&sanitized(8), &key()).await.unwrap_err();
        assert!(matches!(err, StorageError::Timeout { operation: "put_object", .. }));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let storage = Arc::new(MemoryStorage::new());
        let gateway = StorageGateway::new(storage.clone(), ServerSideEncryption::Aes256);
        let key = key();

        gateway.upload(&sanitized(4), &key).await.unwrap();
        assert_eq!(gateway.object_size(&key).await.unwrap(), Some(4));
        assert!(gateway.exists(&key).await.unwrap());
        assert!(gateway.delete(&key).await.unwrap());
        assert!(!gateway.delete(&key).await.unwrap());
        assert_eq!(gateway.object_size(&key).await.unwrap(), None);
        assert!(!storage.contains(&key.as_object_key()).await);
    }

    #[tokio::test]
    async fn test_temporary_read_url() {
        let storage = Arc::new(MemoryStorage::new());
        let gateway = StorageGateway::new(storage, ServerSideEncryption::Aes256);
        let key = key();
        gateway.upload(&sanitized(4), &key).await.unwrap();

        let url = gateway.issue_temporary_read_url(&key, None).await.unwrap();
        assert!(url.contains(&key.as_object_key()));

        let too_long = Duration::from_secs(MAX_PRESIGNED_URL_TTL_SECS + 1);
        assert!(matches!(
            gateway.issue_temporary_read_url(&key, Some(too_long)).await,
            Err(StorageError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_verify_head_checks_length_and_etag() {
        let head = ObjectHead {
            server_side_encryption: Some("AES256".to_string()),
            kms_key_id: None,
            e_tag: Some("\"abc\"".to_string()),
            content_length: Some(10),
        };
        assert!(verify_head(&head, &ServerSideEncryption::Aes256, 10).is_ok());
        assert!(verify_head(&head, &ServerSideEncryption::Aes256, 11).is_err());

        let no_tag = ObjectHead {
            e_tag: None,
            ..head.clone()
        };
        assert!(verify_head(&no_tag, &ServerSideEncryption::Aes256, 10).is_err());

        let kms_requested = ServerSideEncryption::AwsKms { key_id: None };
        assert!(verify_head(&head, &kms_requested, 10).is_err());
    }
}
