//! In-process object store
//!
//! Used by tests, the CLI's dry-run mode and local development. It records the
//! encryption directive of each put and reports it back on head, the way S3 does.
//! Fault switches let tests simulate a store that ignores encryption, reports a
//! different KMS key, or answers slowly.

use crate::traits::{ObjectHead, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use clinivault_core::ServerSideEncryption;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
    encryption: Option<ServerSideEncryption>,
    e_tag: String,
}

#[derive(Default)]
pub struct MemoryStorage {
    objects: RwLock<HashMap<String, StoredObject>>,
    ignore_encryption: bool,
    reported_kms_key: Option<String>,
    latency: Option<Duration>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept encryption directives but store objects unencrypted
    pub fn ignoring_encryption(mut self) -> Self {
        self.ignore_encryption = true;
        self
    }

    /// Report `key_id` on head regardless of the key requested on put
    pub fn reporting_kms_key(mut self, key_id: impl Into<String>) -> Self {
        self.reported_kms_key = Some(key_id.into());
        self
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.objects.read().await.get(key).map(|o| o.data.clone())
    }

    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|o| o.content_type.clone())
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        encryption: &ServerSideEncryption,
    ) -> StorageResult<Option<String>> {
        if key.is_empty() || key.starts_with('/') || key.contains("..") {
            return Err(StorageError::InvalidRequest(format!("invalid key: {}", key)));
        }
        self.simulate_latency().await;

        let e_tag = format!("\"{}\"", hex::encode(Sha256::digest(&data)));
        let object = StoredObject {
            data,
            content_type: content_type.to_string(),
            encryption: (!self.ignore_encryption).then(|| encryption.clone()),
            e_tag: e_tag.clone(),
        };
        self.objects.write().await.insert(key.to_string(), object);

        tracing::debug!(key = %key, "Memory upload successful");
        Ok(Some(e_tag))
    }

    async fn head_object(&self, key: &str) -> StorageResult<ObjectHead> {
        self.simulate_latency().await;

        let objects = self.objects.read().await;
        let object = objects
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;

        let server_side_encryption = object
            .encryption
            .as_ref()
            .map(|sse| sse.algorithm().to_string());
        let kms_key_id = match &object.encryption {
            Some(ServerSideEncryption::AwsKms { key_id }) => {
                self.reported_kms_key.clone().or_else(|| key_id.clone())
            }
            _ => None,
        };

        Ok(ObjectHead {
            server_side_encryption,
            kms_key_id,
            e_tag: Some(object.e_tag.clone()),
            content_length: Some(object.data.len() as u64),
        })
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        self.simulate_latency().await;
        self.objects.write().await.remove(key);
        tracing::debug!(key = %key, "Memory delete successful");
        Ok(())
    }

    async fn presigned_get_url(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        if !self.contains(key).await {
            return Err(StorageError::NotFound(key.to_string()));
        }
        let expires_at = chrono::Utc::now()
            + chrono::Duration::from_std(expires_in)
                .map_err(|e| StorageError::InvalidRequest(e.to_string()))?;
        Ok(format!("memory://{}?expires={}", key, expires_at.timestamp()))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_head_delete() {
        let storage = MemoryStorage::new();
        let e_tag = storage
            .put_object(
                "t/p/a.png",
                Bytes::from_static(b"png"),
                "image/png",
                &ServerSideEncryption::Aes256,
            )
            .await
            .unwrap();

        let head = storage.head_object("t/p/a.png").await.unwrap();
        assert_eq!(head.server_side_encryption.as_deref(), Some("AES256"));
        assert_eq!(head.content_length, Some(3));
        assert_eq!(head.e_tag, e_tag);
        assert_eq!(storage.content_type("t/p/a.png").await.as_deref(), Some("image/png"));

        storage.delete_object("t/p/a.png").await.unwrap();
        assert!(matches!(
            storage.head_object("t/p/a.png").await,
            Err(StorageError::NotFound(_))
        ));
        // Second delete of the same key is not an error
        storage.delete_object("t/p/a.png").await.unwrap();
    }

    #[tokio::test]
    async fn test_ignoring_encryption_reports_none() {
        let storage = MemoryStorage::new().ignoring_encryption();
        storage
            .put_object(
                "k.pdf",
                Bytes::from_static(b"%PDF"),
                "application/pdf",
                &ServerSideEncryption::Aes256,
            )
            .await
            .unwrap();
        let head = storage.head_object("k.pdf").await.unwrap();
        assert!(head.server_side_encryption.is_none());
    }

    #[tokio::test]
    async fn test_kms_key_reported() {
        let storage = MemoryStorage::new();
        let sse = ServerSideEncryption::AwsKms {
            key_id: Some("key-1".to_string()),
        };
        storage
            .put_object("k.jpg", Bytes::from_static(b"x"), "image/jpeg", &sse)
            .await
            .unwrap();
        let head = storage.head_object("k.jpg").await.unwrap();
        assert_eq!(head.server_side_encryption.as_deref(), Some("aws:kms"));
        assert_eq!(head.kms_key_id.as_deref(), Some("key-1"));
    }

    #[tokio::test]
    async fn test_rejects_traversal_keys() {
        let storage = MemoryStorage::new();
        let result = storage
            .put_object("../escape", Bytes::new(), "image/png", &ServerSideEncryption::Aes256)
            .await;
        assert!(matches!(result, Err(StorageError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_presigned_url_requires_object() {
        let storage = MemoryStorage::new();
        assert!(storage
            .presigned_get_url("missing.png", Duration::from_secs(60))
            .await
            .is_err());
    }
}
