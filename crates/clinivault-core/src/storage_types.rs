use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Storage backend types
///
/// `S3` talks to any S3-compatible endpoint; `Memory` keeps objects in-process and
/// is used by tests and local dry runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "s3" => Ok(StorageBackend::S3),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(anyhow::anyhow!("Invalid storage backend: {}", s)),
        }
    }
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageBackend::S3 => write!(f, "s3"),
            StorageBackend::Memory => write!(f, "memory"),
        }
    }
}

/// Server-side encryption directive sent with every put and checked on every head.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum ServerSideEncryption {
    #[default]
    Aes256,
    AwsKms { key_id: Option<String> },
}

impl ServerSideEncryption {
    /// Header value as S3 reports it (`x-amz-server-side-encryption`)
    pub fn algorithm(&self) -> &'static str {
        match self {
            ServerSideEncryption::Aes256 => "AES256",
            ServerSideEncryption::AwsKms { .. } => "aws:kms",
        }
    }

    pub fn kms_key_id(&self) -> Option<&str> {
        match self {
            ServerSideEncryption::Aes256 => None,
            ServerSideEncryption::AwsKms { key_id } => key_id.as_deref(),
        }
    }

    /// Parse an algorithm name plus optional key id, as found in configuration.
    pub fn from_parts(algorithm: &str, kms_key_id: Option<String>) -> anyhow::Result<Self> {
        match algorithm.trim().to_lowercase().as_str() {
            "aes256" => Ok(ServerSideEncryption::Aes256),
            "aws:kms" | "kms" => Ok(ServerSideEncryption::AwsKms {
                key_id: kms_key_id.filter(|k| !k.trim().is_empty()),
            }),
            _ => Err(anyhow::anyhow!(
                "Invalid server-side encryption algorithm: {}",
                algorithm
            )),
        }
    }
}

impl Display for ServerSideEncryption {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.algorithm())
    }
}
