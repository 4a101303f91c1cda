use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use super::format::DetectedFormat;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid storage key: {0}")]
pub struct InvalidStorageKey(pub String);

/// Object location `{tenant}/{parent}/{token}.{ext}`.
///
/// Every component is generated or derived from the detected format, so a key never
/// carries caller-supplied text. Fields are private to keep it immutable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorageKey {
    tenant_id: Uuid,
    parent_id: Uuid,
    token: String,
    #[serde(skip)]
    extension: &'static str,
}

impl StorageKey {
    /// Token is 32 lowercase hex characters.
    pub fn from_parts(
        tenant_id: Uuid,
        parent_id: Uuid,
        token: &str,
        format: DetectedFormat,
    ) -> Result<Self, InvalidStorageKey> {
        if !format.is_recognized() {
            return Err(InvalidStorageKey(
                "unrecognized format has no extension".to_string(),
            ));
        }
        if token.len() != 32
            || !token
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(InvalidStorageKey("malformed token".to_string()));
        }
        Ok(Self {
            tenant_id,
            parent_id,
            token: token.to_string(),
            extension: format.extension(),
        })
    }

    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    pub fn parent_id(&self) -> Uuid {
        self.parent_id
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn extension(&self) -> &'static str {
        self.extension
    }

    /// Object key as sent to the store
    pub fn as_object_key(&self) -> String {
        self.to_string()
    }
}

impl Display for StorageKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{}/{}/{}.{}",
            self.tenant_id, self.parent_id, self.token, self.extension
        )
    }
}

impl FromStr for StorageKey {
    type Err = InvalidStorageKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        let (Some(tenant), Some(parent), Some(file), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(InvalidStorageKey("expected tenant/parent/file".to_string()));
        };
        let tenant_id =
            Uuid::parse_str(tenant).map_err(|_| InvalidStorageKey("bad tenant id".to_string()))?;
        let parent_id =
            Uuid::parse_str(parent).map_err(|_| InvalidStorageKey("bad parent id".to_string()))?;
        let (token, ext) = file
            .rsplit_once('.')
            .ok_or_else(|| InvalidStorageKey("missing extension".to_string()))?;
        let format = DetectedFormat::from_extension(ext)
            .filter(|f| f.extension() == ext)
            .ok_or_else(|| InvalidStorageKey("unknown extension".to_string()))?;
        let key = Self::from_parts(tenant_id, parent_id, token, format)?;
        if key.to_string() != s {
            return Err(InvalidStorageKey("non-canonical key".to_string()));
        }
        Ok(key)
    }
}

impl TryFrom<String> for StorageKey {
    type Error = InvalidStorageKey;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StorageKey> for String {
    fn from(key: StorageKey) -> Self {
        key.to_string()
    }
}

/// Evidence that the stored object was read back with server-side encryption applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionProof {
    /// Algorithm reported by the store (`AES256`, `aws:kms`)
    pub algorithm: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kms_key_id: Option<String>,
    pub verified_at: DateTime<Utc>,
    /// Provider integrity tag (ETag)
    pub integrity_tag: String,
}
