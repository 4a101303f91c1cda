//! Storage key generation.
//!
//! Key format: `{tenant_id}/{parent_id}/{token}.{ext}`.

use clinivault_core::{DetectedFormat, InvalidStorageKey, StorageKey};
use uuid::Uuid;

/// Build a fresh storage key for an attachment of `format`.
///
/// The token is a v4 UUID in simple form, drawn from the OS CSPRNG, so every
/// call yields a new key. Fails only for `DetectedFormat::Unrecognized`.
pub fn build_key(
    tenant_id: Uuid,
    parent_id: Uuid,
    format: DetectedFormat,
) -> Result<StorageKey, InvalidStorageKey> {
    let token = Uuid::new_v4().simple().to_string();
    StorageKey::from_parts(tenant_id, parent_id, &token, format)
}
