//! Clinivault Storage Library
//!
//! Object storage for sanitized attachments: the key builder, the `Storage`
//! backend trait with S3 and in-memory implementations, and the `StorageGateway`
//! that turns a put into a verified, encrypted upload.
//!
//! # Storage key format
//!
//! `{tenant_id}/{parent_id}/{token}.{ext}` where `token` is 32 random hex
//! characters and `ext` comes from the detected format. No part of a key is ever
//! derived from caller-supplied text. Key generation is centralized in the `keys`
//! module.

pub mod factory;
pub mod gateway;
pub mod keys;
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use clinivault_core::StorageBackend;
pub use factory::create_storage;
pub use gateway::StorageGateway;
pub use keys::build_key;
pub use memory::MemoryStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{ObjectHead, Storage, StorageError, StorageResult};
