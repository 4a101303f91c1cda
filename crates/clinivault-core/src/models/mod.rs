//! Data models for the attachment pipeline
//!
//! Each sub-module covers one concern: the detected file format, the transient
//! upload/sanitized file values, storage keys and encryption proofs, quota
//! bookkeeping, and the audit event emitted per terminal outcome.

mod attachment;
mod audit;
mod format;
mod quota;
mod storage_key;

pub use attachment::*;
pub use audit::*;
pub use format::*;
pub use quota::*;
pub use storage_key::*;
