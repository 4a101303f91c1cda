//! Error types module
//!
//! `PipelineError` is the terminal error of the attachment pipeline. Every variant
//! carries enough internal detail for logs, while `client_message` and
//! `rejection_reason` collapse them into a small closed set that is safe to show
//! to an untrusted uploader.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::models::{DetectedFormat, QuotaDenial, QuotaScope};

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like a wrong file type
    Debug,
    /// Warning level - for hostile or over-limit input
    Warn,
    /// Error level - for storage and verification failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
/// This trait allows errors to self-describe their HTTP response characteristics
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "FORMAT_MISMATCH")
    fn error_code(&self) -> &'static str;

    /// Whether the same request could succeed later without changing the file
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (never includes parser or provider details)
    fn client_message(&self) -> String;

    /// Whether details should be hidden from the caller
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

/// Closed set of reasons surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    FileTooLarge,
    QuotaExceeded,
    UnsupportedFileType,
    FileTypeMismatch,
    UnprocessableFile,
    StorageUnavailable,
}

impl RejectionReason {
    pub fn message(&self) -> &'static str {
        match self {
            RejectionReason::FileTooLarge => "The file exceeds the maximum allowed size",
            RejectionReason::QuotaExceeded => {
                "The attachment storage limit for this record has been reached"
            }
            RejectionReason::UnsupportedFileType => "This file type is not supported",
            RejectionReason::FileTypeMismatch => {
                "The file contents do not match its name or declared type"
            }
            RejectionReason::UnprocessableFile => "The file could not be processed",
            RejectionReason::StorageUnavailable => {
                "The file could not be stored, please try again later"
            }
        }
    }
}

impl Display for RejectionReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("File too large: {size_bytes} bytes exceeds ceiling of {max_bytes} bytes")]
    OversizeFile { size_bytes: u64, max_bytes: u64 },

    #[error(
        "Cumulative {scope} ceiling exceeded: \
         {used_bytes} used + {requested_bytes} requested > {limit_bytes}"
    )]
    OversizeCumulative {
        scope: QuotaScope,
        used_bytes: u64,
        requested_bytes: u64,
        limit_bytes: u64,
    },

    #[error("Unrecognized format: {0}")]
    UnrecognizedFormat(String),

    #[error("Format mismatch: declared {declared}, detected {detected}")]
    FormatMismatch {
        declared: String,
        detected: DetectedFormat,
    },

    #[error("Corrupted content: {0}")]
    CorruptedContent(String),

    #[error("Resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),

    #[error("Sanitization failure: {0}")]
    SanitizationFailure(String),

    #[error("Storage upload failure: {0}")]
    StorageUploadFailure(String),

    #[error("Encryption verification failed: {0}")]
    EncryptionVerificationFailed(String),

    #[error("Quota backend unavailable: {0}")]
    QuotaUnavailable(String),
}

impl From<QuotaDenial> for PipelineError {
    fn from(denial: QuotaDenial) -> Self {
        match denial {
            QuotaDenial::FileTooLarge {
                size_bytes,
                max_bytes,
            } => PipelineError::OversizeFile {
                size_bytes,
                max_bytes,
            },
            QuotaDenial::CumulativeExceeded {
                scope,
                used_bytes,
                requested_bytes,
                limit_bytes,
            } => PipelineError::OversizeCumulative {
                scope,
                used_bytes,
                requested_bytes,
                limit_bytes,
            },
        }
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable,
/// suggested_action, sensitive, log_level).
fn pipeline_error_static_metadata(
    err: &PipelineError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        PipelineError::OversizeFile { .. } => (
            413,
            "OVERSIZE_FILE",
            false,
            Some("Reduce the file size and try again"),
            false,
            LogLevel::Debug,
        ),
        PipelineError::OversizeCumulative { .. } => (
            413,
            "OVERSIZE_CUMULATIVE",
            false,
            Some("Remove existing attachments from this record"),
            false,
            LogLevel::Debug,
        ),
        PipelineError::UnrecognizedFormat(_) => (
            415,
            "UNRECOGNIZED_FORMAT",
            false,
            Some("Upload a JPEG, PNG, WebP or PDF file"),
            true,
            LogLevel::Warn,
        ),
        PipelineError::FormatMismatch { .. } => (
            415,
            "FORMAT_MISMATCH",
            false,
            Some("Check the file extension matches the file contents"),
            true,
            LogLevel::Warn,
        ),
        PipelineError::CorruptedContent(_) => (
            422,
            "CORRUPTED_CONTENT",
            false,
            Some("Try a different file"),
            true,
            LogLevel::Warn,
        ),
        PipelineError::ResourceLimitExceeded(_) => (
            422,
            "RESOURCE_LIMIT_EXCEEDED",
            false,
            Some("Try a smaller image or a shorter document"),
            true,
            LogLevel::Warn,
        ),
        PipelineError::SanitizationFailure(_) => (
            422,
            "SANITIZATION_FAILURE",
            false,
            Some("Try a different file"),
            true,
            LogLevel::Error,
        ),
        PipelineError::StorageUploadFailure(_) => (
            503,
            "STORAGE_UPLOAD_FAILURE",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        PipelineError::EncryptionVerificationFailed(_) => (
            503,
            "ENCRYPTION_VERIFICATION_FAILED",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        PipelineError::QuotaUnavailable(_) => (
            503,
            "QUOTA_UNAVAILABLE",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl PipelineError {
    /// Variant name used as the `error_kind` log field
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::OversizeFile { .. } => "OversizeFile",
            PipelineError::OversizeCumulative { .. } => "OversizeCumulative",
            PipelineError::UnrecognizedFormat(_) => "UnrecognizedFormat",
            PipelineError::FormatMismatch { .. } => "FormatMismatch",
            PipelineError::CorruptedContent(_) => "CorruptedContent",
            PipelineError::ResourceLimitExceeded(_) => "ResourceLimitExceeded",
            PipelineError::SanitizationFailure(_) => "SanitizationFailure",
            PipelineError::StorageUploadFailure(_) => "StorageUploadFailure",
            PipelineError::EncryptionVerificationFailed(_) => "EncryptionVerificationFailed",
            PipelineError::QuotaUnavailable(_) => "QuotaUnavailable",
        }
    }

    pub fn rejection_reason(&self) -> RejectionReason {
        match self {
            PipelineError::OversizeFile { .. } => RejectionReason::FileTooLarge,
            PipelineError::OversizeCumulative { .. } => RejectionReason::QuotaExceeded,
            PipelineError::UnrecognizedFormat(_) => RejectionReason::UnsupportedFileType,
            PipelineError::FormatMismatch { .. } => RejectionReason::FileTypeMismatch,
            PipelineError::CorruptedContent(_)
            | PipelineError::ResourceLimitExceeded(_)
            | PipelineError::SanitizationFailure(_) => RejectionReason::UnprocessableFile,
            PipelineError::StorageUploadFailure(_)
            | PipelineError::EncryptionVerificationFailed(_)
            | PipelineError::QuotaUnavailable(_) => RejectionReason::StorageUnavailable,
        }
    }
}

impl ErrorMetadata for PipelineError {
    fn http_status_code(&self) -> u16 {
        pipeline_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        pipeline_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        pipeline_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        pipeline_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        pipeline_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        pipeline_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            PipelineError::OversizeFile { max_bytes, .. } => format!(
                "{} ({} MB)",
                RejectionReason::FileTooLarge.message(),
                max_bytes / crate::constants::BYTES_PER_MB
            ),
            other => other.rejection_reason().message().to_string(),
        }
    }
}
