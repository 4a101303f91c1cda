//! Magic-byte content sniffing
//!
//! Only the leading bytes of the buffer are examined; the declared filename and
//! content-type never influence the result.

use clinivault_core::constants::SNIFF_WINDOW_BYTES;
use clinivault_core::{DetectedFormat, PipelineError};
use std::path::Path;

/// Identify the format of `data` from its signature bytes.
///
/// Empty and truncated buffers yield `DetectedFormat::Unrecognized`.
pub fn sniff(data: &[u8]) -> DetectedFormat {
    let window = &data[..data.len().min(SNIFF_WINDOW_BYTES)];

    if infer::image::is_jpeg(window) {
        DetectedFormat::Jpeg
    } else if infer::image::is_png(window) {
        DetectedFormat::Png
    } else if window.starts_with(b"RIFF") && infer::image::is_webp(window) {
        DetectedFormat::Webp
    } else if infer::archive::is_pdf(window) {
        DetectedFormat::Pdf
    } else {
        DetectedFormat::Unrecognized
    }
}

/// The declared filename or content-type claims a different format than the bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("declared {claim} does not match detected {detected}")]
pub struct DeclaredTypeMismatch {
    /// Which declaration disagreed: "extension" or "content-type"
    pub claim: &'static str,
    pub detected: DetectedFormat,
}

impl From<DeclaredTypeMismatch> for PipelineError {
    fn from(mismatch: DeclaredTypeMismatch) -> Self {
        PipelineError::FormatMismatch {
            declared: mismatch.claim.to_string(),
            detected: mismatch.detected,
        }
    }
}

/// Check the client's declarations against the detected format.
///
/// A missing extension, an empty content-type and `application/octet-stream`
/// make no claim. Any other extension or content-type must map to `detected`;
/// unknown ones (`.php`, `text/html`) are mismatches.
pub fn check_declared(
    detected: DetectedFormat,
    declared_filename: &str,
    declared_content_type: Option<&str>,
) -> Result<(), DeclaredTypeMismatch> {
    if let Some(ext) = declared_extension(declared_filename) {
        if DetectedFormat::from_extension(&ext) != Some(detected) {
            return Err(DeclaredTypeMismatch {
                claim: "extension",
                detected,
            });
        }
    }

    if let Some(content_type) = declared_content_type {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let no_claim = essence.is_empty() || essence == "application/octet-stream";
        if !no_claim && DetectedFormat::from_content_type(&essence) != Some(detected) {
            return Err(DeclaredTypeMismatch {
                claim: "content-type",
                detected,
            });
        }
    }

    Ok(())
}

/// Extension of the final path component, accepting both separator styles.
fn declared_extension(filename: &str) -> Option<String> {
    let last = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    Path::new(last)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
}
