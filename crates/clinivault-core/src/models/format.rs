use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// File format established from byte content.
///
/// This value, never the declared content-type or filename extension, drives every
/// downstream decision (decoder choice, re-encoder, content-type header, key extension).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectedFormat {
    Jpeg,
    Png,
    Webp,
    Pdf,
    Unrecognized,
}

impl DetectedFormat {
    /// Formats the pipeline knows how to validate and sanitize
    pub const SUPPORTED: [DetectedFormat; 4] = [
        DetectedFormat::Jpeg,
        DetectedFormat::Png,
        DetectedFormat::Webp,
        DetectedFormat::Pdf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectedFormat::Jpeg => "jpeg",
            DetectedFormat::Png => "png",
            DetectedFormat::Webp => "webp",
            DetectedFormat::Pdf => "pdf",
            DetectedFormat::Unrecognized => "unrecognized",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            DetectedFormat::Jpeg => "image/jpeg",
            DetectedFormat::Png => "image/png",
            DetectedFormat::Webp => "image/webp",
            DetectedFormat::Pdf => "application/pdf",
            DetectedFormat::Unrecognized => "application/octet-stream",
        }
    }

    /// Canonical extension (without the dot) used for stored keys and safe filenames
    pub fn extension(&self) -> &'static str {
        match self {
            DetectedFormat::Jpeg => "jpg",
            DetectedFormat::Png => "png",
            DetectedFormat::Webp => "webp",
            DetectedFormat::Pdf => "pdf",
            DetectedFormat::Unrecognized => "bin",
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(
            self,
            DetectedFormat::Jpeg | DetectedFormat::Png | DetectedFormat::Webp
        )
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, DetectedFormat::Unrecognized)
    }

    /// Map a filename extension to the format it claims. Unknown extensions return `None`.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim().to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "jpe" => Some(DetectedFormat::Jpeg),
            "png" => Some(DetectedFormat::Png),
            "webp" => Some(DetectedFormat::Webp),
            "pdf" => Some(DetectedFormat::Pdf),
            _ => None,
        }
    }

    /// Map a content-type header (parameters allowed) to the format it claims.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(DetectedFormat::Jpeg),
            "image/png" | "image/x-png" => Some(DetectedFormat::Png),
            "image/webp" => Some(DetectedFormat::Webp),
            "application/pdf" | "application/x-pdf" => Some(DetectedFormat::Pdf),
            _ => None,
        }
    }
}

impl Display for DetectedFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectedFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(DetectedFormat::Jpeg),
            "png" => Ok(DetectedFormat::Png),
            "webp" => Ok(DetectedFormat::Webp),
            "pdf" => Ok(DetectedFormat::Pdf),
            _ => Err(anyhow::anyhow!("Invalid attachment format: {}", s)),
        }
    }
}
