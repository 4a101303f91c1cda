//! Metadata stripping and filename sanitization
//!
//! Images are re-encoded from decoded pixels, PDFs are rebuilt from their page
//! objects. The output is then inspected and rejected if any metadata carrier
//! survived.

mod filename;
mod image;
mod inspect;
mod pdf;

use bytes::Bytes;
use clinivault_core::{DetectedFormat, PipelineError, SanitizedFile};

use crate::validator::ValidatedContent;

pub use self::filename::sanitize_filename;
pub use self::image::reencode_image;
pub use self::inspect::{inspect_image_metadata, inspect_pdf_metadata, verify_clean, MetadataReport};
pub use self::pdf::rebuild_pdf;

#[derive(Debug, thiserror::Error)]
pub enum SanitizeError {
    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Metadata survived sanitization: {0}")]
    ResidualMetadata(String),

    #[error("Sanitized output could not be parsed: {0}")]
    Unreadable(String),

    #[error("No sanitizer for format {0}")]
    UnsupportedFormat(DetectedFormat),
}

impl From<SanitizeError> for PipelineError {
    fn from(err: SanitizeError) -> Self {
        PipelineError::SanitizationFailure(err.to_string())
    }
}

/// Strip metadata from validated content and build the safe filename.
pub fn sanitize(
    content: ValidatedContent,
    declared_filename: &str,
    image_quality: u8,
) -> Result<SanitizedFile, SanitizeError> {
    let (format, data) = match content {
        ValidatedContent::Image { image, format } => {
            let data = reencode_image(&image, format, image_quality)?;
            (format, data)
        }
        ValidatedContent::Pdf { document, .. } => (DetectedFormat::Pdf, rebuild_pdf(&document)?),
    };

    verify_clean(format, &data)?;

    Ok(SanitizedFile {
        format,
        filename: sanitize_filename(declared_filename, format),
        data: Bytes::from(data),
    })
}
