//! Format validation
//!
//! Parses each upload with a decoder for its detected format to prove it is
//! well-formed and within the configured ceilings. The decoded representation is
//! handed on to the sanitizer so content is only parsed once.

mod image;
mod pdf;

use clinivault_core::{DetectedFormat, PipelineError, UploadLimits};

pub use self::image::validate_image;
pub use self::pdf::validate_pdf;

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Corrupted content: {0}")]
    Corrupted(String),

    #[error("Resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),

    #[error("Document has no pages")]
    EmptyDocument,

    #[error("No validator for format {0}")]
    UnsupportedFormat(DetectedFormat),
}

impl ValidationError {
    /// Short name for the `validation_error` log field
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::Corrupted(_) => "Corrupted",
            ValidationError::ResourceLimitExceeded(_) => "ResourceLimitExceeded",
            ValidationError::EmptyDocument => "EmptyDocument",
            ValidationError::UnsupportedFormat(_) => "UnsupportedFormat",
        }
    }
}

impl From<ValidationError> for PipelineError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::Corrupted(detail) => PipelineError::CorruptedContent(detail),
            ValidationError::ResourceLimitExceeded(detail) => {
                PipelineError::ResourceLimitExceeded(detail)
            }
            ValidationError::EmptyDocument => {
                PipelineError::CorruptedContent("document has no pages".to_string())
            }
            ValidationError::UnsupportedFormat(format) => {
                PipelineError::UnrecognizedFormat(format.to_string())
            }
        }
    }
}

/// Decoded content that passed validation
pub enum ValidatedContent {
    Image {
        image: ::image::DynamicImage,
        format: DetectedFormat,
    },
    Pdf {
        document: lopdf::Document,
        page_count: u32,
    },
}

impl ValidatedContent {
    pub fn format(&self) -> DetectedFormat {
        match self {
            ValidatedContent::Image { format, .. } => *format,
            ValidatedContent::Pdf { .. } => DetectedFormat::Pdf,
        }
    }
}

impl std::fmt::Debug for ValidatedContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidatedContent::Image { image, format } => f
                .debug_struct("Image")
                .field("format", format)
                .field("width", &image.width())
                .field("height", &image.height())
                .finish(),
            ValidatedContent::Pdf { page_count, .. } => f
                .debug_struct("Pdf")
                .field("page_count", page_count)
                .finish(),
        }
    }
}

/// Validate `data` as `format`, dispatching on the detected format only.
pub fn validate(
    data: &[u8],
    format: DetectedFormat,
    limits: &UploadLimits,
) -> Result<ValidatedContent, ValidationError> {
    match format {
        DetectedFormat::Jpeg | DetectedFormat::Png | DetectedFormat::Webp => {
            let image = validate_image(data, format, limits.max_pixels)?;
            Ok(ValidatedContent::Image { image, format })
        }
        DetectedFormat::Pdf => {
            let (document, page_count) = validate_pdf(data, limits.max_pdf_pages)?;
            Ok(ValidatedContent::Pdf {
                document,
                page_count,
            })
        }
        DetectedFormat::Unrecognized => Err(ValidationError::UnsupportedFormat(format)),
    }
}
