use clinivault_core::DetectedFormat;
use image::{DynamicImage, ImageError, ImageFormat, ImageReader, Limits};
use std::io::Cursor;

use super::ValidationError;

fn image_format(format: DetectedFormat) -> Result<ImageFormat, ValidationError> {
    match format {
        DetectedFormat::Jpeg => Ok(ImageFormat::Jpeg),
        DetectedFormat::Png => Ok(ImageFormat::Png),
        DetectedFormat::Webp => Ok(ImageFormat::WebP),
        other => Err(ValidationError::UnsupportedFormat(other)),
    }
}

fn map_image_error(err: ImageError) -> ValidationError {
    match err {
        ImageError::Limits(e) => ValidationError::ResourceLimitExceeded(e.to_string()),
        other => ValidationError::Corrupted(other.to_string()),
    }
}

/// Fully decode an image after checking its header dimensions against `max_pixels`.
pub fn validate_image(
    data: &[u8],
    format: DetectedFormat,
    max_pixels: u64,
) -> Result<DynamicImage, ValidationError> {
    let image_format = image_format(format)?;

    let (width, height) = ImageReader::with_format(Cursor::new(data), image_format)
        .into_dimensions()
        .map_err(map_image_error)?;

    if width == 0 || height == 0 {
        return Err(ValidationError::Corrupted(format!(
            "zero image dimension {}x{}",
            width, height
        )));
    }

    let pixels = u64::from(width) * u64::from(height);
    if pixels > max_pixels {
        return Err(ValidationError::ResourceLimitExceeded(format!(
            "{}x{} is {} pixels, ceiling is {}",
            width, height, pixels, max_pixels
        )));
    }

    // Pin the decoder to the header dimensions so a lying header cannot grow the buffer.
    let mut limits = Limits::default();
    limits.max_image_width = Some(width);
    limits.max_image_height = Some(height);

    let mut reader = ImageReader::with_format(Cursor::new(data), image_format);
    reader.limits(limits);
    let image = reader.decode().map_err(map_image_error)?;

    tracing::debug!(
        format = %format,
        width = width,
        height = height,
        "Image decoded"
    );

    Ok(image)
}
