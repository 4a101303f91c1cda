use clinivault_core::DetectedFormat;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, DynamicImage};
use std::panic::{self, AssertUnwindSafe};

use super::SanitizeError;

/// Re-encode decoded pixels into a fresh container of the same format.
///
/// Nothing from the original byte stream is copied, so EXIF, XMP, IPTC, ICC
/// and comment blocks cannot survive. Dimensions and colour mode are preserved.
pub fn reencode_image(
    image: &DynamicImage,
    format: DetectedFormat,
    quality: u8,
) -> Result<Vec<u8>, SanitizeError> {
    match format {
        DetectedFormat::Jpeg => encode_jpeg(image, quality),
        DetectedFormat::Png => encode_png(image),
        DetectedFormat::Webp => encode_webp(image, quality),
        other => Err(SanitizeError::UnsupportedFormat(other)),
    }
}

/// Run a native encoder, turning an unwind into an encode error
fn guarded<F>(codec: &str, encode: F) -> Result<Vec<u8>, SanitizeError>
where
    F: FnOnce() -> Result<Vec<u8>, SanitizeError>,
{
    match panic::catch_unwind(AssertUnwindSafe(encode)) {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(codec, "Image encoder panicked");
            Err(SanitizeError::Encode(format!("{} encoder aborted", codec)))
        }
    }
}

/// Encode to JPEG using mozjpeg
fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, SanitizeError> {
    let (width, height) = (image.width(), image.height());
    let grayscale = matches!(
        image.color(),
        ColorType::L8 | ColorType::L16 | ColorType::La8 | ColorType::La16
    );

    // mozjpeg reports libjpeg errors by unwinding
    guarded("JPEG", || {
        let (color_space, pixels) = if grayscale {
            (mozjpeg::ColorSpace::JCS_GRAYSCALE, image.to_luma8().into_raw())
        } else {
            (mozjpeg::ColorSpace::JCS_RGB, image.to_rgb8().into_raw())
        };

        let mut comp = mozjpeg::Compress::new(color_space);
        comp.set_size(width as usize, height as usize);
        comp.set_quality(quality as f32);
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);

        let compressed = (|| -> std::io::Result<Vec<u8>> {
            let mut comp = comp.start_compress(Vec::new())?;
            comp.write_scanlines(&pixels)?;
            comp.finish()
        })();
        compressed.map_err(|e| SanitizeError::Encode(format!("JPEG: {}", e)))
    })
}

/// Encode to PNG with maximum compression
fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, SanitizeError> {
    let mut buffer = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut buffer, CompressionType::Best, FilterType::Adaptive);
    image
        .write_with_encoder(encoder)
        .map_err(|e| SanitizeError::Encode(format!("PNG: {}", e)))?;
    Ok(buffer)
}

/// Encode to lossy WebP, keeping the alpha channel when present
fn encode_webp(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, SanitizeError> {
    let (width, height) = (image.width(), image.height());

    // libwebp is native code as well
    let encoded = guarded("WebP", || {
        let memory = if image.color().has_alpha() {
            let rgba = image.to_rgba8();
            webp::Encoder::from_rgba(&rgba, width, height).encode(quality as f32)
        } else {
            let rgb = image.to_rgb8();
            webp::Encoder::from_rgb(&rgb, width, height).encode(quality as f32)
        };
        Ok(memory.to_vec())
    })?;

    if encoded.is_empty() {
        return Err(SanitizeError::Encode("WebP encoder produced no output".to_string()));
    }
    Ok(encoded)
}
