//! Privacy-relevant metadata inspection
//!
//! Reports which categories of metadata a file carries, never their values.

use bytes::Bytes;
use clinivault_core::DetectedFormat;
use exif::{Context, Tag};
use img_parts::jpeg::Jpeg;
use img_parts::png::Png;
use img_parts::webp::WebP;
use img_parts::ImageEXIF;
use lopdf::{Document, Object};
use serde::Serialize;
use std::io::Cursor;

use super::SanitizeError;

/// APP1 (EXIF, XMP), APP13 (IPTC/Photoshop), COM
pub(crate) const JPEG_METADATA_MARKERS: [u8; 3] = [0xE1, 0xED, 0xFE];

const PNG_METADATA_CHUNKS: [[u8; 4]; 5] = [*b"tEXt", *b"zTXt", *b"iTXt", *b"eXIf", *b"tIME"];

const DEVICE_TAGS: [Tag; 5] = [
    Tag::Make,
    Tag::Model,
    Tag::BodySerialNumber,
    Tag::LensMake,
    Tag::LensModel,
];
const TIMESTAMP_TAGS: [Tag; 3] = [Tag::DateTime, Tag::DateTimeOriginal, Tag::DateTimeDigitized];
const FREE_TEXT_TAGS: [Tag; 4] = [
    Tag::ImageDescription,
    Tag::UserComment,
    Tag::Artist,
    Tag::Copyright,
];

const INFO_FIELDS: [&[u8]; 8] = [
    b"Author",
    b"Title",
    b"Subject",
    b"Keywords",
    b"Creator",
    b"Producer",
    b"CreationDate",
    b"ModDate",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetadataReport {
    pub gps: bool,
    pub device: bool,
    pub timestamps: bool,
    pub free_text: bool,
    /// XMP packet present (JPEG APP1 or PDF catalog stream)
    pub xmp: bool,
    /// Populated fields of a PDF info dictionary
    pub document_info_fields: usize,
    /// EXIF fields that fit none of the categories above
    pub other_exif_fields: usize,
}

impl MetadataReport {
    pub fn is_clean(&self) -> bool {
        self.categories().is_empty() && self.other_exif_fields == 0
    }

    /// Category names for logging
    pub fn categories(&self) -> Vec<&'static str> {
        let mut categories = Vec::new();
        if self.gps {
            categories.push("gps");
        }
        if self.device {
            categories.push("device");
        }
        if self.timestamps {
            categories.push("timestamps");
        }
        if self.free_text {
            categories.push("free_text");
        }
        if self.xmp {
            categories.push("xmp");
        }
        if self.document_info_fields > 0 {
            categories.push("document_info");
        }
        categories
    }
}

/// Categories of metadata carried by an encoded image. Unparseable containers
/// report nothing.
pub fn inspect_image_metadata(data: &[u8], format: DetectedFormat) -> MetadataReport {
    let mut report = MetadataReport::default();

    if let Ok(exif) = exif::Reader::new().read_from_container(&mut Cursor::new(data)) {
        for field in exif.fields() {
            if field.tag.context() == Context::Gps {
                report.gps = true;
            } else if DEVICE_TAGS.contains(&field.tag) {
                report.device = true;
            } else if TIMESTAMP_TAGS.contains(&field.tag) {
                report.timestamps = true;
            } else if FREE_TEXT_TAGS.contains(&field.tag) {
                report.free_text = true;
            } else {
                report.other_exif_fields += 1;
            }
        }
    }

    match format {
        DetectedFormat::Jpeg => {
            if let Ok(jpeg) = Jpeg::from_bytes(Bytes::copy_from_slice(data)) {
                for segment in jpeg.segments() {
                    match segment.marker() {
                        0xE1 if segment.contents().starts_with(b"http://ns.adobe.com/xap/") => {
                            report.xmp = true
                        }
                        0xED | 0xFE => report.free_text = true,
                        _ => {}
                    }
                }
            }
        }
        DetectedFormat::Png => {
            if let Ok(png) = Png::from_bytes(Bytes::copy_from_slice(data)) {
                for chunk in png.chunks() {
                    match &chunk.kind() {
                        b"tEXt" | b"zTXt" | b"iTXt" => report.free_text = true,
                        b"tIME" => report.timestamps = true,
                        _ => {}
                    }
                }
            }
        }
        _ => {}
    }

    report
}

/// Categories of metadata carried by a parsed PDF
pub fn inspect_pdf_metadata(document: &Document) -> MetadataReport {
    let mut report = MetadataReport::default();

    if let Ok(info) = document
        .trailer
        .get(b"Info")
        .and_then(|info| match info {
            Object::Reference(id) => document.get_dictionary(*id),
            other => other.as_dict(),
        })
    {
        report.document_info_fields = INFO_FIELDS.iter().filter(|key| info.has(key)).count();
        report.free_text = ["Author", "Title", "Subject", "Keywords"]
            .iter()
            .any(|key| info.has(key.as_bytes()));
        report.timestamps = info.has(b"CreationDate") || info.has(b"ModDate");
    }

    if let Ok(catalog) = document.catalog() {
        report.xmp = catalog.has(b"Metadata");
    }

    report
}

/// Fail-closed check on sanitizer output: any surviving metadata carrier is an error.
pub fn verify_clean(format: DetectedFormat, data: &[u8]) -> Result<(), SanitizeError> {
    let bytes = Bytes::copy_from_slice(data);

    match format {
        DetectedFormat::Jpeg => {
            let jpeg =
                Jpeg::from_bytes(bytes).map_err(|e| SanitizeError::Unreadable(e.to_string()))?;
            if let Some(segment) = jpeg
                .segments()
                .iter()
                .find(|s| JPEG_METADATA_MARKERS.contains(&s.marker()))
            {
                return Err(SanitizeError::ResidualMetadata(format!(
                    "JPEG segment 0x{:02X}",
                    segment.marker()
                )));
            }
        }
        DetectedFormat::Png => {
            let png =
                Png::from_bytes(bytes).map_err(|e| SanitizeError::Unreadable(e.to_string()))?;
            if let Some(chunk) = png
                .chunks()
                .iter()
                .find(|c| PNG_METADATA_CHUNKS.contains(&c.kind()))
            {
                return Err(SanitizeError::ResidualMetadata(format!(
                    "PNG chunk {}",
                    String::from_utf8_lossy(&chunk.kind())
                )));
            }
        }
        DetectedFormat::Webp => {
            let webp =
                WebP::from_bytes(bytes).map_err(|e| SanitizeError::Unreadable(e.to_string()))?;
            if webp.exif().is_some() {
                return Err(SanitizeError::ResidualMetadata("WebP EXIF chunk".to_string()));
            }
        }
        DetectedFormat::Pdf => {
            let document =
                Document::load_mem(data).map_err(|e| SanitizeError::Unreadable(e.to_string()))?;
            let report = inspect_pdf_metadata(&document);
            if document.trailer.has(b"Info") || !report.is_clean() {
                return Err(SanitizeError::ResidualMetadata(format!(
                    "PDF {}",
                    report.categories().join(",")
                )));
            }
            return Ok(());
        }
        DetectedFormat::Unrecognized => {
            return Err(SanitizeError::UnsupportedFormat(format));
        }
    }

    let report = inspect_image_metadata(data, format);
    if !report.is_clean() {
        return Err(SanitizeError::ResidualMetadata(report.categories().join(",")));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use exif::experimental::Writer;
    use exif::{Field, In, Rational, Value};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use img_parts::png::PngChunk;

    fn exif_blob() -> Vec<u8> {
        let latitude = Field {
            tag: Tag::GPSLatitude,
            ifd_num: In::PRIMARY,
            value: Value::Rational(vec![
                Rational { num: 52, denom: 1 },
                Rational { num: 22, denom: 1 },
                Rational { num: 0, denom: 1 },
            ]),
        };
        let make = Field {
            tag: Tag::Make,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![b"ExampleCam".to_vec()]),
        };
        let taken = Field {
            tag: Tag::DateTimeOriginal,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![b"2024:03:01 10:00:00".to_vec()]),
        };
        let mut writer = Writer::new();
        writer.push_field(&latitude);
        writer.push_field(&make);
        writer.push_field(&taken);
        let mut buf = Cursor::new(Vec::new());
        writer.write(&mut buf, false).unwrap();
        buf.into_inner()
    }

    fn encoded(format: ImageFormat) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([9, 9, 9])));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), format).unwrap();
        buffer
    }

    fn jpeg_with_exif() -> Vec<u8> {
        let mut jpeg = Jpeg::from_bytes(encoded(ImageFormat::Jpeg).into()).unwrap();
        jpeg.set_exif(Some(exif_blob().into()));
        jpeg.encoder().bytes().to_vec()
    }

    #[test]
    fn test_jpeg_exif_categories() {
        let report = inspect_image_metadata(&jpeg_with_exif(), DetectedFormat::Jpeg);
        assert!(report.gps);
        assert!(report.device);
        assert!(report.timestamps);
        assert!(!report.is_clean());
        assert_eq!(report.categories(), vec!["gps", "device", "timestamps"]);
    }

    #[test]
    fn test_verify_clean_rejects_residual_exif() {
        let err = verify_clean(DetectedFormat::Jpeg, &jpeg_with_exif()).unwrap_err();
        assert!(matches!(err, SanitizeError::ResidualMetadata(_)));
    }

    #[test]
    fn test_png_text_chunk() {
        let mut png = Png::from_bytes(encoded(ImageFormat::Png).into()).unwrap();
        png.chunks_mut().insert(
            1,
            PngChunk::new(*b"tEXt", Bytes::from_static(b"Author\0Dr. Example")),
        );
        let data = png.encoder().bytes().to_vec();

        let report = inspect_image_metadata(&data, DetectedFormat::Png);
        assert!(report.free_text);
        assert!(verify_clean(DetectedFormat::Png, &data).is_err());
    }

    #[test]
    fn test_plain_encoder_output_is_clean() {
        assert!(verify_clean(DetectedFormat::Png, &encoded(ImageFormat::Png)).is_ok());
        assert!(inspect_image_metadata(&encoded(ImageFormat::Png), DetectedFormat::Png).is_clean());
    }
}
