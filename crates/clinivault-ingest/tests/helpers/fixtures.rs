//! Test fixtures: images and PDFs carrying the metadata the pipeline must strip.

use bytes::Bytes;
use exif::experimental::Writer;
use exif::{Field, In, Rational, Tag, Value};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use img_parts::jpeg::Jpeg;
use img_parts::png::{Png, PngChunk};
use img_parts::ImageEXIF;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use std::io::Cursor;

fn ascii(tag: Tag, value: &str) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Ascii(vec![value.as_bytes().to_vec()]),
    }
}

fn rational(values: &[u32]) -> Value {
    Value::Rational(
        values
            .iter()
            .map(|&num| Rational { num, denom: 1 })
            .collect(),
    )
}

/// EXIF block with GPS position, camera make/model and capture time
pub fn exif_with_location() -> Vec<u8> {
    let fields = [
        Field {
            tag: Tag::GPSLatitudeRef,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![b"N".to_vec()]),
        },
        Field {
            tag: Tag::GPSLatitude,
            ifd_num: In::PRIMARY,
            value: rational(&[48, 51, 24]),
        },
        Field {
            tag: Tag::GPSLongitude,
            ifd_num: In::PRIMARY,
            value: rational(&[2, 21, 3]),
        },
        ascii(Tag::Make, "ExampleCam"),
        ascii(Tag::Model, "Ward Camera 2"),
        ascii(Tag::DateTimeOriginal, "2024:03:01 10:00:00"),
    ];

    let mut writer = Writer::new();
    for field in &fields {
        writer.push_field(field);
    }
    let mut buf = Cursor::new(Vec::new());
    writer.write(&mut buf, false).unwrap();
    buf.into_inner()
}

fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buffer = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buffer), format)
        .unwrap();
    buffer
}

/// JPEG photo with GPS, device and timestamp EXIF
pub fn jpeg_with_gps(width: u32, height: u32) -> Vec<u8> {
    let mut jpeg = Jpeg::from_bytes(encoded(width, height, ImageFormat::Jpeg).into()).unwrap();
    jpeg.set_exif(Some(exif_with_location().into()));
    jpeg.encoder().bytes().to_vec()
}

/// PNG with an author text chunk and a modification time chunk
pub fn png_with_text(width: u32, height: u32) -> Vec<u8> {
    let mut png = Png::from_bytes(encoded(width, height, ImageFormat::Png).into()).unwrap();
    png.chunks_mut().insert(
        1,
        PngChunk::new(*b"tEXt", Bytes::from_static(b"Author\0Dr. Example")),
    );
    png.chunks_mut().insert(
        1,
        PngChunk::new(*b"tIME", Bytes::from_static(&[0x07, 0xE8, 3, 1, 10, 0, 0])),
    );
    png.encoder().bytes().to_vec()
}

/// Plain PNG without metadata
pub fn plain_png(width: u32, height: u32) -> Vec<u8> {
    encoded(width, height, ImageFormat::Png)
}

/// PDF with `pages` pages and an info dictionary naming the author
pub fn pdf_with_info(pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::new();
    for i in 0..pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tj", vec![Object::string_literal(format!("Lab result {}", i))]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Author" => Object::string_literal("Dr. Example"),
        "Title" => Object::string_literal("Patient 4711 discharge"),
        "Producer" => Object::string_literal("Ward Scanner 3.1"),
        "CreationDate" => Object::string_literal("D:20240301100000Z"),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

/// Script bytes dressed up as an image upload
pub fn php_script() -> Vec<u8> {
    b"<?php system($_GET['cmd']); ?>".to_vec()
}

/// Valid JPEG magic followed by garbage
pub fn truncated_jpeg() -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
    data.extend_from_slice(b"JFIF\0 not really a jpeg");
    data
}
