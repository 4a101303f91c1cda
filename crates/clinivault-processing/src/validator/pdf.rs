use clinivault_core::constants::MAX_PDF_PAGE_CONTENT_BYTES;
use flate2::read::ZlibDecoder;
use lopdf::{Document, Object, ObjectId, Stream};
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};

use super::ValidationError;

fn corrupted(err: lopdf::Error) -> ValidationError {
    ValidationError::Corrupted(err.to_string())
}

/// Parse a PDF, bound its page count and force-read the first page.
///
/// Parser panics on hostile input are reported as `Corrupted`.
pub fn validate_pdf(data: &[u8], max_pages: u32) -> Result<(Document, u32), ValidationError> {
    let checked = panic::catch_unwind(AssertUnwindSafe(|| {
        check_structure(data, max_pages, MAX_PDF_PAGE_CONTENT_BYTES)
    }));
    checked.unwrap_or_else(|_| {
        Err(ValidationError::Corrupted(
            "PDF parser aborted on malformed input".to_string(),
        ))
    })
}

fn check_structure(
    data: &[u8],
    max_pages: u32,
    max_content_bytes: u64,
) -> Result<(Document, u32), ValidationError> {
    let document = Document::load_mem(data).map_err(corrupted)?;

    if document.trailer.has(b"Encrypt") {
        return Err(ValidationError::Corrupted(
            "encrypted documents are not accepted".to_string(),
        ));
    }

    let catalog_id = document
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(corrupted)?;
    document.get_dictionary(catalog_id).map_err(corrupted)?;

    let pages = document.get_pages();
    let page_count = u32::try_from(pages.len()).unwrap_or(u32::MAX);
    if page_count == 0 {
        return Err(ValidationError::EmptyDocument);
    }
    if page_count > max_pages {
        return Err(ValidationError::ResourceLimitExceeded(format!(
            "{} pages, ceiling is {}",
            page_count, max_pages
        )));
    }

    // Resolving the first page walks the xref table for its dictionary and content.
    if let Some(first_page) = pages.values().next() {
        document.get_dictionary(*first_page).map_err(corrupted)?;
        check_content_size(&document, *first_page, max_content_bytes)?;
        document.get_page_content(*first_page).map_err(corrupted)?;
    }

    tracing::debug!(page_count = page_count, "PDF structure validated");

    Ok((document, page_count))
}

/// Decoded size of a page's content streams must stay under `max_bytes`.
/// Flate streams are inflated through a capped reader, never in full.
fn check_content_size(
    document: &Document,
    page_id: ObjectId,
    max_bytes: u64,
) -> Result<(), ValidationError> {
    let mut total = 0u64;
    for content_id in document.get_page_contents(page_id) {
        let stream = document
            .get_object(content_id)
            .and_then(Object::as_stream)
            .map_err(corrupted)?;
        let remaining = max_bytes.saturating_sub(total);
        total += decoded_len(stream, remaining)?;
        if total > max_bytes {
            return Err(ValidationError::ResourceLimitExceeded(format!(
                "page content decodes past {} bytes",
                max_bytes
            )));
        }
    }
    Ok(())
}

/// Decoded length of `stream`, reading at most `limit + 1` bytes of output
fn decoded_len(stream: &Stream, limit: u64) -> Result<u64, ValidationError> {
    let filters: Vec<&[u8]> = match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.as_slice()],
        Ok(Object::Array(items)) => items.iter().filter_map(|o| o.as_name().ok()).collect(),
        _ => Vec::new(),
    };

    if filters.is_empty() {
        return Ok(stream.content.len() as u64);
    }
    if filters == [b"FlateDecode".as_slice()] {
        let mut sink = Vec::new();
        ZlibDecoder::new(stream.content.as_slice())
            .take(limit.saturating_add(1))
            .read_to_end(&mut sink)
            .map_err(|e| ValidationError::Corrupted(format!("content stream: {}", e)))?;
        return Ok(sink.len() as u64);
    }

    // Other chains are rare in page content; decode once, then measure
    let decoded = stream.decompressed_content().map_err(corrupted)?;
    Ok(decoded.len() as u64)
}
