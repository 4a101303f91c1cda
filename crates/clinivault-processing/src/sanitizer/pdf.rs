use bytes::Bytes;
use img_parts::jpeg::Jpeg;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use std::collections::{BTreeSet, HashSet};
use std::panic::{self, AssertUnwindSafe};

use super::inspect::JPEG_METADATA_MARKERS;
use super::SanitizeError;

/// Page attributes that may be inherited from the page tree
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Page entries dropped on rebuild. Markup annotations carry author names and
/// timestamps; the rest point back into the discarded document structure.
const DROPPED_PAGE_KEYS: [&[u8]; 7] = [
    b"Parent",
    b"Metadata",
    b"PieceInfo",
    b"Annots",
    b"AA",
    b"B",
    b"StructParents",
];

/// Entries removed from every copied dictionary and stream
const DROPPED_OBJECT_KEYS: [&[u8]; 2] = [b"Metadata", b"PieceInfo"];

const MAX_TREE_DEPTH: usize = 64;

/// Rebuild a document from its pages into a fresh shell.
///
/// The new document has a new catalog and page tree, no info dictionary and no
/// producer entry. Only objects reachable from the pages are carried over.
pub fn rebuild_pdf(source: &Document) -> Result<Vec<u8>, SanitizeError> {
    panic::catch_unwind(AssertUnwindSafe(|| rebuild(source))).unwrap_or_else(|_| {
        Err(SanitizeError::Encode(
            "PDF rebuild aborted on malformed input".to_string(),
        ))
    })
}

fn rebuild(source: &Document) -> Result<Vec<u8>, SanitizeError> {
    let page_ids: Vec<ObjectId> = source.get_pages().into_values().collect();
    if page_ids.is_empty() {
        return Err(SanitizeError::Encode("document has no pages".to_string()));
    }

    let excluded = structural_objects(source, &page_ids);

    let mut pages = Vec::with_capacity(page_ids.len());
    for id in &page_ids {
        let mut page = source
            .get_dictionary(*id)
            .map_err(|e| SanitizeError::Encode(e.to_string()))?
            .clone();
        for key in INHERITABLE_KEYS {
            if !page.has(key) {
                if let Some(value) = inherited_attribute(source, &page, key) {
                    page.set(key.to_vec(), value);
                }
            }
        }
        for key in DROPPED_PAGE_KEYS {
            page.remove(key);
        }
        pages.push((*id, page));
    }

    let mut reachable = BTreeSet::new();
    let mut pending = Vec::new();
    for (_, page) in &pages {
        collect_dictionary_refs(page, &mut pending);
    }
    while let Some(id) = pending.pop() {
        if excluded.contains(&id) || !reachable.insert(id) {
            continue;
        }
        if let Ok(object) = source.get_object(id) {
            collect_refs(object, &mut pending);
        }
    }

    let mut target = Document::with_version(source.version.clone());
    target.max_id = source.max_id;

    for id in &reachable {
        if let Ok(object) = source.get_object(*id) {
            let mut object = object.clone();
            scrub(&mut object, &excluded);
            target.objects.insert(*id, object);
        }
    }

    let pages_id = target.new_object_id();
    let catalog_id = target.new_object_id();

    let mut kids = Vec::with_capacity(pages.len());
    for (id, mut page) in pages {
        scrub_dictionary(&mut page, &excluded);
        page.set("Parent", pages_id);
        target.objects.insert(id, Object::Dictionary(page));
        kids.push(Object::Reference(id));
    }

    let count = kids.len() as i64;
    target.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    target.objects.insert(
        catalog_id,
        Object::Dictionary(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        }),
    );
    target.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    target
        .save_to(&mut out)
        .map_err(|e| SanitizeError::Encode(format!("PDF: {}", e)))?;

    tracing::debug!(
        page_count = count,
        objects_kept = reachable.len(),
        objects_dropped = source.objects.len().saturating_sub(reachable.len()),
        "PDF rebuilt"
    );

    Ok(out)
}

/// Catalog, info dictionary and page-tree nodes: never copied, references become null.
fn structural_objects(source: &Document, page_ids: &[ObjectId]) -> HashSet<ObjectId> {
    let mut excluded = HashSet::new();

    for key in [b"Root".as_slice(), b"Info".as_slice()] {
        if let Ok(id) = source.trailer.get(key).and_then(Object::as_reference) {
            excluded.insert(id);
        }
    }

    if let Ok(pages_root) = source
        .catalog()
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(Object::as_reference)
    {
        excluded.insert(pages_root);
    }

    for id in page_ids {
        let mut parent = source
            .get_dictionary(*id)
            .and_then(|page| page.get(b"Parent"))
            .and_then(Object::as_reference)
            .ok();
        let mut depth = 0;
        while let Some(node) = parent {
            if depth >= MAX_TREE_DEPTH || !excluded.insert(node) {
                break;
            }
            depth += 1;
            parent = source
                .get_dictionary(node)
                .and_then(|dict| dict.get(b"Parent"))
                .and_then(Object::as_reference)
                .ok();
        }
    }

    excluded
}

fn inherited_attribute(source: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;
    while let Some(id) = parent {
        if depth >= MAX_TREE_DEPTH {
            return None;
        }
        depth += 1;
        let node = source.get_dictionary(id).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

fn collect_refs(object: &Object, pending: &mut Vec<ObjectId>) {
    match object {
        Object::Reference(id) => pending.push(*id),
        Object::Array(items) => items.iter().for_each(|item| collect_refs(item, pending)),
        Object::Dictionary(dict) => collect_dictionary_refs(dict, pending),
        Object::Stream(stream) => collect_dictionary_refs(&stream.dict, pending),
        _ => {}
    }
}

fn collect_dictionary_refs(dict: &Dictionary, pending: &mut Vec<ObjectId>) {
    for (key, value) in dict.iter() {
        if DROPPED_OBJECT_KEYS.contains(&key.as_slice()) {
            continue;
        }
        collect_refs(value, pending);
    }
}

fn scrub(object: &mut Object, excluded: &HashSet<ObjectId>) {
    match object {
        Object::Reference(id) if excluded.contains(id) => *object = Object::Null,
        Object::Array(items) => items.iter_mut().for_each(|item| scrub(item, excluded)),
        Object::Dictionary(dict) => scrub_dictionary(dict, excluded),
        Object::Stream(stream) => {
            scrub_dictionary(&mut stream.dict, excluded);
            if is_dct_stream(&stream.dict) {
                if let Some(clean) = strip_embedded_jpeg(&stream.content) {
                    stream.set_content(clean);
                }
            }
        }
        _ => {}
    }
}

fn scrub_dictionary(dict: &mut Dictionary, excluded: &HashSet<ObjectId>) {
    for key in DROPPED_OBJECT_KEYS {
        dict.remove(key);
    }
    for (_, value) in dict.iter_mut() {
        scrub(value, excluded);
    }
}

/// Image XObject stored as a plain JPEG (`/Filter /DCTDecode`)
fn is_dct_stream(dict: &Dictionary) -> bool {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => name == b"DCTDecode",
        Ok(Object::Array(filters)) => {
            filters.len() == 1 && matches!(&filters[0], Object::Name(name) if name == b"DCTDecode")
        }
        _ => false,
    }
}

/// Remove EXIF/XMP/IPTC/comment segments from an embedded JPEG, leaving the
/// entropy-coded data untouched. Returns `None` when nothing needed removing.
fn strip_embedded_jpeg(content: &[u8]) -> Option<Vec<u8>> {
    let mut jpeg = Jpeg::from_bytes(Bytes::copy_from_slice(content)).ok()?;
    let before = jpeg.segments().len();
    jpeg.segments_mut()
        .retain(|segment| !JPEG_METADATA_MARKERS.contains(&segment.marker()));
    if jpeg.segments().len() == before {
        return None;
    }
    Some(jpeg.encoder().bytes().to_vec())
}
