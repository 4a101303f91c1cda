//! Clinivault processing
//!
//! Content-level handling of uploaded attachments:
//! - magic-byte sniffing and declared-type consistency checks
//! - format validation with decompression-bomb and page-count ceilings
//! - metadata stripping (image re-encode, PDF rebuild) and filename sanitization
//! - metadata inspection, used for logging and as a post-sanitize check
//!
//! Everything here is synchronous and CPU-bound; async callers run it on the
//! blocking pool.

pub mod sanitizer;
pub mod sniffer;
pub mod validator;

pub use sanitizer::{
    inspect_image_metadata, inspect_pdf_metadata, sanitize, sanitize_filename, MetadataReport,
    SanitizeError,
};
pub use sniffer::{check_declared, sniff, DeclaredTypeMismatch};
pub use validator::{validate, ValidatedContent, ValidationError};
