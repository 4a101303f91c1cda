//! Application-wide constants.

/// Default per-file ceiling in megabytes.
pub const DEFAULT_MAX_FILE_SIZE_MB: u64 = 10;

/// Default cumulative ceiling per parent record in megabytes.
pub const DEFAULT_MAX_PARENT_TOTAL_MB: u64 = 50;

/// Decompression-bomb ceiling on decoded pixel count.
pub const DEFAULT_MAX_PIXELS: u64 = 50_000_000;

/// Ceiling on PDF page count.
pub const DEFAULT_MAX_PDF_PAGES: u32 = 1000;

/// Ceiling on the decoded size of a PDF page's content streams.
pub const MAX_PDF_PAGE_CONTENT_BYTES: u64 = 64 * 1024 * 1024;

/// Re-encode quality for lossy image formats (JPEG, WebP).
pub const DEFAULT_IMAGE_QUALITY: u8 = 85;

/// Default lifetime of presigned read URLs (15 minutes).
pub const DEFAULT_PRESIGNED_URL_TTL_SECS: u64 = 900;

/// Longest lifetime S3 accepts for a presigned URL (7 days).
pub const MAX_PRESIGNED_URL_TTL_SECS: u64 = 604_800;

/// Timeout applied to each object-store call.
pub const DEFAULT_STORAGE_TIMEOUT_SECS: u64 = 30;

/// Number of leading bytes the content sniffer looks at.
pub const SNIFF_WINDOW_BYTES: usize = 2048;

/// Base name used when a declared filename sanitizes to nothing.
pub const FALLBACK_FILENAME: &str = "attachment";

/// Longest base name (before the extension) kept after sanitization.
pub const MAX_FILENAME_BASE_LEN: usize = 100;

pub const BYTES_PER_MB: u64 = 1024 * 1024;
