use clinivault_core::constants::{FALLBACK_FILENAME, MAX_FILENAME_BASE_LEN};
use clinivault_core::DetectedFormat;
use percent_encoding::percent_decode_str;

/// Rounds of percent-decoding applied to defeat double encoding (`%252F`)
const MAX_DECODE_ROUNDS: usize = 3;

/// Build a safe display filename from the declared one.
///
/// Keeps only the final path component (after decoding `%2F`/`%5C` and
/// accepting both separator styles), drops the declared extension, maps every
/// character outside `[A-Za-z0-9_\- ]` to `_`, collapses separator runs, trims
/// leading and trailing separators and appends the extension of `format`.
pub fn sanitize_filename(declared: &str, format: DetectedFormat) -> String {
    let mut decoded = declared.to_string();
    for _ in 0..MAX_DECODE_ROUNDS {
        let next = percent_decode_str(&decoded).decode_utf8_lossy().into_owned();
        if next == decoded {
            break;
        }
        decoded = next;
    }

    let last = decoded.rsplit(['/', '\\']).next().unwrap_or_default();
    let stem = match last.rfind('.') {
        Some(idx) if idx > 0 => &last[..idx],
        _ => last,
    };

    // A separator run keeps its character when uniform and becomes `_` when mixed.
    let mut base = String::with_capacity(stem.len());
    let mut run: Option<(char, bool)> = None;
    for c in stem.chars() {
        let mapped = if c.is_ascii_alphanumeric() || c == '-' || c == ' ' {
            c
        } else {
            '_'
        };
        if is_separator(mapped) {
            run = Some(match run {
                None => (mapped, false),
                Some((first, mixed)) => (first, mixed || first != mapped),
            });
            continue;
        }
        if let Some((first, mixed)) = run.take() {
            base.push(if mixed { '_' } else { first });
        }
        base.push(mapped);
    }
    if let Some((first, mixed)) = run {
        base.push(if mixed { '_' } else { first });
    }

    let mut base: String = base
        .trim_matches(is_separator)
        .chars()
        .take(MAX_FILENAME_BASE_LEN)
        .collect();
    let trimmed_len = base.trim_end_matches(is_separator).len();
    base.truncate(trimmed_len);

    if base.is_empty() {
        base = FALLBACK_FILENAME.to_string();
    }

    format!("{}.{}", base, format.extension())
}

fn is_separator(c: char) -> bool {
    matches!(c, '_' | '-' | ' ')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_safe(name: &str) -> bool {
        name.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ' ' | '.'))
            && !name.contains("..")
            && !name.contains('/')
            && !name.contains('\\')
    }

    #[test]
    fn test_traversal_prefix_removed() {
        assert_eq!(
            sanitize_filename("../../etc/passwd.jpg", DetectedFormat::Jpeg),
            "passwd.jpg"
        );
        assert_eq!(
            sanitize_filename("..\\..\\windows\\win.ini", DetectedFormat::Pdf),
            "win.pdf"
        );
    }

    #[test]
    fn test_encoded_separators() {
        let name = sanitize_filename("..%2F..%2Fsecret%252Fnotes.pdf", DetectedFormat::Pdf);
        assert_eq!(name, "notes.pdf");
        assert!(is_safe(&name));
    }

    #[test]
    fn test_extension_comes_from_detected_format() {
        assert_eq!(
            sanitize_filename("wound photo.PNG", DetectedFormat::Jpeg),
            "wound photo.jpg"
        );
        assert_eq!(sanitize_filename("scan", DetectedFormat::Pdf), "scan.pdf");
    }

    #[test]
    fn test_disallowed_characters_and_runs() {
        assert_eq!(
            sanitize_filename("x-ray  (left)__knee!!.jpg", DetectedFormat::Jpeg),
            "x-ray_left_knee.jpg"
        );
        assert_eq!(
            sanitize_filename("résumé<script>.pdf", DetectedFormat::Pdf),
            "r_sum_script.pdf"
        );
    }

    #[test]
    fn test_empty_result_uses_fallback() {
        assert_eq!(sanitize_filename("", DetectedFormat::Png), "attachment.png");
        assert_eq!(sanitize_filename("../", DetectedFormat::Png), "attachment.png");
        assert_eq!(sanitize_filename("...", DetectedFormat::Webp), "attachment.webp");
        assert_eq!(sanitize_filename("%%%.jpg", DetectedFormat::Jpeg), "attachment.jpg");
    }

    #[test]
    fn test_long_names_truncated() {
        let long = format!("{}.pdf", "a".repeat(500));
        let name = sanitize_filename(&long, DetectedFormat::Pdf);
        assert_eq!(name.len(), MAX_FILENAME_BASE_LEN + 4);
    }
}
