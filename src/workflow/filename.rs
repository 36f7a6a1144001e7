//! Output filename policy for converted results.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_FILENAME_DIRECTIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"filename="?([^";\n]+)"?"#).unwrap());

/// Pick the filename a converted result should be saved under.
///
/// A `filename=` directive in the response's `Content-Disposition` wins;
/// otherwise the name is derived from the original file and the target.
pub fn suggest_filename(original: &str, target: &str, content_disposition: Option<&str>) -> String {
    content_disposition
        .and_then(filename_from_disposition)
        .unwrap_or_else(|| derive_filename(original, target))
}

/// Replace the final extension of `original` with the lowercased `target`.
///
/// Only the last extension is stripped: `archive.tar.gz` → `archive.tar.zip`.
pub fn derive_filename(original: &str, target: &str) -> String {
    let stem = match original.rfind('.') {
        Some(idx) => &original[..idx],
        None => original,
    };
    format!("{}.{}", stem, target.to_lowercase())
}

/// Extract the `filename=` parameter (quoted or not) from a header value.
pub fn filename_from_disposition(header: &str) -> Option<String> {
    let caps = RE_FILENAME_DIRECTIVE.captures(header)?;
    let name = caps[1].trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_replaces_final_extension() {
        assert_eq!(derive_filename("report.docx", "pdf"), "report.pdf");
        assert_eq!(derive_filename("archive.tar.gz", "zip"), "archive.tar.zip");
    }

    #[test]
    fn derive_lowercases_target() {
        assert_eq!(derive_filename("photo.JPG", "PNG"), "photo.png");
    }

    #[test]
    fn derive_without_extension_appends() {
        assert_eq!(derive_filename("README", "pdf"), "README.pdf");
    }

    #[test]
    fn quoted_directive_overrides() {
        assert_eq!(
            suggest_filename(
                "report.docx",
                "pdf",
                Some(r#"attachment; filename="converted-output.pdf""#)
            ),
            "converted-output.pdf"
        );
    }

    #[test]
    fn unquoted_directive_with_trailing_params() {
        assert_eq!(
            filename_from_disposition("attachment; filename=out.webp; size=123").as_deref(),
            Some("out.webp")
        );
        assert_eq!(
            filename_from_disposition("attachment; filename=spaced.mp3  ").as_deref(),
            Some("spaced.mp3")
        );
    }

    #[test]
    fn disposition_without_filename_falls_back() {
        assert_eq!(
            suggest_filename("clip.mov", "mp4", Some("attachment")),
            "clip.mp4"
        );
        assert_eq!(suggest_filename("clip.mov", "mp4", None), "clip.mp4");
    }
}
