//! Output file naming helpers.

use std::path::{Component, Path};

use url::Url;

use super::constants::FALLBACK_FILENAME;

/// Default output name for `url`: its last path segment, percent-decoded.
///
/// Falls back to `download.bin` when the URL cannot be parsed or its path ends
/// in `/`.
///
/// # Example
///
/// ```
/// use fastget_core::download::default_name_from_url;
///
/// assert_eq!(default_name_from_url("https://example.com/a/my%20file.iso?x=1"), "my file.iso");
/// assert_eq!(default_name_from_url("https://example.com/"), "download.bin");
/// ```
#[must_use]
pub fn default_name_from_url(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return FALLBACK_FILENAME.to_string();
    };

    if let Some(mut segments) = parsed.path_segments()
        && let Some(last) = segments.next_back()
        && !last.is_empty()
    {
        let decoded = urlencoding::decode(last).map_or_else(|_| last.to_string(), |s| s.into_owned());
        let name = sanitize_filename(&decoded);
        if !name.trim_matches('_').is_empty() {
            return name;
        }
    }
    FALLBACK_FILENAME.to_string()
}

/// Sanitizes a filename by replacing characters invalid on common filesystems.
///
/// Dot-only names such as `..` have their dots replaced so the result can never
/// leave the output directory.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            // Also handle null and control characters
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}
