//! Path and name utilities.
//!
//! Helpers for turning host paths into archive entry names and deriving output
//! file names and manifest identifiers.

use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Component, Path};

lazy_static! {
    /// Runs of whitespace, collapsed into a single dash by [`slugify`].
    static ref WHITESPACE_REGEX: Regex = Regex::new(r"\s+").unwrap();
    /// Everything that may not appear in a manifest identifier.
    static ref NON_ID_CHAR_REGEX: Regex = Regex::new(r"[^A-Za-z0-9_\-\.]").unwrap();
}

/// Converts a path to a string with fallback to lossy conversion.
pub fn path_to_string_lossy(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Gets the file name from a path with fallback to lossy conversion.
///
/// # Returns
///
/// * `String` - The file name, `"unknown"` when the path has none
pub fn get_file_name_lossy(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Gets the file stem (name without extension) with fallback to lossy conversion.
pub fn get_file_stem_lossy(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Checks if a filename starts with a dot (hidden file).
pub fn is_hidden_file(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

/// Checks whether a path names an `.epub` file (case-insensitive).
pub fn has_epub_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("epub"))
}

/// Sanitizes a filename by replacing invalid characters with safe alternatives.
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '<' | '>' | '"' | '|' | '?' | '*' => '-',
            ':' => '-',
            '/' | '\\' => '-',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Turns free text into a token usable as (part of) a manifest identifier.
///
/// Whitespace runs become a dash and every character outside `[A-Za-z0-9_.-]` is
/// dropped. Returns `"untitled"` when nothing is left.
pub fn slugify(text: &str) -> String {
    let dashed = WHITESPACE_REGEX.replace_all(text.trim(), "-");
    let slug = NON_ID_CHAR_REGEX.replace_all(&dashed, "");
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug.into_owned()
    }
}

/// Builds the output file name for an input archive: `<stem><suffix>.epub`.
pub fn output_file_name(input: &Path, suffix: &str) -> String {
    let stem = sanitize_filename(&get_file_stem_lossy(input));
    let stem = if stem.is_empty() { "book".to_string() } else { stem };
    format!("{}{}.epub", stem, suffix)
}

/// Converts a relative host path into an archive entry name.
///
/// Archive entries always use forward slashes, whatever the host separator is.
pub fn to_archive_path(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
