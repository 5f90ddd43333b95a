//! Destination naming: basenames derived from URIs and collision renames.

use std::path::{Path, PathBuf};

/// Basename used when a URI yields nothing usable.
pub const DEFAULT_BASENAME: &str = "index.html";

const NAME_MAX: usize = 255;

/// Last path segment of `uri`, sanitized. `None` for unparseable URIs or
/// an empty/root path.
pub fn basename_from_uri(uri: &str) -> Option<String> {
    let parsed = url::Url::parse(uri).ok()?;
    let last = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let name = sanitize_basename(last);
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Make `name` usable as a single path component: separators, NUL and
/// control characters become `_`, leading/trailing dots and blanks are
/// dropped, and the result is capped at 255 bytes.
pub fn sanitize_basename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = replaced.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.len() <= NAME_MAX {
        return trimmed.to_string();
    }
    let mut end = NAME_MAX;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}

/// `dir/name.ext` → `dir/name.<n>.ext`; names without an extension get the
/// number appended (`dir/name.<n>`).
pub fn numbered_path(path: &Path, n: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}.{}.{}", stem, n, ext.to_string_lossy()),
        None => format!("{}.{}", stem, n),
    };
    path.with_file_name(name)
}
