//! Fixed field layout of one access-log record:
//!
//! ```text
//! https://stitcher.io/blog/<slug>,2025-01-24T01:15:53+00:00\n
//! |<------ PREFIX_LEN ---->|      |<------ SUFFIX_LEN ----->|
//!                                    |<- DATE_OFFSET from \n ->|
//! ```

/// Bytes before the slug (`https://stitcher.io/blog/`).
pub const PREFIX_LEN: usize = 25;
/// Bytes after the slug, newline excluded (`,` + 25-byte timestamp).
pub const SUFFIX_LEN: usize = 26;
/// The truncated date starts this many bytes before the newline.
pub const DATE_OFFSET: usize = 23;
/// `YY-MM-DD`
pub const DATE_LEN: usize = 8;

/// Shortest line the layout admits (empty slug, newline excluded).
pub const MIN_LINE_LEN: usize = PREFIX_LEN + SUFFIX_LEN;

/// Path prefix prepended to every slug in the output keys.
pub const OUTPUT_PATH_PREFIX: &str = "/blog/";

pub type DateKey = [u8; DATE_LEN];

/// Carve `(slug, date)` out of one line (newline already stripped).
/// Returns `None` when the line is too short to hold both fields.
#[inline(always)]
pub fn fields(line: &[u8]) -> Option<(&[u8], DateKey)> {
    let len = line.len();
    if len < MIN_LINE_LEN {
        return None;
    }
    let slug = &line[PREFIX_LEN..len - SUFFIX_LEN];
    let start = len - DATE_OFFSET;
    let date: DateKey = line[start..start + DATE_LEN].try_into().ok()?;
    Some((slug, date))
}

/// Slug carried by a registry URI: everything after the fixed prefix.
pub fn slug_from_uri(uri: &str) -> Option<&[u8]> {
    let bytes = uri.as_bytes();
    if bytes.len() <= PREFIX_LEN {
        return None;
    }
    Some(&bytes[PREFIX_LEN..])
}
