//! Result writer: stream the merged matrix as nested, pretty-printed JSON.
//!
//! ```text
//! {
//!     "\/blog\/a": {
//!         "2024-01-05": 2
//!     }
//! }
//! ```
//! Paths appear in discovery order, dates ascending, zero cells omitted.

use crate::counting::CountMatrix;
use crate::date::DateIndex;
use crate::error::RunError;
use crate::layout::OUTPUT_PATH_PREFIX;
use crate::paths::PathIndex;
use crate::util::{remove_quietly, replace_file_atomic};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const INDENT: &str = "    ";

/// JSON string literal for `s` with `/` written as `\/`.
pub fn escape_key(s: &str) -> Result<String> {
    Ok(serde_json::to_string(s)?.replace('/', "\\/"))
}

/// Stream the object into `w`. Nothing larger than one path's entry is buffered here.
pub fn write_json<W: Write>(
    mut w: W,
    counts: &CountMatrix,
    paths: &PathIndex,
    dates: &DateIndex,
) -> Result<u64> {
    // "        \"2024-01-05\": " for every date id, built once.
    let date_prefixes: Vec<String> = dates
        .iter()
        .map(|d| format!("{INDENT}{INDENT}\"{d}\": "))
        .collect();

    let mut written_paths = 0u64;
    for path_id in 0..paths.len() as u32 {
        let row = counts.row(path_id);
        if row.iter().all(|&c| c == 0) {
            continue;
        }
        let slug = paths.slug_str(path_id).unwrap_or_default();
        let key = escape_key(&format!("{OUTPUT_PATH_PREFIX}{slug}"))?;

        w.write_all(if written_paths == 0 { b"{\n" } else { b",\n" })?;
        write!(w, "{INDENT}{key}: {{")?;
        let mut first = true;
        for (date_id, &count) in row.iter().enumerate() {
            if count == 0 {
                continue;
            }
            w.write_all(if first { &b"\n"[..] } else { &b",\n"[..] })?;
            w.write_all(date_prefixes[date_id].as_bytes())?;
            write!(w, "{count}")?;
            first = false;
        }
        write!(w, "\n{INDENT}}}")?;
        written_paths += 1;
    }
    w.write_all(if written_paths == 0 { b"{}" } else { b"\n}" })?;
    w.flush()?;
    Ok(written_paths)
}

/// Sibling the result is streamed into before the rename.
pub(crate) fn temp_path(out: &Path) -> PathBuf {
    out.with_extension("json.tmp")
}

/// Write to `<out>.tmp` and promote atomically; nothing is left at `out` on failure.
pub fn write_json_file(
    out: &Path,
    counts: &CountMatrix,
    paths: &PathIndex,
    dates: &DateIndex,
    buf_bytes: usize,
) -> Result<u64> {
    let tmp = temp_path(out);
    let f = File::create(&tmp)
        .map_err(|e| RunError::setup(format!("create output {}: {e}", tmp.display())))?;
    let written = write_json(BufWriter::with_capacity(buf_bytes, f), counts, paths, dates)
        .with_context(|| format!("write {}", tmp.display()));
    match written {
        Ok(n) => match replace_file_atomic(&tmp, out) {
            Ok(()) => Ok(n),
            Err(e) => {
                remove_quietly(&tmp);
                Err(e)
            }
        },
        Err(e) => {
            remove_quietly(&tmp);
            Err(e)
        }
    }
}
