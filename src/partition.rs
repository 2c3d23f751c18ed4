//! Chunk splitter: cut `[0, file_size)` into line-aligned byte ranges.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

/// `[start, end)` into the input file. Both ends sit on a line boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Return `n + 1` non-decreasing offsets. Offset `i` (0 < i < n) is the start of the
/// first full line after `file_size * i / n`; the partial line under the
/// candidate is skipped, so every boundary follows a newline.
pub fn split_offsets(input: &Path, file_size: u64, n: usize) -> Result<Vec<u64>> {
    let n = n.max(1);
    let mut offsets = Vec::with_capacity(n + 1);
    offsets.push(0u64);

    if n > 1 && file_size > 0 {
        let f = File::open(input).with_context(|| format!("open {} for splitting", input.display()))?;
        let mut reader = BufReader::with_capacity(64 * 1024, f);
        let mut skipped = Vec::with_capacity(512);
        for i in 1..n {
            let candidate = (file_size as u128 * i as u128 / n as u128) as u64;
            let prev = *offsets.last().unwrap_or(&0);
            if candidate < prev {
                // Still inside the line the previous boundary skipped.
                offsets.push(prev);
                continue;
            }
            reader
                .seek(SeekFrom::Start(candidate))
                .with_context(|| format!("seek {} to {candidate}", input.display()))?;
            skipped.clear();
            let read = reader
                .read_until(b'\n', &mut skipped)
                .with_context(|| format!("probe line boundary at {candidate}"))?;
            offsets.push((candidate + read as u64).min(file_size));
        }
    } else {
        offsets.extend(std::iter::repeat(0).take(n - 1));
    }
    offsets.push(file_size);
    Ok(offsets)
}

/// Same as [`split_offsets`], as ranges. Empty ranges are kept so that the
/// range count always equals `n`.
pub fn split_ranges(input: &Path, file_size: u64, n: usize) -> Result<Vec<ByteRange>> {
    let offsets = split_offsets(input, file_size, n)?;
    Ok(offsets.windows(2).map(|w| ByteRange { start: w[0], end: w[1] }).collect())
}
