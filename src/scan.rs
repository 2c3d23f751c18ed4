//! Scan engine: the per-range hot loop.
//!
//! A worker owns one `Scanner` for its lifetime: one reusable read buffer, one
//! carry buffer for a line that outgrows a read, and one `Counter`. Every range
//! it claims is scanned into the same counter.

use crate::config::UnknownSlugPolicy;
use crate::counting::{CountMatrix, Counter};
use crate::date::DateIndex;
use crate::error::RunError;
use crate::layout;
use crate::partition::ByteRange;
use crate::paths::PathIndex;
use anyhow::{Context, Result};
use memchr::{memchr, memrchr};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Lines handled per iteration of the interior loop.
const UNROLL: usize = 4;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub lines: u64,
    pub skipped: u64,
    pub bytes: u64,
    pub ranges: u64,
}

impl ScanStats {
    pub fn add(&mut self, other: &ScanStats) {
        self.lines += other.lines;
        self.skipped += other.skipped;
        self.bytes += other.bytes;
        self.ranges += other.ranges;
    }
}

/// Resolution state shared by the buffered loop and the carry path.
struct LineSink<'a, C: Counter> {
    paths: &'a PathIndex,
    dates: &'a DateIndex,
    policy: UnknownSlugPolicy,
    counter: C,
    hint: usize,
    max_line: usize,
    stats: ScanStats,
    warned: bool,
}

impl<'a, C: Counter> LineSink<'a, C> {
    #[inline(always)]
    fn resolve(&mut self, line: &[u8]) -> Result<bool, RunError> {
        let Some((slug, date)) = layout::fields(line) else { return Ok(false) };
        let (Some(path_id), Some(date_id)) = (self.paths.id(slug), self.dates.id(&date)) else {
            return Ok(false);
        };
        self.counter.record(path_id, date_id)?;
        self.stats.lines += 1;
        Ok(true)
    }

    /// Interior step: the caller guarantees `pos + max_line < chunk.len()`, so the
    /// search window needs no clamp. `None` means this line is longer than any
    /// discovered one and must go through `step`.
    #[inline(always)]
    fn interior_step(&mut self, chunk: &[u8], pos: usize, base: u64) -> Result<Option<usize>> {
        let from = pos + self.hint;
        let Some(i) = memchr(b'\n', &chunk[from..=pos + self.max_line]) else {
            return Ok(None);
        };
        let nl = from + i;
        if self.resolve(&chunk[pos..nl])? {
            return Ok(Some(nl + 1));
        }
        self.mismatch(chunk, pos, nl, base).map(Some)
    }

    /// One line starting at `pos`; returns the start of the next one.
    /// `chunk[last_nl]` is a newline, so the search always terminates there at the latest.
    #[inline(always)]
    fn step(&mut self, chunk: &[u8], pos: usize, last_nl: usize, base: u64) -> Result<usize> {
        let from = (pos + self.hint).min(last_nl);
        let nl = memchr(b'\n', &chunk[from..=last_nl]).map_or(last_nl, |i| from + i);
        if self.resolve(&chunk[pos..nl])? {
            return Ok(nl + 1);
        }
        self.mismatch(chunk, pos, nl, base)
    }

    /// `chunk[pos..nl]` did not resolve. A line shorter than the hint makes the
    /// search overshoot into the next one; only the first line is consumed then.
    #[cold]
    fn mismatch(&mut self, chunk: &[u8], pos: usize, nl: usize, base: u64) -> Result<usize> {
        let line = &chunk[pos..nl];
        if let Some(i) = memchr(b'\n', line) {
            self.unresolved(&line[..i], base + pos as u64)?;
            return Ok(pos + i + 1);
        }
        self.unresolved(line, base + pos as u64)?;
        Ok(nl + 1)
    }

    /// Every complete line in `chunk[pos..=last_nl]`.
    fn lines(&mut self, chunk: &[u8], mut pos: usize, last_nl: usize, base: u64) -> Result<()> {
        // Below `safe_end` a block of UNROLL lines no longer than `max_line` ends
        // at or before `last_nl`.
        let span = self.max_line + 1;
        let safe_end = if self.hint <= self.max_line {
            (last_nl + 1).saturating_sub(UNROLL * span)
        } else {
            0
        };
        'interior: while pos < safe_end {
            for _ in 0..UNROLL {
                match self.interior_step(chunk, pos, base)? {
                    Some(next) => pos = next,
                    None => {
                        pos = self.step(chunk, pos, last_nl, base)?;
                        continue 'interior;
                    }
                }
            }
        }
        while pos <= last_nl {
            pos = self.step(chunk, pos, last_nl, base)?;
        }
        Ok(())
    }

    /// A line assembled outside the read buffer (carry-over or unterminated last line).
    fn whole_line(&mut self, line: &[u8], offset: u64) -> Result<()> {
        if self.resolve(line)? {
            return Ok(());
        }
        self.unresolved(line, offset)
    }

    #[cold]
    fn unresolved(&mut self, line: &[u8], offset: u64) -> Result<()> {
        let reason = self.describe(line);
        match self.policy {
            UnknownSlugPolicy::Fail => Err(RunError::data(offset, reason).into()),
            UnknownSlugPolicy::Skip => {
                if !self.warned {
                    tracing::warn!("skipping unresolvable line at byte {offset}: {reason}");
                    self.warned = true;
                }
                self.stats.skipped += 1;
                Ok(())
            }
        }
    }

    fn describe(&self, line: &[u8]) -> String {
        match layout::fields(line) {
            None => format!("line of {} bytes is shorter than the {}-byte layout", line.len(), layout::MIN_LINE_LEN),
            Some((slug, date)) => {
                if self.paths.id(slug).is_none() {
                    format!("unknown slug {:?}", String::from_utf8_lossy(slug))
                } else {
                    format!("date {:?} outside the indexed window", String::from_utf8_lossy(&date))
                }
            }
        }
    }
}

pub struct Scanner<'a, C: Counter> {
    buf: Vec<u8>,
    carry: Vec<u8>,
    sink: LineSink<'a, C>,
}

impl<'a, C: Counter> Scanner<'a, C> {
    pub fn new(
        paths: &'a PathIndex,
        dates: &'a DateIndex,
        policy: UnknownSlugPolicy,
        counter: C,
        buffer_bytes: usize,
    ) -> Self {
        Self {
            buf: vec![0u8; buffer_bytes.max(1)],
            carry: Vec::new(),
            sink: LineSink {
                paths,
                dates,
                policy,
                counter,
                hint: paths.newline_hint(),
                max_line: paths.max_line_len(),
                stats: ScanStats::default(),
                warned: false,
            },
        }
    }

    /// Scan one line-aligned range of `file` into the counter.
    pub fn scan_range(&mut self, file: &mut File, range: ByteRange) -> Result<ScanStats> {
        let before = self.sink.stats;
        file.seek(SeekFrom::Start(range.start))
            .with_context(|| format!("seek to range start {}", range.start))?;
        self.sink.warned = false;
        self.carry.clear();

        let mut offset = range.start; // file position of buf[0]
        let mut carry_start = range.start;
        let mut remaining = range.len();
        while remaining > 0 {
            let to_read = (self.buf.len() as u64).min(remaining) as usize;
            file.read_exact(&mut self.buf[..to_read])
                .with_context(|| format!("read {to_read} bytes at {offset}"))?;
            remaining -= to_read as u64;
            let chunk = &self.buf[..to_read];

            let Some(last_nl) = memrchr(b'\n', chunk) else {
                // No line ends in this read; keep the whole fragment.
                if self.carry.is_empty() {
                    carry_start = offset;
                }
                self.carry.extend_from_slice(chunk);
                offset += to_read as u64;
                continue;
            };

            let mut pos = 0;
            if !self.carry.is_empty() {
                let nl = memchr(b'\n', chunk).unwrap_or(last_nl);
                self.carry.extend_from_slice(&chunk[..nl]);
                self.sink.whole_line(&self.carry, carry_start)?;
                self.carry.clear();
                pos = nl + 1;
            }
            self.sink.lines(chunk, pos, last_nl, offset)?;

            let tail = to_read - last_nl - 1;
            if tail > 0 {
                if remaining == 0 {
                    // Unterminated last line of the file.
                    carry_start = offset + last_nl as u64 + 1;
                    self.carry.extend_from_slice(&chunk[last_nl + 1..]);
                } else {
                    file.seek(SeekFrom::Current(-(tail as i64)))
                        .context("rewind past partial line")?;
                    remaining += tail as u64;
                }
            }
            offset += (to_read - tail) as u64;
        }

        if !self.carry.is_empty() {
            self.sink.whole_line(&self.carry, carry_start)?;
            self.carry.clear();
        }

        let mut delta = self.sink.stats;
        delta.lines -= before.lines;
        delta.skipped -= before.skipped;
        delta.bytes = range.len();
        delta.ranges = 1;
        self.sink.stats.bytes += range.len();
        self.sink.stats.ranges += 1;
        tracing::debug!(
            "scanned [{}, {}): {} lines, {} skipped",
            range.start, range.end, delta.lines, delta.skipped
        );
        Ok(delta)
    }

    pub fn stats(&self) -> ScanStats {
        self.sink.stats
    }

    /// Hand back the dense partial matrix and the accumulated stats.
    pub fn finish(self) -> Result<(CountMatrix, ScanStats)> {
        let stats = self.sink.stats;
        Ok((self.sink.counter.into_matrix()?, stats))
    }
}

/// Scan a single range of `input` into a fresh dense matrix.
pub fn scan(
    input: &Path,
    range: ByteRange,
    paths: &PathIndex,
    dates: &DateIndex,
    policy: UnknownSlugPolicy,
    buffer_bytes: usize,
) -> Result<(CountMatrix, ScanStats)> {
    let mut file = File::open(input).with_context(|| format!("open {}", input.display()))?;
    let counter = CountMatrix::new(paths.len(), dates.len());
    let mut scanner = Scanner::new(paths, dates, policy, counter, buffer_bytes);
    scanner.scan_range(&mut file, range)?;
    scanner.finish()
}
