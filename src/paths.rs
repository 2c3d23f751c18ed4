//! Path discovery: assign every slug a dense id in first-seen order, first from
//! the head of the input file, then from the registry.

use crate::config::DiscoveryMode;
use crate::error::RunError;
use crate::layout::{self, MIN_LINE_LEN, PREFIX_LEN, SUFFIX_LEN};
use crate::registry::PathRegistry;
use ahash::AHashMap;
use anyhow::{Context, Result};
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Slug ↔ id tables plus the line-length bounds the scan engine relies on.
/// Built once by the coordinator and shared read-only with every worker.
#[derive(Clone, Debug, Default)]
pub struct PathIndex {
    ids: AHashMap<Vec<u8>, u32>,
    slugs: Vec<Vec<u8>>,
    min_slug_len: Option<usize>,
    max_line_len: usize,
}

impl PathIndex {
    /// Add `slug` if unseen; returns its id either way.
    pub fn insert(&mut self, slug: &[u8]) -> u32 {
        self.min_slug_len = Some(self.min_slug_len.map_or(slug.len(), |m| m.min(slug.len())));
        self.max_line_len = self.max_line_len.max(MIN_LINE_LEN + slug.len());
        if let Some(&id) = self.ids.get(slug) {
            return id;
        }
        let id = self.slugs.len() as u32;
        self.ids.insert(slug.to_vec(), id);
        self.slugs.push(slug.to_vec());
        id
    }

    #[inline(always)]
    pub fn id(&self, slug: &[u8]) -> Option<u32> {
        self.ids.get(slug).copied()
    }

    pub fn slug(&self, id: u32) -> Option<&[u8]> {
        self.slugs.get(id as usize).map(Vec::as_slice)
    }

    pub fn slug_str(&self, id: u32) -> Option<Cow<'_, str>> {
        self.slug(id).map(String::from_utf8_lossy)
    }

    pub fn len(&self) -> usize {
        self.slugs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slugs.is_empty()
    }

    /// Shortest slug seen (0 when nothing was discovered).
    pub fn min_slug_len(&self) -> usize {
        self.min_slug_len.unwrap_or(0)
    }

    /// Longest full line (newline excluded) among discovered slugs.
    pub fn max_line_len(&self) -> usize {
        self.max_line_len.max(MIN_LINE_LEN)
    }

    /// Offset from a line start at which the newline search may begin.
    pub fn newline_hint(&self) -> usize {
        MIN_LINE_LEN + self.min_slug_len()
    }
}

/// Build the path index for `input`.
///
/// With `DiscoveryMode::Prefix` only complete lines inside the first
/// `sample_bytes` are read; a slug first appearing later and missing from the
/// registry stays unresolvable for the scan.
pub fn discover(
    input: &Path,
    mode: DiscoveryMode,
    registry: Option<&dyn PathRegistry>,
) -> Result<PathIndex> {
    let file = File::open(input)
        .map_err(|e| RunError::setup(format!("open input {}: {e}", input.display())))?;
    let file_size = file
        .metadata()
        .with_context(|| format!("stat {}", input.display()))?
        .len();

    let limit = match mode {
        DiscoveryMode::Prefix { sample_bytes } => sample_bytes.min(file_size),
        DiscoveryMode::Full => file_size,
    };
    let reaches_eof = limit >= file_size;

    let mut index = PathIndex::default();
    let mut reader = BufReader::with_capacity(256 * 1024, file.take(limit));
    let mut line = Vec::with_capacity(512);
    let mut sampled_lines = 0u64;
    loop {
        line.clear();
        let n = reader
            .read_until(b'\n', &mut line)
            .with_context(|| format!("read discovery sample of {}", input.display()))?;
        if n == 0 {
            break;
        }
        if line.last() == Some(&b'\n') {
            line.pop();
        } else if !reaches_eof {
            // Fragment cut by the sample bound.
            break;
        }
        if let Some((slug, _)) = layout::fields(&line) {
            index.insert(slug);
            sampled_lines += 1;
        }
    }
    let from_file = index.len();

    if let Some(registry) = registry {
        let records = registry.records().context("load path registry")?;
        for rec in &records {
            match layout::slug_from_uri(&rec.uri) {
                Some(slug) => {
                    index.insert(slug);
                }
                None => tracing::warn!("registry uri shorter than the {PREFIX_LEN}-byte prefix: {:?}", rec.uri),
            }
        }
    }

    tracing::info!(
        "discovered {} paths ({} from {} sampled lines over {} bytes, {} from registry); newline hint {} bytes, max line {} bytes",
        index.len(),
        from_file,
        sampled_lines,
        limit,
        index.len() - from_file,
        index.newline_hint(),
        index.max_line_len(),
    );
    debug_assert!(index.newline_hint() >= PREFIX_LEN + SUFFIX_LEN);
    Ok(index)
}
