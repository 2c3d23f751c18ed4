use crate::error::RunError;
use crate::registry::PathRegistry;
use std::fmt;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// How the path index learns slugs from the input file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// Read complete lines from the first `sample_bytes` only; the registry
    /// patches anything the sample misses.
    Prefix { sample_bytes: u64 },
    /// Read the whole file once before scanning. Never misses a slug.
    Full,
}

/// What the scan does with a line whose slug or date cannot be resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnknownSlugPolicy {
    /// Abort the run with `RunError::Data`.
    Fail,
    /// Drop the line, count it in `RunSummary::skipped_lines`, warn once per range.
    Skip,
}

/// How byte ranges reach workers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Distribution {
    /// One range per worker.
    Static,
    /// `workers * ranges_per_worker` ranges claimed from a shared counter.
    Dynamic { ranges_per_worker: usize },
}

/// Per-worker counting representation during the hot loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intermediate {
    /// Increment the dense matrix directly.
    Dense,
    /// Append date ids to per-path buckets; tally once the worker is done.
    Buckets,
}

/// How a worker hands its partial matrix back to the coordinator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transport {
    InMemory,
    /// Encode to a temporary artifact under `dir`; removed after merge or on failure.
    Spill { dir: PathBuf },
}

/// User-facing options with sensible defaults and builder chaining.
#[derive(Clone)]
pub struct Options {
    pub workers: usize,
    pub years: RangeInclusive<u16>,
    pub discovery: DiscoveryMode,
    pub unknown_slugs: UnknownSlugPolicy,
    pub distribution: Distribution,
    pub intermediate: Intermediate,
    pub transport: Transport,
    pub registry: Option<Arc<dyn PathRegistry>>,
    pub progress: bool,
    pub progress_label: Option<String>,

    // IO tuning
    pub read_buffer_bytes: usize,  // per-worker scan buffer
    pub write_buffer_bytes: usize, // JSON writer buffer
}

pub const DEFAULT_SAMPLE_BYTES: u64 = 2 * 1024 * 1024;
pub const MIN_READ_BUFFER: usize = 4 * 1024;

impl Default for Options {
    fn default() -> Self {
        let workers = crate::util::host_parallelism();
        Self {
            workers,
            years: 2020..=2027,
            discovery: DiscoveryMode::Prefix { sample_bytes: DEFAULT_SAMPLE_BYTES },
            unknown_slugs: UnknownSlugPolicy::Fail,
            distribution: Distribution::Static,
            intermediate: Intermediate::Dense,
            transport: Transport::InMemory,
            registry: None,
            progress: true,
            progress_label: None,

            read_buffer_bytes: 8 * 1024 * 1024,
            write_buffer_bytes: 1024 * 1024,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("workers", &self.workers)
            .field("years", &self.years)
            .field("discovery", &self.discovery)
            .field("unknown_slugs", &self.unknown_slugs)
            .field("distribution", &self.distribution)
            .field("intermediate", &self.intermediate)
            .field("transport", &self.transport)
            .field("registry", &self.registry.is_some())
            .field("read_buffer_bytes", &self.read_buffer_bytes)
            .field("write_buffer_bytes", &self.write_buffer_bytes)
            .finish()
    }
}

impl Options {
    pub fn with_workers(mut self, n: usize) -> Self {
        self.workers = n.max(1);
        self
    }
    pub fn with_years(mut self, years: RangeInclusive<u16>) -> Self {
        self.years = years;
        self
    }
    pub fn with_discovery(mut self, mode: DiscoveryMode) -> Self {
        self.discovery = mode;
        self
    }
    pub fn with_unknown_slugs(mut self, policy: UnknownSlugPolicy) -> Self {
        self.unknown_slugs = policy;
        self
    }
    pub fn with_distribution(mut self, d: Distribution) -> Self {
        self.distribution = match d {
            Distribution::Dynamic { ranges_per_worker } => {
                Distribution::Dynamic { ranges_per_worker: ranges_per_worker.max(1) }
            }
            other => other,
        };
        self
    }
    pub fn with_intermediate(mut self, i: Intermediate) -> Self {
        self.intermediate = i;
        self
    }
    pub fn with_spill_dir(self, dir: impl AsRef<Path>) -> Self {
        self.with_transport(Transport::Spill { dir: dir.as_ref().to_path_buf() })
    }
    pub fn with_transport(mut self, t: Transport) -> Self {
        self.transport = t;
        self
    }
    pub fn with_registry(mut self, registry: Arc<dyn PathRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_progress_label(mut self, label: impl Into<String>) -> Self {
        self.progress_label = Some(label.into());
        self
    }

    // IO buffers tuning
    pub fn with_io_read_buffer(mut self, bytes: usize) -> Self {
        self.read_buffer_bytes = bytes.max(MIN_READ_BUFFER);
        self
    }
    pub fn with_io_write_buffer(mut self, bytes: usize) -> Self {
        self.write_buffer_bytes = bytes.max(8 * 1024);
        self
    }

    /// Number of ranges the chunk splitter should produce.
    pub fn range_count(&self) -> usize {
        match self.distribution {
            Distribution::Static => self.workers,
            Distribution::Dynamic { ranges_per_worker } => self.workers * ranges_per_worker,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), RunError> {
        if self.workers == 0 {
            return Err(RunError::setup("worker count must be at least 1"));
        }
        if let DiscoveryMode::Prefix { sample_bytes: 0 } = self.discovery {
            if self.registry.is_none() {
                tracing::warn!("discovery sample is empty and no registry is configured");
            }
        }
        Ok(())
    }
}
