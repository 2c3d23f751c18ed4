use crate::codec;
use crate::concurrency::WorkQueue;
use crate::config::{
    DiscoveryMode, Distribution, Intermediate, Options, Transport, UnknownSlugPolicy,
};
use crate::counting::{CountMatrix, Counter, DateBuckets};
use crate::date::DateIndex;
use crate::error::RunError;
use crate::partition::split_ranges;
use crate::paths::{discover, PathIndex};
use crate::progress::ProgressScope;
use crate::registry::PathRegistry;
use crate::scan::{ScanStats, Scanner};
use crate::util::{init_tracing_once, remove_quietly};
use crate::writer::{temp_path, write_json_file};
use anyhow::{Context, Result};
use std::any::Any;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::ops::RangeInclusive;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Instant;

static RUN_SEQ: AtomicU64 = AtomicU64::new(0);

/// Coordinator for one aggregation run. Cheap to clone; every run is independent.
#[derive(Clone, Debug)]
pub struct Hitmap {
    pub(crate) opts: Options,
}

impl Default for Hitmap {
    fn default() -> Self {
        Self::new()
    }
}

/// Merged result of a run plus the indexes needed to interpret it.
#[derive(Clone, Debug)]
pub struct Tally {
    pub counts: CountMatrix,
    pub paths: PathIndex,
    pub dates: DateIndex,
    pub stats: ScanStats,
    pub workers: usize,
}

impl Tally {
    /// Count for `slug` on `date` (`YYYY-MM-DD` or `YY-MM-DD`); 0 when either is unknown.
    pub fn count(&self, slug: &str, date: &str) -> u32 {
        match (self.paths.id(slug.as_bytes()), self.dates.id_of(date)) {
            (Some(p), Some(d)) => self.counts.get(p, d),
            _ => 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub lines: u64,
    pub skipped_lines: u64,
    pub paths: usize,
    pub written_paths: u64,
    pub dates: usize,
    pub ranges: usize,
    pub workers: usize,
    pub bytes: u64,
}

/// What a worker hands back.
enum Partial {
    Matrix(CountMatrix, ScanStats),
    Spilled(PathBuf, ScanStats),
}

/// Read-only state every worker borrows for the whole run.
struct WorkerCtx<'a> {
    input: &'a Path,
    paths: &'a PathIndex,
    dates: &'a DateIndex,
    queue: &'a WorkQueue,
    opts: &'a Options,
    progress: &'a ProgressScope,
    run_tag: String,
}

impl Hitmap {
    pub fn new() -> Self {
        Self { opts: Options::default() }
    }

    pub fn with_options(opts: Options) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &Options {
        &self.opts
    }

    // -------- Builder methods --------
    pub fn workers(mut self, n: usize) -> Self { self.opts = self.opts.with_workers(n); self }
    pub fn years(mut self, years: RangeInclusive<u16>) -> Self { self.opts = self.opts.with_years(years); self }
    pub fn discovery(mut self, mode: DiscoveryMode) -> Self { self.opts = self.opts.with_discovery(mode); self }
    pub fn sample_bytes(mut self, bytes: u64) -> Self { self.opts = self.opts.with_discovery(DiscoveryMode::Prefix { sample_bytes: bytes }); self }
    pub fn full_discovery(mut self) -> Self { self.opts = self.opts.with_discovery(DiscoveryMode::Full); self }
    pub fn unknown_slugs(mut self, policy: UnknownSlugPolicy) -> Self { self.opts = self.opts.with_unknown_slugs(policy); self }
    pub fn distribution(mut self, d: Distribution) -> Self { self.opts = self.opts.with_distribution(d); self }
    pub fn dynamic(mut self, ranges_per_worker: usize) -> Self { self.opts = self.opts.with_distribution(Distribution::Dynamic { ranges_per_worker }); self }
    pub fn intermediate(mut self, i: Intermediate) -> Self { self.opts = self.opts.with_intermediate(i); self }
    pub fn spill_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_spill_dir(dir); self }
    pub fn registry(mut self, r: impl PathRegistry + 'static) -> Self { self.opts = self.opts.with_registry(Arc::new(r)); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn progress_label(mut self, label: impl Into<String>) -> Self { self.opts = self.opts.with_progress_label(label); self }
    pub fn io_read_buffer(mut self, bytes: usize) -> Self { self.opts = self.opts.with_io_read_buffer(bytes); self }
    pub fn io_write_buffer(mut self, bytes: usize) -> Self { self.opts = self.opts.with_io_write_buffer(bytes); self }

    // -------- Operations --------

    /// Aggregate `input` and stream the JSON result to `output`.
    /// On any failure no file is left at `output`.
    pub fn run(&self, input: &Path, output: &Path) -> Result<RunSummary> {
        init_tracing_once();
        check_output(output)?;

        let tally = self.aggregate(input)?;
        let started = Instant::now();
        let written_paths = write_json_file(
            output,
            &tally.counts,
            &tally.paths,
            &tally.dates,
            self.opts.write_buffer_bytes,
        )?;
        tracing::info!(
            "wrote {} paths to {} in {:.2?}",
            written_paths,
            output.display(),
            started.elapsed()
        );

        Ok(RunSummary {
            lines: tally.stats.lines,
            skipped_lines: tally.stats.skipped,
            paths: tally.paths.len(),
            written_paths,
            dates: tally.dates.len(),
            ranges: tally.stats.ranges as usize,
            workers: tally.workers,
            bytes: tally.stats.bytes,
        })
    }

    /// Build the indexes, scan every range in parallel, and merge the partials.
    pub fn aggregate(&self, input: &Path) -> Result<Tally> {
        init_tracing_once();
        self.opts.validate()?;
        let started = Instant::now();

        let file_size = fs::metadata(input)
            .map_err(|e| RunError::setup(format!("stat input {}: {e}", input.display())))?
            .len();
        let dates = DateIndex::build(self.opts.years.clone())
            .map_err(|e| RunError::setup(format!("date window: {e:#}")))?;
        let paths = discover(input, self.opts.discovery, self.opts.registry.as_deref())?;
        if let Transport::Spill { dir } = &self.opts.transport {
            fs::create_dir_all(dir)
                .map_err(|e| RunError::setup(format!("spill dir {}: {e}", dir.display())))?;
        }

        let ranges = split_ranges(input, file_size, self.opts.range_count())?;
        tracing::info!(
            "{} bytes, {} paths x {} dates, {} ranges over {} workers ({:?})",
            file_size,
            paths.len(),
            dates.len(),
            ranges.len(),
            self.opts.workers,
            self.opts.distribution
        );

        let queue = WorkQueue::new(ranges, self.opts.distribution);
        let progress = ProgressScope::bytes(self.opts.progress, file_size, self.opts.progress_label.as_deref());
        let ctx = WorkerCtx {
            input,
            paths: &paths,
            dates: &dates,
            queue: &queue,
            opts: &self.opts,
            progress: &progress,
            run_tag: format!("{}-{}", std::process::id(), RUN_SEQ.fetch_add(1, Ordering::Relaxed)),
        };

        let (counts, stats) = match execute(&ctx, |worker| ctx.run_worker(worker)) {
            Ok(v) => v,
            Err(e) => {
                progress.abandon("failed");
                return Err(e);
            }
        };
        progress.finish("done");

        tracing::info!(
            "merged {} lines ({} skipped) from {} ranges in {:.2?}",
            stats.lines,
            stats.skipped,
            stats.ranges,
            started.elapsed()
        );
        Ok(Tally { counts, paths, dates, stats, workers: self.opts.workers })
    }
}

/// Reject an output that could never be written, before any scanning starts.
fn check_output(output: &Path) -> Result<(), RunError> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() && !parent.is_dir() {
            return Err(RunError::setup(format!(
                "output directory {} does not exist",
                parent.display()
            )));
        }
    }
    match fs::metadata(output) {
        Ok(meta) if meta.is_dir() => {
            Err(RunError::setup(format!("output {} is a directory", output.display())))
        }
        _ => {
            let tmp = temp_path(output);
            File::create(&tmp)
                .map_err(|e| RunError::setup(format!("create output {}: {e}", tmp.display())))?;
            remove_quietly(&tmp);
            Ok(())
        }
    }
}

/// Spawn the workers, merge partials as they complete, and wait for every worker
/// before returning. The first failure aborts the run; artifacts from every
/// other worker are deleted rather than merged.
fn execute<F>(ctx: &WorkerCtx<'_>, work: F) -> Result<(CountMatrix, ScanStats)>
where
    F: Fn(usize) -> Result<Partial> + Sync,
{
    let workers = ctx.opts.workers;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("hitmap-worker-{i}"))
        .build()
        .map_err(|e| RunError::Launch(format!("start {workers} workers: {e}")))?;

    let mut total = CountMatrix::new(ctx.paths.len(), ctx.dates.len());
    let mut stats = ScanStats::default();
    let mut failure: Option<anyhow::Error> = None;

    let (tx, rx) = mpsc::channel::<(usize, Result<Partial>)>();
    let work = &work;
    pool.in_place_scope(|s| {
        for worker in 0..workers {
            let tx = tx.clone();
            s.spawn(move |_| {
                let res = panic::catch_unwind(AssertUnwindSafe(|| work(worker)))
                    .unwrap_or_else(|payload| {
                        Err(RunError::Worker { worker, message: panic_message(payload) }.into())
                    });
                if res.is_err() {
                    ctx.queue.abort();
                }
                let _ = tx.send((worker, res));
            });
        }
        drop(tx);

        // Completion order; merging is commutative.
        for (worker, res) in rx {
            let merged = res.and_then(|partial| {
                if failure.is_some() {
                    discard(partial);
                    return Ok(());
                }
                merge_partial(&mut total, &mut stats, partial, ctx)
            });
            if let Err(e) = merged {
                ctx.queue.abort();
                tracing::error!("worker {worker} failed: {e:#}");
                if failure.is_none() {
                    failure = Some(classify(worker, e));
                }
            } else {
                tracing::debug!("worker {worker} finished");
            }
        }
    });

    match failure {
        Some(e) => Err(e),
        None => Ok((total, stats)),
    }
}

fn merge_partial(
    total: &mut CountMatrix,
    stats: &mut ScanStats,
    partial: Partial,
    ctx: &WorkerCtx<'_>,
) -> Result<()> {
    match partial {
        Partial::Matrix(m, s) => {
            total.merge(&m)?;
            stats.add(&s);
        }
        Partial::Spilled(path, s) => {
            let decoded = File::open(&path)
                .with_context(|| format!("open artifact {}", path.display()))
                .and_then(|f| codec::decode(BufReader::new(f), ctx.paths.len(), ctx.dates.len()));
            remove_quietly(&path);
            total.merge(&decoded?)?;
            stats.add(&s);
        }
    }
    Ok(())
}

fn discard(partial: Partial) {
    if let Partial::Spilled(path, _) = partial {
        remove_quietly(&path);
    }
}

/// Keep typed run errors as they are; anything else is a worker failure.
fn classify(worker: usize, e: anyhow::Error) -> anyhow::Error {
    if e.downcast_ref::<RunError>().is_some() {
        e.context(format!("worker {worker}"))
    } else {
        RunError::Worker { worker, message: format!("{e:#}") }.into()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

impl WorkerCtx<'_> {
    fn run_worker(&self, worker: usize) -> Result<Partial> {
        let mut file = File::open(self.input)
            .with_context(|| format!("open {}", self.input.display()))?;
        let (p, d) = (self.paths.len(), self.dates.len());
        match self.opts.intermediate {
            Intermediate::Dense => self.drive(worker, &mut file, CountMatrix::new(p, d)),
            Intermediate::Buckets => self.drive(worker, &mut file, DateBuckets::new(p, d)),
        }
    }

    fn drive<C: Counter>(&self, worker: usize, file: &mut File, counter: C) -> Result<Partial> {
        let mut scanner = Scanner::new(
            self.paths,
            self.dates,
            self.opts.unknown_slugs,
            counter,
            self.opts.read_buffer_bytes,
        );
        for range in self.queue.assignments(worker) {
            scanner
                .scan_range(file, range)
                .with_context(|| format!("scan [{}, {})", range.start, range.end))?;
            self.progress.inc_bytes(range.len());
        }
        let (matrix, stats) = scanner.finish()?;
        tracing::debug!(
            "worker {worker}: {} ranges, {} lines, {} bytes",
            stats.ranges, stats.lines, stats.bytes
        );

        self.hand_back(worker, matrix, stats)
    }

    /// In memory, or encoded to a spill artifact the coordinator removes after merging.
    fn hand_back(&self, worker: usize, matrix: CountMatrix, stats: ScanStats) -> Result<Partial> {
        match &self.opts.transport {
            Transport::InMemory => Ok(Partial::Matrix(matrix, stats)),
            Transport::Spill { dir } => {
                let path = dir.join(format!("hitmap_{}_{worker}.bin", self.run_tag));
                let written = File::create(&path)
                    .with_context(|| format!("create artifact {}", path.display()))
                    .and_then(|f| codec::encode(&matrix, BufWriter::with_capacity(1024 * 1024, f)));
                if let Err(e) = written {
                    remove_quietly(&path);
                    return Err(e);
                }
                Ok(Partial::Spilled(path, stats))
            }
        }
    }
}
