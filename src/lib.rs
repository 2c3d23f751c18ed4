mod config;
mod error;
mod layout;
mod date;
mod paths;
mod registry;

mod partition;
mod concurrency;
mod scan;
mod counting;
mod codec;
mod pipeline;

mod writer;
mod progress;
mod util;

pub use crate::config::{
    DiscoveryMode, Distribution, Intermediate, Options, Transport, UnknownSlugPolicy,
    DEFAULT_SAMPLE_BYTES, MIN_READ_BUFFER,
};
pub use crate::error::RunError;
pub use crate::pipeline::{Hitmap, RunSummary, Tally};

// Line layout constants, so callers and tests can build records.
pub use crate::layout::{DATE_LEN, DATE_OFFSET, MIN_LINE_LEN, OUTPUT_PATH_PREFIX, PREFIX_LEN, SUFFIX_LEN};

// Stage-level building blocks.
pub use crate::date::{DateIndex, MAX_DATES};
pub use crate::paths::{discover, PathIndex};
pub use crate::registry::{JsonRegistry, PathRegistry, RegistryRecord, StaticRegistry};
pub use crate::partition::{split_offsets, split_ranges, ByteRange};
pub use crate::concurrency::WorkQueue;
pub use crate::scan::{scan, ScanStats, Scanner};
pub use crate::counting::{CountMatrix, Counter, DateBuckets};
pub use crate::codec::{decode, encode, encoded_len};
pub use crate::writer::{escape_key, write_json, write_json_file};

pub use crate::util::{host_parallelism, init_tracing_once};
