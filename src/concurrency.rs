//! Work distribution: which byte ranges a worker scans.

use crate::config::Distribution;
use crate::partition::ByteRange;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Ranges plus the single lock-protected claim counter used in dynamic mode.
/// The critical section is read-compare-increment with no blocking inside.
pub struct WorkQueue {
    ranges: Vec<ByteRange>,
    mode: Distribution,
    next: Mutex<usize>,
    aborted: AtomicBool,
}

impl WorkQueue {
    pub fn new(ranges: Vec<ByteRange>, mode: Distribution) -> Self {
        Self { ranges, mode, next: Mutex::new(0), aborted: AtomicBool::new(false) }
    }

    pub fn ranges(&self) -> &[ByteRange] {
        &self.ranges
    }

    /// Claim the next unclaimed range index. Each index is handed out exactly once.
    pub fn claim(&self) -> Option<usize> {
        if self.is_aborted() {
            return None;
        }
        let mut next = self.next.lock();
        if *next >= self.ranges.len() {
            return None;
        }
        let idx = *next;
        *next += 1;
        Some(idx)
    }

    /// The ranges `worker` is responsible for, in the order it should scan them.
    /// Static mode is a fixed assignment; dynamic mode pulls from the shared counter.
    pub fn assignments(&self, worker: usize) -> Assignments<'_> {
        Assignments { queue: self, worker, done: false }
    }

    /// Stop handing out dynamic ranges; workers finish their current range and exit.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }
}

pub struct Assignments<'q> {
    queue: &'q WorkQueue,
    worker: usize,
    done: bool,
}

impl Iterator for Assignments<'_> {
    type Item = ByteRange;

    fn next(&mut self) -> Option<ByteRange> {
        if self.done {
            return None;
        }
        match self.queue.mode {
            Distribution::Static => {
                self.done = true;
                if self.queue.is_aborted() {
                    return None;
                }
                self.queue.ranges.get(self.worker).copied()
            }
            Distribution::Dynamic { .. } => {
                let idx = self.queue.claim();
                self.done = idx.is_none();
                idx.map(|i| self.queue.ranges[i])
            }
        }
    }
}
