//! Counting representations: the dense (path × date) matrix every stage agrees on,
//! and the per-path bucket lists a worker may tally into it after scanning.

use crate::error::RunError;
use anyhow::Result;

/// Dense row-major `paths × dates` table of `u32` counts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CountMatrix {
    paths: usize,
    dates: usize,
    cells: Vec<u32>,
}

impl CountMatrix {
    pub fn new(paths: usize, dates: usize) -> Self {
        Self { paths, dates, cells: vec![0; paths * dates] }
    }

    pub(crate) fn from_cells(paths: usize, dates: usize, cells: Vec<u32>) -> Self {
        debug_assert_eq!(cells.len(), paths * dates);
        Self { paths, dates, cells }
    }

    pub fn paths(&self) -> usize {
        self.paths
    }

    pub fn dates(&self) -> usize {
        self.dates
    }

    pub fn cells(&self) -> &[u32] {
        &self.cells
    }

    pub fn get(&self, path_id: u32, date_id: u16) -> u32 {
        self.cells[path_id as usize * self.dates + date_id as usize]
    }

    pub fn row(&self, path_id: u32) -> &[u32] {
        let base = path_id as usize * self.dates;
        &self.cells[base..base + self.dates]
    }

    pub fn total(&self) -> u64 {
        self.cells.iter().map(|&c| c as u64).sum()
    }

    /// Pointwise addition. Shapes must match; a cell overflowing `u32` is an error.
    pub fn merge(&mut self, other: &CountMatrix) -> Result<()> {
        if self.paths != other.paths || self.dates != other.dates {
            anyhow::bail!(
                "matrix shape mismatch: {}x{} vs {}x{}",
                self.paths, self.dates, other.paths, other.dates
            );
        }
        for (i, (acc, &add)) in self.cells.iter_mut().zip(&other.cells).enumerate() {
            *acc = acc.checked_add(add).ok_or_else(|| RunError::Overflow {
                path_id: i / self.dates,
                date_id: i % self.dates,
            })?;
        }
        Ok(())
    }
}

/// Sink the scan engine records resolved lines into.
pub trait Counter: Send {
    fn record(&mut self, path_id: u32, date_id: u16) -> Result<(), RunError>;
    fn into_matrix(self) -> Result<CountMatrix>;
}

impl Counter for CountMatrix {
    #[inline(always)]
    fn record(&mut self, path_id: u32, date_id: u16) -> Result<(), RunError> {
        let cell = &mut self.cells[path_id as usize * self.dates + date_id as usize];
        *cell = cell.checked_add(1).ok_or(RunError::Overflow {
            path_id: path_id as usize,
            date_id: date_id as usize,
        })?;
        Ok(())
    }

    fn into_matrix(self) -> Result<CountMatrix> {
        Ok(self)
    }
}

/// One append-only list of raw date ids per path.
#[derive(Clone, Debug)]
pub struct DateBuckets {
    dates: usize,
    buckets: Vec<Vec<u16>>,
}

impl DateBuckets {
    pub fn new(paths: usize, dates: usize) -> Self {
        Self { dates, buckets: vec![Vec::new(); paths] }
    }

    pub fn bucket(&self, path_id: u32) -> &[u16] {
        &self.buckets[path_id as usize]
    }
}

impl Counter for DateBuckets {
    #[inline(always)]
    fn record(&mut self, path_id: u32, date_id: u16) -> Result<(), RunError> {
        self.buckets[path_id as usize].push(date_id);
        Ok(())
    }

    fn into_matrix(self) -> Result<CountMatrix> {
        let mut m = CountMatrix::new(self.buckets.len(), self.dates);
        for (path_id, bucket) in self.buckets.into_iter().enumerate() {
            let row = &mut m.cells[path_id * self.dates..(path_id + 1) * self.dates];
            for date_id in bucket {
                let cell = &mut row[date_id as usize];
                *cell = cell
                    .checked_add(1)
                    .ok_or(RunError::Overflow { path_id, date_id: date_id as usize })?;
            }
        }
        Ok(m)
    }
}
