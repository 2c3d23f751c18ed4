//! Fixed-width wire format for a partial count matrix: one little-endian `u32`
//! per cell, row-major, no header. The shape is implied by the path and date
//! indexes both sides already hold.

use crate::counting::CountMatrix;
use anyhow::{bail, Context, Result};
use std::io::{self, Read, Write};

pub const CELL_BYTES: usize = 4;

/// Cells are staged through a fixed block to avoid one write call per cell.
const BLOCK_CELLS: usize = 16 * 1024;

pub fn encode<W: Write>(m: &CountMatrix, mut w: W) -> Result<()> {
    let mut block = Vec::with_capacity(BLOCK_CELLS * CELL_BYTES);
    for chunk in m.cells().chunks(BLOCK_CELLS) {
        block.clear();
        for &cell in chunk {
            block.extend_from_slice(&cell.to_le_bytes());
        }
        w.write_all(&block).context("write encoded cells")?;
    }
    w.flush()?;
    Ok(())
}

/// Decode exactly `paths * dates` cells. A short stream or trailing bytes are errors.
pub fn decode<R: Read>(mut r: R, paths: usize, dates: usize) -> Result<CountMatrix> {
    let n = paths * dates;
    let mut cells = Vec::with_capacity(n);
    let mut block = vec![0u8; BLOCK_CELLS * CELL_BYTES];
    while cells.len() < n {
        let want = (n - cells.len()).min(BLOCK_CELLS) * CELL_BYTES;
        match r.read_exact(&mut block[..want]) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                bail!("encoded matrix truncated: expected {} cells", n)
            }
            Err(e) => return Err(e).context("read encoded cells"),
        }
        cells.extend(
            block[..want]
                .chunks_exact(CELL_BYTES)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        );
    }
    let mut probe = [0u8; 1];
    if r.read(&mut probe)? != 0 {
        bail!("encoded matrix has trailing bytes past {} cells", n);
    }
    Ok(CountMatrix::from_cells(paths, dates, cells))
}

/// Encoded size in bytes for a given shape.
pub fn encoded_len(paths: usize, dates: usize) -> u64 {
    (paths * dates * CELL_BYTES) as u64
}
