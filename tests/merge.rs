#[path = "common/mod.rs"]
mod common;

use common::*;
use hitmap::{
    decode, discover, encode, encoded_len, scan, split_ranges, CountMatrix, Counter, DateBuckets,
    DateIndex, DiscoveryMode, RunError, UnknownSlugPolicy,
};
use std::fs;

fn partials(n: usize) -> Vec<CountMatrix> {
    let dir = tempfile::tempdir().unwrap();
    let path = write_log(dir.path(), "log.csv", &synthetic(3_000, 21));
    let size = fs::metadata(&path).unwrap().len();
    let dates = DateIndex::build(2020..=2027).unwrap();
    let paths = discover(&path, DiscoveryMode::Full, None).unwrap();
    split_ranges(&path, size, n)
        .unwrap()
        .into_iter()
        .map(|r| scan(&path, r, &paths, &dates, UnknownSlugPolicy::Fail, 64 * 1024).unwrap().0)
        .collect()
}

fn merged(order: &[usize], parts: &[CountMatrix]) -> CountMatrix {
    let mut total = CountMatrix::new(parts[0].paths(), parts[0].dates());
    for &i in order {
        total.merge(&parts[i]).unwrap();
    }
    total
}

/// Every completion order of three workers yields the same matrix.
#[test]
fn merge_is_order_independent() {
    let parts = partials(3);
    let reference = merged(&[0, 1, 2], &parts);
    assert_eq!(reference.total(), 3_000);
    for order in [[0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]] {
        assert_eq!(merged(&order, &parts), reference, "order {order:?}");
    }
}

/// A worker's matrix survives the fixed-width wire format and merges identically.
#[test]
fn codec_preserves_partials() {
    let parts = partials(2);
    let (p, d) = (parts[0].paths(), parts[0].dates());

    let mut total = CountMatrix::new(p, d);
    for part in &parts {
        let mut wire = Vec::new();
        encode(part, &mut wire).unwrap();
        assert_eq!(wire.len() as u64, encoded_len(p, d));
        total.merge(&decode(wire.as_slice(), p, d).unwrap()).unwrap();
    }
    assert_eq!(total, merged(&[0, 1], &parts));
}

#[test]
fn cells_are_little_endian_row_major() {
    let mut m = CountMatrix::new(2, 3);
    m.record(0, 1).unwrap();
    m.record(1, 2).unwrap();
    m.record(1, 2).unwrap();
    let mut wire = Vec::new();
    encode(&m, &mut wire).unwrap();
    assert_eq!(
        wire,
        [0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, /* row 1 */ 0, 0, 0, 0, 0, 0, 0, 0, 2, 0, 0, 0]
    );
}

#[test]
fn decode_rejects_wrong_lengths() {
    let short = vec![0u8; 4 * 5];
    assert!(decode(short.as_slice(), 2, 3).is_err());
    let long = vec![0u8; 4 * 6 + 1];
    assert!(decode(long.as_slice(), 2, 3).is_err());
    let exact = vec![0u8; 4 * 6];
    assert_eq!(decode(exact.as_slice(), 2, 3).unwrap(), CountMatrix::new(2, 3));
}

#[test]
fn merge_rejects_overflow_and_shape_mismatch() {
    let full = decode([0xffu8, 0xff, 0xff, 0xff].as_slice(), 1, 1).unwrap();
    let mut one = CountMatrix::new(1, 1);
    one.record(0, 0).unwrap();

    let mut acc = full.clone();
    let err = acc.merge(&one).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RunError>(),
        Some(RunError::Overflow { path_id: 0, date_id: 0 })
    ));

    let mut other = CountMatrix::new(2, 1);
    assert!(other.merge(&one).is_err());
}

/// Counting into a saturated cell reports the cell instead of wrapping.
#[test]
fn record_into_full_cell_is_an_overflow() {
    let mut full = decode([0, 0, 0, 0, 0xffu8, 0xff, 0xff, 0xff].as_slice(), 1, 2).unwrap();
    full.record(0, 0).unwrap();
    let err = full.record(0, 1).unwrap_err();
    assert!(matches!(err, RunError::Overflow { path_id: 0, date_id: 1 }), "{err}");
    assert_eq!(err.phase(), "count");
    assert_eq!(full.get(0, 1), u32::MAX);
}

#[test]
fn buckets_keep_raw_date_ids_until_tallied() {
    let mut b = DateBuckets::new(2, 4);
    for (p, d) in [(1, 3), (0, 2), (1, 3), (1, 0)] {
        b.record(p, d).unwrap();
    }
    assert_eq!(b.bucket(0), &[2]);
    assert_eq!(b.bucket(1), &[3, 3, 0]);

    let m = b.into_matrix().unwrap();
    assert_eq!(m.row(1), &[1, 0, 0, 2]);
    assert_eq!(m.total(), 4);
}
