#[path = "common/mod.rs"]
mod common;

use common::*;
use hitmap::{
    discover, scan, ByteRange, CountMatrix, DateBuckets, DateIndex, DiscoveryMode, RunError,
    Scanner, StaticRegistry, UnknownSlugPolicy,
};
use std::fs::{self, File};

const SMALL_BUF: usize = 4 * 1024;

fn full_range(path: &std::path::Path) -> ByteRange {
    ByteRange { start: 0, end: fs::metadata(path).unwrap().len() }
}

/// A 4 KiB buffer over ~300 KiB forces many reads, rewinds, and interior/tail switches.
#[test]
fn small_buffer_counts_every_line() {
    let dir = tempfile::tempdir().unwrap();
    let records = synthetic(5_000, 11);
    let path = write_log(dir.path(), "log.csv", &records);

    let dates = DateIndex::build(2020..=2027).unwrap();
    let paths = discover(&path, DiscoveryMode::Full, None).unwrap();
    let (m, stats) = scan(&path, full_range(&path), &paths, &dates, UnknownSlugPolicy::Fail, SMALL_BUF).unwrap();

    assert_eq!(stats.lines, records.len() as u64);
    assert_eq!(stats.skipped, 0);
    assert_eq!(m.total(), records.len() as u64);
    for ((slug, date), n) in expected_counts(&records) {
        let p = paths.id(slug.as_bytes()).unwrap();
        let d = dates.id_of(&date).unwrap();
        assert_eq!(m.get(p, d), n, "{slug} {date}");
    }
}

/// A line longer than the read buffer is assembled from several reads.
#[test]
fn line_longer_than_buffer_is_carried_over() {
    let dir = tempfile::tempdir().unwrap();
    let long = "l".repeat(SMALL_BUF + 2_000);
    let records = vec![
        rec("a", "2024-01-05"),
        rec(&long, "2024-01-05"),
        rec("a", "2024-01-06"),
        rec(&long, "2024-01-05"),
        rec("b", "2024-01-06"),
    ];
    let path = write_log(dir.path(), "long.csv", &records);

    let dates = DateIndex::build(2020..=2027).unwrap();
    let paths = discover(&path, DiscoveryMode::Full, None).unwrap();
    let (m, stats) = scan(&path, full_range(&path), &paths, &dates, UnknownSlugPolicy::Fail, SMALL_BUF).unwrap();

    assert_eq!(stats.lines, 5);
    let d5 = dates.id_of("2024-01-05").unwrap();
    assert_eq!(m.get(paths.id(long.as_bytes()).unwrap(), d5), 2);
    assert_eq!(m.get(paths.id(b"a").unwrap(), d5), 1);
}

#[test]
fn unterminated_last_line_is_counted() {
    let dir = tempfile::tempdir().unwrap();
    let records = vec![rec("a", "2024-01-05"), rec("b", "2024-01-06"), rec("b", "2024-01-07")];
    let path = write_log_unterminated(dir.path(), "log.csv", &records);

    let dates = DateIndex::build(2020..=2027).unwrap();
    let paths = discover(&path, DiscoveryMode::Full, None).unwrap();
    let (m, stats) = scan(&path, full_range(&path), &paths, &dates, UnknownSlugPolicy::Fail, SMALL_BUF).unwrap();

    assert_eq!(stats.lines, 3);
    assert_eq!(m.get(paths.id(b"b").unwrap(), dates.id_of("2024-01-07").unwrap()), 1);
}

/// A slug past the discovery sample fails the scan with its byte offset.
#[test]
fn unknown_slug_fails_with_offset() {
    let dir = tempfile::tempdir().unwrap();
    let mut records: Vec<_> = (0..10).map(|_| rec("a", "2024-01-05")).collect();
    records.push(rec("zzz", "2024-01-05"));
    let path = write_log(dir.path(), "log.csv", &records);

    let dates = DateIndex::build(2020..=2027).unwrap();
    let paths = discover(&path, DiscoveryMode::Prefix { sample_bytes: 2 * line_len("a") }, None).unwrap();
    assert_eq!(paths.len(), 1);

    let err = scan(&path, full_range(&path), &paths, &dates, UnknownSlugPolicy::Fail, SMALL_BUF).unwrap_err();
    match err.downcast_ref::<RunError>() {
        Some(RunError::Data { offset, reason }) => {
            assert_eq!(*offset, 10 * line_len("a"));
            assert!(reason.contains("zzz"), "{reason}");
        }
        other => panic!("expected data error, got {other:?}"),
    }
}

#[test]
fn unknown_slug_and_bad_date_are_skipped_when_allowed() {
    let dir = tempfile::tempdir().unwrap();
    let records = vec![
        rec("a", "2024-01-05"),
        rec("zzz", "2024-01-05"),
        rec("a", "2019-12-31"),
        rec("a", "2024-01-05"),
    ];
    let path = write_log(dir.path(), "log.csv", &records);

    let dates = DateIndex::build(2020..=2027).unwrap();
    let paths = discover(&path, DiscoveryMode::Prefix { sample_bytes: line_len("a") }, None).unwrap();
    let (m, stats) = scan(&path, full_range(&path), &paths, &dates, UnknownSlugPolicy::Skip, SMALL_BUF).unwrap();

    assert_eq!(stats.lines, 2);
    assert_eq!(stats.skipped, 2);
    assert_eq!(m.get(0, dates.id_of("2024-01-05").unwrap()), 2);
}

/// The newline search starts `MIN_LINE_LEN + shortest known slug` bytes into a line.
/// A later, shorter, unknown line must not swallow the known line after it.
#[test]
fn shorter_unknown_line_does_not_hide_next_line() {
    let dir = tempfile::tempdir().unwrap();
    let records = vec![
        rec("longer-slug", "2024-01-05"),
        rec("x", "2024-01-05"),
        rec("longer-slug", "2024-01-05"),
        rec("", "2024-01-05"),
        rec("longer-slug", "2024-01-06"),
    ];
    let path = write_log(dir.path(), "log.csv", &records);

    let dates = DateIndex::build(2020..=2027).unwrap();
    let paths = discover(&path, DiscoveryMode::Prefix { sample_bytes: line_len("longer-slug") }, None).unwrap();
    assert_eq!(paths.min_slug_len(), "longer-slug".len());

    let (m, stats) = scan(&path, full_range(&path), &paths, &dates, UnknownSlugPolicy::Skip, SMALL_BUF).unwrap();
    assert_eq!(stats.lines, 3);
    assert_eq!(stats.skipped, 2);
    assert_eq!(m.get(0, dates.id_of("2024-01-05").unwrap()), 2);
    assert_eq!(m.get(0, dates.id_of("2024-01-06").unwrap()), 1);
}

#[test]
fn truncated_line_is_a_data_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.csv");
    fs::write(&path, format!("{}\nhttps://stitcher.io/blog/a,2024\n", line("a", "2024-01-05"))).unwrap();

    let dates = DateIndex::build(2020..=2027).unwrap();
    let paths = discover(&path, DiscoveryMode::Full, None).unwrap();
    let err = scan(&path, full_range(&path), &paths, &dates, UnknownSlugPolicy::Fail, SMALL_BUF).unwrap_err();
    assert!(matches!(err.downcast_ref::<RunError>(), Some(RunError::Data { .. })));
}

/// Buckets and the dense matrix produce the same counts; one scanner reused over
/// several ranges accumulates them all.
#[test]
fn buckets_match_dense_across_ranges() {
    let dir = tempfile::tempdir().unwrap();
    let records = synthetic(4_000, 5);
    let path = write_log(dir.path(), "log.csv", &records);
    let size = fs::metadata(&path).unwrap().len();

    let dates = DateIndex::build(2020..=2027).unwrap();
    let paths = discover(&path, DiscoveryMode::Full, None).unwrap();
    let ranges = hitmap::split_ranges(&path, size, 6).unwrap();

    let mut file = File::open(&path).unwrap();
    let mut dense = Scanner::new(&paths, &dates, UnknownSlugPolicy::Fail, CountMatrix::new(paths.len(), dates.len()), SMALL_BUF);
    let mut buckets = Scanner::new(&paths, &dates, UnknownSlugPolicy::Fail, DateBuckets::new(paths.len(), dates.len()), SMALL_BUF);
    for r in ranges.iter().rev() {
        dense.scan_range(&mut file, *r).unwrap();
        buckets.scan_range(&mut file, *r).unwrap();
    }
    let (a, sa) = dense.finish().unwrap();
    let (b, sb) = buckets.finish().unwrap();
    assert_eq!(a, b);
    assert_eq!(sa, sb);
    assert_eq!(sa.ranges, 6);
    assert_eq!(sa.bytes, size);
    assert_eq!(a.total(), records.len() as u64);
}

/// Registry slugs widen the line-length bounds the scanner trusts.
#[test]
fn registry_only_slug_is_resolved() {
    let dir = tempfile::tempdir().unwrap();
    let records = vec![rec("a", "2024-01-05"), rec("a", "2024-01-05"), rec("from-registry", "2024-02-01")];
    let path = write_log(dir.path(), "log.csv", &records);

    let registry = StaticRegistry::new([format!("{HOST}from-registry")]);
    let dates = DateIndex::build(2020..=2027).unwrap();
    let paths = discover(&path, DiscoveryMode::Prefix { sample_bytes: line_len("a") }, Some(&registry)).unwrap();
    assert_eq!(paths.len(), 2);

    let (m, _) = scan(&path, full_range(&path), &paths, &dates, UnknownSlugPolicy::Fail, SMALL_BUF).unwrap();
    assert_eq!(m.get(1, dates.id_of("2024-02-01").unwrap()), 1);
}

/// Lines longer than every known slug, and shorter ones, interleaved with known
/// lines inside one large read: each is skipped on its own and no known line is lost.
#[test]
fn oversized_and_short_lines_inside_one_read() {
    let dir = tempfile::tempdir().unwrap();
    let oversized = "u".repeat(300);
    let mut records = Vec::new();
    for i in 0..400 {
        records.push(rec("ab", if i % 2 == 0 { "2024-01-05" } else { "2024-01-06" }));
        if i % 37 == 5 {
            records.push(rec(&oversized, "2024-01-05"));
        }
        if i % 53 == 7 {
            records.push(rec("", "2024-01-05"));
        }
    }
    let unknown = records.iter().filter(|(s, _)| s != "ab").count() as u64;
    let path = write_log(dir.path(), "log.csv", &records);

    let dates = DateIndex::build(2020..=2027).unwrap();
    let paths = discover(&path, DiscoveryMode::Prefix { sample_bytes: line_len("ab") }, None).unwrap();
    assert_eq!(paths.max_line_len() as u64, line_len("ab") - 1);

    let mut file = File::open(&path).unwrap();
    let counter = CountMatrix::new(paths.len(), dates.len());
    let mut scanner = Scanner::new(&paths, &dates, UnknownSlugPolicy::Skip, counter, 1 << 20);
    let delta = scanner.scan_range(&mut file, full_range(&path)).unwrap();
    assert_eq!(scanner.stats(), delta);

    let (m, stats) = scanner.finish().unwrap();
    assert_eq!(stats.lines, 400);
    assert_eq!(stats.skipped, unknown);
    assert_eq!(m.get(0, dates.id_of("2024-01-05").unwrap()), 200);
    assert_eq!(m.get(0, dates.id_of("2024-01-06").unwrap()), 200);
}
