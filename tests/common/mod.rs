#![allow(dead_code)]

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const HOST: &str = "https://stitcher.io/blog/";

/// One access-log record for `slug` on `date` (YYYY-MM-DD), newline excluded.
pub fn line(slug: &str, date: &str) -> String {
    format!("{HOST}{slug},{date}T12:34:56+00:00")
}

/// Byte length of `line(slug, date)` plus its newline.
pub fn line_len(slug: &str) -> u64 {
    (HOST.len() + slug.len() + 26 + 1) as u64
}

/// Write `records` as newline-terminated lines into `dir/name`.
pub fn write_log(dir: &Path, name: &str, records: &[(String, String)]) -> PathBuf {
    let path = dir.join(name);
    let mut w = BufWriter::new(File::create(&path).unwrap());
    for (slug, date) in records {
        writeln!(w, "{}", line(slug, date)).unwrap();
    }
    w.flush().unwrap();
    path
}

/// Same as `write_log` but without a trailing newline on the last line.
pub fn write_log_unterminated(dir: &Path, name: &str, records: &[(String, String)]) -> PathBuf {
    let body: Vec<String> = records.iter().map(|(s, d)| line(s, d)).collect();
    let path = dir.join(name);
    fs::write(&path, body.join("\n")).unwrap();
    path
}

pub fn rec(slug: &str, date: &str) -> (String, String) {
    (slug.to_string(), date.to_string())
}

/// Deterministic pseudo-random records: slugs of uneven length (some nested with
/// `/`), dates spread over 2020..=2027.
pub fn synthetic(n: usize, seed: u64) -> Vec<(String, String)> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let mut next = move || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (state >> 33) as usize
    };
    let slugs: Vec<String> = (0..40)
        .map(|i| match i % 4 {
            0 => format!("p{i}"),
            1 => format!("a-much-longer-article-slug-number-{i}"),
            2 => format!("series/part-{i}"),
            _ => format!("{}-{i}", "x".repeat(i)),
        })
        .collect();
    let days_in_month = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    (0..n)
        .map(|_| {
            let slug = slugs[next() % slugs.len()].clone();
            let year = 2020 + next() % 8;
            let month = 1 + next() % 12;
            let day = 1 + next() % days_in_month[month - 1];
            (slug, format!("{year:04}-{month:02}-{day:02}"))
        })
        .collect()
}

/// Occurrence count per (slug, date).
pub fn expected_counts(records: &[(String, String)]) -> HashMap<(String, String), u32> {
    let mut m = HashMap::new();
    for r in records {
        *m.entry(r.clone()).or_insert(0) += 1;
    }
    m
}

pub fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

pub fn dir_entries(dir: &Path) -> usize {
    fs::read_dir(dir).unwrap().count()
}
