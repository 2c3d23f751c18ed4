use crate::layout::{DateKey, DATE_LEN};
use ahash::AHashMap;
use anyhow::{bail, Result};
use std::ops::RangeInclusive;
use time::{util::days_in_year_month, Month};

/// Every date id travels as a little-endian `u16`.
pub const MAX_DATES: usize = u16::MAX as usize + 1;

/// Dense enumeration of every calendar day in a window of whole years.
/// Ids ascend chronologically; built once, read-only afterwards.
#[derive(Clone, Debug)]
pub struct DateIndex {
    ids: AHashMap<DateKey, u16>,
    dates: Vec<String>, // canonical YYYY-MM-DD, indexed by id
}

impl DateIndex {
    /// Build the index for `years` (inclusive). The window must stay inside one
    /// century because lines only carry a two-digit year.
    pub fn build(years: RangeInclusive<u16>) -> Result<Self> {
        let (start, end) = (*years.start(), *years.end());
        if start > end {
            bail!("empty year window {start}..={end}");
        }
        if start / 100 != end / 100 {
            bail!("year window {start}..={end} spans a century boundary");
        }

        let mut ids = AHashMap::new();
        let mut dates = Vec::with_capacity((end - start + 1) as usize * 366);
        for year in start..=end {
            for m in 1..=12u8 {
                let month = Month::try_from(m)?;
                for day in 1..=days_in_year_month(year as i32, month) {
                    let full = format!("{year:04}-{m:02}-{day:02}");
                    if dates.len() >= MAX_DATES {
                        bail!("year window {start}..={end} exceeds {MAX_DATES} days");
                    }
                    ids.insert(truncated_key(&full), dates.len() as u16);
                    dates.push(full);
                }
            }
        }
        Ok(Self { ids, dates })
    }

    #[inline(always)]
    pub fn id(&self, key: &DateKey) -> Option<u16> {
        self.ids.get(key).copied()
    }

    /// Lookup by either `YYYY-MM-DD` or `YY-MM-DD`.
    pub fn id_of(&self, date: &str) -> Option<u16> {
        let b = date.as_bytes();
        let tail = match b.len() {
            10 => &b[2..],
            DATE_LEN => b,
            _ => return None,
        };
        self.id(tail.try_into().ok()?)
    }

    pub fn date(&self, id: u16) -> Option<&str> {
        self.dates.get(id as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.dates.iter().map(String::as_str)
    }
}

fn truncated_key(full: &str) -> DateKey {
    let mut key = [0u8; DATE_LEN];
    key.copy_from_slice(&full.as_bytes()[2..]);
    key
}
