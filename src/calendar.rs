//! Calendar-month truncation.
//!
//! Every month bucket in the crate goes through [`MonthKey`], so monthly
//! revenue, cohort assignment and activity months share one rule:
//!
//! - `yyyymmdd` integer keys are read as calendar dates
//! - dates and timestamps without an offset are truncated as written
//! - timestamps with an explicit offset are converted to UTC first
//! - `YYYY-MM` strings name the month directly

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A calendar month, stored as the first day of that month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MonthKey(NaiveDate);

impl MonthKey {
    /// Creates a month key, returning `None` for an out-of-range month.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(MonthKey)
    }

    /// Truncates a calendar date to its month.
    pub fn from_date(date: NaiveDate) -> Self {
        MonthKey(date.with_day(1).unwrap_or(date))
    }

    /// Reads a `yyyymmdd` surrogate date key (e.g. `20180314`).
    pub fn from_date_key(key: i64) -> Option<Self> {
        if !(10000101..=99991231).contains(&key) {
            return None;
        }
        let year = (key / 10000) as i32;
        let month = ((key / 100) % 100) as u32;
        let day = (key % 100) as u32;
        NaiveDate::from_ymd_opt(year, month, day).map(Self::from_date)
    }

    /// Parses any of the textual date shapes found in date dimensions.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();

        if text.len() == 8 && text.bytes().all(|b| b.is_ascii_digit()) {
            return text.parse::<i64>().ok().and_then(Self::from_date_key);
        }

        if text.len() == 7 {
            return NaiveDate::parse_from_str(&format!("{}-01", text), "%Y-%m-%d")
                .ok()
                .map(MonthKey);
        }

        if let Ok(timestamp) = DateTime::parse_from_rfc3339(text) {
            return Some(Self::from_date(timestamp.with_timezone(&Utc).date_naive()));
        }
        if let Ok(timestamp) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%:z") {
            return Some(Self::from_date(timestamp.with_timezone(&Utc).date_naive()));
        }

        let date_part = text.get(..10)?;
        let rest = &text[10..];
        if !(rest.is_empty() || rest.starts_with('T') || rest.starts_with(' ')) {
            return None;
        }
        NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
            .ok()
            .map(Self::from_date)
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn first_day(&self) -> NaiveDate {
        self.0
    }

    /// Whole calendar months from `self` to `later` (negative if `later` is earlier).
    pub fn months_until(&self, later: &MonthKey) -> i64 {
        let from = self.year() as i64 * 12 + self.month() as i64;
        let to = later.year() as i64 * 12 + later.month() as i64;
        to - from
    }

    /// `YYYY-MM`, the label used for cohort rows.
    pub fn label(&self) -> String {
        self.0.format("%Y-%m").to_string()
    }
}

impl std::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for MonthKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MonthKey::parse(s).ok_or_else(|| format!("not a recognizable date: {:?}", s))
    }
}
