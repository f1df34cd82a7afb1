//! Calendar keys: the per-visit month key and date-only expiry matching.

use crate::domain::errors::{DomainError, DomainResult};
use chrono::{DateTime, Datelike, Local, NaiveDate};
use std::fmt;
use std::str::FromStr;

/// Composite key addressing one patient visit: a calendar month.
///
/// Rendered as "YYYY-MM", which is also the storage representation, so
/// lexicographic ordering matches chronological ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> DomainResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(DomainError::validation(format!("Invalid month: {}", month)));
        }
        Ok(Self { year, month })
    }

    /// The month key for the current local date.
    pub fn current() -> Self {
        let now = Local::now();
        Self {
            year: now.year(),
            month: now.month(),
        }
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| DomainError::validation(format!("Invalid month key: {}", s)))?;
        let year: i32 = year
            .parse()
            .map_err(|_| DomainError::validation(format!("Invalid month key: {}", s)))?;
        let month: u32 = month
            .parse()
            .map_err(|_| DomainError::validation(format!("Invalid month key: {}", s)))?;
        Self::new(year, month)
    }
}

/// Parse an expiry value down to its calendar date.
///
/// Accepts RFC 3339 timestamps or plain "YYYY-MM-DD" dates; the
/// time-of-day component is discarded because batches are matched by
/// calendar date only.
pub fn parse_expiry_date(raw: &str) -> DomainResult<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.date_naive());
    }
    // Tolerate a bare datetime without offset before falling back to a date
    if let Ok(dt) = raw.parse::<chrono::NaiveDateTime>() {
        return Ok(dt.date());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| DomainError::validation(format!("Invalid expiry date: {}", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_key_round_trip() {
        let key = MonthKey::new(2024, 6).unwrap();
        assert_eq!(key.to_string(), "2024-06");
        assert_eq!("2024-06".parse::<MonthKey>().unwrap(), key);
    }

    #[test]
    fn test_month_key_rejects_invalid_month() {
        assert!(MonthKey::new(2024, 0).is_err());
        assert!(MonthKey::new(2024, 13).is_err());
        assert!("2024-13".parse::<MonthKey>().is_err());
        assert!("garbage".parse::<MonthKey>().is_err());
    }

    #[test]
    fn test_month_key_ordering_matches_string_ordering() {
        let earlier = MonthKey::new(2024, 9).unwrap();
        let later = MonthKey::new(2024, 10).unwrap();
        assert!(earlier < later);
        assert!(earlier.to_string() < later.to_string());
    }

    #[test]
    fn test_expiry_date_ignores_time_of_day() {
        let morning = parse_expiry_date("2024-12-01T08:30:00Z").unwrap();
        let evening = parse_expiry_date("2024-12-01T23:59:59+05:30").unwrap();
        let plain = parse_expiry_date("2024-12-01").unwrap();
        assert_eq!(morning, plain);
        // Different offsets can shift the calendar date; both parse, and
        // matching is purely on the resulting date.
        assert_eq!(evening, NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
    }

    #[test]
    fn test_expiry_date_rejects_garbage() {
        assert!(parse_expiry_date("soon").is_err());
        assert!(parse_expiry_date("2024/12/01").is_err());
    }
}
