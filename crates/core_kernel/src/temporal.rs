//! Temporal helpers for the ledger
//!
//! All timestamps in the system are UTC. These helpers provide the calendar
//! day boundaries used by the daily balance series and period queries.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors related to temporal operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Invalid period: start {start} must not be after end {end}")]
    InvalidPeriod { start: String, end: String },
}

/// Start of day (00:00:00) for a calendar date, in UTC
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight always exists"))
}

/// End of day (23:59:59.999999999) for a calendar date, in UTC
pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(
        &date
            .and_hms_nano_opt(23, 59, 59, 999_999_999)
            .expect("end of day always exists"),
    )
}

/// An inclusive calendar date range used by period queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a range; fails if start is after end
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, TemporalError> {
        if start > end {
            return Err(TemporalError::InvalidPeriod {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Returns true if the range contains the given date
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Returns true if the range contains the given instant
    pub fn contains_instant(&self, instant: DateTime<Utc>) -> bool {
        instant >= start_of_day(self.start) && instant <= end_of_day(self.end)
    }

    /// Number of calendar days in the range, inclusive
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Iterates every calendar day in the range
    pub fn iter_days(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        let days = self.days();
        (0..days).map(move |offset| start + Duration::days(offset))
    }

    /// The UTC instant at which the range begins
    pub fn start_instant(&self) -> DateTime<Utc> {
        start_of_day(self.start)
    }

    /// The UTC instant at which the range ends
    pub fn end_instant(&self) -> DateTime<Utc> {
        end_of_day(self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_range_rejects_inverted_bounds() {
        assert!(DateRange::new(date(2025, 1, 10), date(2025, 1, 1)).is_err());
    }

    #[test]
    fn test_range_days_inclusive() {
        let range = DateRange::new(date(2025, 1, 1), date(2025, 1, 3)).unwrap();
        assert_eq!(range.days(), 3);
        let days: Vec<_> = range.iter_days().collect();
        assert_eq!(days, vec![date(2025, 1, 1), date(2025, 1, 2), date(2025, 1, 3)]);
    }

    #[test]
    fn test_day_boundaries() {
        let d = date(2025, 1, 15);
        assert!(start_of_day(d) < end_of_day(d));
        let range = DateRange::new(d, d).unwrap();
        assert!(range.contains_instant(end_of_day(d)));
        assert!(!range.contains_instant(start_of_day(date(2025, 1, 16))));
    }
}
