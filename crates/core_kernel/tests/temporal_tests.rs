//! Unit tests for the temporal helpers
//!
//! Tests cover day boundaries and the inclusive date range used by period
//! queries.

use chrono::{NaiveDate, Timelike};
use core_kernel::temporal::TemporalError;
use core_kernel::{end_of_day, start_of_day, DateRange};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

mod day_boundaries {
    use super::*;

    #[test]
    fn test_start_of_day_is_midnight_utc() {
        let instant = start_of_day(date(2025, 6, 15));
        assert_eq!(instant.hour(), 0);
        assert_eq!(instant.minute(), 0);
        assert_eq!(instant.second(), 0);
    }

    #[test]
    fn test_end_of_day_is_last_instant() {
        let d = date(2025, 6, 15);
        assert!(end_of_day(d) > start_of_day(d));
        assert!(end_of_day(d) < start_of_day(date(2025, 6, 16)));
    }
}

mod date_range {
    use super::*;

    #[test]
    fn test_new_rejects_inverted_bounds() {
        assert!(matches!(
            DateRange::new(date(2025, 1, 10), date(2025, 1, 1)),
            Err(TemporalError::InvalidPeriod { .. })
        ));
    }

    #[test]
    fn test_single_day_range_is_valid() {
        let d = date(2025, 2, 28);
        let range = DateRange::new(d, d).unwrap();
        assert_eq!(range.days(), 1);
        assert!(range.contains(d));
    }

    #[test]
    fn test_days_and_iteration_are_inclusive() {
        let range = DateRange::new(date(2025, 1, 30), date(2025, 2, 2)).unwrap();
        assert_eq!(range.days(), 4);

        let days: Vec<_> = range.iter_days().collect();
        assert_eq!(
            days,
            vec![
                date(2025, 1, 30),
                date(2025, 1, 31),
                date(2025, 2, 1),
                date(2025, 2, 2),
            ]
        );
    }

    #[test]
    fn test_contains_instant_spans_whole_end_day() {
        let range = DateRange::new(date(2025, 3, 1), date(2025, 3, 2)).unwrap();
        assert!(range.contains_instant(start_of_day(date(2025, 3, 1))));
        assert!(range.contains_instant(end_of_day(date(2025, 3, 2))));
        assert!(!range.contains_instant(start_of_day(date(2025, 3, 3))));
    }

    #[test]
    fn test_instant_bounds_match_day_helpers() {
        let range = DateRange::new(date(2025, 4, 1), date(2025, 4, 30)).unwrap();
        assert_eq!(range.start_instant(), start_of_day(date(2025, 4, 1)));
        assert_eq!(range.end_instant(), end_of_day(date(2025, 4, 30)));
    }
}
