// src/retention.rs

use crate::model::Date;
use chrono::{Datelike, Duration};
use std::collections::BTreeSet;

/// Grandfather-father-son retention: recent days, Monday of recent weeks,
/// and (roughly) the first Monday of recent months.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub days: u32,
    pub weeks: u32,
    pub months: u32,
}

impl RetentionPolicy {
    pub fn new(days: u32, weeks: u32, months: u32) -> Self {
        Self { days, weeks, months }
    }

    /// Computes the dates whose archives must survive a run on `today`.
    pub fn keep_set(&self, today: Date) -> BTreeSet<Date> {
        let mut keep = BTreeSet::new();

        for i in 0..self.days {
            keep.insert(today - Duration::days(i as i64));
        }

        let prev_monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
        for i in 0..self.weeks {
            keep.insert(prev_monday - Duration::days(7 * i as i64));
        }

        // Snapping by day-of-month / 7 weeks does not always land on the
        // first Monday of the month; archives on disk depend on it as is.
        let mut first_monday = prev_monday - snap_back(today);
        for _ in 0..self.months {
            keep.insert(first_monday);
            first_monday = first_monday - Duration::days(7);
            first_monday = first_monday - snap_back(first_monday);
        }

        keep
    }
}

fn snap_back(date: Date) -> Duration {
    Duration::days((date.day() / 7 * 7) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(s: &str) -> Date {
        s.parse().unwrap()
    }

    fn dates(list: &[&str]) -> BTreeSet<Date> {
        list.iter().map(|s| date(s)).collect()
    }

    #[test]
    fn daily_tier_covers_today_and_previous_days() {
        let keep = RetentionPolicy::new(3, 0, 0).keep_set(date("2024-01-17"));
        assert_eq!(keep, dates(&["2024-01-15", "2024-01-16", "2024-01-17"]));
    }

    #[test]
    fn weekly_tier_starts_at_previous_monday() {
        let keep = RetentionPolicy::new(0, 3, 0).keep_set(date("2024-01-17"));
        assert_eq!(keep, dates(&["2024-01-01", "2024-01-08", "2024-01-15"]));
    }

    #[test]
    fn weekly_tier_on_a_monday_includes_today() {
        let keep = RetentionPolicy::new(0, 1, 0).keep_set(date("2024-01-15"));
        assert_eq!(keep, dates(&["2024-01-15"]));
    }

    #[test]
    fn monthly_tier_steps_back_month_by_month() {
        let keep = RetentionPolicy::new(0, 0, 3).keep_set(date("2024-01-17"));
        assert_eq!(keep, dates(&["2023-11-06", "2023-12-04", "2024-01-01"]));
    }

    #[test]
    fn monthly_tier_keeps_day_of_month_approximation() {
        // 2024-03-07 snaps back into February rather than to 2024-03-04.
        let keep = RetentionPolicy::new(0, 0, 1).keep_set(date("2024-03-07"));
        assert_eq!(keep, dates(&["2024-02-26"]));
    }

    #[test]
    fn tiers_are_merged_without_duplicates() {
        let keep = RetentionPolicy::new(7, 5, 3).keep_set(date("2024-01-17"));
        assert_eq!(
            keep,
            dates(&[
                "2023-11-06",
                "2023-12-04",
                "2023-12-18",
                "2023-12-25",
                "2024-01-01",
                "2024-01-08",
                "2024-01-11",
                "2024-01-12",
                "2024-01-13",
                "2024-01-14",
                "2024-01-15",
                "2024-01-16",
                "2024-01-17",
            ])
        );
    }

    #[test]
    fn empty_policy_keeps_nothing() {
        assert!(RetentionPolicy::new(0, 0, 0).keep_set(date("2024-01-17")).is_empty());
    }

    #[test]
    fn daily_dates_stay_within_window() {
        let today = date("2024-02-29");
        for days in 1..40 {
            let keep = RetentionPolicy::new(days, 2, 2).keep_set(today);
            assert!(keep.contains(&today));
            let oldest = today - Duration::days(days as i64 - 1);
            let daily: Vec<_> = keep.iter().filter(|d| **d >= oldest).collect();
            assert!(daily.len() >= days as usize);
            assert!(keep.iter().all(|d| *d <= today));
        }
    }

    #[test]
    fn keep_set_is_deterministic() {
        let policy = RetentionPolicy::new(7, 5, 12);
        let today = date("2023-10-31");
        assert_eq!(policy.keep_set(today), policy.keep_set(today));
    }
}
