//! Query window for expansion and composition.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::error::{ArchiveError, ArchiveResult};

/// Days before "now" covered by the default window
pub const DEFAULT_PAST_DAYS: i64 = 90;
/// Days after "now" covered by the default window
pub const DEFAULT_FUTURE_DAYS: i64 = 365;

/// Half-open time window `[from, to)` over which definitions are expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> ArchiveResult<Self> {
        if from >= to {
            return Err(ArchiveError::Config(format!(
                "Window start {} is not before window end {}",
                from.to_rfc3339(),
                to.to_rfc3339()
            )));
        }
        Ok(TimeWindow { from, to })
    }

    /// Window spanning `past` before and `future` after `now`.
    pub fn around(now: DateTime<Utc>, past: Duration, future: Duration) -> ArchiveResult<Self> {
        let out_of_range = || {
            ArchiveError::Config(format!(
                "Window of -{} / +{} around {} is out of range",
                past,
                future,
                now.to_rfc3339()
            ))
        };
        let from = now.checked_sub_signed(past).ok_or_else(out_of_range)?;
        let to = now.checked_add_signed(future).ok_or_else(out_of_range)?;
        Self::new(from, to)
    }

    /// Default window: DEFAULT_PAST_DAYS back, DEFAULT_FUTURE_DAYS ahead of `now`.
    pub fn default_at(now: DateTime<Utc>) -> Self {
        TimeWindow {
            from: now - Duration::days(DEFAULT_PAST_DAYS),
            to: now + Duration::days(DEFAULT_FUTURE_DAYS),
        }
    }

    /// Build a window from command-line style arguments.
    /// - `from`: "start" for unbounded past, or YYYY-MM-DD; falls back to `fallback.from`
    /// - `to`: YYYY-MM-DD (inclusive day); falls back to `fallback.to`
    pub fn from_args(
        from: Option<&str>,
        to: Option<&str>,
        fallback: &TimeWindow,
    ) -> ArchiveResult<Self> {
        let from_dt = match from {
            Some("start") => DateTime::<Utc>::UNIX_EPOCH,
            Some(s) => parse_date_start(s)?,
            None => fallback.from,
        };

        let to_dt = match to {
            Some(s) => parse_date_start(s)?
                .checked_add_signed(Duration::days(1))
                .ok_or_else(|| ArchiveError::Config(format!("Date '{}' is out of range", s)))?,
            None => fallback.to,
        };

        Self::new(from_dt, to_dt)
    }

    /// Whether `[start, end)` intersects the window. Zero-length ranges
    /// count when their instant lies inside the window.
    pub fn intersects(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        if start == end {
            return self.from <= start && start < self.to;
        }
        start < self.to && self.from < end
    }
}

/// Parse YYYY-MM-DD as start of day in UTC
fn parse_date_start(s: &str) -> ArchiveResult<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
        ArchiveError::Config(format!("Invalid date format '{}'. Expected YYYY-MM-DD", s))
    })?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window() -> TimeWindow {
        TimeWindow::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_from_args_to_is_inclusive_day() {
        let w = TimeWindow::from_args(Some("2024-03-01"), Some("2024-03-31"), &window()).unwrap();
        assert_eq!(w.from, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(w.to, Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_from_args_rejects_bad_dates_and_reversed_windows() {
        assert!(TimeWindow::from_args(Some("03/01/2024"), None, &window()).is_err());
        assert!(TimeWindow::from_args(Some("2024-05-01"), Some("2024-04-01"), &window()).is_err());
    }

    #[test]
    fn test_around_out_of_range_is_config_error() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        // Representable as a Duration, but not as a date this far from now
        let huge = Duration::days(270_000 * 365);
        assert!(matches!(
            TimeWindow::around(now, huge, Duration::days(1)),
            Err(ArchiveError::Config(_))
        ));
        assert!(TimeWindow::around(now, Duration::days(1), huge).is_err());
        assert!(TimeWindow::around(now, Duration::days(1), Duration::days(1)).is_ok());
    }

    #[test]
    fn test_intersects_is_half_open() {
        let w = window();
        let end_of_window = w.to;
        assert!(!w.intersects(end_of_window, end_of_window + Duration::hours(1)));
        assert!(!w.intersects(w.from - Duration::hours(1), w.from));
        assert!(w.intersects(w.from - Duration::hours(1), w.from + Duration::seconds(1)));
        assert!(w.intersects(w.from, w.from));
    }
}
