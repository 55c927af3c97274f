use crate::error::ReviewError;
use anyhow::Result;
use chrono::{DateTime, Duration, LocalResult, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

/// Inclusive time range a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }

    pub fn last_hours(now: DateTime<Utc>, hours: u32) -> Result<Self> {
        if hours == 0 {
            return Err(ReviewError::InvalidWindow("--hours must be at least 1".to_string()).into());
        }
        Ok(Self {
            start: now - Duration::hours(i64::from(hours)),
            end: now,
        })
    }

    /// Local midnight to the next local midnight of `date` in `tz`.
    pub fn for_local_date(date: NaiveDate, tz: Tz) -> Result<Self> {
        let next = date
            .succ_opt()
            .ok_or_else(|| ReviewError::InvalidWindow(format!("no day after {date}")))?;
        Ok(Self {
            start: local_midnight(date, tz)?,
            end: local_midnight(next, tz)?,
        })
    }
}

fn local_midnight(date: NaiveDate, tz: Tz) -> Result<DateTime<Utc>> {
    let naive = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| ReviewError::InvalidWindow(format!("bad date {date}")))?;
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        // Midnight skipped by a DST jump; the day starts an hour later.
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| {
                ReviewError::InvalidWindow(format!("{date} has no local midnight in {tz}")).into()
            }),
    }
}

pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|err| {
        ReviewError::InvalidWindow(format!("invalid date `{raw}` (want YYYY-MM-DD): {err}")).into()
    })
}

#[cfg(test)]
mod tests {
    use super::{TimeWindow, parse_date};
    use chrono::{TimeZone, Utc};

    #[test]
    fn local_date_window_spans_local_midnights() {
        let date = parse_date("2026-02-15").expect("date");
        let window = TimeWindow::for_local_date(date, chrono_tz::America::Los_Angeles).expect("window");
        assert_eq!(window.start, Utc.with_ymd_and_hms(2026, 2, 15, 8, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2026, 2, 16, 8, 0, 0).unwrap());
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let now = Utc.with_ymd_and_hms(2026, 2, 15, 12, 0, 0).unwrap();
        let window = TimeWindow::last_hours(now, 24).expect("window");
        assert!(window.contains(window.start));
        assert!(window.contains(now));
        assert!(!window.contains(now + chrono::Duration::seconds(1)));
    }

    #[test]
    fn zero_hours_and_bad_dates_are_rejected() {
        let now = Utc.with_ymd_and_hms(2026, 2, 15, 12, 0, 0).unwrap();
        assert!(TimeWindow::last_hours(now, 0).is_err());
        assert!(parse_date("15/02/2026").is_err());
    }
}
