//! Time range resolution
//!
//! Maps a symbolic range token ("today", "7_day", "28_day", "all_time") plus the
//! caller's timezone into a concrete start instant on a local calendar
//! boundary.
//!
//! Day boundaries are computed on the local calendar, never by subtracting a
//! fixed number of hours, so a 23 or 25 hour DST day still starts at local
//! midnight.

use crate::error::{Error, Result};
use crate::types::InsightsQueryOptions;
use chrono::{
    DateTime, Days, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Symbolic time range requested by a dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "today")]
    Today,
    #[serde(rename = "7_day")]
    Last7Days,
    #[serde(rename = "28_day")]
    Last28Days,
    #[serde(rename = "all_time")]
    AllTime,
}

impl TimeRange {
    /// Every supported range, shortest first.
    pub const ALL: [TimeRange; 4] = [
        TimeRange::Today,
        TimeRange::Last7Days,
        TimeRange::Last28Days,
        TimeRange::AllTime,
    ];

    /// Wire token for this range.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::Today => "today",
            TimeRange::Last7Days => "7_day",
            TimeRange::Last28Days => "28_day",
            TimeRange::AllTime => "all_time",
        }
    }

    /// Calendar days covered by the range, `None` when unbounded.
    pub fn number_of_days(&self) -> Option<u32> {
        match self {
            TimeRange::Today => Some(1),
            TimeRange::Last7Days => Some(7),
            TimeRange::Last28Days => Some(28),
            TimeRange::AllTime => None,
        }
    }

    /// Bucket width for post-count series over this range.
    pub fn granularity(&self) -> Granularity {
        match self {
            TimeRange::Today => Granularity::Hourly,
            _ => Granularity::Daily,
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TimeRange::ALL
            .into_iter()
            .find(|range| range.as_str() == s)
            .ok_or_else(|| {
                Error::InvalidRange(format!(
                    "{:?}; valid values are today, 7_day, 28_day, all_time",
                    s
                ))
            })
    }
}

/// Width of one time-series bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hourly,
    Daily,
}

/// A time range pinned to a concrete start instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedWindow {
    pub range: TimeRange,
    /// First instant included in the window (epoch for `AllTime`)
    pub start: DateTime<Utc>,
    /// Timezone the calendar boundaries were computed in
    pub timezone: Tz,
    /// Instant the window was resolved at
    pub now: DateTime<Utc>,
}

impl ResolvedWindow {
    pub fn start_unix_millis(&self) -> i64 {
        self.start.timestamp_millis()
    }

    pub fn granularity(&self) -> Granularity {
        self.range.granularity()
    }

    /// True when the window has no lower bound.
    pub fn is_unbounded(&self) -> bool {
        self.range.number_of_days().is_none()
    }

    /// Window start expressed in the caller's timezone.
    pub fn local_start(&self) -> DateTime<Tz> {
        self.start.with_timezone(&self.timezone)
    }

    /// Build query options starting at this window.
    pub fn query_options(&self, page: u32, per_page: u32) -> Result<InsightsQueryOptions> {
        InsightsQueryOptions::new(self.start_unix_millis(), page, per_page)
    }
}

/// Resolve `range` against the caller's timezone at instant `now`.
pub fn resolve(range: TimeRange, timezone: Tz, now: DateTime<Utc>) -> ResolvedWindow {
    let start = match range.number_of_days() {
        Some(days) => {
            let today = now.with_timezone(&timezone).date_naive();
            let first_day = today
                .checked_sub_days(Days::new(u64::from(days.saturating_sub(1))))
                .unwrap_or(NaiveDate::MIN);
            local_midnight(first_day, &timezone)
        }
        None => unix_epoch(),
    };

    tracing::trace!(
        range = %range,
        timezone = %timezone,
        start = %start,
        "Resolved time range"
    );

    ResolvedWindow {
        range,
        start,
        timezone,
        now,
    }
}

/// The sentinel start of an unbounded window.
pub fn unix_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from(std::time::UNIX_EPOCH)
}

/// Parse a range token and resolve it.
pub fn resolve_token(token: &str, timezone: Tz, now: DateTime<Utc>) -> Result<ResolvedWindow> {
    let range: TimeRange = token.parse()?;
    Ok(resolve(range, timezone, now))
}

/// First instant of `date` on the local calendar of `timezone`.
///
/// An ambiguous midnight resolves to the earlier instant. When midnight falls
/// in a DST gap the first valid local time of the day is used.
pub fn local_midnight(date: NaiveDate, timezone: &Tz) -> DateTime<Utc> {
    earliest_valid_instant(date.and_time(NaiveTime::MIN), timezone)
}

/// Map a local wall-clock time to an instant, moving forward out of DST gaps.
pub(crate) fn earliest_valid_instant(local: NaiveDateTime, timezone: &Tz) -> DateTime<Utc> {
    let mut candidate = local;
    // Offsets move in 15 minute steps, so walking a gap in quarters lands on its end.
    for _ in 0..(24 * 4) {
        match timezone.from_local_datetime(&candidate) {
            LocalResult::Single(dt) => return dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => return earliest.with_timezone(&Utc),
            LocalResult::None => candidate += Duration::minutes(15),
        }
    }
    local.and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_parse_tokens() {
        assert_eq!("today".parse::<TimeRange>().unwrap(), TimeRange::Today);
        assert_eq!("7_day".parse::<TimeRange>().unwrap(), TimeRange::Last7Days);
        assert_eq!("28_day".parse::<TimeRange>().unwrap(), TimeRange::Last28Days);
        assert_eq!("all_time".parse::<TimeRange>().unwrap(), TimeRange::AllTime);

        for bad in ["", "Today", "30_day", "1_day", "7day"] {
            assert!(
                matches!(bad.parse::<TimeRange>(), Err(Error::InvalidRange(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_display_round_trips_through_from_str() {
        for range in TimeRange::ALL {
            assert_eq!(range.to_string().parse::<TimeRange>().unwrap(), range);
        }
    }

    #[test]
    fn test_granularity() {
        assert_eq!(TimeRange::Today.granularity(), Granularity::Hourly);
        assert_eq!(TimeRange::Last7Days.granularity(), Granularity::Daily);
        assert_eq!(TimeRange::Last28Days.granularity(), Granularity::Daily);
        assert_eq!(TimeRange::AllTime.granularity(), Granularity::Daily);
    }

    #[test]
    fn test_today_utc() {
        let window = resolve(TimeRange::Today, Tz::UTC, utc("2024-03-10T15:00:00Z"));
        assert_eq!(window.start, utc("2024-03-10T00:00:00Z"));
        assert_eq!(window.granularity(), Granularity::Hourly);
        assert!(!window.is_unbounded());
    }

    #[test]
    fn test_today_uses_local_date() {
        // 02:30 UTC on the 11th is still the evening of the 10th in Los Angeles (PDT, UTC-7).
        let tz: Tz = "America/Los_Angeles".parse().unwrap();
        let window = resolve(TimeRange::Today, tz, utc("2024-03-11T02:30:00Z"));
        assert_eq!(window.start, utc("2024-03-10T08:00:00Z"));
        assert_eq!(
            window.local_start().date_naive(),
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
        );
    }

    #[test]
    fn test_last_7_days_across_spring_forward() {
        // New York switches to EDT on 2024-03-10.
        let tz: Tz = "America/New_York".parse().unwrap();
        let now = utc("2024-03-12T15:00:00Z");
        let window = resolve(TimeRange::Last7Days, tz, now);

        // Midnight EST on the 6th.
        assert_eq!(window.start, utc("2024-03-06T05:00:00Z"));

        let local = window.local_start();
        assert_eq!(local.date_naive(), NaiveDate::from_ymd_opt(2024, 3, 6).unwrap());
        assert_eq!((local.hour(), local.minute()), (0, 0));

        // Subtracting 144 fixed hours from today's midnight would land at 23:00 on the 5th.
        let today_midnight = resolve(TimeRange::Today, tz, now).start;
        assert_ne!(window.start, today_midnight - Duration::hours(144));
        assert_eq!(today_midnight - window.start, Duration::hours(143));
    }

    #[test]
    fn test_last_28_days_across_fall_back() {
        // London leaves BST on 2024-10-27.
        let tz: Tz = "Europe/London".parse().unwrap();
        let window = resolve(TimeRange::Last28Days, tz, utc("2024-11-05T12:00:00Z"));

        // 2024-10-09 is 27 days before 2024-11-05; midnight BST is 23:00 UTC the day before.
        assert_eq!(window.start, utc("2024-10-08T23:00:00Z"));
    }

    #[test]
    fn test_midnight_inside_dst_gap() {
        // Santiago skips from 00:00 to 01:00 on 2024-09-08.
        let tz: Tz = "America/Santiago".parse().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 9, 8).unwrap();
        let start = local_midnight(date, &tz).with_timezone(&tz);

        assert_eq!(start.date_naive(), date);
        assert_eq!((start.hour(), start.minute()), (1, 0));
    }

    #[test]
    fn test_all_time_is_epoch() {
        let window = resolve(TimeRange::AllTime, Tz::UTC, utc("2024-03-10T15:00:00Z"));
        assert_eq!(window.start_unix_millis(), 0);
        assert!(window.is_unbounded());
    }

    #[test]
    fn test_start_is_always_a_local_midnight() {
        let zones = [
            "UTC",
            "America/New_York",
            "Europe/London",
            "Asia/Kolkata",
            "Australia/Lord_Howe",
            "Pacific/Chatham",
            "America/Santiago",
        ];
        let mut now = utc("2024-01-01T00:00:00Z");
        let end = utc("2025-01-01T00:00:00Z");

        while now < end {
            for name in zones {
                let tz: Tz = name.parse().unwrap();
                let today = now.with_timezone(&tz).date_naive();

                for range in [TimeRange::Today, TimeRange::Last7Days, TimeRange::Last28Days] {
                    let days = range.number_of_days().unwrap();
                    let window = resolve(range, tz, now);
                    let local = window.local_start();

                    let expected_date = today - Days::new(u64::from(days - 1));
                    assert_eq!(local.date_naive(), expected_date, "{} {} {}", name, range, now);

                    let midnight = expected_date.and_time(NaiveTime::MIN);
                    if tz.from_local_datetime(&midnight).earliest().is_some() {
                        assert_eq!(
                            (local.hour(), local.minute(), local.second()),
                            (0, 0, 0),
                            "{} {} {}",
                            name,
                            range,
                            now
                        );
                    }
                    assert!(window.start <= now);
                }
            }
            now += Duration::hours(37);
        }
    }

    #[test]
    fn test_resolve_token() {
        let now = utc("2024-03-10T15:00:00Z");
        let window = resolve_token("7_day", Tz::UTC, now).unwrap();
        assert_eq!(window.start, utc("2024-03-04T00:00:00Z"));

        assert!(matches!(
            resolve_token("yesterday", Tz::UTC, now),
            Err(Error::InvalidRange(_))
        ));
    }

    #[test]
    fn test_query_options_from_window() {
        let window = resolve(TimeRange::Today, Tz::UTC, utc("2024-03-10T15:00:00Z"));
        let opts = window.query_options(1, 10).unwrap();
        assert_eq!(opts.start_unix_millis(), window.start_unix_millis());
        assert_eq!(opts.offset(), 10);
    }
}
