//! Post-count time series for top channels
//!
//! Turns the sparse `(channel, bucket, count)` rows returned by an
//! [`ActivitySource`] into one dense series per channel. Every series covers
//! the same buckets, from the window start up to the bucket containing "now",
//! with zeros where a channel had no posts.
//!
//! Buckets are local-calendar hours or days in the caller's timezone, so a
//! DST day yields 23 or 25 hourly buckets and daily buckets always start at
//! local midnight.

use crate::error::{Error, Result};
use crate::source::{ActivitySource, BucketPostCount, PostCountQuery};
use crate::window::{earliest_valid_instant, local_midnight, Granularity, ResolvedWindow};
use chrono::{DateTime, Days, Duration, LocalResult, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Posts in one channel during one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BucketCount {
    pub bucket_start: DateTime<Utc>,
    pub count: i64,
}

/// Dense per-channel post counts, keyed by channel id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChannelPostCountSeries {
    series: BTreeMap<String, Vec<BucketCount>>,
}

impl ChannelPostCountSeries {
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Number of channels in the series.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn get(&self, channel_id: &str) -> Option<&[BucketCount]> {
        self.series.get(channel_id).map(Vec::as_slice)
    }

    pub fn channel_ids(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[BucketCount])> {
        self.series
            .iter()
            .map(|(id, counts)| (id.as_str(), counts.as_slice()))
    }

    /// Buckets per channel; identical for every channel.
    pub fn bucket_count(&self) -> usize {
        self.series.values().next().map_or(0, Vec::len)
    }

    /// Sum of all buckets for one channel, zero when the channel is absent.
    pub fn total_for(&self, channel_id: &str) -> i64 {
        self.get(channel_id)
            .map_or(0, |counts| counts.iter().map(|b| b.count).sum())
    }
}

/// Inputs for one series build.
#[derive(Debug, Clone)]
pub struct SeriesRequest<'a> {
    pub channel_ids: &'a [String],
    pub start: DateTime<Utc>,
    pub now: DateTime<Utc>,
    pub timezone: Tz,
    pub granularity: Granularity,
    /// Count only this user's posts
    pub user_id: Option<&'a str>,
    /// Anchor the first bucket at the earliest activity instead of `start`
    pub unbounded: bool,
}

impl<'a> SeriesRequest<'a> {
    pub fn for_window(window: &ResolvedWindow, channel_ids: &'a [String]) -> Self {
        Self {
            channel_ids,
            start: window.start,
            now: window.now,
            timezone: window.timezone,
            granularity: window.granularity(),
            user_id: None,
            unbounded: window.is_unbounded(),
        }
    }

    pub fn for_user(mut self, user_id: Option<&'a str>) -> Self {
        self.user_id = user_id;
        self
    }
}

/// Start of the local bucket containing `ts`.
pub fn truncate_to_bucket(
    ts: DateTime<Utc>,
    granularity: Granularity,
    timezone: &Tz,
) -> DateTime<Utc> {
    let local = ts.with_timezone(timezone);
    match granularity {
        Granularity::Daily => local_midnight(local.date_naive(), timezone),
        Granularity::Hourly => {
            let hour = local
                .date_naive()
                .and_hms_opt(local.hour(), 0, 0)
                .unwrap_or_else(|| local.naive_local());
            match timezone.from_local_datetime(&hour) {
                LocalResult::Single(dt) => dt.with_timezone(&Utc),
                // Repeated hour: take the occurrence `ts` actually falls in.
                LocalResult::Ambiguous(earliest, latest) => {
                    let latest = latest.with_timezone(&Utc);
                    if latest <= ts {
                        latest
                    } else {
                        earliest.with_timezone(&Utc)
                    }
                }
                LocalResult::None => earliest_valid_instant(hour, timezone),
            }
        }
    }
}

/// Start of the bucket following the one starting at `bucket_start`.
fn next_bucket(
    bucket_start: DateTime<Utc>,
    granularity: Granularity,
    timezone: &Tz,
) -> DateTime<Utc> {
    let next = match granularity {
        Granularity::Hourly => {
            truncate_to_bucket(bucket_start + Duration::hours(1), granularity, timezone)
        }
        Granularity::Daily => {
            let date = bucket_start.with_timezone(timezone).date_naive();
            match date.checked_add_days(Days::new(1)) {
                Some(tomorrow) => local_midnight(tomorrow, timezone),
                None => bucket_start + Duration::days(1),
            }
        }
    };

    if next > bucket_start {
        next
    } else {
        bucket_start + Duration::hours(1)
    }
}

/// Bucket starts from the bucket containing `first` through the bucket
/// containing `now`. Always yields at least one bucket.
pub fn bucket_starts(
    first: DateTime<Utc>,
    now: DateTime<Utc>,
    granularity: Granularity,
    timezone: &Tz,
) -> Vec<DateTime<Utc>> {
    let mut cursor = truncate_to_bucket(first, granularity, timezone);
    let mut starts = vec![cursor];
    loop {
        cursor = next_bucket(cursor, granularity, timezone);
        if cursor > now {
            break;
        }
        starts.push(cursor);
    }
    starts
}

/// Build dense per-channel series with a single data-source call.
///
/// An empty channel list returns an empty series without touching the source.
pub fn build<S>(source: &S, request: &SeriesRequest<'_>) -> Result<ChannelPostCountSeries>
where
    S: ActivitySource + ?Sized,
{
    if request.channel_ids.is_empty() {
        return Ok(ChannelPostCountSeries::default());
    }

    let query = PostCountQuery {
        channel_ids: request.channel_ids,
        since: request.start,
        granularity: request.granularity,
        timezone: request.timezone,
        user_id: request.user_id,
    };
    let rows = source
        .post_counts_by_bucket(&query)
        .map_err(|e| Error::data_source("post_counts_by_bucket", e))?;

    let wanted: BTreeSet<&str> = request.channel_ids.iter().map(String::as_str).collect();
    let tz = &request.timezone;

    let first = if request.unbounded {
        rows.iter()
            .filter(|row| wanted.contains(row.channel_id.as_str()))
            .map(|row| row.bucket_start)
            .min()
            .unwrap_or(request.now)
    } else {
        request.start
    };

    let starts = bucket_starts(first, request.now, request.granularity, tz);
    let end = starts
        .last()
        .map(|last| next_bucket(*last, request.granularity, tz))
        .unwrap_or(request.now);

    let mut series: BTreeMap<String, Vec<BucketCount>> = wanted
        .iter()
        .map(|id| {
            let zeros = starts
                .iter()
                .map(|&bucket_start| BucketCount {
                    bucket_start,
                    count: 0,
                })
                .collect();
            (id.to_string(), zeros)
        })
        .collect();

    for row in rows {
        place_row(&mut series, &starts, end, row);
    }

    tracing::debug!(
        channels = series.len(),
        buckets = starts.len(),
        granularity = ?request.granularity,
        "Built post count series"
    );

    Ok(ChannelPostCountSeries { series })
}

fn place_row(
    series: &mut BTreeMap<String, Vec<BucketCount>>,
    starts: &[DateTime<Utc>],
    end: DateTime<Utc>,
    row: BucketPostCount,
) {
    let Some(counts) = series.get_mut(&row.channel_id) else {
        tracing::debug!(
            channel_id = %row.channel_id,
            "Ignoring counts for unrequested channel"
        );
        return;
    };

    if row.bucket_start >= end {
        tracing::debug!(
            channel_id = %row.channel_id,
            bucket = %row.bucket_start,
            "Ignoring counts after window"
        );
        return;
    }

    // Index of the last bucket starting at or before the row.
    match starts.partition_point(|start| *start <= row.bucket_start) {
        0 => {
            tracing::debug!(
                channel_id = %row.channel_id,
                bucket = %row.bucket_start,
                "Ignoring counts before window"
            );
        }
        idx => counts[idx - 1].count += row.count.max(0),
    }
}
