//! # Aggregation
//!
//! Summary statistics and distance series for a filtered set of rides.
//!
//! Every series is contiguous: months, days or weeks without rides appear
//! with zero miles so the chart x-axis is a true calendar axis.
//!
//! | Selection | Series | Bucket key | Label |
//! |-----------|--------|------------|-------|
//! | All time / Year | [`monthly_series`] | `2024-03` | `Mar 2024` |
//! | Month, daily | [`daily_series`] | `2024-04-01` | `Apr 1` |
//! | Month, weekly | [`weekly_series`] | `week-2024-04-01` | `Week of Apr 1` |

use std::collections::HashMap;
use std::fmt;

use chrono::{Duration, NaiveDate};
use log::debug;
use serde::{Serialize, Serializer};

use crate::filter::{Granularity, RangeMode, RangeSelection};
use crate::{format_iso_date, ActivityRecord, MonthKey};

const DAYS_PER_WEEK: i64 = 7;

// ============================================================================
// Range Stats
// ============================================================================

/// Summary of a filtered range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeStats {
    pub total_miles: f64,
    pub activity_count: usize,
    /// Longest single ride in miles
    pub longest_ride: f64,
    /// Total miles over the inclusive calendar-day span (at least one day)
    pub average_miles_per_day: f64,
    /// First UTC day, `YYYY-MM-DD`
    pub start_date: String,
    /// Last UTC day, `YYYY-MM-DD`
    pub end_date: String,
}

/// Compute stats over the records that carry a valid date.
///
/// Returns `None` when no record has a valid date, so an empty range never
/// produces NaN averages.
///
/// ```rust
/// use ride_analytics::{build_range_stats, ActivityRecord};
///
/// let ride = |id: &str, date: &str, miles: f64| {
///     ActivityRecord::new(Some(id.into()), None, date, miles * 1609.34, None)
/// };
/// let stats = build_range_stats(&[
///     ride("1", "2024-01-01T09:00:00Z", 5.0),
///     ride("2", "2024-01-01T17:00:00Z", 10.0),
///     ride("3", "2024-01-03T09:00:00Z", 3.0),
/// ])
/// .unwrap();
///
/// assert_eq!(stats.activity_count, 3);
/// assert!((stats.total_miles - 18.0).abs() < 1e-9);
/// assert!((stats.average_miles_per_day - 6.0).abs() < 1e-9);
/// ```
pub fn build_range_stats(records: &[ActivityRecord]) -> Option<RangeStats> {
    let mut total_miles = 0.0;
    let mut longest_ride: f64 = 0.0;
    let mut activity_count = 0;
    let mut first: Option<NaiveDate> = None;
    let mut last: Option<NaiveDate> = None;

    for record in records {
        let Some(day) = record.utc_day() else {
            continue;
        };

        let miles = record.distance_miles();
        total_miles += miles;
        longest_ride = longest_ride.max(miles);
        activity_count += 1;
        first = Some(first.map_or(day, |d| d.min(day)));
        last = Some(last.map_or(day, |d| d.max(day)));
    }

    let (start, end) = (first?, last?);
    let day_span = ((end - start).num_days() + 1).max(1);

    Some(RangeStats {
        total_miles,
        activity_count,
        longest_ride,
        average_miles_per_day: total_miles / day_span as f64,
        start_date: format_iso_date(start),
        end_date: format_iso_date(end),
    })
}

// ============================================================================
// Series
// ============================================================================

/// Identity of one bucket in a distance series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BucketKey {
    Month(MonthKey),
    Day(NaiveDate),
    /// Week starting on the given day
    Week(NaiveDate),
}

impl BucketKey {
    /// The month a point drills down into; only monthly buckets have one.
    pub fn drill_down_month(&self) -> Option<MonthKey> {
        match self {
            BucketKey::Month(month) => Some(*month),
            _ => None,
        }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketKey::Month(month) => write!(f, "{}", month),
            BucketKey::Day(day) => write!(f, "{}", format_iso_date(*day)),
            BucketKey::Week(start) => write!(f, "week-{}", format_iso_date(*start)),
        }
    }
}

impl Serialize for BucketKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One point of a distance series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub bucket_key: BucketKey,
    pub label: String,
    pub miles: f64,
}

fn day_label(day: NaiveDate) -> String {
    day.format("%b %-d").to_string()
}

/// Miles per UTC day of the dated records.
fn daily_totals<'a>(records: impl IntoIterator<Item = &'a ActivityRecord>) -> HashMap<NaiveDate, f64> {
    let mut totals = HashMap::new();
    for record in records {
        if let Some(day) = record.utc_day() {
            *totals.entry(day).or_insert(0.0) += record.distance_miles();
        }
    }
    totals
}

/// Miles per month from the earliest to the latest dated record.
pub fn monthly_series(records: &[ActivityRecord]) -> Vec<SeriesPoint> {
    let mut totals: HashMap<MonthKey, f64> = HashMap::new();
    for record in records {
        if let Some(month) = record.month_key() {
            *totals.entry(month).or_insert(0.0) += record.distance_miles();
        }
    }

    let (Some(&first), Some(&last)) = (totals.keys().min(), totals.keys().max()) else {
        return Vec::new();
    };

    let mut series = Vec::new();
    let mut current = Some(first);
    while let Some(month) = current.filter(|m| *m <= last) {
        series.push(SeriesPoint {
            bucket_key: BucketKey::Month(month),
            label: month.label(),
            miles: totals.get(&month).copied().unwrap_or(0.0),
        });
        current = month.next();
    }
    series
}

/// Miles for every day of `month`; records outside the month are ignored.
pub fn daily_series(records: &[ActivityRecord], month: MonthKey) -> Vec<SeriesPoint> {
    let totals = daily_totals(records.iter().filter(|r| r.month_key() == Some(month)));

    month
        .days()
        .map(|day| SeriesPoint {
            bucket_key: BucketKey::Day(day),
            label: day_label(day),
            miles: totals.get(&day).copied().unwrap_or(0.0),
        })
        .collect()
}

/// Miles per 7-day bucket starting on the 1st of `month`.
///
/// The final bucket stops at the month's last day, so a 31-day month yields
/// five buckets with the fifth covering days 29 to 31.
pub fn weekly_series(records: &[ActivityRecord], month: MonthKey) -> Vec<SeriesPoint> {
    let totals = daily_totals(records.iter().filter(|r| r.month_key() == Some(month)));
    let end = month.last_day();

    let mut series = Vec::new();
    let mut week_start = month.first_day();
    while week_start <= end {
        let week_end = (week_start + Duration::days(DAYS_PER_WEEK - 1)).min(end);
        let miles = week_start
            .iter_days()
            .take_while(|d| *d <= week_end)
            .filter_map(|d| totals.get(&d))
            .sum();

        series.push(SeriesPoint {
            bucket_key: BucketKey::Week(week_start),
            label: format!("Week of {}", day_label(week_start)),
            miles,
        });
        week_start += Duration::days(DAYS_PER_WEEK);
    }
    series
}

/// Series for a selection: monthly outside Month mode, else daily or weekly.
pub fn build_series(records: &[ActivityRecord], selection: &RangeSelection) -> Vec<SeriesPoint> {
    let series = match (*selection.mode(), selection.granularity()) {
        (RangeMode::Month(month), Granularity::Daily) => daily_series(records, month),
        (RangeMode::Month(month), Granularity::Weekly) => weekly_series(records, month),
        _ => monthly_series(records),
    };
    debug!("[Aggregate] {} buckets for {}", series.len(), selection.mode());
    series
}
