//! # Ride Analytics
//!
//! Activity analytics and route display for a biking archive.
//!
//! This library provides:
//! - Display merging of GPS route segments split by recording pauses
//! - All-time / year / month range filtering of activities
//! - Monthly, daily and weekly mileage series plus range statistics
//! - An SVG distance chart with hover and drill-down
//! - A map-renderer boundary with per-route popups
//!
//! ## Features
//!
//! - **`parallel`** - Merge activity groups in parallel with rayon
//! - **`http`** - Enable HTTP client for dataset fetching
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use ride_analytics::{ActivityRecord, AnalyticsView, RangeMode};
//!
//! let records = vec![
//!     ActivityRecord::new(Some("1".into()), None, "2024-03-02T15:00:00Z", 16093.4, None),
//!     ActivityRecord::new(Some("2".into()), None, "2024-06-10T15:00:00Z", 8046.7, None),
//! ];
//!
//! let mut view = AnalyticsView::new();
//! view.load_activities(records);
//!
//! assert_eq!(*view.selection().mode(), RangeMode::AllTime);
//! assert_eq!(view.series().len(), 4); // Mar, Apr, May, Jun
//! assert_eq!(view.chart_title(), "Distance Per Month");
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// Unified error handling
pub mod error;
pub use error::{AnalyticsError, Result};

// Geographic utilities (distance, bounds, unit conversion)
pub mod geo_utils;

// Dataset decoding and derivation
pub mod dataset;
pub use dataset::{
    build_activity_dataset, parse_activity_dataset, parse_route_collection, ActivityDataset,
    DatasetEntry, RouteFeature,
};

// Raw track cleanup before display
pub mod clean;
pub use clean::{clean_route_features, prepare_route_features, split_at_pauses, CleanConfig};

// Display merging of route segments
pub mod merge;
pub use merge::{build_display_routes, merge_segments, DisplayGeometry, DisplayRoute, MergeConfig};

// Range filtering
pub mod filter;
pub use filter::{build_range_options, filter_activities, Granularity, RangeMode, RangeOptions, RangeSelection};

// Mileage aggregation
pub mod aggregate;
pub use aggregate::{
    build_range_stats, build_series, daily_series, monthly_series, weekly_series, BucketKey,
    RangeStats, SeriesPoint,
};

// SVG chart model
pub mod chart;
pub use chart::{Chart, ChartConfig, ChartPoint, Tooltip};

// Map renderer boundary
pub mod map;
pub use map::{BasemapConfig, GeoJsonLayer, MapRenderer, RouteHitIndex, RoutePopup, RouteStyle};

// Explicitly-owned view state
pub mod view;
pub use view::{AnalyticsView, LoadState, StatCard, StatsPanel};

// HTTP module for dataset fetching
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{DatasetFetcher, FetchConfig, FetchOutcome};

/// Mean Earth radius used for all great-circle distances, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Fixed meters-per-mile conversion factor.
pub const METERS_PER_MILE: f64 = 1609.34;

/// Maximum endpoint gap for joining two segments into one display path.
pub const DISPLAY_MERGE_THRESHOLD_METERS: f64 = 2_000.0;

/// Initialize logging for Android builds.
#[cfg(target_os = "android")]
pub fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("RideAnalyticsRust"),
    );
}

/// No-op outside Android; the host application installs its own `log` backend.
#[cfg(not(target_os = "android"))]
pub fn init_logging() {}

// ============================================================================
// Core Types
// ============================================================================

/// Bounding box in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Grow these bounds to also enclose `other`.
    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min_lat: self.min_lat.min(other.min_lat),
            max_lat: self.max_lat.max(other.max_lat),
            min_lng: self.min_lng.min(other.min_lng),
            max_lng: self.max_lng.max(other.max_lng),
        }
    }

    /// Get the center point of the bounds as (lat, lng).
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

/// Stable identity of one activity.
///
/// Sources that carry an `activity_id` use it directly. Older exports without
/// one fall back to a composite of name, raw date and distance, which is
/// stable as long as the underlying ride is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActivityKey {
    Id(String),
    Meta { name: String, date: String, distance: String },
}

impl ActivityKey {
    /// Build a key, preferring the external id when present.
    pub fn new(activity_id: Option<&str>, name: Option<&str>, date: &str, distance_meters: f64) -> Self {
        match activity_id {
            Some(id) => ActivityKey::Id(id.to_string()),
            None => ActivityKey::Meta {
                name: name.unwrap_or_default().to_string(),
                date: date.to_string(),
                distance: distance_meters.to_string(),
            },
        }
    }
}

impl fmt::Display for ActivityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityKey::Id(id) => write!(f, "id:{}", id),
            ActivityKey::Meta { name, date, distance } => {
                write!(f, "meta:{}|{}|{}", name, date, distance)
            }
        }
    }
}

impl Serialize for ActivityKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One completed ride.
///
/// Created once at ingest and never mutated. `date` keeps the source string for
/// display; `parsed_date` is `None` when the string is not a valid ISO-8601
/// timestamp, which removes the record from every date-bucketed view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityRecord {
    pub id: ActivityKey,
    pub name: Option<String>,
    pub date: String,
    #[serde(skip)]
    pub parsed_date: Option<DateTime<Utc>>,
    pub distance_meters: f64,
    pub activity_type: Option<String>,
}

impl ActivityRecord {
    /// Create a record, applying the id fallback and parsing the date.
    ///
    /// Negative or non-finite distances are stored as zero.
    pub fn new(
        activity_id: Option<String>,
        name: Option<String>,
        date: impl Into<String>,
        distance_meters: f64,
        activity_type: Option<String>,
    ) -> Self {
        let date = date.into();
        let distance_meters = if distance_meters.is_finite() { distance_meters.max(0.0) } else { 0.0 };
        let id = ActivityKey::new(activity_id.as_deref(), name.as_deref(), &date, distance_meters);
        let parsed_date = parse_iso_date(&date);

        Self { id, name, date, parsed_date, distance_meters, activity_type }
    }

    /// Distance in statute miles.
    #[inline]
    pub fn distance_miles(&self) -> f64 {
        self.distance_meters / METERS_PER_MILE
    }

    /// UTC calendar day of the activity, if the date parsed.
    pub fn utc_day(&self) -> Option<NaiveDate> {
        self.parsed_date.map(|d| d.date_naive())
    }

    /// UTC calendar year of the activity, if the date parsed.
    pub fn utc_year(&self) -> Option<i32> {
        self.parsed_date.map(|d| d.year())
    }

    /// UTC `YYYY-MM` bucket of the activity, if the date parsed.
    pub fn month_key(&self) -> Option<MonthKey> {
        self.utc_day().map(MonthKey::from_date)
    }
}

/// A calendar month, rendered and parsed as `YYYY-MM`.
///
/// Internally the first day of the month, so ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey(NaiveDate);

impl MonthKey {
    /// Month containing `date`.
    pub fn from_date(date: NaiveDate) -> Self {
        // Day 1 exists for every month of a valid date
        MonthKey(date.with_day(1).unwrap_or(date))
    }

    /// Build from a year and a 1-based month.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(MonthKey)
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// 1-based month number.
    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn first_day(&self) -> NaiveDate {
        self.0
    }

    /// Last calendar day of the month.
    pub fn last_day(&self) -> NaiveDate {
        self.days().last().unwrap_or(self.0)
    }

    /// Every calendar day of the month, in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let month = self.0.month();
        self.0.iter_days().take_while(move |d| d.month() == month)
    }

    /// The following month, `None` past chrono's supported range.
    pub fn next(&self) -> Option<Self> {
        self.0.checked_add_months(chrono::Months::new(1)).map(MonthKey)
    }

    /// Display label such as `"Apr 2024"`.
    pub fn label(&self) -> String {
        self.0.format("%b %Y").to_string()
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl FromStr for MonthKey {
    type Err = AnalyticsError;

    fn from_str(value: &str) -> Result<Self> {
        let invalid = || AnalyticsError::InvalidMonthKey(value.to_string());
        let bytes = value.as_bytes();
        let well_formed = bytes.len() == 7
            && bytes[4] == b'-'
            && bytes[..4].iter().all(u8::is_ascii_digit)
            && bytes[5..].iter().all(u8::is_ascii_digit);
        if !well_formed {
            return Err(invalid());
        }

        let year: i32 = value[..4].parse().map_err(|_| invalid())?;
        let month: u32 = value[5..].parse().map_err(|_| invalid())?;
        MonthKey::new(year, month).ok_or_else(invalid)
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Date Helpers
// ============================================================================

/// Parse an ISO-8601 timestamp into UTC.
///
/// Accepts RFC 3339 timestamps with an offset, naive date-times (taken as
/// UTC) and bare `YYYY-MM-DD` dates (midnight UTC). Anything else is `None`.
///
/// ```rust
/// use ride_analytics::parse_iso_date;
///
/// assert!(parse_iso_date("2024-04-05T08:30:00Z").is_some());
/// assert!(parse_iso_date("2024-04-05T08:30:00-07:00").is_some());
/// assert!(parse_iso_date("2024-04-05").is_some());
/// assert!(parse_iso_date("yesterday").is_none());
/// ```
pub fn parse_iso_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Format a UTC day as `YYYY-MM-DD`.
pub fn format_iso_date(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

/// Escape text for SVG and popup HTML.
pub(crate) fn escape_markup(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

// ============================================================================
// Tests
// ============================================================================
