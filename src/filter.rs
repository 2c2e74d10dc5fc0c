//! Range filtering of activity records.
//!
//! Membership is decided on the UTC calendar: a ride at 23:30 local time on
//! March 31st in San Diego belongs to April. Records whose date did not parse
//! are kept by [`RangeMode::AllTime`] but never match a year or month.

use std::fmt;

use log::debug;
use serde::Serialize;

use crate::{ActivityRecord, MonthKey};

/// Which slice of the dataset is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum RangeMode {
    #[default]
    AllTime,
    Year(i32),
    Month(MonthKey),
}

impl RangeMode {
    /// Whether a record falls inside this range.
    pub fn contains(&self, record: &ActivityRecord) -> bool {
        match self {
            RangeMode::AllTime => true,
            RangeMode::Year(year) => record.utc_year() == Some(*year),
            RangeMode::Month(month) => record.month_key() == Some(*month),
        }
    }

    pub fn is_month(&self) -> bool {
        matches!(self, RangeMode::Month(_))
    }
}

impl fmt::Display for RangeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeMode::AllTime => write!(f, "All time"),
            RangeMode::Year(year) => write!(f, "{}", year),
            RangeMode::Month(month) => write!(f, "{}", month.label()),
        }
    }
}

/// Bucket size inside a selected month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    #[default]
    Daily,
    Weekly,
}

/// Current range mode plus the month granularity.
///
/// Granularity is remembered across modes but only affects `Month`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct RangeSelection {
    mode: RangeMode,
    granularity: Granularity,
}

impl RangeSelection {
    pub fn new(mode: RangeMode, granularity: Granularity) -> Self {
        Self { mode, granularity }
    }

    pub fn all_time() -> Self {
        Self::default()
    }

    pub fn year(year: i32) -> Self {
        Self::new(RangeMode::Year(year), Granularity::Daily)
    }

    pub fn month(month: MonthKey, granularity: Granularity) -> Self {
        Self::new(RangeMode::Month(month), granularity)
    }

    pub fn mode(&self) -> &RangeMode {
        &self.mode
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn with_mode(self, mode: RangeMode) -> Self {
        Self { mode, ..self }
    }

    pub fn with_granularity(self, granularity: Granularity) -> Self {
        Self { granularity, ..self }
    }

    /// Title of the distance chart for this selection.
    pub fn chart_title(&self) -> &'static str {
        match (self.mode, self.granularity) {
            (RangeMode::Month(_), Granularity::Weekly) => "Distance Per Week",
            (RangeMode::Month(_), Granularity::Daily) => "Distance Per Day",
            _ => "Distance Per Month",
        }
    }
}

/// Keep the records inside `mode`, preserving input order.
///
/// ```rust
/// use ride_analytics::{filter_activities, ActivityRecord, RangeMode};
///
/// let records = vec![
///     ActivityRecord::new(Some("1".into()), None, "2023-12-31T23:00:00Z", 1000.0, None),
///     ActivityRecord::new(Some("2".into()), None, "2024-01-01T00:30:00Z", 2000.0, None),
///     ActivityRecord::new(Some("3".into()), None, "not a date", 3000.0, None),
/// ];
///
/// assert_eq!(filter_activities(&records, &RangeMode::AllTime).len(), 3);
/// assert_eq!(filter_activities(&records, &RangeMode::Year(2024)).len(), 1);
/// ```
pub fn filter_activities(records: &[ActivityRecord], mode: &RangeMode) -> Vec<ActivityRecord> {
    if *mode == RangeMode::AllTime {
        return records.to_vec();
    }

    let filtered: Vec<ActivityRecord> = records.iter().filter(|r| mode.contains(r)).cloned().collect();
    debug!("[Filter] {}: {} of {} records", mode, filtered.len(), records.len());
    filtered
}

/// Selectable years and months present in a dataset, ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RangeOptions {
    pub years: Vec<i32>,
    pub months: Vec<MonthKey>,
}

impl RangeOptions {
    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    pub fn contains_year(&self, year: i32) -> bool {
        self.years.binary_search(&year).is_ok()
    }

    pub fn contains_month(&self, month: MonthKey) -> bool {
        self.months.binary_search(&month).is_ok()
    }

    pub fn latest_year(&self) -> Option<i32> {
        self.years.last().copied()
    }

    pub fn latest_month(&self) -> Option<MonthKey> {
        self.months.last().copied()
    }
}

/// Collect the distinct UTC years and months of all dated records.
pub fn build_range_options(records: &[ActivityRecord]) -> RangeOptions {
    let mut years: Vec<i32> = records.iter().filter_map(ActivityRecord::utc_year).collect();
    let mut months: Vec<MonthKey> = records.iter().filter_map(ActivityRecord::month_key).collect();

    years.sort_unstable();
    years.dedup();
    months.sort_unstable();
    months.dedup();

    RangeOptions { years, months }
}
