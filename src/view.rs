//! # Analytics View State
//!
//! [`AnalyticsView`] owns everything the activity page shows: the loaded
//! records, the range selection, the derived stats and series, and the merged
//! routes. Derived values are recomputed only when the dataset or the
//! selection changes; hovering the chart never touches them.

use std::time::Instant;

use log::{debug, info, warn};
use serde::Serialize;

use crate::aggregate::{build_range_stats, build_series, RangeStats, SeriesPoint};
use crate::chart::Chart;
use crate::dataset::RouteFeature;
use crate::filter::{build_range_options, filter_activities, Granularity, RangeMode, RangeOptions, RangeSelection};
use crate::map::MapRenderer;
use crate::merge::{build_display_routes, DisplayRoute, MergeConfig};
use crate::{ActivityRecord, AnalyticsError, MonthKey, Result};

/// Shown in place of stats when the selected range has no dated rides.
pub const NO_RANGE_DATA_MESSAGE: &str = "No activity data available for the selected range.";

/// Shown on the map when the route collection is empty.
pub const NO_ROUTES_MESSAGE: &str = "No activity data available yet. Start biking!";

/// Progress of one dataset load.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum LoadState {
    #[default]
    Loading,
    Ready,
    Failed(String),
}

/// One labelled value in the stats panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatCard {
    pub label: &'static str,
    pub value: String,
}

/// What the stats panel displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "content", rename_all = "snake_case")]
pub enum StatsPanel {
    Loading,
    Error(String),
    NoData,
    Stats(Vec<StatCard>),
}

impl StatsPanel {
    fn from_stats(stats: &RangeStats) -> Self {
        StatsPanel::Stats(vec![
            StatCard { label: "Total Miles", value: format!("{:.1}", stats.total_miles) },
            StatCard { label: "Activities", value: stats.activity_count.to_string() },
            StatCard { label: "Longest Ride", value: format!("{:.1} mi", stats.longest_ride) },
            StatCard { label: "Avg Miles/Day", value: format!("{:.2}", stats.average_miles_per_day) },
            StatCard { label: "Start Date", value: stats.start_date.clone() },
            StatCard { label: "End Date", value: stats.end_date.clone() },
        ])
    }

    /// Message for the non-stats states.
    pub fn message(&self) -> Option<&str> {
        match self {
            StatsPanel::Loading => Some("Loading ride data..."),
            StatsPanel::Error(message) => Some(message),
            StatsPanel::NoData => Some(NO_RANGE_DATA_MESSAGE),
            StatsPanel::Stats(_) => None,
        }
    }
}

/// Values derived from the dataset for one selection.
#[derive(Debug, Clone)]
struct Derived {
    generation: u64,
    selection: RangeSelection,
    filtered: Vec<ActivityRecord>,
    stats: Option<RangeStats>,
    series: Vec<SeriesPoint>,
}

impl Derived {
    fn compute(records: &[ActivityRecord], generation: u64, selection: RangeSelection) -> Self {
        let filtered = filter_activities(records, selection.mode());
        let stats = build_range_stats(&filtered);
        let series = build_series(&filtered, &selection);
        Self { generation, selection, filtered, stats, series }
    }
}

/// Page state for the activity analytics view.
#[derive(Debug, Clone)]
pub struct AnalyticsView {
    records: Vec<ActivityRecord>,
    options: RangeOptions,
    activities_state: LoadState,
    routes: Vec<DisplayRoute>,
    routes_state: LoadState,
    merge_config: MergeConfig,
    selection: RangeSelection,
    selected_year: Option<i32>,
    selected_month: Option<MonthKey>,
    hovered: Option<usize>,
    generation: u64,
    derived: Derived,
    recomputes: usize,
}

impl Default for AnalyticsView {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyticsView {
    pub fn new() -> Self {
        Self::with_merge_config(MergeConfig::default())
    }

    pub fn with_merge_config(merge_config: MergeConfig) -> Self {
        let selection = RangeSelection::default();
        Self {
            records: Vec::new(),
            options: RangeOptions::default(),
            activities_state: LoadState::Loading,
            routes: Vec::new(),
            routes_state: LoadState::Loading,
            merge_config,
            selection,
            selected_year: None,
            selected_month: None,
            hovered: None,
            generation: 0,
            derived: Derived::compute(&[], 0, selection),
            recomputes: 0,
        }
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Replace the activity dataset.
    ///
    /// Year and month selections survive when still present; otherwise they
    /// move to the latest available values.
    pub fn load_activities(&mut self, records: Vec<ActivityRecord>) {
        let start = Instant::now();
        self.options = build_range_options(&records);
        self.records = records;
        self.activities_state = LoadState::Ready;
        self.generation += 1;

        self.selected_year = self
            .selected_year
            .filter(|y| self.options.contains_year(*y))
            .or_else(|| self.options.latest_year());
        self.selected_month = self
            .selected_month
            .filter(|m| self.options.contains_month(*m))
            .or_else(|| self.options.latest_month());

        let mode = match *self.selection.mode() {
            RangeMode::Year(_) => self.selected_year.map_or(RangeMode::AllTime, RangeMode::Year),
            RangeMode::Month(current) if !self.options.contains_month(current) => {
                self.selected_month.map_or(RangeMode::AllTime, RangeMode::Month)
            }
            other => other,
        };
        self.selection = self.selection.with_mode(mode);
        self.hovered = None;
        self.refresh();

        info!(
            "[View] loaded {} activities ({} years, {} months) in {:?}",
            self.records.len(),
            self.options.years.len(),
            self.options.months.len(),
            start.elapsed()
        );
    }

    /// Apply the outcome of an activity dataset fetch.
    pub fn apply_activities(&mut self, result: Result<Vec<ActivityRecord>>) {
        match result {
            Ok(records) => self.load_activities(records),
            Err(e) => self.fail_activities(e.to_string()),
        }
    }

    /// Mark the activity dataset as failed. Loaded data stays in place.
    pub fn fail_activities(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("[View] activity dataset failed: {}", message);
        self.activities_state = LoadState::Failed(message);
    }

    /// Merge route features and hand them to `renderer`.
    ///
    /// An empty collection is reported as an error state on the renderer.
    pub fn load_routes<R: MapRenderer + ?Sized>(&mut self, features: &[RouteFeature], renderer: &mut R) {
        if features.is_empty() {
            self.fail_routes(NO_ROUTES_MESSAGE, renderer);
            return;
        }

        let routes = build_display_routes(features, &self.merge_config);
        match renderer.render_routes(&routes) {
            Ok(()) => {
                self.routes = routes;
                self.routes_state = LoadState::Ready;
            }
            Err(e) => self.fail_routes(e.to_string(), renderer),
        }
    }

    /// Apply the outcome of a route collection fetch.
    pub fn apply_routes<R: MapRenderer + ?Sized>(&mut self, result: Result<Vec<RouteFeature>>, renderer: &mut R) {
        match result {
            Ok(features) => self.load_routes(&features, renderer),
            Err(e) => self.fail_routes(e.to_string(), renderer),
        }
    }

    /// Mark the routes as failed; whatever the renderer drew before stays.
    pub fn fail_routes<R: MapRenderer + ?Sized>(&mut self, message: impl Into<String>, renderer: &mut R) {
        let message = message.into();
        renderer.render_error(&message);
        self.routes_state = LoadState::Failed(message);
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Switch to the all-time range.
    pub fn show_all_time(&mut self) {
        self.selection = self.selection.with_mode(RangeMode::AllTime);
        self.refresh();
    }

    /// Switch to the selected (or latest) year. `None` when no year exists.
    pub fn show_year(&mut self) -> Option<i32> {
        let year = self.selected_year.or_else(|| self.options.latest_year())?;
        self.selected_year = Some(year);
        self.selection = self.selection.with_mode(RangeMode::Year(year));
        self.refresh();
        Some(year)
    }

    /// Switch to the selected (or latest) month. `None` when no month exists.
    pub fn show_month(&mut self) -> Option<MonthKey> {
        let month = self.selected_month.or_else(|| self.options.latest_month())?;
        self.selected_month = Some(month);
        self.selection = self.selection.with_mode(RangeMode::Month(month));
        self.refresh();
        Some(month)
    }

    /// Select a year present in the dataset and switch to it.
    pub fn select_year(&mut self, year: i32) -> Result<()> {
        if !self.options.contains_year(year) {
            return Err(AnalyticsError::UnavailableYear(year));
        }
        self.selected_year = Some(year);
        self.selection = self.selection.with_mode(RangeMode::Year(year));
        self.refresh();
        Ok(())
    }

    /// Select a month present in the dataset and switch to it.
    pub fn select_month(&mut self, month: MonthKey) -> Result<()> {
        if !self.options.contains_month(month) {
            return Err(AnalyticsError::UnavailableMonth(month));
        }
        self.selected_month = Some(month);
        self.selection = self.selection.with_mode(RangeMode::Month(month));
        self.refresh();
        Ok(())
    }

    /// Apply a full range mode, validating year and month values.
    pub fn set_mode(&mut self, mode: RangeMode) -> Result<()> {
        match mode {
            RangeMode::AllTime => {
                self.show_all_time();
                Ok(())
            }
            RangeMode::Year(year) => self.select_year(year),
            RangeMode::Month(month) => self.select_month(month),
        }
    }

    pub fn set_granularity(&mut self, granularity: Granularity) {
        self.selection = self.selection.with_granularity(granularity);
        self.refresh();
    }

    /// Drill into the month of a monthly chart point.
    ///
    /// No-op in Month mode or for non-monthly points; returns whether the
    /// selection changed.
    pub fn select_point(&mut self, index: usize) -> bool {
        if self.selection.mode().is_month() {
            return false;
        }
        let Some(month) = self.series().get(index).and_then(|p| p.bucket_key.drill_down_month()) else {
            return false;
        };

        debug!("[View] drill down into {}", month);
        self.selected_month = Some(month);
        self.selection = RangeSelection::month(month, Granularity::Daily);
        self.refresh();
        true
    }

    /// Handle a click on the chart surface.
    pub fn click_chart(&mut self, x: f64, y: f64) -> bool {
        let index = self.chart().and_then(|chart| chart.hit_test(x, y));
        match index {
            Some(index) => self.select_point(index),
            None => false,
        }
    }

    /// Set or clear the hovered chart point. Derived data is untouched.
    pub fn hover_point(&mut self, index: Option<usize>) {
        self.hovered = index.filter(|i| *i < self.derived.series.len());
    }

    fn refresh(&mut self) {
        if self.derived.generation == self.generation && self.derived.selection == self.selection {
            return;
        }
        self.derived = Derived::compute(&self.records, self.generation, self.selection);
        self.hovered = None;
        self.recomputes += 1;
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn selection(&self) -> &RangeSelection {
        &self.selection
    }

    pub fn selected_year(&self) -> Option<i32> {
        self.selected_year
    }

    pub fn selected_month(&self) -> Option<MonthKey> {
        self.selected_month
    }

    pub fn options(&self) -> &RangeOptions {
        &self.options
    }

    pub fn records(&self) -> &[ActivityRecord] {
        &self.records
    }

    pub fn activities_state(&self) -> &LoadState {
        &self.activities_state
    }

    pub fn routes_state(&self) -> &LoadState {
        &self.routes_state
    }

    pub fn routes(&self) -> &[DisplayRoute] {
        &self.routes
    }

    pub fn filtered(&self) -> &[ActivityRecord] {
        &self.derived.filtered
    }

    pub fn stats(&self) -> Option<&RangeStats> {
        self.derived.stats.as_ref()
    }

    pub fn series(&self) -> &[SeriesPoint] {
        &self.derived.series
    }

    pub fn chart_title(&self) -> &'static str {
        self.selection.chart_title()
    }

    /// Chart for the current series and hover, `None` when there is nothing to draw.
    pub fn chart(&self) -> Option<Chart> {
        let selectable = !self.selection.mode().is_month();
        let mut chart = Chart::new(self.derived.series.clone(), self.chart_title(), selectable)?;
        if let Err(e) = chart.hover(self.hovered) {
            debug!("[View] dropping stale hover: {}", e);
        }
        Some(chart)
    }

    pub fn stats_panel(&self) -> StatsPanel {
        match &self.activities_state {
            LoadState::Failed(message) => StatsPanel::Error(message.clone()),
            LoadState::Loading => StatsPanel::Loading,
            LoadState::Ready => match &self.derived.stats {
                Some(stats) => StatsPanel::from_stats(stats),
                None => StatsPanel::NoData,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::GeoJsonLayer;
    use crate::METERS_PER_MILE;

    fn ride(id: &str, date: &str, miles: f64) -> ActivityRecord {
        ActivityRecord::new(Some(id.to_string()), Some("Ride".into()), date, miles * METERS_PER_MILE, Some("Ride".into()))
    }

    fn march_and_june() -> Vec<ActivityRecord> {
        vec![ride("1", "2024-03-02T15:00:00Z", 10.0), ride("2", "2024-06-10T15:00:00Z", 5.0)]
    }

    fn month(key: &str) -> MonthKey {
        key.parse().unwrap()
    }

    #[test]
    fn test_initial_state() {
        let view = AnalyticsView::new();
        assert_eq!(view.stats_panel(), StatsPanel::Loading);
        assert!(view.series().is_empty());
        assert!(view.chart().is_none());
    }

    #[test]
    fn test_load_defaults_to_latest_year_and_month() {
        let mut view = AnalyticsView::new();
        view.load_activities(vec![ride("1", "2023-05-01", 1.0), ride("2", "2024-02-01", 1.0)]);

        assert_eq!(view.selected_year(), Some(2024));
        assert_eq!(view.selected_month(), Some(month("2024-02")));
        assert_eq!(*view.selection().mode(), RangeMode::AllTime);
    }

    #[test]
    fn test_reload_keeps_present_selection() {
        let mut view = AnalyticsView::new();
        view.load_activities(vec![ride("1", "2023-05-01", 1.0), ride("2", "2024-02-01", 1.0)]);
        view.select_year(2023).unwrap();

        view.load_activities(vec![ride("1", "2023-05-01", 1.0), ride("3", "2025-01-01", 1.0)]);
        assert_eq!(*view.selection().mode(), RangeMode::Year(2023));
        assert_eq!(view.selected_month(), Some(month("2025-01")));
    }

    #[test]
    fn test_drill_down_from_all_time() {
        let mut view = AnalyticsView::new();
        view.load_activities(march_and_june());
        assert_eq!(view.series().len(), 4);
        assert_eq!(view.series()[1].label, "Apr 2024");

        assert!(view.select_point(1));
        assert_eq!(*view.selection().mode(), RangeMode::Month(month("2024-04")));
        assert_eq!(view.selection().granularity(), Granularity::Daily);
        assert_eq!(view.series().len(), 30);
        assert_eq!(view.chart_title(), "Distance Per Day");

        // Month mode ignores clicks
        assert!(!view.select_point(0));
        assert!(!view.chart().unwrap().is_selectable());
    }

    #[test]
    fn test_drill_down_from_year() {
        let mut view = AnalyticsView::new();
        view.load_activities(vec![ride("0", "2023-11-20", 3.0), ride("1", "2024-03-02", 10.0), ride("2", "2024-06-10", 5.0)]);
        view.select_year(2024).unwrap();
        assert_eq!(view.chart_title(), "Distance Per Month");
        assert_eq!(view.series()[0].label, "Mar 2024");

        assert!(view.select_point(3));
        assert_eq!(*view.selection().mode(), RangeMode::Month(month("2024-06")));
        assert_eq!(view.selected_month(), Some(month("2024-06")));
        assert_eq!(view.selection().granularity(), Granularity::Daily);
        assert_eq!(view.series().len(), 30);
        assert!((view.series()[9].miles - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_click_chart_drills_down() {
        let mut view = AnalyticsView::new();
        view.load_activities(march_and_june());
        let chart = view.chart().unwrap();
        let june = &chart.points()[3];

        assert!(view.click_chart(june.x, june.y));
        assert_eq!(view.selected_month(), Some(month("2024-06")));
    }

    #[test]
    fn test_weekly_granularity() {
        let mut view = AnalyticsView::new();
        view.load_activities(vec![ride("1", "2024-05-30", 2.0)]);
        view.select_month(month("2024-05")).unwrap();
        view.set_granularity(Granularity::Weekly);

        assert_eq!(view.series().len(), 5);
        assert_eq!(view.chart_title(), "Distance Per Week");
    }

    #[test]
    fn test_unavailable_selection_rejected() {
        let mut view = AnalyticsView::new();
        view.load_activities(march_and_june());

        assert!(matches!(view.select_year(1999), Err(AnalyticsError::UnavailableYear(1999))));
        assert!(view.select_month(month("2024-04")).is_err());
        assert!(view.set_mode(RangeMode::Month(month("2024-03"))).is_ok());
        assert_eq!(view.filtered().len(), 1);
    }

    #[test]
    fn test_show_year_picks_latest() {
        let mut view = AnalyticsView::new();
        assert_eq!(view.show_year(), None);

        view.load_activities(vec![ride("1", "2022-05-01", 1.0), ride("2", "2023-02-01", 1.0)]);
        assert_eq!(view.show_year(), Some(2023));
        assert_eq!(view.show_month(), Some(month("2023-02")));
    }

    #[test]
    fn test_stats_panel_cards() {
        let mut view = AnalyticsView::new();
        view.load_activities(march_and_june());

        let StatsPanel::Stats(cards) = view.stats_panel() else {
            panic!("expected stats");
        };
        let values: Vec<&str> = cards.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(cards[0].label, "Total Miles");
        assert_eq!(values, vec!["15.0", "2", "10.0 mi", "0.15", "2024-03-02", "2024-06-10"]);
    }

    #[test]
    fn test_empty_range_has_no_data_panel() {
        let mut view = AnalyticsView::new();
        view.load_activities(vec![ride("1", "not-a-date", 3.0)]);

        assert_eq!(view.stats_panel(), StatsPanel::NoData);
        assert_eq!(view.stats_panel().message(), Some(NO_RANGE_DATA_MESSAGE));
        assert!(view.series().is_empty());
    }

    #[test]
    fn test_failed_dataset_shows_error() {
        let mut view = AnalyticsView::new();
        view.load_activities(march_and_june());
        view.apply_activities(Err(AnalyticsError::HttpStatus { url: "https://x".into(), status: 404 }));

        assert!(matches!(view.stats_panel(), StatsPanel::Error(_)));
        assert_eq!(view.records().len(), 2);
    }

    #[test]
    fn test_hover_does_not_recompute() {
        let mut view = AnalyticsView::new();
        view.load_activities(march_and_june());
        let before = view.recomputes;

        view.hover_point(Some(2));
        view.hover_point(None);
        view.hover_point(Some(3));
        view.show_all_time();
        assert_eq!(view.recomputes, before);
        assert_eq!(view.chart().unwrap().tooltip().unwrap().label, "Jun 2024");

        view.hover_point(Some(99));
        assert!(view.chart().unwrap().tooltip().is_none());
    }

    #[test]
    fn test_routes_rendered_and_empty_collection() {
        use crate::dataset::RouteProperties;
        use geo::{Coord, LineString};

        let mut view = AnalyticsView::new();
        let mut layer = GeoJsonLayer::default();

        view.load_routes(&[], &mut layer);
        assert_eq!(view.routes_state(), &LoadState::Failed(NO_ROUTES_MESSAGE.to_string()));
        assert_eq!(layer.error(), Some(NO_ROUTES_MESSAGE));

        let feature = RouteFeature::new(
            RouteProperties { activity_id: Some("9".into()), ..Default::default() },
            vec![LineString::from(vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 0.0, y: 0.01 }])],
        );
        view.load_routes(&[feature], &mut layer);
        assert_eq!(view.routes_state(), &LoadState::Ready);
        assert_eq!(view.routes().len(), 1);
        assert_eq!(layer.collection().unwrap().features.len(), 1);
    }
}
