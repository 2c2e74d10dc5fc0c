//! # Distance Chart
//!
//! Line chart model over a distance series, rendered to SVG.
//!
//! Geometry is computed in a fixed 1000×320 surface with 48 units of padding;
//! the host scales the SVG to its container. Rendering is a pure function of
//! the series and the hovered point.

use log::debug;
use serde::Serialize;

use crate::aggregate::{BucketKey, SeriesPoint};
use crate::{escape_markup, AnalyticsError, Result};

/// Chart geometry and styling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartConfig {
    /// Surface width.
    /// Default: 1000
    pub width: f64,
    /// Surface height.
    /// Default: 320
    pub height: f64,
    /// Inset on every side of the plot area.
    /// Default: 48
    pub padding: f64,
    /// Radius of a drawn point. Hover radius is three times this.
    /// Default: 3
    pub point_radius: f64,
    /// Default: 2
    pub stroke_width: f64,
    /// Target number of x-axis labels. Sets the label step; the last index is
    /// appended when the step skips it, so one extra label can appear.
    /// Default: 6
    pub x_tick_count: usize,
    /// Number of y-axis steps above the baseline.
    /// Default: 4
    pub y_tick_count: usize,
    /// Y-range used when the series maximum is not positive.
    /// Default: 1.0 mile
    pub min_range_miles: f64,
    pub background_color: String,
    pub axis_color: String,
    pub grid_color: String,
    pub label_color: String,
    pub line_color: String,
    pub font_family: String,
    /// Default: 12
    pub font_size: f64,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            width: 1000.0,
            height: 320.0,
            padding: 48.0,
            point_radius: 3.0,
            stroke_width: 2.0,
            x_tick_count: 6,
            y_tick_count: 4,
            min_range_miles: 1.0,
            background_color: "#1a1a1a".to_string(),
            axis_color: "#2f2f2f".to_string(),
            grid_color: "#2a2a2a".to_string(),
            label_color: "#9ca3af".to_string(),
            line_color: "#E3B800".to_string(),
            font_family: "Courier New, monospace".to_string(),
            font_size: 12.0,
        }
    }
}

impl ChartConfig {
    fn inner_width(&self) -> f64 {
        self.width - self.padding * 2.0
    }

    fn inner_height(&self) -> f64 {
        self.height - self.padding * 2.0
    }

    fn baseline(&self) -> f64 {
        self.height - self.padding
    }

    pub fn hover_radius(&self) -> f64 {
        self.point_radius * 3.0
    }
}

/// A series point placed on the surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub x: f64,
    pub y: f64,
    pub label: String,
    pub miles: f64,
    pub bucket_key: BucketKey,
}

/// Tooltip for the hovered point, anchored in surface percentages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tooltip {
    pub label: String,
    /// e.g. `"12.3 mi"`
    pub text: String,
    pub left_percent: f64,
    pub top_percent: f64,
}

/// One horizontal gridline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct YTick {
    pub value: f64,
    pub y: f64,
}

fn safe_max(series: &[SeriesPoint], config: &ChartConfig) -> f64 {
    let max = series.iter().map(|p| p.miles).fold(0.0_f64, f64::max);
    if max > 0.0 {
        max
    } else {
        config.min_range_miles
    }
}

/// Map a series onto the surface.
///
/// x is spread evenly over the inner width (a single point is centered); y is
/// `miles / max` measured up from the baseline.
pub fn build_chart_points(series: &[SeriesPoint], config: &ChartConfig) -> Vec<ChartPoint> {
    let max = safe_max(series, config);
    let last = series.len().saturating_sub(1);

    series
        .iter()
        .enumerate()
        .map(|(index, point)| ChartPoint {
            x: if last == 0 {
                config.padding + config.inner_width() / 2.0
            } else {
                config.padding + (index as f64 / last as f64) * config.inner_width()
            },
            y: config.padding + (1.0 - point.miles / max) * config.inner_height(),
            label: point.label.clone(),
            miles: point.miles,
            bucket_key: point.bucket_key,
        })
        .collect()
}

/// SVG path data connecting the points: `M x y L x y ...`.
pub fn build_chart_path(points: &[ChartPoint]) -> String {
    points
        .iter()
        .enumerate()
        .map(|(index, p)| format!("{}{} {}", if index == 0 { "M" } else { "L" }, p.x, p.y))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Indices that get an x-axis label.
///
/// ```rust
/// use ride_analytics::chart::build_tick_indices;
///
/// assert_eq!(build_tick_indices(1, 6), vec![0]);
/// assert_eq!(build_tick_indices(4, 6), vec![0, 1, 2, 3]);
/// assert_eq!(build_tick_indices(30, 6), vec![0, 5, 10, 15, 20, 25, 29]);
/// ```
pub fn build_tick_indices(count: usize, max_ticks: usize) -> Vec<usize> {
    if count <= 1 {
        return vec![0];
    }

    let tick_count = max_ticks.min(count).max(2);
    let step = ((count - 1) / (tick_count - 1)).max(1);
    let mut indices: Vec<usize> = (0..count).step_by(step).collect();

    if indices.last() != Some(&(count - 1)) {
        indices.push(count - 1);
    }
    indices
}

/// A distance chart: series, placed points and hover state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart {
    title: String,
    selectable: bool,
    series: Vec<SeriesPoint>,
    points: Vec<ChartPoint>,
    hovered: Option<usize>,
    #[serde(skip)]
    config: ChartConfig,
}

impl Chart {
    /// Build a chart, or `None` for an empty series (nothing is drawn).
    ///
    /// `selectable` marks points as drill-down targets.
    pub fn new(series: Vec<SeriesPoint>, title: impl Into<String>, selectable: bool) -> Option<Self> {
        Self::with_config(series, title, selectable, ChartConfig::default())
    }

    pub fn with_config(
        series: Vec<SeriesPoint>,
        title: impl Into<String>,
        selectable: bool,
        config: ChartConfig,
    ) -> Option<Self> {
        if series.is_empty() {
            return None;
        }

        let points = build_chart_points(&series, &config);
        Some(Self {
            title: title.into(),
            selectable,
            series,
            points,
            hovered: None,
            config,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn is_selectable(&self) -> bool {
        self.selectable
    }

    pub fn series(&self) -> &[SeriesPoint] {
        &self.series
    }

    pub fn points(&self) -> &[ChartPoint] {
        &self.points
    }

    pub fn config(&self) -> &ChartConfig {
        &self.config
    }

    pub fn path(&self) -> String {
        build_chart_path(&self.points)
    }

    /// Largest value on the y-axis.
    pub fn y_max(&self) -> f64 {
        safe_max(&self.series, &self.config)
    }

    /// Gridlines from the baseline up to the top of the plot area.
    pub fn y_ticks(&self) -> Vec<YTick> {
        let max = self.y_max();
        let steps = self.config.y_tick_count.max(1);
        let step = max / steps as f64;

        (0..=steps)
            .map(|index| {
                let value = step * index as f64;
                YTick {
                    value,
                    y: self.config.baseline() - self.config.inner_height() * (value / max),
                }
            })
            .collect()
    }

    /// Points that carry an x-axis label.
    pub fn x_ticks(&self) -> Vec<&ChartPoint> {
        build_tick_indices(self.points.len(), self.config.x_tick_count)
            .into_iter()
            .filter_map(|index| self.points.get(index))
            .collect()
    }

    /// Index of the point closest to `(x, y)` within the hover radius.
    pub fn hit_test(&self, x: f64, y: f64) -> Option<usize> {
        let radius = self.config.hover_radius();
        self.points
            .iter()
            .enumerate()
            .map(|(index, p)| (index, (p.x - x).hypot(p.y - y)))
            .filter(|(_, distance)| *distance <= radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(index, _)| index)
    }

    /// Set or clear the hovered point.
    pub fn hover(&mut self, index: Option<usize>) -> Result<()> {
        if let Some(index) = index {
            if index >= self.points.len() {
                return Err(AnalyticsError::Render {
                    message: format!("hover index {} out of range ({} points)", index, self.points.len()),
                });
            }
        }
        self.hovered = index;
        Ok(())
    }

    /// Hover whatever lies under `(x, y)`; returns the new hovered index.
    pub fn hover_at(&mut self, x: f64, y: f64) -> Option<usize> {
        self.hovered = self.hit_test(x, y);
        self.hovered
    }

    pub fn hovered(&self) -> Option<&ChartPoint> {
        self.hovered.and_then(|index| self.points.get(index))
    }

    pub fn tooltip(&self) -> Option<Tooltip> {
        self.hovered().map(|p| Tooltip {
            label: p.label.clone(),
            text: format!("{:.1} mi", p.miles),
            left_percent: p.x / self.config.width * 100.0,
            top_percent: p.y / self.config.height * 100.0,
        })
    }

    /// Bucket to drill into when the surface is clicked at `(x, y)`.
    ///
    /// `None` unless the chart is selectable and a point is hit.
    pub fn click(&self, x: f64, y: f64) -> Option<BucketKey> {
        if !self.selectable {
            return None;
        }
        self.hit_test(x, y).map(|index| self.points[index].bucket_key)
    }

    /// Render the chart as a standalone SVG document.
    pub fn to_svg(&self) -> String {
        let c = &self.config;
        let (w, h, pad) = (c.width, c.height, c.padding);
        let font = escape_markup(&c.font_family);

        let mut svg = format!(
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" role="img" aria-label="{}">"##,
            escape_markup(&self.title),
        );
        svg.push_str(&format!("<title>{}</title>", escape_markup(&self.title)));
        svg.push_str(&format!(
            r##"<rect x="0" y="0" width="{w}" height="{h}" fill="{}"/>"##,
            c.background_color,
        ));

        // Axes
        svg.push_str(&format!(
            r##"<line x1="{pad}" y1="{pad}" x2="{pad}" y2="{}" stroke="{}" stroke-width="1"/>"##,
            c.baseline(),
            c.axis_color,
        ));
        svg.push_str(&format!(
            r##"<line x1="{pad}" y1="{0}" x2="{1}" y2="{0}" stroke="{2}" stroke-width="1"/>"##,
            c.baseline(),
            w - pad,
            c.axis_color,
        ));

        for tick in self.y_ticks() {
            svg.push_str(&format!(
                r##"<line x1="{pad}" y1="{0}" x2="{1}" y2="{0}" stroke="{2}" stroke-width="1"/>"##,
                tick.y,
                w - pad,
                c.grid_color,
            ));
            svg.push_str(&format!(
                r##"<text x="{}" y="{}" text-anchor="end" fill="{}" font-family="{font}" font-size="{}">{:.0}</text>"##,
                pad - 8.0,
                tick.y + 4.0,
                c.label_color,
                c.font_size,
                tick.value,
            ));
        }

        svg.push_str(&format!(
            r##"<path d="{}" fill="none" stroke="{}" stroke-width="{}"/>"##,
            self.path(),
            c.line_color,
            c.stroke_width,
        ));

        let cursor = if self.selectable { r#" cursor="pointer""# } else { "" };
        for p in &self.points {
            svg.push_str(&format!(
                r##"<circle cx="{}" cy="{}" r="{}" fill="{}"/>"##,
                p.x, p.y, c.point_radius, c.line_color,
            ));
            svg.push_str(&format!(
                r##"<circle cx="{}" cy="{}" r="{}" fill="transparent" data-bucket="{}"{cursor}/>"##,
                p.x,
                p.y,
                c.hover_radius(),
                p.bucket_key,
            ));
        }

        for p in self.x_ticks() {
            svg.push_str(&format!(
                r##"<text x="{}" y="{}" text-anchor="middle" fill="{}" font-family="{font}" font-size="{}">{}</text>"##,
                p.x,
                c.baseline() + 20.0,
                c.label_color,
                c.font_size,
                escape_markup(&p.label),
            ));
        }

        if let Some(p) = self.hovered() {
            let text = format!("{:.1} mi", p.miles);
            let box_width = 110.0;
            let box_height = 40.0;
            let bx = (p.x - box_width / 2.0).clamp(0.0, w - box_width);
            let by = (p.y - box_height - 8.0).max(0.0);
            svg.push_str(&format!(
                r##"<rect x="{bx}" y="{by}" width="{box_width}" height="{box_height}" rx="4" fill="black" fill-opacity="0.9" stroke="{}"/>"##,
                c.line_color,
            ));
            svg.push_str(&format!(
                r##"<text x="{}" y="{}" fill="{}" font-family="{font}" font-size="{}">{}</text>"##,
                bx + 10.0,
                by + 16.0,
                c.line_color,
                c.font_size,
                escape_markup(&p.label),
            ));
            svg.push_str(&format!(
                r##"<text x="{}" y="{}" fill="{}" font-family="{font}" font-size="{}">{text}</text>"##,
                bx + 10.0,
                by + 32.0,
                c.line_color,
                c.font_size,
            ));
        }

        svg.push_str("</svg>");
        debug!("[Chart] rendered {} points ({} bytes)", self.points.len(), svg.len());
        svg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MonthKey;

    fn series(miles: &[f64]) -> Vec<SeriesPoint> {
        let mut month: MonthKey = "2024-01".parse().unwrap();
        miles
            .iter()
            .map(|&m| {
                let point = SeriesPoint { bucket_key: BucketKey::Month(month), label: month.label(), miles: m };
                month = month.next().unwrap();
                point
            })
            .collect()
    }

    #[test]
    fn test_points_span_inner_width() {
        let config = ChartConfig::default();
        let points = build_chart_points(&series(&[0.0, 5.0, 10.0]), &config);

        assert_eq!(points[0].x, 48.0);
        assert_eq!(points[2].x, 952.0);
        assert_eq!(points[0].y, 272.0); // baseline
        assert_eq!(points[2].y, 48.0); // top
        assert_eq!(points[1].y, 160.0);
    }

    #[test]
    fn test_single_point_is_centered() {
        let points = build_chart_points(&series(&[4.0]), &ChartConfig::default());
        assert_eq!(points[0].x, 500.0);
        assert_eq!(points[0].y, 48.0);
    }

    #[test]
    fn test_tick_indices_append_last() {
        // Step 2 over 12 points skips index 11, which is appended
        assert_eq!(build_tick_indices(12, 6), vec![0, 2, 4, 6, 8, 10, 11]);
    }

    #[test]
    fn test_all_zero_series_uses_min_range() {
        let chart = Chart::new(series(&[0.0, 0.0]), "Distance Per Month", true).unwrap();
        assert_eq!(chart.y_max(), 1.0);
        assert!(chart.points().iter().all(|p| p.y == 272.0 && p.y.is_finite()));
        assert_eq!(chart.y_ticks().len(), 5);
    }

    #[test]
    fn test_path_format() {
        let points = build_chart_points(&series(&[0.0, 10.0]), &ChartConfig::default());
        assert_eq!(build_chart_path(&points), "M48 272 L952 48");
        assert_eq!(build_chart_path(&[]), "");
    }

    #[test]
    fn test_tick_indices_include_last() {
        assert_eq!(build_tick_indices(0, 6), vec![0]);
        assert_eq!(build_tick_indices(2, 6), vec![0, 1]);
        assert_eq!(build_tick_indices(12, 6), vec![0, 2, 4, 6, 8, 10, 11]);
        assert_eq!(build_tick_indices(31, 6), vec![0, 6, 12, 18, 24, 30]);
    }

    #[test]
    fn test_empty_series_has_no_chart() {
        assert!(Chart::new(Vec::new(), "Distance Per Month", true).is_none());
    }

    #[test]
    fn test_hit_test_within_hover_radius() {
        let chart = Chart::new(series(&[0.0, 10.0]), "Distance Per Month", true).unwrap();
        assert_eq!(chart.hit_test(50.0, 270.0), Some(0));
        assert_eq!(chart.hit_test(952.0, 57.0), Some(1));
        assert_eq!(chart.hit_test(500.0, 160.0), None);
    }

    #[test]
    fn test_hover_and_tooltip() {
        let mut chart = Chart::new(series(&[0.0, 12.34]), "Distance Per Month", true).unwrap();
        assert!(chart.tooltip().is_none());

        chart.hover(Some(1)).unwrap();
        let tooltip = chart.tooltip().unwrap();
        assert_eq!(tooltip.label, "Feb 2024");
        assert_eq!(tooltip.text, "12.3 mi");
        assert!((tooltip.left_percent - 95.2).abs() < 1e-9);
        assert!((tooltip.top_percent - 15.0).abs() < 1e-9);

        assert!(chart.hover(Some(2)).is_err());
        assert_eq!(chart.hover_at(0.0, 0.0), None);
        assert!(chart.tooltip().is_none());
    }

    #[test]
    fn test_click_respects_selectable() {
        let selectable = Chart::new(series(&[1.0]), "Distance Per Month", true).unwrap();
        let fixed = Chart::new(series(&[1.0]), "Distance Per Day", false).unwrap();
        let (x, y) = (selectable.points()[0].x, selectable.points()[0].y);

        assert_eq!(selectable.click(x, y).map(|k| k.to_string()).as_deref(), Some("2024-01"));
        assert_eq!(fixed.click(x, y), None);
    }

    #[test]
    fn test_svg_document() {
        let mut chart = Chart::new(series(&[0.0, 4.0, 8.0]), "Distance Per Month", true).unwrap();
        chart.hover(Some(2)).unwrap();
        let svg = chart.to_svg();

        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains("<title>Distance Per Month</title>"));
        assert!(svg.contains(r#"d="M48 272"#));
        assert!(svg.contains("Jan 2024"));
        assert!(svg.contains("Mar 2024"));
        assert!(svg.contains("8.0 mi"));
        assert!(svg.contains(r#"cursor="pointer""#));
        assert_eq!(svg.matches("<circle").count(), 6);
    }
}
