//! Raw track cleanup before display.
//!
//! Recorded tracks arrive with GPS junk, far more points than a map needs and
//! long jumps where the recorder was paused. Preparation runs in two steps:
//!
//! 1. [`split_at_pauses`] breaks every segment wherever two consecutive points
//!    are further apart than the pause threshold (0.5 km by default).
//! 2. [`clean_route_features`] drops invalid coordinates, thins points that are
//!    closer together than the minimum spacing, optionally caps the point
//!    count, and normalizes the `type` and `date` properties.
//!
//! Display merging later re-joins split segments whose gap is small enough to
//! read as one ride on the map.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat};
use geo::{Coord, LineString};
use log::{debug, info};

use crate::dataset::RouteFeature;
use crate::geo_utils::haversine_distance;

/// Configuration for track preparation.
#[derive(Debug, Clone)]
pub struct CleanConfig {
    /// Split a segment where consecutive points are further apart than this.
    /// Default: 500.0 meters
    pub pause_split_threshold_meters: f64,

    /// Drop points closer than this to the previously kept point.
    /// Zero disables thinning. Default: 5.0 meters
    pub min_point_spacing_meters: f64,

    /// Hard cap on points per segment after thinning. Zero disables the cap.
    /// Default: 0
    pub max_points_per_segment: usize,

    /// Segments with fewer points are dropped. Default: 2
    pub min_points_per_segment: usize,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            pause_split_threshold_meters: 500.0,
            min_point_spacing_meters: 5.0,
            max_points_per_segment: 0,
            min_points_per_segment: 2,
        }
    }
}

/// Split and clean raw route features in one pass.
pub fn prepare_route_features(features: &[RouteFeature], config: &CleanConfig) -> Vec<RouteFeature> {
    let split = split_at_pauses(features, config.pause_split_threshold_meters);
    clean_route_features(&split, config)
}

// ============================================================================
// Pause Splitting
// ============================================================================

/// Split tracks at pauses.
///
/// Every segment of every feature is cut wherever two consecutive points are
/// more than `threshold_meters` apart. Each resulting piece becomes its own
/// single-segment feature carrying the original properties, in order.
/// Input segments with fewer than two points are skipped; single-point pieces
/// produced by a split are left for [`clean_route_features`] to drop.
///
/// ```rust
/// use geo::{Coord, LineString};
/// use ride_analytics::{split_at_pauses, RouteFeature};
/// use ride_analytics::dataset::RouteProperties;
///
/// let track: LineString<f64> = vec![
///     Coord { x: 0.0, y: 0.000 },
///     Coord { x: 0.0, y: 0.001 },  // ~111 m
///     Coord { x: 0.0, y: 0.100 },  // ~11 km jump
///     Coord { x: 0.0, y: 0.101 },
/// ].into();
///
/// let feature = RouteFeature::new(RouteProperties::default(), vec![track]);
/// let split = split_at_pauses(&[feature], 500.0);
/// assert_eq!(split.len(), 2);
/// ```
pub fn split_at_pauses(features: &[RouteFeature], threshold_meters: f64) -> Vec<RouteFeature> {
    let mut output = Vec::new();

    for feature in features {
        for segment in &feature.segments {
            let coords = &segment.0;
            if coords.len() < 2 {
                continue;
            }

            let mut current: Vec<Coord> = vec![coords[0]];
            for pair in coords.windows(2) {
                if haversine_distance(pair[0], pair[1]) > threshold_meters {
                    output.push(RouteFeature::new(
                        feature.properties.clone(),
                        vec![LineString::new(std::mem::take(&mut current))],
                    ));
                }
                current.push(pair[1]);
            }
            output.push(RouteFeature::new(feature.properties.clone(), vec![LineString::new(current)]));
        }
    }

    debug!("[Clean] Split {} features into {} at pauses", features.len(), output.len());
    output
}

// ============================================================================
// Cleaning
// ============================================================================

/// Clean every feature, dropping those left without a usable segment.
pub fn clean_route_features(features: &[RouteFeature], config: &CleanConfig) -> Vec<RouteFeature> {
    let cleaned: Vec<RouteFeature> = features
        .iter()
        .filter_map(|f| clean_route_feature(f, config))
        .collect();

    info!(
        "[Clean] Kept {} of {} features ({} points)",
        cleaned.len(),
        features.len(),
        cleaned
            .iter()
            .flat_map(|f| f.segments.iter())
            .map(|s| s.0.len())
            .sum::<usize>()
    );

    cleaned
}

/// Clean a single feature.
///
/// Returns `None` when no segment keeps at least `min_points_per_segment`
/// points.
pub fn clean_route_feature(feature: &RouteFeature, config: &CleanConfig) -> Option<RouteFeature> {
    let segments: Vec<LineString<f64>> = feature
        .segments
        .iter()
        .map(filter_valid_coordinates)
        .map(|line| {
            reduce_coordinates(
                &line,
                config.min_point_spacing_meters,
                config.max_points_per_segment,
                config.min_points_per_segment,
            )
        })
        .filter(|line| line.0.len() >= config.min_points_per_segment)
        .collect();

    if segments.is_empty() {
        return None;
    }

    let mut properties = feature.properties.clone();
    if let Some(activity_type) = properties.activity_type.as_deref().and_then(normalize_activity_type) {
        properties.activity_type = Some(activity_type);
    }
    if let Some(date) = properties.date.as_deref().map(normalize_date) {
        properties.date = Some(date);
    }

    Some(RouteFeature::new(properties, segments))
}

/// Remove coordinates outside valid latitude/longitude bounds or not finite.
pub fn filter_valid_coordinates(line: &LineString<f64>) -> LineString<f64> {
    line.coords()
        .filter(|c| c.x.is_finite() && c.y.is_finite())
        .filter(|c| (-90.0..=90.0).contains(&c.y) && (-180.0..=180.0).contains(&c.x))
        .copied()
        .collect::<Vec<_>>()
        .into()
}

/// Thin a line by spacing, then cap its point count by stride sampling.
///
/// The first and last points always survive thinning. Lines shorter than
/// `min_points` are returned unchanged, as are all lines when both spacing and
/// cap are disabled.
pub fn reduce_coordinates(
    line: &LineString<f64>,
    min_spacing_meters: f64,
    max_points: usize,
    min_points: usize,
) -> LineString<f64> {
    let coords = &line.0;
    if min_spacing_meters <= 0.0 && max_points == 0 {
        return line.clone();
    }
    if coords.len() < min_points.max(2) {
        return line.clone();
    }

    let last = coords[coords.len() - 1];
    let mut reduced: Vec<Coord> = vec![coords[0]];
    for &point in &coords[1..coords.len() - 1] {
        let previous = reduced[reduced.len() - 1];
        if haversine_distance(previous, point) < min_spacing_meters {
            continue;
        }
        reduced.push(point);
    }
    if reduced[reduced.len() - 1] != last {
        reduced.push(last);
    }

    // A cap below two points cannot keep both endpoints
    if max_points < 2 || reduced.len() <= max_points {
        return LineString::new(reduced);
    }

    let stride = (reduced.len() - 1).div_ceil(max_points - 1);
    let mut capped: Vec<Coord> = reduced.iter().step_by(stride).copied().collect();
    if capped[capped.len() - 1] != last {
        capped.push(last);
    }
    capped.truncate(max_points);

    LineString::new(capped)
}

// ============================================================================
// Property Normalization
// ============================================================================

/// Normalize an activity type string.
///
/// Enum dumps such as `"root='Ride'"` collapse to `"Ride"`; blank values are
/// `None`.
pub fn normalize_activity_type(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    const MARKER: &str = "root='";
    let lowered = value.to_ascii_lowercase();
    if let Some(start) = lowered.find(MARKER) {
        let rest = &value[start + MARKER.len()..];
        if let Some(end) = rest.find('\'') {
            let inner = rest[..end].trim();
            if !inner.is_empty() {
                return Some(inner.to_string());
            }
        }
    }

    Some(value.to_string())
}

/// Normalize a date string to ISO-8601 with second precision.
///
/// Offsets are preserved; naive values stay naive. Strings that are not ISO
/// dates are returned trimmed but otherwise untouched.
pub fn normalize_date(value: &str) -> String {
    let value = value.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return parsed.to_rfc3339_opts(SecondsFormat::Secs, false);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return naive.format("%Y-%m-%dT%H:%M:%S").to_string();
        }
    }
    if let Ok(day) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return format!("{}T00:00:00", day.format("%Y-%m-%d"));
    }

    value.to_string()
}
