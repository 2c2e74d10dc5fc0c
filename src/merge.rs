//! Display merging of route segments.
//!
//! Pause splitting leaves one ride as several line segments. For the map, the
//! segments of one activity are walked in file order and glued back together
//! whenever the gap between the end of the running path and the start of the
//! next segment is within the display-merge threshold (2 km). Larger gaps stay
//! visible as separate parts of a multi-line geometry.

use std::collections::HashMap;
use std::time::Instant;

use geo::{Coord, LineString, MultiLineString};
use geojson::Value;
use log::info;
use serde::Serialize;

use crate::dataset::{line_to_value, RouteFeature};
use crate::geo_utils::{compute_bounds, haversine_distance, polyline_length};
use crate::{ActivityKey, ActivityRecord, Bounds, DISPLAY_MERGE_THRESHOLD_METERS};

/// Configuration for display merging.
#[derive(Debug, Clone, Serialize)]
pub struct MergeConfig {
    /// Maximum endpoint gap joined into one path, inclusive.
    /// Default: 2000.0 meters
    pub threshold_meters: f64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            threshold_meters: DISPLAY_MERGE_THRESHOLD_METERS,
        }
    }
}

/// Display geometry of one activity after merging.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayGeometry {
    /// All segments joined into one path
    Line(LineString<f64>),
    /// Disjoint parts that stayed apart (or no segments at all)
    MultiLine(MultiLineString<f64>),
}

impl DisplayGeometry {
    fn from_paths(mut paths: Vec<LineString<f64>>) -> Self {
        if paths.len() == 1 {
            if let Some(path) = paths.pop() {
                return DisplayGeometry::Line(path);
            }
        }
        DisplayGeometry::MultiLine(MultiLineString::new(paths))
    }

    /// The paths making up this geometry, in order.
    pub fn paths(&self) -> Vec<&LineString<f64>> {
        match self {
            DisplayGeometry::Line(line) => vec![line],
            DisplayGeometry::MultiLine(multi) => multi.0.iter().collect(),
        }
    }

    pub fn part_count(&self) -> usize {
        match self {
            DisplayGeometry::Line(_) => 1,
            DisplayGeometry::MultiLine(multi) => multi.0.len(),
        }
    }

    /// All coordinates across every part, in order.
    pub fn coords(&self) -> Vec<Coord> {
        self.paths().into_iter().flat_map(|p| p.0.iter().copied()).collect()
    }

    /// Bounding box, `None` when the geometry has no points.
    pub fn bounds(&self) -> Option<Bounds> {
        compute_bounds(&self.coords())
    }

    /// Drawn length in meters (gaps between parts excluded).
    pub fn length_meters(&self) -> f64 {
        self.paths().into_iter().map(|p| polyline_length(&p.0)).sum()
    }

    /// GeoJSON geometry value.
    pub fn to_geojson_value(&self) -> Value {
        match self {
            DisplayGeometry::Line(line) => line_to_value(line),
            DisplayGeometry::MultiLine(multi) => Value::MultiLineString(
                multi
                    .0
                    .iter()
                    .map(|line| line.coords().map(|c| vec![c.x, c.y]).collect())
                    .collect(),
            ),
        }
    }
}

/// One activity ready for the map: merged geometry plus its record.
///
/// The record comes from the first feature seen for the activity key and is
/// never modified, so popups show the source fields.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayRoute {
    pub key: ActivityKey,
    pub record: ActivityRecord,
    pub geometry: DisplayGeometry,
}

/// Merge consecutive segments whose endpoint gap is at most `threshold_meters`.
///
/// Segments are walked in input order. An empty segment (no last or first
/// point to compare) closes the running path and starts a new one. Zero or
/// one segment is returned unchanged.
///
/// ```rust
/// use geo::{Coord, LineString};
/// use ride_analytics::merge_segments;
///
/// let a: LineString<f64> = vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 0.0, y: 0.01 }].into();
/// let b: LineString<f64> = vec![Coord { x: 0.0, y: 0.015 }, Coord { x: 0.0, y: 0.02 }].into();
/// let c: LineString<f64> = vec![Coord { x: 0.0, y: 0.5 }, Coord { x: 0.0, y: 0.51 }].into();
///
/// // a -> b is ~556 m, b -> c is ~53 km
/// let merged = merge_segments(&[a, b, c], 2000.0);
/// assert_eq!(merged.len(), 2);
/// assert_eq!(merged[0].0.len(), 4);
/// ```
pub fn merge_segments(segments: &[LineString<f64>], threshold_meters: f64) -> Vec<LineString<f64>> {
    if segments.len() <= 1 {
        return segments.to_vec();
    }

    let mut merged: Vec<LineString<f64>> = Vec::new();
    let mut current: Vec<Coord> = segments[0].0.clone();

    for segment in &segments[1..] {
        let (Some(&last), Some(&next)) = (current.last(), segment.0.first()) else {
            merged.push(LineString::new(std::mem::take(&mut current)));
            current = segment.0.clone();
            continue;
        };

        if haversine_distance(last, next) <= threshold_meters {
            current.extend(segment.0.iter().copied());
            continue;
        }

        merged.push(LineString::new(std::mem::take(&mut current)));
        current = segment.0.clone();
    }

    merged.push(LineString::new(current));
    merged
}

/// Build display routes from route features.
///
/// Features are grouped by activity key; groups keep the order in which their
/// key first appears, and segments keep input order within a group. Output
/// depends only on input order, never on object identity.
pub fn build_display_routes(features: &[RouteFeature], config: &MergeConfig) -> Vec<DisplayRoute> {
    let start = Instant::now();

    let mut index: HashMap<ActivityKey, usize> = HashMap::new();
    let mut groups: Vec<(ActivityKey, &RouteFeature, Vec<LineString<f64>>)> = Vec::new();

    for feature in features {
        let key = feature.key();
        let slot = match index.get(&key) {
            Some(&slot) => slot,
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, feature, Vec::new()));
                groups.len() - 1
            }
        };
        groups[slot].2.extend(feature.segments.iter().cloned());
    }

    let merge_group = |(key, first, segments): &(ActivityKey, &RouteFeature, Vec<LineString<f64>>)| {
        DisplayRoute {
            key: key.clone(),
            record: first.record(),
            geometry: DisplayGeometry::from_paths(merge_segments(segments, config.threshold_meters)),
        }
    };

    #[cfg(feature = "parallel")]
    let routes: Vec<DisplayRoute> = {
        use rayon::prelude::*;
        groups.par_iter().map(merge_group).collect()
    };

    #[cfg(not(feature = "parallel"))]
    let routes: Vec<DisplayRoute> = groups.iter().map(merge_group).collect();

    let multi_part = routes.iter().filter(|r| r.geometry.part_count() > 1).count();
    info!(
        "[Merge] {} features -> {} routes ({} multi-part) in {:?}",
        features.len(),
        routes.len(),
        multi_part,
        start.elapsed()
    );

    routes
}
