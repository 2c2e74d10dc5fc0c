//! # Geographic Utilities
//!
//! Geographic computations shared by track cleaning, display merging and the map
//! hit index. Coordinates are `geo::Coord` values in GeoJSON order: `x` is
//! longitude, `y` is latitude, both in WGS84 degrees.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two coordinates |
//! | [`polyline_length`] | Total length of a coordinate sequence in meters |
//! | [`compute_bounds`] | Bounding box of a coordinate sequence |
//! | [`compute_center`] | Centroid of a coordinate sequence |
//! | [`meters_to_degrees`] | Convert meters to approximate degrees at a latitude |
//! | [`meters_to_miles`] | Fixed-factor unit conversion |
//!
//! ## Example
//!
//! ```rust
//! use geo::Coord;
//! use ride_analytics::geo_utils;
//!
//! let track = vec![
//!     Coord { x: -117.1611, y: 32.7157 }, // San Diego
//!     Coord { x: -117.1620, y: 32.7170 },
//!     Coord { x: -117.1635, y: 32.7190 },
//! ];
//!
//! let length = geo_utils::polyline_length(&track);
//! println!("Track length: {:.0}m ({:.2} mi)", length, geo_utils::meters_to_miles(length));
//! ```

use geo::Coord;

use crate::{Bounds, EARTH_RADIUS_METERS, METERS_PER_MILE};

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two coordinates using the
/// Haversine formula on a sphere of radius [`EARTH_RADIUS_METERS`].
///
/// geo's `Haversine` measure uses the 6,371,008.8 m mean radius; display
/// merging thresholds are defined against 6,371,000 m, so the formula is
/// evaluated here directly.
///
/// # Example
///
/// ```rust
/// use geo::Coord;
/// use ride_analytics::geo_utils;
///
/// let london = Coord { x: -0.1278, y: 51.5074 };
/// let paris = Coord { x: 2.3522, y: 48.8566 };
///
/// let distance = geo_utils::haversine_distance(london, paris);
/// assert!((distance - 343_500.0).abs() < 1000.0);
/// ```
#[inline]
pub fn haversine_distance(start: Coord, end: Coord) -> f64 {
    let delta_lat = (end.y - start.y).to_radians();
    let delta_lon = (end.x - start.x).to_radians();
    let start_lat = start.y.to_radians();
    let end_lat = end.y.to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lon = (delta_lon / 2.0).sin();
    let a = sin_lat * sin_lat + start_lat.cos() * end_lat.cos() * sin_lon * sin_lon;
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_METERS * c
}

/// Calculate the total length of a coordinate sequence in meters.
///
/// Empty or single-point sequences return 0.0.
pub fn polyline_length(points: &[Coord]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(w[0], w[1]))
        .sum()
}

/// Convert meters to approximate degrees at a given latitude.
///
/// Uses the longitude shrink factor so the result is a conservative (larger)
/// value suitable for square search envelopes.
#[inline]
pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    let lat_rad = latitude.to_radians();
    let meters_per_degree = 111_320.0 * lat_rad.cos().max(0.1);
    meters / meters_per_degree
}

/// Convert meters to statute miles (1609.34 m per mile).
#[inline]
pub fn meters_to_miles(meters: f64) -> f64 {
    meters / METERS_PER_MILE
}

/// Convert statute miles to meters.
#[inline]
pub fn miles_to_meters(miles: f64) -> f64 {
    miles * METERS_PER_MILE
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Compute the bounding box of a coordinate sequence.
///
/// Returns `None` for empty input.
///
/// ```rust
/// use geo::Coord;
/// use ride_analytics::geo_utils;
///
/// let track = vec![
///     Coord { x: -0.1300, y: 51.5000 },
///     Coord { x: -0.1200, y: 51.5100 },
/// ];
///
/// let bounds = geo_utils::compute_bounds(&track).unwrap();
/// assert_eq!(bounds.min_lat, 51.5000);
/// assert_eq!(bounds.max_lng, -0.1200);
/// ```
pub fn compute_bounds(points: &[Coord]) -> Option<Bounds> {
    if points.is_empty() {
        return None;
    }

    let mut min_lat = f64::MAX;
    let mut max_lat = f64::MIN;
    let mut min_lng = f64::MAX;
    let mut max_lng = f64::MIN;

    for p in points {
        min_lat = min_lat.min(p.y);
        max_lat = max_lat.max(p.y);
        min_lng = min_lng.min(p.x);
        max_lng = max_lng.max(p.x);
    }

    Some(Bounds { min_lat, max_lat, min_lng, max_lng })
}

// =============================================================================
// Center/Centroid Functions
// =============================================================================

/// Compute the arithmetic centroid of a coordinate sequence.
///
/// Returns `None` for empty input. Suitable for small areas such as the initial
/// map view of a city's rides; not meaningful across the antimeridian.
pub fn compute_center(points: &[Coord]) -> Option<Coord> {
    if points.is_empty() {
        return None;
    }

    let n = points.len() as f64;
    let sum_lat: f64 = points.iter().map(|p| p.y).sum();
    let sum_lng: f64 = points.iter().map(|p| p.x).sum();

    Some(Coord { x: sum_lng / n, y: sum_lat / n })
}

// =============================================================================
// Unit Tests
// =============================================================================
