//! Dataset decoding and derivation.
//!
//! Two independent inputs feed the analytics:
//! - a GeoJSON FeatureCollection of route features (geometry plus `name`,
//!   `date`, `distance` in meters, `type` and an optional `activity_id`)
//! - a flat activity dataset `{generated_at, activity_count, activities}` used
//!   for filtering, aggregation and stats
//!
//! The flat dataset can also be derived from the route collection with
//! [`build_activity_dataset`], which is how the export step produces it.

use std::collections::HashSet;
use std::time::Instant;

use chrono::{DateTime, SecondsFormat, Utc};
use geo::{Coord, LineString};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, JsonValue, Value};
use log::{debug, info, warn};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AnalyticsError, Result};
use crate::{ActivityKey, ActivityRecord, METERS_PER_MILE};

/// Miles tolerance before `distance_mi` is reported as disagreeing with `distance_m`.
const UNIT_AGREEMENT_TOLERANCE_MILES: f64 = 0.01;

// ============================================================================
// Activity Dataset
// ============================================================================

/// One entry of the flat activity dataset as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetEntry {
    #[serde(default, deserialize_with = "deserialize_activity_id")]
    pub activity_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub distance_m: Option<f64>,
    #[serde(default)]
    pub distance_mi: Option<f64>,
    #[serde(default, rename = "type")]
    pub activity_type: Option<String>,
}

impl DatasetEntry {
    /// Convert to an [`ActivityRecord`].
    ///
    /// Meters are authoritative; miles are only used when meters are missing.
    pub fn to_record(&self) -> ActivityRecord {
        let meters = match (self.distance_m, self.distance_mi) {
            (Some(m), Some(mi)) => {
                if (m / METERS_PER_MILE - mi).abs() > UNIT_AGREEMENT_TOLERANCE_MILES {
                    warn!(
                        "[Dataset] distance_m={} and distance_mi={} disagree for {:?}; using meters",
                        m, mi, self.activity_id
                    );
                }
                m
            }
            (Some(m), None) => m,
            (None, Some(mi)) => mi * METERS_PER_MILE,
            (None, None) => 0.0,
        };

        ActivityRecord::new(
            self.activity_id.clone(),
            self.name.clone(),
            self.date.clone().unwrap_or_default(),
            meters,
            self.activity_type.clone(),
        )
    }
}

/// The flat activity dataset document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityDataset {
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub activity_count: usize,
    #[serde(default)]
    pub activities: Vec<DatasetEntry>,
}

impl ActivityDataset {
    /// Convert every entry to a record, preserving order.
    pub fn to_records(&self) -> Vec<ActivityRecord> {
        self.activities.iter().map(DatasetEntry::to_record).collect()
    }
}

/// Decode the flat activity dataset from JSON bytes.
///
/// A document without an `activities` array yields an empty list. Entries with
/// unparsable dates are kept; date-bucketed views skip them later.
///
/// ```rust
/// use ride_analytics::parse_activity_dataset;
///
/// let json = br#"{
///     "generated_at": "2024-07-01T00:00:00+00:00",
///     "activity_count": 1,
///     "activities": [
///         {"activity_id": "42", "name": "Loop", "date": "2024-06-30T14:00:00",
///          "distance_m": 16093.4, "distance_mi": 10.0, "type": "Ride"}
///     ]
/// }"#;
///
/// let records = parse_activity_dataset(json).unwrap();
/// assert_eq!(records.len(), 1);
/// assert_eq!(records[0].id.to_string(), "id:42");
/// ```
pub fn parse_activity_dataset(bytes: &[u8]) -> Result<Vec<ActivityRecord>> {
    let start = Instant::now();
    let dataset: ActivityDataset = serde_json::from_slice(bytes)?;
    let records = dataset.to_records();

    let undated = records.iter().filter(|r| r.parsed_date.is_none()).count();
    if dataset.activity_count != 0 && dataset.activity_count != records.len() {
        debug!(
            "[Dataset] activity_count={} but {} entries present",
            dataset.activity_count,
            records.len()
        );
    }
    info!(
        "[Dataset] Decoded {} activities ({} undated) in {:?}",
        records.len(),
        undated,
        start.elapsed()
    );

    Ok(records)
}

// ============================================================================
// Route Features
// ============================================================================

/// Descriptive properties of a route feature.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RouteProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Distance in meters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub activity_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<String>,
}

impl RouteProperties {
    /// Read properties leniently: a field of the wrong JSON type counts as absent.
    pub fn from_json(properties: &JsonObject) -> Self {
        let string_field = |key: &str| {
            properties
                .get(key)
                .and_then(JsonValue::as_str)
                .map(str::to_string)
        };

        Self {
            name: string_field("name"),
            date: string_field("date"),
            distance: properties.get("distance").and_then(JsonValue::as_f64),
            activity_type: string_field("type"),
            activity_id: properties.get("activity_id").and_then(activity_id_from_json),
        }
    }

    fn to_json(&self) -> JsonObject {
        match serde_json::to_value(self) {
            Ok(JsonValue::Object(map)) => map,
            _ => JsonObject::new(),
        }
    }
}

/// One route feature: an activity's properties and its ordered line segments.
///
/// Coordinates are `[longitude, latitude]` as in GeoJSON.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteFeature {
    pub properties: RouteProperties,
    pub segments: Vec<LineString<f64>>,
}

impl RouteFeature {
    pub fn new(properties: RouteProperties, segments: Vec<LineString<f64>>) -> Self {
        Self { properties, segments }
    }

    /// Activity record built from this feature's unmodified properties.
    pub fn record(&self) -> ActivityRecord {
        ActivityRecord::new(
            self.properties.activity_id.clone(),
            self.properties.name.clone(),
            self.properties.date.clone().unwrap_or_default(),
            self.properties.distance.unwrap_or(0.0),
            self.properties.activity_type.clone(),
        )
    }

    /// Grouping key for display merging.
    pub fn key(&self) -> ActivityKey {
        ActivityKey::new(
            self.properties.activity_id.as_deref(),
            self.properties.name.as_deref(),
            self.properties.date.as_deref().unwrap_or_default(),
            self.properties.distance.unwrap_or(0.0).max(0.0),
        )
    }

    /// Encode as GeoJSON features, one LineString feature per segment.
    pub fn to_geojson_features(&self) -> Vec<Feature> {
        let properties = self.properties.to_json();
        self.segments
            .iter()
            .map(|segment| Feature {
                bbox: None,
                geometry: Some(Geometry::new(line_to_value(segment))),
                id: None,
                properties: Some(properties.clone()),
                foreign_members: None,
            })
            .collect()
    }
}

/// Decode a route FeatureCollection from JSON bytes.
///
/// LineString features contribute one segment, MultiLineString features one
/// segment per part. Features with any other geometry are skipped. Positions
/// with fewer than two values are dropped.
pub fn parse_route_collection(bytes: &[u8]) -> Result<Vec<RouteFeature>> {
    let start = Instant::now();
    let geojson: GeoJson = serde_json::from_slice(bytes)?;
    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        GeoJson::Feature(_) => {
            return Err(AnalyticsError::InvalidGeoJson {
                message: "expected a FeatureCollection, found a Feature".to_string(),
            })
        }
        GeoJson::Geometry(_) => {
            return Err(AnalyticsError::InvalidGeoJson {
                message: "expected a FeatureCollection, found a Geometry".to_string(),
            })
        }
    };

    let total = collection.features.len();
    let features = features_from_collection(&collection);

    info!(
        "[Dataset] Decoded {} route features ({} skipped) in {:?}",
        features.len(),
        total - features.len(),
        start.elapsed()
    );

    Ok(features)
}

/// Convert an already-decoded FeatureCollection into route features.
pub fn features_from_collection(collection: &FeatureCollection) -> Vec<RouteFeature> {
    collection
        .features
        .iter()
        .filter_map(|feature| {
            let segments = match feature.geometry.as_ref().map(|g| &g.value) {
                Some(Value::LineString(line)) => vec![positions_to_line(line)],
                Some(Value::MultiLineString(lines)) => {
                    lines.iter().map(|line| positions_to_line(line)).collect()
                }
                other => {
                    debug!(
                        "[Dataset] Skipping feature with non-line geometry: {:?}",
                        other.map(geometry_type_name)
                    );
                    return None;
                }
            };

            let properties = feature
                .properties
                .as_ref()
                .map(RouteProperties::from_json)
                .unwrap_or_default();

            Some(RouteFeature::new(properties, segments))
        })
        .collect()
}

/// Encode route features back into a FeatureCollection.
pub fn route_collection_to_geojson(features: &[RouteFeature]) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: features.iter().flat_map(RouteFeature::to_geojson_features).collect(),
        foreign_members: None,
    }
}

// ============================================================================
// Dataset Derivation
// ============================================================================

/// Derive the flat activity dataset from route features.
///
/// Features without a date or distance are skipped. Pause splitting leaves
/// several features per activity, so only the first feature of each activity
/// key contributes an entry. Entries are sorted by date string ascending.
pub fn build_activity_dataset(features: &[RouteFeature], generated_at: DateTime<Utc>) -> ActivityDataset {
    let mut seen: HashSet<ActivityKey> = HashSet::new();
    let mut activities: Vec<DatasetEntry> = Vec::new();

    for feature in features {
        let props = &feature.properties;
        let (Some(date), Some(distance_m)) = (props.date.as_ref(), props.distance) else {
            continue;
        };

        if !seen.insert(feature.key()) {
            continue;
        }

        activities.push(DatasetEntry {
            activity_id: props.activity_id.clone(),
            name: props.name.clone(),
            date: Some(date.clone()),
            distance_m: Some(distance_m),
            distance_mi: Some(distance_m / METERS_PER_MILE),
            activity_type: props.activity_type.clone(),
        });
    }

    activities.sort_by(|a, b| a.date.cmp(&b.date));

    ActivityDataset {
        generated_at: Some(generated_at.to_rfc3339_opts(SecondsFormat::Secs, false)),
        activity_count: activities.len(),
        activities,
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn deserialize_activity_id<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<String>, D::Error> {
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(activity_id_from_json))
}

/// Activity ids arrive as strings in the dataset and as numbers in GeoJSON.
fn activity_id_from_json(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn positions_to_line(positions: &[Vec<f64>]) -> LineString<f64> {
    positions
        .iter()
        .filter(|p| p.len() >= 2)
        .map(|p| Coord { x: p[0], y: p[1] })
        .collect::<Vec<_>>()
        .into()
}

pub(crate) fn line_to_value(line: &LineString<f64>) -> Value {
    Value::LineString(line.coords().map(|c| vec![c.x, c.y]).collect())
}

fn geometry_type_name(value: &Value) -> &'static str {
    match value {
        Value::Point(_) => "Point",
        Value::MultiPoint(_) => "MultiPoint",
        Value::LineString(_) => "LineString",
        Value::MultiLineString(_) => "MultiLineString",
        Value::Polygon(_) => "Polygon",
        Value::MultiPolygon(_) => "MultiPolygon",
        Value::GeometryCollection(_) => "GeometryCollection",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ROUTES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature",
             "geometry": {"type": "LineString", "coordinates": [[-117.16, 32.71], [-117.17, 32.72]]},
             "properties": {"name": "Bay Loop", "date": "2024-03-02T15:00:00", "distance": 16093.4, "type": "Ride", "activity_id": 1001}},
            {"type": "Feature",
             "geometry": {"type": "LineString", "coordinates": [[-117.18, 32.73], [-117.19, 32.74]]},
             "properties": {"name": "Bay Loop", "date": "2024-03-02T15:00:00", "distance": 16093.4, "type": "Ride", "activity_id": 1001}},
            {"type": "Feature",
             "geometry": {"type": "Point", "coordinates": [-117.16, 32.71]},
             "properties": {"name": "Pin"}},
            {"type": "Feature",
             "geometry": {"type": "MultiLineString", "coordinates": [[[-117.1, 32.7], [-117.2, 32.8]], [[-117.3, 32.9], [-117.4, 33.0]]]},
             "properties": {"name": "Coast", "date": "2024-01-15", "distance": 8046.7, "type": "Ride"}}
        ]
    }"#;

    #[test]
    fn test_parse_route_collection() {
        let features = parse_route_collection(ROUTES.as_bytes()).unwrap();
        assert_eq!(features.len(), 3);
        assert_eq!(features[0].properties.activity_id.as_deref(), Some("1001"));
        assert_eq!(features[0].segments[0].0.len(), 2);
        assert_eq!(features[0].segments[0].0[0], Coord { x: -117.16, y: 32.71 });
        assert_eq!(features[2].segments.len(), 2);
        assert_eq!(features[2].key().to_string(), "meta:Coast|2024-01-15|8046.7");
    }

    #[test]
    fn test_parse_rejects_non_collection() {
        let single = r#"{"type": "Feature", "geometry": null, "properties": {}}"#;
        let err = parse_route_collection(single.as_bytes()).unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidGeoJson { .. }));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = parse_route_collection(b"not json").unwrap_err();
        assert!(matches!(err, AnalyticsError::Decode(_)));
    }

    #[test]
    fn test_lenient_properties() {
        let mut map = JsonObject::new();
        map.insert("name".into(), JsonValue::from(12));
        map.insert("distance".into(), JsonValue::from("far"));
        map.insert("date".into(), JsonValue::from("2024-01-01"));
        let props = RouteProperties::from_json(&map);
        assert_eq!(props.name, None);
        assert_eq!(props.distance, None);
        assert_eq!(props.date.as_deref(), Some("2024-01-01"));
    }

    #[test]
    fn test_parse_activity_dataset() {
        let json = r#"{
            "generated_at": "2024-07-01T00:00:00+00:00",
            "activity_count": 3,
            "activities": [
                {"activity_id": "1", "name": "A", "date": "2024-06-01T10:00:00", "distance_m": 1609.34, "distance_mi": 1.0, "type": "Ride"},
                {"activity_id": null, "name": "B", "date": "garbage", "distance_m": 3218.68, "distance_mi": 2.0},
                {"activity_id": 77, "date": "2024-06-03", "distance_mi": 3.0}
            ]
        }"#;

        let records = parse_activity_dataset(json.as_bytes()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].id.to_string(), "id:1");
        assert!(records[1].parsed_date.is_none());
        assert_eq!(records[1].id.to_string(), "meta:B|garbage|3218.68");
        assert_eq!(records[2].id.to_string(), "id:77");
        assert!((records[2].distance_miles() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_activities_is_empty() {
        let records = parse_activity_dataset(br#"{"generated_at": "x"}"#).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_build_activity_dataset_dedupes_and_sorts() {
        let features = parse_route_collection(ROUTES.as_bytes()).unwrap();
        let generated_at = Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap();
        let dataset = build_activity_dataset(&features, generated_at);

        // Two segments of activity 1001 collapse into one entry
        assert_eq!(dataset.activity_count, 2);
        assert_eq!(dataset.activities[0].name.as_deref(), Some("Coast"));
        assert_eq!(dataset.activities[1].activity_id.as_deref(), Some("1001"));
        assert!((dataset.activities[1].distance_mi.unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(dataset.generated_at.as_deref(), Some("2024-07-01T12:00:00+00:00"));
    }

    #[test]
    fn test_build_activity_dataset_skips_incomplete() {
        let feature = RouteFeature::new(
            RouteProperties { name: Some("No date".into()), distance: Some(10.0), ..Default::default() },
            vec![],
        );
        let dataset = build_activity_dataset(&[feature], Utc::now());
        assert_eq!(dataset.activity_count, 0);
    }

    #[test]
    fn test_geojson_round_trip_keeps_segments() {
        let features = parse_route_collection(ROUTES.as_bytes()).unwrap();
        let collection = route_collection_to_geojson(&features);
        // 1 + 1 + 2 segments, one LineString feature each
        assert_eq!(collection.features.len(), 4);
        let reparsed = features_from_collection(&collection);
        assert_eq!(reparsed[0].properties, features[0].properties);
    }
}
