//! # Map Rendering Boundary
//!
//! The analytics core never draws tiles itself. It hands merged
//! [`DisplayRoute`]s to a [`MapRenderer`]; [`GeoJsonLayer`] is the bundled
//! renderer and produces a styled FeatureCollection for a JavaScript map
//! engine. [`RouteHitIndex`] answers "which route was clicked" on the Rust side.

use std::time::Instant;

use geo::Coord;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue};
use log::{info, warn};
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use serde::Serialize;
use serde_json::json;

use crate::geo_utils::meters_to_degrees;
use crate::merge::DisplayRoute;
use crate::{escape_markup, ActivityRecord, AnalyticsError, Bounds, Result};

// ============================================================================
// Styling and Basemap
// ============================================================================

/// Line style shared by every route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteStyle {
    /// Default: "#E3B800"
    pub color: String,
    /// Line width in pixels.
    /// Default: 2
    pub weight: f64,
    /// Default: 0.8
    pub opacity: f64,
}

impl Default for RouteStyle {
    fn default() -> Self {
        Self {
            color: "#E3B800".to_string(),
            weight: 2.0,
            opacity: 0.8,
        }
    }
}

/// Dark raster basemap and initial viewport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasemapConfig {
    /// Tile URL template with `{s}`, `{z}`, `{x}`, `{y}` and `{r}` placeholders
    pub tile_url: String,
    pub attribution: String,
    pub subdomains: String,
    pub max_zoom: u8,
    /// Initial center as (lat, lng). Default: San Diego
    pub center: (f64, f64),
    pub zoom: u8,
}

impl Default for BasemapConfig {
    fn default() -> Self {
        Self {
            tile_url: "https://{s}.basemaps.cartocdn.com/dark_all/{z}/{x}/{y}{r}.png".to_string(),
            attribution: "&copy; <a href=\"https://www.openstreetmap.org/copyright\">OpenStreetMap</a> contributors &copy; <a href=\"https://carto.com/attributions\">CARTO</a>".to_string(),
            subdomains: "abcd".to_string(),
            max_zoom: 20,
            center: (32.7157, -117.1611),
            zoom: 11,
        }
    }
}

// ============================================================================
// Popups
// ============================================================================

/// Popup content for one route, taken from the unmodified record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutePopup {
    pub name: String,
    /// `M/D/YYYY` in UTC, or the raw string when it did not parse
    pub date: String,
    /// Miles to two decimals, without unit
    pub distance: String,
    pub activity_type: String,
}

impl RoutePopup {
    pub fn from_record(record: &ActivityRecord) -> Self {
        let date = match record.parsed_date {
            Some(parsed) => parsed.format("%-m/%-d/%Y").to_string(),
            None => record.date.clone(),
        };

        Self {
            name: record.name.clone().unwrap_or_default(),
            date,
            distance: format!("{:.2}", record.distance_miles()),
            activity_type: record.activity_type.clone().unwrap_or_default(),
        }
    }

    /// Popup body for the map engine.
    pub fn to_html(&self, style: &RouteStyle) -> String {
        format!(
            concat!(
                "<div style=\"color: #1a1a1a; font-family: 'Courier New', monospace;\">",
                "<strong style=\"color: {};\">{}</strong><br/>",
                "<strong>Date:</strong> {}<br/>",
                "<strong>Distance:</strong> {} mi<br/>",
                "<strong>Type:</strong> {}",
                "</div>"
            ),
            style.color,
            escape_markup(&self.name),
            escape_markup(&self.date),
            self.distance,
            escape_markup(&self.activity_type),
        )
    }
}

// ============================================================================
// Renderer Trait
// ============================================================================

/// A sink for merged route geometry.
///
/// Implementations must draw each route's geometry exactly as given; popups
/// are derived with [`RoutePopup::from_record`].
pub trait MapRenderer {
    /// Replace the drawn routes.
    fn render_routes(&mut self, routes: &[DisplayRoute]) -> Result<()>;

    /// Show an inline error. Previously drawn routes stay as they are.
    fn render_error(&mut self, message: &str);
}

/// Renders routes to a styled GeoJSON FeatureCollection.
#[derive(Debug, Clone, Default)]
pub struct GeoJsonLayer {
    style: RouteStyle,
    basemap: BasemapConfig,
    collection: Option<FeatureCollection>,
    bounds: Option<Bounds>,
    error: Option<String>,
}

impl GeoJsonLayer {
    pub fn new(style: RouteStyle, basemap: BasemapConfig) -> Self {
        Self {
            style,
            basemap,
            ..Default::default()
        }
    }

    pub fn style(&self) -> &RouteStyle {
        &self.style
    }

    pub fn basemap(&self) -> &BasemapConfig {
        &self.basemap
    }

    /// The last rendered collection, if any.
    pub fn collection(&self) -> Option<&FeatureCollection> {
        self.collection.as_ref()
    }

    /// Combined bounds of the last rendered routes.
    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Serialize the last rendered collection.
    pub fn to_json_string(&self) -> Result<String> {
        let collection = self.collection.as_ref().ok_or_else(|| AnalyticsError::Render {
            message: "no routes rendered".to_string(),
        })?;
        Ok(serde_json::to_string(collection)?)
    }

    fn route_feature(&self, route: &DisplayRoute) -> Result<Feature> {
        let popup = RoutePopup::from_record(&route.record);

        let mut properties = JsonObject::new();
        properties.insert("activity_key".into(), JsonValue::String(route.key.to_string()));
        properties.insert("name".into(), json!(route.record.name));
        properties.insert("date".into(), JsonValue::String(route.record.date.clone()));
        properties.insert("distance".into(), json!(route.record.distance_meters));
        properties.insert("type".into(), json!(route.record.activity_type));
        properties.insert("popup".into(), JsonValue::String(popup.to_html(&self.style)));
        properties.insert("style".into(), serde_json::to_value(&self.style)?);

        Ok(Feature {
            bbox: None,
            geometry: Some(Geometry::new(route.geometry.to_geojson_value())),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        })
    }
}

impl MapRenderer for GeoJsonLayer {
    fn render_routes(&mut self, routes: &[DisplayRoute]) -> Result<()> {
        let start = Instant::now();

        let features = routes
            .iter()
            .map(|route| self.route_feature(route))
            .collect::<Result<Vec<_>>>()?;

        self.bounds = routes
            .iter()
            .filter_map(|r| r.geometry.bounds())
            .reduce(|a, b| a.union(&b));
        self.collection = Some(FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        });
        self.error = None;

        info!("[Map] rendered {} routes in {:?}", routes.len(), start.elapsed());
        Ok(())
    }

    fn render_error(&mut self, message: &str) {
        warn!("[Map] {}", message);
        self.error = Some(message.to_string());
    }
}

// ============================================================================
// Hit Testing
// ============================================================================

/// One drawn line piece of a route, indexed by its bounding box.
#[derive(Debug, Clone, Copy)]
struct IndexedSegment {
    route: usize,
    start: [f64; 2],
    end: [f64; 2],
}

impl RTreeObject for IndexedSegment {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.start, self.end)
    }
}

impl PointDistance for IndexedSegment {
    /// Squared planar distance in degrees from the point to the segment.
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let (dx, dy) = (self.end[0] - self.start[0], self.end[1] - self.start[1]);
        let length_2 = dx * dx + dy * dy;
        let t = if length_2 > 0.0 {
            (((point[0] - self.start[0]) * dx + (point[1] - self.start[1]) * dy) / length_2).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let px = self.start[0] + t * dx - point[0];
        let py = self.start[1] + t * dy - point[1];
        px * px + py * py
    }
}

/// Spatial index resolving a clicked coordinate to a route.
pub struct RouteHitIndex {
    routes: Vec<DisplayRoute>,
    tree: RTree<IndexedSegment>,
}

impl RouteHitIndex {
    pub fn new(routes: &[DisplayRoute]) -> Self {
        let mut segments = Vec::new();
        for (route, display) in routes.iter().enumerate() {
            for path in display.geometry.paths() {
                let coords: Vec<[f64; 2]> = path.coords().map(|c| [c.x, c.y]).collect();
                match coords.as_slice() {
                    [] => {}
                    [only] => segments.push(IndexedSegment { route, start: *only, end: *only }),
                    _ => segments.extend(
                        coords
                            .windows(2)
                            .map(|w| IndexedSegment { route, start: w[0], end: w[1] }),
                    ),
                }
            }
        }

        Self {
            routes: routes.to_vec(),
            tree: RTree::bulk_load(segments),
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Route drawn closest to `point`, if within `tolerance_meters`.
    pub fn locate(&self, point: Coord, tolerance_meters: f64) -> Option<&DisplayRoute> {
        let query = [point.x, point.y];
        let tolerance = meters_to_degrees(tolerance_meters, point.y);

        self.tree
            .nearest_neighbor(&query)
            .filter(|nearest| nearest.distance_2(&query) <= tolerance * tolerance)
            .and_then(|nearest| self.routes.get(nearest.route))
    }

    /// Popup of the route under `point`.
    pub fn popup_at(&self, point: Coord, tolerance_meters: f64) -> Option<RoutePopup> {
        self.locate(point, tolerance_meters)
            .map(|route| RoutePopup::from_record(&route.record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{RouteFeature, RouteProperties};
    use crate::merge::{build_display_routes, MergeConfig};
    use geo::LineString;

    fn route_feature(id: &str, name: &str, segments: Vec<Vec<(f64, f64)>>) -> RouteFeature {
        RouteFeature::new(
            RouteProperties {
                activity_id: Some(id.to_string()),
                name: Some(name.to_string()),
                date: Some("2024-04-05T16:30:00Z".into()),
                distance: Some(16_093.4),
                activity_type: Some("Ride".into()),
            },
            segments
                .into_iter()
                .map(|s| LineString::from(s.into_iter().map(|(x, y)| Coord { x, y }).collect::<Vec<_>>()))
                .collect(),
        )
    }

    fn routes() -> Vec<DisplayRoute> {
        build_display_routes(
            &[
                route_feature("1", "Harbor Loop", vec![vec![(-117.17, 32.71), (-117.16, 32.72)]]),
                route_feature(
                    "2",
                    "Coast <Out & Back>",
                    vec![vec![(-117.25, 32.80), (-117.25, 32.81)], vec![(-117.25, 33.10), (-117.25, 33.11)]],
                ),
            ],
            &MergeConfig::default(),
        )
    }

    #[test]
    fn test_popup_from_record() {
        let popup = RoutePopup::from_record(&routes()[0].record);
        assert_eq!(popup.name, "Harbor Loop");
        assert_eq!(popup.date, "4/5/2024");
        assert_eq!(popup.distance, "10.00");
        assert_eq!(popup.activity_type, "Ride");

        let html = popup.to_html(&RouteStyle::default());
        assert!(html.contains("<strong>Distance:</strong> 10.00 mi"));
        assert!(html.contains("color: #E3B800;"));
    }

    #[test]
    fn test_popup_escapes_markup() {
        let popup = RoutePopup::from_record(&routes()[1].record);
        let html = popup.to_html(&RouteStyle::default());
        assert!(html.contains("Coast &lt;Out &amp; Back&gt;"));
    }

    #[test]
    fn test_layer_keeps_merged_geometry() {
        let routes = routes();
        let mut layer = GeoJsonLayer::default();
        layer.render_routes(&routes).unwrap();

        let collection = layer.collection().unwrap();
        assert_eq!(collection.features.len(), 2);

        let first = collection.features[0].geometry.as_ref().unwrap();
        assert_eq!(first.value, routes[0].geometry.to_geojson_value());
        let second = collection.features[1].geometry.as_ref().unwrap();
        assert!(matches!(second.value, geojson::Value::MultiLineString(ref parts) if parts.len() == 2));

        let props = collection.features[0].properties.as_ref().unwrap();
        assert_eq!(props["activity_key"], "id:1");
        assert_eq!(props["style"]["weight"], 2.0);
        assert!(props["popup"].as_str().unwrap().contains("Harbor Loop"));

        let bounds = layer.bounds().unwrap();
        assert_eq!(bounds.max_lat, 33.11);
        assert!(layer.to_json_string().unwrap().contains("FeatureCollection"));
    }

    #[test]
    fn test_error_leaves_previous_render() {
        let mut layer = GeoJsonLayer::default();
        assert!(layer.to_json_string().is_err());

        layer.render_routes(&routes()).unwrap();
        layer.render_error("Failed to fetch data");
        assert_eq!(layer.error(), Some("Failed to fetch data"));
        assert_eq!(layer.collection().unwrap().features.len(), 2);
    }

    #[test]
    fn test_hit_index_locates_route() {
        let index = RouteHitIndex::new(&routes());
        assert_eq!(index.len(), 2);

        let on_loop = Coord { x: -117.165, y: 32.715 };
        assert_eq!(index.locate(on_loop, 50.0).unwrap().key.to_string(), "id:1");

        let near_coast = Coord { x: -117.2502, y: 33.105 };
        let popup = index.popup_at(near_coast, 50.0).unwrap();
        assert_eq!(popup.name, "Coast <Out & Back>");

        // Between the two coast parts nothing is drawn
        assert!(index.locate(Coord { x: -117.25, y: 32.95 }, 50.0).is_none());
    }

    #[test]
    fn test_basemap_defaults() {
        let basemap = BasemapConfig::default();
        assert_eq!(basemap.subdomains, "abcd");
        assert_eq!(basemap.max_zoom, 20);
        assert_eq!(basemap.center, (32.7157, -117.1611));
        assert!(basemap.tile_url.contains("dark_all"));
    }
}
