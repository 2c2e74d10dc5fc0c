//! Clean, pause-split and display-merge a route collection, then render it.
//!
//! Run with: cargo run --example route_merge --features parallel

use std::time::Instant;

use geo::Coord;
use ride_analytics::{
    build_display_routes, parse_route_collection, prepare_route_features, CleanConfig,
    DisplayGeometry, GeoJsonLayer, MapRenderer, MergeConfig, RouteHitIndex,
};

const ROUTES: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "properties": {"activity_id": "201", "name": "Harbor Loop", "date": "2024-03-02T15:04:00Z", "distance": 12500.0, "type": "root='Ride'"},
      "geometry": {"type": "LineString", "coordinates": [
        [-117.1700, 32.7100], [-117.1680, 32.7120], [-117.1660, 32.7140],
        [-117.1520, 32.7200], [-117.1500, 32.7220]
      ]}
    },
    {
      "type": "Feature",
      "properties": {"activity_id": "202", "name": "Coast Out & Back", "date": "2024-06-01T14:00:00Z", "distance": 48280.2, "type": "Ride"},
      "geometry": {"type": "MultiLineString", "coordinates": [
        [[-117.2500, 32.8000], [-117.2500, 32.8100]],
        [[-117.2500, 33.1000], [-117.2500, 33.1100]]
      ]}
    }
  ]
}"#;

fn main() {
    let features = match parse_route_collection(ROUTES.as_bytes()) {
        Ok(features) => features,
        Err(e) => {
            eprintln!("Failed to parse routes: {}", e);
            return;
        }
    };

    println!("Route Display Merging\n");
    println!("Loaded {} features", features.len());

    // Pause splitting turns the Harbor Loop jump (~1.4 km) into two segments
    let prepared = prepare_route_features(&features, &CleanConfig::default());
    println!("After cleaning and pause splitting: {} features\n", prepared.len());

    let config = MergeConfig::default();
    let start = Instant::now();
    let routes = build_display_routes(&prepared, &config);
    println!("Merged into {} routes in {:?} (threshold {}m):", routes.len(), start.elapsed(), config.threshold_meters);

    for route in &routes {
        let shape = match &route.geometry {
            DisplayGeometry::Line(_) => "LineString".to_string(),
            DisplayGeometry::MultiLine(multi) => format!("MultiLineString ({} parts)", multi.0.len()),
        };
        println!(
            "  {:<18} {:<28} {:>8.0}m drawn",
            route.record.name.as_deref().unwrap_or("-"),
            shape,
            route.geometry.length_meters()
        );
    }

    let mut layer = GeoJsonLayer::default();
    if let Err(e) = layer.render_routes(&routes) {
        eprintln!("Render failed: {}", e);
        return;
    }
    match layer.to_json_string() {
        Ok(json) => println!("\nGeoJSON layer: {} bytes", json.len()),
        Err(e) => eprintln!("Serialize failed: {}", e),
    }

    let index = RouteHitIndex::new(&routes);
    let click = Coord { x: -117.2501, y: 33.105 };
    match index.popup_at(click, 50.0) {
        Some(popup) => println!("Clicked: {} on {} ({} mi, {})", popup.name, popup.date, popup.distance, popup.activity_type),
        None => println!("Clicked: nothing"),
    }
}
