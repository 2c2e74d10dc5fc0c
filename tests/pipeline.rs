//! End-to-end checks from raw JSON to view, chart and map output.

use chrono::{TimeZone, Utc};
use geo::Coord;
use ride_analytics::dataset::route_collection_to_geojson;
use ride_analytics::{
    build_activity_dataset, build_display_routes, parse_activity_dataset, parse_route_collection,
    prepare_route_features, AnalyticsView, CleanConfig, DisplayGeometry, GeoJsonLayer, Granularity,
    MapRenderer, MergeConfig, MonthKey, RangeMode, RouteHitIndex, StatsPanel,
};

const ROUTES: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "properties": {"activity_id": 1, "name": "Harbor Loop", "date": "2024-03-02T15:00:00Z", "distance": 16093.4, "type": "root='Ride'"},
      "geometry": {"type": "LineString", "coordinates": [
        [-117.1700, 32.7100], [-117.1690, 32.7110], [-117.1680, 32.7120],
        [-117.1560, 32.7180], [-117.1550, 32.7190]
      ]}
    },
    {
      "type": "Feature",
      "properties": {"activity_id": 2, "name": "Coast", "date": "2024-06-10T15:00:00Z", "distance": 8046.7, "type": "Ride"},
      "geometry": {"type": "MultiLineString", "coordinates": [
        [[-117.2500, 32.8000], [-117.2500, 32.8030]],
        [[-117.2500, 33.1000], [-117.2500, 33.1030]]
      ]}
    },
    {
      "type": "Feature",
      "properties": {"name": "Trailhead"},
      "geometry": {"type": "Point", "coordinates": [-117.2, 32.9]}
    }
  ]
}"#;

const ACTIVITIES: &str = r#"{
  "generated_at": "2024-07-01T00:00:00Z",
  "activity_count": 3,
  "activities": [
    {"activity_id": "1", "name": "Harbor Loop", "date": "2024-03-02T15:00:00Z", "distance_m": 16093.4, "distance_mi": 10.0, "type": "Ride"},
    {"activity_id": "2", "name": "Coast", "date": "2024-06-10T15:00:00Z", "distance_m": 8046.7, "distance_mi": 5.0, "type": "Ride"},
    {"activity_id": "3", "name": "Broken", "date": "??", "distance_m": 1609.34, "distance_mi": 1.0}
  ]
}"#;

#[test]
fn test_routes_to_map_layer() {
    let features = parse_route_collection(ROUTES.as_bytes()).unwrap();
    assert_eq!(features.len(), 2);

    let prepared = prepare_route_features(&features, &CleanConfig::default());
    // Harbor Loop splits once at its ~1.3 km jump; Coast keeps its two parts
    assert_eq!(prepared.len(), 4);
    assert_eq!(prepared[0].properties.activity_type.as_deref(), Some("Ride"));

    let routes = build_display_routes(&prepared, &MergeConfig::default());
    assert_eq!(routes.len(), 2);
    assert!(matches!(routes[0].geometry, DisplayGeometry::Line(ref l) if l.0.len() == 5));
    assert_eq!(routes[1].geometry.part_count(), 2);

    let mut layer = GeoJsonLayer::default();
    layer.render_routes(&routes).unwrap();
    let collection = layer.collection().unwrap();
    assert_eq!(collection.features.len(), 2);
    let popup = collection.features[0].properties.as_ref().unwrap()["popup"].as_str().unwrap();
    assert!(popup.contains("Harbor Loop"));
    assert!(popup.contains("10.00 mi"));

    let index = RouteHitIndex::new(&routes);
    let hit = index.locate(Coord { x: -117.1695, y: 32.7105 }, 30.0).unwrap();
    assert_eq!(hit.key.to_string(), "id:1");
}

#[test]
fn test_merge_matches_across_reencode() {
    let features = parse_route_collection(ROUTES.as_bytes()).unwrap();
    let prepared = prepare_route_features(&features, &CleanConfig::default());

    let encoded = serde_json::to_vec(&route_collection_to_geojson(&prepared)).unwrap();
    let decoded = parse_route_collection(&encoded).unwrap();

    let config = MergeConfig::default();
    assert_eq!(build_display_routes(&prepared, &config), build_display_routes(&decoded, &config));
}

#[test]
fn test_derived_dataset_counts_each_activity_once() {
    let features = parse_route_collection(ROUTES.as_bytes()).unwrap();
    let prepared = prepare_route_features(&features, &CleanConfig::default());
    let dataset = build_activity_dataset(&prepared, Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap());

    assert_eq!(dataset.activity_count, 2);
    assert_eq!(dataset.generated_at.as_deref(), Some("2024-07-01T00:00:00+00:00"));

    let records = dataset.to_records();
    assert_eq!(records[0].id.to_string(), "id:1");
}

#[test]
fn test_activity_view_flow() {
    let records = parse_activity_dataset(ACTIVITIES.as_bytes()).unwrap();
    assert_eq!(records.len(), 3);

    let mut view = AnalyticsView::new();
    view.load_activities(records);

    // All time: Mar..Jun, the undated ride is listed but not bucketed
    assert_eq!(view.filtered().len(), 3);
    let miles: Vec<f64> = view.series().iter().map(|p| (p.miles * 10.0).round() / 10.0).collect();
    assert_eq!(miles, vec![10.0, 0.0, 0.0, 5.0]);

    let StatsPanel::Stats(cards) = view.stats_panel() else {
        panic!("expected stats");
    };
    assert_eq!(cards[0].value, "15.0");
    assert_eq!(cards[1].value, "2");

    // Drill into April from the chart
    assert!(view.select_point(1));
    let april: MonthKey = "2024-04".parse().unwrap();
    assert_eq!(*view.selection().mode(), RangeMode::Month(april));
    assert_eq!(view.series().len(), 30);
    assert_eq!(view.stats_panel(), StatsPanel::NoData);

    view.select_month("2024-06".parse().unwrap()).unwrap();
    view.set_granularity(Granularity::Weekly);
    let weekly = view.series();
    assert_eq!(weekly.len(), 5);
    assert_eq!(weekly[1].bucket_key.to_string(), "week-2024-06-08");
    assert!((weekly[1].miles - 5.0).abs() < 1e-9);

    let chart = view.chart().unwrap();
    assert_eq!(chart.title(), "Distance Per Week");
    assert!(chart.to_svg().contains("Week of Jun 8"));
}

#[test]
fn test_malformed_inputs_are_errors() {
    assert!(parse_activity_dataset(b"{not json").is_err());
    assert!(parse_route_collection(br#"{"type": "Point", "coordinates": [0, 0]}"#).is_err());
    assert!("2024-13".parse::<MonthKey>().is_err());
    assert!("24-01".parse::<MonthKey>().is_err());
}
