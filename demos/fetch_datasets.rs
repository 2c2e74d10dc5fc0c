//! Fetch the route collection and activity dataset over HTTP.
//!
//! Run with: cargo run --example fetch_datasets --features http -- https://your.site
//!
//! The routes come from the published GeoJSON; the activity dataset is read
//! from `<site>/data/pac-tyler-activities.json`.

use std::time::Duration;

use ride_analytics::http::fetch_all_blocking;
use ride_analytics::{AnalyticsView, FetchConfig, GeoJsonLayer, LoadState, StatsPanel};

fn main() {
    let site = std::env::args().nth(1).unwrap_or_else(|| "http://localhost:3000".to_string());
    let config = FetchConfig::for_site(&site).with_timeout(Duration::from_secs(15));

    println!("Fetching datasets");
    println!("  routes:     {}", config.routes_url);
    println!("  activities: {}\n", config.activities_url);

    let outcome = match fetch_all_blocking(config) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Fetcher setup failed: {}", e);
            return;
        }
    };

    let mut view = AnalyticsView::new();
    let mut layer = GeoJsonLayer::default();
    outcome.apply(&mut view, &mut layer);

    match view.routes_state() {
        LoadState::Ready => println!("Map: {} routes", view.routes().len()),
        LoadState::Failed(message) => println!("Map error: {}", message),
        LoadState::Loading => println!("Map: loading"),
    }

    match view.stats_panel() {
        StatsPanel::Stats(cards) => {
            for card in cards {
                println!("  {:<14} {}", card.label, card.value);
            }
        }
        other => println!("Stats: {}", other.message().unwrap_or_default()),
    }
}
