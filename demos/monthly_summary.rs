//! Monthly mileage summary from an activity dataset.
//!
//! Run with: cargo run --example monthly_summary

use ride_analytics::{
    parse_activity_dataset, AnalyticsView, Granularity, StatsPanel,
};

const DATASET: &str = r#"{
  "generated_at": "2024-07-01T00:00:00Z",
  "activity_count": 5,
  "activities": [
    {"activity_id": 101, "name": "Harbor Loop", "date": "2024-03-02T15:04:00Z", "distance_m": 24140.1, "distance_mi": 15.0, "type": "Ride"},
    {"activity_id": 102, "name": "Coffee Run", "date": "2024-03-09T16:20:00Z", "distance_m": 8046.7, "distance_mi": 5.0, "type": "Ride"},
    {"activity_id": 103, "name": "Coast Out & Back", "date": "2024-06-01T14:00:00Z", "distance_m": 48280.2, "distance_mi": 30.0, "type": "Ride"},
    {"activity_id": 104, "name": "Evening Spin", "date": "2024-06-18T01:30:00Z", "distance_m": 16093.4, "distance_mi": 10.0, "type": "EBikeRide"},
    {"activity_id": 105, "name": "Lost GPS", "date": "unknown", "distance_m": 3218.7, "distance_mi": 2.0}
  ]
}"#;

fn print_panel(view: &AnalyticsView) {
    match view.stats_panel() {
        StatsPanel::Stats(cards) => {
            for card in cards {
                println!("   {:<14} {}", card.label, card.value);
            }
        }
        other => println!("   {}", other.message().unwrap_or_default()),
    }
}

fn print_series(view: &AnalyticsView) {
    println!("   {}:", view.chart_title());
    for point in view.series() {
        if point.miles > 0.0 {
            println!("     {:<16} {:>6.1} mi", point.label, point.miles);
        }
    }
}

fn main() {
    let records = match parse_activity_dataset(DATASET.as_bytes()) {
        Ok(records) => records,
        Err(e) => {
            eprintln!("Failed to load dataset: {}", e);
            return;
        }
    };

    let mut view = AnalyticsView::new();
    view.load_activities(records);

    println!("Ride Analytics Summary\n");
    println!("1. All time:");
    print_panel(&view);
    println!("   {} monthly buckets", view.series().len());
    print_series(&view);

    // Drill into April: no rides, so every day is zero
    println!("\n2. Drill down into {}:", view.series()[1].label);
    view.select_point(1);
    print_panel(&view);
    println!("   {} daily buckets", view.series().len());

    println!("\n3. June by week:");
    if let Some(june) = view.options().latest_month() {
        if let Err(e) = view.select_month(june) {
            eprintln!("   {}", e);
        }
    }
    view.set_granularity(Granularity::Weekly);
    print_panel(&view);
    print_series(&view);

    if let Some(chart) = view.chart() {
        println!("\n4. Chart SVG: {} bytes", chart.to_svg().len());
    }
}
