//! HTTP fetching of the route collection and the activity dataset.
//!
//! Both datasets are requested at the same time and fail independently: a
//! broken activity dataset leaves the map working and vice versa. Requests are
//! not retried. A fetch that is aborted before completion yields nothing and
//! leaves the view untouched.

use std::time::{Duration, Instant};

use futures::future::{AbortRegistration, Abortable};
use log::{debug, info, warn};
use reqwest::Client;

use crate::dataset::{parse_activity_dataset, parse_route_collection, RouteFeature};
use crate::map::MapRenderer;
use crate::view::AnalyticsView;
use crate::{ActivityRecord, AnalyticsError, Result};

/// Published route collection.
pub const DEFAULT_ROUTES_URL: &str =
    "https://raw.githubusercontent.com/Tyler-Schwenk/Pac-Tyler/main/cleaned_output.geojson";

/// Path of the derived activity dataset on the hosting site.
pub const ACTIVITY_DATASET_PATH: &str = "/data/pac-tyler-activities.json";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Where the two datasets live.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    /// GeoJSON FeatureCollection of routes
    pub routes_url: String,
    /// Activity dataset JSON
    pub activities_url: String,
    /// Per-request timeout.
    /// Default: 30 seconds
    pub timeout: Duration,
}

impl FetchConfig {
    pub fn new(routes_url: impl Into<String>, activities_url: impl Into<String>) -> Self {
        Self {
            routes_url: routes_url.into(),
            activities_url: activities_url.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Published routes plus the activity dataset served by `site_base`.
    pub fn for_site(site_base: &str) -> Self {
        Self::new(
            DEFAULT_ROUTES_URL,
            format!("{}{}", site_base.trim_end_matches('/'), ACTIVITY_DATASET_PATH),
        )
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Results of fetching both datasets; each side fails on its own.
#[derive(Debug)]
pub struct FetchOutcome {
    pub routes: Result<Vec<RouteFeature>>,
    pub activities: Result<Vec<ActivityRecord>>,
}

impl FetchOutcome {
    /// Feed both results into the view and the map.
    pub fn apply<R: MapRenderer + ?Sized>(self, view: &mut AnalyticsView, renderer: &mut R) {
        view.apply_activities(self.activities);
        view.apply_routes(self.routes, renderer);
    }
}

/// Dataset client.
pub struct DatasetFetcher {
    client: Client,
    config: FetchConfig,
}

impl DatasetFetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .pool_idle_timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| AnalyticsError::Fetch {
                url: String::new(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let start = Instant::now();
        let fetch_error = |e: reqwest::Error| AnalyticsError::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(fetch_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(AnalyticsError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(fetch_error)?;
        debug!(
            "[Fetch] {} -> {:.1}KB in {:?}",
            url,
            bytes.len() as f64 / 1024.0,
            start.elapsed()
        );
        Ok(bytes.to_vec())
    }

    /// Fetch and decode the route collection.
    pub async fn fetch_routes(&self) -> Result<Vec<RouteFeature>> {
        let bytes = self.fetch_bytes(&self.config.routes_url).await?;
        parse_route_collection(&bytes)
    }

    /// Fetch and decode the activity dataset.
    pub async fn fetch_activities(&self) -> Result<Vec<ActivityRecord>> {
        let bytes = self.fetch_bytes(&self.config.activities_url).await?;
        parse_activity_dataset(&bytes)
    }

    /// Fetch both datasets concurrently.
    pub async fn fetch_all(&self) -> FetchOutcome {
        let start = Instant::now();
        let (routes, activities) = futures::join!(self.fetch_routes(), self.fetch_activities());

        if let Err(e) = &routes {
            warn!("[Fetch] routes failed: {}", e);
        }
        if let Err(e) = &activities {
            warn!("[Fetch] activities failed: {}", e);
        }
        info!(
            "[Fetch] routes: {}, activities: {} in {:?}",
            routes.as_ref().map_or(0, Vec::len),
            activities.as_ref().map_or(0, Vec::len),
            start.elapsed()
        );

        FetchOutcome { routes, activities }
    }

    /// Like [`fetch_all`](Self::fetch_all), but returns `None` once the
    /// paired `AbortHandle` fires.
    pub async fn fetch_all_abortable(&self, registration: AbortRegistration) -> Option<FetchOutcome> {
        match Abortable::new(self.fetch_all(), registration).await {
            Ok(outcome) => Some(outcome),
            Err(_) => {
                debug!("[Fetch] aborted, discarding results");
                None
            }
        }
    }
}

/// Blocking wrapper for callers without an async runtime.
pub fn fetch_all_blocking(config: FetchConfig) -> Result<FetchOutcome> {
    use tokio::runtime::Builder;

    let runtime = Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .map_err(|e| AnalyticsError::Fetch {
            url: String::new(),
            message: format!("Failed to create tokio runtime: {}", e),
        })?;

    let fetcher = DatasetFetcher::new(config)?;
    Ok(runtime.block_on(fetcher.fetch_all()))
}
