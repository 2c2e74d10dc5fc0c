//! Unified error handling for the ride-analytics library.
//!
//! Data problems inside a dataset (bad dates, empty segments) are never errors:
//! they are skipped where they are used. This type covers the failures that a
//! caller has to surface, such as a dataset that could not be fetched or decoded,
//! or a selection that does not exist in the loaded data.

use thiserror::Error;

use crate::MonthKey;

/// Unified error type for ride-analytics operations.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// Network failure before a response was received
    #[error("Failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    /// Server answered with a non-success status
    #[error("Failed to fetch {url}: HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// Body was not valid JSON for the expected shape
    #[error("Failed to decode dataset: {0}")]
    Decode(#[from] serde_json::Error),

    /// Body was JSON but not a usable GeoJSON FeatureCollection
    #[error("Invalid GeoJSON: {message}")]
    InvalidGeoJson { message: String },

    /// Month key not in `YYYY-MM` form
    #[error("Invalid month key '{0}', expected YYYY-MM")]
    InvalidMonthKey(String),

    /// Year not present in the loaded dataset
    #[error("Year {0} is not present in the loaded dataset")]
    UnavailableYear(i32),

    /// Month not present in the loaded dataset
    #[error("Month {0} is not present in the loaded dataset")]
    UnavailableMonth(MonthKey),

    /// Map renderer rejected the routes
    #[error("Map rendering failed: {message}")]
    Render { message: String },
}

impl AnalyticsError {
    /// True for errors raised while loading a dataset (fetch or decode).
    pub fn is_load_failure(&self) -> bool {
        matches!(
            self,
            AnalyticsError::Fetch { .. }
                | AnalyticsError::HttpStatus { .. }
                | AnalyticsError::Decode(_)
                | AnalyticsError::InvalidGeoJson { .. }
        )
    }
}

/// Result type alias for ride-analytics operations.
pub type Result<T> = std::result::Result<T, AnalyticsError>;
