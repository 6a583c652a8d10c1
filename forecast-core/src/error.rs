//! Error types shared across the crate.
//!
//! Provider-level failures never escape [`crate::WeatherOrchestrator`] on their
//! own: they are folded into the stale-fallback path, and only surface wrapped
//! in [`FetchError::NoDataAvailable`] when nothing is cached.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::LocationId;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("coordinates out of range: latitude {latitude}, longitude {longitude}")]
pub struct InvalidCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Anything that can go wrong while asking the weather service for a forecast.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("weather request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("weather service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to parse weather response: {0}")]
    Parse(String),

    #[error("weather response has no current conditions")]
    MissingCurrent,
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_decode() {
            ProviderError::Parse(err.to_string())
        } else {
            ProviderError::Network(err)
        }
    }
}

/// Result of `fetch_weather` when no snapshot can be returned.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("location '{0}' has no identifier yet; save it before fetching weather")]
    UnsavedLocation(String),

    #[error("no weather data available for location {location_id}: {source}")]
    NoDataAvailable {
        location_id: LocationId,
        #[source]
        source: ProviderError,
    },
}

impl FetchError {
    pub fn user_message(&self) -> &'static str {
        match self {
            FetchError::UnsavedLocation(_) => "Save this location before loading its weather.",
            FetchError::NoDataAvailable {
                source: ProviderError::Timeout,
                ..
            } => "The weather service took too long to answer. Check your connection.",
            FetchError::NoDataAvailable { .. } => {
                "Weather is unavailable right now and nothing is cached for this place."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("no position fix and no last known position")]
    PositionUnavailable,
}

impl PositionError {
    pub fn user_message(&self) -> &'static str {
        match self {
            PositionError::PermissionDenied => "Location access is not allowed.",
            PositionError::PositionUnavailable => "Your position could not be determined.",
        }
    }
}

/// Failures of the on-disk stores (weather cache, saved locations).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt store file {}: {source}", path.display())]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("snapshot for location {snapshot} cannot be stored under key {key}")]
    KeyMismatch { key: LocationId, snapshot: LocationId },
}

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("geocoding request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("geocoding service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to parse geocoding response: {0}")]
    Parse(String),
}
