//! City search and reverse geocoding.
//!
//! Search goes to the Open-Meteo geocoding API; reverse lookups go to
//! Nominatim (OpenStreetMap). Neither needs an API key.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::fmt::Debug;
use std::time::Duration;

use crate::Config;
use crate::error::GeocodeError;
use crate::model::{Coordinates, Location, LocationId};
use crate::provider::truncate_body;

/// Queries shorter than this (after trimming) never hit the network.
pub const MIN_QUERY_CHARS: usize = 2;
pub const MAX_SEARCH_RESULTS: usize = 10;

/// Human-readable place for a coordinate pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceName {
    pub name: String,
    pub region: Option<String>,
    pub country: Option<String>,
}

#[async_trait]
pub trait Geocoder: Send + Sync + Debug {
    async fn search(&self, query: &str) -> Result<Vec<Location>, GeocodeError>;

    /// `None` on any failure; callers substitute a default name.
    async fn reverse(&self, coordinates: Coordinates) -> Option<PlaceName>;
}

#[derive(Debug, Clone)]
pub struct HttpGeocoder {
    search_url: Url,
    reverse_url: Url,
    language: String,
    http: Client,
}

impl HttpGeocoder {
    pub fn new(
        search_url: &str,
        reverse_url: &str,
        language: &str,
        user_agent: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let search_url = Url::parse(search_url)
            .with_context(|| format!("Invalid geocoding URL '{search_url}'"))?;
        let reverse_url = Url::parse(reverse_url)
            .with_context(|| format!("Invalid reverse geocoding URL '{reverse_url}'"))?;
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("Failed to build HTTP client for geocoding")?;

        Ok(Self {
            search_url,
            reverse_url,
            language: language.to_string(),
            http,
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(
            &config.provider.geocoding_url,
            &config.provider.reverse_geocoding_url,
            &config.provider.language,
            &config.provider.user_agent,
            config.provider_timeout(),
        )
    }

    async fn try_reverse(&self, coordinates: Coordinates) -> Result<Option<PlaceName>, GeocodeError> {
        let res = self
            .http
            .get(self.reverse_url.clone())
            .query(&[
                ("lat", coordinates.latitude.to_string()),
                ("lon", coordinates.longitude.to_string()),
                ("format", "json".to_string()),
                ("addressdetails", "1".to_string()),
                ("accept-language", self.language.clone()),
            ])
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            return Err(GeocodeError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let parsed: NominatimResponse =
            serde_json::from_str(&body).map_err(|e| GeocodeError::Parse(e.to_string()))?;

        Ok(parsed.address.and_then(NominatimAddress::into_place))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Option<Vec<SearchResult>>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: u64,
    name: String,
    latitude: f64,
    longitude: f64,
    country: Option<String>,
    admin1: Option<String>,
}

impl SearchResult {
    fn into_location(self) -> Option<Location> {
        let coordinates = Coordinates::new(self.latitude, self.longitude).ok()?;
        Some(Location {
            id: Some(LocationId(self.id)),
            name: self.name,
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
            region: self.admin1,
            country: self.country,
            is_current: false,
        })
    }
}

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    address: Option<NominatimAddress>,
}

#[derive(Debug, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    county: Option<String>,
    state: Option<String>,
    region: Option<String>,
    country: Option<String>,
}

impl NominatimAddress {
    fn into_place(self) -> Option<PlaceName> {
        let name = self
            .city
            .or(self.town)
            .or(self.village)
            .or(self.municipality)
            .or(self.county)?;

        Some(PlaceName {
            name,
            region: self.state.or(self.region),
            country: self.country,
        })
    }
}

#[async_trait]
impl Geocoder for HttpGeocoder {
    async fn search(&self, query: &str) -> Result<Vec<Location>, GeocodeError> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_CHARS {
            return Ok(Vec::new());
        }

        let res = self
            .http
            .get(self.search_url.clone())
            .query(&[
                ("name", query.to_string()),
                ("count", MAX_SEARCH_RESULTS.to_string()),
                ("language", self.language.clone()),
                ("format", "json".to_string()),
            ])
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            return Err(GeocodeError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let parsed: SearchResponse =
            serde_json::from_str(&body).map_err(|e| GeocodeError::Parse(e.to_string()))?;

        let locations: Vec<Location> = parsed
            .results
            .unwrap_or_default()
            .into_iter()
            .filter_map(SearchResult::into_location)
            .take(MAX_SEARCH_RESULTS)
            .collect();

        tracing::debug!(query, results = locations.len(), "City search finished");
        Ok(locations)
    }

    async fn reverse(&self, coordinates: Coordinates) -> Option<PlaceName> {
        match self.try_reverse(coordinates).await {
            Ok(place) => {
                if let Some(place) = &place {
                    tracing::info!("Reverse geocoded to: {}", place.name);
                }
                place
            }
            Err(e) => {
                tracing::debug!("Reverse geocode failed: {e}");
                None
            }
        }
    }
}
