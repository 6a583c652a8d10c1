//! Core library for the `forecast` CLI.
//!
//! This crate defines:
//! - The freshness policy deciding between cached and fetched weather
//! - Weather caches (in-memory and file-backed) with a retention sweep
//! - The orchestrator that serves fresh data and falls back to stale data
//! - Saved locations, the current-location slot, and position lookup
//! - Open-Meteo forecast and geocoding clients
//! - Configuration handling
//!
//! It is used by `forecast-cli`, but can also be reused by other binaries or services.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod freshness;
pub mod geocode;
pub mod location_store;
pub mod model;
pub mod orchestrator;
mod persist;
pub mod position;
pub mod provider;
pub mod resolver;

pub use cache::{CacheEvent, FileWeatherCache, MemoryWeatherCache, WeatherCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{FetchError, GeocodeError, PositionError, ProviderError, StoreError};
pub use freshness::{Decision, FreshnessPolicy};
pub use geocode::{Geocoder, HttpGeocoder};
pub use location_store::LocationStore;
pub use model::{Coordinates, Forecast, ForecastSnapshot, Location, LocationId};
pub use orchestrator::{FetchOutcome, Origin, WeatherOrchestrator};
pub use position::{CurrentPositionProvider, FixedPositionProvider, NoPositionProvider};
pub use provider::{WeatherProvider, provider_from_config};
pub use resolver::{CurrentLocationResolver, CurrentLocationUpdate};
