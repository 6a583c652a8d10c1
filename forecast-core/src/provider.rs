use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc};

use crate::{Config, error::ProviderError, model::Forecast, provider::open_meteo::OpenMeteoProvider};

pub mod open_meteo;

/// Network source of forecasts. Implementations perform exactly one request
/// per call and never retry on their own.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn fetch(&self, latitude: f64, longitude: f64) -> Result<Forecast, ProviderError>;
}

/// Construct the forecast provider described by the `[provider]` section.
pub fn provider_from_config(config: &Config) -> anyhow::Result<Arc<dyn WeatherProvider>> {
    let provider = OpenMeteoProvider::new(&config.provider.forecast_url, config.provider_timeout())?
        .with_forecast_days(config.provider.forecast_days);

    Ok(Arc::new(provider))
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        let head: String = body.chars().take(MAX).collect();
        format!("{head}...")
    } else {
        body.to_string()
    }
}
