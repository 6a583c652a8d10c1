use anyhow::{Context, Result};
use std::sync::Arc;

use forecast_core::{
    Config, Coordinates, CurrentLocationResolver, CurrentPositionProvider, FileWeatherCache,
    FixedPositionProvider, FreshnessPolicy, HttpGeocoder, LocationStore, NoPositionProvider,
    WeatherOrchestrator, provider_from_config,
};

/// Everything a command needs, wired from the loaded configuration.
pub struct App {
    pub config: Config,
    pub store: Arc<LocationStore>,
    pub orchestrator: WeatherOrchestrator,
    pub geocoder: Arc<HttpGeocoder>,
    /// Snapshots removed by the retention sweep that runs on every start.
    pub purged_on_start: usize,
}

impl App {
    pub async fn open(config: Config) -> Result<Self> {
        let cache_dir = config.cache_dir()?;
        let cache = FileWeatherCache::open(&cache_dir)
            .await
            .with_context(|| format!("Failed to open weather cache: {}", cache_dir.display()))?;

        let locations_file = config.locations_file()?;
        let store = LocationStore::open(&locations_file).await.with_context(|| {
            format!("Failed to open location list: {}", locations_file.display())
        })?;

        let orchestrator = WeatherOrchestrator::new(Arc::new(cache), provider_from_config(&config)?)
            .with_policy(FreshnessPolicy::new(config.freshness_window()))
            .with_retention(config.retention())
            .with_fetch_timeout(config.provider_timeout());

        let geocoder = Arc::new(HttpGeocoder::from_config(&config)?);

        let purged_on_start = match orchestrator.purge_expired().await {
            Ok(purged) => purged,
            Err(e) => {
                tracing::warn!("Retention sweep failed: {e}");
                0
            }
        };

        Ok(Self {
            config,
            store: Arc::new(store),
            orchestrator,
            geocoder,
            purged_on_start,
        })
    }

    /// Resolver using `position` if given, else the configured fixed position.
    /// Without either, position access counts as denied.
    pub fn resolver(&self, position: Option<Coordinates>) -> Result<CurrentLocationResolver> {
        let source: Arc<dyn CurrentPositionProvider> =
            match position.or(self.config.fixed_position()?) {
                Some(coordinates) => Arc::new(FixedPositionProvider::new(coordinates)),
                None => Arc::new(NoPositionProvider),
            };

        Ok(
            CurrentLocationResolver::new(source, self.geocoder.clone(), self.store.clone())
                .with_timeout(self.config.position_timeout()),
        )
    }
}
