use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf, time::Duration};

use crate::model::Coordinates;

const MAX_PROVIDER_TIMEOUT_SECS: u64 = 120;

/// Cache freshness and retention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub freshness_minutes: u64,
    pub retention_hours: u64,

    /// Overrides the platform data directory for cached forecasts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness_minutes: 30,
            retention_hours: 24,
            dir: None,
        }
    }
}

/// Remote endpoints. None of them needs an API key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub forecast_url: String,
    pub geocoding_url: String,
    pub reverse_geocoding_url: String,
    pub timeout_secs: u64,
    pub forecast_days: u8,
    pub language: String,
    pub user_agent: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            forecast_url: "https://api.open-meteo.com/v1/forecast".into(),
            geocoding_url: "https://geocoding-api.open-meteo.com/v1/search".into(),
            reverse_geocoding_url: "https://nominatim.openstreetmap.org/reverse".into(),
            timeout_secs: 20,
            forecast_days: 7,
            language: "en".into(),
            user_agent: concat!("forecast-cli/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

/// Where the device is. Without fixed coordinates `locate` needs `--lat/--lon`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionConfig {
    pub timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            latitude: None,
            longitude: None,
        }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// [cache]
/// freshness_minutes = 30
///
/// [position]
/// latitude = 48.85
/// longitude = 2.35
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub provider: ProviderConfig,
    pub position: PositionConfig,
}

impl Config {
    /// Load config from disk, or return defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, use defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        cfg.validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "forecast", "forecast-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Directory holding the location list and the weather cache.
    pub fn data_dir() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.data_dir().to_path_buf())
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        match &self.cache.dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::data_dir()?.join("weather")),
        }
    }

    pub fn locations_file(&self) -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("locations.json"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.freshness_minutes == 0 {
            bail!("cache.freshness_minutes must be positive");
        }
        if self.freshness_window() > self.retention() {
            bail!(
                "cache.freshness_minutes ({}) exceeds cache.retention_hours ({})",
                self.cache.freshness_minutes,
                self.cache.retention_hours
            );
        }
        if !(1..=MAX_PROVIDER_TIMEOUT_SECS).contains(&self.provider.timeout_secs) {
            bail!(
                "provider.timeout_secs must be between 1 and {MAX_PROVIDER_TIMEOUT_SECS}, got {}",
                self.provider.timeout_secs
            );
        }
        if self.position.timeout_secs == 0 {
            bail!("position.timeout_secs must be positive");
        }
        self.fixed_position()?;
        Ok(())
    }

    pub fn freshness_window(&self) -> Duration {
        Duration::from_secs(self.cache.freshness_minutes.saturating_mul(60))
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.cache.retention_hours.saturating_mul(60 * 60))
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.timeout_secs)
    }

    pub fn position_timeout(&self) -> Duration {
        Duration::from_secs(self.position.timeout_secs)
    }

    /// Configured device position, if both coordinates are set.
    pub fn fixed_position(&self) -> Result<Option<Coordinates>> {
        match (self.position.latitude, self.position.longitude) {
            (Some(latitude), Some(longitude)) => {
                let coords = Coordinates::new(latitude, longitude)
                    .context("Invalid [position] coordinates")?;
                Ok(Some(coords))
            }
            (None, None) => Ok(None),
            _ => bail!("[position] needs both latitude and longitude"),
        }
    }

    pub fn set_fixed_position(&mut self, coordinates: Option<Coordinates>) {
        self.position.latitude = coordinates.map(|c| c.latitude);
        self.position.longitude = coordinates.map(|c| c.longitude);
    }
}
