use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta};
use reqwest::{Client, Url};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    clock::{Clock, SystemClock},
    error::ProviderError,
    model::{CurrentConditions, DailyRecord, Forecast, HourlyRecord, MAX_HOURLY_RECORDS},
    provider::truncate_body,
};

use super::WeatherProvider;

const CURRENT_FIELDS: &str = "temperature_2m,relative_humidity_2m,apparent_temperature,is_day,\
precipitation,weather_code,pressure_msl,wind_speed_10m,wind_direction_10m,uv_index";

const HOURLY_FIELDS: &str = "temperature_2m,relative_humidity_2m,apparent_temperature,\
precipitation,weather_code,wind_speed_10m,is_day";

const DAILY_FIELDS: &str = "weather_code,temperature_2m_max,temperature_2m_min,sunrise,sunset,\
uv_index_max,precipitation_sum,precipitation_probability_max,wind_speed_10m_max";

pub const DEFAULT_FORECAST_DAYS: u8 = 7;

/// Hours that ended more than this long ago are dropped from the hourly list.
const HOURLY_LOOKBACK_HOURS: i64 = 1;

/// Client for the Open-Meteo forecast endpoint (no API key required).
#[derive(Debug, Clone)]
pub struct OpenMeteoProvider {
    base_url: Url,
    forecast_days: u8,
    http: Client,
    clock: Arc<dyn Clock>,
}

impl OpenMeteoProvider {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("Invalid forecast URL '{base_url}'"))?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for Open-Meteo")?;

        Ok(Self {
            base_url,
            forecast_days: DEFAULT_FORECAST_DAYS,
            http,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_forecast_days(mut self, days: u8) -> Self {
        self.forecast_days = days.clamp(1, 16);
        self
    }

    /// Clock used to decide which hourly entries are already in the past.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl WeatherProvider for OpenMeteoProvider {
    async fn fetch(&self, latitude: f64, longitude: f64) -> Result<Forecast, ProviderError> {
        let res = self
            .http
            .get(self.base_url.clone())
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("current", CURRENT_FIELDS.to_string()),
                ("hourly", HOURLY_FIELDS.to_string()),
                ("daily", DAILY_FIELDS.to_string()),
                ("timezone", "auto".to_string()),
                ("forecast_days", self.forecast_days.to_string()),
            ])
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let parsed: OmResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::Parse(e.to_string()))?;

        let forecast = into_forecast(parsed, self.clock.now_ms())?;
        tracing::debug!(
            latitude,
            longitude,
            hourly = forecast.hourly.len(),
            daily = forecast.daily.len(),
            "Fetched Open-Meteo forecast"
        );
        Ok(forecast)
    }
}

#[derive(Debug, Deserialize)]
struct OmResponse {
    #[serde(default)]
    utc_offset_seconds: i64,
    current: Option<OmCurrent>,
    hourly: Option<OmHourly>,
    daily: Option<OmDaily>,
}

#[derive(Debug, Deserialize)]
struct OmCurrent {
    temperature_2m: f64,
    relative_humidity_2m: f64,
    apparent_temperature: f64,
    is_day: u8,
    precipitation: f64,
    weather_code: u16,
    pressure_msl: f64,
    wind_speed_10m: f64,
    wind_direction_10m: f64,
    uv_index: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OmHourly {
    time: Vec<String>,
    temperature_2m: Vec<Option<f64>>,
    relative_humidity_2m: Vec<Option<f64>>,
    apparent_temperature: Vec<Option<f64>>,
    precipitation: Vec<Option<f64>>,
    weather_code: Vec<Option<u16>>,
    wind_speed_10m: Vec<Option<f64>>,
    is_day: Vec<Option<u8>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OmDaily {
    time: Vec<String>,
    weather_code: Vec<Option<u16>>,
    temperature_2m_max: Vec<Option<f64>>,
    temperature_2m_min: Vec<Option<f64>>,
    sunrise: Vec<Option<String>>,
    sunset: Vec<Option<String>>,
    uv_index_max: Vec<Option<f64>>,
    precipitation_sum: Vec<Option<f64>>,
    precipitation_probability_max: Vec<Option<f64>>,
    wind_speed_10m_max: Vec<Option<f64>>,
}

fn into_forecast(response: OmResponse, now_ms: i64) -> Result<Forecast, ProviderError> {
    let current = response.current.ok_or(ProviderError::MissingCurrent)?;
    let local_now = local_time(now_ms, response.utc_offset_seconds)?;

    let hourly = response
        .hourly
        .map(|h| map_hourly(&h, local_now))
        .unwrap_or_default();
    let daily = response.daily.map(|d| map_daily(&d)).unwrap_or_default();

    let daily_max = daily
        .first()
        .map(|d| d.max_temperature)
        .unwrap_or(current.temperature_2m);
    let daily_min = daily
        .first()
        .map(|d| d.min_temperature)
        .unwrap_or(current.temperature_2m);

    Ok(Forecast {
        current: CurrentConditions {
            temperature: current.temperature_2m,
            apparent_temperature: current.apparent_temperature,
            humidity: percent(current.relative_humidity_2m),
            weather_code: current.weather_code,
            wind_speed: current.wind_speed_10m,
            wind_direction: current.wind_direction_10m.round().rem_euclid(360.0) as u16,
            precipitation: current.precipitation,
            pressure_msl: current.pressure_msl,
            uv_index: current.uv_index.unwrap_or(0.0),
            is_day: current.is_day == 1,
            daily_max,
            daily_min,
        },
        hourly,
        daily,
    })
}

fn map_hourly(hourly: &OmHourly, local_now: NaiveDateTime) -> Vec<HourlyRecord> {
    let earliest = local_now
        .checked_sub_signed(TimeDelta::hours(HOURLY_LOOKBACK_HOURS))
        .unwrap_or(local_now);

    hourly
        .time
        .iter()
        .enumerate()
        .filter_map(|(i, raw)| {
            let time = parse_local_time(raw)?;
            (time >= earliest).then(|| HourlyRecord {
                time,
                temperature: cell(&hourly.temperature_2m, i),
                apparent_temperature: cell(&hourly.apparent_temperature, i),
                humidity: percent(cell(&hourly.relative_humidity_2m, i)),
                precipitation: cell(&hourly.precipitation, i),
                weather_code: cell(&hourly.weather_code, i),
                wind_speed: cell(&hourly.wind_speed_10m, i),
                is_day: cell(&hourly.is_day, i) == 1,
            })
        })
        .take(MAX_HOURLY_RECORDS)
        .collect()
}

fn map_daily(daily: &OmDaily) -> Vec<DailyRecord> {
    daily
        .time
        .iter()
        .enumerate()
        .filter_map(|(i, raw)| {
            let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
            let moment = |values: &[Option<String>]| {
                values
                    .get(i)
                    .and_then(|v| v.as_deref())
                    .and_then(parse_local_time)
            };

            Some(DailyRecord {
                date,
                weather_code: cell(&daily.weather_code, i),
                max_temperature: cell(&daily.temperature_2m_max, i),
                min_temperature: cell(&daily.temperature_2m_min, i),
                sunrise: moment(&daily.sunrise),
                sunset: moment(&daily.sunset),
                uv_index_max: cell(&daily.uv_index_max, i),
                precipitation_sum: cell(&daily.precipitation_sum, i),
                precipitation_probability: daily
                    .precipitation_probability_max
                    .get(i)
                    .copied()
                    .flatten()
                    .map(percent),
                wind_speed_max: cell(&daily.wind_speed_10m_max, i),
            })
        })
        .collect()
}

/// Parallel arrays may be shorter than `time` or contain nulls.
fn cell<T: Copy + Default>(values: &[Option<T>], i: usize) -> T {
    values.get(i).copied().flatten().unwrap_or_default()
}

fn percent(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}

fn local_time(now_ms: i64, utc_offset_seconds: i64) -> Result<NaiveDateTime, ProviderError> {
    let now = DateTime::from_timestamp_millis(now_ms).unwrap_or_default();
    TimeDelta::try_seconds(utc_offset_seconds)
        .and_then(|offset| now.checked_add_signed(offset))
        .map(|local| local.naive_utc())
        .ok_or_else(|| {
            ProviderError::Parse(format!("utc_offset_seconds out of range: {utc_offset_seconds}"))
        })
}

fn parse_local_time(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}
