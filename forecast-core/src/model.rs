use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::InvalidCoordinates;

/// Upper bound on hourly records kept in a snapshot.
pub const MAX_HOURLY_RECORDS: usize = 24;

/// Stable identifier of a persisted location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationId(pub u64);

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Build a coordinate pair, rejecting out-of-range or non-finite values.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, InvalidCoordinates> {
        let coordinates = Self { latitude, longitude };
        if coordinates.is_valid() {
            Ok(coordinates)
        } else {
            Err(InvalidCoordinates { latitude, longitude })
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// A place the user follows: a saved favourite, the current position, or an
/// unsaved search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// `None` until the location has been persisted.
    pub id: Option<LocationId>,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub region: Option<String>,
    pub country: Option<String>,
    #[serde(default)]
    pub is_current: bool,
}

impl Location {
    pub fn new(name: impl Into<String>, coordinates: Coordinates) -> Self {
        Self {
            id: None,
            name: name.into(),
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
            region: None,
            country: None,
            is_current: false,
        }
    }

    pub fn with_id(mut self, id: LocationId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    /// `name[, region][, country]`
    pub fn display_name(&self) -> String {
        let mut out = self.name.clone();
        for part in [&self.region, &self.country].into_iter().flatten() {
            out.push_str(", ");
            out.push_str(part);
        }
        out
    }
}

/// Weather categories decoded from WMO weather interpretation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    Clear,
    MainlyClear,
    PartlyCloudy,
    Overcast,
    Fog,
    Drizzle,
    FreezingDrizzle,
    Rain,
    FreezingRain,
    Snow,
    SnowGrains,
    RainShowers,
    SnowShowers,
    Thunderstorm,
    ThunderstormWithHail,
    Unknown,
}

impl WeatherCondition {
    /// See <https://open-meteo.com/en/docs#weathervariables>
    pub fn from_wmo_code(code: u16) -> Self {
        match code {
            0 => Self::Clear,
            1 => Self::MainlyClear,
            2 => Self::PartlyCloudy,
            3 => Self::Overcast,
            45 | 48 => Self::Fog,
            51 | 53 | 55 => Self::Drizzle,
            56 | 57 => Self::FreezingDrizzle,
            61 | 63 | 65 => Self::Rain,
            66 | 67 => Self::FreezingRain,
            71 | 73 | 75 => Self::Snow,
            77 => Self::SnowGrains,
            80..=82 => Self::RainShowers,
            85 | 86 => Self::SnowShowers,
            95 => Self::Thunderstorm,
            96 | 99 => Self::ThunderstormWithHail,
            _ => Self::Unknown,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Clear => "Clear sky",
            Self::MainlyClear => "Mainly clear",
            Self::PartlyCloudy => "Partly cloudy",
            Self::Overcast => "Overcast",
            Self::Fog => "Fog",
            Self::Drizzle => "Drizzle",
            Self::FreezingDrizzle => "Freezing drizzle",
            Self::Rain => "Rain",
            Self::FreezingRain => "Freezing rain",
            Self::Snow => "Snow",
            Self::SnowGrains => "Snow grains",
            Self::RainShowers => "Rain showers",
            Self::SnowShowers => "Snow showers",
            Self::Thunderstorm => "Thunderstorm",
            Self::ThunderstormWithHail => "Thunderstorm with hail",
            Self::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub temperature: f64,
    pub apparent_temperature: f64,
    pub humidity: u8,
    pub weather_code: u16,
    pub wind_speed: f64,
    pub wind_direction: u16,
    pub precipitation: f64,
    pub pressure_msl: f64,
    pub uv_index: f64,
    pub is_day: bool,
    pub daily_max: f64,
    pub daily_min: f64,
}

impl CurrentConditions {
    pub fn condition(&self) -> WeatherCondition {
        WeatherCondition::from_wmo_code(self.weather_code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyRecord {
    /// Wall-clock time at the location.
    pub time: NaiveDateTime,
    pub temperature: f64,
    pub apparent_temperature: f64,
    pub humidity: u8,
    pub precipitation: f64,
    pub weather_code: u16,
    pub wind_speed: f64,
    pub is_day: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub weather_code: u16,
    pub max_temperature: f64,
    pub min_temperature: f64,
    pub sunrise: Option<NaiveDateTime>,
    pub sunset: Option<NaiveDateTime>,
    pub uv_index_max: f64,
    pub precipitation_sum: f64,
    pub precipitation_probability: Option<u8>,
    pub wind_speed_max: f64,
}

impl DailyRecord {
    pub fn condition(&self) -> WeatherCondition {
        WeatherCondition::from_wmo_code(self.weather_code)
    }
}

/// What a provider returns for one set of coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub current: CurrentConditions,
    pub hourly: Vec<HourlyRecord>,
    pub daily: Vec<DailyRecord>,
}

/// One complete forecast captured for a location at a point in time.
///
/// Snapshots are replaced whole; there is no partial update of the hourly or
/// daily sequences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSnapshot {
    pub location_id: LocationId,
    /// Epoch milliseconds.
    pub captured_at_ms: i64,
    pub forecast: Forecast,
}

impl ForecastSnapshot {
    pub fn new(location_id: LocationId, captured_at_ms: i64, mut forecast: Forecast) -> Self {
        forecast.hourly.truncate(MAX_HOURLY_RECORDS);
        Self {
            location_id,
            captured_at_ms,
            forecast,
        }
    }

    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.captured_at_ms)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_reject_out_of_range() {
        assert!(Coordinates::new(48.85, 2.35).is_ok());
        assert!(Coordinates::new(-90.0, 180.0).is_ok());
        assert!(Coordinates::new(90.5, 0.0).is_err());
        assert!(Coordinates::new(0.0, -180.1).is_err());
        assert!(Coordinates::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn display_name_skips_missing_parts() {
        let coords = Coordinates::new(48.85, 2.35).unwrap();
        let bare = Location::new("Paris", coords);
        assert_eq!(bare.display_name(), "Paris");

        let full = Location::new("Paris", coords)
            .with_region("Île-de-France")
            .with_country("France");
        assert_eq!(full.display_name(), "Paris, Île-de-France, France");

        let country_only = Location::new("Paris", coords).with_country("France");
        assert_eq!(country_only.display_name(), "Paris, France");
    }

    #[test]
    fn wmo_codes_decode() {
        assert_eq!(WeatherCondition::from_wmo_code(0), WeatherCondition::Clear);
        assert_eq!(WeatherCondition::from_wmo_code(2), WeatherCondition::PartlyCloudy);
        assert_eq!(WeatherCondition::from_wmo_code(48), WeatherCondition::Fog);
        assert_eq!(WeatherCondition::from_wmo_code(57), WeatherCondition::FreezingDrizzle);
        assert_eq!(WeatherCondition::from_wmo_code(81), WeatherCondition::RainShowers);
        assert_eq!(WeatherCondition::from_wmo_code(99), WeatherCondition::ThunderstormWithHail);
        assert_eq!(WeatherCondition::from_wmo_code(42), WeatherCondition::Unknown);
        assert_eq!(WeatherCondition::Overcast.description(), "Overcast");
    }

    #[test]
    fn snapshot_keeps_at_most_24_hours() {
        let hour = HourlyRecord {
            time: NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            temperature: 10.0,
            apparent_temperature: 9.0,
            humidity: 70,
            precipitation: 0.0,
            weather_code: 3,
            wind_speed: 4.0,
            is_day: false,
        };
        let mut forecast = fixtures::forecast(10.0);
        forecast.hourly = vec![hour; 30];

        let snapshot = ForecastSnapshot::new(LocationId(1), 0, forecast);
        assert_eq!(snapshot.forecast.hourly.len(), MAX_HOURLY_RECORDS);
    }

    #[test]
    fn snapshot_age_is_relative_to_now() {
        let snapshot = fixtures::snapshot(1, 10.0, 1_000);
        assert_eq!(snapshot.age_ms(61_000), 60_000);
    }
}
