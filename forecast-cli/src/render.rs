use std::fmt::Write;

use forecast_core::model::WeatherCondition;
use forecast_core::{FetchOutcome, Location, Origin};

const HOURS_SHOWN: usize = 6;

pub fn location_line(location: &Location) -> String {
    let id = location
        .id
        .map_or_else(|| "-".to_string(), |id| id.to_string());
    format!(
        "{id:>8}  {}  ({})",
        location.display_name(),
        location.coordinates()
    )
}

pub fn format_age(age_ms: i64) -> String {
    let minutes = age_ms.max(0) / 60_000;
    match minutes {
        0 => "just now".to_string(),
        1..=59 => format!("{minutes} min ago"),
        60..=1439 => format!("{} h ago", minutes / 60),
        _ => format!("{} d ago", minutes / 1440),
    }
}

fn compass(degrees: u16) -> &'static str {
    const POINTS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];
    POINTS[((u32::from(degrees) * 2 + 45) / 90 % 8) as usize]
}

/// Multi-line report for one snapshot, ending with a newline.
pub fn snapshot(location: &Location, outcome: &FetchOutcome, now_ms: i64) -> String {
    let snapshot = &outcome.snapshot;
    let current = &snapshot.forecast.current;
    let mut out = String::new();

    let _ = writeln!(out, "{}", location.display_name());
    let mut updated = format!("Updated {}", format_age(snapshot.age_ms(now_ms)));
    if outcome.origin == Origin::StaleFallback {
        updated.push_str(" (could not refresh)");
    }
    let _ = writeln!(out, "{updated}");
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "{:.1}°C  {}  feels like {:.1}°C",
        current.temperature,
        current.condition().description(),
        current.apparent_temperature
    );
    let _ = writeln!(
        out,
        "High {:.1}°C / Low {:.1}°C",
        current.daily_max, current.daily_min
    );
    let _ = writeln!(
        out,
        "Humidity {}%  Wind {:.0} km/h {}  Pressure {:.0} hPa  UV {:.1}",
        current.humidity,
        current.wind_speed,
        compass(current.wind_direction),
        current.pressure_msl,
        current.uv_index
    );

    if !snapshot.forecast.hourly.is_empty() {
        let _ = writeln!(out);
        for hour in snapshot.forecast.hourly.iter().take(HOURS_SHOWN) {
            let _ = writeln!(
                out,
                "{}  {:>5.1}°C  {}",
                hour.time.format("%H:%M"),
                hour.temperature,
                WeatherCondition::from_wmo_code(hour.weather_code).description()
            );
        }
    }

    if !snapshot.forecast.daily.is_empty() {
        let _ = writeln!(out);
        for day in &snapshot.forecast.daily {
            let rain = day
                .precipitation_probability
                .map(|p| format!(" ({p}%)"))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "{}  {:>5.1}° / {:>5.1}°  {:.1} mm{rain}  {}",
                day.date.format("%a %d %b"),
                day.max_temperature,
                day.min_temperature,
                day.precipitation_sum,
                day.condition().description()
            );
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use forecast_core::model::{CurrentConditions, DailyRecord, Forecast, ForecastSnapshot};
    use forecast_core::{Coordinates, LocationId};

    fn paris() -> Location {
        Location::new("Paris", Coordinates::new(48.85, 2.35).unwrap())
            .with_id(LocationId(7))
            .with_country("France")
    }

    fn outcome(captured_at_ms: i64, origin: Origin) -> FetchOutcome {
        let current = CurrentConditions {
            temperature: 15.0,
            apparent_temperature: 14.2,
            humidity: 60,
            weather_code: 61,
            wind_speed: 12.4,
            wind_direction: 270,
            precipitation: 0.4,
            pressure_msl: 1012.3,
            uv_index: 2.0,
            is_day: true,
            daily_max: 18.0,
            daily_min: 9.5,
        };
        let daily = vec![DailyRecord {
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            weather_code: 3,
            max_temperature: 18.0,
            min_temperature: 9.5,
            sunrise: None,
            sunset: None,
            uv_index_max: 4.0,
            precipitation_sum: 1.2,
            precipitation_probability: Some(40),
            wind_speed_max: 20.0,
        }];
        FetchOutcome {
            snapshot: ForecastSnapshot::new(
                LocationId(7),
                captured_at_ms,
                Forecast {
                    current,
                    hourly: Vec::new(),
                    daily,
                },
            ),
            origin,
        }
    }

    #[test]
    fn ages_are_humanized() {
        assert_eq!(format_age(-5_000), "just now");
        assert_eq!(format_age(59_999), "just now");
        assert_eq!(format_age(40 * 60_000), "40 min ago");
        assert_eq!(format_age(3 * 3_600_000), "3 h ago");
        assert_eq!(format_age(50 * 3_600_000), "2 d ago");
    }

    #[test]
    fn compass_points() {
        assert_eq!(compass(0), "N");
        assert_eq!(compass(44), "NE");
        assert_eq!(compass(270), "W");
        assert_eq!(compass(350), "N");
    }

    #[test]
    fn location_line_shows_id_and_name() {
        let line = location_line(&paris());
        assert!(line.trim_start().starts_with("7  Paris, France"));
    }

    #[test]
    fn fresh_snapshot_report() {
        let report = snapshot(&paris(), &outcome(0, Origin::Network), 0);

        assert!(report.starts_with("Paris, France\nUpdated just now\n"));
        assert!(report.contains("15.0°C  Rain  feels like 14.2°C"));
        assert!(report.contains("Wind 12 km/h W"));
        assert!(report.contains("1.2 mm (40%)  Overcast"));
        assert!(!report.contains("could not refresh"));
    }

    #[test]
    fn stale_snapshot_shows_age_without_error() {
        let report = snapshot(&paris(), &outcome(0, Origin::StaleFallback), 40 * 60_000);

        assert!(report.contains("Updated 40 min ago (could not refresh)"));
        assert!(!report.to_lowercase().contains("error"));
    }
}
