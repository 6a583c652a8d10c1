use anyhow::{Context, anyhow, bail};
use clap::{Parser, Subcommand};
use inquire::{Confirm, CustomType, Select, Text};
use std::fmt;

use forecast_core::resolver::ResolveError;
use forecast_core::{Clock, Config, Coordinates, Geocoder, Location, LocationId, SystemClock};

use crate::app::App;
use crate::render;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "forecast", version, about = "Weather for your places, with an offline cache")]
pub struct Cli {
    /// Write debug logs to stderr (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Search places by name.
    Search {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },

    /// Search a place and save it.
    Add {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },

    /// List the current location and saved places.
    List,

    /// Remove a saved place and its cached weather.
    Remove { id: u64 },

    /// Set the current location from the given or configured position.
    Locate {
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,

        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
    },

    /// Show weather for a saved place, a searched place, or the current location.
    Show {
        /// Saved place id, see `forecast list`.
        #[arg(conflicts_with = "search")]
        id: Option<u64>,

        /// Look a place up by name instead; it does not need to be saved.
        #[arg(long, value_name = "QUERY")]
        search: Option<String>,

        /// Ignore the cache and ask the weather service.
        #[arg(long)]
        refresh: bool,
    },

    /// Remove cached weather older than the retention horizon.
    Purge {
        /// Remove all cached weather, whatever its age.
        #[arg(long)]
        all: bool,
    },

    /// Interactively edit the configuration.
    Configure,
}

/// Search result as shown in the selection prompt.
struct Choice(Location);

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0.display_name(), self.0.coordinates())
    }
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        if let Command::Configure = self.command {
            return configure();
        }

        let config = Config::load()?;
        let app = App::open(config).await?;

        match self.command {
            Command::Search { query } => search(&app, &query.join(" ")).await,
            Command::Add { query } => add(&app, &query.join(" ")).await,
            Command::List => list(&app).await,
            Command::Remove { id } => remove(&app, LocationId(id)).await,
            Command::Locate { lat, lon } => {
                let position = match (lat, lon) {
                    (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)?),
                    _ => None,
                };
                locate(&app, position).await
            }
            Command::Show {
                search: Some(query),
                refresh,
                ..
            } => show_search(&app, &query, refresh).await,
            Command::Show { id, refresh, .. } => show(&app, id.map(LocationId), refresh).await,
            Command::Purge { all: false } => {
                println!("Removed {} expired forecast(s).", app.purged_on_start);
                Ok(())
            }
            Command::Purge { all: true } => {
                let cleared = app.orchestrator.clear_cache().await?;
                println!("Removed {} cached forecast(s).", cleared + app.purged_on_start);
                Ok(())
            }
            Command::Configure => Ok(()),
        }
    }
}

async fn search(app: &App, query: &str) -> anyhow::Result<()> {
    let results = app.geocoder.search(query).await?;
    if results.is_empty() {
        println!("No places match '{query}'.");
    }
    for location in &results {
        println!("{}", render::location_line(location));
    }
    Ok(())
}

/// Search `query` and let the user pick one result, asking only when there
/// is more than one.
async fn choose_place(app: &App, query: &str) -> anyhow::Result<Location> {
    let mut results = app.geocoder.search(query).await?;

    match results.len() {
        0 => bail!("No places match '{query}'."),
        1 => Ok(results.remove(0)),
        _ => {
            let choices = results.into_iter().map(Choice).collect();
            let choice = Select::new("Which place?", choices)
                .prompt()
                .context("Selection cancelled")?;
            Ok(choice.0)
        }
    }
}

async fn add(app: &App, query: &str) -> anyhow::Result<()> {
    let location = choose_place(app, query).await?;

    if app.store.is_saved(location.coordinates()).await {
        println!("{} is already saved.", location.display_name());
        return Ok(());
    }

    let saved = app.store.save(location).await?;
    println!("Saved {}", render::location_line(&saved));
    Ok(())
}

async fn list(app: &App) -> anyhow::Result<()> {
    let current = app.store.current().await;
    let saved = app.store.list_saved().await;

    if current.is_none() && saved.is_empty() {
        println!("No places yet. Try `forecast add <name>` or `forecast locate`.");
        return Ok(());
    }

    if let Some(current) = &current {
        println!("* {}", render::location_line(current));
    }
    for location in &saved {
        println!("  {}", render::location_line(location));
    }
    Ok(())
}

async fn remove(app: &App, id: LocationId) -> anyhow::Result<()> {
    if !app.store.delete(id).await? {
        bail!("No place with id {id}.");
    }
    app.orchestrator.forget_location(id).await?;
    println!("Removed place {id}.");
    Ok(())
}

async fn locate(app: &App, position: Option<Coordinates>) -> anyhow::Result<()> {
    let update = match app.resolver(position)?.update_current_location().await {
        Ok(update) => update,
        Err(ResolveError::Position(e)) => bail!(
            "{} Pass --lat/--lon or set a position with `forecast configure`.",
            e.user_message()
        ),
        Err(e) => return Err(e.into()),
    };

    if let Some(old) = update.replaced {
        app.orchestrator.forget_location(old).await?;
    }

    println!("Current location: {}", render::location_line(&update.location));
    Ok(())
}

async fn show(app: &App, id: Option<LocationId>, refresh: bool) -> anyhow::Result<()> {
    let location = match id {
        Some(id) => app
            .store
            .get(id)
            .await
            .ok_or_else(|| anyhow!("No place with id {id}. See `forecast list`."))?,
        None => app
            .store
            .current()
            .await
            .ok_or_else(|| anyhow!("No current location. Run `forecast locate` first."))?,
    };

    print_weather(app, &location, refresh).await
}

/// Weather for a search result. The result keeps the geocoding service's id,
/// so its forecast is cached like a saved place's without saving it.
async fn show_search(app: &App, query: &str, refresh: bool) -> anyhow::Result<()> {
    let location = choose_place(app, query).await?;
    print_weather(app, &location, refresh).await?;

    if !app.store.is_saved(location.coordinates()).await {
        println!();
        println!("Not saved. Keep it with `forecast add {}`.", location.name);
    }
    Ok(())
}

async fn print_weather(app: &App, location: &Location, refresh: bool) -> anyhow::Result<()> {
    match app.orchestrator.fetch_weather_traced(location, refresh).await {
        Ok(outcome) => {
            print!("{}", render::snapshot(location, &outcome, SystemClock.now_ms()));
            Ok(())
        }
        Err(e) => {
            tracing::debug!("Fetch failed: {e}");
            bail!(e.user_message())
        }
    }
}

fn configure() -> anyhow::Result<()> {
    let mut config = Config::load()?;

    config.cache.freshness_minutes = CustomType::<u64>::new("Serve cached weather for (minutes):")
        .with_default(config.cache.freshness_minutes)
        .prompt()?;

    config.cache.retention_hours = CustomType::<u64>::new("Keep cached weather for (hours):")
        .with_default(config.cache.retention_hours)
        .prompt()?;

    config.provider.language = Text::new("Language for place names:")
        .with_default(&config.provider.language)
        .prompt()?;

    let fixed = config.fixed_position()?;
    let use_fixed = Confirm::new("Use a fixed position for `forecast locate`?")
        .with_default(fixed.is_some())
        .prompt()?;

    let position = if use_fixed {
        let latitude = CustomType::<f64>::new("Latitude:")
            .with_default(fixed.map_or(0.0, |c| c.latitude))
            .prompt()?;
        let longitude = CustomType::<f64>::new("Longitude:")
            .with_default(fixed.map_or(0.0, |c| c.longitude))
            .prompt()?;
        Some(Coordinates::new(latitude, longitude)?)
    } else {
        None
    };
    config.set_fixed_position(position);

    config.save()?;
    println!("Configuration saved to {}", Config::config_file_path()?.display());
    Ok(())
}
