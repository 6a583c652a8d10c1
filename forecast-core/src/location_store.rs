//! Saved locations plus the single "current location" slot.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::model::{Coordinates, Location, LocationId};
use crate::persist::{read_json, write_json_atomic};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreFile {
    next_id: u64,
    locations: Vec<Location>,
}

#[derive(Debug, Clone, Default)]
struct State {
    // never reused, so a new current location can't inherit an old cache entry
    next_id: u64,
    locations: BTreeMap<LocationId, Location>,
}

impl State {
    fn allocate_id(&mut self) -> LocationId {
        let floor = self
            .locations
            .keys()
            .next_back()
            .map_or(1, |id| id.0.saturating_add(1));
        let id = self.next_id.max(floor).max(1);
        self.next_id = id.saturating_add(1);
        LocationId(id)
    }

    fn current_id(&self) -> Option<LocationId> {
        self.locations
            .values()
            .find(|l| l.is_current)
            .and_then(|l| l.id)
    }

    fn to_file(&self) -> StoreFile {
        StoreFile {
            next_id: self.next_id,
            locations: self.locations.values().cloned().collect(),
        }
    }

    fn from_file(file: StoreFile) -> Self {
        let mut state = State {
            next_id: file.next_id,
            locations: BTreeMap::new(),
        };
        for location in file.locations {
            if let Some(id) = location.id {
                state.locations.insert(id, location);
            }
        }
        state
    }
}

/// Persistent list of locations.
///
/// All mutations are applied to a copy, written to disk and only then made
/// visible, so a failed write leaves the store unchanged.
#[derive(Debug)]
pub struct LocationStore {
    path: Option<PathBuf>,
    state: Mutex<State>,
}

impl LocationStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(State::default()),
        }
    }

    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = read_json::<StoreFile>(&path)
            .await?
            .map(State::from_file)
            .unwrap_or_default();

        tracing::debug!(path = %path.display(), locations = state.locations.len(), "Opened location store");
        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn commit(&self, guard: &mut State, next: State) -> Result<(), StoreError> {
        if let Some(path) = &self.path {
            write_json_atomic(path, &next.to_file()).await?;
        }
        *guard = next;
        Ok(())
    }

    /// Store `location` as a saved (non-current) location and return it with
    /// its identifier. A location that already carries an id keeps it, unless
    /// that id belongs to the current-location slot.
    pub async fn save(&self, location: Location) -> Result<Location, StoreError> {
        let mut guard = self.state.lock().await;
        let mut next = guard.clone();

        let id = match location.id {
            Some(id) if id.0 != 0 && next.current_id() != Some(id) => id,
            _ => next.allocate_id(),
        };
        let saved = Location {
            id: Some(id),
            is_current: false,
            ..location
        };
        next.locations.insert(id, saved.clone());
        next.next_id = next.next_id.max(id.0.saturating_add(1));

        self.commit(&mut guard, next).await?;
        tracing::debug!(%id, name = %saved.name, "Saved location");
        Ok(saved)
    }

    /// Returns whether a location was removed.
    pub async fn delete(&self, id: LocationId) -> Result<bool, StoreError> {
        let mut guard = self.state.lock().await;
        if !guard.locations.contains_key(&id) {
            return Ok(false);
        }

        let mut next = guard.clone();
        next.locations.remove(&id);
        self.commit(&mut guard, next).await?;
        Ok(true)
    }

    pub async fn get(&self, id: LocationId) -> Option<Location> {
        self.state.lock().await.locations.get(&id).cloned()
    }

    /// Saved locations ordered by name; the current location is not included.
    pub async fn list_saved(&self) -> Vec<Location> {
        let mut saved: Vec<Location> = self
            .state
            .lock()
            .await
            .locations
            .values()
            .filter(|l| !l.is_current)
            .cloned()
            .collect();
        saved.sort_by(|a, b| a.name.cmp(&b.name));
        saved
    }

    /// Whether a saved location sits at exactly these coordinates.
    pub async fn is_saved(&self, coordinates: Coordinates) -> bool {
        self.state
            .lock()
            .await
            .locations
            .values()
            .any(|l| !l.is_current && l.coordinates() == coordinates)
    }

    pub async fn current(&self) -> Option<Location> {
        self.state
            .lock()
            .await
            .locations
            .values()
            .find(|l| l.is_current)
            .cloned()
    }

    /// Replace the current-location slot in one step. Returns the stored
    /// location, which always gets a fresh identifier, and the identifier of
    /// the location it displaced.
    pub async fn replace_current(
        &self,
        location: Location,
    ) -> Result<(Location, Option<LocationId>), StoreError> {
        let mut guard = self.state.lock().await;
        let mut next = guard.clone();

        let previous = next.current_id();
        next.locations.retain(|_, l| !l.is_current);
        let id = next.allocate_id();
        let current = Location {
            id: Some(id),
            is_current: true,
            ..location
        };
        next.locations.insert(id, current.clone());

        self.commit(&mut guard, next).await?;
        tracing::debug!(%id, name = %current.name, "Replaced current location");
        Ok((current, previous))
    }
}
