use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::error::{PositionError, StoreError};
use crate::geocode::Geocoder;
use crate::location_store::LocationStore;
use crate::model::{Location, LocationId};
use crate::position::{CurrentPositionProvider, DEFAULT_POSITION_TIMEOUT, locate};

/// Name given to the current location when reverse geocoding fails.
pub const DEFAULT_CURRENT_NAME: &str = "Current location";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Position(#[from] PositionError),

    #[error("failed to store current location: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurrentLocationUpdate {
    pub location: Location,
    /// Identifier of the current location this update displaced, whose cached
    /// weather no longer describes where the user is.
    pub replaced: Option<LocationId>,
}

/// Turns a device position into the stored current location.
#[derive(Debug, Clone)]
pub struct CurrentLocationResolver {
    position: Arc<dyn CurrentPositionProvider>,
    geocoder: Arc<dyn Geocoder>,
    store: Arc<LocationStore>,
    timeout: Duration,
}

impl CurrentLocationResolver {
    pub fn new(
        position: Arc<dyn CurrentPositionProvider>,
        geocoder: Arc<dyn Geocoder>,
        store: Arc<LocationStore>,
    ) -> Self {
        Self {
            position,
            geocoder,
            store,
            timeout: DEFAULT_POSITION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn update_current_location(&self) -> Result<CurrentLocationUpdate, ResolveError> {
        let coordinates = locate(self.position.as_ref(), self.timeout).await?;

        let mut location = match self.geocoder.reverse(coordinates).await {
            Some(place) => {
                let mut location = Location::new(place.name, coordinates);
                location.region = place.region;
                location.country = place.country;
                location
            }
            None => Location::new(DEFAULT_CURRENT_NAME, coordinates),
        };
        location.is_current = true;

        let (location, replaced) = self.store.replace_current(location).await?;
        tracing::info!(
            name = %location.name,
            %coordinates,
            "Current location updated"
        );

        Ok(CurrentLocationUpdate { location, replaced })
    }
}
