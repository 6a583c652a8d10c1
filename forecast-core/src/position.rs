//! Device position lookup.
//!
//! Providers answer `None` for every ordinary failure (no fix, sensor error,
//! cancelled request). [`locate`] turns that into a typed [`PositionError`]
//! after trying the live fix and then the last known position, each bounded
//! by a timeout.

use async_trait::async_trait;
use std::fmt::{self, Debug};
use std::time::Duration;

use crate::error::PositionError;
use crate::model::Coordinates;

/// Default bound on a single position request.
pub const DEFAULT_POSITION_TIMEOUT: Duration = Duration::from_secs(15);

#[async_trait]
pub trait CurrentPositionProvider: Send + Sync + Debug {
    async fn has_permission(&self) -> bool;

    /// A fresh fix. Implementations hold any sensor subscription in a
    /// [`SensorGuard`] so that dropping this future releases it.
    async fn current_position(&self) -> Option<Coordinates>;

    async fn last_known_position(&self) -> Option<Coordinates>;
}

/// Runs a release action when dropped, including when the owning future is
/// cancelled by a timeout.
pub struct SensorGuard<F: FnOnce()> {
    release: Option<F>,
}

impl<F: FnOnce()> SensorGuard<F> {
    pub fn new(release: F) -> Self {
        Self {
            release: Some(release),
        }
    }
}

impl<F: FnOnce()> Drop for SensorGuard<F> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl<F: FnOnce()> Debug for SensorGuard<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensorGuard")
            .field("armed", &self.release.is_some())
            .finish()
    }
}

/// Resolve the device position: live fix first, then the last known one.
///
/// The last known position is accepted regardless of its age.
pub async fn locate(
    provider: &dyn CurrentPositionProvider,
    timeout: Duration,
) -> Result<Coordinates, PositionError> {
    if !provider.has_permission().await {
        tracing::info!("Position permission not granted");
        return Err(PositionError::PermissionDenied);
    }

    match tokio::time::timeout(timeout, provider.current_position()).await {
        Ok(Some(coordinates)) => return Ok(coordinates),
        Ok(None) => tracing::debug!("No current position fix"),
        Err(_) => tracing::warn!(?timeout, "Current position request timed out"),
    }

    match tokio::time::timeout(timeout, provider.last_known_position()).await {
        Ok(Some(coordinates)) => {
            tracing::debug!("Using last known position");
            Ok(coordinates)
        }
        Ok(None) => Err(PositionError::PositionUnavailable),
        Err(_) => {
            tracing::warn!(?timeout, "Last known position request timed out");
            Err(PositionError::PositionUnavailable)
        }
    }
}

/// A position that never changes, e.g. from configuration or the command line.
#[derive(Debug, Clone, Copy)]
pub struct FixedPositionProvider {
    coordinates: Coordinates,
}

impl FixedPositionProvider {
    pub fn new(coordinates: Coordinates) -> Self {
        Self { coordinates }
    }
}

#[async_trait]
impl CurrentPositionProvider for FixedPositionProvider {
    async fn has_permission(&self) -> bool {
        true
    }

    async fn current_position(&self) -> Option<Coordinates> {
        Some(self.coordinates)
    }

    async fn last_known_position(&self) -> Option<Coordinates> {
        Some(self.coordinates)
    }
}

/// Used when no position source is configured or access was refused.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPositionProvider;

#[async_trait]
impl CurrentPositionProvider for NoPositionProvider {
    async fn has_permission(&self) -> bool {
        false
    }

    async fn current_position(&self) -> Option<Coordinates> {
        None
    }

    async fn last_known_position(&self) -> Option<Coordinates> {
        None
    }
}
