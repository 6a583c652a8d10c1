//! Keyed store of the latest forecast snapshot per location.
//!
//! Entries are whole snapshots and writes are last-writer-wins. The store
//! never talks to the network and a missing entry is `Ok(None)`, not an error.

use async_trait::async_trait;
use std::fmt::Debug;
use tokio::sync::broadcast;

use crate::error::StoreError;
use crate::model::{ForecastSnapshot, LocationId};

pub mod file;
pub mod memory;

pub use file::FileWeatherCache;
pub use memory::MemoryWeatherCache;

const EVENT_CAPACITY: usize = 64;

/// Change notifications for subscribers that want to re-read the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    Updated(LocationId),
    Removed(LocationId),
    Purged(usize),
}

#[async_trait]
pub trait WeatherCache: Send + Sync + Debug {
    async fn get(&self, id: LocationId) -> Result<Option<ForecastSnapshot>, StoreError>;

    /// Unconditional overwrite.
    async fn put(&self, id: LocationId, snapshot: ForecastSnapshot) -> Result<(), StoreError>;

    /// Returns whether an entry existed.
    async fn delete(&self, id: LocationId) -> Result<bool, StoreError>;

    /// Drops every entry captured strictly before `threshold_ms` and returns
    /// how many were removed.
    async fn purge_older_than(&self, threshold_ms: i64) -> Result<usize, StoreError>;

    /// Drops every entry regardless of age and returns how many were removed.
    async fn clear(&self) -> Result<usize, StoreError>;

    fn subscribe(&self) -> broadcast::Receiver<CacheEvent>;
}

fn check_key(id: LocationId, snapshot: &ForecastSnapshot) -> Result<(), StoreError> {
    if snapshot.location_id == id {
        Ok(())
    } else {
        Err(StoreError::KeyMismatch {
            key: id,
            snapshot: snapshot.location_id,
        })
    }
}
