use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{RwLock, broadcast};

use super::{CacheEvent, EVENT_CAPACITY, WeatherCache, check_key};
use crate::error::StoreError;
use crate::model::{ForecastSnapshot, LocationId};

/// Process-local cache; also the index behind [`super::FileWeatherCache`].
#[derive(Debug)]
pub struct MemoryWeatherCache {
    entries: RwLock<HashMap<LocationId, ForecastSnapshot>>,
    events: broadcast::Sender<CacheEvent>,
}

impl Default for MemoryWeatherCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWeatherCache {
    pub fn new() -> Self {
        Self::with_entries(HashMap::new())
    }

    pub(crate) fn with_entries(entries: HashMap<LocationId, ForecastSnapshot>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: RwLock::new(entries),
            events,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub(crate) async fn ids(&self) -> Vec<LocationId> {
        self.entries.read().await.keys().copied().collect()
    }

    pub(crate) async fn ids_older_than(&self, threshold_ms: i64) -> Vec<LocationId> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|(_, snapshot)| snapshot.captured_at_ms < threshold_ms)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Drops exactly `ids` and announces them as a single purge.
    pub(crate) async fn forget_purged(&self, ids: &[LocationId]) -> usize {
        let mut entries = self.entries.write().await;
        let purged = ids.iter().filter(|id| entries.remove(id).is_some()).count();
        drop(entries);

        if purged > 0 {
            self.notify(CacheEvent::Purged(purged));
        }
        purged
    }

    fn notify(&self, event: CacheEvent) {
        // an error only means nobody is listening
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl WeatherCache for MemoryWeatherCache {
    async fn get(&self, id: LocationId) -> Result<Option<ForecastSnapshot>, StoreError> {
        Ok(self.entries.read().await.get(&id).cloned())
    }

    async fn put(&self, id: LocationId, snapshot: ForecastSnapshot) -> Result<(), StoreError> {
        check_key(id, &snapshot)?;
        self.entries.write().await.insert(id, snapshot);
        self.notify(CacheEvent::Updated(id));
        Ok(())
    }

    async fn delete(&self, id: LocationId) -> Result<bool, StoreError> {
        let removed = self.entries.write().await.remove(&id).is_some();
        if removed {
            self.notify(CacheEvent::Removed(id));
        }
        Ok(removed)
    }

    async fn purge_older_than(&self, threshold_ms: i64) -> Result<usize, StoreError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, snapshot| snapshot.captured_at_ms >= threshold_ms);
        let purged = before - entries.len();
        drop(entries);

        if purged > 0 {
            tracing::debug!(purged, threshold_ms, "Purged expired weather snapshots");
            self.notify(CacheEvent::Purged(purged));
        }
        Ok(purged)
    }

    async fn clear(&self) -> Result<usize, StoreError> {
        let mut entries = self.entries.write().await;
        let cleared = entries.len();
        entries.clear();
        drop(entries);

        if cleared > 0 {
            self.notify(CacheEvent::Purged(cleared));
        }
        Ok(cleared)
    }

    fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::snapshot;

    #[tokio::test]
    async fn missing_entry_is_none() {
        let cache = MemoryWeatherCache::new();
        assert!(cache.get(LocationId(7)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_overwrites_whole_snapshot() {
        let cache = MemoryWeatherCache::new();
        cache.put(LocationId(1), snapshot(1, 10.0, 100)).await.unwrap();
        cache.put(LocationId(1), snapshot(1, 20.0, 50)).await.unwrap();

        let stored = cache.get(LocationId(1)).await.unwrap().unwrap();
        assert_eq!(stored.forecast.current.temperature, 20.0);
        assert_eq!(stored.captured_at_ms, 50);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn put_rejects_foreign_snapshot() {
        let cache = MemoryWeatherCache::new();
        let err = cache.put(LocationId(1), snapshot(2, 10.0, 0)).await.unwrap_err();
        assert!(matches!(err, StoreError::KeyMismatch { .. }));
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn purge_keeps_entries_at_threshold() {
        let cache = MemoryWeatherCache::new();
        cache.put(LocationId(1), snapshot(1, 1.0, 999)).await.unwrap();
        cache.put(LocationId(2), snapshot(2, 2.0, 1_000)).await.unwrap();
        cache.put(LocationId(3), snapshot(3, 3.0, 5_000)).await.unwrap();

        let purged = cache.purge_older_than(1_000).await.unwrap();

        assert_eq!(purged, 1);
        assert!(cache.get(LocationId(1)).await.unwrap().is_none());
        assert!(cache.get(LocationId(2)).await.unwrap().is_some());
        assert!(cache.get(LocationId(3)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn clear_ignores_age() {
        let cache = MemoryWeatherCache::new();
        let mut events = cache.subscribe();
        cache.put(LocationId(1), snapshot(1, 1.0, 0)).await.unwrap();
        cache.put(LocationId(2), snapshot(2, 2.0, i64::MAX)).await.unwrap();

        assert_eq!(cache.clear().await.unwrap(), 2);
        assert_eq!(cache.clear().await.unwrap(), 0);

        assert!(cache.is_empty().await);
        events.recv().await.unwrap();
        events.recv().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), CacheEvent::Purged(2));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let cache = MemoryWeatherCache::new();
        cache.put(LocationId(1), snapshot(1, 1.0, 0)).await.unwrap();
        assert!(cache.delete(LocationId(1)).await.unwrap());
        assert!(!cache.delete(LocationId(1)).await.unwrap());
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let cache = MemoryWeatherCache::new();
        let mut events = cache.subscribe();

        cache.put(LocationId(1), snapshot(1, 1.0, 0)).await.unwrap();
        cache.delete(LocationId(1)).await.unwrap();
        cache.put(LocationId(2), snapshot(2, 1.0, 0)).await.unwrap();
        cache.purge_older_than(10).await.unwrap();
        // nothing left to purge, so no event
        cache.purge_older_than(10).await.unwrap();

        assert_eq!(events.recv().await.unwrap(), CacheEvent::Updated(LocationId(1)));
        assert_eq!(events.recv().await.unwrap(), CacheEvent::Removed(LocationId(1)));
        assert_eq!(events.recv().await.unwrap(), CacheEvent::Updated(LocationId(2)));
        assert_eq!(events.recv().await.unwrap(), CacheEvent::Purged(1));
        assert!(events.try_recv().is_err());
    }
}
