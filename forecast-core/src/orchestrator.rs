//! Single entry point for callers that want weather for a location.
//!
//! Per call: read the cache, ask the [`FreshnessPolicy`], and either serve the
//! cached snapshot or make exactly one provider request. A successful fetch is
//! written through to the cache; a failed one falls back to whatever is cached,
//! however old. Only when nothing is cached does the caller see an error.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::WeatherCache;
use crate::clock::{Clock, SystemClock};
use crate::error::{FetchError, ProviderError, StoreError};
use crate::freshness::{Decision, FreshnessPolicy, RETENTION_HORIZON, retention_threshold};
use crate::model::{ForecastSnapshot, Location, LocationId};
use crate::provider::WeatherProvider;

/// Default bound on a single provider call.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Where a returned snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Cached and within the freshness window.
    Cache,
    /// Fetched by this call.
    Network,
    /// The fetch failed and an expired (or not yet expired) cached snapshot
    /// was returned instead.
    StaleFallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub snapshot: ForecastSnapshot,
    pub origin: Origin,
}

#[derive(Debug, Clone)]
pub struct WeatherOrchestrator {
    cache: Arc<dyn WeatherCache>,
    provider: Arc<dyn WeatherProvider>,
    clock: Arc<dyn Clock>,
    policy: FreshnessPolicy,
    retention: Duration,
    fetch_timeout: Duration,
}

impl WeatherOrchestrator {
    pub fn new(cache: Arc<dyn WeatherCache>, provider: Arc<dyn WeatherProvider>) -> Self {
        Self {
            cache,
            provider,
            clock: Arc::new(SystemClock),
            policy: FreshnessPolicy::default(),
            retention: RETENTION_HORIZON,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: FreshnessPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn cache(&self) -> &Arc<dyn WeatherCache> {
        &self.cache
    }

    pub fn policy(&self) -> FreshnessPolicy {
        self.policy
    }

    /// Weather for `location`, fresh or stale. Use the snapshot's
    /// `captured_at_ms` to tell how old it is.
    pub async fn fetch_weather(
        &self,
        location: &Location,
        force_refresh: bool,
    ) -> Result<ForecastSnapshot, FetchError> {
        self.fetch_weather_traced(location, force_refresh)
            .await
            .map(|outcome| outcome.snapshot)
    }

    /// Like [`Self::fetch_weather`], also reporting where the snapshot came from.
    pub async fn fetch_weather_traced(
        &self,
        location: &Location,
        force_refresh: bool,
    ) -> Result<FetchOutcome, FetchError> {
        // zero is the placeholder id of a location that was never stored
        let id = location
            .id
            .filter(|id| id.0 != 0)
            .ok_or_else(|| FetchError::UnsavedLocation(location.name.clone()))?;

        let cached = self.read_cache(id).await;
        let now = self.clock.now_ms();

        if let (Decision::ServeCache, Some(snapshot)) =
            (self.policy.decide(cached.as_ref(), now, force_refresh), cached)
        {
            tracing::debug!(%id, age_ms = snapshot.age_ms(now), "Serving cached weather");
            return Ok(FetchOutcome {
                snapshot,
                origin: Origin::Cache,
            });
        }

        tracing::debug!(%id, force_refresh, "Fetching weather from provider");
        match self.call_provider(location).await {
            Ok(forecast) => {
                let snapshot = ForecastSnapshot::new(id, self.clock.now_ms(), forecast);
                if let Err(e) = self.cache.put(id, snapshot.clone()).await {
                    tracing::warn!(%id, "Failed to cache fetched weather: {e}");
                }
                tracing::info!(%id, name = %location.name, "Weather refreshed");
                Ok(FetchOutcome {
                    snapshot,
                    origin: Origin::Network,
                })
            }
            Err(source) => {
                tracing::warn!(%id, "Weather fetch failed: {source}");
                // re-read: a concurrent call may have stored something meanwhile
                match self.read_cache(id).await {
                    Some(snapshot) => {
                        tracing::info!(
                            %id,
                            age_ms = snapshot.age_ms(self.clock.now_ms()),
                            "Falling back to cached weather"
                        );
                        Ok(FetchOutcome {
                            snapshot,
                            origin: Origin::StaleFallback,
                        })
                    }
                    None => {
                        tracing::warn!(%id, "No cached weather to fall back to");
                        Err(FetchError::NoDataAvailable {
                            location_id: id,
                            source,
                        })
                    }
                }
            }
        }
    }

    /// Retention sweep: drop snapshots older than the retention horizon.
    pub async fn purge_expired(&self) -> Result<usize, StoreError> {
        let threshold = retention_threshold(self.clock.now_ms(), self.retention);
        let purged = self.cache.purge_older_than(threshold).await?;
        if purged > 0 {
            tracing::info!(purged, "Removed expired weather snapshots");
        }
        Ok(purged)
    }

    /// Drop every cached snapshot, fresh or not.
    pub async fn clear_cache(&self) -> Result<usize, StoreError> {
        let cleared = self.cache.clear().await?;
        tracing::info!(cleared, "Cleared weather cache");
        Ok(cleared)
    }

    /// Drop the cached snapshot of a location that is no longer followed.
    pub async fn forget_location(&self, id: LocationId) -> Result<bool, StoreError> {
        self.cache.delete(id).await
    }

    async fn read_cache(&self, id: LocationId) -> Option<ForecastSnapshot> {
        match self.cache.get(id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(%id, "Weather cache read failed, treating as empty: {e}");
                None
            }
        }
    }

    async fn call_provider(
        &self,
        location: &Location,
    ) -> Result<crate::model::Forecast, ProviderError> {
        let request = self.provider.fetch(location.latitude, location.longitude);
        match tokio::time::timeout(self.fetch_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryWeatherCache;
    use crate::clock::ManualClock;
    use crate::model::Forecast;
    use crate::model::fixtures::{forecast, paris, snapshot};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const MINUTE_MS: i64 = 60 * 1000;
    const HOUR_MS: i64 = 60 * MINUTE_MS;

    #[derive(Debug, Clone, Copy)]
    enum Reply {
        Temperature(f64),
        Status(u16),
        Hang,
    }

    #[derive(Debug)]
    struct ScriptedProvider {
        reply: Mutex<Reply>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply: Mutex::new(reply),
                calls: AtomicUsize::new(0),
            })
        }

        fn set(&self, reply: Reply) {
            *self.reply.lock().unwrap() = reply;
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WeatherProvider for ScriptedProvider {
        async fn fetch(&self, _latitude: f64, _longitude: f64) -> Result<Forecast, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = *self.reply.lock().unwrap();
            match reply {
                Reply::Temperature(t) => Ok(forecast(t)),
                Reply::Status(status) => Err(ProviderError::Status {
                    status,
                    body: "unavailable".into(),
                }),
                Reply::Hang => {
                    std::future::pending::<()>().await;
                    Err(ProviderError::MissingCurrent)
                }
            }
        }
    }

    struct Harness {
        orchestrator: WeatherOrchestrator,
        cache: Arc<MemoryWeatherCache>,
        provider: Arc<ScriptedProvider>,
        clock: Arc<ManualClock>,
    }

    fn harness(reply: Reply, now_ms: i64) -> Harness {
        let cache = Arc::new(MemoryWeatherCache::new());
        let provider = ScriptedProvider::new(reply);
        let clock = Arc::new(ManualClock::new(now_ms));
        let orchestrator = WeatherOrchestrator::new(cache.clone(), provider.clone())
            .with_clock(clock.clone());
        Harness {
            orchestrator,
            cache,
            provider,
            clock,
        }
    }

    #[tokio::test]
    async fn empty_cache_fetches_and_writes_through() {
        let h = harness(Reply::Temperature(15.0), 1000);

        let result = h.orchestrator.fetch_weather(&paris(1), false).await.unwrap();

        assert_eq!(result.forecast.current.temperature, 15.0);
        assert_eq!(result.captured_at_ms, 1000);
        assert_eq!(result.location_id, LocationId(1));
        let cached = h.cache.get(LocationId(1)).await.unwrap().unwrap();
        assert_eq!(cached, result);
        assert_eq!(h.provider.calls(), 1);
    }

    #[tokio::test]
    async fn fresh_cache_is_served_without_network() {
        let now = 10 * HOUR_MS;
        let h = harness(Reply::Temperature(20.0), now);
        let cached = snapshot(1, 10.0, now - 10 * MINUTE_MS);
        h.cache.put(LocationId(1), cached.clone()).await.unwrap();

        let outcome = h
            .orchestrator
            .fetch_weather_traced(&paris(1), false)
            .await
            .unwrap();

        assert_eq!(outcome.origin, Origin::Cache);
        assert_eq!(outcome.snapshot, cached);
        assert_eq!(h.provider.calls(), 0);
    }

    #[tokio::test]
    async fn expired_cache_is_refreshed() {
        let now = 10 * HOUR_MS;
        let h = harness(Reply::Temperature(20.0), now);
        h.cache
            .put(LocationId(1), snapshot(1, 10.0, now - 40 * MINUTE_MS))
            .await
            .unwrap();

        let outcome = h
            .orchestrator
            .fetch_weather_traced(&paris(1), false)
            .await
            .unwrap();

        assert_eq!(outcome.origin, Origin::Network);
        assert_eq!(outcome.snapshot.forecast.current.temperature, 20.0);
        let cached = h.cache.get(LocationId(1)).await.unwrap().unwrap();
        assert_eq!(cached.forecast.current.temperature, 20.0);
        assert_eq!(cached.captured_at_ms, now);
    }

    #[tokio::test]
    async fn expired_cache_falls_back_when_network_fails() {
        let now = 10 * HOUR_MS;
        let h = harness(Reply::Status(503), now);
        let stale = snapshot(1, 10.0, now - 40 * MINUTE_MS);
        h.cache.put(LocationId(1), stale.clone()).await.unwrap();

        let outcome = h
            .orchestrator
            .fetch_weather_traced(&paris(1), false)
            .await
            .unwrap();

        assert_eq!(outcome.origin, Origin::StaleFallback);
        assert_eq!(outcome.snapshot, stale);
        assert_eq!(h.cache.get(LocationId(1)).await.unwrap(), Some(stale));
    }

    #[tokio::test]
    async fn forced_refresh_falls_back_to_unchanged_snapshot() {
        let now = 10 * HOUR_MS;
        let h = harness(Reply::Status(500), now);
        let fresh = snapshot(1, 12.0, now - 5 * MINUTE_MS);
        h.cache.put(LocationId(1), fresh.clone()).await.unwrap();

        let result = h.orchestrator.fetch_weather(&paris(1), true).await.unwrap();

        assert_eq!(h.provider.calls(), 1);
        assert_eq!(result, fresh);
        // fallback only reads, it never rewrites the entry
        assert_eq!(h.cache.get(LocationId(1)).await.unwrap(), Some(fresh));
    }

    #[tokio::test]
    async fn very_old_snapshot_still_beats_no_data() {
        let now = 100 * HOUR_MS;
        let h = harness(Reply::Status(502), now);
        let ancient = snapshot(1, 3.0, now - 30 * HOUR_MS);
        h.cache.put(LocationId(1), ancient.clone()).await.unwrap();

        let result = h.orchestrator.fetch_weather(&paris(1), false).await.unwrap();
        assert_eq!(result, ancient);
    }

    #[tokio::test]
    async fn empty_cache_and_failing_provider_is_no_data() {
        let h = harness(Reply::Status(503), 1000);

        let err = h.orchestrator.fetch_weather(&paris(1), false).await.unwrap_err();

        match err {
            FetchError::NoDataAvailable {
                location_id,
                source,
            } => {
                assert_eq!(location_id, LocationId(1));
                assert!(matches!(source, ProviderError::Status { status: 503, .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(h.cache.is_empty().await);
    }

    #[tokio::test]
    async fn unsaved_location_is_rejected_before_any_io() {
        let h = harness(Reply::Temperature(15.0), 0);
        let mut location = paris(1);
        location.id = None;

        let err = h.orchestrator.fetch_weather(&location, false).await.unwrap_err();

        assert!(matches!(err, FetchError::UnsavedLocation(_)));
        assert_eq!(h.provider.calls(), 0);
    }

    #[tokio::test]
    async fn zero_id_counts_as_unsaved() {
        let h = harness(Reply::Temperature(15.0), 0);

        let err = h.orchestrator.fetch_weather(&paris(0), false).await.unwrap_err();

        assert!(matches!(err, FetchError::UnsavedLocation(_)));
        assert_eq!(h.provider.calls(), 0);
        assert!(h.cache.get(LocationId(0)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn search_result_is_cached_under_its_geocoding_id() {
        let h = harness(Reply::Temperature(15.0), 1_000);
        let result = paris(2_988_507);

        let first = h.orchestrator.fetch_weather_traced(&result, false).await.unwrap();
        let second = h.orchestrator.fetch_weather_traced(&result, false).await.unwrap();

        assert_eq!(first.origin, Origin::Network);
        assert_eq!(second.origin, Origin::Cache);
        assert_eq!(h.provider.calls(), 1);
        assert!(h.cache.get(LocationId(2_988_507)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn identical_fetches_leave_identical_cache() {
        let h = harness(Reply::Temperature(15.0), 5_000);

        let first = h.orchestrator.fetch_weather(&paris(1), true).await.unwrap();
        let after_first = h.cache.get(LocationId(1)).await.unwrap();
        let second = h.orchestrator.fetch_weather(&paris(1), true).await.unwrap();
        let after_second = h.cache.get(LocationId(1)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(after_first, after_second);
        assert_eq!(h.cache.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn provider_timeout_falls_back_and_writes_nothing() {
        let now = 10 * HOUR_MS;
        let h = harness(Reply::Hang, now);
        let stale = snapshot(1, 9.0, now - 2 * HOUR_MS);
        h.cache.put(LocationId(1), stale.clone()).await.unwrap();
        let orchestrator = h.orchestrator.clone().with_fetch_timeout(Duration::from_secs(15));

        let outcome = orchestrator
            .fetch_weather_traced(&paris(1), false)
            .await
            .unwrap();

        assert_eq!(outcome.origin, Origin::StaleFallback);
        assert_eq!(outcome.snapshot, stale);
        assert_eq!(h.cache.get(LocationId(1)).await.unwrap(), Some(stale));
    }

    #[tokio::test(start_paused = true)]
    async fn provider_timeout_without_cache_is_no_data() {
        let h = harness(Reply::Hang, 0);

        let err = h.orchestrator.fetch_weather(&paris(2), false).await.unwrap_err();

        assert!(matches!(
            err,
            FetchError::NoDataAvailable {
                source: ProviderError::Timeout,
                ..
            }
        ));
        assert!(h.cache.get(LocationId(2)).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_fetch_never_writes() {
        let h = harness(Reply::Hang, 0);

        let here = paris(1);
        let call = h.orchestrator.fetch_weather(&here, true);
        let aborted = tokio::time::timeout(Duration::from_secs(1), call).await;

        assert!(aborted.is_err());
        assert!(h.cache.is_empty().await);
    }

    #[tokio::test]
    async fn recovery_after_outage() {
        let now = 10 * HOUR_MS;
        let h = harness(Reply::Status(503), now);
        h.cache
            .put(LocationId(1), snapshot(1, 10.0, now - HOUR_MS))
            .await
            .unwrap();

        let stale = h.orchestrator.fetch_weather(&paris(1), false).await.unwrap();
        assert_eq!(stale.forecast.current.temperature, 10.0);

        h.provider.set(Reply::Temperature(18.0));
        h.clock.advance(Duration::from_secs(60));
        let fresh = h.orchestrator.fetch_weather(&paris(1), false).await.unwrap();

        assert_eq!(fresh.forecast.current.temperature, 18.0);
        assert_eq!(fresh.captured_at_ms, now + MINUTE_MS);
        assert_eq!(h.provider.calls(), 2);
    }

    #[tokio::test]
    async fn locations_cache_independently() {
        let h = harness(Reply::Temperature(15.0), 1_000);
        let first = paris(1);
        let twin = paris(2);

        let (a, b) = tokio::join!(
            h.orchestrator.fetch_weather(&first, false),
            h.orchestrator.fetch_weather(&twin, false)
        );

        assert_eq!(a.unwrap().location_id, LocationId(1));
        assert_eq!(b.unwrap().location_id, LocationId(2));
        assert_eq!(h.cache.len().await, 2);
        assert_eq!(h.provider.calls(), 2);
    }

    #[tokio::test]
    async fn purge_expired_uses_retention_horizon() {
        let now = 48 * HOUR_MS;
        let h = harness(Reply::Temperature(1.0), now);
        h.cache
            .put(LocationId(1), snapshot(1, 1.0, now - 25 * HOUR_MS))
            .await
            .unwrap();
        h.cache
            .put(LocationId(2), snapshot(2, 1.0, now - 24 * HOUR_MS))
            .await
            .unwrap();
        h.cache
            .put(LocationId(3), snapshot(3, 1.0, now - HOUR_MS))
            .await
            .unwrap();

        assert_eq!(h.orchestrator.purge_expired().await.unwrap(), 1);

        assert!(h.cache.get(LocationId(1)).await.unwrap().is_none());
        assert!(h.cache.get(LocationId(2)).await.unwrap().is_some());
        assert!(h.cache.get(LocationId(3)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn cleared_cache_forces_a_fetch() {
        let h = harness(Reply::Temperature(15.0), 0);
        h.orchestrator.fetch_weather(&paris(1), false).await.unwrap();

        assert_eq!(h.orchestrator.clear_cache().await.unwrap(), 1);
        h.orchestrator.fetch_weather(&paris(1), false).await.unwrap();

        assert_eq!(h.provider.calls(), 2);
    }

    #[tokio::test]
    async fn forget_location_removes_entry() {
        let h = harness(Reply::Temperature(15.0), 0);
        h.orchestrator.fetch_weather(&paris(1), false).await.unwrap();

        assert!(h.orchestrator.forget_location(LocationId(1)).await.unwrap());
        assert!(h.cache.get(LocationId(1)).await.unwrap().is_none());
    }
}
