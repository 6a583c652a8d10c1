//! When is a cached snapshot good enough to serve without asking the network?

use std::time::Duration;

use crate::clock::duration_ms;
use crate::model::ForecastSnapshot;

/// Maximum age of a snapshot that may be served without a refresh.
pub const CACHE_VALIDITY_WINDOW: Duration = Duration::from_secs(30 * 60);

/// Age after which the maintenance sweep evicts a snapshot unconditionally.
pub const RETENTION_HORIZON: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    ServeCache,
    Fetch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    validity_window_ms: i64,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self::new(CACHE_VALIDITY_WINDOW)
    }
}

impl FreshnessPolicy {
    pub fn new(validity_window: Duration) -> Self {
        Self {
            validity_window_ms: duration_ms(validity_window),
        }
    }

    pub fn validity_window(&self) -> Duration {
        Duration::from_millis(self.validity_window_ms.max(0).unsigned_abs())
    }

    /// A snapshot exactly at the window edge is still fresh. Snapshots stamped
    /// in the future (clock skew) count as age zero.
    pub fn is_fresh(&self, snapshot: &ForecastSnapshot, now_ms: i64) -> bool {
        snapshot.age_ms(now_ms) <= self.validity_window_ms
    }

    /// Pure and total: the same inputs always give the same decision.
    pub fn decide(
        &self,
        cached: Option<&ForecastSnapshot>,
        now_ms: i64,
        force_refresh: bool,
    ) -> Decision {
        if force_refresh {
            return Decision::Fetch;
        }
        match cached {
            Some(snapshot) if self.is_fresh(snapshot, now_ms) => Decision::ServeCache,
            _ => Decision::Fetch,
        }
    }
}

/// Cut-off timestamp for the retention sweep.
pub fn retention_threshold(now_ms: i64, retention: Duration) -> i64 {
    now_ms.saturating_sub(duration_ms(retention))
}
