// =============================================================================
// Clock — single source of truth for "now"
// =============================================================================
//
// Virtual state lives in two Store keys (`clock:virtual:enabled`,
// `clock:virtual:current`) so every process observes the same clock. All
// `now()` reads in this crate go through a `Clock` instance — a direct
// `Utc::now()`/`SystemTime::now()` read anywhere else is a defect (Design
// Notes: "implicit time via wall clock").
//
// On `BackendUnavailable` from the Store, the last-observed value is served
// for up to 5s before the error propagates, per the retry policy in the
// component design.
// =============================================================================

use std::time::Instant;

use chrono::{DateTime, FixedOffset, Utc};
use parking_lot::RwLock;
use tracing::{instrument, warn};

use crate::error::CoreError;
use crate::model::ist_offset;
use crate::store::Store;

const STALE_TOLERANCE: std::time::Duration = std::time::Duration::from_secs(5);

struct ClockCache {
    virtual_enabled: bool,
    virtual_current: Option<DateTime<FixedOffset>>,
    observed_at: Instant,
}

/// Single source of truth for "now" — real or virtual, shared across every
/// task via `Arc<Clock>`.
pub struct Clock {
    store: Store,
    cache: RwLock<ClockCache>,
}

impl Clock {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            cache: RwLock::new(ClockCache {
                virtual_enabled: false,
                virtual_current: None,
                observed_at: Instant::now() - STALE_TOLERANCE - std::time::Duration::from_secs(1),
            }),
        }
    }

    /// Current time: the host wall clock in IST, or the advancing virtual
    /// clock if one is set. Fails with `BackendUnavailable` if the Store is
    /// unreachable and the cached value is older than the 5s stale
    /// tolerance — callers MUST treat this as fatal at startup and
    /// retryable at runtime.
    #[instrument(skip(self))]
    pub async fn now(&self) -> Result<DateTime<FixedOffset>, CoreError> {
        match self.refresh_virtual_state().await {
            Ok((enabled, current)) => {
                let mut cache = self.cache.write();
                cache.virtual_enabled = enabled;
                cache.virtual_current = current;
                cache.observed_at = Instant::now();
                Ok(self.resolve(enabled, current))
            }
            Err(e) => {
                let cache = self.cache.read();
                if cache.observed_at.elapsed() <= STALE_TOLERANCE {
                    warn!(error = %e, "clock backend unavailable, serving cached value");
                    Ok(self.resolve(cache.virtual_enabled, cache.virtual_current))
                } else {
                    Err(CoreError::BackendUnavailable(format!("clock backend unreachable: {e}")))
                }
            }
        }
    }

    fn resolve(&self, virtual_enabled: bool, virtual_current: Option<DateTime<FixedOffset>>) -> DateTime<FixedOffset> {
        if virtual_enabled {
            if let Some(ts) = virtual_current {
                return ts;
            }
        }
        Utc::now().with_timezone(&ist_offset())
    }

    async fn refresh_virtual_state(&self) -> Result<(bool, Option<DateTime<FixedOffset>>), CoreError> {
        let enabled = self.store.clock_virtual_enabled().await?;
        let current = if enabled { self.store.clock_virtual_current().await? } else { None };
        Ok((enabled, current))
    }

    /// Set virtual time to `ts`. Used by the replay collector on start and
    /// as it advances while emitting synthetic ticks.
    pub async fn set_virtual(&self, ts: DateTime<FixedOffset>) -> Result<(), CoreError> {
        self.store.set_clock_virtual(true, Some(ts)).await?;
        let mut cache = self.cache.write();
        cache.virtual_enabled = true;
        cache.virtual_current = Some(ts);
        cache.observed_at = Instant::now();
        Ok(())
    }

    /// Clear virtual time. `now()` falls back to the host wall clock.
    pub async fn clear_virtual(&self) -> Result<(), CoreError> {
        self.store.set_clock_virtual(false, None).await?;
        let mut cache = self.cache.write();
        cache.virtual_enabled = false;
        cache.virtual_current = None;
        cache.observed_at = Instant::now();
        Ok(())
    }

    pub async fn is_virtual(&self) -> Result<bool, CoreError> {
        self.store.clock_virtual_enabled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[tokio::test]
    async fn resolve_falls_back_to_wall_clock_when_not_virtual() {
        let clock = Clock::new(Store::fake());
        let now = clock.resolve(false, Some(Utc::now().with_timezone(&ist_offset())));
        let wall = Utc::now().with_timezone(&ist_offset());
        assert!((now - wall).num_seconds().abs() < 2);
    }

    #[tokio::test]
    async fn resolve_uses_virtual_value_when_enabled() {
        let clock = Clock::new(Store::fake());
        let ts = DateTime::<FixedOffset>::from_naive_utc_and_offset(
            chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(9, 15, 0).unwrap(),
            ist_offset(),
        );
        let resolved = clock.resolve(true, Some(ts));
        assert_eq!(resolved, ts);
    }
}
