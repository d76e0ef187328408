// =============================================================================
// Store — authoritative persistence for ticks, bars, indicators, signals
// =============================================================================
//
// Backed by any KV with string keys, ordered sets, TTLs, and pub/sub; redis
// is the canonical choice, reached for the same way the wider pack reaches
// for it (see DESIGN.md). `Store::fake()` gives tests and local/mock runs an
// in-memory equivalent with the identical method surface.
//
// Every operation is instrumented and wrapped with a 3s timeout + one retry;
// redis/decode failures map onto `CoreError::BackendUnavailable` /
// `CoreError::Corrupt`. Corrupt records are logged and treated as
// `NotFound` — never deleted, so an operator can inspect them.
// =============================================================================

mod memory;
pub mod keys;

use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{instrument, warn};

use crate::error::{CoreError, CoreResult};
use crate::model::{Depth, IndicatorSnapshot, OhlcBar, SignalRecord, SignalStatus, Tick, Timeframe};

use memory::MemoryBackend;

const STORE_TIMEOUT: Duration = Duration::from_secs(3);

enum Backend {
    Redis(ConnectionManager),
    Memory(MemoryBackend),
}

/// Store exclusively owns all persisted state; this handle is cheap to
/// clone (the redis connection manager is itself a cheap `Arc`-backed
/// clone) and is shared via `Arc` the same way every other subsystem handle
/// in this crate is.
#[derive(Clone)]
pub struct Store {
    backend: std::sync::Arc<Backend>,
}

async fn with_timeout<F, T>(fut: F) -> CoreResult<T>
where
    F: std::future::Future<Output = redis::RedisResult<T>>,
{
    match tokio::time::timeout(STORE_TIMEOUT, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(CoreError::BackendUnavailable(e.to_string())),
        Err(_) => Err(CoreError::BackendUnavailable("store operation timed out after 3s".into())),
    }
}

impl Store {
    /// Connect to the canonical redis backend. Retries once after a 3s
    /// timeout, mirroring every other Store operation's retry policy.
    #[instrument]
    pub async fn connect(redis_url: &str) -> CoreResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| CoreError::BackendUnavailable(format!("invalid redis url: {e}")))?;

        let manager = match tokio::time::timeout(STORE_TIMEOUT, client.get_connection_manager()).await {
            Ok(Ok(m)) => m,
            _ => {
                warn!("first redis connection attempt failed, retrying once");
                tokio::time::timeout(STORE_TIMEOUT, client.get_connection_manager())
                    .await
                    .map_err(|_| CoreError::BackendUnavailable("redis connect timed out".into()))?
                    .map_err(|e| CoreError::BackendUnavailable(e.to_string()))?
            }
        };
        Ok(Self { backend: std::sync::Arc::new(Backend::Redis(manager)) })
    }

    /// An in-memory Store — no network, no persistence across process
    /// restarts. Used by tests and `collector.provider = mock`.
    pub fn fake() -> Self {
        Self { backend: std::sync::Arc::new(Backend::Memory(MemoryBackend::new())) }
    }

    fn decode<T: serde::de::DeserializeOwned>(raw: &str, context: &str) -> CoreResult<T> {
        serde_json::from_str(raw).map_err(|e| {
            warn!(error = %e, context, "corrupt store record, treating as not found");
            CoreError::Corrupt(format!("{context}: {e}"))
        })
    }

    // -------------------------------------------------------------------
    // Ticks
    // -------------------------------------------------------------------

    #[instrument(skip(self, tick))]
    pub async fn put_tick(&self, tick: &Tick) -> CoreResult<()> {
        let json = serde_json::to_string(tick).expect("Tick always serializes");
        let latest_key = keys::tick_latest(&tick.instrument);
        let history_key = keys::tick_at(&tick.instrument, &tick.timestamp.to_rfc3339());
        let price_key = keys::price_latest(&tick.instrument);

        match &*self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                with_timeout(conn.set::<_, _, ()>(&latest_key, &json)).await?;
                with_timeout(conn.set::<_, _, ()>(&history_key, &json)).await?;
                with_timeout(conn.set::<_, _, ()>(&price_key, tick.last_price.to_string())).await?;
            }
            Backend::Memory(mem) => {
                mem.set(&latest_key, json.clone());
                mem.set(&history_key, json);
                mem.set(&price_key, tick.last_price.to_string());
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn latest_tick(&self, instrument: &str) -> CoreResult<Option<Tick>> {
        let key = keys::tick_latest(instrument);
        let raw = match &*self.backend {
            Backend::Redis(conn) => with_timeout(conn.clone().get::<_, Option<String>>(&key)).await?,
            Backend::Memory(mem) => mem.get(&key),
        };
        match raw {
            None => Ok(None),
            Some(raw) => Ok(Some(Self::decode(&raw, "latest_tick")?)),
        }
    }

    // -------------------------------------------------------------------
    // Depth
    // -------------------------------------------------------------------

    #[instrument(skip(self, depth))]
    pub async fn put_depth(&self, depth: &Depth) -> CoreResult<()> {
        let json = serde_json::to_string(depth).expect("Depth always serializes");
        let key = keys::depth_latest(&depth.instrument);
        match &*self.backend {
            Backend::Redis(conn) => with_timeout(conn.clone().set::<_, _, ()>(&key, &json)).await?,
            Backend::Memory(mem) => mem.set(&key, json),
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn latest_depth(&self, instrument: &str) -> CoreResult<Option<Depth>> {
        let key = keys::depth_latest(instrument);
        let raw = match &*self.backend {
            Backend::Redis(conn) => with_timeout(conn.clone().get::<_, Option<String>>(&key)).await?,
            Backend::Memory(mem) => mem.get(&key),
        };
        match raw {
            None => Ok(None),
            Some(raw) => Ok(Some(Self::decode(&raw, "latest_depth")?)),
        }
    }

    // -------------------------------------------------------------------
    // OHLC
    // -------------------------------------------------------------------

    #[instrument(skip(self, bar))]
    pub async fn put_ohlc(&self, bar: &OhlcBar) -> CoreResult<()> {
        let json = serde_json::to_string(bar).expect("OhlcBar always serializes");
        let iso = bar.start_at.to_rfc3339();
        let key = keys::ohlc_at(&bar.instrument, bar.timeframe.as_str(), &iso);
        let sorted_key = keys::ohlc_sorted(&bar.instrument, bar.timeframe.as_str());
        let score = bar.start_at.timestamp() as f64;

        match &*self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                with_timeout(conn.set::<_, _, ()>(&key, &json)).await?;
                with_timeout(conn.zadd::<_, _, _, ()>(&sorted_key, &key, score)).await?;
            }
            Backend::Memory(mem) => {
                mem.set(&key, json);
                mem.zadd(&sorted_key, score, key);
            }
        }
        Ok(())
    }

    /// Most recent `limit` bars for `(instrument, timeframe)`, newest first.
    #[instrument(skip(self))]
    pub async fn ohlc(&self, instrument: &str, timeframe: Timeframe, limit: usize) -> CoreResult<Vec<OhlcBar>> {
        let sorted_key = keys::ohlc_sorted(instrument, timeframe.as_str());
        let bar_keys: Vec<String> = match &*self.backend {
            Backend::Redis(conn) => {
                with_timeout(conn.clone().zrevrange::<_, Vec<String>>(&sorted_key, 0, limit.saturating_sub(1) as isize)).await?
            }
            Backend::Memory(mem) => mem.zrevrange(&sorted_key, limit),
        };

        let mut bars = Vec::with_capacity(bar_keys.len());
        for key in bar_keys {
            let raw = match &*self.backend {
                Backend::Redis(conn) => with_timeout(conn.clone().get::<_, Option<String>>(&key)).await?,
                Backend::Memory(mem) => mem.get(&key),
            };
            if let Some(raw) = raw {
                match Self::decode::<OhlcBar>(&raw, "ohlc") {
                    Ok(bar) => bars.push(bar),
                    Err(_) => continue, // corrupt bar: skip, already warned in decode()
                }
            }
        }
        Ok(bars)
    }

    // -------------------------------------------------------------------
    // Indicators
    // -------------------------------------------------------------------

    #[instrument(skip(self, snapshot))]
    pub async fn put_indicators(&self, snapshot: &IndicatorSnapshot, prev_ttl: Duration) -> CoreResult<()> {
        // Copy the current stored value into the prev-cache for every name
        // whose value is about to change, before overwriting the current
        // snapshot.
        if let Some(existing) = self.indicators(&snapshot.instrument).await? {
            for name in snapshot.changed_since(&existing) {
                if let Some(value) = existing.get(&name) {
                    self.set_prev_indicator(&snapshot.instrument, &name, value, prev_ttl).await?;
                }
            }
        }

        let json = serde_json::to_string(snapshot).expect("IndicatorSnapshot always serializes");
        let key = keys::indicators_latest(&snapshot.instrument);
        match &*self.backend {
            Backend::Redis(conn) => with_timeout(conn.clone().set::<_, _, ()>(&key, &json)).await?,
            Backend::Memory(mem) => mem.set(&key, json),
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn indicators(&self, instrument: &str) -> CoreResult<Option<IndicatorSnapshot>> {
        let key = keys::indicators_latest(instrument);
        let raw = match &*self.backend {
            Backend::Redis(conn) => with_timeout(conn.clone().get::<_, Option<String>>(&key)).await?,
            Backend::Memory(mem) => mem.get(&key),
        };
        match raw {
            None => Ok(None),
            Some(raw) => Ok(Some(Self::decode(&raw, "indicators")?)),
        }
    }

    async fn set_prev_indicator(&self, instrument: &str, name: &str, value: f64, ttl: Duration) -> CoreResult<()> {
        let key = keys::indicators_prev(instrument, name);
        match &*self.backend {
            Backend::Redis(conn) => {
                with_timeout(conn.clone().set_ex::<_, _, ()>(&key, value.to_string(), ttl.as_secs())).await?
            }
            Backend::Memory(mem) => mem.set_ex(&key, value.to_string(), ttl),
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn prev_indicator(&self, instrument: &str, name: &str) -> CoreResult<Option<f64>> {
        let key = keys::indicators_prev(instrument, name);
        let raw = match &*self.backend {
            Backend::Redis(conn) => with_timeout(conn.clone().get::<_, Option<String>>(&key)).await?,
            Backend::Memory(mem) => mem.get(&key),
        };
        match raw {
            None => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| CoreError::Corrupt(format!("prev_indicator {key}"))),
        }
    }

    // -------------------------------------------------------------------
    // Clock virtual state
    // -------------------------------------------------------------------

    pub async fn clock_virtual_enabled(&self) -> CoreResult<bool> {
        let raw = match &*self.backend {
            Backend::Redis(conn) => with_timeout(conn.clone().get::<_, Option<String>>(keys::CLOCK_VIRTUAL_ENABLED)).await?,
            Backend::Memory(mem) => mem.get(keys::CLOCK_VIRTUAL_ENABLED),
        };
        Ok(raw.map(|v| v == "true").unwrap_or(false))
    }

    pub async fn clock_virtual_current(&self) -> CoreResult<Option<DateTime<FixedOffset>>> {
        let raw = match &*self.backend {
            Backend::Redis(conn) => with_timeout(conn.clone().get::<_, Option<String>>(keys::CLOCK_VIRTUAL_CURRENT)).await?,
            Backend::Memory(mem) => mem.get(keys::CLOCK_VIRTUAL_CURRENT),
        };
        match raw {
            None => Ok(None),
            Some(raw) => DateTime::parse_from_rfc3339(&raw)
                .map(Some)
                .map_err(|e| CoreError::Corrupt(format!("clock:virtual:current: {e}"))),
        }
    }

    pub async fn set_clock_virtual(&self, enabled: bool, current: Option<DateTime<FixedOffset>>) -> CoreResult<()> {
        match &*self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                with_timeout(conn.set::<_, _, ()>(keys::CLOCK_VIRTUAL_ENABLED, enabled.to_string())).await?;
                if let Some(ts) = current {
                    with_timeout(conn.set::<_, _, ()>(keys::CLOCK_VIRTUAL_CURRENT, ts.to_rfc3339())).await?;
                }
            }
            Backend::Memory(mem) => {
                mem.set(keys::CLOCK_VIRTUAL_ENABLED, enabled.to_string());
                if let Some(ts) = current {
                    mem.set(keys::CLOCK_VIRTUAL_CURRENT, ts.to_rfc3339());
                }
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------
    // Signals
    // -------------------------------------------------------------------

    /// Register a new signal. Rejected with `Contract` if the id already
    /// exists — re-registration is never a silent overwrite.
    #[instrument(skip(self, record))]
    pub async fn create_signal(&self, record: &SignalRecord) -> CoreResult<()> {
        if self.get_signal(&record.definition.signal_id).await?.is_some() {
            return Err(CoreError::Contract(format!(
                "signal {} already registered",
                record.definition.signal_id
            )));
        }
        self.write_signal(record).await?;
        let set_key = keys::signals_by_instrument(&record.definition.instrument);
        match &*self.backend {
            Backend::Redis(conn) => {
                with_timeout(conn.clone().sadd::<_, _, ()>(&set_key, &record.definition.signal_id)).await?
            }
            Backend::Memory(mem) => mem.sadd(&set_key, record.definition.signal_id.clone()),
        }
        Ok(())
    }

    async fn write_signal(&self, record: &SignalRecord) -> CoreResult<()> {
        let json = serde_json::to_string(record).expect("SignalRecord always serializes");
        let key = keys::signal(&record.definition.signal_id);
        match &*self.backend {
            Backend::Redis(conn) => with_timeout(conn.clone().set::<_, _, ()>(&key, &json)).await?,
            Backend::Memory(mem) => mem.set(&key, json),
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_signal(&self, signal_id: &str) -> CoreResult<Option<SignalRecord>> {
        let key = keys::signal(signal_id);
        let raw = match &*self.backend {
            Backend::Redis(conn) => with_timeout(conn.clone().get::<_, Option<String>>(&key)).await?,
            Backend::Memory(mem) => mem.get(&key),
        };
        match raw {
            None => Ok(None),
            Some(raw) => Ok(Some(Self::decode(&raw, "signal")?)),
        }
    }

    #[instrument(skip(self))]
    pub async fn signals_by_instrument(&self, instrument: &str) -> CoreResult<Vec<String>> {
        let key = keys::signals_by_instrument(instrument);
        match &*self.backend {
            Backend::Redis(conn) => with_timeout(conn.clone().smembers::<_, Vec<String>>(&key)).await,
            Backend::Memory(mem) => Ok(mem.smembers(&key)),
        }
    }

    /// Compare-and-set the signal's status, guarded by a per-signal atomic
    /// read-check-write so concurrent evaluator tasks cannot both observe
    /// `active` and both transition out of it at-most-once.
    /// `mutate` receives the current record and returns the next record iff
    /// `record.status == expected`; any other observed status means a
    /// concurrent writer won and this call is a no-op returning `false`.
    #[instrument(skip(self, mutate))]
    pub async fn cas_signal<F>(&self, signal_id: &str, expected: SignalStatus, mutate: F) -> CoreResult<bool>
    where
        F: FnOnce(&mut SignalRecord),
    {
        let key = keys::signal(signal_id);
        match &*self.backend {
            Backend::Redis(_) => {
                // redis has no "read a typed JSON value, mutate, write back"
                // primitive; emulate the same single-writer-wins guarantee
                // with an optimistic read/compare/write retried until the
                // key is unchanged across the round trip.
                for _ in 0..3 {
                    let Some(mut record) = self.get_signal(signal_id).await? else {
                        return Ok(false);
                    };
                    if record.status != expected {
                        return Ok(false);
                    }
                    let before = serde_json::to_string(&record).unwrap();
                    mutate(&mut record);
                    let after = serde_json::to_string(&record).unwrap();

                    if let Backend::Redis(conn) = &*self.backend {
                        let mut conn = conn.clone();
                        let current: Option<String> = with_timeout(conn.get(&key)).await?;
                        if current.as_deref() != Some(before.as_str()) {
                            continue; // lost the race, retry
                        }
                        with_timeout(conn.set::<_, _, ()>(&key, &after)).await?;
                    }
                    return Ok(true);
                }
                Ok(false)
            }
            Backend::Memory(mem) => {
                let result = mem.compare_and_set(&key, |current| {
                    let mut record: SignalRecord = serde_json::from_str(current?).ok()?;
                    if record.status != expected {
                        return None;
                    }
                    mutate(&mut record);
                    Some(serde_json::to_string(&record).unwrap())
                });
                Ok(result.is_some())
            }
        }
    }

    /// Move a signal from `executing` to its terminal `executed` state.
    /// Called by the orchestrator once its trade has actually settled — the
    /// executor task only owns the `triggered -> executing` transition;
    /// everything past that is the orchestrator's own business.
    pub async fn mark_executed(&self, signal_id: &str, executed_at: chrono::DateTime<chrono::FixedOffset>, exec_result: impl Into<String>) -> CoreResult<bool> {
        let exec_result = exec_result.into();
        self.cas_signal(signal_id, SignalStatus::Executing, |r| {
            r.status = SignalStatus::Executed;
            r.executed_at = Some(executed_at);
            r.exec_result = Some(exec_result);
        })
        .await
    }

    /// Move a signal from `executing` to its terminal `failed` state.
    pub async fn mark_failed(&self, signal_id: &str, reason: impl Into<String>) -> CoreResult<bool> {
        let reason = reason.into();
        self.cas_signal(signal_id, SignalStatus::Executing, |r| {
            r.status = SignalStatus::Failed;
            r.reason = Some(reason);
        })
        .await
    }

    pub async fn auth_token(&self) -> CoreResult<Option<String>> {
        match &*self.backend {
            Backend::Redis(conn) => with_timeout(conn.clone().get::<_, Option<String>>(keys::AUTH_KITE_ACCESS_TOKEN)).await,
            Backend::Memory(mem) => Ok(mem.get(keys::AUTH_KITE_ACCESS_TOKEN)),
        }
    }

    pub async fn set_auth_token(&self, token: &str) -> CoreResult<()> {
        match &*self.backend {
            Backend::Redis(conn) => with_timeout(conn.clone().set::<_, _, ()>(keys::AUTH_KITE_ACCESS_TOKEN, token)).await,
            Backend::Memory(mem) => {
                mem.set(keys::AUTH_KITE_ACCESS_TOKEN, token.to_string());
                Ok(())
            }
        }
    }
}
