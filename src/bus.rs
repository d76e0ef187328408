// =============================================================================
// Bus — pub/sub fanout for ticks, bars, indicators, signals, decisions
// =============================================================================
//
// Wraps a *second* redis connection, separate from Store's, because redis
// does not support mixing blocking pubsub subscriptions and regular
// commands on one connection. The in-memory equivalent used by
// `Bus::fake()` is a `tokio::sync::broadcast` channel per process, which is
// sufficient for single-process tests and `collector.provider = mock` runs.
//
// Every publish carries a monotonically increasing per-channel sequence
// number so subscribers can detect gaps — a rewind is a gap, not an error.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::broadcast;
use tracing::{instrument, warn};

use crate::error::{CoreError, CoreResult};
use crate::model::ChannelMessage;

const BROADCAST_CAPACITY: usize = 1024;

/// `*`-glob match for the in-memory backend's PSUBSCRIBE equivalent.
/// Supports any number of `*` wildcards, each matching zero or more
/// characters (no `?`/`[...]`, since no channel name in this crate needs
/// them).
fn glob_match(pattern: &str, text: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == text;
    }
    let parts: Vec<&str> = pattern.split('*').collect();
    let mut rest = text;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !rest.starts_with(part) {
                return false;
            }
            rest = &rest[part.len()..];
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(idx) => rest = &rest[idx + part.len()..],
                None => return false,
            }
        }
    }
    true
}

enum Backend {
    Redis { publish_conn: ConnectionManager, client: redis::Client },
    Memory(Mutex<HashMap<String, broadcast::Sender<String>>>),
}

#[derive(Clone)]
pub struct Bus {
    backend: Arc<Backend>,
    sequences: Arc<Mutex<HashMap<String, u64>>>,
}

impl Bus {
    pub async fn connect(redis_url: &str) -> CoreResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| CoreError::BackendUnavailable(format!("invalid redis url: {e}")))?;
        let publish_conn = client
            .get_connection_manager()
            .await
            .map_err(|e| CoreError::BackendUnavailable(e.to_string()))?;
        Ok(Self {
            backend: Arc::new(Backend::Redis { publish_conn, client }),
            sequences: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn fake() -> Self {
        Self {
            backend: Arc::new(Backend::Memory(Mutex::new(HashMap::new()))),
            sequences: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn next_sequence(&self, channel: &str) -> u64 {
        let mut sequences = self.sequences.lock();
        let seq = sequences.entry(channel.to_string()).or_insert(0);
        *seq += 1;
        *seq
    }

    /// Publish `payload` on `channel`, wrapping it in a `ChannelMessage`
    /// envelope with a fresh per-channel sequence number and `timestamp`.
    #[instrument(skip(self, payload))]
    pub async fn publish<T: Serialize>(
        &self,
        channel: &str,
        timestamp: chrono::DateTime<chrono::FixedOffset>,
        payload: &T,
    ) -> CoreResult<()> {
        let envelope = ChannelMessage {
            channel: channel.to_string(),
            sequence: self.next_sequence(channel),
            timestamp,
            payload,
        };
        let json = serde_json::to_string(&envelope).map_err(|e| CoreError::Logic(format!("envelope encode: {e}")))?;

        match &*self.backend {
            Backend::Redis { publish_conn, .. } => {
                let mut conn = publish_conn.clone();
                redis::cmd("PUBLISH")
                    .arg(channel)
                    .arg(&json)
                    .query_async::<_, i64>(&mut conn)
                    .await
                    .map_err(|e| CoreError::BackendUnavailable(e.to_string()))?;
            }
            Backend::Memory(channels) => {
                let mut channels = channels.lock();
                channels.entry(channel.to_string()).or_insert_with(|| broadcast::channel(BROADCAST_CAPACITY).0);
                // No subscribers is not an error — publishing into an empty
                // room is normal during startup. Every registered key whose
                // pattern matches this channel (exact or glob) gets a copy,
                // mirroring redis PUBLISH fanning out to PSUBSCRIBE clients.
                for (key, tx) in channels.iter() {
                    if key == channel || glob_match(key, channel) {
                        let _ = tx.send(json.clone());
                    }
                }
            }
        }
        Ok(())
    }

    /// Subscribe to an exact channel name or a `*`-glob pattern (redis
    /// `PSUBSCRIBE` semantics — `market:tick:*` matches every instrument).
    /// Returns a stream of decoded payloads; malformed messages are logged
    /// and dropped rather than terminating the stream — never crash a
    /// long-running service on a single bad message.
    #[instrument(skip(self))]
    pub async fn subscribe<T: DeserializeOwned + Send + 'static>(
        &self,
        pattern: &str,
    ) -> CoreResult<futures_util::stream::BoxStream<'static, ChannelMessage<T>>> {
        match &*self.backend {
            Backend::Redis { client, .. } => {
                let mut pubsub = client
                    .get_async_pubsub()
                    .await
                    .map_err(|e| CoreError::BackendUnavailable(e.to_string()))?;
                if pattern.contains('*') {
                    pubsub.psubscribe(pattern).await.map_err(|e| CoreError::BackendUnavailable(e.to_string()))?;
                } else {
                    pubsub.subscribe(pattern).await.map_err(|e| CoreError::BackendUnavailable(e.to_string()))?;
                }
                let stream = pubsub
                    .into_on_message()
                    .filter_map(|msg| async move {
                        let raw: String = msg.get_payload().ok()?;
                        match serde_json::from_str::<ChannelMessage<T>>(&raw) {
                            Ok(envelope) => Some(envelope),
                            Err(e) => {
                                warn!(error = %e, "dropping malformed bus message");
                                None
                            }
                        }
                    })
                    .boxed();
                Ok(stream)
            }
            Backend::Memory(channels) => {
                let mut channels = channels.lock();
                let tx = channels
                    .entry(pattern.to_string())
                    .or_insert_with(|| broadcast::channel(BROADCAST_CAPACITY).0);
                let rx = tx.subscribe();
                let stream = tokio_stream::wrappers::BroadcastStream::new(rx)
                    .filter_map(|msg| async move {
                        let raw = msg.ok()?;
                        match serde_json::from_str::<ChannelMessage<T>>(&raw) {
                            Ok(envelope) => Some(envelope),
                            Err(e) => {
                                warn!(error = %e, "dropping malformed bus message");
                                None
                            }
                        }
                    })
                    .boxed();
                Ok(stream)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{channels, ist_offset};
    use futures_util::StreamExt;

    fn ts() -> chrono::DateTime<chrono::FixedOffset> {
        chrono::Utc::now().with_timezone(&ist_offset())
    }

    #[tokio::test]
    async fn publish_then_subscribe_round_trips_payload() {
        let bus = Bus::fake();
        let channel = channels::tick("BANKNIFTY");
        let mut stream = bus.subscribe::<f64>(&channel).await.unwrap();

        bus.publish(&channel, ts(), &45123.5).await.unwrap();

        let received = stream.next().await.unwrap();
        assert_eq!(received.payload, 45123.5);
        assert_eq!(received.sequence, 1);
    }

    #[tokio::test]
    async fn sequence_numbers_increase_per_channel_independently() {
        let bus = Bus::fake();
        let channel = channels::tick("NIFTY");
        bus.publish(&channel, ts(), &1.0).await.unwrap();
        bus.publish(&channel, ts(), &2.0).await.unwrap();
        let other = channels::tick("BANKNIFTY");
        bus.publish(&other, ts(), &1.0).await.unwrap();

        assert_eq!(*bus.sequences.lock().get(&channel).unwrap(), 2);
        assert_eq!(*bus.sequences.lock().get(&other).unwrap(), 1);
    }

    #[tokio::test]
    async fn wildcard_subscription_receives_matching_channels() {
        let bus = Bus::fake();
        let mut stream = bus.subscribe::<f64>("market:tick:*").await.unwrap();

        bus.publish(&channels::tick("NIFTY"), ts(), &1.0).await.unwrap();
        bus.publish(&channels::tick("BANKNIFTY"), ts(), &2.0).await.unwrap();

        let first = stream.next().await.unwrap();
        let second = stream.next().await.unwrap();
        assert_eq!(first.payload, 1.0);
        assert_eq!(second.payload, 2.0);
    }

    #[tokio::test]
    async fn wildcard_subscription_ignores_non_matching_channels() {
        let bus = Bus::fake();
        let mut stream = bus.subscribe::<f64>("market:ohlc:NIFTY:*").await.unwrap();

        bus.publish(&channels::tick("NIFTY"), ts(), &1.0).await.unwrap();
        bus.publish(&channels::ohlc("NIFTY", "1m"), ts(), &2.0).await.unwrap();

        let received = stream.next().await.unwrap();
        assert_eq!(received.payload, 2.0);
    }

    #[test]
    fn glob_match_supports_prefix_and_multi_segment_patterns() {
        assert!(glob_match("market:tick:*", "market:tick:NIFTY"));
        assert!(!glob_match("market:tick:*", "market:ohlc:NIFTY"));
        assert!(glob_match("market:ohlc:NIFTY:*", "market:ohlc:NIFTY:1m"));
        assert!(!glob_match("market:ohlc:NIFTY:*", "market:ohlc:BANKNIFTY:1m"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "not-exact"));
    }
}
