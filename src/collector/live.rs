// =============================================================================
// Live Collector
// =============================================================================
//
// Opens a streaming WS connection to the upstream broker for one instrument.
// Every inbound message normalises to a `Tick` or a `Depth`, is written to
// the Store, and republished on the Bus. Reconnects with exponential backoff
// capped at 30s; five consecutive failures mark the collector `degraded`
// until the next success. No data for 60s marks it `unhealthy` (still
// retrying). Invalid credentials at startup are fatal — `AuthRequired`,
// never a silent fallback, mirroring the trade-stream processor's "caller
// handles reconnection" split between connect and read loop.
// =============================================================================

use std::time::Duration;

use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::bus::Bus;
use crate::clock::Clock;
use crate::error::{CoreError, CoreResult};
use crate::model::{channels, Depth, DepthLevel, Tick};
use crate::store::Store;

use super::{CollectorHandle, CollectorHealth};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const DEGRADE_AFTER_FAILURES: u32 = 5;
const UNHEALTHY_AFTER_NO_DATA: Duration = Duration::from_secs(60);

pub struct LiveCollector {
    instrument: String,
    ws_url: String,
    store: Store,
    bus: Bus,
    clock: std::sync::Arc<Clock>,
    handle: CollectorHandle,
}

impl LiveCollector {
    pub fn new(instrument: impl Into<String>, ws_url: impl Into<String>, store: Store, bus: Bus, clock: std::sync::Arc<Clock>, handle: CollectorHandle) -> Self {
        Self { instrument: instrument.into(), ws_url: ws_url.into(), store, bus, clock, handle }
    }

    #[instrument(skip(self, shutdown), fields(instrument = %self.instrument))]
    pub async fn run(mut self, shutdown: CancellationToken) -> CoreResult<()> {
        if self.store.auth_token().await?.is_none() {
            return Err(CoreError::AuthRequired(format!("no access token available for {}", self.instrument)));
        }
        self.clock.clear_virtual().await?;

        let mut backoff = INITIAL_BACKOFF;
        let mut consecutive_failures = 0u32;
        let mut last_data_at = tokio::time::Instant::now();

        while !shutdown.is_cancelled() {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.connect_and_stream(&shutdown, &mut last_data_at) => {
                    match result {
                        Ok(()) => {
                            consecutive_failures = 0;
                            backoff = INITIAL_BACKOFF;
                            self.handle.set(CollectorHealth::Healthy);
                        }
                        Err(e) => {
                            consecutive_failures += 1;
                            warn!(error = %e, consecutive_failures, "live collector disconnected");
                            if consecutive_failures >= DEGRADE_AFTER_FAILURES {
                                self.handle.set(CollectorHealth::Degraded);
                            }
                            if last_data_at.elapsed() > UNHEALTHY_AFTER_NO_DATA {
                                self.handle.set(CollectorHealth::Unhealthy);
                            }
                            tokio::select! {
                                _ = shutdown.cancelled() => break,
                                _ = tokio::time::sleep(backoff) => {}
                            }
                            backoff = (backoff * 2).min(MAX_BACKOFF);
                        }
                    }
                }
            }
        }

        info!("live collector shutting down");
        Ok(())
    }

    async fn connect_and_stream(&mut self, shutdown: &CancellationToken, last_data_at: &mut tokio::time::Instant) -> CoreResult<()> {
        let (ws_stream, _) = connect_async(&self.ws_url).await.map_err(|e| CoreError::Transient(format!("ws connect failed: {e}")))?;
        info!(url = %self.ws_url, "live collector connected");
        let (_write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match self.parse_and_store(&text).await {
                                Ok(()) => *last_data_at = tokio::time::Instant::now(),
                                Err(e) => warn!(error = %e, "failed to parse tick message, skipping"),
                            }
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(CoreError::Transient(format!("ws read error: {e}"))),
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    async fn parse_and_store(&self, text: &str) -> CoreResult<()> {
        let root: serde_json::Value = serde_json::from_str(text).map_err(|e| CoreError::Transient(format!("invalid message JSON: {e}")))?;
        let now = self.clock.now().await?;

        match root["type"].as_str() {
            Some("depth") => {
                let depth = parse_depth_message(&root, &self.instrument)?;
                self.store.put_depth(&depth).await?;
                self.bus.publish(&channels::depth(&self.instrument), now, &depth).await?;
            }
            _ => {
                let tick = parse_tick_message(&root, &self.instrument)?;
                self.store.put_tick(&tick).await?;
                self.bus.publish(&channels::tick(&self.instrument), now, &tick).await?;
            }
        }
        Ok(())
    }
}

/// Parse a broker tick message of the shape
/// `{"last_price": 48123.5, "volume": 120.0, "timestamp": "2024-01-01T09:15:00+05:30"}`.
fn parse_tick_message(root: &serde_json::Value, instrument: &str) -> CoreResult<Tick> {
    let last_price = root["last_price"]
        .as_f64()
        .ok_or_else(|| CoreError::Transient("missing field last_price".to_string()))?;

    let timestamp = parse_timestamp(root)?;

    let mut tick = Tick::new(instrument, timestamp, last_price);
    tick.volume = root["volume"].as_f64();
    tick.open_interest = root["oi"].as_f64();
    Ok(tick)
}

/// Parse a broker depth message of the shape
/// `{"type": "depth", "timestamp": "...", "buy": [{"price":1,"quantity":2,"order_count":1}, ...], "sell": [...]}`.
fn parse_depth_message(root: &serde_json::Value, instrument: &str) -> CoreResult<Depth> {
    let timestamp = parse_timestamp(root)?;
    let buy = parse_depth_levels(&root["buy"])?;
    let sell = parse_depth_levels(&root["sell"])?;
    Ok(Depth { instrument: instrument.to_string(), timestamp, buy, sell })
}

fn parse_depth_levels(levels: &serde_json::Value) -> CoreResult<Vec<DepthLevel>> {
    let Some(levels) = levels.as_array() else {
        return Ok(Vec::new());
    };
    levels
        .iter()
        .map(|level| {
            let price = level["price"].as_f64().ok_or_else(|| CoreError::Transient("depth level missing price".to_string()))?;
            let quantity = level["quantity"].as_f64().ok_or_else(|| CoreError::Transient("depth level missing quantity".to_string()))?;
            let order_count = level["order_count"].as_u64().unwrap_or(0) as u32;
            Ok(DepthLevel { price, quantity, order_count })
        })
        .collect()
}

fn parse_timestamp(root: &serde_json::Value) -> CoreResult<chrono::DateTime<chrono::FixedOffset>> {
    match root["timestamp"].as_str() {
        Some(s) => chrono::DateTime::parse_from_rfc3339(s).map_err(|e| CoreError::Transient(format!("invalid timestamp: {e}"))),
        None => Err(CoreError::Transient("missing field timestamp".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> serde_json::Value {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn parse_tick_message_extracts_required_fields() {
        let root = parse(r#"{"last_price": 48123.5, "volume": 120.0, "timestamp": "2024-01-01T09:15:00+05:30"}"#);
        let tick = parse_tick_message(&root, "BANKNIFTY").unwrap();
        assert_eq!(tick.instrument, "BANKNIFTY");
        assert_eq!(tick.last_price, 48123.5);
        assert_eq!(tick.volume, Some(120.0));
    }

    #[test]
    fn parse_tick_message_rejects_missing_price() {
        let root = parse(r#"{"timestamp": "2024-01-01T09:15:00+05:30"}"#);
        assert!(parse_tick_message(&root, "BANKNIFTY").is_err());
    }

    #[test]
    fn parse_and_store_rejects_malformed_json() {
        let root: Result<serde_json::Value, _> = serde_json::from_str("not json");
        assert!(root.is_err());
    }

    #[test]
    fn parse_depth_message_extracts_both_sides() {
        let root = parse(
            r#"{"type": "depth", "timestamp": "2024-01-01T09:15:00+05:30",
                "buy": [{"price": 100.0, "quantity": 10.0, "order_count": 2}],
                "sell": [{"price": 100.1, "quantity": 5.0, "order_count": 1}]}"#,
        );
        let depth = parse_depth_message(&root, "BANKNIFTY").unwrap();
        assert_eq!(depth.instrument, "BANKNIFTY");
        assert_eq!(depth.buy.len(), 1);
        assert_eq!(depth.sell[0].price, 100.1);
    }

    #[test]
    fn parse_depth_message_allows_empty_sides() {
        let root = parse(r#"{"type": "depth", "timestamp": "2024-01-01T09:15:00+05:30"}"#);
        let depth = parse_depth_message(&root, "NIFTY").unwrap();
        assert!(depth.buy.is_empty());
        assert!(depth.sell.is_empty());
    }
}
