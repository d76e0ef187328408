// =============================================================================
// Indicator Engine — recompute indicators on every closed bar
// =============================================================================
//
// One engine instance per instrument, each subscribed to
// `market:ohlc:{instrument}:*`. Maintains a rolling window (default 200
// closed bars) per timeframe and recomputes the full indicator set on every
// bar close, then writes + publishes the snapshot. Runs inline on its own
// task per the component design's "CPU-bound indicator math runs inline,
// must not exceed ~10ms" rule — these window sizes are small enough that no
// worker-pool offload is needed.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::bus::Bus;
use crate::clock::Clock;
use crate::error::CoreResult;
use crate::model::{channels, IndicatorSnapshot, OhlcBar, Timeframe};
use crate::store::Store;

use super::{adx, atr, bollinger, cci, ema, macd, roc, rsi, sma, stochastic, support_resistance, volume, vwap};

pub struct IndicatorEngine {
    instrument: String,
    store: Store,
    bus: Bus,
    clock: Arc<Clock>,
    window: usize,
    prev_ttl: std::time::Duration,
    windows: HashMap<Timeframe, Vec<OhlcBar>>,
}

impl IndicatorEngine {
    pub fn new(instrument: impl Into<String>, store: Store, bus: Bus, clock: Arc<Clock>, window: usize, prev_ttl_seconds: u64) -> Self {
        Self {
            instrument: instrument.into(),
            store,
            bus,
            clock,
            window,
            prev_ttl: std::time::Duration::from_secs(prev_ttl_seconds),
            windows: HashMap::new(),
        }
    }

    /// Run until `shutdown` fires, consuming bar-close events from the bus
    /// and recomputing the indicator snapshot for each one.
    #[instrument(skip(self, shutdown), fields(instrument = %self.instrument))]
    pub async fn run(mut self, shutdown: CancellationToken) -> CoreResult<()> {
        let pattern = format!("market:ohlc:{}:*", self.instrument);
        let mut stream = self.bus.subscribe::<OhlcBar>(&pattern).await?;
        info!(pattern, "indicator engine subscribed");

        use futures_util::StreamExt;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("indicator engine shutting down");
                    return Ok(());
                }
                msg = stream.next() => {
                    let Some(envelope) = msg else { return Ok(()) };
                    if let Err(e) = self.on_bar_close(envelope.payload).await {
                        warn!(error = %e, "failed to process bar close");
                    }
                }
            }
        }
    }

    async fn on_bar_close(&mut self, bar: OhlcBar) -> CoreResult<()> {
        let window = self.windows.entry(bar.timeframe).or_default();
        window.push(bar.clone());
        if window.len() > self.window {
            let overflow = window.len() - self.window;
            window.drain(0..overflow);
        }

        let snapshot = self.compute_snapshot(bar.timeframe).await?;
        self.store.put_indicators(&snapshot, self.prev_ttl).await?;
        let now = self.clock.now().await?;
        self.bus.publish(&channels::indicators(&self.instrument), now, &snapshot).await?;
        Ok(())
    }

    async fn compute_snapshot(&self, timeframe: Timeframe) -> CoreResult<IndicatorSnapshot> {
        let bars = &self.windows[&timeframe];
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let now = self.clock.now().await?;

        let mut snapshot = IndicatorSnapshot::new(&self.instrument, timeframe.as_str(), now);

        snapshot.set("rsi_14", rsi::current_rsi(&closes, 14).map(|(v, _)| v));
        snapshot.set("rsi_21", rsi::current_rsi(&closes, 21).map(|(v, _)| v));

        snapshot.set("sma_20", sma::current_sma(&closes, 20));
        snapshot.set("sma_50", sma::current_sma(&closes, 50));
        snapshot.set("sma_200", sma::current_sma(&closes, 200));

        snapshot.set("ema_9", ema::calculate_ema(&closes, 9).last().copied());
        snapshot.set("ema_21", ema::calculate_ema(&closes, 21).last().copied());

        if let Some(m) = macd::calculate_macd(&closes, 12, 26, 9) {
            snapshot.set("macd", Some(m.macd));
            snapshot.set("macd_signal", Some(m.signal));
            snapshot.set("macd_histogram", Some(m.histogram));
        } else {
            snapshot.set("macd", None);
            snapshot.set("macd_signal", None);
            snapshot.set("macd_histogram", None);
        }

        if let Some(b) = bollinger::calculate_bollinger(&closes, 20, 2.0) {
            snapshot.set("bollinger_upper", Some(b.upper));
            snapshot.set("bollinger_middle", Some(b.middle));
            snapshot.set("bollinger_lower", Some(b.lower));
            snapshot.set("bollinger_width", Some(b.width));
        } else {
            snapshot.set("bollinger_upper", None);
            snapshot.set("bollinger_middle", None);
            snapshot.set("bollinger_lower", None);
            snapshot.set("bollinger_width", None);
        }

        snapshot.set("atr_14", atr::calculate_atr(bars, 14));
        snapshot.set("adx_14", adx::calculate_adx(bars, 14));
        snapshot.set("cci_20", cci::calculate_cci(bars, 20));

        if let Some(s) = stochastic::calculate_stochastic(bars, 14, 3) {
            snapshot.set("stoch_k", Some(s.k));
            snapshot.set("stoch_d", Some(s.d));
        } else {
            snapshot.set("stoch_k", None);
            snapshot.set("stoch_d", None);
        }

        snapshot.set("volume_sma_20", volume::calculate_volume_sma(bars, 20));
        snapshot.set("volume_ratio", volume::calculate_volume_ratio(bars, 20));
        snapshot.set("obv", volume::calculate_obv(bars).last().copied());
        snapshot.set("vwap", vwap::calculate_vwap(bars));

        let levels = support_resistance::find_levels(bars, 5);
        let last_close = closes.last().copied();
        if let Some(price) = last_close {
            let (resistance, support) = support_resistance::nearest_levels(&levels, price);
            snapshot.set("resistance", resistance);
            snapshot.set("support", support);
        } else {
            snapshot.set("resistance", None);
            snapshot.set("support", None);
        }

        snapshot.set("price_change_pct", roc::current_roc(&closes, 1));

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ist_offset;
    use chrono::DateTime;

    fn bar(i: i64, c: f64) -> OhlcBar {
        let start = DateTime::<chrono::FixedOffset>::from_naive_utc_and_offset(
            chrono::DateTime::from_timestamp(i * 60, 0).unwrap().naive_utc(),
            ist_offset(),
        );
        OhlcBar::new("BANKNIFTY", Timeframe::M1, start, c, c + 1.0, c - 1.0, c, 10.0).unwrap()
    }

    #[tokio::test]
    async fn snapshot_is_all_null_before_warmup() {
        let mut engine = IndicatorEngine::new("BANKNIFTY", Store::fake(), Bus::fake(), Arc::new(Clock::new(Store::fake())), 200, 14_400);
        engine.windows.entry(Timeframe::M1).or_default().push(bar(0, 100.0));
        let snapshot = engine.compute_snapshot(Timeframe::M1).await.unwrap();
        assert_eq!(snapshot.get("rsi_14"), None);
        assert_eq!(snapshot.get("sma_20"), None);
    }

    #[tokio::test]
    async fn snapshot_populates_once_window_is_warm() {
        let mut engine = IndicatorEngine::new("BANKNIFTY", Store::fake(), Bus::fake(), Arc::new(Clock::new(Store::fake())), 200, 14_400);
        for i in 0..30 {
            engine.windows.entry(Timeframe::M1).or_default().push(bar(i, 100.0 + i as f64));
        }
        let snapshot = engine.compute_snapshot(Timeframe::M1).await.unwrap();
        assert!(snapshot.get("sma_20").is_some());
        assert!(snapshot.get("rsi_14").is_some());
    }

    #[tokio::test]
    async fn on_bar_close_caps_window_at_configured_size() {
        let mut engine = IndicatorEngine::new("BANKNIFTY", Store::fake(), Bus::fake(), Arc::new(Clock::new(Store::fake())), 5, 14_400);
        for i in 0..10 {
            engine.on_bar_close(bar(i, 100.0 + i as f64)).await.unwrap();
        }
        assert_eq!(engine.windows[&Timeframe::M1].len(), 5);
    }
}
