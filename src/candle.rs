// =============================================================================
// Candle Builder — one per (instrument, timeframe)
// =============================================================================
//
// Subscribes to `market:tick:{instrument}`, maintains a single open bar, and
// finalises it the moment a tick lands on a later boundary. A bar that never
// receives a tick is never emitted — consumers (the indicator engine) are
// built to tolerate gaps in the `ohlc_sorted` index.
// =============================================================================

use std::sync::Arc;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::bus::Bus;
use crate::clock::Clock;
use crate::error::CoreResult;
use crate::model::{channels, OhlcBar, Tick, Timeframe};
use crate::store::Store;

pub struct CandleBuilder {
    instrument: String,
    timeframe: Timeframe,
    store: Store,
    bus: Bus,
    clock: Arc<Clock>,
    open_bar: Option<OhlcBar>,
    last_tick_ts: Option<chrono::DateTime<chrono::FixedOffset>>,
    dropped_stale_ticks: u64,
}

impl CandleBuilder {
    pub fn new(instrument: impl Into<String>, timeframe: Timeframe, store: Store, bus: Bus, clock: Arc<Clock>) -> Self {
        Self {
            instrument: instrument.into(),
            timeframe,
            store,
            bus,
            clock,
            open_bar: None,
            last_tick_ts: None,
            dropped_stale_ticks: 0,
        }
    }

    #[instrument(skip(self, shutdown), fields(instrument = %self.instrument, timeframe = %self.timeframe))]
    pub async fn run(mut self, shutdown: CancellationToken) -> CoreResult<()> {
        let channel = channels::tick(&self.instrument);
        let mut stream = self.bus.subscribe::<Tick>(&channel).await?;
        info!(channel, "candle builder subscribed");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    self.finalize_open_bar().await.ok();
                    info!("candle builder shutting down");
                    return Ok(());
                }
                msg = stream.next() => {
                    let Some(envelope) = msg else { return Ok(()) };
                    if let Err(e) = self.on_tick(&envelope.payload).await {
                        warn!(error = %e, "failed to process tick");
                    }
                }
            }
        }
    }

    async fn on_tick(&mut self, tick: &Tick) -> CoreResult<()> {
        let boundary = self.timeframe.floor(tick.timestamp);

        match &mut self.open_bar {
            Some(bar) if bar.start_at == boundary => {
                let is_latest = self.last_tick_ts.map(|last| tick.timestamp >= last).unwrap_or(true);
                bar.merge_tick(tick.last_price, tick.volume.unwrap_or(0.0), is_latest);
                if is_latest {
                    self.last_tick_ts = Some(tick.timestamp);
                }
            }
            Some(bar) if boundary < bar.start_at => {
                self.dropped_stale_ticks += 1;
                warn!(
                    instrument = %self.instrument,
                    dropped = self.dropped_stale_ticks,
                    "tick predates current open bar, dropping"
                );
            }
            _ => {
                self.finalize_open_bar().await?;
                self.open_bar = Some(
                    OhlcBar::new(
                        self.instrument.clone(),
                        self.timeframe,
                        boundary,
                        tick.last_price,
                        tick.last_price,
                        tick.last_price,
                        tick.last_price,
                        tick.volume.unwrap_or(0.0),
                    )
                    .map_err(|e| crate::error::CoreError::Logic(e.to_string()))?,
                );
                self.last_tick_ts = Some(tick.timestamp);
            }
        }
        Ok(())
    }

    async fn finalize_open_bar(&mut self) -> CoreResult<()> {
        let Some(bar) = self.open_bar.take() else { return Ok(()) };
        self.store.put_ohlc(&bar).await?;
        let now = self.clock.now().await?;
        self.bus.publish(&channels::ohlc(&self.instrument, self.timeframe.as_str()), now, &bar).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ist_offset;
    use chrono::{DateTime, FixedOffset};

    fn ts(epoch_secs: i64) -> DateTime<FixedOffset> {
        DateTime::<FixedOffset>::from_naive_utc_and_offset(
            chrono::DateTime::from_timestamp(epoch_secs, 0).unwrap().naive_utc(),
            ist_offset(),
        )
    }

    fn builder() -> CandleBuilder {
        let store = Store::fake();
        let clock = Arc::new(Clock::new(store.clone()));
        CandleBuilder::new("BANKNIFTY", Timeframe::M1, store, Bus::fake(), clock)
    }

    #[tokio::test]
    async fn first_tick_opens_a_bar_with_ohlc_all_equal_to_price() {
        let mut cb = builder();
        cb.on_tick(&Tick::new("BANKNIFTY", ts(10), 100.0)).await.unwrap();
        let bar = cb.open_bar.as_ref().unwrap();
        assert_eq!(bar.open, 100.0);
        assert_eq!(bar.high, 100.0);
        assert_eq!(bar.low, 100.0);
        assert_eq!(bar.close, 100.0);
    }

    #[tokio::test]
    async fn ticks_within_the_same_bar_widen_range_and_move_close() {
        let mut cb = builder();
        cb.on_tick(&Tick::new("BANKNIFTY", ts(10), 100.0)).await.unwrap();
        cb.on_tick(&Tick::new("BANKNIFTY", ts(20), 105.0)).await.unwrap();
        cb.on_tick(&Tick::new("BANKNIFTY", ts(30), 98.0)).await.unwrap();
        let bar = cb.open_bar.as_ref().unwrap();
        assert_eq!(bar.high, 105.0);
        assert_eq!(bar.low, 98.0);
        assert_eq!(bar.close, 98.0);
    }

    #[tokio::test]
    async fn tick_on_new_boundary_finalizes_previous_bar() {
        let mut cb = builder();
        cb.on_tick(&Tick::new("BANKNIFTY", ts(10), 100.0)).await.unwrap();
        cb.on_tick(&Tick::new("BANKNIFTY", ts(70), 110.0)).await.unwrap();

        let bar = cb.open_bar.as_ref().unwrap();
        assert_eq!(bar.start_at, Timeframe::M1.floor(ts(70)));
        assert_eq!(bar.open, 110.0);

        let stored = cb.store.ohlc("BANKNIFTY", Timeframe::M1, 10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].close, 100.0);
    }

    #[tokio::test]
    async fn stale_tick_is_dropped_not_merged() {
        let mut cb = builder();
        cb.on_tick(&Tick::new("BANKNIFTY", ts(70), 110.0)).await.unwrap();
        cb.on_tick(&Tick::new("BANKNIFTY", ts(10), 999.0)).await.unwrap();
        let bar = cb.open_bar.as_ref().unwrap();
        assert_eq!(bar.open, 110.0);
        assert_eq!(cb.dropped_stale_ticks, 1);
    }

    #[tokio::test]
    async fn zero_tick_bar_is_never_emitted() {
        let cb = builder();
        let stored = cb.store.ohlc("BANKNIFTY", Timeframe::M1, 10).await.unwrap();
        assert!(stored.is_empty());
    }
}
