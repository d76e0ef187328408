// =============================================================================
// Historical Replay Collector
// =============================================================================
//
// Reads closed bars from a local CSV file, converts each into a handful of
// synthetic ticks spread across the bar interval, and emits them in
// chronological order while advancing the Clock's virtual-time key. Speed
// multiplier: `0` replays as fast as the loop can go, `1` paces to
// wall-clock, `k` paces to k times wall-clock. Zerodha credentials are not
// required for a CSV source — unlike the live collector there is no
// `AuthRequired` fast-fail here.
// =============================================================================

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::bus::Bus;
use crate::clock::Clock;
use crate::error::{CoreError, CoreResult};
use crate::model::{channels, OhlcBar, Tick, Timeframe};
use crate::store::Store;

use super::{CollectorHandle, CollectorHealth};

/// Ticks synthesised per bar, in this order: open, high, low, close.
const TICKS_PER_BAR: usize = 4;

pub struct ReplayCollector {
    instrument: String,
    csv_path: PathBuf,
    speed: f64,
    store: Store,
    bus: Bus,
    clock: std::sync::Arc<Clock>,
    handle: CollectorHandle,
}

impl ReplayCollector {
    pub fn new(
        instrument: impl Into<String>,
        csv_path: impl Into<PathBuf>,
        speed: f64,
        store: Store,
        bus: Bus,
        clock: std::sync::Arc<Clock>,
        handle: CollectorHandle,
    ) -> Self {
        Self { instrument: instrument.into(), csv_path: csv_path.into(), speed, store, bus, clock, handle }
    }

    #[instrument(skip(self, shutdown), fields(instrument = %self.instrument, path = %self.csv_path.display()))]
    pub async fn run(self, shutdown: CancellationToken) -> CoreResult<()> {
        let text = tokio::fs::read_to_string(&self.csv_path)
            .await
            .map_err(|e| CoreError::Transient(format!("failed to read replay source {}: {e}", self.csv_path.display())))?;

        let bars = parse_bars(&text, &self.instrument)?;
        let Some(first) = bars.first() else {
            warn!("replay source contains no bars");
            self.handle.set(CollectorHealth::Unhealthy);
            return Ok(());
        };

        self.clock.set_virtual(first.start_at).await?;
        self.handle.set(CollectorHealth::Healthy);

        for bar in &bars {
            if shutdown.is_cancelled() {
                break;
            }
            for tick in synthesize_ticks(bar) {
                self.clock.set_virtual(tick.timestamp).await?;
                self.store.put_tick(&tick).await?;
                self.bus.publish(&channels::tick(&self.instrument), tick.timestamp, &tick).await?;

                if self.speed > 0.0 {
                    let wall_seconds = (bar.timeframe.seconds() as f64 / TICKS_PER_BAR as f64) / self.speed;
                    let sleep_for = std::time::Duration::from_secs_f64(wall_seconds.max(0.0));
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(sleep_for) => {}
                    }
                }
            }
        }

        info!(bars = bars.len(), "replay finished, restoring wall clock");
        self.clock.clear_virtual().await?;
        Ok(())
    }
}

fn synthesize_ticks(bar: &OhlcBar) -> Vec<Tick> {
    let interval = bar.timeframe.seconds();
    let step = interval / TICKS_PER_BAR as i64;
    let prices = [bar.open, bar.high, bar.low, bar.close];
    let per_tick_volume = bar.volume / TICKS_PER_BAR as f64;

    prices
        .iter()
        .enumerate()
        .map(|(i, &price)| {
            let ts = bar.start_at + chrono::Duration::seconds(step * i as i64);
            let mut tick = Tick::new(bar.instrument.clone(), ts, price);
            tick.volume = Some(per_tick_volume);
            tick
        })
        .collect()
}

/// Parse a CSV with header `timeframe,start_at,open,high,low,close,volume`.
/// `start_at` is RFC3339. Malformed rows are skipped with a warning rather
/// than aborting the whole replay.
fn parse_bars(text: &str, instrument: &str) -> CoreResult<Vec<OhlcBar>> {
    let mut bars = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        if lineno == 0 || line.trim().is_empty() {
            continue; // header or blank line
        }
        match parse_bar_row(line, instrument) {
            Ok(bar) => bars.push(bar),
            Err(e) => warn!(lineno, error = %e, "skipping malformed replay row"),
        }
    }
    bars.sort_by_key(|b| b.start_at);
    Ok(bars)
}

fn parse_bar_row(line: &str, instrument: &str) -> CoreResult<OhlcBar> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 7 {
        return Err(CoreError::Transient(format!("expected 7 fields, got {}", fields.len())));
    }
    let timeframe = parse_timeframe(fields[0])?;
    let start_at = chrono::DateTime::parse_from_rfc3339(fields[1]).map_err(|e| CoreError::Transient(e.to_string()))?;
    let parse_f64 = |s: &str| s.parse::<f64>().map_err(|e| CoreError::Transient(e.to_string()));
    let open = parse_f64(fields[2])?;
    let high = parse_f64(fields[3])?;
    let low = parse_f64(fields[4])?;
    let close = parse_f64(fields[5])?;
    let volume = parse_f64(fields[6])?;

    OhlcBar::new(instrument, timeframe, start_at, open, high, low, close, volume).map_err(|e| CoreError::Transient(e.to_string()))
}

fn parse_timeframe(s: &str) -> CoreResult<Timeframe> {
    Timeframe::ALL
        .into_iter()
        .find(|tf| tf.as_str() == s)
        .ok_or_else(|| CoreError::Transient(format!("unknown timeframe {s}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ist_offset;

    fn csv() -> String {
        "timeframe,start_at,open,high,low,close,volume\n\
         1m,2024-01-01T09:15:00+05:30,100,102,99,101,1000\n\
         1m,2024-01-01T09:16:00+05:30,101,103,100,102,1200\n"
            .to_string()
    }

    #[test]
    fn parse_bars_skips_header_and_parses_rows_in_order() {
        let bars = parse_bars(&csv(), "BANKNIFTY").unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].open, 100.0);
        assert_eq!(bars[1].close, 102.0);
    }

    #[test]
    fn parse_bars_skips_malformed_rows_without_failing() {
        let text = "timeframe,start_at,open,high,low,close,volume\n1m,not-a-date,1,2,3,4,5\n1m,2024-01-01T09:15:00+05:30,100,102,99,101,1000\n";
        let bars = parse_bars(text, "BANKNIFTY").unwrap();
        assert_eq!(bars.len(), 1);
    }

    #[test]
    fn synthesize_ticks_spreads_four_prices_across_the_bar_interval() {
        let start = chrono::DateTime::parse_from_rfc3339("2024-01-01T09:15:00+05:30").unwrap();
        let bar = OhlcBar::new("BANKNIFTY", Timeframe::M1, start, 100.0, 102.0, 99.0, 101.0, 400.0).unwrap();
        let ticks = synthesize_ticks(&bar);
        assert_eq!(ticks.len(), 4);
        assert_eq!(ticks[0].last_price, 100.0);
        assert_eq!(ticks[3].last_price, 101.0);
        assert!(ticks[3].timestamp > ticks[0].timestamp);
        assert_eq!(ticks[0].volume, Some(100.0));
    }

    #[tokio::test]
    async fn run_advances_virtual_clock_and_writes_ticks_then_restores_wall_clock() {
        let dir = std::env::temp_dir().join(format!("replay-test-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("bars.csv");
        tokio::fs::write(&path, csv()).await.unwrap();

        let store = Store::fake();
        let clock = std::sync::Arc::new(Clock::new(store.clone()));
        let collector = ReplayCollector::new("BANKNIFTY", path, 0.0, store.clone(), Bus::fake(), clock.clone(), CollectorHandle::new());
        collector.run(CancellationToken::new()).await.unwrap();

        assert!(!clock.is_virtual().await.unwrap());
        let latest = store.latest_tick("BANKNIFTY").await.unwrap();
        assert!(latest.is_some());

        let _ = ist_offset();
        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
