// =============================================================================
// OHLCBar
// =============================================================================
//
// Invariants (checked in `OhlcBar::new`, enforced by construction rather than
// by validating at every read site):
//   - low <= min(open, close) <= max(open, close) <= high
//   - start_at is timeframe-aligned
//   - volume >= 0
//
// A bar is "open" while its end boundary has not passed; "closed" otherwise.
// Only closed bars are indicator-inputs.
// =============================================================================

use chrono::{DateTime, FixedOffset, Timelike};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "3m")]
    M3,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "60m")]
    M60,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 7] = [
        Timeframe::M1,
        Timeframe::M3,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::M60,
        Timeframe::D1,
    ];

    /// Bar length in seconds.
    pub fn seconds(self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M3 => 3 * 60,
            Timeframe::M5 => 5 * 60,
            Timeframe::M15 => 15 * 60,
            Timeframe::M30 => 30 * 60,
            Timeframe::M60 => 60 * 60,
            Timeframe::D1 => 24 * 60 * 60,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::M60 => "60m",
            Timeframe::D1 => "1d",
        }
    }

    /// Floor `ts` to the start of the bar boundary that contains it. Daily
    /// bars align to IST midnight; intraday bars align to the epoch, which
    /// lines up with wall-clock minute boundaries for every divisor of an
    /// hour used here.
    pub fn floor(self, ts: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        if self == Timeframe::D1 {
            let midnight = ts
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .expect("midnight is always a valid time");
            return DateTime::<FixedOffset>::from_naive_utc_and_offset(
                midnight - *ts.offset(),
                *ts.offset(),
            );
        }
        let secs = self.seconds();
        let epoch = ts.timestamp();
        let floored = epoch - epoch.rem_euclid(secs);
        DateTime::<FixedOffset>::from_naive_utc_and_offset(
            chrono::DateTime::from_timestamp(floored, 0)
                .expect("valid unix timestamp")
                .naive_utc(),
            *ts.offset(),
        )
    }

    /// Whether `start_at` is itself a valid boundary for this timeframe.
    pub fn is_aligned(self, start_at: DateTime<FixedOffset>) -> bool {
        if self == Timeframe::D1 {
            return start_at.hour() == 0 && start_at.minute() == 0 && start_at.second() == 0;
        }
        start_at.timestamp().rem_euclid(self.seconds()) == 0
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcBar {
    pub instrument: String,
    pub timeframe: Timeframe,
    pub start_at: DateTime<FixedOffset>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Error returned when bar construction would violate an invariant.
#[derive(Debug, thiserror::Error)]
pub enum BarInvariantError {
    #[error("start_at {0} is not aligned to timeframe {1}")]
    Unaligned(DateTime<FixedOffset>, Timeframe),
    #[error("volume {0} is negative")]
    NegativeVolume(f64),
    #[error("low {low} exceeds min(open, close) {min_oc} or high {high} is below max(open, close) {max_oc}")]
    OutOfOrder {
        low: f64,
        high: f64,
        min_oc: f64,
        max_oc: f64,
    },
}

impl OhlcBar {
    pub fn new(
        instrument: impl Into<String>,
        timeframe: Timeframe,
        start_at: DateTime<FixedOffset>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, BarInvariantError> {
        if !timeframe.is_aligned(start_at) {
            return Err(BarInvariantError::Unaligned(start_at, timeframe));
        }
        if volume < 0.0 {
            return Err(BarInvariantError::NegativeVolume(volume));
        }
        let min_oc = open.min(close);
        let max_oc = open.max(close);
        if low > min_oc || high < max_oc || low > high {
            return Err(BarInvariantError::OutOfOrder { low, high, min_oc, max_oc });
        }
        Ok(Self {
            instrument: instrument.into(),
            timeframe,
            start_at,
            open,
            high,
            low,
            close,
            volume,
        })
    }

    pub fn end_at(&self) -> DateTime<FixedOffset> {
        self.start_at + chrono::Duration::seconds(self.timeframe.seconds())
    }

    /// A bar is closed once `now` has passed its end boundary.
    pub fn is_closed(&self, now: DateTime<FixedOffset>) -> bool {
        now >= self.end_at()
    }

    /// Merge a new price/volume observation into this bar in place,
    /// widening high/low and updating close only if `ts` is the latest tick
    /// observed so far (out-of-order ticks within the bar still widen the
    /// range but never regress `close`).
    pub fn merge_tick(&mut self, price: f64, volume: f64, is_latest: bool) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.volume += volume;
        if is_latest {
            self.close = price;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ist_offset;

    fn at(epoch_secs: i64) -> DateTime<FixedOffset> {
        DateTime::<FixedOffset>::from_naive_utc_and_offset(
            chrono::DateTime::from_timestamp(epoch_secs, 0).unwrap().naive_utc(),
            ist_offset(),
        )
    }

    #[test]
    fn floor_aligns_to_timeframe_boundary() {
        let ts = at(125); // 2:05 into the epoch
        let floored = Timeframe::M1.floor(ts);
        assert_eq!(floored.timestamp(), 120);
        assert!(Timeframe::M1.is_aligned(floored));
    }

    #[test]
    fn boundary_exact_tick_belongs_to_new_bar() {
        // A tick at the exact boundary floors to itself, not the prior bar.
        let boundary = at(180);
        assert_eq!(Timeframe::M1.floor(boundary), boundary);
    }

    #[test]
    fn rejects_unaligned_start() {
        let ts = at(125);
        let err = OhlcBar::new("BANKNIFTY", Timeframe::M1, ts, 1.0, 2.0, 0.5, 1.5, 10.0);
        assert!(matches!(err, Err(BarInvariantError::Unaligned(_, _))));
    }

    #[test]
    fn rejects_low_above_open_close() {
        let ts = at(120);
        let err = OhlcBar::new("BANKNIFTY", Timeframe::M1, ts, 10.0, 12.0, 11.0, 10.5, 5.0);
        assert!(matches!(err, Err(BarInvariantError::OutOfOrder { .. })));
    }

    #[test]
    fn rejects_negative_volume() {
        let ts = at(120);
        let err = OhlcBar::new("BANKNIFTY", Timeframe::M1, ts, 10.0, 11.0, 9.0, 10.0, -1.0);
        assert!(matches!(err, Err(BarInvariantError::NegativeVolume(_))));
    }

    #[test]
    fn merge_tick_widens_range_without_regressing_close_for_stale_ticks() {
        let ts = at(120);
        let mut bar = OhlcBar::new("BANKNIFTY", Timeframe::M1, ts, 100.0, 100.0, 100.0, 100.0, 0.0).unwrap();
        bar.merge_tick(105.0, 1.0, true);
        bar.merge_tick(95.0, 1.0, false); // out-of-order, widens low, doesn't move close
        assert_eq!(bar.high, 105.0);
        assert_eq!(bar.low, 95.0);
        assert_eq!(bar.close, 105.0);
        assert_eq!(bar.volume, 2.0);
    }

    #[test]
    fn is_closed_once_end_boundary_passes() {
        let ts = at(0);
        let bar = OhlcBar::new("BANKNIFTY", Timeframe::M1, ts, 1.0, 1.0, 1.0, 1.0, 0.0).unwrap();
        assert!(!bar.is_closed(at(30)));
        assert!(bar.is_closed(at(60)));
    }
}
