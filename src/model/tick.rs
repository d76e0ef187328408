// =============================================================================
// Tick
// =============================================================================
//
// Immutable once created. Timestamps are monotone per instrument within one
// feed session but not globally monotone across feeds — consumers (candle
// builder) handle out-of-order arrival explicitly rather than assuming a
// total order.
// =============================================================================

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub instrument: String,
    pub timestamp: DateTime<FixedOffset>,
    pub last_price: f64,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub open_interest: Option<f64>,
}

impl Tick {
    pub fn new(instrument: impl Into<String>, timestamp: DateTime<FixedOffset>, last_price: f64) -> Self {
        Self {
            instrument: instrument.into(),
            timestamp,
            last_price,
            volume: None,
            open_interest: None,
        }
    }

    /// How old this tick is relative to `now`. Negative durations (a tick
    /// timestamped in the future, e.g. clock skew) are clamped to zero.
    pub fn age(&self, now: DateTime<FixedOffset>) -> chrono::Duration {
        let delta = now - self.timestamp;
        if delta < chrono::Duration::zero() {
            chrono::Duration::zero()
        } else {
            delta
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ist_offset;

    #[test]
    fn age_is_zero_for_future_timestamp() {
        let now = DateTime::<FixedOffset>::from_naive_utc_and_offset(
            chrono::Utc::now().naive_utc(),
            ist_offset(),
        );
        let future = now + chrono::Duration::seconds(5);
        let tick = Tick::new("BANKNIFTY", future, 100.0);
        assert_eq!(tick.age(now), chrono::Duration::zero());
    }

    #[test]
    fn age_reflects_elapsed_time() {
        let now = DateTime::<FixedOffset>::from_naive_utc_and_offset(
            chrono::Utc::now().naive_utc(),
            ist_offset(),
        );
        let past = now - chrono::Duration::seconds(120);
        let tick = Tick::new("BANKNIFTY", past, 100.0);
        assert_eq!(tick.age(now), chrono::Duration::seconds(120));
    }
}
