// =============================================================================
// Depth
// =============================================================================
//
// A snapshot of the top-5 buy/sell levels. Replaces prior depth atomically —
// the Store's `put_depth` overwrites the whole record rather than merging
// levels in place. Index instruments may not produce depth at all (an Open
// Question in the source material); an empty `buy`/`sell` is valid.
// =============================================================================

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: f64,
    pub quantity: f64,
    pub order_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Depth {
    pub instrument: String,
    pub timestamp: DateTime<FixedOffset>,
    /// Up to 5 levels, best price first.
    pub buy: Vec<DepthLevel>,
    /// Up to 5 levels, best price first.
    pub sell: Vec<DepthLevel>,
}

impl Depth {
    pub fn empty(instrument: impl Into<String>, timestamp: DateTime<FixedOffset>) -> Self {
        Self {
            instrument: instrument.into(),
            timestamp,
            buy: Vec::new(),
            sell: Vec::new(),
        }
    }

    pub fn best_bid(&self) -> Option<DepthLevel> {
        self.buy.first().copied()
    }

    pub fn best_ask(&self) -> Option<DepthLevel> {
        self.sell.first().copied()
    }

    /// Mid-price spread in basis points, or `None` if either side is empty.
    pub fn spread_bps(&self) -> Option<f64> {
        let bid = self.best_bid()?.price;
        let ask = self.best_ask()?.price;
        let mid = (bid + ask) / 2.0;
        if mid <= 0.0 {
            return None;
        }
        Some((ask - bid) / mid * 10_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ist_offset;

    fn ts() -> DateTime<FixedOffset> {
        DateTime::<FixedOffset>::from_naive_utc_and_offset(chrono::Utc::now().naive_utc(), ist_offset())
    }

    #[test]
    fn empty_depth_is_valid_and_has_no_spread() {
        let d = Depth::empty("NIFTY", ts());
        assert!(d.buy.is_empty());
        assert!(d.spread_bps().is_none());
    }

    #[test]
    fn spread_bps_computed_from_best_levels() {
        let mut d = Depth::empty("BANKNIFTY", ts());
        d.buy.push(DepthLevel { price: 100.0, quantity: 10.0, order_count: 2 });
        d.sell.push(DepthLevel { price: 100.1, quantity: 5.0, order_count: 1 });
        let bps = d.spread_bps().unwrap();
        assert!((bps - 9.995).abs() < 0.01);
    }
}
