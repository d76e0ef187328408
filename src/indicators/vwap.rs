// =============================================================================
// Volume-Weighted Average Price (VWAP)
// =============================================================================
//
// VWAP = sum(typical_price * volume) / sum(volume), accumulated across the
// bars given — callers reset the window themselves (VWAP resets at session
// start; the engine passes only the current session's closed bars).
// =============================================================================

use crate::model::OhlcBar;

pub fn calculate_vwap(bars: &[OhlcBar]) -> Option<f64> {
    if bars.is_empty() {
        return None;
    }
    let mut pv = 0.0;
    let mut volume = 0.0;
    for bar in bars {
        let typical = (bar.high + bar.low + bar.close) / 3.0;
        pv += typical * bar.volume;
        volume += bar.volume;
    }
    if volume == 0.0 {
        return None;
    }
    let vwap = pv / volume;
    vwap.is_finite().then_some(vwap)
}
