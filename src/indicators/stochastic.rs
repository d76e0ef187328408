// =============================================================================
// Stochastic Oscillator
// =============================================================================
//
// %K = (close - lowest_low(period)) / (highest_high(period) - lowest_low(period)) * 100
// %D = SMA(%K, smoothing)
//
// %K/%D > 80 => overbought, < 20 => oversold.
// =============================================================================

use crate::model::OhlcBar;

use super::sma::calculate_sma;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StochasticResult {
    pub k: f64,
    pub d: f64,
}

pub fn calculate_stochastic(bars: &[OhlcBar], period: usize, smoothing: usize) -> Option<StochasticResult> {
    if period == 0 || smoothing == 0 || bars.len() < period + smoothing - 1 {
        return None;
    }

    let mut k_series = Vec::with_capacity(bars.len() - period + 1);
    for window in bars.windows(period) {
        let highest = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let lowest = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        let close = window.last()?.close;
        let range = highest - lowest;
        let k = if range == 0.0 { 50.0 } else { (close - lowest) / range * 100.0 };
        if !k.is_finite() {
            return None;
        }
        k_series.push(k);
    }

    if k_series.len() < smoothing {
        return None;
    }
    let d = *calculate_sma(&k_series, smoothing).last()?;
    let k = *k_series.last()?;
    Some(StochasticResult { k, d })
}
