// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
// MACD line   = EMA(fast) - EMA(slow)
// Signal line = EMA(signal_period) of the MACD line
// Histogram   = MACD line - Signal line
//
// Standard defaults: fast=12, slow=26, signal=9.
// =============================================================================

use super::ema::calculate_ema;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdResult {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Compute the most recent MACD reading from a slice of closes.
///
/// Returns `None` when there isn't enough data to seed both the slow EMA and
/// the signal-line EMA of the MACD series.
pub fn calculate_macd(closes: &[f64], fast: usize, slow: usize, signal_period: usize) -> Option<MacdResult> {
    if fast == 0 || slow == 0 || signal_period == 0 || fast >= slow {
        return None;
    }

    let fast_ema = calculate_ema(closes, fast);
    let slow_ema = calculate_ema(closes, slow);
    if fast_ema.is_empty() || slow_ema.is_empty() {
        return None;
    }

    // Align series: fast_ema starts `fast-1` into `closes`, slow_ema starts
    // `slow-1` into `closes`. Both end at the same index, so take the tail
    // of fast_ema with the same length as slow_ema.
    let offset = slow_ema.len().checked_sub(0)?;
    let fast_tail = &fast_ema[fast_ema.len().saturating_sub(offset)..];
    if fast_tail.len() != slow_ema.len() {
        return None;
    }

    let macd_series: Vec<f64> = fast_tail.iter().zip(slow_ema.iter()).map(|(f, s)| f - s).collect();
    if macd_series.len() < signal_period {
        return None;
    }

    let signal_series = calculate_ema(&macd_series, signal_period);
    let signal = *signal_series.last()?;
    let macd = *macd_series.last()?;
    let histogram = macd - signal;

    if macd.is_finite() && signal.is_finite() {
        Some(MacdResult { macd, signal, histogram })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macd_insufficient_data() {
        let closes = vec![1.0; 10];
        assert!(calculate_macd(&closes, 12, 26, 9).is_none());
    }

    #[test]
    fn macd_invalid_periods() {
        let closes: Vec<f64> = (1..=100).map(|x| x as f64).collect();
        assert!(calculate_macd(&closes, 26, 12, 9).is_none());
        assert!(calculate_macd(&closes, 0, 26, 9).is_none());
    }

    #[test]
    fn macd_flat_series_is_zero() {
        let closes = vec![100.0; 60];
        let result = calculate_macd(&closes, 12, 26, 9).unwrap();
        assert!(result.macd.abs() < 1e-9);
        assert!(result.histogram.abs() < 1e-9);
    }

    #[test]
    fn macd_uptrend_is_positive() {
        let closes: Vec<f64> = (1..=100).map(|x| x as f64).collect();
        let result = calculate_macd(&closes, 12, 26, 9).unwrap();
        assert!(result.macd > 0.0, "expected positive MACD in an uptrend, got {}", result.macd);
    }
}
