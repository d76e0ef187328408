// =============================================================================
// Volume-based indicators: Volume SMA, Volume Ratio, On-Balance Volume (OBV)
// =============================================================================

use crate::model::OhlcBar;

/// Simple moving average of bar volume.
pub fn calculate_volume_sma(bars: &[OhlcBar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period {
        return None;
    }
    let window = &bars[bars.len() - period..];
    Some(window.iter().map(|b| b.volume).sum::<f64>() / period as f64)
}

/// Current bar volume divided by the trailing volume SMA. > 1.0 means
/// above-average participation.
pub fn calculate_volume_ratio(bars: &[OhlcBar], period: usize) -> Option<f64> {
    let avg = calculate_volume_sma(bars, period)?;
    let last = bars.last()?.volume;
    if avg == 0.0 {
        return None;
    }
    Some(last / avg)
}

/// On-Balance Volume: running total that adds volume on up closes and
/// subtracts on down closes. Returns the cumulative OBV series, one value
/// per bar after the first.
pub fn calculate_obv(bars: &[OhlcBar]) -> Vec<f64> {
    if bars.len() < 2 {
        return Vec::new();
    }
    let mut obv = 0.0;
    let mut series = Vec::with_capacity(bars.len() - 1);
    for pair in bars.windows(2) {
        let (prev, curr) = (&pair[0], &pair[1]);
        if curr.close > prev.close {
            obv += curr.volume;
        } else if curr.close < prev.close {
            obv -= curr.volume;
        }
        series.push(obv);
    }
    series
}
