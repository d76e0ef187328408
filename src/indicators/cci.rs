// =============================================================================
// Commodity Channel Index (CCI)
// =============================================================================
//
// Typical price (TP) = (high + low + close) / 3
// CCI = (TP - SMA(TP, period)) / (0.015 * mean absolute deviation of TP)
//
// CCI > 100 => overbought, CCI < -100 => oversold.
// =============================================================================

use crate::model::OhlcBar;

pub fn calculate_cci(bars: &[OhlcBar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period {
        return None;
    }

    let window = &bars[bars.len() - period..];
    let typical: Vec<f64> = window.iter().map(|b| (b.high + b.low + b.close) / 3.0).collect();
    let sma: f64 = typical.iter().sum::<f64>() / period as f64;
    let mad: f64 = typical.iter().map(|tp| (tp - sma).abs()).sum::<f64>() / period as f64;

    if mad == 0.0 {
        return Some(0.0);
    }

    let last_tp = *typical.last()?;
    let cci = (last_tp - sma) / (0.015 * mad);
    cci.is_finite().then_some(cci)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ist_offset, Timeframe};
    use chrono::DateTime;

    fn bar(i: i64, h: f64, l: f64, c: f64) -> OhlcBar {
        let start = DateTime::<chrono::FixedOffset>::from_naive_utc_and_offset(
            chrono::DateTime::from_timestamp(i * 60, 0).unwrap().naive_utc(),
            ist_offset(),
        );
        OhlcBar::new("BANKNIFTY", Timeframe::M1, start, c, h, l, c, 1.0).unwrap()
    }

    #[test]
    fn cci_insufficient_data() {
        let bars = vec![bar(0, 101.0, 99.0, 100.0)];
        assert!(calculate_cci(&bars, 20).is_none());
    }

    #[test]
    fn cci_flat_market_is_zero() {
        let bars: Vec<OhlcBar> = (0..20).map(|i| bar(i, 101.0, 99.0, 100.0)).collect();
        let cci = calculate_cci(&bars, 20).unwrap();
        assert!(cci.abs() < 1e-9);
    }

    #[test]
    fn cci_above_mean_is_positive() {
        let mut bars: Vec<OhlcBar> = (0..19).map(|i| bar(i, 101.0, 99.0, 100.0)).collect();
        bars.push(bar(19, 110.0, 108.0, 109.0));
        let cci = calculate_cci(&bars, 20).unwrap();
        assert!(cci > 0.0, "expected positive CCI, got {cci}");
    }
}
