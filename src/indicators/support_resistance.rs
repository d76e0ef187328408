// =============================================================================
// Support / Resistance Levels
// =============================================================================
//
// A simple fractal/pivot-based scan: a bar is a swing high (resistance) if
// its high exceeds the high of `lookaround` bars on each side, and a swing
// low (support) by the symmetric rule. Levels are returned oldest-first.
// =============================================================================

use crate::model::OhlcBar;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SrLevel {
    pub price: f64,
    pub is_resistance: bool,
}

pub fn find_levels(bars: &[OhlcBar], lookaround: usize) -> Vec<SrLevel> {
    if lookaround == 0 || bars.len() < 2 * lookaround + 1 {
        return Vec::new();
    }

    let mut levels = Vec::new();
    for i in lookaround..bars.len() - lookaround {
        let window = &bars[i - lookaround..=i + lookaround];
        let pivot = &bars[i];

        if window.iter().all(|b| pivot.high >= b.high) {
            levels.push(SrLevel { price: pivot.high, is_resistance: true });
        }
        if window.iter().all(|b| pivot.low <= b.low) {
            levels.push(SrLevel { price: pivot.low, is_resistance: false });
        }
    }
    levels
}

/// Nearest resistance above and support below `price`, if any were found.
pub fn nearest_levels(levels: &[SrLevel], price: f64) -> (Option<f64>, Option<f64>) {
    let resistance = levels
        .iter()
        .filter(|l| l.is_resistance && l.price > price)
        .map(|l| l.price)
        .fold(None, |acc, p| Some(acc.map_or(p, |a: f64| a.min(p))));

    let support = levels
        .iter()
        .filter(|l| !l.is_resistance && l.price < price)
        .map(|l| l.price)
        .fold(None, |acc, p| Some(acc.map_or(p, |a: f64| a.max(p))));

    (resistance, support)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ist_offset, Timeframe};
    use chrono::DateTime;

    fn bar(i: i64, h: f64, l: f64) -> OhlcBar {
        let start = DateTime::<chrono::FixedOffset>::from_naive_utc_and_offset(
            chrono::DateTime::from_timestamp(i * 60, 0).unwrap().naive_utc(),
            ist_offset(),
        );
        OhlcBar::new("BANKNIFTY", Timeframe::M1, start, (h + l) / 2.0, h, l, (h + l) / 2.0, 1.0).unwrap()
    }

    #[test]
    fn finds_a_clear_swing_high_and_low() {
        let highs_lows = [
            (100.0, 90.0),
            (105.0, 92.0),
            (120.0, 80.0), // pivot: swing high at 120, swing low at 80
            (104.0, 93.0),
            (101.0, 91.0),
        ];
        let bars: Vec<OhlcBar> = highs_lows.iter().enumerate().map(|(i, &(h, l))| bar(i as i64, h, l)).collect();
        let levels = find_levels(&bars, 2);
        assert!(levels.iter().any(|l| l.is_resistance && l.price == 120.0));
        assert!(levels.iter().any(|l| !l.is_resistance && l.price == 80.0));
    }

    #[test]
    fn insufficient_data_returns_empty() {
        let bars: Vec<OhlcBar> = (0..3).map(|i| bar(i, 100.0, 90.0)).collect();
        assert!(find_levels(&bars, 2).is_empty());
    }

    #[test]
    fn nearest_levels_picks_closest_on_each_side() {
        let levels = vec![
            SrLevel { price: 110.0, is_resistance: true },
            SrLevel { price: 130.0, is_resistance: true },
            SrLevel { price: 90.0, is_resistance: false },
            SrLevel { price: 70.0, is_resistance: false },
        ];
        let (resistance, support) = nearest_levels(&levels, 100.0);
        assert_eq!(resistance, Some(110.0));
        assert_eq!(support, Some(90.0));
    }
}
