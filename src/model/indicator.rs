// =============================================================================
// IndicatorSnapshot
// =============================================================================
//
// A mapping (indicator_name -> numeric value or null), produced atomically
// from one closed bar's tail window. `null` is a first-class value: warm-up
// indicators return it until their minimum window is full, and downstream
// predicates must evaluate false against it, never error.
// =============================================================================

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct IndicatorSnapshot {
    pub instrument: String,
    pub timeframe: String,
    pub computed_at: Option<DateTime<FixedOffset>>,
    /// `BTreeMap` for deterministic JSON field ordering in tests/logs.
    pub values: BTreeMap<String, Option<f64>>,
}

impl IndicatorSnapshot {
    pub fn new(instrument: impl Into<String>, timeframe: impl Into<String>, computed_at: DateTime<FixedOffset>) -> Self {
        Self {
            instrument: instrument.into(),
            timeframe: timeframe.into(),
            computed_at: Some(computed_at),
            values: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: Option<f64>) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied().flatten()
    }

    /// Names whose stored value differs from `other`'s — used by the
    /// indicator engine to decide which names to push into the prev-cache.
    pub fn changed_since(&self, other: &IndicatorSnapshot) -> Vec<String> {
        self.values
            .iter()
            .filter(|(name, value)| other.values.get(*name) != Some(value))
            .map(|(name, _)| name.clone())
            .collect()
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
    fn get_missing_indicator_is_none() {
        let snap = IndicatorSnapshot::new("BANKNIFTY", "1m", ts());
        assert_eq!(snap.get("rsi_14"), None);
    }

    #[test]
    fn get_null_indicator_is_none_not_error() {
        let mut snap = IndicatorSnapshot::new("BANKNIFTY", "1m", ts());
        snap.set("rsi_14", None);
        assert_eq!(snap.get("rsi_14"), None);
    }

    #[test]
    fn changed_since_detects_value_and_null_transitions() {
        let mut a = IndicatorSnapshot::new("BANKNIFTY", "1m", ts());
        a.set("rsi_14", Some(48.0));
        a.set("ema_9", Some(100.0));

        let mut b = IndicatorSnapshot::new("BANKNIFTY", "1m", ts());
        b.set("rsi_14", Some(52.0));
        b.set("ema_9", Some(100.0));

        let mut changed = b.changed_since(&a);
        changed.sort();
        assert_eq!(changed, vec!["rsi_14".to_string()]);
    }
}
