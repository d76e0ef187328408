// =============================================================================
// Instrument
// =============================================================================
//
// Immutable once resolved from the upstream instrument catalog. Identifiers
// are opaque strings throughout this crate (matched against upstream symbol
// tables elsewhere — not this core's concern).
// =============================================================================

use serde::{Deserialize, Serialize};

/// Broad classification of a tradable instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentClass {
    Index,
    Future,
    Option,
    Spot,
}

impl std::fmt::Display for InstrumentClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index => write!(f, "index"),
            Self::Future => write!(f, "future"),
            Self::Option => write!(f, "option"),
            Self::Spot => write!(f, "spot"),
        }
    }
}

/// Call or put, for option instruments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionRight {
    #[serde(rename = "CE")]
    Call,
    #[serde(rename = "PE")]
    Put,
}

/// A tradable instrument. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub classification: InstrumentClass,
    /// Expiry date (ISO 8601, date only) for F&O instruments.
    #[serde(default)]
    pub expiry: Option<chrono::NaiveDate>,
    #[serde(default)]
    pub strike: Option<f64>,
    #[serde(default)]
    pub right: Option<OptionRight>,
    pub lot_size: u32,
    pub tick_size: f64,
}

impl Instrument {
    /// Construct a plain index/spot instrument (no expiry, strike, or right).
    pub fn simple(symbol: impl Into<String>, classification: InstrumentClass, lot_size: u32, tick_size: f64) -> Self {
        Self {
            symbol: symbol.into(),
            classification,
            expiry: None,
            strike: None,
            right: None,
            lot_size,
            tick_size,
        }
    }

    /// Human-readable identifier used in log fields and gateway error
    /// messages — symbol plus classification, e.g. "BANKNIFTY (index)".
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.symbol, self.classification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_includes_classification() {
        let inst = Instrument::simple("BANKNIFTY", InstrumentClass::Index, 25, 0.05);
        assert_eq!(inst.display_name(), "BANKNIFTY (index)");
    }

    #[test]
    fn option_right_serializes_as_ce_pe() {
        let json = serde_json::to_string(&OptionRight::Call).unwrap();
        assert_eq!(json, "\"CE\"");
        let json = serde_json::to_string(&OptionRight::Put).unwrap();
        assert_eq!(json, "\"PE\"");
    }
}
