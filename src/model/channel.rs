// =============================================================================
// Channel Message & channel-name families
// =============================================================================
//
// Bit-stable channel name families. Sequence is assigned by whichever
// component publishes; persistence across restarts is not required —
// subscribers treat a sequence rewind as a gap, never an error.
// =============================================================================

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage<T> {
    pub channel: String,
    pub sequence: u64,
    pub timestamp: DateTime<FixedOffset>,
    pub payload: T,
}

/// Bit-stable channel name builders. Keeping these in one place means a typo
/// in a channel name is a compile-time call-site error, not a runtime typo.
pub mod channels {
    pub fn tick(instrument: &str) -> String {
        format!("market:tick:{instrument}")
    }

    pub fn depth(instrument: &str) -> String {
        format!("market:depth:{instrument}")
    }

    pub fn ohlc(instrument: &str, timeframe: &str) -> String {
        format!("market:ohlc:{instrument}:{timeframe}")
    }

    pub fn indicators(instrument: &str) -> String {
        format!("indicators:{instrument}")
    }

    pub fn signal(instrument: &str) -> String {
        format!("engine:signal:{instrument}")
    }

    pub fn decision(instrument: &str) -> String {
        format!("engine:decision:{instrument}")
    }
}

#[cfg(test)]
mod tests {
    use super::channels;

    #[test]
    fn channel_names_match_the_documented_layout() {
        assert_eq!(channels::tick("BANKNIFTY"), "market:tick:BANKNIFTY");
        assert_eq!(channels::depth("BANKNIFTY"), "market:depth:BANKNIFTY");
        assert_eq!(channels::ohlc("BANKNIFTY", "1m"), "market:ohlc:BANKNIFTY:1m");
        assert_eq!(channels::indicators("BANKNIFTY"), "indicators:BANKNIFTY");
        assert_eq!(channels::signal("BANKNIFTY"), "engine:signal:BANKNIFTY");
        assert_eq!(channels::decision("BANKNIFTY"), "engine:decision:BANKNIFTY");
    }
}
