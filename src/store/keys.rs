// =============================================================================
// Store key layout
// =============================================================================
//
// Centralised so the documented key layout exists in exactly one place.
// Every Store method builds keys through these functions rather than
// formatting ad hoc strings inline.
// =============================================================================

pub fn tick_latest(sym: &str) -> String {
    format!("tick:{sym}:latest")
}

pub fn tick_at(sym: &str, iso_ts: &str) -> String {
    format!("tick:{sym}:{iso_ts}")
}

pub fn price_latest(sym: &str) -> String {
    format!("price:{sym}:latest")
}

pub fn depth_latest(sym: &str) -> String {
    format!("depth:{sym}:latest")
}

pub fn ohlc_at(sym: &str, tf: &str, iso_ts: &str) -> String {
    format!("ohlc:{sym}:{tf}:{iso_ts}")
}

pub fn ohlc_sorted(sym: &str, tf: &str) -> String {
    format!("ohlc_sorted:{sym}:{tf}")
}

pub fn indicators_latest(sym: &str) -> String {
    format!("indicators:{sym}:latest")
}

pub fn indicators_prev(sym: &str, name: &str) -> String {
    format!("indicators_prev:{sym}:{name}")
}

pub fn signal(id: &str) -> String {
    format!("signal:{id}")
}

pub fn signals_by_instrument(sym: &str) -> String {
    format!("signals_by_instrument:{sym}")
}

pub const CLOCK_VIRTUAL_ENABLED: &str = "clock:virtual:enabled";
pub const CLOCK_VIRTUAL_CURRENT: &str = "clock:virtual:current";
pub const AUTH_KITE_ACCESS_TOKEN: &str = "auth:kite:access_token";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_matches_the_documented_scheme() {
        assert_eq!(tick_latest("BANKNIFTY"), "tick:BANKNIFTY:latest");
        assert_eq!(price_latest("BANKNIFTY"), "price:BANKNIFTY:latest");
        assert_eq!(depth_latest("BANKNIFTY"), "depth:BANKNIFTY:latest");
        assert_eq!(ohlc_sorted("BANKNIFTY", "1m"), "ohlc_sorted:BANKNIFTY:1m");
        assert_eq!(indicators_latest("BANKNIFTY"), "indicators:BANKNIFTY:latest");
        assert_eq!(indicators_prev("BANKNIFTY", "rsi_14"), "indicators_prev:BANKNIFTY:rsi_14");
        assert_eq!(signal("s1"), "signal:s1");
        assert_eq!(signals_by_instrument("BANKNIFTY"), "signals_by_instrument:BANKNIFTY");
    }
}
