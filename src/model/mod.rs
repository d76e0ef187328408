// =============================================================================
// Data Model
// =============================================================================
//
// Every wire/store payload in this crate is a tagged, serde-derived struct or
// enum — no dynamically-typed dicts cross a module boundary. Timestamps carry
// an explicit offset; `ist()` gives the canonical +05:30 offset used for all
// Store-resident timestamps.
// =============================================================================

pub mod instrument;
pub mod tick;
pub mod depth;
pub mod ohlc;
pub mod indicator;
pub mod signal;
pub mod channel;

pub use channel::{channels, ChannelMessage};
pub use depth::{Depth, DepthLevel};
pub use indicator::IndicatorSnapshot;
pub use instrument::{Instrument, InstrumentClass, OptionRight};
pub use ohlc::{OhlcBar, Timeframe};
pub use signal::{
    Operator, Predicate, Side, SignalDefinition, SignalRecord, SignalStatus, TriggerEvent,
};
pub use tick::Tick;

use chrono::{DateTime, FixedOffset};

/// The canonical IST (+05:30) offset used for all Store-resident timestamps.
pub fn ist_offset() -> FixedOffset {
    FixedOffset::east_opt(5 * 3600 + 30 * 60).expect("IST offset is a constant valid value")
}

/// Convert any `DateTime` into the canonical IST representation.
pub fn to_ist<Tz: chrono::TimeZone>(dt: DateTime<Tz>) -> DateTime<FixedOffset> {
    dt.with_timezone(&ist_offset())
}
