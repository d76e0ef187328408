// =============================================================================
// tickcore — real-time market-data distribution and signal execution core
// =============================================================================
//
// Library crate shared by the `market-data`, `engine`, and `gateway`
// binaries. Each binary builds its own composition root (Store/Bus/Clock,
// plus whichever of these modules it needs) and spawns the relevant tasks.
// =============================================================================

pub mod bus;
pub mod candle;
pub mod clock;
pub mod collector;
pub mod config;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod health;
pub mod indicators;
pub mod model;
pub mod signals;
pub mod store;
