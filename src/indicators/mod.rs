// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicator set computed by the
// indicator engine. Every public function returns `Option<T>` (or an
// empty `Vec`) so callers are forced to handle insufficient-data and
// numerical-edge-case scenarios — a missing/null indicator is data, not an
// error.
// =============================================================================

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod cci;
pub mod ema;
pub mod engine;
pub mod macd;
pub mod roc;
pub mod rsi;
pub mod sma;
pub mod stochastic;
pub mod support_resistance;
pub mod volume;
pub mod vwap;

pub use engine::IndicatorEngine;
