// =============================================================================
// Signals Module
// =============================================================================
//
// The signal monitor evaluates active signal definitions against indicator
// updates and publishes a trigger event for each one that fires; the
// executor consumes those events and hands them to an orchestrator-supplied
// hook.
// =============================================================================

pub mod hook;
pub mod monitor;

pub use hook::{Decision, LoggingHook, OrchestratorHook};
pub use monitor::SignalMonitor;
