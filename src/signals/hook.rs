// =============================================================================
// Orchestrator Hook — execution callback boundary
// =============================================================================
//
// The signal monitor hands every trigger to an `OrchestratorHook`, which must
// answer synchronously: accept (the signal moves to `executing`, the hook is
// responsible for eventually calling `Store::mark_executed`/`mark_failed`)
// or reject (the signal returns to `active` for retry, or to `failed` if the
// hook says not to retry). This crate never constructs or scores signals
// itself — that is the orchestrator's job.
// =============================================================================

use crate::model::TriggerEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accepted,
    Rejected { retry: bool },
}

pub trait OrchestratorHook: Send + Sync {
    fn on_trigger(&self, event: &TriggerEvent) -> Decision;
}

/// Default hook used when no orchestrator is wired in (e.g. local dev,
/// `collector.provider = mock` runs): logs the trigger and always rejects
/// without retry, so signals reach a terminal state instead of looping.
pub struct LoggingHook;

impl OrchestratorHook for LoggingHook {
    fn on_trigger(&self, event: &TriggerEvent) -> Decision {
        tracing::info!(
            signal_id = %event.signal_id,
            instrument = %event.instrument,
            action = %event.action,
            "signal triggered, no orchestrator wired — rejecting"
        );
        Decision::Rejected { retry: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ist_offset, IndicatorSnapshot, Side};
    use chrono::Utc;

    fn event() -> TriggerEvent {
        TriggerEvent {
            signal_id: "s1".into(),
            instrument: "BANKNIFTY".into(),
            action: Side::Buy,
            triggered_at: Utc::now().with_timezone(&ist_offset()),
            causal_sequence: 1,
            snapshot: IndicatorSnapshot::new("BANKNIFTY", "1m", Utc::now().with_timezone(&ist_offset())),
        }
    }

    #[test]
    fn logging_hook_always_rejects_without_retry() {
        let hook = LoggingHook;
        assert_eq!(hook.on_trigger(&event()), Decision::Rejected { retry: false });
    }
}
