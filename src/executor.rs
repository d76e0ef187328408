// =============================================================================
// Executor — owns the post-trigger signal lifecycle
// =============================================================================
//
// One executor per instrument. Subscribes to `engine:signal:{instrument}` and
// hands each `TriggerEvent` to an `OrchestratorHook`, synchronously, then
// performs the resulting CAS transition: accepted moves `triggered ->
// executing` (the hook itself is responsible for eventually calling
// `Store::mark_executed`/`mark_failed` once the order is actually filled or
// rejected downstream); a rejection with retry returns the signal to
// `active`; a rejection without retry moves it to `failed`.
//
// This is split out of the signal monitor rather than folded into it: a
// monitor that both evaluates predicates and calls back into an orchestrator
// would need a reference to the orchestrator, and the orchestrator in turn
// needs to reach the monitor to register hooks — a cyclic object graph.
// Message passing over the bus removes the cycle: the monitor only ever
// publishes, the executor only ever consumes.
// =============================================================================

use std::sync::Arc;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::bus::Bus;
use crate::error::CoreResult;
use crate::model::{channels, SignalStatus, TriggerEvent};
use crate::signals::hook::{Decision, OrchestratorHook};
use crate::store::Store;

pub struct Executor {
    instrument: String,
    store: Store,
    bus: Bus,
    hook: Arc<dyn OrchestratorHook>,
}

impl Executor {
    pub fn new(instrument: impl Into<String>, store: Store, bus: Bus, hook: Arc<dyn OrchestratorHook>) -> Self {
        Self { instrument: instrument.into(), store, bus, hook }
    }

    #[instrument(skip(self, shutdown), fields(instrument = %self.instrument))]
    pub async fn run(self, shutdown: CancellationToken) -> CoreResult<()> {
        let channel = channels::signal(&self.instrument);
        let mut stream = self.bus.subscribe::<TriggerEvent>(&channel).await?;
        info!(channel, "executor started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("executor shutting down");
                    return Ok(());
                }
                msg = stream.next() => {
                    let Some(envelope) = msg else { return Ok(()) };
                    if let Err(e) = self.handle_trigger(&envelope.payload).await {
                        warn!(error = %e, "failed to handle trigger event");
                    }
                }
            }
        }
    }

    async fn handle_trigger(&self, event: &TriggerEvent) -> CoreResult<()> {
        let decision = self.hook.on_trigger(event);
        match decision {
            Decision::Accepted => {
                let won = self
                    .store
                    .cas_signal(&event.signal_id, SignalStatus::Triggered, |r| r.status = SignalStatus::Executing)
                    .await?;
                if won {
                    info!(signal_id = %event.signal_id, "signal accepted, moved to executing");
                } else {
                    warn!(signal_id = %event.signal_id, "accepted signal was no longer triggered");
                }
            }
            Decision::Rejected { retry: true } => {
                let won = self
                    .store
                    .cas_signal(&event.signal_id, SignalStatus::Triggered, |r| r.status = SignalStatus::Active)
                    .await?;
                if won {
                    info!(signal_id = %event.signal_id, "signal rejected with retry, returned to active");
                }
            }
            Decision::Rejected { retry: false } => {
                let won = self
                    .store
                    .cas_signal(&event.signal_id, SignalStatus::Triggered, |r| {
                        r.status = SignalStatus::Failed;
                        r.reason = Some("rejected by orchestrator, no retry".to_string());
                    })
                    .await?;
                if won {
                    info!(signal_id = %event.signal_id, "signal rejected without retry, moved to failed");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::model::{ist_offset, IndicatorSnapshot, Operator, Predicate, SignalDefinition, SignalRecord, Side};
    use chrono::Utc;

    struct AcceptingHook;
    impl OrchestratorHook for AcceptingHook {
        fn on_trigger(&self, _event: &TriggerEvent) -> Decision {
            Decision::Accepted
        }
    }

    struct RejectingRetryHook;
    impl OrchestratorHook for RejectingRetryHook {
        fn on_trigger(&self, _event: &TriggerEvent) -> Decision {
            Decision::Rejected { retry: true }
        }
    }

    struct RejectingNoRetryHook;
    impl OrchestratorHook for RejectingNoRetryHook {
        fn on_trigger(&self, _event: &TriggerEvent) -> Decision {
            Decision::Rejected { retry: false }
        }
    }

    async fn seed_triggered_signal(store: &Store, id: &str) {
        let def = SignalDefinition {
            signal_id: id.to_string(),
            instrument: "BANKNIFTY".into(),
            action: Side::Buy,
            primary_predicate: Predicate::new("rsi_14", Operator::Gt, 70.0),
            extra_predicates: vec![],
            lifetime_seconds: 3600,
            created_at: Utc::now().with_timezone(&ist_offset()),
            created_by: "test".into(),
        };
        let mut record = SignalRecord::new_created(def);
        record.status = SignalStatus::Triggered;
        store.create_signal(&record).await.unwrap();
    }

    fn event(signal_id: &str) -> TriggerEvent {
        TriggerEvent {
            signal_id: signal_id.to_string(),
            instrument: "BANKNIFTY".into(),
            action: Side::Buy,
            triggered_at: Utc::now().with_timezone(&ist_offset()),
            causal_sequence: 1,
            snapshot: IndicatorSnapshot::new("BANKNIFTY", "1m", Utc::now().with_timezone(&ist_offset())),
        }
    }

    #[tokio::test]
    async fn accepted_decision_moves_triggered_to_executing() {
        let store = Store::fake();
        let bus = Bus::fake();
        let _clock = Arc::new(Clock::new(store.clone()));
        seed_triggered_signal(&store, "s1").await;

        let executor = Executor::new("BANKNIFTY", store.clone(), bus, Arc::new(AcceptingHook));
        executor.handle_trigger(&event("s1")).await.unwrap();

        let record = store.get_signal("s1").await.unwrap().unwrap();
        assert_eq!(record.status, SignalStatus::Executing);
    }

    #[tokio::test]
    async fn rejected_with_retry_returns_triggered_to_active() {
        let store = Store::fake();
        let bus = Bus::fake();
        seed_triggered_signal(&store, "s2").await;

        let executor = Executor::new("BANKNIFTY", store.clone(), bus, Arc::new(RejectingRetryHook));
        executor.handle_trigger(&event("s2")).await.unwrap();

        let record = store.get_signal("s2").await.unwrap().unwrap();
        assert_eq!(record.status, SignalStatus::Active);
    }

    #[tokio::test]
    async fn rejected_without_retry_moves_triggered_to_failed() {
        let store = Store::fake();
        let bus = Bus::fake();
        seed_triggered_signal(&store, "s3").await;

        let executor = Executor::new("BANKNIFTY", store.clone(), bus, Arc::new(RejectingNoRetryHook));
        executor.handle_trigger(&event("s3")).await.unwrap();

        let record = store.get_signal("s3").await.unwrap().unwrap();
        assert_eq!(record.status, SignalStatus::Failed);
        assert!(record.reason.is_some());
    }

    #[tokio::test]
    async fn decision_on_a_signal_no_longer_triggered_is_a_noop() {
        let store = Store::fake();
        let bus = Bus::fake();
        seed_triggered_signal(&store, "s4").await;
        store
            .cas_signal("s4", SignalStatus::Triggered, |r| r.status = SignalStatus::Executing)
            .await
            .unwrap();

        let executor = Executor::new("BANKNIFTY", store.clone(), bus, Arc::new(AcceptingHook));
        executor.handle_trigger(&event("s4")).await.unwrap();

        let record = store.get_signal("s4").await.unwrap().unwrap();
        assert_eq!(record.status, SignalStatus::Executing);
    }
}
