// =============================================================================
// Signal Monitor — evaluates active signals on every indicator update
// =============================================================================
//
// One monitor per instrument. Two concurrent duties: (1) evaluate every
// `active` signal against each `indicators:{instrument}` message, firing a
// `TriggerEvent` on `engine:signal:{instrument}` when all predicates pass;
// (2) a 1Hz expiry sweep that moves any `active` signal whose lifetime has
// elapsed to `expired`. Both go through `Store::cas_signal` so a signal
// leaves `active` exactly once even under concurrent evaluation.
//
// The monitor does not call an execution callback itself — that would
// create a cyclic reference between orchestrator and monitor. Ownership of
// `triggered -> executing` belongs to the standalone `Executor` task that
// subscribes to `engine:signal:{instrument}` (design notes, re-architecting
// the orchestrator/monitor callback into message passing).
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::bus::Bus;
use crate::clock::Clock;
use crate::error::CoreResult;
use crate::model::{channels, IndicatorSnapshot, SignalStatus, TriggerEvent};
use crate::store::Store;

const EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_EQ_TOLERANCE: f64 = 1e-9;

pub struct SignalMonitor {
    instrument: String,
    store: Store,
    bus: Bus,
    clock: Arc<Clock>,
}

impl SignalMonitor {
    pub fn new(instrument: impl Into<String>, store: Store, bus: Bus, clock: Arc<Clock>) -> Self {
        Self { instrument: instrument.into(), store, bus, clock }
    }

    #[instrument(skip(self, shutdown), fields(instrument = %self.instrument))]
    pub async fn run(self, shutdown: CancellationToken) -> CoreResult<()> {
        let channel = channels::indicators(&self.instrument);
        let mut stream = self.bus.subscribe::<IndicatorSnapshot>(&channel).await?;
        let mut sweep = tokio::time::interval(EXPIRY_SWEEP_INTERVAL);
        info!(channel, "signal monitor started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("signal monitor shutting down");
                    return Ok(());
                }
                _ = sweep.tick() => {
                    if let Err(e) = self.sweep_expired().await {
                        warn!(error = %e, "expiry sweep failed");
                    }
                }
                msg = stream.next() => {
                    let Some(envelope) = msg else { return Ok(()) };
                    if let Err(e) = self.evaluate_all(&envelope.payload, envelope.sequence).await {
                        warn!(error = %e, "signal evaluation failed");
                    }
                }
            }
        }
    }

    async fn evaluate_all(&self, snapshot: &IndicatorSnapshot, causal_sequence: u64) -> CoreResult<()> {
        let ids = self.store.signals_by_instrument(&self.instrument).await?;
        // Across signals on the same instrument, evaluation is parallel but
        // isolated — each signal's own CAS serialises its transitions.
        let tasks = ids.into_iter().map(|id| self.evaluate_one(id, snapshot.clone(), causal_sequence));
        futures_util::future::join_all(tasks).await;
        Ok(())
    }

    async fn evaluate_one(&self, signal_id: String, snapshot: IndicatorSnapshot, causal_sequence: u64) {
        if let Err(e) = self.evaluate_one_inner(&signal_id, &snapshot, causal_sequence).await {
            warn!(signal_id, error = %e, "failed to evaluate signal");
        }
    }

    async fn evaluate_one_inner(&self, signal_id: &str, snapshot: &IndicatorSnapshot, causal_sequence: u64) -> CoreResult<()> {
        let Some(record) = self.store.get_signal(signal_id).await? else { return Ok(()) };
        if record.status != SignalStatus::Active {
            return Ok(());
        }

        let mut all_pass = true;
        for predicate in record.definition.all_predicates() {
            let current = snapshot.get(&predicate.indicator_name);
            let previous = self.store.prev_indicator(&self.instrument, &predicate.indicator_name).await?;
            if !predicate.evaluate(current, previous, DEFAULT_EQ_TOLERANCE) {
                all_pass = false;
                break;
            }
        }

        if !all_pass {
            return Ok(());
        }

        let now = self.clock.now().await?;
        let won = self
            .store
            .cas_signal(signal_id, SignalStatus::Active, |r| {
                r.status = SignalStatus::Triggered;
                r.triggered_at = Some(now);
                r.current_value = snapshot.get(&r.definition.primary_predicate.indicator_name);
            })
            .await?;

        if !won {
            return Ok(()); // another evaluator already transitioned this signal
        }

        let event = TriggerEvent {
            signal_id: signal_id.to_string(),
            instrument: self.instrument.clone(),
            action: record.definition.action,
            triggered_at: now,
            causal_sequence,
            snapshot: snapshot.clone(),
        };
        self.bus.publish(&channels::signal(&self.instrument), now, &event).await?;
        Ok(())
    }

    async fn sweep_expired(&self) -> CoreResult<()> {
        let now = self.clock.now().await?;
        let ids = self.store.signals_by_instrument(&self.instrument).await?;
        for id in ids {
            let Some(record) = self.store.get_signal(&id).await? else { continue };
            if record.status == SignalStatus::Active && now >= record.definition.expires_at() {
                self.store.cas_signal(&id, SignalStatus::Active, |r| r.status = SignalStatus::Expired).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ist_offset, Operator, Predicate, SignalDefinition, SignalRecord, Side};
    use chrono::Utc;

    fn monitor() -> (SignalMonitor, Store, Bus) {
        let store = Store::fake();
        let bus = Bus::fake();
        let clock = Arc::new(Clock::new(store.clone()));
        (SignalMonitor::new("BANKNIFTY", store.clone(), bus.clone(), clock), store, bus)
    }

    async fn seed_active_signal(store: &Store, id: &str) {
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
        record.status = SignalStatus::Active;
        store.create_signal(&record).await.unwrap();
    }

    #[tokio::test]
    async fn passing_predicate_triggers_signal_and_publishes_event() {
        let (monitor, store, bus) = monitor();
        seed_active_signal(&store, "s1").await;
        let mut events = bus.subscribe::<TriggerEvent>(&channels::signal("BANKNIFTY")).await.unwrap();

        let mut snap = IndicatorSnapshot::new("BANKNIFTY", "1m", Utc::now().with_timezone(&ist_offset()));
        snap.set("rsi_14", Some(75.0));

        monitor.evaluate_all(&snap, 1).await.unwrap();

        let record = store.get_signal("s1").await.unwrap().unwrap();
        assert_eq!(record.status, SignalStatus::Triggered);

        let published = events.next().await.unwrap();
        assert_eq!(published.payload.signal_id, "s1");
    }

    #[tokio::test]
    async fn failing_predicate_leaves_signal_active() {
        let (monitor, store, _bus) = monitor();
        seed_active_signal(&store, "s2").await;

        let mut snap = IndicatorSnapshot::new("BANKNIFTY", "1m", Utc::now().with_timezone(&ist_offset()));
        snap.set("rsi_14", Some(40.0));

        monitor.evaluate_all(&snap, 1).await.unwrap();

        let record = store.get_signal("s2").await.unwrap().unwrap();
        assert_eq!(record.status, SignalStatus::Active);
    }

    #[tokio::test]
    async fn sweep_expires_signals_past_their_lifetime() {
        let (monitor, store, _bus) = monitor();
        let def = SignalDefinition {
            signal_id: "s4".into(),
            instrument: "BANKNIFTY".into(),
            action: Side::Buy,
            primary_predicate: Predicate::new("rsi_14", Operator::Gt, 70.0),
            extra_predicates: vec![],
            lifetime_seconds: -1, // already expired relative to created_at
            created_at: Utc::now().with_timezone(&ist_offset()),
            created_by: "test".into(),
        };
        let mut record = SignalRecord::new_created(def);
        record.status = SignalStatus::Active;
        store.create_signal(&record).await.unwrap();

        monitor.sweep_expired().await.unwrap();

        let record = store.get_signal("s4").await.unwrap().unwrap();
        assert_eq!(record.status, SignalStatus::Expired);
    }
}
