// =============================================================================
// Health — GET /health
// =============================================================================
//
// Shared by all three binaries: `healthy` iff the Store is reachable and
// either the latest tick for every tracked instrument is under 120s old
// (live mode) or virtual time is set (historical mode, where wall-clock
// staleness is expected and not a problem). `degraded` covers stale data
// with the Store still reachable; anything else — including the Store
// itself being unreachable — is `unhealthy`.
// =============================================================================

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use serde::Serialize;

use crate::clock::Clock;
use crate::collector::{CollectorHandle, CollectorHealth};
use crate::model::ist_offset;
use crate::store::Store;

const FRESH_TOLERANCE_SECONDS: i64 = 120;

pub struct HealthState {
    pub store: Store,
    pub clock: Arc<Clock>,
    pub instruments: Vec<String>,
    pub collectors: Vec<CollectorHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Serialize)]
struct Dependencies {
    store: &'static str,
    clock: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: Status,
    dependencies: Dependencies,
    timestamp: chrono::DateTime<chrono::FixedOffset>,
}

pub fn router(state: Arc<HealthState>) -> Router {
    Router::new().route("/health", get(health_handler)).with_state(state)
}

async fn health_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let now = Utc::now().with_timezone(&ist_offset());

    let store_reachable = state.store.clock_virtual_enabled().await.is_ok();
    if !store_reachable {
        return Json(HealthResponse {
            status: Status::Unhealthy,
            dependencies: Dependencies { store: "unreachable", clock: "unknown" },
            timestamp: now,
        });
    }

    let status = match state.clock.is_virtual().await {
        Ok(true) => Status::Healthy,
        Ok(false) => worst_of(freshness_status(&state, now).await, collector_status(&state)),
        Err(_) => Status::Unhealthy,
    };

    Json(HealthResponse {
        status,
        dependencies: Dependencies { store: "reachable", clock: "reachable" },
        timestamp: now,
    })
}

fn worst_of(a: Status, b: Status) -> Status {
    use Status::*;
    match (a, b) {
        (Unhealthy, _) | (_, Unhealthy) => Unhealthy,
        (Degraded, _) | (_, Degraded) => Degraded,
        _ => Healthy,
    }
}

fn collector_status(state: &HealthState) -> Status {
    let mut worst = Status::Healthy;
    for handle in &state.collectors {
        worst = worst_of(
            worst,
            match handle.get() {
                CollectorHealth::Healthy => Status::Healthy,
                CollectorHealth::Degraded => Status::Degraded,
                CollectorHealth::Unhealthy => Status::Unhealthy,
            },
        );
    }
    worst
}

async fn freshness_status(state: &HealthState, now: chrono::DateTime<chrono::FixedOffset>) -> Status {
    if state.instruments.is_empty() {
        return Status::Healthy;
    }

    let mut any_stale = false;
    let mut any_missing = false;

    for instrument in &state.instruments {
        match state.store.latest_tick(instrument).await {
            Ok(Some(tick)) => {
                let age = (now - tick.timestamp).num_seconds();
                if age > FRESH_TOLERANCE_SECONDS {
                    any_stale = true;
                }
            }
            Ok(None) => any_missing = true,
            Err(_) => return Status::Unhealthy,
        }
    }

    if any_missing {
        Status::Unhealthy
    } else if any_stale {
        Status::Degraded
    } else {
        Status::Healthy
    }
}
