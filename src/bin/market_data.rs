// =============================================================================
// market-data — collectors + candle builders
// =============================================================================
//
// Runs one collector and one candle builder per configured timeframe for
// every symbol in `config.symbols`, plus the shared `GET /health` endpoint.
// Exit codes: 0 clean shutdown, 1 startup failure, 2 runtime fatal (a
// spawned task died unexpectedly, or the shutdown budget was exceeded).
// =============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use tickcore::clock::Clock;
use tickcore::collector::{CollectorHandle, LiveCollector, ReplayCollector};
use tickcore::config::{self, AppConfig};
use tickcore::health::{self, HealthState};
use tickcore::model::Timeframe;
use tickcore::store::Store;

const SHUTDOWN_BUDGET: Duration = Duration::from_secs(10);

#[derive(Parser)]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides `collector.provider` (`broker` | `replay` | `mock`).
    #[arg(long)]
    mode: Option<String>,
}

#[tokio::main]
async fn main() {
    std::process::exit(run().await);
}

async fn run() -> i32 {
    let args = Args::parse();
    config::init_tracing();

    let mut app_config = AppConfig::load(args.config.as_deref());
    if let Some(mode) = args.mode {
        app_config.collector.provider = mode;
    }

    let store = match Store::connect(&app_config.store.redis_url()).await {
        Ok(s) => s,
        Err(e) if app_config.collector.provider == "mock" => {
            warn!(error = %e, "redis unavailable, falling back to in-memory store for mock provider");
            Store::fake()
        }
        Err(e) => {
            error!(error = %e, "failed to connect to store");
            return 1;
        }
    };
    let bus = match tickcore::bus::Bus::connect(&app_config.store.redis_url()).await {
        Ok(b) => b,
        Err(_) if app_config.collector.provider == "mock" => tickcore::bus::Bus::fake(),
        Err(e) => {
            error!(error = %e, "failed to connect to bus");
            return 1;
        }
    };
    let clock = Arc::new(Clock::new(store.clone()));

    let shutdown = CancellationToken::new();
    let mut tasks = JoinSet::new();
    let mut collector_handles = Vec::new();

    for symbol in &app_config.symbols {
        let handle = CollectorHandle::new();
        collector_handles.push(handle.clone());

        match app_config.collector.provider.as_str() {
            "replay" => {
                let Some(source) = app_config.collector.historical.source.clone() else {
                    error!(symbol, "collector.provider=replay requires collector.historical.source");
                    return 1;
                };
                let collector = ReplayCollector::new(
                    symbol.clone(),
                    PathBuf::from(source),
                    app_config.collector.historical.speed,
                    store.clone(),
                    bus.clone(),
                    clock.clone(),
                    handle,
                );
                let token = shutdown.clone();
                tasks.spawn(async move { collector.run(token).await });
            }
            "broker" => {
                let ws_url = std::env::var("TICKCORE_BROKER_WS_URL").unwrap_or_else(|_| "wss://example-broker.invalid/stream".to_string());
                let collector = LiveCollector::new(symbol.clone(), ws_url, store.clone(), bus.clone(), clock.clone(), handle);
                let token = shutdown.clone();
                tasks.spawn(async move { collector.run(token).await });
            }
            other => {
                if other != "mock" {
                    warn!(provider = other, "unknown collector.provider, treating as mock (no-op)");
                }
                info!(symbol, "mock provider: no collector task spawned");
            }
        }

        for timeframe in Timeframe::ALL {
            let builder = tickcore::candle::CandleBuilder::new(symbol.clone(), timeframe, store.clone(), bus.clone(), clock.clone());
            let token = shutdown.clone();
            tasks.spawn(async move { builder.run(token).await });
        }
    }

    let health_state = Arc::new(HealthState {
        store: store.clone(),
        clock: clock.clone(),
        instruments: app_config.symbols.clone(),
        collectors: collector_handles,
    });
    let health_port = app_config.gateway.port + 1;
    let health_bind = format!("0.0.0.0:{health_port}");
    let health_router = health::router(health_state).layer(CorsLayer::permissive());
    let listener = match tokio::net::TcpListener::bind(&health_bind).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, addr = %health_bind, "failed to bind health endpoint");
            return 1;
        }
    };
    tasks.spawn(async move {
        axum::serve(listener, health_router).await.map_err(|e| tickcore::error::CoreError::Transient(e.to_string()))
    });

    info!(symbols = ?app_config.symbols, provider = %app_config.collector.provider, "market-data running");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            warn!("shutdown signal received");
        }
        Some(result) = tasks.join_next() => {
            error!(?result, "a market-data task exited unexpectedly");
            shutdown.cancel();
            return 2;
        }
    }

    shutdown.cancel();
    match tokio::time::timeout(SHUTDOWN_BUDGET, async {
        while tasks.join_next().await.is_some() {}
    })
    .await
    {
        Ok(()) => {
            info!("market-data shut down cleanly");
            0
        }
        Err(_) => {
            error!("shutdown budget exceeded, forcing exit");
            2
        }
    }
}
