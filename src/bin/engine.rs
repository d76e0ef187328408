// =============================================================================
// engine — indicator engine, signal monitor, executor
// =============================================================================
//
// One `IndicatorEngine`, one `SignalMonitor`, and one `Executor` per
// configured symbol, sharing a Store/Bus/Clock composition root. The
// orchestrator hook is `LoggingHook` by default — a real orchestrator
// process is expected to run out-of-process and is reached only through the
// `engine:signal:*` / `engine:decision:*` channel contract.
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
use tickcore::config::{self, AppConfig};
use tickcore::health::{self, HealthState};
use tickcore::indicators::engine::IndicatorEngine;
use tickcore::signals::{LoggingHook, SignalMonitor};
use tickcore::store::Store;

const SHUTDOWN_BUDGET: Duration = Duration::from_secs(10);

#[derive(Parser)]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,
    /// Accepted for CLI-surface consistency with the other binaries; the
    /// engine has no collector to select a provider for.
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
    if args.mode.is_some() {
        warn!("--mode has no effect on the engine binary");
    }

    let app_config = AppConfig::load(args.config.as_deref());

    let store = match Store::connect(&app_config.store.redis_url()).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to connect to store");
            return 1;
        }
    };
    let bus = match tickcore::bus::Bus::connect(&app_config.store.redis_url()).await {
        Ok(b) => b,
        Err(e) => {
            error!(error = %e, "failed to connect to bus");
            return 1;
        }
    };
    let clock = Arc::new(Clock::new(store.clone()));

    let shutdown = CancellationToken::new();
    let mut tasks = JoinSet::new();

    for symbol in &app_config.symbols {
        let engine = IndicatorEngine::new(
            symbol.clone(),
            store.clone(),
            bus.clone(),
            clock.clone(),
            app_config.indicators.window,
            app_config.indicators.prev_ttl_seconds,
        );
        let token = shutdown.clone();
        tasks.spawn(async move { engine.run(token).await });

        let monitor = SignalMonitor::new(symbol.clone(), store.clone(), bus.clone(), clock.clone());
        let token = shutdown.clone();
        tasks.spawn(async move { monitor.run(token).await });

        let executor = tickcore::executor::Executor::new(symbol.clone(), store.clone(), bus.clone(), Arc::new(LoggingHook));
        let token = shutdown.clone();
        tasks.spawn(async move { executor.run(token).await });
    }

    let health_state = Arc::new(HealthState { store: store.clone(), clock: clock.clone(), instruments: app_config.symbols.clone(), collectors: vec![] });
    let health_port = app_config.gateway.port + 2;
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

    info!(symbols = ?app_config.symbols, "engine running");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            warn!("shutdown signal received");
        }
        Some(result) = tasks.join_next() => {
            error!(?result, "an engine task exited unexpectedly");
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
            info!("engine shut down cleanly");
            0
        }
        Err(_) => {
            error!("shutdown budget exceeded, forcing exit");
            2
        }
    }
}
