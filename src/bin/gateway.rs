// =============================================================================
// gateway — WebSocket forwarder
// =============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use tickcore::config::{self, AppConfig};
use tickcore::gateway::{self, Acl, GatewayState, TokenRegistry};
use tickcore::health::{self, HealthState};
use tickcore::store::Store;

#[derive(Parser)]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,
    /// Accepted for CLI-surface consistency; the gateway has no collector
    /// provider to select.
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
        warn!("--mode has no effect on the gateway binary");
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
    let clock = Arc::new(tickcore::clock::Clock::new(store.clone()));

    let tokens = TokenRegistry::from_env();
    if app_config.gateway.require_auth && tokens.is_empty() {
        warn!("gateway.require_auth is set but TICKCORE_GATEWAY_TOKENS is empty — every connection will be rejected");
    }

    let state = Arc::new(GatewayState { bus: bus.clone(), config: app_config.gateway.clone(), acl: Acl::default(), tokens });

    let health_state = Arc::new(HealthState { store: store.clone(), clock, instruments: app_config.symbols.clone(), collectors: vec![] });
    let app = gateway::router(state).merge(health::router(health_state)).layer(CorsLayer::permissive());

    let bind_addr = format!("0.0.0.0:{}", app_config.gateway.port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, addr = %bind_addr, "failed to bind gateway");
            return 1;
        }
    };

    info!(addr = %bind_addr, "gateway listening");

    let result = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await;
    if let Err(e) = result {
        error!(error = %e, "gateway server error");
        return 2;
    }

    info!("gateway shut down cleanly");
    0
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    warn!("shutdown signal received");
}
