// =============================================================================
// Configuration — env-overridable process settings
// =============================================================================
//
// Every tunable named in the configuration table lives here. Fields carry
// `#[serde(default = "...")]` so that adding new fields never breaks loading
// an older config file. Loading is two-layered: an optional TOML file
// (`--config PATH`) provides the base, then `TICKCORE_*` environment
// variables override individual fields — the same shape as the teacher's
// `RuntimeConfig::load`, minus the atomic-save-on-shutdown behaviour (this
// core does not mutate its own config at runtime).
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

fn default_store_host() -> String {
    "127.0.0.1".to_string()
}
fn default_store_port() -> u16 {
    6379
}
fn default_clock_mode() -> String {
    "auto".to_string()
}
fn default_collector_provider() -> String {
    "mock".to_string()
}
fn default_historical_speed() -> f64 {
    1.0
}
fn default_gateway_port() -> u16 {
    8080
}
fn default_max_channels() -> usize {
    50
}
fn default_max_wildcards() -> usize {
    5
}
fn default_max_msgs_per_sec() -> u32 {
    1000
}
fn default_true() -> bool {
    true
}
fn default_role() -> String {
    "user".to_string()
}
fn default_window() -> usize {
    200
}
fn default_prev_ttl() -> u64 {
    14_400
}
fn default_symbols() -> Vec<String> {
    vec!["BANKNIFTY".to_string(), "NIFTY".to_string()]
}

/// `clock.mode`: overrides Clock autodetection between live and historical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockMode {
    Auto,
    Live,
    Historical,
}

impl std::str::FromStr for ClockMode {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "live" => Ok(Self::Live),
            "historical" => Ok(Self::Historical),
            other => anyhow::bail!("unknown clock mode: {other}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_host")]
    pub host: String,
    #[serde(default = "default_store_port")]
    pub port: u16,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: default_store_host(),
            port: default_store_port(),
        }
    }
}

impl StoreConfig {
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalConfig {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default = "default_historical_speed")]
    pub speed: f64,
    #[serde(default)]
    pub from: Option<chrono::NaiveDate>,
}

impl Default for HistoricalConfig {
    fn default() -> Self {
        Self {
            source: None,
            speed: default_historical_speed(),
            from: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    #[serde(default = "default_collector_provider")]
    pub provider: String,
    #[serde(default)]
    pub historical: HistoricalConfig,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            provider: default_collector_provider(),
            historical: HistoricalConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    #[serde(default = "default_max_channels")]
    pub max_channels: usize,
    #[serde(default = "default_max_wildcards")]
    pub max_wildcards: usize,
    #[serde(default = "default_max_msgs_per_sec")]
    pub max_msgs_per_sec: u32,
    #[serde(default = "default_true")]
    pub require_auth: bool,
    #[serde(default = "default_role")]
    pub default_role: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            max_channels: default_max_channels(),
            max_wildcards: default_max_wildcards(),
            max_msgs_per_sec: default_max_msgs_per_sec(),
            require_auth: default_true(),
            default_role: default_role(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorsConfig {
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default = "default_prev_ttl")]
    pub prev_ttl_seconds: u64,
}

impl Default for IndicatorsConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            prev_ttl_seconds: default_prev_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default = "default_clock_mode")]
    pub clock_mode: String,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub indicators: IndicatorsConfig,
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            clock_mode: default_clock_mode(),
            collector: CollectorConfig::default(),
            gateway: GatewayConfig::default(),
            indicators: IndicatorsConfig::default(),
            symbols: default_symbols(),
        }
    }
}

impl AppConfig {
    /// Load from an optional TOML file, then apply `TICKCORE_*` environment
    /// overrides. Missing file is not an error — the defaults (themselves
    /// overridable by env) are used, matching the teacher's
    /// `unwrap_or_else(|e| { warn!(...); Default::default() })` pattern.
    pub fn load(path: Option<&Path>) -> Self {
        let mut config = match path {
            Some(p) => Self::from_file(p).unwrap_or_else(|e| {
                warn!(error = %e, path = %p.display(), "failed to load config file, using defaults");
                Self::default()
            }),
            None => Self::default(),
        };
        config.apply_env_overrides();
        config
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("failed to parse config file {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("TICKCORE_STORE_HOST") {
            self.store.host = v;
        }
        if let Ok(v) = std::env::var("TICKCORE_STORE_PORT") {
            if let Ok(port) = v.parse() {
                self.store.port = port;
            }
        }
        if let Ok(v) = std::env::var("TICKCORE_CLOCK_MODE") {
            self.clock_mode = v;
        }
        if let Ok(v) = std::env::var("TICKCORE_COLLECTOR_PROVIDER") {
            self.collector.provider = v;
        }
        if let Ok(v) = std::env::var("TICKCORE_COLLECTOR_HISTORICAL_SOURCE") {
            self.collector.historical.source = Some(v);
        }
        if let Ok(v) = std::env::var("TICKCORE_COLLECTOR_HISTORICAL_SPEED") {
            if let Ok(speed) = v.parse() {
                self.collector.historical.speed = speed;
            }
        }
        if let Ok(v) = std::env::var("TICKCORE_GATEWAY_PORT") {
            if let Ok(port) = v.parse() {
                self.gateway.port = port;
            }
        }
        if let Ok(v) = std::env::var("TICKCORE_GATEWAY_MAX_CHANNELS") {
            if let Ok(n) = v.parse() {
                self.gateway.max_channels = n;
            }
        }
        if let Ok(v) = std::env::var("TICKCORE_GATEWAY_MAX_WILDCARDS") {
            if let Ok(n) = v.parse() {
                self.gateway.max_wildcards = n;
            }
        }
        if let Ok(v) = std::env::var("TICKCORE_GATEWAY_MAX_MSGS_PER_SEC") {
            if let Ok(n) = v.parse() {
                self.gateway.max_msgs_per_sec = n;
            }
        }
        if let Ok(v) = std::env::var("TICKCORE_GATEWAY_REQUIRE_AUTH") {
            self.gateway.require_auth = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("TICKCORE_GATEWAY_DEFAULT_ROLE") {
            self.gateway.default_role = v;
        }
        if let Ok(v) = std::env::var("TICKCORE_INDICATORS_WINDOW") {
            if let Ok(n) = v.parse() {
                self.indicators.window = n;
            }
        }
        if let Ok(v) = std::env::var("TICKCORE_INDICATORS_PREV_TTL_SECONDS") {
            if let Ok(n) = v.parse() {
                self.indicators.prev_ttl_seconds = n;
            }
        }
        if let Ok(v) = std::env::var("TICKCORE_SYMBOLS") {
            self.symbols = v
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }
}

/// Resolve `clock_mode` into a `ClockMode`, logging and falling back to
/// `Auto` on an unrecognised value rather than failing startup.
pub fn resolve_clock_mode(config: &AppConfig) -> ClockMode {
    config.clock_mode.parse().unwrap_or_else(|e| {
        warn!(error = %e, value = %config.clock_mode, "invalid clock mode, falling back to auto");
        ClockMode::Auto
    })
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
    info!("tracing initialised");
}
