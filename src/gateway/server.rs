// =============================================================================
// Gateway Server — pure WebSocket forwarder
// =============================================================================
//
// A connection subscribes to channel patterns and receives everything the
// Bus publishes on them, wrapped in the envelope in `protocol.rs`. The
// gateway never queries the Store and never originates a `data` message —
// only `pong`, `error`, and subscription acks are gateway-authored.
// =============================================================================

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bus::Bus;
use crate::config::GatewayConfig;

use super::acl::{Acl, Role};
use super::auth::TokenRegistry;
use super::protocol::{ClientAction, ClientMessage, ServerMessage};
use super::ratelimit::TokenBucket;

pub struct GatewayState {
    pub bus: Bus,
    pub config: GatewayConfig,
    pub acl: Acl,
    pub tokens: TokenRegistry,
}

pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new().route("/ws", get(ws_handler)).with_state(state)
}

#[derive(Deserialize)]
struct WsQuery {
    token: Option<String>,
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<GatewayState>>, Query(query): Query<WsQuery>) -> impl IntoResponse {
    let default_role = Role::from_str(&state.config.default_role).unwrap_or(Role::User);

    let role = if state.config.require_auth {
        match query.token.as_deref().and_then(|t| state.tokens.resolve(t)) {
            Some(role) => role,
            None => {
                warn!("gateway connection rejected: missing or invalid token");
                return (axum::http::StatusCode::FORBIDDEN, "missing or invalid token").into_response();
            }
        }
    } else {
        query.token.as_deref().and_then(|t| state.tokens.resolve(t)).unwrap_or(default_role)
    };

    ws.on_upgrade(move |socket| handle_connection(socket, state, role)).into_response()
}

async fn handle_connection(socket: WebSocket, state: Arc<GatewayState>, role: Role) {
    info!(%role, "gateway connection established");
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let bucket = Arc::new(Mutex::new(TokenBucket::new(state.config.max_msgs_per_sec)));
    let rate_notice: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
    let mut subscriptions: HashMap<String, CancellationToken> = HashMap::new();
    let mut wildcard_count = 0usize;

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(msg) = outbound else { break };
                if sender.send(msg).await.is_err() {
                    break;
                }
            }
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&text, &state, role, &tx, &mut subscriptions, &mut wildcard_count, &bucket, &rate_notice);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = tx.send(Message::Pong(data));
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "gateway connection read error");
                        break;
                    }
                }
            }
        }
    }

    for (_, cancel) in subscriptions.drain() {
        cancel.cancel();
    }
    info!("gateway connection closed");
}

fn handle_client_message(
    text: &str,
    state: &Arc<GatewayState>,
    role: Role,
    tx: &mpsc::UnboundedSender<Message>,
    subscriptions: &mut HashMap<String, CancellationToken>,
    wildcard_count: &mut usize,
    bucket: &Arc<Mutex<TokenBucket>>,
    rate_notice: &Arc<Mutex<Option<Instant>>>,
) {
    let parsed: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            send(tx, ServerMessage::error(format!("invalid message: {e}"), None));
            return;
        }
    };

    match parsed.action {
        ClientAction::Ping => send(tx, ServerMessage::pong()),
        ClientAction::Subscribe => {
            for channel in &parsed.channels {
                if subscriptions.contains_key(channel) {
                    continue;
                }
                if !state.acl.allows(role, channel) {
                    send(tx, ServerMessage::acl_denied(format!("channel not permitted for role {role}: {channel}"), parsed.request_id.clone()));
                    continue;
                }
                if subscriptions.len() >= state.config.max_channels {
                    send(tx, ServerMessage::quota_exceeded("max_channels exceeded", parsed.request_id.clone()));
                    continue;
                }
                let is_wildcard = channel.contains('*');
                if is_wildcard && *wildcard_count >= state.config.max_wildcards {
                    send(tx, ServerMessage::quota_exceeded("max_wildcard_subscriptions exceeded", parsed.request_id.clone()));
                    continue;
                }

                let cancel = CancellationToken::new();
                tokio::spawn(forward_channel(channel.clone(), state.bus.clone(), tx.clone(), bucket.clone(), rate_notice.clone(), cancel.clone()));
                subscriptions.insert(channel.clone(), cancel);
                if is_wildcard {
                    *wildcard_count += 1;
                }
                send(tx, ServerMessage::subscribed(channel, parsed.request_id.clone()));
            }
        }
        ClientAction::Unsubscribe => {
            for channel in &parsed.channels {
                if let Some(cancel) = subscriptions.remove(channel) {
                    cancel.cancel();
                    if channel.contains('*') {
                        *wildcard_count = wildcard_count.saturating_sub(1);
                    }
                }
                send(tx, ServerMessage::unsubscribed(channel, parsed.request_id.clone()));
            }
        }
    }
}

async fn forward_channel(
    pattern: String,
    bus: Bus,
    tx: mpsc::UnboundedSender<Message>,
    bucket: Arc<Mutex<TokenBucket>>,
    rate_notice: Arc<Mutex<Option<Instant>>>,
    shutdown: CancellationToken,
) {
    let stream = match bus.subscribe::<serde_json::Value>(&pattern).await {
        Ok(s) => s,
        Err(e) => {
            warn!(pattern, error = %e, "gateway failed to subscribe on bus");
            return;
        }
    };
    tokio::pin!(stream);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            envelope = stream.next() => {
                let Some(envelope) = envelope else { return };

                let allowed = bucket.lock().try_take();
                if !allowed {
                    let mut notice = rate_notice.lock();
                    let now = Instant::now();
                    let should_notify = notice.map(|t| now.duration_since(t) >= Duration::from_secs(1)).unwrap_or(true);
                    if should_notify {
                        *notice = Some(now);
                        send(&tx, ServerMessage::rate_limited());
                    }
                    continue;
                }

                let msg = ServerMessage::data(&envelope.channel, envelope.sequence, envelope.timestamp, envelope.payload);
                send(&tx, msg);
            }
        }
    }
}

fn send(tx: &mpsc::UnboundedSender<Message>, msg: ServerMessage) {
    match serde_json::to_string(&msg) {
        Ok(json) => {
            let _ = tx.send(Message::Text(json.into()));
        }
        Err(e) => warn!(error = %e, "failed to serialise gateway message"),
    }
}
